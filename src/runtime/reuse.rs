//! Subtree reuse during incremental reparse.
//!
//! When the parser sits at a byte position with a single live
//! configuration, it asks the previous (edited) tree for the largest
//! subtree that starts exactly there and can be spliced in wholesale. A
//! candidate qualifies only if splicing is provably equivalent to
//! reparsing its bytes:
//!
//! - the subtree is structurally clean: no error, missing, or damaged
//!   descendant, and not built while multiple configurations were live;
//! - its bytes (plus a one-byte lookahead margin) are clear of every
//!   recorded damage range, and so is the old token immediately after it,
//!   since that token was the lookahead for the reduce that built the node;
//! - the automaton state it was pushed from matches the current state, and
//!   the lexical state at its first byte matches the current lexical state.
//!
//! All checks are conservative: rejecting a reusable subtree only costs
//! time, accepting a stale one would corrupt the tree.

use std::sync::Arc;

use crate::grammar::table::{Action, RuleTable, SymbolKind};
use crate::lexer::LexState;
use crate::tree::{DamageRange, SyntaxNode, Tree};

use super::LOOKAHEAD_MARGIN;

/// How an accepted candidate joins the parse stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReusePush {
    /// An extra; rides on the stack without a state change.
    Transparent,
    /// Shift or goto into this state.
    State(u32),
}

/// An accepted candidate plus the lexical state recorded just after it,
/// used to resume the lexer without rescanning.
pub(crate) struct ReuseCandidate {
    pub node: Arc<SyntaxNode>,
    pub push: ReusePush,
    pub resume_lex_state: Option<LexState>,
}

/// Read-only view of the edited previous tree.
pub(crate) struct ReuseSource<'a> {
    tree: &'a Tree,
}

impl<'a> ReuseSource<'a> {
    pub fn new(tree: &'a Tree) -> ReuseSource<'a> {
        ReuseSource { tree }
    }

    /// The largest qualifying subtree starting at `pos`, walking down one
    /// spine of the old tree. Returns `None` when nothing at this position
    /// passes the guards; the caller then lexes normally.
    pub fn best_at(
        &self,
        pos: usize,
        top_state: u32,
        lex_state: LexState,
        table: &RuleTable,
    ) -> Option<ReuseCandidate> {
        if pos >= self.tree.len() {
            return None;
        }
        let damage = self.tree.damage();
        let mut node = self.tree.root_arc();
        let mut start = 0;
        loop {
            if start == pos {
                if let Some(candidate) =
                    self.qualify(node, pos, top_state, lex_state, table, damage)
                {
                    return Some(candidate);
                }
            }
            // Not usable whole; try the child spanning this position.
            let (child, child_start) = child_containing(node, start, pos)?;
            node = child;
            start = child_start;
        }
    }

    fn qualify(
        &self,
        node: &Arc<SyntaxNode>,
        pos: usize,
        top_state: u32,
        lex_state: LexState,
        table: &RuleTable,
        damage: &[DamageRange],
    ) -> Option<ReuseCandidate> {
        if node.len == 0 || node.flags.has_fault || node.flags.fragile {
            return None;
        }
        if first_leaf(node).lex_state != lex_state {
            return None;
        }

        let end = pos + node.len;
        if !clear_of(damage, pos, end + LOOKAHEAD_MARGIN) {
            return None;
        }
        // The token after this subtree was the lookahead that committed the
        // old parse to this shape; if it changed, the shape may not hold.
        if let Some((next, next_start)) = self.leaf_at(end) {
            if !clear_of(damage, next_start, next_start + next.len + LOOKAHEAD_MARGIN) {
                return None;
            }
        }

        let push = reuse_push(table, top_state, node)?;
        Some(ReuseCandidate {
            node: Arc::clone(node),
            push,
            resume_lex_state: self.leaf_at(end).map(|(leaf, _)| leaf.lex_state),
        })
    }

    /// The leaf whose span begins at `byte`, if any.
    fn leaf_at(&self, byte: usize) -> Option<(&Arc<SyntaxNode>, usize)> {
        if byte >= self.tree.len() {
            return None;
        }
        let mut node = self.tree.root_arc();
        let mut start = 0;
        while !node.is_leaf() {
            let (child, child_start) = child_containing(node, start, byte)?;
            node = child;
            start = child_start;
        }
        Some((node, start))
    }
}

/// Decide whether the current configuration can consume `node` directly,
/// and how.
fn reuse_push(table: &RuleTable, top_state: u32, node: &Arc<SyntaxNode>) -> Option<ReusePush> {
    if node.flags.extra && table.is_extra(node.symbol) {
        return Some(ReusePush::Transparent);
    }
    match table.symbol(node.symbol).kind {
        SymbolKind::Terminal => {
            // Only an unambiguous shift: a conflict cell means the full
            // parse would fork here, which reuse cannot replay.
            match table.actions(top_state, node.symbol) {
                [Action::Shift(target)] => Some(ReusePush::State(*target)),
                _ => None,
            }
        }
        SymbolKind::NonTerminal => {
            if node.entry_state != top_state {
                return None;
            }
            table.goto(top_state, node.symbol).map(ReusePush::State)
        }
        SymbolKind::End => None,
    }
}

fn first_leaf(node: &Arc<SyntaxNode>) -> &SyntaxNode {
    let mut current: &SyntaxNode = node.as_ref();
    while let Some(child) = current.children.iter().find(|child| child.len > 0) {
        current = child.as_ref();
    }
    current
}

/// The child whose span contains `byte`, with its absolute start.
fn child_containing<'n>(
    node: &'n Arc<SyntaxNode>,
    start: usize,
    byte: usize,
) -> Option<(&'n Arc<SyntaxNode>, usize)> {
    let mut offset = start;
    for child in &node.children {
        let end = offset + child.len;
        if byte < end {
            return Some((child, offset));
        }
        offset = end;
    }
    None
}

/// Inclusive-boundary overlap test: adjacency counts as touching, which is
/// the conservative direction for reuse.
fn clear_of(damage: &[DamageRange], start: usize, end: usize) -> bool {
    damage
        .iter()
        .all(|range| range.start > end || range.end < start)
}
