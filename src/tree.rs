//! Immutable, structurally shared syntax trees.
//!
//! Nodes store byte *lengths*, not absolute positions: a node's position is
//! the sum of the lengths of everything before it, computed while walking
//! down from the root. That makes "shift every range after an edit" a no-op
//! for untouched subtrees, which is what keeps [`Tree::edit`]
//! allocation-light. Nodes are never mutated; an edit produces a new root
//! referencing old subtrees by `Arc`.

pub mod cursor;

use std::ops::Range;
use std::sync::Arc;

use miette::NamedSource;
use serde::{Deserialize, Serialize};

use crate::errors::{ParseDiagnostic, ParseFault};
use crate::grammar::table::{RuleTable, SymbolId};
use crate::lexer::LexState;

pub use cursor::TreeCursor;

/// Per-node flags.
///
/// `has_fault` summarizes the subtree: it is set whenever the node or any
/// descendant is an error, missing, or damaged node, so tree consumers and
/// the reuse machinery can skip whole clean subtrees in one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Synthesized around input the grammar could not account for.
    pub error: bool,
    /// Zero-width stand-in for a required token that was not present.
    pub missing: bool,
    /// Trivia (whitespace, comments) attached between real tokens.
    pub extra: bool,
    /// Range bookkeeping destroyed by an edit; awaiting reparse.
    pub damaged: bool,
    /// Built while multiple GLR configurations were live; not safe to
    /// reuse wholesale during incremental reparse.
    pub fragile: bool,
    /// This node or some descendant is error/missing/damaged.
    pub has_fault: bool,
}

/// One immutable tree node. `len` is the byte length of the node's span;
/// children are contiguous, so `len` always equals the sum of child lengths
/// for interior nodes.
///
/// Equality is structural: symbol, length, user-visible flags and
/// children. The `lex_state`/`entry_state` bookkeeping and the `fragile`
/// bit only steer reuse and are excluded, so a reparsed tree compares
/// equal to a from-scratch parse of the same text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub symbol: SymbolId,
    pub len: usize,
    pub flags: NodeFlags,
    /// For leaves: the lexical state the token was scanned in.
    pub lex_state: LexState,
    /// The automaton state the parser was in when this node began; reuse
    /// during incremental reparse requires it to match again.
    pub entry_state: u32,
    pub children: Vec<Arc<SyntaxNode>>,
}

impl SyntaxNode {
    pub fn leaf(
        symbol: SymbolId,
        len: usize,
        lex_state: LexState,
        entry_state: u32,
        mut flags: NodeFlags,
    ) -> Arc<SyntaxNode> {
        flags.has_fault = flags.has_fault || flags.error || flags.missing || flags.damaged;
        Arc::new(SyntaxNode {
            symbol,
            len,
            flags,
            lex_state,
            entry_state,
            children: Vec::new(),
        })
    }

    pub fn interior(
        symbol: SymbolId,
        entry_state: u32,
        mut flags: NodeFlags,
        children: Vec<Arc<SyntaxNode>>,
    ) -> Arc<SyntaxNode> {
        let len = children.iter().map(|child| child.len).sum();
        flags.has_fault = flags.has_fault
            || flags.error
            || flags.missing
            || flags.damaged
            || children.iter().any(|child| child.flags.has_fault);
        Arc::new(SyntaxNode {
            symbol,
            len,
            flags,
            lex_state: LexState::DEFAULT,
            entry_state,
            children,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.len == other.len
            && self.flags.error == other.flags.error
            && self.flags.missing == other.flags.missing
            && self.flags.extra == other.flags.extra
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a == b)
    }
}

/// A damaged byte range, in post-edit coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DamageRange {
    pub start: usize,
    pub end: usize,
}

/// An immutable syntax tree for one version of a text buffer.
///
/// Cheap to clone and safe to share across threads; editing never mutates,
/// so callers may hold any number of versions simultaneously (for diffing)
/// at the cost of the retained shared subtrees.
#[derive(Debug, Clone)]
pub struct Tree {
    table: Arc<RuleTable>,
    root: Arc<SyntaxNode>,
    damage: Vec<DamageRange>,
}

impl Tree {
    pub(crate) fn new(table: Arc<RuleTable>, root: Arc<SyntaxNode>) -> Tree {
        Tree {
            table,
            root,
            damage: Vec::new(),
        }
    }

    pub(crate) fn with_damage(
        table: Arc<RuleTable>,
        root: Arc<SyntaxNode>,
        damage: Vec<DamageRange>,
    ) -> Tree {
        Tree {
            table,
            root,
            damage,
        }
    }

    pub fn root(&self) -> Node<'_> {
        Node {
            tree: self,
            node: &self.root,
            start: 0,
        }
    }

    /// Total byte length covered by the tree; always equals the length of
    /// the text it was parsed from.
    pub fn len(&self) -> usize {
        self.root.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.len == 0
    }

    pub fn walk(&self) -> TreeCursor<'_> {
        TreeCursor::new(self)
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub(crate) fn table_arc(&self) -> Arc<RuleTable> {
        Arc::clone(&self.table)
    }

    pub(crate) fn root_arc(&self) -> &Arc<SyntaxNode> {
        &self.root
    }

    pub(crate) fn damage(&self) -> &[DamageRange] {
        &self.damage
    }

    /// Render every absorbed error/missing node as a diagnostic against
    /// `source_text`. Parsing never fails; this is how the damage report
    /// reaches tooling.
    pub fn error_diagnostics(&self, source_name: &str, source_text: &str) -> Vec<ParseDiagnostic> {
        let source = Arc::new(NamedSource::new(source_name, source_text.to_string()));
        let mut out = Vec::new();
        collect_diagnostics(&self.table, &self.root, 0, &source, &mut out);
        out
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

fn collect_diagnostics(
    table: &RuleTable,
    node: &Arc<SyntaxNode>,
    start: usize,
    source: &Arc<NamedSource<String>>,
    out: &mut Vec<ParseDiagnostic>,
) {
    if !node.flags.has_fault {
        return;
    }
    if node.flags.missing {
        out.push(ParseDiagnostic::new(
            ParseFault::Missing {
                kind: table.symbol_name(node.symbol).to_string(),
            },
            Arc::clone(source),
            (start..start).into(),
        ));
        return;
    }
    if node.flags.error {
        out.push(ParseDiagnostic::new(
            ParseFault::Unexpected,
            Arc::clone(source),
            (start..start + node.len).into(),
        ));
        // An error node's children are part of the same fault.
        return;
    }
    let mut offset = start;
    for child in &node.children {
        collect_diagnostics(table, child, offset, source, out);
        offset += child.len;
    }
}

/// A lightweight handle to one node of a [`Tree`], carrying the absolute
/// byte position computed on the way down.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) node: &'a Arc<SyntaxNode>,
    pub(crate) start: usize,
}

impl<'a> Node<'a> {
    pub fn symbol(&self) -> SymbolId {
        self.node.symbol
    }

    /// Display name of the node's symbol.
    pub fn kind(&self) -> &'a str {
        self.tree.table.symbol_name(self.node.symbol)
    }

    /// Byte range `[start, end)` in the source this tree was parsed from.
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.node.len
    }

    pub fn len(&self) -> usize {
        self.node.len
    }

    pub fn is_empty(&self) -> bool {
        self.node.len == 0
    }

    pub fn is_error(&self) -> bool {
        self.node.flags.error
    }

    pub fn is_missing(&self) -> bool {
        self.node.flags.missing
    }

    pub fn is_extra(&self) -> bool {
        self.node.flags.extra
    }

    /// Whether this subtree contains any error or missing node.
    pub fn has_error(&self) -> bool {
        self.node.flags.has_fault
    }

    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    pub fn child_count(&self) -> usize {
        self.node.children.len()
    }

    pub fn child(&self, index: usize) -> Option<Node<'a>> {
        let mut start = self.start;
        for (position, child) in self.node.children.iter().enumerate() {
            if position == index {
                return Some(Node {
                    tree: self.tree,
                    node: child,
                    start,
                });
            }
            start += child.len;
        }
        None
    }

    pub fn last_child(&self) -> Option<Node<'a>> {
        if self.node.children.is_empty() {
            None
        } else {
            self.child(self.node.children.len() - 1)
        }
    }

    pub fn children(&self) -> NodeChildren<'a> {
        NodeChildren {
            tree: self.tree,
            children: &self.node.children,
            index: 0,
            start: self.start,
        }
    }

    /// First child whose kind name matches, mirroring lookup-by-key over
    /// the concrete tree.
    pub fn child_by_kind(&self, kind: &str) -> Option<Node<'a>> {
        self.children().find(|child| child.kind() == kind)
    }

    /// The node's text, sliced out of the source it was parsed from.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.range()]
    }

    /// S-expression rendering of the subtree, skipping extras. Handy in
    /// tests and debugging output.
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        write_sexp(self, &mut out);
        out
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:?}", self.kind(), self.range())
    }
}

fn write_sexp(node: &Node<'_>, out: &mut String) {
    if node.is_missing() {
        out.push_str("(MISSING ");
        out.push_str(node.kind());
        out.push(')');
        return;
    }
    if node.is_error() {
        out.push_str("(ERROR");
        for child in node.children() {
            if child.is_extra() {
                continue;
            }
            out.push(' ');
            write_sexp(&child, out);
        }
        out.push(')');
        return;
    }
    if node.is_leaf() {
        let kind = node.kind();
        let word = kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if word {
            out.push('(');
            out.push_str(kind);
            out.push(')');
        } else {
            out.push('"');
            out.push_str(kind);
            out.push('"');
        }
        return;
    }
    out.push('(');
    out.push_str(node.kind());
    for child in node.children() {
        if child.is_extra() {
            continue;
        }
        out.push(' ');
        write_sexp(&child, out);
    }
    out.push(')');
}

/// Iterator over a node's children with absolute positions.
pub struct NodeChildren<'a> {
    tree: &'a Tree,
    children: &'a [Arc<SyntaxNode>],
    index: usize,
    start: usize,
}

impl<'a> Iterator for NodeChildren<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let child = self.children.get(self.index)?;
        let node = Node {
            tree: self.tree,
            node: child,
            start: self.start,
        };
        self.index += 1;
        self.start += child.len;
        Some(node)
    }
}
