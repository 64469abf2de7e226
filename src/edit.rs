//! Edit descriptors and the pre-reparse tree transform.
//!
//! [`Tree::edit`] is step one of an incremental update: it produces a new
//! tree *shell* in post-edit coordinates without parsing anything. Because
//! nodes store lengths rather than absolute positions, only the spine of
//! nodes containing the edit is cloned; children that straddle the edit
//! collapse into a damaged placeholder and every other subtree is shared
//! untouched. [`crate::runtime::Parser::reparse`] then re-derives the
//! damaged region and splices clean subtrees back by reference.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grammar::table::SymbolId;
use crate::lexer::LexState;
use crate::tree::{DamageRange, NodeFlags, SyntaxNode, Tree};

/// A row/column position, for collaborators that track line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Point {
        Point { row, column }
    }
}

/// One contiguous text replacement: the bytes `[start_byte, old_end_byte)`
/// were replaced by new bytes ending at `new_end_byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_point: Point,
    pub old_end_point: Point,
    pub new_end_point: Point,
}

impl InputEdit {
    /// Convenience constructor for byte-oriented callers; points default to
    /// zero and are carried through untouched.
    pub fn replacement(start_byte: usize, old_end_byte: usize, new_end_byte: usize) -> InputEdit {
        InputEdit {
            start_byte,
            old_end_byte,
            new_end_byte,
            start_point: Point::default(),
            old_end_point: Point::default(),
            new_end_point: Point::default(),
        }
    }

    fn delta(&self) -> isize {
        self.new_end_byte as isize - self.old_end_byte as isize
    }
}

impl Tree {
    /// Apply an edit descriptor, producing a new tree shell in post-edit
    /// coordinates. The original tree is untouched and remains valid for
    /// the pre-edit text.
    ///
    /// Applying a sequence of edits means calling this once per edit, each
    /// call on the previous result, before a single reparse.
    pub fn edit(&self, edit: &InputEdit) -> Tree {
        debug_assert!(edit.start_byte <= edit.old_end_byte);
        debug_assert!(edit.start_byte <= edit.new_end_byte);
        debug_assert!(edit.old_end_byte <= self.len());

        // A descriptor that neither removes nor inserts anything.
        if edit.start_byte == edit.old_end_byte && edit.old_end_byte == edit.new_end_byte {
            return self.clone();
        }

        let root = edit_node(self.root_arc(), 0, edit);
        let damage = shift_damage(self.damage(), edit);
        Tree::with_damage(self.table_arc(), root, damage)
    }
}

/// Clone the spine containing the edit, adjusting lengths by the byte
/// delta. Precondition: `node`'s span contains `[start, old_end]`.
fn edit_node(node: &Arc<SyntaxNode>, abs_start: usize, edit: &InputEdit) -> Arc<SyntaxNode> {
    let delta = edit.delta();
    if node.is_leaf() {
        return damaged_placeholder(adjusted(node.len, delta));
    }

    let start = edit.start_byte;
    let old_end = edit.old_end_byte;

    // Locate the run of children overlapping the edited bytes.
    let mut offset = abs_start;
    let mut run_begin = node.children.len();
    let mut run_end = node.children.len();
    let mut run_len = 0;
    let mut insert_at = 0;
    for (index, child) in node.children.iter().enumerate() {
        let child_start = offset;
        let child_end = offset + child.len;
        let overlaps = if start == old_end {
            child_start < start && start < child_end
        } else {
            child_start < old_end && child_end > start
        };
        if overlaps {
            if run_begin == node.children.len() {
                run_begin = index;
            }
            run_end = index + 1;
            run_len += child.len;
        }
        if child_start < start {
            insert_at = index + 1;
        }
        offset = child_end;
    }

    let mut children = Vec::with_capacity(node.children.len() + 1);
    if run_begin < run_end {
        let run_is_one = run_end - run_begin == 1;
        let child = &node.children[run_begin];
        let child_start = child_abs_start(node, abs_start, run_begin);
        let contains = child_start <= start && old_end <= child_start + child.len;
        children.extend(node.children[..run_begin].iter().cloned());
        if run_is_one && contains {
            children.push(edit_node(child, child_start, edit));
        } else {
            children.push(damaged_placeholder(adjusted(run_len, delta)));
        }
        children.extend(node.children[run_end..].iter().cloned());
    } else {
        // Nothing overlaps: an insertion exactly on a child boundary (or a
        // zero-width subtree). Splice in a placeholder covering the new
        // bytes.
        let insert_at = insert_at.min(node.children.len());
        children.extend(node.children[..insert_at].iter().cloned());
        children.push(damaged_placeholder(adjusted(0, delta)));
        children.extend(node.children[insert_at..].iter().cloned());
    }

    let mut flags = node.flags;
    flags.has_fault = false; // recomputed by the constructor
    SyntaxNode::interior(node.symbol, node.entry_state, flags, children)
}

fn child_abs_start(node: &Arc<SyntaxNode>, abs_start: usize, index: usize) -> usize {
    abs_start
        + node.children[..index]
            .iter()
            .map(|child| child.len)
            .sum::<usize>()
}

fn adjusted(len: usize, delta: isize) -> usize {
    let adjusted = len as isize + delta;
    debug_assert!(adjusted >= 0);
    adjusted.max(0) as usize
}

fn damaged_placeholder(len: usize) -> Arc<SyntaxNode> {
    SyntaxNode::leaf(
        SymbolId::ERROR,
        len,
        LexState::DEFAULT,
        0,
        NodeFlags {
            damaged: true,
            ..NodeFlags::default()
        },
    )
}

/// Carry forward previous damage in post-edit coordinates and record the
/// new range, merging overlaps.
fn shift_damage(previous: &[DamageRange], edit: &InputEdit) -> Vec<DamageRange> {
    let delta = edit.delta();
    let mut fresh = DamageRange {
        start: edit.start_byte,
        end: edit.new_end_byte,
    };
    let mut out = Vec::with_capacity(previous.len() + 1);
    for range in previous {
        if range.end <= edit.start_byte {
            out.push(*range);
        } else if range.start >= edit.old_end_byte {
            out.push(DamageRange {
                start: adjusted(range.start, delta),
                end: adjusted(range.end, delta),
            });
        } else {
            // Overlapping damage merges into the new range.
            fresh.start = fresh.start.min(range.start);
            let shifted_end = if range.end >= edit.old_end_byte {
                adjusted(range.end, delta)
            } else {
                edit.new_end_byte
            };
            fresh.end = fresh.end.max(shifted_end);
        }
    }
    out.push(fresh);
    out.sort_by_key(|range| range.start);
    out
}
