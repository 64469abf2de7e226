//! Stateful tree navigation.
//!
//! Nodes carry no parent pointers (they are shared across tree versions),
//! so upward navigation goes through a cursor that remembers the path it
//! took down.

use std::sync::Arc;

use crate::tree::{Node, SyntaxNode, Tree};

struct Frame<'a> {
    node: &'a Arc<SyntaxNode>,
    start: usize,
    index_in_parent: usize,
}

/// A cursor over one [`Tree`], positioned at a single node.
pub struct TreeCursor<'a> {
    tree: &'a Tree,
    path: Vec<Frame<'a>>,
}

impl<'a> TreeCursor<'a> {
    pub(crate) fn new(tree: &'a Tree) -> TreeCursor<'a> {
        TreeCursor {
            tree,
            path: vec![Frame {
                node: tree.root_arc(),
                start: 0,
                index_in_parent: 0,
            }],
        }
    }

    /// The node the cursor currently points at.
    pub fn node(&self) -> Node<'a> {
        // The path is never empty; the root frame is permanent.
        let frame = &self.path[self.path.len() - 1];
        Node {
            tree: self.tree,
            node: frame.node,
            start: frame.start,
        }
    }

    /// Descend to the first child. Returns false at a leaf.
    pub fn goto_first_child(&mut self) -> bool {
        let frame = &self.path[self.path.len() - 1];
        let Some(child) = frame.node.children.first() else {
            return false;
        };
        let start = frame.start;
        self.path.push(Frame {
            node: child,
            start,
            index_in_parent: 0,
        });
        true
    }

    /// Move to the next sibling. Returns false at the last child or at the
    /// root.
    pub fn goto_next_sibling(&mut self) -> bool {
        if self.path.len() < 2 {
            return false;
        }
        let parent = &self.path[self.path.len() - 2];
        let current = &self.path[self.path.len() - 1];
        let next_index = current.index_in_parent + 1;
        let Some(next) = parent.node.children.get(next_index) else {
            return false;
        };
        let start = current.start + current.node.len;
        let frame = Frame {
            node: next,
            start,
            index_in_parent: next_index,
        };
        *self.path.last_mut().expect("cursor path is never empty") = frame;
        true
    }

    /// Ascend to the parent. Returns false at the root.
    pub fn goto_parent(&mut self) -> bool {
        if self.path.len() < 2 {
            return false;
        }
        self.path.pop();
        true
    }

    /// Descend to the leaf containing `byte`, or the deepest node whose
    /// range contains it.
    pub fn goto_byte(&mut self, byte: usize) -> Node<'a> {
        // Restart from the root; cheap because frames are just references.
        self.path.truncate(1);
        loop {
            let frame = &self.path[self.path.len() - 1];
            let mut offset = frame.start;
            let mut descended = false;
            for (index, child) in frame.node.children.iter().enumerate() {
                if byte < offset + child.len || (child.len == 0 && byte == offset) {
                    self.path.push(Frame {
                        node: child,
                        start: offset,
                        index_in_parent: index,
                    });
                    descended = true;
                    break;
                }
                offset += child.len;
            }
            if !descended {
                return self.node();
            }
        }
    }

    /// Walk up from the current node looking for an ancestor of the given
    /// kind, moving the cursor there if found.
    pub fn goto_ancestor_of_kind(&mut self, kind: &str) -> bool {
        for popped in 1..self.path.len() {
            let frame = &self.path[self.path.len() - 1 - popped];
            let name = self.tree.table().symbol_name(frame.node.symbol);
            if name == kind {
                self.path.truncate(self.path.len() - popped);
                return true;
            }
        }
        false
    }
}
