//! Parse-stack configurations for generalized parsing.
//!
//! A configuration is one shift-reduce stack: alternating automaton states
//! and partially built nodes. The runtime keeps a small ordered set of
//! them, forking on unresolved table conflicts and merging (by keeping the
//! earlier, higher-priority one) when state stacks reconverge.
//! Configurations exist only during an active parse.

use std::collections::HashSet;
use std::sync::Arc;

use crate::grammar::table::{RuleTable, SymbolId};
use crate::tree::{NodeFlags, SyntaxNode};

use super::MAX_CONFIGS;

/// One stack slot. Transparent entries (extras, absorbed error text) ride
/// along without changing the automaton state and without counting toward a
/// production's right-hand side.
#[derive(Debug, Clone)]
pub(crate) struct StackEntry {
    pub state: u32,
    pub node: Arc<SyntaxNode>,
    pub transparent: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Config {
    pub stack: Vec<StackEntry>,
}

impl Config {
    pub fn top_state(&self) -> u32 {
        self.stack.last().map(|entry| entry.state).unwrap_or(0)
    }

    pub fn push(&mut self, state: u32, node: Arc<SyntaxNode>) {
        self.stack.push(StackEntry {
            state,
            node,
            transparent: false,
        });
    }

    /// Push an extra or absorbed-error node without changing state.
    pub fn push_transparent(&mut self, node: Arc<SyntaxNode>) {
        let state = self.top_state();
        self.stack.push(StackEntry {
            state,
            node,
            transparent: true,
        });
    }

    /// Identity for merging: the state stack with spans, ignoring node
    /// contents. Two configurations with equal signatures accept exactly
    /// the same continuations.
    pub fn signature(&self) -> Vec<(u32, usize, bool)> {
        self.stack
            .iter()
            .map(|entry| (entry.state, entry.node.len, entry.transparent))
            .collect()
    }

    /// Reduce by `production`, building the node bottom-up. Returns `None`
    /// when the stack cannot satisfy the production (possible after
    /// recovery mangled a region), which kills this configuration.
    pub fn apply_reduce(
        &self,
        production: u32,
        table: &RuleTable,
        fragile: bool,
    ) -> Option<Config> {
        let rule = &table.productions[production as usize];
        let rhs_len = rule.rhs.len();
        let mut stack = self.stack.clone();

        // Trailing transparent entries belong to the *next* sibling region,
        // not to this node; hold them aside and restore them on top.
        let mut held: Vec<StackEntry> = Vec::new();
        if rhs_len > 0 {
            while stack.last().map_or(false, |entry| entry.transparent) {
                held.push(stack.pop()?);
            }
        }

        let mut picked: Vec<Arc<SyntaxNode>> = Vec::new();
        let mut remaining = rhs_len;
        while remaining > 0 {
            let entry = stack.pop()?;
            if !entry.transparent {
                remaining -= 1;
            }
            picked.push(entry.node);
        }
        picked.reverse();

        // Hidden (auxiliary) nodes dissolve into their children here, so
        // the finished tree only ever contains visible symbols.
        let mut children = Vec::with_capacity(picked.len());
        for node in picked {
            if table.is_visible(node.symbol) {
                children.push(node);
            } else {
                children.extend(node.children.iter().cloned());
            }
        }

        let below = stack.last().map(|entry| entry.state).unwrap_or(0);
        let target = table.goto(below, rule.lhs)?;
        let node = SyntaxNode::interior(
            rule.lhs,
            below,
            NodeFlags {
                fragile,
                ..NodeFlags::default()
            },
            children,
        );
        stack.push(StackEntry {
            state: target,
            node,
            transparent: false,
        });
        for entry in held.into_iter().rev() {
            stack.push(StackEntry {
                state: target,
                node: entry.node,
                transparent: true,
            });
        }
        Some(Config { stack })
    }
}

/// Deduplicate by signature, keeping the earliest (highest-priority)
/// configuration, and cap the live set. Order in, order out: the result is
/// a pure function of the input sequence.
pub(crate) fn merge_and_cap(configs: Vec<Config>) -> Vec<Config> {
    let mut seen: HashSet<Vec<(u32, usize, bool)>> = HashSet::new();
    let mut out = Vec::new();
    for config in configs {
        if seen.insert(config.signature()) {
            out.push(config);
            if out.len() == MAX_CONFIGS {
                break;
            }
        }
    }
    out
}

/// External terminals any live configuration could currently consume; the
/// lexer consults registered scanners for exactly these.
pub(crate) fn valid_externals(table: &RuleTable, configs: &[Config]) -> Vec<SymbolId> {
    let mut out = Vec::new();
    for &symbol in &table.external_symbols {
        let viable = configs
            .iter()
            .any(|config| !table.actions(config.top_state(), symbol).is_empty());
        if viable && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}
