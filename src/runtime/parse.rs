//! The generalized parse loop.
//!
//! One pass over the text, driven by the rule table. Each iteration either
//! splices a reusable subtree from the previous tree, attaches an extra,
//! or lexes one token and runs it through reduce, shift, and (if nothing
//! shifts) recovery. Unresolved table conflicts fork the configuration
//! set; forks that reconverge are merged and the earliest one wins, so the
//! whole pass is deterministic. At end of input the surviving stack is
//! folded into a single root that spans every byte of the text.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::errors::{CancelReason, Cancelled};
use crate::grammar::table::{Action, RuleTable, SymbolId};
use crate::lexer::{LexFault, LexState, Lexer, ScannerSet};
use crate::tree::{NodeFlags, SyntaxNode, Tree};

use super::config::{merge_and_cap, valid_externals, Config};
use super::recovery::{self, Recovery};
use super::reuse::{ReusePush, ReuseSource};
use super::{ParseOptions, EOF_MISSING_CAP, MAX_CONFIGS, REDUCE_STEP_CAP};

pub(crate) fn run(
    table: &Arc<RuleTable>,
    lexer: &Lexer,
    scanners: &ScannerSet,
    text: &str,
    old_tree: Option<&Tree>,
    options: &ParseOptions,
) -> Result<Tree, Cancelled> {
    let source = old_tree.map(ReuseSource::new);
    let mut configs = vec![Config::default()];
    let mut pos = 0usize;
    let mut lex_state = LexState::DEFAULT;
    let mut steps: u64 = 0;
    // Insertion is attempted at most once per position, so recovery can
    // never loop without consuming input.
    let mut last_insert_pos: Option<usize> = None;

    loop {
        check_cancel(options, &mut steps)?;

        // Whole-subtree reuse from the previous tree. Only meaningful in a
        // deterministic context, hence single-configuration only.
        if configs.len() == 1 {
            if let Some(src) = &source {
                let top = configs[0].top_state();
                if let Some(found) = src.best_at(pos, top, lex_state, table) {
                    match found.push {
                        ReusePush::Transparent => {
                            configs[0].push_transparent(Arc::clone(&found.node))
                        }
                        ReusePush::State(state) => {
                            configs[0].push(state, Arc::clone(&found.node))
                        }
                    }
                    pos += found.node.len;
                    if let Some(resume) = found.resume_lex_state {
                        lex_state = resume;
                    }
                    continue;
                }
            }
        }

        let externals = valid_externals(table, &configs);
        match lexer.next_token(text, pos, lex_state, scanners, &externals) {
            Ok((token, next_state)) => {
                if table.is_extra(token.symbol) {
                    let leaf = SyntaxNode::leaf(
                        token.symbol,
                        token.len(),
                        token.lex_state,
                        0,
                        NodeFlags {
                            extra: true,
                            ..NodeFlags::default()
                        },
                    );
                    for config in &mut configs {
                        config.push_transparent(Arc::clone(&leaf));
                    }
                    pos = token.end;
                    lex_state = next_state;
                    continue;
                }

                configs = reduce_phase(table, configs, token.symbol);

                let mut shifted = Vec::new();
                for config in &configs {
                    let state = config.top_state();
                    for action in table.actions(state, token.symbol) {
                        if let Action::Shift(target) = action {
                            let leaf = SyntaxNode::leaf(
                                token.symbol,
                                token.len(),
                                token.lex_state,
                                state,
                                NodeFlags::default(),
                            );
                            let mut next = config.clone();
                            next.push(*target, leaf);
                            shifted.push(next);
                            break;
                        }
                    }
                }

                if shifted.is_empty() {
                    let allow_insert = last_insert_pos != Some(pos);
                    let stalled = settle_reduces(table, configs);
                    match recovery::recover(
                        table,
                        lexer,
                        scanners,
                        text,
                        stalled,
                        token,
                        next_state,
                        allow_insert,
                    ) {
                        Recovery::Inserted(rescued) => {
                            last_insert_pos = Some(pos);
                            configs = rescued;
                        }
                        Recovery::Skipped {
                            configs: rescued,
                            pos: next_pos,
                            lex_state: next_lex,
                        } => {
                            configs = rescued;
                            pos = next_pos;
                            lex_state = next_lex;
                        }
                    }
                } else {
                    configs = merge_and_cap(shifted);
                    pos = token.end;
                    lex_state = next_state;
                }
            }
            Err(LexFault::NoViableToken) => {
                // One character the grammar's lexicon cannot express.
                let width = recovery::char_width(text, pos);
                let leaf = SyntaxNode::leaf(
                    SymbolId::ERROR,
                    width,
                    lex_state,
                    0,
                    NodeFlags {
                        error: true,
                        ..NodeFlags::default()
                    },
                );
                for config in &mut configs {
                    config.push_transparent(Arc::clone(&leaf));
                }
                pos += width;
            }
            Err(LexFault::EndOfInput) => {
                configs = reduce_phase(table, configs, SymbolId::END);
                let root = finish(table, configs, lex_state);
                debug_assert_eq!(root.len, text.len());
                return Ok(Tree::new(Arc::clone(table), root));
            }
        }
    }
}

fn check_cancel(options: &ParseOptions, steps: &mut u64) -> Result<(), Cancelled> {
    *steps += 1;
    if let Some(budget) = options.step_budget {
        if *steps > budget {
            return Err(Cancelled {
                reason: CancelReason::BudgetExhausted,
            });
        }
    }
    if let Some(flag) = &options.cancel_flag {
        if flag.load(Ordering::Relaxed) {
            return Err(Cancelled {
                reason: CancelReason::FlagRaised,
            });
        }
    }
    Ok(())
}

/// Apply every available reduction under `lookahead`, forking on conflict
/// cells. Configurations that can shift or accept (or are stuck) land in
/// the output; a configuration whose only moves are reductions is replaced
/// by its reducts. Bounded so cyclic zero-width reductions cannot spin.
fn reduce_phase(table: &RuleTable, configs: Vec<Config>, lookahead: SymbolId) -> Vec<Config> {
    let cap = MAX_CONFIGS * REDUCE_STEP_CAP;
    let fallback = configs.first().cloned();
    let mut queue: VecDeque<Config> = configs.into();
    let mut out: Vec<Config> = Vec::new();
    let mut iterations = 0usize;
    while let Some(config) = queue.pop_front() {
        iterations += 1;
        if iterations > cap {
            out.push(config);
            continue;
        }
        let actions = table.actions(config.top_state(), lookahead);
        let reduces: Vec<u32> = actions
            .iter()
            .filter_map(|action| match action {
                Action::Reduce(production) => Some(*production),
                _ => None,
            })
            .collect();
        let blocking = actions
            .iter()
            .any(|action| matches!(action, Action::Shift(_) | Action::Accept));
        if blocking || reduces.is_empty() {
            out.push(config.clone());
        }
        // Nodes built while more than one configuration is live (or while
        // forking right now) are unsafe to reuse incrementally.
        let fragile = !out.is_empty() || !queue.is_empty() || reduces.len() > 1;
        for production in reduces {
            if let Some(next) = config.apply_reduce(production, table, fragile) {
                queue.push_back(next);
            }
        }
    }
    if out.is_empty() {
        // Every configuration died mid-reduction; keep one for recovery.
        return fallback.into_iter().collect();
    }
    merge_and_cap(out)
}

/// Apply the reductions a stalled configuration can still make, regardless
/// of lookahead. A fresh parse defers a reduction until the lookahead
/// demands it, while a reparse may splice the already-reduced subtree from
/// the old tree; if the next token is consumable by neither stack, they
/// would enter recovery in different states and repair differently.
/// Settling folds both to the same states before recovery runs. Stops at
/// any state that could shift or accept something.
fn settle_reduces(table: &RuleTable, configs: Vec<Config>) -> Vec<Config> {
    let cap = MAX_CONFIGS * REDUCE_STEP_CAP;
    let mut queue: VecDeque<Config> = configs.into();
    let mut out: Vec<Config> = Vec::new();
    let mut iterations = 0usize;
    while let Some(config) = queue.pop_front() {
        iterations += 1;
        let row = &table.states[config.top_state() as usize].actions;
        let can_advance = row
            .values()
            .flatten()
            .any(|action| matches!(action, Action::Shift(_) | Action::Accept));
        let mut productions: Vec<u32> = row
            .values()
            .flatten()
            .filter_map(|action| match action {
                Action::Reduce(production) => Some(*production),
                _ => None,
            })
            .collect();
        productions.sort_unstable();
        productions.dedup();
        if can_advance || productions.is_empty() || iterations > cap {
            out.push(config);
            continue;
        }
        let fragile = !out.is_empty() || !queue.is_empty() || productions.len() > 1;
        let mut reduced = false;
        for production in &productions {
            if let Some(next) = config.apply_reduce(*production, table, fragile) {
                queue.push_back(next);
                reduced = true;
            }
        }
        if !reduced {
            out.push(config);
        }
    }
    merge_and_cap(out)
}

fn accepts(table: &RuleTable, config: &Config) -> bool {
    table
        .actions(config.top_state(), SymbolId::END)
        .iter()
        .any(|action| matches!(action, Action::Accept))
}

/// Fold the surviving configurations into a root node covering the whole
/// text: the earliest accepting configuration if any, otherwise a bounded
/// run of MISSING insertions to close open constructs, otherwise an ERROR
/// root holding whatever was parsed.
fn finish(table: &RuleTable, configs: Vec<Config>, lex_state: LexState) -> Arc<SyntaxNode> {
    if let Some(config) = configs.iter().find(|config| accepts(table, config)) {
        return weave_root(config.clone());
    }

    // Reductions the end-of-input lookahead did not license still need to
    // run, for the same reason recovery settles mid-parse.
    let settled = settle_reduces(table, configs);
    if let Some(config) = settled.iter().find(|config| accepts(table, config)) {
        return weave_root(config.clone());
    }

    let mut config = settled.into_iter().next().unwrap_or_default();
    for _ in 0..EOF_MISSING_CAP {
        let state = config.top_state();
        let Some((symbol, target)) =
            recovery::insertable_terminal(table, state, Some(SymbolId::END))
        else {
            break;
        };
        let leaf = SyntaxNode::leaf(
            symbol,
            0,
            lex_state,
            state,
            NodeFlags {
                missing: true,
                ..NodeFlags::default()
            },
        );
        config.push(target, leaf);
        let reduced = reduce_phase(table, vec![config], SymbolId::END);
        if let Some(done) = reduced.iter().find(|config| accepts(table, config)) {
            return weave_root(done.clone());
        }
        match reduced.into_iter().next() {
            Some(next) => config = next,
            None => return error_root(Vec::new()),
        }
    }
    error_root(config.stack.into_iter().map(|entry| entry.node).collect())
}

/// An accepted stack is one start node plus any extras lexed before or
/// after it; weave those extras into the root so it spans the whole text.
fn weave_root(config: Config) -> Arc<SyntaxNode> {
    let mut leading = Vec::new();
    let mut trailing = Vec::new();
    let mut opaque = Vec::new();
    for entry in config.stack {
        if entry.transparent {
            if opaque.is_empty() {
                leading.push(entry.node);
            } else {
                trailing.push(entry.node);
            }
        } else {
            opaque.push(entry.node);
        }
    }
    if opaque.len() != 1 {
        let mut nodes = leading;
        nodes.extend(opaque);
        nodes.extend(trailing);
        return error_root(nodes);
    }
    let main = opaque.remove(0);
    if leading.is_empty() && trailing.is_empty() {
        return main;
    }
    let mut children = leading;
    if main.is_leaf() {
        children.push(Arc::clone(&main));
    } else {
        children.extend(main.children.iter().cloned());
    }
    children.extend(trailing);
    let mut flags = main.flags;
    flags.has_fault = false;
    SyntaxNode::interior(main.symbol, 0, flags, children)
}

fn error_root(nodes: Vec<Arc<SyntaxNode>>) -> Arc<SyntaxNode> {
    SyntaxNode::interior(
        SymbolId::ERROR,
        0,
        NodeFlags {
            error: true,
            ..NodeFlags::default()
        },
        nodes,
    )
}
