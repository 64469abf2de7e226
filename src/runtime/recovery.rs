//! Error recovery.
//!
//! Recovery runs when no live configuration can shift the current token.
//! The policy, in order:
//!
//! 1. Insert one zero-width MISSING stand-in for a terminal that some
//!    configuration could shift, provided the real token becomes
//!    consumable afterwards. The parse collapses to that configuration.
//! 2. Otherwise scan ahead a bounded number of tokens for one that some
//!    configuration can act on, and absorb everything before it into an
//!    ERROR node that rides the stack without changing state.
//! 3. Otherwise absorb just the offending token and try again.
//!
//! Every step consumes input or is attempted at most once per position, so
//! recovery always terminates; in the worst case the whole rest of the
//! input ends up under one ERROR node.

use crate::grammar::table::{Action, RuleTable, SymbolId, SymbolKind};
use crate::lexer::{LexFault, LexState, Lexer, ScannerSet, Token};
use crate::tree::{NodeFlags, SyntaxNode};

use super::config::Config;
use super::RECOVERY_HORIZON;

/// What recovery did; the main loop resumes accordingly.
pub(crate) enum Recovery {
    /// A zero-width stand-in was pushed. The offending token was not
    /// consumed; retry it.
    Inserted(Vec<Config>),
    /// Bytes up to `pos` were absorbed into an ERROR node on every stack.
    Skipped {
        configs: Vec<Config>,
        pos: usize,
        lex_state: LexState,
    },
}

pub(crate) fn recover(
    table: &RuleTable,
    lexer: &Lexer,
    scanners: &ScannerSet,
    text: &str,
    mut configs: Vec<Config>,
    token: Token,
    lex_state_after_token: LexState,
    allow_insert: bool,
) -> Recovery {
    if allow_insert {
        for config in &configs {
            let state = config.top_state();
            if let Some((symbol, target)) =
                insertable_terminal(table, state, Some(token.symbol))
            {
                let mut chosen = config.clone();
                let leaf = SyntaxNode::leaf(
                    symbol,
                    0,
                    token.lex_state,
                    state,
                    NodeFlags {
                        missing: true,
                        ..NodeFlags::default()
                    },
                );
                chosen.push(target, leaf);
                return Recovery::Inserted(vec![chosen]);
            }
        }
    }

    // Scan ahead for a token some configuration can act on. Extras do not
    // count against the horizon; external scanners are not consulted while
    // scanning damaged text.
    let mut scan_pos = token.end;
    let mut scan_state = lex_state_after_token;
    let mut seen = 0;
    while seen < RECOVERY_HORIZON {
        match lexer.next_token(text, scan_pos, scan_state, scanners, &[]) {
            Ok((ahead, next_state)) => {
                if !table.is_extra(ahead.symbol) {
                    let consumable = configs.iter().any(|config| {
                        !table.actions(config.top_state(), ahead.symbol).is_empty()
                    });
                    if consumable {
                        absorb(&mut configs, token.start, ahead.start, token.lex_state);
                        return Recovery::Skipped {
                            configs,
                            pos: ahead.start,
                            lex_state: ahead.lex_state,
                        };
                    }
                    seen += 1;
                }
                scan_pos = ahead.end;
                scan_state = next_state;
            }
            Err(LexFault::EndOfInput) => {
                absorb(&mut configs, token.start, text.len(), token.lex_state);
                return Recovery::Skipped {
                    configs,
                    pos: text.len(),
                    lex_state: scan_state,
                };
            }
            Err(LexFault::NoViableToken) => {
                scan_pos += char_width(text, scan_pos);
            }
        }
    }

    // Horizon exhausted: absorb the one offending token and carry on.
    absorb(&mut configs, token.start, token.end, token.lex_state);
    Recovery::Skipped {
        configs,
        pos: token.end,
        lex_state: lex_state_after_token,
    }
}

/// The lowest-numbered terminal shiftable from `state`, optionally
/// requiring that the state reached can act on `then`. Used for MISSING
/// insertion; the symbol-id order makes the choice deterministic.
pub(crate) fn insertable_terminal(
    table: &RuleTable,
    state: u32,
    then: Option<SymbolId>,
) -> Option<(SymbolId, u32)> {
    let actions = &table.states[state as usize].actions;
    for (&symbol, cell) in actions {
        if symbol == SymbolId::END || symbol == SymbolId::ERROR || table.is_extra(symbol) {
            continue;
        }
        if table.symbol(symbol).kind != SymbolKind::Terminal {
            continue;
        }
        let Some(target) = cell.iter().find_map(|action| match action {
            Action::Shift(target) => Some(*target),
            _ => None,
        }) else {
            continue;
        };
        if let Some(lookahead) = then {
            if table.actions(target, lookahead).is_empty() {
                continue;
            }
        }
        return Some((symbol, target));
    }
    None
}

/// Wrap `[start, end)` in an ERROR leaf and push it transparently on every
/// stack.
fn absorb(configs: &mut [Config], start: usize, end: usize, lex_state: LexState) {
    let leaf = SyntaxNode::leaf(
        SymbolId::ERROR,
        end - start,
        lex_state,
        0,
        NodeFlags {
            error: true,
            ..NodeFlags::default()
        },
    );
    for config in configs.iter_mut() {
        config.push_transparent(leaf.clone());
    }
}

/// Width in bytes of the character at `pos`, for stepping over unlexable
/// input without splitting a UTF-8 sequence.
pub(crate) fn char_width(text: &str, pos: usize) -> usize {
    text[pos..].chars().next().map(char::len_utf8).unwrap_or(1)
}
