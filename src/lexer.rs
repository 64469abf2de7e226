//! Tokenization.
//!
//! The lexer turns a text buffer plus a cursor into typed tokens. Regular
//! terminals are matched with anchored DFA searches; the longest match wins
//! and ties break toward the earliest-declared terminal. Irregular tokens
//! (indentation, nested delimiters) come from caller-registered external
//! scanners dispatched by symbol id. Lexing is resumable from any
//! `(position, LexState)` pair, which is what lets an incremental reparse
//! avoid re-lexing unaffected regions.

use std::collections::HashMap;
use std::sync::Arc;

use regex_automata::dfa::dense;
use regex_automata::dfa::{Automaton, StartKind};
use regex_automata::{Anchored, Input, MatchKind};
use serde::{Deserialize, Serialize};

use crate::grammar::table::{RuleTable, SymbolId, TokenPattern};

/// Opaque lexical-state tag.
///
/// `LexState::DEFAULT` covers all regular tokens; external scanners may
/// thread their own values through to resume correctly mid-construct
/// (string bodies, nesting depth) after an edit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct LexState(pub u32);

impl LexState {
    pub const DEFAULT: LexState = LexState(0);
}

/// A lexed token: a symbol id plus the byte range it covers. The carried
/// `lex_state` is the state the lexer was in at `start`, so a reparse can
/// resume exactly there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: SymbolId,
    pub start: usize,
    pub end: usize,
    pub lex_state: LexState,
}

impl Token {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Why the lexer produced no token. Neither case is a hard failure for a
/// parse: `EndOfInput` switches the runtime to end-of-input reductions and
/// `NoViableToken` is absorbed via error recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexFault {
    EndOfInput,
    NoViableToken,
}

/// A successful external scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalMatch {
    pub symbol: SymbolId,
    /// Exclusive end of the scanned bytes; must advance past the cursor.
    pub end: usize,
    /// State to resume the scanner with after this token.
    pub state: LexState,
}

/// Capability interface for tokens no regular pattern can express.
///
/// Scanners are registered on the [`crate::runtime::Parser`] by external
/// token name and invoked by symbol id whenever the grammar designates one
/// of their symbols as viable at the current position.
pub trait ExternalScanner: Send + Sync {
    /// Attempt to scan one token at `pos`. `valid` lists the external
    /// symbols the parser could currently consume. Returning `None` lets
    /// regular lexing proceed.
    fn scan(
        &self,
        text: &str,
        pos: usize,
        state: LexState,
        valid: &[SymbolId],
    ) -> Option<ExternalMatch>;
}

/// Registered external scanners, keyed by symbol.
#[derive(Default)]
pub struct ScannerSet {
    by_symbol: HashMap<SymbolId, Box<dyn ExternalScanner>>,
}

impl ScannerSet {
    pub fn register(&mut self, symbol: SymbolId, scanner: Box<dyn ExternalScanner>) {
        self.by_symbol.insert(symbol, scanner);
    }

    pub fn get(&self, symbol: SymbolId) -> Option<&dyn ExternalScanner> {
        self.by_symbol.get(&symbol).map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

impl std::fmt::Debug for ScannerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerSet")
            .field("symbols", &self.by_symbol.keys().collect::<Vec<_>>())
            .finish()
    }
}

enum CompiledPattern {
    Literal(String),
    Regex(Box<dense::DFA<Vec<u32>>>),
    /// Dispatched through the scanner set, or a pattern that failed to
    /// build (ruled out earlier by grammar validation, kept inert here).
    Unmatchable,
}

/// A tokenizer for one rule table. Stateless between calls; all cursor
/// state lives in the `(pos, LexState)` pair the caller threads through.
pub struct Lexer {
    table: Arc<RuleTable>,
    compiled: Vec<(SymbolId, CompiledPattern)>,
}

impl Lexer {
    pub fn new(table: Arc<RuleTable>) -> Self {
        let compiled = table
            .patterns
            .iter()
            .map(|(symbol, pattern)| {
                let compiled = match pattern {
                    TokenPattern::Literal(text) => CompiledPattern::Literal(text.clone()),
                    // All-matches DFAs: an anchored forward search reports
                    // the furthest accepting end, so an alternation inside
                    // one pattern yields the longest alternative rather
                    // than the first-listed one.
                    TokenPattern::Regex(pattern) => {
                        let built = dense::Builder::new()
                            .configure(
                                dense::Config::new()
                                    .match_kind(MatchKind::All)
                                    .start_kind(StartKind::Anchored),
                            )
                            .build(pattern);
                        match built {
                            Ok(dfa) => CompiledPattern::Regex(Box::new(dfa)),
                            Err(_) => CompiledPattern::Unmatchable,
                        }
                    }
                    TokenPattern::External => CompiledPattern::Unmatchable,
                };
                (*symbol, compiled)
            })
            .collect();
        Self { table, compiled }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Produce the next token at `pos`.
    ///
    /// External scanners for the `valid_external` symbols run first, in
    /// declaration order; among regular terminals the longest match wins
    /// and equal lengths go to the earliest-declared pattern.
    pub fn next_token(
        &self,
        text: &str,
        pos: usize,
        state: LexState,
        scanners: &ScannerSet,
        valid_external: &[SymbolId],
    ) -> Result<(Token, LexState), LexFault> {
        if pos >= text.len() {
            return Err(LexFault::EndOfInput);
        }

        for &symbol in valid_external {
            let Some(scanner) = scanners.get(symbol) else {
                continue;
            };
            if let Some(found) = scanner.scan(text, pos, state, valid_external) {
                // Zero-width external tokens would stall the parse loop.
                if found.end > pos && found.end <= text.len() {
                    let token = Token {
                        symbol: found.symbol,
                        start: pos,
                        end: found.end,
                        lex_state: state,
                    };
                    return Ok((token, found.state));
                }
            }
        }

        let mut best: Option<(SymbolId, usize)> = None;
        for (symbol, compiled) in &self.compiled {
            let length = match compiled {
                CompiledPattern::Literal(literal) => {
                    if !literal.is_empty() && text[pos..].starts_with(literal.as_str()) {
                        literal.len()
                    } else {
                        0
                    }
                }
                CompiledPattern::Regex(dfa) => dfa
                    .try_search_fwd(&Input::new(text).range(pos..).anchored(Anchored::Yes))
                    .ok()
                    .flatten()
                    .map(|half| half.offset() - pos)
                    .unwrap_or(0),
                CompiledPattern::Unmatchable => 0,
            };
            if length > 0 && best.map_or(true, |(_, len)| length > len) {
                best = Some((*symbol, length));
            }
        }

        match best {
            Some((symbol, length)) => {
                let token = Token {
                    symbol,
                    start: pos,
                    end: pos + length,
                    lex_state: state,
                };
                Ok((token, state))
            }
            None => Err(LexFault::NoViableToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::rules::{choice, lit, pat, seq, sym, GrammarBuilder};
    use crate::grammar::table::Grammar;

    fn table() -> Arc<RuleTable> {
        let mut builder = GrammarBuilder::new("lex-test");
        builder.rule(
            "unit",
            choice([seq([lit("if"), sym("Ident")]), sym("Number")]),
        );
        builder.rule("Number", pat(r"[0-9]+"));
        builder.rule("Ident", pat(r"[a-z]+"));
        Grammar::compile(builder).unwrap().table_arc()
    }

    fn lex_all(lexer: &Lexer, text: &str) -> Vec<(String, usize, usize)> {
        let scanners = ScannerSet::default();
        let mut out = Vec::new();
        let mut pos = 0;
        let mut state = LexState::DEFAULT;
        loop {
            match lexer.next_token(text, pos, state, &scanners, &[]) {
                Ok((token, next_state)) => {
                    out.push((
                        lexer.table().symbol_name(token.symbol).to_string(),
                        token.start,
                        token.end,
                    ));
                    pos = token.end;
                    state = next_state;
                }
                Err(LexFault::EndOfInput) => break,
                Err(LexFault::NoViableToken) => {
                    pos += 1;
                }
            }
        }
        out
    }

    #[test]
    fn longest_match_wins() {
        let table = table();
        let lexer = Lexer::new(table);
        let tokens = lex_all(&lexer, "iffy");
        // "iffy" is longer as an identifier than the "if" keyword prefix.
        assert_eq!(tokens, vec![("Ident".to_string(), 0, 4)]);
    }

    #[test]
    fn alternation_inside_a_pattern_matches_longest() {
        let mut builder = GrammarBuilder::new("alts");
        builder.rule("unit", sym("Size"));
        builder.rule("Size", pat(r"Int([1-9]|[1-5][0-9]|6[0-4])"));
        let table = Grammar::compile(builder).unwrap().table_arc();
        let lexer = Lexer::new(table);
        // "[1-9]" accepts "3" first; the match must still run on to "32".
        let tokens = lex_all(&lexer, "Int32");
        assert_eq!(tokens, vec![("Size".to_string(), 0, 5)]);
    }

    #[test]
    fn equal_length_goes_to_the_earlier_declaration() {
        let table = table();
        let lexer = Lexer::new(table);
        let tokens = lex_all(&lexer, "if");
        assert_eq!(tokens, vec![("if".to_string(), 0, 2)]);
    }

    #[test]
    fn resumable_mid_buffer() {
        let table = table();
        let lexer = Lexer::new(table.clone());
        let scanners = ScannerSet::default();
        let text = "if42";
        let (first, state) = lexer
            .next_token(text, 0, LexState::DEFAULT, &scanners, &[])
            .unwrap();
        assert_eq!((first.start, first.end), (0, 2));
        // Resuming from (2, state) alone must pick up the number.
        let (second, _) = lexer.next_token(text, 2, state, &scanners, &[]).unwrap();
        assert_eq!(
            table.symbol_name(second.symbol),
            "Number",
        );
        assert_eq!((second.start, second.end), (2, 4));
    }

    #[test]
    fn end_of_input_is_reported() {
        let lexer = Lexer::new(table());
        let scanners = ScannerSet::default();
        assert_eq!(
            lexer
                .next_token("", 0, LexState::DEFAULT, &scanners, &[])
                .unwrap_err(),
            LexFault::EndOfInput
        );
    }

    #[test]
    fn unlexable_byte_is_no_viable_token() {
        let lexer = Lexer::new(table());
        let scanners = ScannerSet::default();
        assert_eq!(
            lexer
                .next_token("!", 0, LexState::DEFAULT, &scanners, &[])
                .unwrap_err(),
            LexFault::NoViableToken
        );
    }
}
