//! The parser runtime: public entry points over the generalized parse
//! loop.
//!
//! A [`Parser`] binds a compiled [`Grammar`] to a lexer and any external
//! scanners, and is then reusable for any number of parses. Parsing never
//! fails on malformed input; what can stop a parse is cooperative
//! cancellation through [`ParseOptions`].

mod config;
mod parse;
mod recovery;
mod reuse;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::errors::{Cancelled, GrammarError};
use crate::grammar::table::Grammar;
use crate::lexer::{ExternalScanner, Lexer, ScannerSet};
use crate::tree::Tree;

/// Most configurations kept live at once; past this, the lowest-priority
/// forks are dropped.
pub(crate) const MAX_CONFIGS: usize = 32;
/// Reductions allowed per configuration per token, bounding zero-width
/// reduction cycles.
pub(crate) const REDUCE_STEP_CAP: usize = 128;
/// Tokens error recovery scans ahead before giving up on resynchronizing.
pub(crate) const RECOVERY_HORIZON: usize = 8;
/// MISSING insertions attempted to close open constructs at end of input.
pub(crate) const EOF_MISSING_CAP: usize = 8;
/// Bytes past a reused subtree that must also be clear of damage,
/// accounting for lexer lookahead at the boundary.
pub(crate) const LOOKAHEAD_MARGIN: usize = 1;

/// Cooperative limits on one parse. The default imposes none.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Abort after this many loop steps. Steps are proportional to work
    /// done, so this bounds runtime on any input.
    pub step_budget: Option<u64>,
    /// Abort as soon as this flag reads `true`; settable from another
    /// thread.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

/// A reusable parser for one grammar.
pub struct Parser {
    grammar: Grammar,
    lexer: Lexer,
    scanners: ScannerSet,
}

impl Parser {
    pub fn new(grammar: &Grammar) -> Parser {
        Parser {
            grammar: grammar.clone(),
            lexer: Lexer::new(grammar.table_arc()),
            scanners: ScannerSet::default(),
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Attach an external scanner to the named external token. The name
    /// must have been declared via
    /// [`crate::grammar::GrammarBuilder::external`].
    pub fn register_scanner(
        &mut self,
        name: &str,
        scanner: Box<dyn ExternalScanner>,
    ) -> Result<(), GrammarError> {
        let table = self.grammar.table();
        let symbol = table
            .symbol_named(name)
            .filter(|symbol| table.external_symbols.contains(symbol))
            .ok_or_else(|| GrammarError::UnknownExternal {
                name: name.to_string(),
            })?;
        self.scanners.register(symbol, scanner);
        Ok(())
    }

    /// Parse `text` from scratch. Always produces a tree spanning the
    /// whole text; malformed input is absorbed into ERROR and MISSING
    /// nodes rather than reported as failure.
    pub fn parse(&self, text: &str) -> Tree {
        match self.parse_with(text, &ParseOptions::default()) {
            Ok(tree) => tree,
            // Default options carry no budget and no flag.
            Err(_) => unreachable!("parse cancelled without a cancellation source"),
        }
    }

    pub fn parse_with(&self, text: &str, options: &ParseOptions) -> Result<Tree, Cancelled> {
        parse::run(
            &self.grammar.table_arc(),
            &self.lexer,
            &self.scanners,
            text,
            None,
            options,
        )
    }

    /// Reparse after an edit. `old` must be the result of applying every
    /// intervening [`crate::edit::InputEdit`] to the previous tree via
    /// [`Tree::edit`], and `text` the post-edit buffer; subtrees clear of
    /// the edits are spliced in by reference instead of reparsed.
    ///
    /// The result is always byte-for-byte equal to `parse(text)`.
    pub fn reparse(&self, old: &Tree, text: &str) -> Tree {
        match self.reparse_with(old, text, &ParseOptions::default()) {
            Ok(tree) => tree,
            Err(_) => unreachable!("parse cancelled without a cancellation source"),
        }
    }

    pub fn reparse_with(
        &self,
        old: &Tree,
        text: &str,
        options: &ParseOptions,
    ) -> Result<Tree, Cancelled> {
        debug_assert_eq!(old.len(), text.len(), "tree was not edited to match the text");
        parse::run(
            &self.grammar.table_arc(),
            &self.lexer,
            &self.scanners,
            text,
            Some(old),
            options,
        )
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("grammar", &self.grammar.name())
            .field("scanners", &self.scanners)
            .finish()
    }
}
