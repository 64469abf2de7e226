//! The compiled rule table and the `Grammar` handle that owns it.
//!
//! A `RuleTable` is pure data: symbols, productions and the SLR action
//! tables, built once by the compiler and shared read-only (via `Arc`) by
//! every parse. It is the only artifact that gets serialized; the byte
//! layout carries a format version so a runtime refuses tables compiled by
//! an incompatible compiler instead of misparsing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{GrammarError, LoadError};
use crate::grammar::rules::{Assoc, GrammarBuilder};

/// Version tag embedded in serialized rule tables.
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// Dense, stable symbol index. Assigned once at compile time, never
/// renumbered at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SymbolId(pub u16);

impl SymbolId {
    /// The end-of-input lookahead.
    pub const END: SymbolId = SymbolId(0);
    /// The synthetic symbol used for error nodes.
    pub const ERROR: SymbolId = SymbolId(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    End,
    Terminal,
    NonTerminal,
}

/// A terminal or non-terminal, identified by a [`SymbolId`] plus a display
/// name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Hidden symbols come from desugared combinators; their nodes are
    /// spliced into the parent instead of appearing in the tree.
    pub visible: bool,
    /// Extras (trivia) may appear between any two tokens.
    pub extra: bool,
}

/// How a terminal's text is recognized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenPattern {
    /// Exact text.
    Literal(String),
    /// Regex, matched anchored at the cursor.
    Regex(String),
    /// Scanned by a caller-registered external scanner.
    External,
}

/// A non-terminal and the ordered symbols it expands to. Immutable after
/// compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub lhs: SymbolId,
    pub rhs: Vec<SymbolId>,
    pub prec: i32,
    pub assoc: Assoc,
}

/// One automaton action. A table cell holding more than one action is a GLR
/// split point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Shift(u32),
    Reduce(u32),
    Accept,
}

/// One automaton state: terminal actions plus non-terminal gotos.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    pub actions: BTreeMap<SymbolId, Vec<Action>>,
    pub gotos: BTreeMap<SymbolId, u32>,
}

/// The compiled grammar: pure data, shared read-only by all parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub language: String,
    /// Indexed by `SymbolId`.
    pub symbols: Vec<Symbol>,
    /// Terminal recognition rules, in declaration order (the lexer's
    /// tie-break order).
    pub patterns: Vec<(SymbolId, TokenPattern)>,
    /// Production 0 is the augmented start production.
    pub productions: Vec<Production>,
    pub states: Vec<State>,
    pub start_symbol: SymbolId,
    pub extra_symbols: Vec<SymbolId>,
    pub external_symbols: Vec<SymbolId>,
}

impl RuleTable {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_name(&self, id: SymbolId) -> &str {
        &self.symbols[id.index()].name
    }

    pub fn is_visible(&self, id: SymbolId) -> bool {
        self.symbols[id.index()].visible
    }

    pub fn is_extra(&self, id: SymbolId) -> bool {
        self.symbols[id.index()].extra
    }

    /// Actions for (state, lookahead terminal); empty when the automaton has
    /// no move, which triggers error recovery in the runtime.
    pub fn actions(&self, state: u32, lookahead: SymbolId) -> &[Action] {
        self.states[state as usize]
            .actions
            .get(&lookahead)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn goto(&self, state: u32, symbol: SymbolId) -> Option<u32> {
        self.states[state as usize].gotos.get(&symbol).copied()
    }

    /// Look up a symbol id by display name.
    pub fn symbol_named(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .iter()
            .position(|s| s.name == name)
            .map(|i| SymbolId(i as u16))
    }
}

/// Serialized envelope around a rule table.
#[derive(Serialize, Deserialize)]
struct VersionedTable {
    format_version: u32,
    table: RuleTable,
}

#[derive(Deserialize)]
struct VersionHeader {
    format_version: u32,
}

/// A compiled grammar handle.
///
/// Cheap to clone; the underlying table is immutable and shared, so a
/// `Grammar` may be used from any number of threads concurrently.
#[derive(Debug, Clone)]
pub struct Grammar {
    table: Arc<RuleTable>,
}

impl Grammar {
    /// Compile rule declarations into a grammar. All grammar faults are
    /// reported here, never at parse time.
    pub fn compile(builder: GrammarBuilder) -> Result<Grammar, GrammarError> {
        let table = crate::grammar::compile::compile(builder)?;
        Ok(Grammar {
            table: Arc::new(table),
        })
    }

    pub(crate) fn from_table(table: RuleTable) -> Grammar {
        Grammar {
            table: Arc::new(table),
        }
    }

    pub fn name(&self) -> &str {
        &self.table.language
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub(crate) fn table_arc(&self) -> Arc<RuleTable> {
        Arc::clone(&self.table)
    }

    pub fn symbol_named(&self, name: &str) -> Option<SymbolId> {
        self.table.symbol_named(name)
    }

    /// Serialize the rule table, tagged with [`TABLE_FORMAT_VERSION`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let envelope = VersionedTable {
            format_version: TABLE_FORMAT_VERSION,
            table: (*self.table).clone(),
        };
        // The table is a plain data structure; serialization cannot fail.
        serde_json::to_vec(&envelope).unwrap_or_default()
    }

    /// Load a serialized rule table. Rejects tables from an incompatible
    /// compiler version with [`LoadError::VersionMismatch`] before
    /// attempting to decode the table body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Grammar, LoadError> {
        let header: VersionHeader = serde_json::from_slice(bytes)?;
        if header.format_version != TABLE_FORMAT_VERSION {
            return Err(LoadError::VersionMismatch {
                found: header.format_version,
                expected: TABLE_FORMAT_VERSION,
            });
        }
        let envelope: VersionedTable = serde_json::from_slice(bytes)?;
        Ok(Grammar::from_table(envelope.table))
    }
}
