//! Grammar declaration and compilation.
//!
//! A grammar starts as named rules over combinators ([`rules`]), is
//! desugared into plain productions, and is compiled into the table-driven
//! automaton ([`table::RuleTable`]) that every parse shares.

mod compile;
mod desugar;
pub mod rules;
pub mod table;

pub use rules::{
    blank, choice, lit, optional, pat, prec, prec_left, prec_right, repeat, repeat1, seq, sym,
    token, Assoc, GrammarBuilder, Rule,
};
pub use table::{
    Action, Grammar, Production, RuleTable, State, Symbol, SymbolId, SymbolKind, TokenPattern,
    TABLE_FORMAT_VERSION,
};
