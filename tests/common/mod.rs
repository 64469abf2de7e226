//! Shared grammar fixtures for the integration tests.

use arbor::grammar::rules::{choice, lit, pat, prec_left, seq, sym};
use arbor::{Grammar, GrammarBuilder, Parser};

/// Left-associative sums and products over integers, with `*` binding
/// tighter than `+`.
pub fn arithmetic() -> Grammar {
    let mut builder = GrammarBuilder::new("arith");
    builder.rule(
        "Expr",
        choice([
            prec_left(1, seq([sym("Expr"), lit("+"), sym("Expr")])),
            prec_left(2, seq([sym("Expr"), lit("*"), sym("Expr")])),
            sym("Number"),
        ]),
    );
    builder.rule("Number", pat(r"[0-9]+"));
    builder.compile().expect("arithmetic grammar compiles")
}

pub fn arithmetic_parser() -> Parser {
    Parser::new(&arithmetic())
}

/// `S -> S S | "a"` with no precedence declared: every adjacent pair is an
/// unresolved shift/reduce conflict, so parsing forks.
pub fn ambiguous() -> Grammar {
    let mut builder = GrammarBuilder::new("ambig");
    builder.rule("S", choice([seq([sym("S"), sym("S")]), lit("a")]));
    builder.compile().expect("ambiguous grammar compiles")
}
