mod common;

use arbor::grammar::rules::{choice, lit, pat, seq, sym};
use arbor::{Grammar, GrammarBuilder, LoadError, Parser};
use arbor::GrammarError;

use common::arithmetic;

// ---
// Compilation faults
// ---

#[test]
fn an_empty_grammar_is_rejected() {
    let builder = GrammarBuilder::new("nothing");
    assert!(matches!(
        Grammar::compile(builder),
        Err(GrammarError::EmptyGrammar { .. })
    ));
}

#[test]
fn duplicate_rule_names_are_rejected() {
    let mut builder = GrammarBuilder::new("dup");
    builder.rule("Item", pat(r"[a-z]+"));
    builder.rule("Item", pat(r"[0-9]+"));
    assert!(matches!(
        Grammar::compile(builder),
        Err(GrammarError::DuplicateRule { name }) if name == "Item"
    ));
}

#[test]
fn references_to_undeclared_rules_are_rejected() {
    let mut builder = GrammarBuilder::new("dangling");
    builder.rule("unit", seq([lit("("), sym("Missing"), lit(")")]));
    assert!(matches!(
        Grammar::compile(builder),
        Err(GrammarError::UnknownRule { referenced, .. }) if referenced == "Missing"
    ));
}

#[test]
fn unreachable_rules_are_rejected() {
    let mut builder = GrammarBuilder::new("island");
    builder.rule("unit", sym("Number"));
    builder.rule("Number", pat(r"[0-9]+"));
    builder.rule("Orphan", pat(r"[a-z]+"));
    assert!(matches!(
        Grammar::compile(builder),
        Err(GrammarError::UnreachableRule { name, .. }) if name == "Orphan"
    ));
}

#[test]
fn malformed_patterns_are_rejected_at_compile_time() {
    let mut builder = GrammarBuilder::new("badpat");
    builder.rule("unit", pat("[never-closed"));
    assert!(matches!(
        Grammar::compile(builder),
        Err(GrammarError::InvalidPattern { .. })
    ));
}

#[test]
fn registering_a_scanner_for_an_undeclared_external_fails() {
    use arbor::lexer::{ExternalMatch, ExternalScanner, LexState};
    use arbor::grammar::table::SymbolId;

    struct Nop;
    impl ExternalScanner for Nop {
        fn scan(
            &self,
            _text: &str,
            _pos: usize,
            _state: LexState,
            _valid: &[SymbolId],
        ) -> Option<ExternalMatch> {
            None
        }
    }

    let mut parser = Parser::new(&arithmetic());
    let result = parser.register_scanner("heredoc", Box::new(Nop));
    assert!(matches!(
        result,
        Err(GrammarError::UnknownExternal { name }) if name == "heredoc"
    ));
}

// ---
// Serialization
// ---

#[test]
fn a_serialized_table_round_trips() {
    let grammar = arithmetic();
    let bytes = grammar.to_bytes();
    let loaded = Grammar::from_bytes(&bytes).unwrap();
    assert_eq!(loaded.table(), grammar.table());

    // A parser built from the loaded table behaves identically.
    let original = Parser::new(&grammar).parse("1+2*3");
    let reloaded = Parser::new(&loaded).parse("1+2*3");
    assert_eq!(original, reloaded);
}

#[test]
fn a_table_from_another_format_version_is_refused() {
    let grammar = arithmetic();
    let text = String::from_utf8(grammar.to_bytes()).unwrap();
    let tampered = text.replacen("\"format_version\":1", "\"format_version\":99", 1);
    assert!(matches!(
        Grammar::from_bytes(tampered.as_bytes()),
        Err(LoadError::VersionMismatch {
            found: 99,
            expected: 1
        })
    ));
}

#[test]
fn garbage_bytes_are_a_malformed_table() {
    assert!(matches!(
        Grammar::from_bytes(b"not a table"),
        Err(LoadError::Malformed(_))
    ));
}

// ---
// Grammar structure
// ---

#[test]
fn choice_alternatives_become_separate_productions() {
    let mut builder = GrammarBuilder::new("alts");
    builder.rule(
        "Value",
        choice([sym("Number"), sym("Word")]),
    );
    builder.rule("Number", pat(r"[0-9]+"));
    builder.rule("Word", pat(r"[a-z]+"));
    let grammar = Grammar::compile(builder).unwrap();
    let value = grammar.symbol_named("Value").unwrap();
    let count = grammar
        .table()
        .productions
        .iter()
        .filter(|production| production.lhs == value)
        .count();
    assert_eq!(count, 2);
}

#[test]
fn the_grammar_keeps_its_name() {
    assert_eq!(arithmetic().name(), "arith");
}
