mod common;

use arbor::errors::ParseFault;

use common::arithmetic_parser;

// ---
// Unlexable input
// ---

#[test]
fn an_unlexable_byte_becomes_an_error_leaf() {
    let parser = arithmetic_parser();
    let text = "1+;2";
    let tree = parser.parse(text);
    assert_eq!(tree.len(), text.len());
    assert!(tree.root().has_error());
    // The garbage is contained; both operands still parse.
    let sexp = tree.root().to_sexp();
    assert!(sexp.contains("(ERROR)"), "got {}", sexp);
    assert!(sexp.contains("(Number)"), "got {}", sexp);
}

#[test]
fn garbage_after_a_valid_expression_is_absorbed() {
    let parser = arithmetic_parser();
    let text = "1+2 ???";
    let tree = parser.parse(text);
    assert_eq!(tree.len(), text.len());
    assert!(tree.root().has_error());
    // The valid prefix is intact.
    assert!(tree
        .root()
        .to_sexp()
        .starts_with(r#"(Expr (Expr (Number)) "+" (Expr (Number))"#));
}

#[test]
fn pure_garbage_still_produces_a_full_span_tree() {
    let parser = arithmetic_parser();
    let text = "???";
    let tree = parser.parse(text);
    assert_eq!(tree.len(), text.len());
    assert!(tree.root().has_error());
}

// ---
// Missing-token insertion
// ---

#[test]
fn a_trailing_operator_gets_a_missing_operand() {
    let parser = arithmetic_parser();
    let text = "1+";
    let tree = parser.parse(text);
    assert!(tree.root().has_error());
    assert!(tree.root().to_sexp().contains("(MISSING Number)"));

    let diagnostics = tree.error_diagnostics("input", text);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].fault(),
        &ParseFault::Missing {
            kind: "Number".to_string()
        }
    );
}

#[test]
fn a_doubled_operator_recovers_mid_expression() {
    let parser = arithmetic_parser();
    let text = "1+*2";
    let tree = parser.parse(text);
    assert_eq!(tree.len(), text.len());
    assert!(tree.root().has_error());
    // Both numbers survive around the repaired operator.
    let sexp = tree.root().to_sexp();
    assert_eq!(sexp.matches("(Number)").count(), 2, "got {}", sexp);
}

// ---
// Diagnostics
// ---

#[test]
fn diagnostics_carry_byte_spans() {
    let parser = arithmetic_parser();
    let text = "1+;2";
    let tree = parser.parse(text);
    let diagnostics = tree.error_diagnostics("input", text);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].fault(), &ParseFault::Unexpected);
    assert_eq!(diagnostics[0].span().offset(), 2);
    assert_eq!(diagnostics[0].span().len(), 1);
}

#[test]
fn clean_parses_report_no_diagnostics() {
    let parser = arithmetic_parser();
    let text = "1+2*3";
    let tree = parser.parse(text);
    assert!(tree.error_diagnostics("input", text).is_empty());
}
