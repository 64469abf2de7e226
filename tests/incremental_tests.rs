mod common;

use arbor::InputEdit;

use common::arithmetic_parser;

// ---
// Reparse equivalence: the result of edit + reparse is always identical to
// parsing the new text from scratch.
// ---

#[test]
fn insertion_matches_a_fresh_parse() {
    let parser = arithmetic_parser();
    let old = parser.parse("1+2");
    // "1+2" -> "1+3+2"
    let edited = old.edit(&InputEdit::replacement(1, 1, 3));
    let new_text = "1+3+2";
    let reparsed = parser.reparse(&edited, new_text);
    assert_eq!(reparsed, parser.parse(new_text));
}

#[test]
fn deletion_matches_a_fresh_parse() {
    let parser = arithmetic_parser();
    let old = parser.parse("1+2+3");
    // "1+2+3" -> "1+3"
    let edited = old.edit(&InputEdit::replacement(1, 3, 1));
    let new_text = "1+3";
    let reparsed = parser.reparse(&edited, new_text);
    assert_eq!(reparsed, parser.parse(new_text));
}

#[test]
fn replacement_matches_a_fresh_parse() {
    let parser = arithmetic_parser();
    let old = parser.parse("12+34*5");
    // "34" -> "999"
    let edited = old.edit(&InputEdit::replacement(3, 5, 6));
    let new_text = "12+999*5";
    let reparsed = parser.reparse(&edited, new_text);
    assert_eq!(reparsed, parser.parse(new_text));
}

#[test]
fn a_noop_edit_reparses_to_the_same_tree() {
    let parser = arithmetic_parser();
    let text = "1+2*3";
    let old = parser.parse(text);
    let edited = old.edit(&InputEdit::replacement(2, 2, 2));
    let reparsed = parser.reparse(&edited, text);
    assert_eq!(reparsed, old);
}

#[test]
fn sequential_edits_fold_into_one_reparse() {
    let parser = arithmetic_parser();
    let old = parser.parse("1+2");
    // "1+2" -> "1+42" -> "10+42"
    let once = old.edit(&InputEdit::replacement(2, 3, 4));
    let twice = once.edit(&InputEdit::replacement(1, 1, 2));
    let new_text = "10+42";
    let reparsed = parser.reparse(&twice, new_text);
    assert_eq!(reparsed, parser.parse(new_text));
}

#[test]
fn edits_at_the_ends_of_the_buffer() {
    let parser = arithmetic_parser();
    let text = "1+2";
    let old = parser.parse(text);

    // Prepend "9*": "1+2" -> "9*1+2".
    let front = old.edit(&InputEdit::replacement(0, 0, 2));
    assert_eq!(parser.reparse(&front, "9*1+2"), parser.parse("9*1+2"));

    // Append "*7": "1+2" -> "1+2*7".
    let back = old.edit(&InputEdit::replacement(3, 3, 5));
    assert_eq!(parser.reparse(&back, "1+2*7"), parser.parse("1+2*7"));
}

#[test]
fn an_edit_that_breaks_the_parse_matches_a_fresh_parse() {
    let parser = arithmetic_parser();
    let old = parser.parse("1+2");
    // Replace "2" with "*": "1+*".
    let edited = old.edit(&InputEdit::replacement(2, 3, 3));
    let new_text = "1+*";
    let reparsed = parser.reparse(&edited, new_text);
    assert_eq!(reparsed, parser.parse(new_text));
    assert!(reparsed.root().has_error());
}

#[test]
fn a_noop_edit_on_malformed_input_matches_a_fresh_parse() {
    let parser = arithmetic_parser();
    // The missing operator stalls the parse with a number still unreduced
    // on the fresh stack, while a reparse splices the reduced expression.
    let text = "0 0*";
    let old = parser.parse(text);
    let edited = old.edit(&InputEdit::replacement(4, 4, 4));
    let reparsed = parser.reparse(&edited, text);
    assert_eq!(reparsed, parser.parse(text));
    assert_eq!(reparsed.len(), text.len());
}

#[test]
fn an_edit_that_repairs_a_broken_parse() {
    let parser = arithmetic_parser();
    let old = parser.parse("1+");
    assert!(old.root().has_error());
    // "1+" -> "1+2".
    let edited = old.edit(&InputEdit::replacement(2, 2, 3));
    let new_text = "1+2";
    let reparsed = parser.reparse(&edited, new_text);
    assert_eq!(reparsed, parser.parse(new_text));
    assert!(!reparsed.root().has_error());
}

// ---
// The edited tree shell
// ---

#[test]
fn editing_updates_the_tree_length() {
    let parser = arithmetic_parser();
    let old = parser.parse("1+2");
    assert_eq!(old.edit(&InputEdit::replacement(1, 1, 3)).len(), 5);
    assert_eq!(old.edit(&InputEdit::replacement(0, 2, 0)).len(), 1);
    assert_eq!(old.edit(&InputEdit::replacement(0, 3, 1)).len(), 1);
}

#[test]
fn editing_leaves_the_original_tree_untouched() {
    let parser = arithmetic_parser();
    let text = "1+2*3";
    let old = parser.parse(text);
    let sexp_before = old.root().to_sexp();
    let _ = old.edit(&InputEdit::replacement(0, 5, 2));
    assert_eq!(old.root().to_sexp(), sexp_before);
    assert_eq!(old.len(), text.len());
}

// ---
// Subtree sharing across a large input
// ---

#[test]
fn a_long_input_survives_an_edit_at_the_far_end() {
    let parser = arithmetic_parser();
    let mut text = String::from("1");
    for n in 2..60 {
        text.push('+');
        text.push_str(&n.to_string());
    }
    let old = parser.parse(&text);
    assert!(!old.root().has_error());

    // Append "*2" at the very end.
    let end = text.len();
    let edited = old.edit(&InputEdit::replacement(end, end, end + 2));
    let mut new_text = text.clone();
    new_text.push_str("*2");
    let reparsed = parser.reparse(&edited, &new_text);
    assert_eq!(reparsed, parser.parse(&new_text));
}
