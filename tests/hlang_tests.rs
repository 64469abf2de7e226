use arbor::hlang;
use arbor::{InputEdit, Parser};

const SHAPES: &str = "\
module geometry.shapes;
import core.math as math;

// a circle
export struct Circle {
    radius: Float32 = 1;
    name: String = \"unit\";
    visible: Bool = true;
    sides: Int32 = 4;
    payload: Custom = {};
}
";

// ---
// Whole-module parsing
// ---

#[test]
fn parses_a_complete_module() {
    let parser = Parser::new(&hlang::grammar());
    let tree = parser.parse(SHAPES);
    assert_eq!(tree.len(), SHAPES.len());
    assert!(!tree.root().has_error(), "{}", tree.root().to_sexp());
    assert_eq!(tree.root().kind(), "Module");
}

#[test]
fn the_module_tree_has_the_expected_shape() {
    let parser = Parser::new(&hlang::grammar());
    let tree = parser.parse(SHAPES);
    let root = tree.root();

    let head = root.child_by_kind("Module_head").unwrap();
    let declaration = head.child_by_kind("Module_declaration").unwrap();
    let name = declaration.child_by_kind("Module_name").unwrap();
    assert_eq!(name.text(SHAPES), "geometry.shapes");

    let import = head.child_by_kind("Import").unwrap();
    let alias = import.child_by_kind("Import_alias").unwrap();
    assert_eq!(alias.text(SHAPES), "math");

    let body = root.child_by_kind("Declaration").unwrap();
    let structure = body.child_by_kind("Struct").unwrap();
    let struct_name = structure.child_by_kind("Struct_name").unwrap();
    assert_eq!(struct_name.text(SHAPES), "Circle");

    let members: Vec<_> = structure
        .children()
        .filter(|child| child.kind() == "Struct_member")
        .collect();
    assert_eq!(members.len(), 5);
}

#[test]
fn builtin_types_and_type_names_are_distinguished() {
    let parser = Parser::new(&hlang::grammar());
    let tree = parser.parse(SHAPES);
    let sexp = tree.root().to_sexp();
    assert!(sexp.contains("(Builtin_type"), "{}", sexp);
    assert!(sexp.contains("(Type_name"), "{}", sexp);
    assert!(sexp.contains("(Integer_type)"), "{}", sexp);
}

#[test]
fn comments_are_tokens_not_trivia() {
    let parser = Parser::new(&hlang::grammar());
    let tree = parser.parse(SHAPES);
    let declaration = tree.root().child_by_kind("Declaration").unwrap();
    let comment = declaration.child_by_kind("Comment").unwrap();
    assert_eq!(comment.text(SHAPES), "// a circle");
}

// ---
// Malformed modules
// ---

#[test]
fn a_missing_semicolon_is_contained() {
    let parser = Parser::new(&hlang::grammar());
    let text = "module a";
    let tree = parser.parse(text);
    assert_eq!(tree.len(), text.len());
    assert!(tree.root().has_error());
}

#[test]
fn a_bad_member_does_not_take_down_its_siblings() {
    let parser = Parser::new(&hlang::grammar());
    let text = "\
module m;
struct S {
    good: Bool = true;
    bad  Float32 = 1;
    tail: Int8 = 2;
}
";
    let tree = parser.parse(text);
    assert_eq!(tree.len(), text.len());
    assert!(tree.root().has_error());
    // The well-formed members around the fault still parse.
    let sexp = tree.root().to_sexp();
    assert!(sexp.contains("(Boolean"), "{}", sexp);
    assert!(sexp.contains("(Integer_type)"), "{}", sexp);
}

// ---
// Incremental editing
// ---

#[test]
fn renaming_a_member_matches_a_fresh_parse() {
    let parser = Parser::new(&hlang::grammar());
    let old = parser.parse(SHAPES);
    let offset = SHAPES.find("radius").unwrap();
    let edited = old.edit(&InputEdit::replacement(
        offset,
        offset + "radius".len(),
        offset + "diameter".len(),
    ));
    let new_text = SHAPES.replacen("radius", "diameter", 1);
    let reparsed = parser.reparse(&edited, &new_text);
    assert_eq!(reparsed, parser.parse(&new_text));
    assert!(!reparsed.root().has_error());
}

#[test]
fn appending_a_member_matches_a_fresh_parse() {
    let parser = Parser::new(&hlang::grammar());
    let old = parser.parse(SHAPES);
    let insert_at = SHAPES.rfind('}').unwrap();
    let addition = "    area: Float64 = 0;\n";
    let edited = old.edit(&InputEdit::replacement(
        insert_at,
        insert_at,
        insert_at + addition.len(),
    ));
    let mut new_text = SHAPES.to_string();
    new_text.insert_str(insert_at, addition);
    let reparsed = parser.reparse(&edited, &new_text);
    assert_eq!(reparsed, parser.parse(&new_text));
    assert!(!reparsed.root().has_error());
}
