//! The built-in Hlang grammar.
//!
//! A small module-and-struct language used throughout the test suite and
//! as a worked example of the rule combinators. Shape of a source file:
//!
//! ```text
//! module geometry.shapes;
//! import core.math as math;
//!
//! export struct Circle {
//!     radius: Float32 = 1;
//!     name: String = "unit";
//! }
//! ```

use once_cell::sync::Lazy;

use crate::grammar::rules::{choice, lit, optional, pat, repeat, seq, sym, token};
use crate::grammar::{Grammar, GrammarBuilder};

static HLANG: Lazy<Grammar> = Lazy::new(|| {
    Grammar::compile(builder()).expect("the built-in grammar compiles")
});

/// The compiled Hlang grammar. Compiled once, shared by every caller.
pub fn grammar() -> Grammar {
    HLANG.clone()
}

/// The Hlang rule declarations, exposed so tests and tooling can tweak and
/// recompile them.
pub fn builder() -> GrammarBuilder {
    let mut hlang = GrammarBuilder::new("hlang");
    hlang
        .rule(
            "Module",
            seq([sym("Module_head"), repeat(sym("Declaration"))]),
        )
        .rule(
            "Module_head",
            seq([sym("Module_declaration"), repeat(sym("Import"))]),
        )
        .rule(
            "Module_declaration",
            seq([
                optional(sym("Comment")),
                lit("module"),
                sym("Module_name"),
                lit(";"),
            ]),
        )
        .rule("Module_name", sym("Identifier_with_dots"))
        .rule(
            "Import",
            seq([
                lit("import"),
                sym("Import_name"),
                lit("as"),
                sym("Import_alias"),
                lit(";"),
            ]),
        )
        .rule("Import_name", sym("Identifier_with_dots"))
        .rule("Import_alias", sym("Identifier"))
        .rule(
            "Declaration",
            seq([
                optional(sym("Comment")),
                optional(lit("export")),
                choice([sym("Struct")]),
            ]),
        )
        .rule("Type", choice([sym("Builtin_type"), sym("Type_name")]))
        .rule("Type_name", sym("Identifier"))
        .rule(
            "Builtin_type",
            choice([
                lit("Float16"),
                lit("Float32"),
                lit("Float64"),
                lit("Bool"),
                lit("String"),
                sym("Integer_type"),
            ]),
        )
        .rule("Integer_type", pat(r"(Int|Uint)([1-9]|[1-5][0-9]|6[0-4])"))
        .rule(
            "Struct",
            seq([
                lit("struct"),
                sym("Struct_name"),
                lit("{"),
                repeat(sym("Struct_member")),
                lit("}"),
            ]),
        )
        .rule("Struct_name", sym("Identifier"))
        .rule(
            "Struct_member",
            seq([
                optional(sym("Comment")),
                sym("Struct_member_name"),
                lit(":"),
                sym("Struct_member_type"),
                lit("="),
                sym("Generic_expression_or_instantiate"),
                lit(";"),
            ]),
        )
        .rule("Struct_member_name", sym("Identifier"))
        .rule("Struct_member_type", sym("Type"))
        .rule(
            "Generic_expression_or_instantiate",
            choice([sym("Generic_expression"), sym("Expression_instantiate")]),
        )
        .rule("Generic_expression", choice([sym("Expression_constant")]))
        .rule(
            "Expression_constant",
            choice([sym("Boolean"), sym("Number"), sym("String")]),
        )
        .rule("Expression_instantiate", seq([lit("{}")]))
        // Boolean precedes Identifier: its keywords tie with the identifier
        // pattern on length, and the earlier declaration wins that tie.
        .rule("Boolean", choice([lit("true"), lit("false")]))
        .rule("Number", pat(r"\d+"))
        .rule("String", pat(r#"".*""#))
        .rule("Comment", token(seq([lit("//"), pat(".*")])))
        .rule("Identifier", pat(r"[a-zA-Z_]+"))
        .rule(
            "Identifier_with_dots",
            seq([
                sym("Identifier"),
                repeat(seq([lit("."), sym("Identifier")])),
            ]),
        );
    hlang
}
