//! Declarative rule combinators.
//!
//! A grammar is declared as a set of named rules over a small combinator
//! algebra. The compiler desugars everything here into plain productions
//! before building the automaton, so the automaton only ever sees flat
//! right-hand sides.

use serde::{Deserialize, Serialize};

use crate::errors::GrammarError;
use crate::grammar::Grammar;

/// Associativity for a precedence declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Assoc {
    #[default]
    None,
    Left,
    Right,
}

/// The right-hand side of a rule, before desugaring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rule {
    /// An anonymous literal terminal, e.g. `"+"`.
    Literal(String),
    /// A regex terminal pattern.
    Pattern(String),
    /// A reference to a named rule.
    Ref(String),
    Seq(Vec<Rule>),
    Choice(Vec<Rule>),
    Repeat(Box<Rule>),
    Repeat1(Box<Rule>),
    Optional(Box<Rule>),
    Prec {
        level: i32,
        assoc: Assoc,
        rule: Box<Rule>,
    },
    /// Collapse a purely lexical sub-rule into a single terminal.
    Token(Box<Rule>),
    /// Matches nothing.
    Blank,
}

/// Literal terminal: `lit("struct")`.
pub fn lit(text: impl Into<String>) -> Rule {
    Rule::Literal(text.into())
}

/// Regex terminal: `pat(r"[0-9]+")`.
pub fn pat(pattern: impl Into<String>) -> Rule {
    Rule::Pattern(pattern.into())
}

/// Reference to a named rule: `sym("Expression")`.
pub fn sym(name: impl Into<String>) -> Rule {
    Rule::Ref(name.into())
}

/// All parts in order.
pub fn seq(parts: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Seq(parts.into_iter().collect())
}

/// Exactly one of the alternatives.
pub fn choice(alternatives: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Choice(alternatives.into_iter().collect())
}

/// Zero or more occurrences.
pub fn repeat(rule: Rule) -> Rule {
    Rule::Repeat(Box::new(rule))
}

/// One or more occurrences.
pub fn repeat1(rule: Rule) -> Rule {
    Rule::Repeat1(Box::new(rule))
}

/// Zero or one occurrence.
pub fn optional(rule: Rule) -> Rule {
    Rule::Optional(Box::new(rule))
}

/// Assign a precedence level without associativity.
pub fn prec(level: i32, rule: Rule) -> Rule {
    Rule::Prec {
        level,
        assoc: Assoc::None,
        rule: Box::new(rule),
    }
}

/// Assign a precedence level with left associativity.
pub fn prec_left(level: i32, rule: Rule) -> Rule {
    Rule::Prec {
        level,
        assoc: Assoc::Left,
        rule: Box::new(rule),
    }
}

/// Assign a precedence level with right associativity.
pub fn prec_right(level: i32, rule: Rule) -> Rule {
    Rule::Prec {
        level,
        assoc: Assoc::Right,
        rule: Box::new(rule),
    }
}

/// Fold a lexical sub-rule into one terminal, e.g.
/// `token(seq([lit("//"), pat(".*")]))`.
pub fn token(rule: Rule) -> Rule {
    Rule::Token(Box::new(rule))
}

/// Matches the empty string.
pub fn blank() -> Rule {
    Rule::Blank
}

/// Collects named rules, extras and external tokens for compilation.
///
/// The first declared rule is the start rule. Declaration order matters for
/// lexing: when two terminals match the same length of input, the one
/// declared (or first referenced) earlier wins, so keyword literals should
/// appear before the identifier patterns they would otherwise be shadowed by.
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    pub(crate) name: String,
    pub(crate) rules: Vec<(String, Rule)>,
    pub(crate) extras: Vec<Rule>,
    pub(crate) externals: Vec<String>,
}

impl GrammarBuilder {
    /// Start a grammar declaration. Extras default to ASCII whitespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            extras: vec![Rule::Pattern(r"[ \t\r\n]+".into())],
            externals: Vec::new(),
        }
    }

    /// Declare a named rule. The first rule declared is the start rule.
    pub fn rule(&mut self, name: impl Into<String>, rule: Rule) -> &mut Self {
        self.rules.push((name.into(), rule));
        self
    }

    /// Replace the extras: rules matched anywhere between tokens and
    /// attached to the tree as extra leaves. Each must be a literal, a
    /// pattern, or a reference to a terminal rule.
    pub fn extras(&mut self, extras: impl IntoIterator<Item = Rule>) -> &mut Self {
        self.extras = extras.into_iter().collect();
        self
    }

    /// Declare an external token, scanned by a registered
    /// [`crate::lexer::ExternalScanner`] instead of a pattern.
    pub fn external(&mut self, name: impl Into<String>) -> &mut Self {
        self.externals.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile into a [`Grammar`]. Shorthand for [`Grammar::compile`].
    pub fn compile(self) -> Result<Grammar, GrammarError> {
        Grammar::compile(self)
    }
}
