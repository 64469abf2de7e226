//! Arbor error handling.
//!
//! The taxonomy is deliberately small: grammar compilation and table loading
//! are the only operations that fail hard. Everything that goes wrong during
//! a parse (unlexable bytes, tokens no rule admits) is absorbed into the
//! resulting tree as error/missing nodes and surfaced through
//! [`crate::tree::Tree::error_diagnostics`], never as an `Err`.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

/// Errors produced while compiling rule declarations into a rule table.
///
/// These are always reported at compile time; a successfully compiled
/// grammar never produces a hard failure mid-parse.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum GrammarError {
    #[error("grammar '{grammar}' declares no rules")]
    #[diagnostic(code(arbor::grammar::empty))]
    EmptyGrammar { grammar: String },

    #[error("rule '{name}' is declared more than once")]
    #[diagnostic(code(arbor::grammar::duplicate_rule))]
    DuplicateRule { name: String },

    #[error("rule '{name}' references undeclared rule '{referenced}'")]
    #[diagnostic(
        code(arbor::grammar::unknown_rule),
        help("declare '{referenced}' with GrammarBuilder::rule or GrammarBuilder::external")
    )]
    UnknownRule { name: String, referenced: String },

    #[error("rule '{name}' is unreachable from the start rule '{start}'")]
    #[diagnostic(code(arbor::grammar::unreachable_rule))]
    UnreachableRule { name: String, start: String },

    #[error("invalid token pattern /{pattern}/ in rule '{name}': {message}")]
    #[diagnostic(code(arbor::grammar::invalid_pattern))]
    InvalidPattern {
        name: String,
        pattern: String,
        message: String,
    },

    #[error("token rule '{name}' contains a combinator that is not purely lexical")]
    #[diagnostic(
        code(arbor::grammar::token_not_lexical),
        help("token(...) bodies may only use literals, patterns, seq, choice, repeat and optional")
    )]
    TokenRuleNotLexical { name: String },

    #[error("'{name}' is not a declared external token")]
    #[diagnostic(code(arbor::grammar::unknown_external))]
    UnknownExternal { name: String },
}

/// Errors produced while loading a serialized rule table.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("rule table was compiled for format version {found}, this runtime supports {expected}")]
    #[diagnostic(
        code(arbor::load::version_mismatch),
        help("recompile the grammar with a matching compiler version")
    )]
    VersionMismatch { found: u32, expected: u32 },

    #[error("malformed rule table data")]
    #[diagnostic(code(arbor::load::malformed))]
    Malformed(#[from] serde_json::Error),
}

/// Why a parse was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The step budget in [`crate::runtime::ParseOptions`] ran out.
    BudgetExhausted,
    /// The caller's cancellation flag was raised.
    FlagRaised,
}

/// A parse was aborted cooperatively. Partial results are discarded, never
/// returned as if complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
#[error("parse cancelled before completion")]
#[diagnostic(code(arbor::parse::cancelled))]
pub struct Cancelled {
    pub reason: CancelReason,
}

// ============================================================================
// PARSE DIAGNOSTICS - absorbed faults rendered against source text
// ============================================================================

/// What a parse diagnostic describes.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseFault {
    /// Input the grammar could not account for, absorbed into an error node.
    Unexpected,
    /// A zero-width node inserted where the grammar required a token.
    Missing { kind: String },
}

/// A rendered view of one error/missing node in a tree.
///
/// The parse itself never fails; these exist so downstream tooling (language
/// servers, CLIs) can report what was absorbed.
#[derive(Debug)]
pub struct ParseDiagnostic {
    fault: ParseFault,
    source: Arc<NamedSource<String>>,
    span: SourceSpan,
}

impl ParseDiagnostic {
    pub(crate) fn new(
        fault: ParseFault,
        source: Arc<NamedSource<String>>,
        span: SourceSpan,
    ) -> Self {
        Self { fault, source, span }
    }

    pub fn fault(&self) -> &ParseFault {
        &self.fault
    }

    /// Byte range of the offending node.
    pub fn span(&self) -> SourceSpan {
        self.span
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fault {
            ParseFault::Unexpected => write!(f, "syntax error: unexpected input"),
            ParseFault::Missing { kind } => write!(f, "syntax error: missing {}", kind),
        }
    }
}

impl std::error::Error for ParseDiagnostic {}

impl Diagnostic for ParseDiagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.fault {
            ParseFault::Unexpected => "arbor::parse::unexpected",
            ParseFault::Missing { .. } => "arbor::parse::missing",
        };
        Some(Box::new(code))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = match &self.fault {
            ParseFault::Unexpected => "unexpected input".to_string(),
            ParseFault::Missing { kind } => format!("missing {} here", kind),
        };
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(label),
            self.span,
        ))))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source)
    }
}
