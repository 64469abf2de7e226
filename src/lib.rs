pub use crate::edit::{InputEdit, Point};
pub use crate::errors::{CancelReason, Cancelled, GrammarError, LoadError, ParseDiagnostic};
pub use crate::grammar::{Grammar, GrammarBuilder};
pub use crate::runtime::{ParseOptions, Parser};
pub use crate::tree::{Node, Tree, TreeCursor};

pub mod edit;
pub mod errors;
pub mod grammar;
pub mod hlang;
pub mod lexer;
pub mod runtime;
pub mod tree;
