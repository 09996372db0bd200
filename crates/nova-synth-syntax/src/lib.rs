//! Syntax layer for synthesized Java expressions.
//!
//! Candidate expressions, user predicates and skeleton templates are all small Java expressions;
//! this crate lexes and parses them into an untyped [`ast::Expr`] tree. Typing is left to the
//! synthesizer, which knows the live frame.

use thiserror::Error;

pub mod ast;
mod lexer;
mod parser;
pub mod printer;
pub mod skeleton;

pub use ast::Span;
pub use lexer::{is_identifier_part, is_identifier_start};
pub use parser::{parse_expression, parse_expression_list};
pub use printer::{print, print_with};
pub use skeleton::{HoleInfo, HoleKind, Skeleton, SkeletonError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub range: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, range: Span) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }
}

#[cfg(test)]
mod tests;
