//! Hand-rolled lexer and recursive-descent parser for Rill source text.

pub mod ast;
mod parser;
mod token;

pub use parser::{call_at, parse_expr_text, parse_program, parse_snippet};
pub use token::{lex, Token, TokenKind};

use thiserror::Error;

/// Parse failure with the 1-based source line it was detected on.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        ParseError {
            message: message.into(),
            line,
        }
    }
}
