//! Command-language parser for Tidewater Shell.
//!
//! Turns raw input into the immutable AST consumed by `twsh_core`. Quoting
//! and escapes are resolved during lexing; expansion of `$`-forms is left to
//! the engine's expansion seam.

pub mod ast;
pub mod lexer;
mod parse;

pub use parse::parse;

/// Errors surfaced by `parse`.
///
/// `Incomplete` means the input ended mid-construct (open quote, heredoc
/// body, unclosed `fi`/`done`/`)`); an interactive caller should read a
/// continuation line and retry with the accumulated text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Incomplete,
    #[error("syntax error: {0}")]
    Syntax(String),
}
