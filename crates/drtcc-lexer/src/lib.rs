//! Tokenizer for the drtcc input language.
//!
//! The lexer is a mechanical, external collaborator to the parser: it
//! collapses whitespace, comments, and newlines, and hands back a flat
//! stream of typed tokens with source positions. It carries no deep
//! invariants of its own beyond "every accepted character sequence maps to
//! exactly one token, every rejected one produces a recoverable error."
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod lexer;
mod token;

pub use error::{LexError, LexErrorKind};
pub use lexer::Lexer;
pub use token::{Keyword, Op, Token, TokenKind};
