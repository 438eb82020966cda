pub mod span;
pub mod token;

pub use span::{LineIndex, Span};
pub use token::{keyword_from_str, Token, TokenKind};
