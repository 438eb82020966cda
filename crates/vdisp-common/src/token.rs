use serde::Serialize;

use crate::span::Span;

/// A token produced by the body-script lexer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, start: u32, end: u32) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }
}

/// Every kind of token in method bodies and signatures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    // ── Keywords ───────────────────────────────────────────────────────
    And,
    Or,
    True,
    False,
    SelfKw,

    // ── Literals and names ─────────────────────────────────────────────
    Int(i64),
    Str(String),
    Ident(String),

    // ── Operators ──────────────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    BangEq,
    EqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // ── Delimiters ─────────────────────────────────────────────────────
    LParen,
    RParen,
    Comma,
    Dot,
    Colon,

    Eof,
}

impl TokenKind {
    /// Short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::And => "`and`".to_string(),
            TokenKind::Or => "`or`".to_string(),
            TokenKind::True => "`true`".to_string(),
            TokenKind::False => "`false`".to_string(),
            TokenKind::SelfKw => "`self`".to_string(),
            TokenKind::Int(n) => format!("integer `{n}`"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Plus => "`+`".to_string(),
            TokenKind::Minus => "`-`".to_string(),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::Slash => "`/`".to_string(),
            TokenKind::Bang => "`!`".to_string(),
            TokenKind::BangEq => "`!=`".to_string(),
            TokenKind::EqEq => "`==`".to_string(),
            TokenKind::Lt => "`<`".to_string(),
            TokenKind::LtEq => "`<=`".to_string(),
            TokenKind::Gt => "`>`".to_string(),
            TokenKind::GtEq => "`>=`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// Map an identifier to its keyword token, if it is one.
pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
    match s {
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "self" => Some(TokenKind::SelfKw),
        _ => None,
    }
}
