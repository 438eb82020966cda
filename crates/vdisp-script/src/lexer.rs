//! Tokenizer for method bodies and signatures.

use vdisp_common::{keyword_from_str, Span, Token, TokenKind};

use crate::cursor::Cursor;
use crate::error::ScriptError;

/// Converts body source into tokens. The last token is always `Eof`.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
        }
    }

    /// Tokenize the whole source. Stops at the first malformed token.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ScriptError> {
        self.skip_trivia();
        let start = self.cursor.pos();
        let Some(c) = self.cursor.advance() else {
            return Ok(Token::new(TokenKind::Eof, start, start));
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '!' if self.cursor.eat('=') => TokenKind::BangEq,
            '!' => TokenKind::Bang,
            '<' if self.cursor.eat('=') => TokenKind::LtEq,
            '<' => TokenKind::Lt,
            '>' if self.cursor.eat('=') => TokenKind::GtEq,
            '>' => TokenKind::Gt,
            '=' if self.cursor.eat('=') => TokenKind::EqEq,
            '=' => {
                return Err(ScriptError::syntax(
                    "unexpected `=`; use `==` to compare",
                    Span::new(start, self.cursor.pos()),
                ))
            }
            '"' => self.lex_string(start)?,
            '0'..='9' => self.lex_number(start)?,
            c if is_ident_start(c) => self.lex_ident(start),
            c => {
                return Err(ScriptError::syntax(
                    format!("unexpected character `{c}`"),
                    Span::new(start, self.cursor.pos()),
                ))
            }
        };
        Ok(Token::new(kind, start, self.cursor.pos()))
    }

    /// Whitespace and `#` line comments.
    fn skip_trivia(&mut self) {
        loop {
            self.cursor.eat_while(char::is_whitespace);
            if self.cursor.peek() != Some('#') {
                return;
            }
            self.cursor.eat_while(|c| c != '\n');
        }
    }

    fn lex_number(&mut self, start: u32) -> Result<TokenKind, ScriptError> {
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let end = self.cursor.pos();
        let text = self.cursor.slice(start, end);
        text.parse::<i64>().map(TokenKind::Int).map_err(|_| {
            ScriptError::syntax(
                format!("integer literal `{text}` does not fit in 64 bits"),
                Span::new(start, end),
            )
        })
    }

    /// The opening quote is already consumed. Strings may span lines.
    fn lex_string(&mut self, start: u32) -> Result<TokenKind, ScriptError> {
        let mut value = String::new();
        loop {
            let at = self.cursor.pos();
            match self.cursor.advance() {
                Some('"') => return Ok(TokenKind::Str(value)),
                Some('\\') => match self.cursor.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => {
                        return Err(ScriptError::syntax(
                            format!("unknown escape `\\{other}`"),
                            Span::new(at, self.cursor.pos()),
                        ))
                    }
                    None => break,
                },
                Some(c) => value.push(c),
                None => break,
            }
        }
        Err(ScriptError::syntax(
            "unterminated string literal",
            Span::new(start, self.cursor.pos()),
        ))
    }

    fn lex_ident(&mut self, start: u32) -> TokenKind {
        self.cursor.eat_while(is_ident_continue);
        let text = self.cursor.slice(start, self.cursor.pos());
        keyword_from_str(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
