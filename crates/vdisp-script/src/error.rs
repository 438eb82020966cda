//! Errors raised while lexing, parsing, compiling or evaluating bodies.

use std::fmt;

use vdisp_common::Span;
use vdisp_rt::DispatchError;

/// Which stage rejected the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// Lexing or parsing failed.
    Syntax,
    /// The body refers to something that does not exist or cannot be called.
    Compile,
    /// A constant expression failed while being evaluated.
    Eval,
}

/// A body-script error located by a byte span into the body source.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    pub span: Span,
    /// Optional related location, e.g. where a parenthesis was opened.
    pub related: Option<(String, Span)>,
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Syntax, message, span)
    }

    pub fn compile(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Compile, message, span)
    }

    pub(crate) fn eval(err: DispatchError, span: Span) -> Self {
        Self::new(ScriptErrorKind::Eval, err.to_string(), span)
    }

    fn new(kind: ScriptErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            related: None,
        }
    }

    pub fn with_related(mut self, message: impl Into<String>, span: Span) -> Self {
        self.related = Some((message.into(), span));
        self
    }

    /// Move every span by `offset` bytes, for bodies embedded in a larger file.
    pub fn shifted(mut self, offset: u32) -> Self {
        self.span = self.span.shift(offset);
        if let Some((_, span)) = &mut self.related {
            *span = span.shift(offset);
        }
        self
    }

    pub fn code(&self) -> &'static str {
        match self.kind {
            ScriptErrorKind::Syntax => "S0001",
            ScriptErrorKind::Compile => "S0002",
            ScriptErrorKind::Eval => "S0003",
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifting_moves_primary_and_related_spans() {
        let err = ScriptError::syntax("expected `)`", Span::new(5, 6))
            .with_related("opened here", Span::new(0, 1))
            .shifted(10);
        assert_eq!(err.span, Span::new(15, 16));
        assert_eq!(err.related, Some(("opened here".to_string(), Span::new(10, 11))));
        assert_eq!(err.code(), "S0001");
    }
}
