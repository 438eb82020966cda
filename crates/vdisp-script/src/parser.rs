//! Recursive-descent parser for body expressions and signatures.
//!
//! Precedence, lowest first: `or`, `and`, equality, comparison, `+ -`,
//! `* /`, unary `! -`, primary.
//!
//! Nesting is capped at [`MAX_NESTING`] levels, counting both the parser's
//! own recursion and the height of operator chains, so that neither
//! parsing nor compiling a body can exhaust the stack.

use vdisp_common::{Span, Token, TokenKind};
use vdisp_rt::Value;

use crate::ast::{BinaryOp, Expr, ExprKind, Param, Signature, UnaryOp};
use crate::error::ScriptError;
use crate::lexer::Lexer;

/// Deepest expression tree a body may build.
pub const MAX_NESTING: usize = 128;

/// Parse a complete expression. Trailing tokens are an error.
pub fn parse_expr(source: &str) -> Result<Expr, ScriptError> {
    let mut parser = Parser::new(Lexer::tokenize(source)?);
    let expr = parser.expr()?;
    parser.finish("expression")?;
    Ok(expr)
}

/// Parse `name(param: Type, ...)`. A bare `name` declares no parameters.
pub fn parse_signature(source: &str) -> Result<Signature, ScriptError> {
    let mut parser = Parser::new(Lexer::tokenize(source)?);
    let signature = parser.signature()?;
    parser.finish("signature")?;
    Ok(signature)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open `(`, unary operators and self-call argument lists.
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Run `f` one nesting level down.
    fn nested<T>(
        &mut self,
        span: Span,
        f: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(too_deep(span));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        // the lexer always ends the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        self.at(kind).then(|| self.advance())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ScriptError> {
        if self.at(&kind) {
            return Ok(self.advance());
        }
        let found = self.peek();
        Err(ScriptError::syntax(
            format!("expected {}, found {}", kind.describe(), found.kind.describe()),
            found.span,
        ))
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), ScriptError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, token.span))
            }
            other => Err(ScriptError::syntax(
                format!("expected {what}, found {}", other.describe()),
                token.span,
            )),
        }
    }

    fn finish(&mut self, what: &str) -> Result<(), ScriptError> {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            return Ok(());
        }
        Err(ScriptError::syntax(
            format!("unexpected {} after {what}", token.kind.describe()),
            token.span,
        ))
    }

    // ── Signatures ─────────────────────────────────────────────────────

    fn signature(&mut self) -> Result<Signature, ScriptError> {
        let (name, name_span) = self.expect_ident("method name")?;
        let mut params: Vec<Param> = Vec::new();
        let mut end = name_span;
        if let Some(open) = self.eat(&TokenKind::LParen) {
            if !self.at(&TokenKind::RParen) {
                loop {
                    let param = self.param()?;
                    if params.iter().any(|p| p.name == param.name) {
                        return Err(ScriptError::compile(
                            format!("parameter `{}` is declared twice", param.name),
                            param.span,
                        ));
                    }
                    params.push(param);
                    if self.eat(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            end = self
                .expect(TokenKind::RParen)
                .map_err(|e| e.with_related("parameter list opened here", open.span))?
                .span;
        }
        Ok(Signature {
            name,
            params,
            span: name_span.merge(end),
        })
    }

    fn param(&mut self) -> Result<Param, ScriptError> {
        let (name, name_span) = self.expect_ident("parameter name")?;
        self.expect(TokenKind::Colon)?;
        let (ty, ty_span) = self.expect_ident("parameter type")?;
        if !Value::is_type_name(&ty) {
            return Err(ScriptError::compile(
                format!("unknown parameter type `{ty}`; expected Int, Str, Bool, Unit or Any"),
                ty_span,
            ));
        }
        Ok(Param {
            name,
            ty,
            span: name_span.merge(ty_span),
        })
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.or()
    }

    /// One left-associative precedence level.
    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expr, ScriptError> {
        let mut lhs = next(self)?;
        let mut tallest = height(&lhs);
        while let Some(op) = op_for(&self.peek().kind) {
            let op_span = self.advance().span;
            let rhs = next(self)?;
            tallest = 1 + tallest.max(height(&rhs));
            if tallest > MAX_NESTING {
                return Err(too_deep(op_span));
            }
            let span = lhs.span.merge(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(Self::and, |k| (k == &TokenKind::Or).then_some(BinaryOp::Or))
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(Self::equality, |k| {
            (k == &TokenKind::And).then_some(BinaryOp::And)
        })
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(Self::comparison, |k| match k {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::BangEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(Self::term, |k| match k {
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::LtEq => Some(BinaryOp::LtEq),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(Self::factor, |k| match k {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(Self::unary, |k| match k {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.primary(),
        };
        let start = self.advance().span;
        let operand = self.nested(start, Self::unary)?;
        Ok(Expr {
            span: start.merge(operand.span),
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Ident(name) => ExprKind::Name(name),
            TokenKind::SelfKw => return self.self_access(token.span),
            TokenKind::LParen => {
                let inner = self.nested(token.span, Self::expr)?;
                let close = self
                    .expect(TokenKind::RParen)
                    .map_err(|e| e.with_related("parenthesis opened here", token.span))?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: token.span.merge(close.span),
                });
            }
            other => {
                return Err(ScriptError::syntax(
                    format!("expected expression, found {}", other.describe()),
                    token.span,
                ))
            }
        };
        Ok(Expr {
            kind,
            span: token.span,
        })
    }

    /// `self.field` or `self.method(args)`; `self` is consumed.
    fn self_access(&mut self, self_span: Span) -> Result<Expr, ScriptError> {
        self.expect(TokenKind::Dot)?;
        let (member, member_span) = self.expect_ident("field or method name after `self.`")?;
        let Some(open) = self.eat(&TokenKind::LParen) else {
            return Ok(Expr {
                kind: ExprKind::Field(member),
                span: self_span.merge(member_span),
            });
        };

        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.nested(member_span, Self::expr)?);
                if self.eat(&TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        let close = self
            .expect(TokenKind::RParen)
            .map_err(|e| e.with_related("argument list opened here", open.span))?;
        Ok(Expr {
            kind: ExprKind::SelfCall {
                method: member,
                method_span: member_span,
                args,
            },
            span: self_span.merge(close.span),
        })
    }
}

fn too_deep(span: Span) -> ScriptError {
    ScriptError::syntax("expression nests too deeply", span)
}

/// Longest root-to-leaf path, counting the root.
fn height(expr: &Expr) -> usize {
    1 + match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Name(_)
        | ExprKind::Field(_) => 0,
        ExprKind::SelfCall { args, .. } => args.iter().map(height).max().unwrap_or(0),
        ExprKind::Unary { operand, .. } => height(operand),
        ExprKind::Binary { lhs, rhs, .. } => height(lhs).max(height(rhs)),
    }
}
