//! Body script: a small expression language for method implementations.
//!
//! A body is one expression over literals, the method's parameters,
//! `self.field` and `self.method(args)`. Bodies compile to
//! [`vdisp_rt::Implementation`]s, so scripted and native methods share the
//! same tables and the same dispatcher.

pub mod ast;
mod compile;
mod cursor;
mod error;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, ExprKind, Signature};
pub use compile::{compile_method, eval_const};
pub use error::{ScriptError, ScriptErrorKind};
pub use lexer::Lexer;
pub use parser::{parse_expr, parse_signature};
