//! Lowering of body expressions to executable code and table entries.
//!
//! Names are resolved once, at compile time: parameters become argument
//! indices, `self.field` becomes an index into the owner's field layout and
//! `self.m(...)` becomes a slot resolved against the owner class. Only the
//! slot is fixed; which implementation runs is decided at call time by the
//! receiver's table.

use std::cell::Cell;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use vdisp_common::Span;
use vdisp_rt::{
    invoke, ClassId, DispatchError, Hierarchy, Implementation, Instance, MethodId, MethodRegistry,
    Slot, Value, ANY_TYPE,
};

use crate::ast::{BinaryOp, Expr, ExprKind, Signature, UnaryOp};
use crate::error::ScriptError;
use crate::parser::parse_expr;

/// Nested self-calls allowed before a body is stopped.
const MAX_CALL_DEPTH: u32 = 200;

/// Symbol reported by failures in constant expressions.
const CONST_SYMBOL: &str = "<const>";

/// Resolved, executable form of an expression.
#[derive(Debug, Clone)]
enum Code {
    Const(Value),
    Arg(usize),
    Field(usize),
    Call { slot: Slot, args: Box<[Code]> },
    Unary(UnaryOp, Box<Code>),
    Binary(BinaryOp, Box<Code>, Box<Code>),
}

/// The class a body is compiled for.
struct Owner<'a> {
    hierarchy: &'a Hierarchy,
    registry: &'a MethodRegistry,
    class: ClassId,
}

struct Compiler<'a> {
    owner: Option<Owner<'a>>,
    /// Parameter name to (argument index, declared type).
    params: FxHashMap<&'a str, (usize, &'a str)>,
}

/// Compile `body` into the implementation of `signature` on `owner`.
///
/// Every method the body calls through `self` must already be declared on
/// `owner` or one of its ancestors; methods declared later in the same
/// class are fine as long as they are declared before this call.
pub fn compile_method(
    hierarchy: &Hierarchy,
    registry: &MethodRegistry,
    owner: ClassId,
    signature: &Signature,
    body: &str,
) -> Result<Implementation, ScriptError> {
    let expr = parse_expr(body)?;
    let compiler = Compiler {
        owner: Some(Owner {
            hierarchy,
            registry,
            class: owner,
        }),
        params: signature
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), (i, p.ty.as_str())))
            .collect(),
    };
    let code = compiler.lower(&expr)?;

    let symbol: Arc<str> = Arc::from(format!("{}.{}", hierarchy.name(owner), signature.name));
    tracing::debug!(%symbol, "compiled method body");
    let name = Arc::clone(&symbol);
    Ok(Implementation::new(&*symbol, move |this: &Instance, args: &[Value]| {
        let _depth = DepthGuard::enter(&name)?;
        code.eval(&Frame {
            receiver: Some(this),
            args,
            symbol: &name,
        })
    }))
}

/// Evaluate an expression that uses neither `self` nor parameters.
pub fn eval_const(source: &str) -> Result<Value, ScriptError> {
    let expr = parse_expr(source)?;
    let compiler = Compiler {
        owner: None,
        params: FxHashMap::default(),
    };
    compiler
        .lower(&expr)?
        .eval(&Frame {
            receiver: None,
            args: &[],
            symbol: CONST_SYMBOL,
        })
        .map_err(|err| ScriptError::eval(err, expr.span))
}

impl<'a> Compiler<'a> {
    fn lower(&self, expr: &Expr) -> Result<Code, ScriptError> {
        Ok(match &expr.kind {
            ExprKind::Int(n) => Code::Const(Value::Int(*n)),
            ExprKind::Str(s) => Code::Const(Value::str(s)),
            ExprKind::Bool(b) => Code::Const(Value::Bool(*b)),
            ExprKind::Name(name) => match self.params.get(name.as_str()) {
                Some(&(index, _)) => Code::Arg(index),
                None => {
                    return Err(ScriptError::compile(
                        format!("unknown name `{name}`"),
                        expr.span,
                    ))
                }
            },
            ExprKind::Field(field) => {
                let owner = self.owner(expr.span)?;
                match owner.hierarchy.field_index(owner.class, field) {
                    Some(index) => Code::Field(index),
                    None => {
                        return Err(ScriptError::compile(
                            format!(
                                "class `{}` has no field `{field}`",
                                owner.hierarchy.name(owner.class)
                            ),
                            expr.span,
                        ))
                    }
                }
            }
            ExprKind::SelfCall {
                method,
                method_span,
                args,
            } => {
                let owner = self.owner(expr.span)?;
                let slot = self.resolve_call(owner, method, *method_span, args)?;
                let args = args
                    .iter()
                    .map(|a| self.lower(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Code::Call {
                    slot,
                    args: args.into_boxed_slice(),
                }
            }
            ExprKind::Unary { op, operand } => Code::Unary(*op, Box::new(self.lower(operand)?)),
            ExprKind::Binary { op, lhs, rhs } => Code::Binary(
                *op,
                Box::new(self.lower(lhs)?),
                Box::new(self.lower(rhs)?),
            ),
        })
    }

    fn owner(&self, span: Span) -> Result<&Owner<'a>, ScriptError> {
        self.owner.as_ref().ok_or_else(|| {
            ScriptError::compile("`self` is not available in a constant expression", span)
        })
    }

    /// Pick the slot for `self.method(args)` as seen from the owner class.
    fn resolve_call(
        &self,
        owner: &Owner<'_>,
        method: &str,
        span: Span,
        args: &[Expr],
    ) -> Result<Slot, ScriptError> {
        let class = owner.hierarchy.name(owner.class);
        let candidates = owner.registry.candidates(owner.hierarchy, owner.class, method);
        if candidates.is_empty() {
            return Err(ScriptError::compile(
                format!("class `{class}` has no method `{method}`"),
                span,
            ));
        }

        let same_arity: Vec<&(MethodId, Slot)> = candidates
            .iter()
            .filter(|(m, _)| m.arity() == args.len())
            .collect();
        let arg_types: Vec<Option<&str>> = args.iter().map(|a| self.static_type(a)).collect();
        let accepting: Vec<&(MethodId, Slot)> = same_arity
            .iter()
            .copied()
            .filter(|(m, _)| {
                m.params.iter().zip(&arg_types).all(|(param, arg)| match arg {
                    Some(ty) => param == ANY_TYPE || param == ty,
                    None => true,
                })
            })
            .collect();

        match accepting.as_slice() {
            [(_, slot)] => Ok(*slot),
            [] => {
                let known: Vec<_> = candidates.iter().map(|(m, _)| m.to_string()).collect();
                Err(ScriptError::compile(
                    format!(
                        "no overload of `{method}` on `{class}` accepts {} argument{}; candidates: {}",
                        args.len(),
                        if args.len() == 1 { "" } else { "s" },
                        known.join(", ")
                    ),
                    span,
                ))
            }
            several => {
                let names: Vec<_> = several.iter().map(|(m, _)| m.to_string()).collect();
                Err(ScriptError::compile(
                    format!("call to `{method}` is ambiguous between {}", names.join(" and ")),
                    span,
                ))
            }
        }
    }

    /// The type of an argument when it is known without running anything.
    fn static_type(&self, expr: &Expr) -> Option<&'a str> {
        match &expr.kind {
            ExprKind::Int(_) => Some("Int"),
            ExprKind::Str(_) => Some("Str"),
            ExprKind::Bool(_) => Some("Bool"),
            ExprKind::Name(name) => match self.params.get(name.as_str()) {
                Some(&(_, ty)) if ty != ANY_TYPE => Some(ty),
                _ => None,
            },
            _ => None,
        }
    }
}

struct Frame<'a> {
    receiver: Option<&'a Instance>,
    args: &'a [Value],
    symbol: &'a str,
}

impl Frame<'_> {
    fn fail(&self, message: impl Into<String>) -> DispatchError {
        DispatchError::method_failed(self.symbol, message)
    }
}

impl Code {
    fn eval(&self, frame: &Frame<'_>) -> Result<Value, DispatchError> {
        match self {
            Code::Const(value) => Ok(value.clone()),
            Code::Arg(index) => frame
                .args
                .get(*index)
                .cloned()
                .ok_or_else(|| frame.fail(format!("missing argument {}", index + 1))),
            Code::Field(index) => frame
                .receiver
                .and_then(|r| r.field(*index))
                .cloned()
                .ok_or_else(|| frame.fail(format!("receiver has no field at index {index}"))),
            Code::Call { slot, args } => {
                let receiver = frame
                    .receiver
                    .ok_or_else(|| frame.fail("self-call without a receiver"))?;
                let args = args
                    .iter()
                    .map(|a| a.eval(frame))
                    .collect::<Result<Vec<_>, _>>()?;
                invoke(receiver, *slot, &args)
            }
            Code::Unary(op, operand) => {
                let value = operand.eval(frame)?;
                match (op, &value) {
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| frame.fail("integer overflow in `-`")),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, other) => {
                        Err(frame.fail(format!("`-` expects Int, found {}", other.type_name())))
                    }
                    (UnaryOp::Not, other) => {
                        Err(frame.fail(format!("`!` expects Bool, found {}", other.type_name())))
                    }
                }
            }
            Code::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                let short = *op == BinaryOp::Or;
                if expect_bool(*op, lhs.eval(frame)?, frame)? == short {
                    return Ok(Value::Bool(short));
                }
                expect_bool(*op, rhs.eval(frame)?, frame).map(Value::Bool)
            }
            Code::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(frame)?;
                let rhs = rhs.eval(frame)?;
                binary(*op, lhs, rhs, frame)
            }
        }
    }
}

fn expect_bool(op: BinaryOp, value: Value, frame: &Frame<'_>) -> Result<bool, DispatchError> {
    value
        .as_bool()
        .ok_or_else(|| frame.fail(format!("`{op}` expects Bool operands, found {}", value.type_name())))
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value, frame: &Frame<'_>) -> Result<Value, DispatchError> {
    match (op, &lhs, &rhs) {
        (BinaryOp::Add, Value::Str(_), _) | (BinaryOp::Add, _, Value::Str(_)) => {
            Ok(Value::from(format!("{lhs}{rhs}")))
        }
        (BinaryOp::Eq | BinaryOp::NotEq, l, r) => {
            if l.type_name() != r.type_name() {
                return Err(frame.fail(format!(
                    "cannot compare {} with {}",
                    l.type_name(),
                    r.type_name()
                )));
            }
            Ok(Value::Bool((l == r) == (op == BinaryOp::Eq)))
        }
        (_, Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let checked = |result: Option<i64>| {
                result
                    .map(Value::Int)
                    .ok_or_else(|| frame.fail(format!("integer overflow in `{op}`")))
            };
            match op {
                BinaryOp::Add => checked(a.checked_add(b)),
                BinaryOp::Sub => checked(a.checked_sub(b)),
                BinaryOp::Mul => checked(a.checked_mul(b)),
                BinaryOp::Div if b == 0 => Err(frame.fail("division by zero")),
                BinaryOp::Div => checked(a.checked_div(b)),
                BinaryOp::Lt => Ok(Value::Bool(a < b)),
                BinaryOp::LtEq => Ok(Value::Bool(a <= b)),
                BinaryOp::Gt => Ok(Value::Bool(a > b)),
                BinaryOp::GtEq => Ok(Value::Bool(a >= b)),
                BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::And | BinaryOp::Or => {
                    Err(frame.fail(format!("`{op}` is not an arithmetic operator")))
                }
            }
        }
        (_, l, r) => Err(frame.fail(format!(
            "`{op}` expects Int operands, found {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

thread_local! {
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Counts nested body evaluations on the current thread.
struct DepthGuard;

impl DepthGuard {
    fn enter(symbol: &str) -> Result<DepthGuard, DispatchError> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(DispatchError::method_failed(
                    symbol,
                    format!("call depth exceeded {MAX_CALL_DEPTH}"),
                ));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_signature;
    use crate::ScriptErrorKind;

    #[test]
    fn const_arithmetic_and_logic() {
        assert_eq!(eval_const("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval_const("-(4 - 10) / 2").unwrap(), Value::Int(3));
        assert_eq!(eval_const("\"n=\" + 4").unwrap(), Value::from("n=4"));
        assert_eq!(eval_const("1 < 2 and !false").unwrap(), Value::Bool(true));
        assert_eq!(eval_const("\"a\" != \"b\"").unwrap(), Value::Bool(true));
    }

    #[test]
    fn logic_short_circuits() {
        // the right-hand side would fail if it ran
        assert_eq!(eval_const("true or 1 / 0 == 1").unwrap(), Value::Bool(true));
        assert_eq!(eval_const("false and 1 / 0 == 1").unwrap(), Value::Bool(false));
    }

    #[test]
    fn runtime_failures_are_eval_errors() {
        let err = eval_const("1 / 0").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::Eval);
        assert_eq!(err.message, "<const> failed: division by zero");
        assert_eq!(err.span, Span::new(0, 5));

        let err = eval_const("9223372036854775807 + 1").unwrap_err();
        assert_eq!(err.message, "<const> failed: integer overflow in `+`");

        let err = eval_const("1 == \"1\"").unwrap_err();
        assert_eq!(err.message, "<const> failed: cannot compare Int with Str");

        let err = eval_const("1 and true").unwrap_err();
        assert_eq!(err.message, "<const> failed: `and` expects Bool operands, found Int");
    }

    #[test]
    fn const_rejects_self_and_names() {
        let err = eval_const("self.name").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::Compile);
        let err = eval_const("x + 1").unwrap_err();
        assert_eq!(err.message, "unknown name `x`");
        assert_eq!(err.span, Span::new(0, 1));
    }

    fn compile(
        h: &Hierarchy,
        reg: &MethodRegistry,
        class: ClassId,
        sig: &str,
        body: &str,
    ) -> Result<Implementation, ScriptError> {
        compile_method(h, reg, class, &parse_signature(sig).unwrap(), body)
    }

    #[test]
    fn unknown_fields_and_methods_fail_to_compile() {
        let mut h = Hierarchy::new();
        let mut reg = MethodRegistry::new();
        let base = h.define_class("Base", None, vec!["name".into()]).unwrap();
        h.declare_method(&mut reg, base, MethodId::nullary("speak")).unwrap();

        let err = compile(&h, &reg, base, "speak()", "self.age").unwrap_err();
        assert_eq!(err.message, "class `Base` has no field `age`");

        let err = compile(&h, &reg, base, "speak()", "self.run()").unwrap_err();
        assert_eq!(err.message, "class `Base` has no method `run`");
        assert_eq!(err.span, Span::new(5, 8));

        let err = compile(&h, &reg, base, "speak()", "self.speak(1)").unwrap_err();
        assert_eq!(
            err.message,
            "no overload of `speak` on `Base` accepts 1 argument; candidates: speak()"
        );
    }

    #[test]
    fn overloads_are_picked_by_static_argument_types() {
        let mut h = Hierarchy::new();
        let mut reg = MethodRegistry::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        h.declare_method(&mut reg, base, MethodId::new("show", vec!["Int".into()]))
            .unwrap();
        h.declare_method(&mut reg, base, MethodId::new("show", vec!["Str".into()]))
            .unwrap();

        assert!(compile(&h, &reg, base, "f(s: Str)", "self.show(s)").is_ok());
        assert!(compile(&h, &reg, base, "f()", "self.show(1)").is_ok());
        let err = compile(&h, &reg, base, "f(x: Any)", "self.show(x)").unwrap_err();
        assert_eq!(
            err.message,
            "call to `show` is ambiguous between show(Int) and show(Str)"
        );
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let mut h = Hierarchy::new();
        let mut reg = MethodRegistry::new();
        let base = h.define_class("Loop", None, vec![]).unwrap();
        let spin = MethodId::nullary("spin");
        h.declare_method(&mut reg, base, spin.clone()).unwrap();
        let imp = compile(&h, &reg, base, "spin()", "self.spin()").unwrap();
        h.implement(base, &spin, imp).unwrap();
        h.build_all().unwrap();

        let obj = vdisp_rt::construct(&h, base).unwrap();
        let err = obj.invoke(Slot(0), &[]).unwrap_err();
        assert_eq!(err, DispatchError::method_failed("Loop.spin", "call depth exceeded 200"));
        // the guard unwound, so the next call starts from zero again
        assert!(obj.invoke(Slot(0), &[]).is_err());
    }
}
