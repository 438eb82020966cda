//! Call-site resolution and execution.
//!
//! A call is resolved against a static type, which defaults to the
//! object's own class. Resolution yields a slot; execution then goes
//! through the dispatcher with the object's table, so the static type only
//! decides which slot is used, never which implementation runs.

use vdisp_common::Span;
use vdisp_rt::{invoke, ClassId, Instance, MethodId, Slot, Value};

use crate::error::LoadError;
use crate::manifest::{span_of, CallDef};
use crate::program::Program;

/// The result of one `[[call]]`.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// The call as written, e.g. `d as Base.speak()`.
    pub call: String,
    pub result: Result<Value, LoadError>,
    pub expected: Option<Value>,
}

impl CallOutcome {
    /// The call succeeded and, if an expectation was given, met it.
    pub fn passed(&self) -> bool {
        match (&self.result, &self.expected) {
            (Ok(value), Some(expected)) => value == expected,
            (Ok(_), None) => true,
            (Err(_), _) => false,
        }
    }
}

/// Resolve `method` (a bare name or a full signature) against `class` for
/// the given arguments.
pub fn resolve_method(
    program: &Program,
    class: ClassId,
    method: &str,
    args: &[Value],
    span: Option<Span>,
) -> Result<(MethodId, Slot), LoadError> {
    let hierarchy = program.hierarchy();
    let registry = program.registry();
    let class_name = hierarchy.name(class).to_string();
    let no_such = || LoadError::NoSuchMethod {
        class: class_name.clone(),
        method: method.to_string(),
        span,
    };

    if method.contains('(') {
        let id = MethodId::parse(method).map_err(|message| LoadError::BadSignature { message, span })?;
        let slot = registry.resolve(hierarchy, class, &id).ok_or_else(no_such)?;
        return Ok((id, slot));
    }

    // exact identity from the argument types first
    let exact = MethodId::new(method, args.iter().map(|a| a.type_name().to_string()).collect());
    if let Some(slot) = registry.resolve(hierarchy, class, &exact) {
        return Ok((exact, slot));
    }

    let mut accepting: Vec<(MethodId, Slot)> = registry
        .candidates(hierarchy, class, method)
        .into_iter()
        .filter(|(m, _)| {
            m.arity() == args.len() && m.params.iter().zip(args).all(|(ty, arg)| arg.conforms_to(ty))
        })
        .collect();
    match accepting.len() {
        0 => Err(no_such()),
        1 => Ok(accepting.remove(0)),
        _ => Err(LoadError::AmbiguousCall {
            class: class_name.clone(),
            method: method.to_string(),
            candidates: accepting.into_iter().map(|(m, _)| m).collect(),
            span,
        }),
    }
}

/// Resolve and perform a call on `object`, seen through `static_type`.
pub fn call_object(
    program: &Program,
    object: &str,
    static_type: Option<&str>,
    method: &str,
    args: &[Value],
    span: Option<Span>,
) -> Result<Value, LoadError> {
    let instance = program
        .object(object)
        .ok_or_else(|| LoadError::UnknownObject {
            name: object.to_string(),
            span,
        })?;
    call_instance(program, object, instance, static_type, method, args, span)
}

/// Like [`call_object`] for an instance that may not be named in the program.
pub fn call_instance(
    program: &Program,
    label: &str,
    instance: &Instance,
    static_type: Option<&str>,
    method: &str,
    args: &[Value],
    span: Option<Span>,
) -> Result<Value, LoadError> {
    let hierarchy = program.hierarchy();
    let class = match static_type {
        None => instance.class(),
        Some(name) => {
            let id = hierarchy.resolve(name).ok_or_else(|| {
                LoadError::dispatch(
                    vdisp_rt::DispatchError::UnknownClass {
                        name: name.to_string(),
                    },
                    span,
                )
            })?;
            if !instance.is_instance_of(hierarchy, id) {
                return Err(LoadError::NotAnInstance {
                    object: label.to_string(),
                    class: instance.class_name().to_string(),
                    static_type: name.to_string(),
                    span,
                });
            }
            id
        }
    };

    let (method, slot) = resolve_method(program, class, method, args, span)?;
    tracing::debug!(object = label, %method, %slot, "call");
    invoke(instance, slot, args).map_err(|e| LoadError::dispatch(e, span))
}

pub(crate) fn run_call(program: &Program, call: &CallDef) -> CallOutcome {
    let args: Vec<Value> = call.args.iter().map(|a| a.get_ref().to_value()).collect();
    let result = call_object(
        program,
        call.object.get_ref(),
        call.static_type.as_ref().map(|t| t.get_ref().as_str()),
        call.method.get_ref(),
        &args,
        Some(span_of(&call.method)),
    );
    CallOutcome {
        call: call.to_string(),
        result,
        expected: call.expect.as_ref().map(|e| e.get_ref().to_value()),
    }
}
