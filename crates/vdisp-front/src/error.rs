//! Errors raised while loading a hierarchy file or running its calls.

use std::fmt;

use vdisp_common::Span;
use vdisp_rt::{DispatchError, MethodId};
use vdisp_script::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The file could not be read.
    Io { path: String, message: String },
    /// The TOML is malformed or does not match the manifest shape.
    Manifest { message: String, span: Option<Span> },
    /// `extends` names a class that is not defined in the file.
    UnknownParent {
        class: String,
        parent: String,
        span: Span,
    },
    /// Two `[[class]]` tables share a name.
    DuplicateClass { name: String, span: Span, first: Span },
    /// The `extends` graph has a cycle, e.g. `A -> B -> A`.
    Cycle { path: Vec<String>, span: Span },
    /// A signature or body failed to parse or compile.
    Script {
        class: String,
        error: ScriptError,
    },
    /// `override = true/false` disagrees with what the registry decided.
    OverrideMismatch {
        class: String,
        method: MethodId,
        expected_override: bool,
        span: Span,
    },
    /// A runtime error, located at the manifest entry that caused it.
    Dispatch { error: DispatchError, span: Option<Span> },
    UnknownObject { name: String, span: Option<Span> },
    DuplicateObject { name: String, span: Option<Span> },
    /// The static type of a call is not the object's class or an ancestor.
    NotAnInstance {
        object: String,
        class: String,
        static_type: String,
        span: Option<Span>,
    },
    /// No method reachable from the static type matches the call.
    NoSuchMethod {
        class: String,
        method: String,
        span: Option<Span>,
    },
    /// Several overloads accept the arguments equally well.
    AmbiguousCall {
        class: String,
        method: String,
        candidates: Vec<MethodId>,
        span: Option<Span>,
    },
    /// A method signature given on the command line or in a call is malformed.
    BadSignature { message: String, span: Option<Span> },
}

impl LoadError {
    pub fn dispatch(error: DispatchError, span: impl Into<Option<Span>>) -> Self {
        LoadError::Dispatch {
            error,
            span: span.into(),
        }
    }

    /// Stable diagnostic code. Script and runtime errors keep their own codes.
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Io { .. } => "F0001",
            LoadError::Manifest { .. } => "F0002",
            LoadError::UnknownParent { .. } => "F0003",
            LoadError::DuplicateClass { .. } => "F0004",
            LoadError::Cycle { .. } => "F0005",
            LoadError::OverrideMismatch { .. } => "F0006",
            LoadError::UnknownObject { .. } => "F0007",
            LoadError::DuplicateObject { .. } => "F0008",
            LoadError::NotAnInstance { .. } => "F0009",
            LoadError::NoSuchMethod { .. } => "F0010",
            LoadError::AmbiguousCall { .. } => "F0011",
            LoadError::BadSignature { .. } => "F0012",
            LoadError::Script { error, .. } => error.code(),
            LoadError::Dispatch { error, .. } => error.code(),
        }
    }

    /// Primary location in the manifest, when there is one.
    pub fn span(&self) -> Option<Span> {
        match self {
            LoadError::Io { .. } => None,
            LoadError::Manifest { span, .. }
            | LoadError::Dispatch { span, .. }
            | LoadError::UnknownObject { span, .. }
            | LoadError::DuplicateObject { span, .. }
            | LoadError::NotAnInstance { span, .. }
            | LoadError::NoSuchMethod { span, .. }
            | LoadError::AmbiguousCall { span, .. }
            | LoadError::BadSignature { span, .. } => *span,
            LoadError::UnknownParent { span, .. }
            | LoadError::DuplicateClass { span, .. }
            | LoadError::Cycle { span, .. }
            | LoadError::OverrideMismatch { span, .. } => Some(*span),
            LoadError::Script { error, .. } => Some(error.span),
        }
    }

    /// Secondary location with its label.
    pub fn related(&self) -> Option<(String, Span)> {
        match self {
            LoadError::DuplicateClass { first, .. } => {
                Some(("first defined here".to_string(), *first))
            }
            LoadError::Script { error, .. } => error.related.clone(),
            _ => None,
        }
    }

    /// Short text for the label under the primary span.
    pub fn label(&self) -> String {
        match self {
            LoadError::UnknownParent { parent, .. } => format!("`{parent}` is not defined"),
            LoadError::DuplicateClass { .. } => "defined again here".to_string(),
            LoadError::Cycle { .. } => "inheritance cycle starts here".to_string(),
            LoadError::OverrideMismatch {
                expected_override: true,
                ..
            } => "no inherited method has this signature".to_string(),
            LoadError::OverrideMismatch { .. } => "this overrides an inherited method".to_string(),
            LoadError::Script { error, .. } => error.message.clone(),
            LoadError::Dispatch { error, .. } => error.to_string(),
            other => other.to_string(),
        }
    }

    /// A suggestion, when an obvious fix exists.
    pub fn help(&self) -> Option<String> {
        match self {
            LoadError::OverrideMismatch {
                expected_override: true,
                ..
            } => Some("remove `override = true` or fix the signature".to_string()),
            LoadError::OverrideMismatch { .. } => Some("set `override = true`".to_string()),
            LoadError::AmbiguousCall { .. } => {
                Some("call with the full signature, e.g. `name(Int)`".to_string())
            }
            LoadError::Dispatch {
                error: DispatchError::ClassNotBuilt { .. },
                ..
            } => Some("classes are built in superclass-first order".to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, message } => write!(f, "cannot read `{path}`: {message}"),
            LoadError::Manifest { message, .. } => write!(f, "invalid hierarchy file: {message}"),
            LoadError::UnknownParent { class, parent, .. } => {
                write!(f, "class `{class}` extends unknown class `{parent}`")
            }
            LoadError::DuplicateClass { name, .. } => {
                write!(f, "class `{name}` is defined more than once")
            }
            LoadError::Cycle { path, .. } => {
                write!(f, "inheritance cycle: {}", path.join(" -> "))
            }
            LoadError::Script { class, error } => write!(f, "in class `{class}`: {error}"),
            LoadError::OverrideMismatch {
                class,
                method,
                expected_override,
                ..
            } => {
                if *expected_override {
                    write!(f, "`{class}.{method}` is marked as an override but overrides nothing")
                } else {
                    write!(f, "`{class}.{method}` overrides an inherited method but is marked `override = false`")
                }
            }
            LoadError::Dispatch { error, .. } => write!(f, "{error}"),
            LoadError::UnknownObject { name, .. } => write!(f, "unknown object `{name}`"),
            LoadError::DuplicateObject { name, .. } => {
                write!(f, "object `{name}` is defined more than once")
            }
            LoadError::NotAnInstance {
                object,
                class,
                static_type,
                ..
            } => write!(
                f,
                "object `{object}` of class `{class}` cannot be used as `{static_type}`"
            ),
            LoadError::NoSuchMethod { class, method, .. } => {
                write!(f, "no method of `{class}` matches `{method}`")
            }
            LoadError::AmbiguousCall {
                class,
                method,
                candidates,
                ..
            } => {
                let names: Vec<_> = candidates.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "call to `{method}` on `{class}` is ambiguous between {}",
                    names.join(" and ")
                )
            }
            LoadError::BadSignature { message, .. } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for LoadError {}
