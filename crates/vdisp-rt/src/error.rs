//! The dispatch error taxonomy.
//!
//! Every variant is a structural or call-contract failure. None of them is
//! transient, and none is ever recovered by picking a default
//! implementation: they are returned to the caller as-is.

use std::fmt;

use crate::ident::{MethodId, Slot};

/// Why a build step ran out of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingReason {
    /// The superclass table has not been frozen yet.
    ParentNotBuilt { parent: String },
    /// The class table is already frozen and can no longer change.
    TableFrozen,
    /// A subclass already received slots numbered after this class's last slot.
    SlotsHandedOut { subclass: String },
    /// A declared slot does not follow the slots already in the table.
    SlotGap { expected: Slot, found: Slot },
    /// The table handed to the builder is not the superclass's table.
    WrongParentTable { found: String },
}

impl fmt::Display for OrderingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentNotBuilt { parent } => {
                write!(f, "superclass `{parent}` has no dispatch table yet")
            }
            Self::TableFrozen => write!(f, "its dispatch table is already frozen"),
            Self::SlotsHandedOut { subclass } => {
                write!(f, "subclass `{subclass}` has already been laid out")
            }
            Self::SlotGap { expected, found } => {
                write!(f, "expected new slot {expected}, found {found}")
            }
            Self::WrongParentTable { found } => {
                write!(f, "was handed the table of unrelated class `{found}`")
            }
        }
    }
}

/// An error raised while describing a hierarchy, building its tables,
/// constructing objects or dispatching calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The same method identity was declared twice in one class.
    Conflict { class: String, method: MethodId },
    /// A field name is already used by the class or one of its ancestors.
    DuplicateField { class: String, field: String },
    /// A class with this name already exists in the hierarchy.
    DuplicateClass { name: String },
    /// A table was built, or a method declared, before its dependencies were ready.
    OrderingViolation { class: String, reason: OrderingReason },
    /// An instance was requested for a class whose table is not built.
    ClassNotBuilt { class: String },
    /// A slot index outside the receiver's table.
    OutOfRangeSlot { class: String, slot: Slot, len: usize },
    UnknownClass { name: String },
    UnknownField { class: String, field: String },
    /// A declared method never received an implementation.
    Unimplemented { class: String, method: MethodId },
    /// An implementation was supplied for a method the class never declared.
    UndeclaredMethod { class: String, method: MethodId },
    ArityMismatch {
        method: MethodId,
        expected: usize,
        found: usize,
    },
    ArgumentType {
        method: MethodId,
        index: usize,
        expected: String,
        found: &'static str,
    },
    /// A method body reported a failure.
    MethodFailed { symbol: String, message: String },
}

impl DispatchError {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "D0001",
            Self::DuplicateField { .. } => "D0002",
            Self::DuplicateClass { .. } => "D0003",
            Self::OrderingViolation { .. } => "D0004",
            Self::ClassNotBuilt { .. } => "D0005",
            Self::OutOfRangeSlot { .. } => "D0006",
            Self::UnknownClass { .. } => "D0007",
            Self::UnknownField { .. } => "D0008",
            Self::Unimplemented { .. } => "D0009",
            Self::ArityMismatch { .. } => "D0010",
            Self::ArgumentType { .. } => "D0011",
            Self::MethodFailed { .. } => "D0012",
            Self::UndeclaredMethod { .. } => "D0013",
        }
    }

    /// Convenience for method bodies reporting their own failures.
    pub fn method_failed(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MethodFailed {
            symbol: symbol.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { class, method } => {
                write!(f, "method `{method}` is declared more than once in class `{class}`")
            }
            Self::DuplicateField { class, field } => {
                write!(f, "field `{field}` of class `{class}` is already defined in its lineage")
            }
            Self::DuplicateClass { name } => write!(f, "class `{name}` is already defined"),
            Self::OrderingViolation { class, reason } => {
                write!(f, "ordering violation for class `{class}`: {reason}")
            }
            Self::ClassNotBuilt { class } => {
                write!(f, "cannot construct `{class}`: its dispatch table is not built")
            }
            Self::OutOfRangeSlot { class, slot, len } => write!(
                f,
                "slot {slot} is out of range for `{class}` (table has {len} slot{})",
                if *len == 1 { "" } else { "s" }
            ),
            Self::UnknownClass { name } => write!(f, "unknown class `{name}`"),
            Self::UnknownField { class, field } => {
                write!(f, "class `{class}` has no field `{field}`")
            }
            Self::Unimplemented { class, method } => {
                write!(f, "method `{method}` of class `{class}` has no implementation")
            }
            Self::UndeclaredMethod { class, method } => {
                write!(f, "class `{class}` does not declare method `{method}`")
            }
            Self::ArityMismatch {
                method,
                expected,
                found,
            } => write!(
                f,
                "`{method}` expects {expected} argument{}, found {found}",
                if *expected == 1 { "" } else { "s" }
            ),
            Self::ArgumentType {
                method,
                index,
                expected,
                found,
            } => write!(
                f,
                "argument {} of `{method}` expects {expected}, found {found}",
                index + 1
            ),
            Self::MethodFailed { symbol, message } => write!(f, "{symbol} failed: {message}"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_out_of_range() {
        let err = DispatchError::OutOfRangeSlot {
            class: "Base".into(),
            slot: Slot(1),
            len: 1,
        };
        assert_eq!(
            err.to_string(),
            "slot #1 is out of range for `Base` (table has 1 slot)"
        );
        assert_eq!(err.code(), "D0006");
    }

    #[test]
    fn display_ordering_violation() {
        let err = DispatchError::OrderingViolation {
            class: "Derived".into(),
            reason: OrderingReason::ParentNotBuilt {
                parent: "Base".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "ordering violation for class `Derived`: superclass `Base` has no dispatch table yet"
        );
    }

    #[test]
    fn display_argument_type_is_one_based() {
        let err = DispatchError::ArgumentType {
            method: MethodId::new("greet", vec!["Str".into()]),
            index: 0,
            expected: "Str".into(),
            found: "Int",
        };
        assert_eq!(err.to_string(), "argument 1 of `greet(Str)` expects Str, found Int");
    }
}
