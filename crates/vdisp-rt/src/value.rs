//! Runtime values passed to and returned from virtual methods.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Parameter type name that accepts any value.
pub const ANY_TYPE: &str = "Any";

/// A runtime value. Cheap to clone; strings are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Unit,
    Int(i64),
    Bool(bool),
    Str(Arc<str>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// The type name used in method signatures.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Str(_) => "Str",
        }
    }

    /// Whether `ty` names a type a parameter can be declared with.
    pub fn is_type_name(ty: &str) -> bool {
        matches!(ty, "Unit" | "Int" | "Bool" | "Str") || ty == ANY_TYPE
    }

    /// Whether this value may be passed to a parameter declared as `ty`.
    pub fn conforms_to(&self, ty: &str) -> bool {
        ty == ANY_TYPE || ty == self.type_name()
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Display form with strings quoted, so `"1"` and `1` read differently.
    pub fn quoted(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", &**s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_and_conformance() {
        assert_eq!(Value::Int(1).type_name(), "Int");
        assert!(Value::Int(1).conforms_to("Int"));
        assert!(Value::Int(1).conforms_to(ANY_TYPE));
        assert!(!Value::Int(1).conforms_to("Str"));
        assert!(Value::Unit.conforms_to("Unit"));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Unit.to_string(), "()");
        assert_eq!(Value::from(-4).to_string(), "-4");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from("woof").to_string(), "woof");
    }

    #[test]
    fn quoted_marks_strings_only() {
        assert_eq!(Value::from("1").quoted(), "\"1\"");
        assert_eq!(Value::from("a\"b").quoted(), r#""a\"b""#);
        assert_eq!(Value::Int(1).quoted(), "1");
        assert_eq!(Value::Unit.quoted(), "()");
    }

    #[test]
    fn serializes_as_plain_json() {
        let values = vec![Value::Unit, Value::Int(3), Value::Bool(false), Value::from("woof")];
        assert_eq!(
            serde_json::to_string(&values).unwrap(),
            r#"[null,3,false,"woof"]"#
        );
    }
}
