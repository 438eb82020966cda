use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use toml::Spanned;
use vdisp_common::Span;
use vdisp_rt::Value;

use crate::error::LoadError;

/// A parsed hierarchy file: classes, objects and scripted calls.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassDef>,
    #[serde(default, rename = "object")]
    pub objects: Vec<ObjectDef>,
    #[serde(default, rename = "call")]
    pub calls: Vec<CallDef>,
}

/// One `[[class]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDef {
    pub name: Spanned<String>,
    #[serde(default)]
    pub extends: Option<Spanned<String>>,
    #[serde(default)]
    pub fields: Vec<Spanned<String>>,
    #[serde(default, rename = "method")]
    pub methods: Vec<MethodDef>,
}

/// One `[[class.method]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDef {
    pub signature: Spanned<String>,
    pub body: Spanned<String>,
    /// When present, whether the method is expected to override an
    /// inherited slot.
    #[serde(default, rename = "override")]
    pub is_override: Option<Spanned<bool>>,
}

/// One `[[object]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDef {
    pub name: Spanned<String>,
    pub class: Spanned<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Spanned<Scalar>>,
}

/// One `[[call]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallDef {
    pub object: Spanned<String>,
    /// A bare name, or a full signature such as `greet(Str)`.
    pub method: Spanned<String>,
    #[serde(default)]
    pub args: Vec<Spanned<Scalar>>,
    /// Static type used to resolve the slot; defaults to the object's class.
    #[serde(default, rename = "as")]
    pub static_type: Option<Spanned<String>>,
    #[serde(default)]
    pub expect: Option<Spanned<Scalar>>,
}

/// A TOML scalar usable as a runtime value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Scalar {
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(n) => Value::Int(*n),
            Scalar::Str(s) => Value::str(s),
        }
    }
}

impl fmt::Display for CallDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.object.get_ref())?;
        if let Some(ty) = &self.static_type {
            write!(f, " as {}", ty.get_ref())?;
        }
        let method = self.method.get_ref();
        if method.contains('(') {
            return write!(f, ".{method}");
        }
        let args: Vec<_> = self.args.iter().map(|a| a.get_ref().to_value().to_string()).collect();
        write!(f, ".{method}({})", args.join(", "))
    }
}

impl Manifest {
    /// Read and parse a hierarchy file.
    pub fn from_file(path: &Path) -> Result<Manifest, LoadError> {
        let content = read_source(path)?;
        Self::from_str(&content)
    }

    /// Parse a hierarchy file from a string.
    pub fn from_str(content: &str) -> Result<Manifest, LoadError> {
        toml::from_str(content).map_err(|e| LoadError::Manifest {
            message: e.message().trim_end().to_string(),
            span: e.span().map(Span::from),
        })
    }
}

/// Read a hierarchy file into memory.
pub fn read_source(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Byte span of a spanned manifest value.
pub fn span_of<T>(value: &Spanned<T>) -> Span {
    Span::from(value.span())
}

/// Where the text of a string value starts inside the manifest, when it is
/// written so that offsets in the value map one-to-one onto the file.
///
/// Literal strings always qualify. Basic strings only qualify without
/// escapes, since an escape makes the value shorter than its source.
pub fn string_origin(source: &str, value: &Spanned<String>) -> Option<u32> {
    let range = value.span();
    let raw = source.get(range.clone())?;
    let (open, literal) = if raw.starts_with("'''") {
        (3, true)
    } else if raw.starts_with("\"\"\"") {
        (3, false)
    } else if raw.starts_with('\'') {
        (1, true)
    } else if raw.starts_with('"') {
        (1, false)
    } else {
        return None;
    };
    if !literal && raw.contains('\\') {
        return None;
    }
    // a newline right after a multi-line opener is not part of the value
    let skip = match (open, &raw[open..]) {
        (3, rest) if rest.starts_with("\r\n") => 2,
        (3, rest) if rest.starts_with('\n') => 1,
        _ => 0,
    };
    Some((range.start + open + skip) as u32)
}
