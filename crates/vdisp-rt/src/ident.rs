//! Identifiers shared by every part of the runtime.

use std::fmt;

use serde::Serialize;

/// A class within one [`Hierarchy`](crate::Hierarchy), assigned densely in
/// definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An index into a dispatch table.
///
/// A method identity keeps the same slot in the table of the class that
/// introduced it and in the table of every descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Slot(pub u32);

impl Slot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The identity of a virtual method: its name plus ordered parameter types.
///
/// `greet(Str)` and `greet(Int)` are different methods and get different
/// slots. Parameter names are not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MethodId {
    pub name: String,
    pub params: Vec<String>,
}

impl MethodId {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// A method that takes no arguments besides the receiver.
    pub fn nullary(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Parse the display form, e.g. `greet(Str, Int)`. A bare name is a
    /// nullary method.
    pub fn parse(text: &str) -> Result<MethodId, String> {
        let text = text.trim();
        let (name, params) = match text.find('(') {
            None => (text, Vec::new()),
            Some(open) => {
                let Some(inner) = text[open + 1..].strip_suffix(')') else {
                    return Err(format!("missing `)` in method signature `{text}`"));
                };
                let params = if inner.trim().is_empty() {
                    Vec::new()
                } else {
                    inner.split(',').map(|p| p.trim().to_string()).collect()
                };
                (text[..open].trim(), params)
            }
        };
        if !is_identifier(name) {
            return Err(format!("invalid method name `{name}`"));
        }
        if let Some(bad) = params.iter().find(|p| !is_identifier(p)) {
            return Err(format!("invalid parameter type `{bad}` in `{text}`"));
        }
        Ok(MethodId::new(name, params))
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`: class, method, field and parameter type names.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
