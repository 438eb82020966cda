//! Dispatch tables and the table builder.
//!
//! A table is produced exactly once per class by copying the superclass
//! table, overwriting the slots the class overrides, then appending the
//! slots it introduces. Entries are never reordered or removed, so a slot
//! index stays valid in every descendant.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{DispatchError, OrderingReason};
use crate::hierarchy::{ClassDescriptor, MethodDecl, SlotKind};
use crate::ident::{ClassId, MethodId, Slot};
use crate::layout::Instance;
use crate::value::Value;

/// The callable part of a table entry. The receiver is always passed first.
pub type MethodBody =
    Arc<dyn Fn(&Instance, &[Value]) -> Result<Value, DispatchError> + Send + Sync>;

/// A named method implementation.
///
/// Clones share the same body, which is what lets a subclass table "copy"
/// inherited entries without duplicating code.
#[derive(Clone)]
pub struct Implementation {
    symbol: Arc<str>,
    body: MethodBody,
}

impl Implementation {
    pub fn new<F>(symbol: impl AsRef<str>, body: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        Self::from_body(symbol, Arc::new(body))
    }

    pub fn from_body(symbol: impl AsRef<str>, body: MethodBody) -> Self {
        Self {
            symbol: Arc::from(symbol.as_ref()),
            body,
        }
    }

    /// An implementation that ignores its arguments and returns `value`.
    pub fn constant(symbol: impl AsRef<str>, value: Value) -> Self {
        Self::new(symbol, move |_, _| Ok(value.clone()))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn call(&self, receiver: &Instance, args: &[Value]) -> Result<Value, DispatchError> {
        (self.body)(receiver, args)
    }

    /// Whether both implementations share one body.
    pub fn same_body(&self, other: &Implementation) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Implementation").field(&self.symbol).finish()
    }
}

/// One slot of a dispatch table.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub method: MethodId,
    /// The class that supplied `implementation`.
    pub owner: ClassId,
    pub owner_name: Arc<str>,
    pub implementation: Implementation,
}

/// The frozen, shared dispatch table of one class.
#[derive(Debug)]
pub struct DispatchTable {
    class: ClassId,
    class_name: Arc<str>,
    entries: Box<[TableEntry]>,
}

impl DispatchTable {
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, slot: Slot) -> Option<&TableEntry> {
        self.entries.get(slot.index())
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Same length, and the same identity, owner and body in every slot.
    pub fn structurally_eq(&self, other: &DispatchTable) -> bool {
        self.class == other.class
            && self.entries.len() == other.entries.len()
            && self.entries.iter().zip(other.entries.iter()).all(|(a, b)| {
                a.method == b.method
                    && a.owner == b.owner
                    && a.implementation.same_body(&b.implementation)
            })
    }
}

/// Build the dispatch table of `class` from its superclass's frozen table.
///
/// Root classes pass `None` and start from an empty table. A class with a
/// superclass must be handed exactly that superclass's table, otherwise the
/// build fails instead of falling back to an empty or foreign table.
pub fn build_table(
    class: &ClassDescriptor,
    parent: Option<&DispatchTable>,
) -> Result<DispatchTable, DispatchError> {
    let ordering = |reason| DispatchError::OrderingViolation {
        class: class.name().to_string(),
        reason,
    };

    let mut entries: Vec<TableEntry> = match (class.parent(), parent) {
        (None, None) => Vec::new(),
        (Some(expected), Some(table)) if table.class() == expected => table.entries().to_vec(),
        (Some(_), Some(table)) | (None, Some(table)) => {
            return Err(ordering(OrderingReason::WrongParentTable {
                found: table.class_name().to_string(),
            }))
        }
        (Some(_), None) => {
            return Err(ordering(OrderingReason::ParentNotBuilt {
                parent: class.parent_name().unwrap_or_default().to_string(),
            }))
        }
    };

    let entry_for = |decl: &MethodDecl| -> Result<TableEntry, DispatchError> {
        let implementation =
            decl.implementation
                .clone()
                .ok_or_else(|| DispatchError::Unimplemented {
                    class: class.name().to_string(),
                    method: decl.method.clone(),
                })?;
        Ok(TableEntry {
            method: decl.method.clone(),
            owner: class.id(),
            owner_name: class.shared_name(),
            implementation,
        })
    };

    for decl in class.methods().iter().filter(|d| d.kind == SlotKind::Overridden) {
        let entry = entry_for(decl)?;
        let len = entries.len();
        match entries.get_mut(decl.slot.index()) {
            Some(existing) => *existing = entry,
            None => {
                return Err(ordering(OrderingReason::SlotGap {
                    expected: Slot(len as u32),
                    found: decl.slot,
                }))
            }
        }
    }

    let mut introduced: Vec<_> = class
        .methods()
        .iter()
        .filter(|d| d.kind == SlotKind::Introduced)
        .collect();
    introduced.sort_by_key(|d| d.slot);
    for decl in introduced {
        let expected = Slot(entries.len() as u32);
        if decl.slot != expected {
            return Err(ordering(OrderingReason::SlotGap {
                expected,
                found: decl.slot,
            }));
        }
        entries.push(entry_for(decl)?);
    }

    Ok(DispatchTable {
        class: class.id(),
        class_name: class.shared_name(),
        entries: entries.into_boxed_slice(),
    })
}

/// How a slot came to be in a class's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOrigin {
    Inherited,
    Override,
    New,
}

impl fmt::Display for EntryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryOrigin::Inherited => write!(f, "inherited"),
            EntryOrigin::Override => write!(f, "override"),
            EntryOrigin::New => write!(f, "new"),
        }
    }
}

/// A printable, serializable view of one frozen table.
#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub class: String,
    pub extends: Option<String>,
    pub slots: Vec<SlotDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotDump {
    pub slot: u32,
    pub method: String,
    pub symbol: String,
    pub owner: String,
    pub origin: EntryOrigin,
}

impl fmt::Display for TableDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class)?;
        if let Some(parent) = &self.extends {
            write!(f, " extends {parent}")?;
        }
        let n = self.slots.len();
        writeln!(f, " ({n} slot{})", if n == 1 { "" } else { "s" })?;
        for slot in &self.slots {
            write!(f, "  #{} {} -> {}", slot.slot, slot.method, slot.symbol)?;
            match slot.origin {
                EntryOrigin::Inherited => writeln!(f, " [inherited from {}]", slot.owner)?,
                origin => writeln!(f, " [{origin}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Hierarchy;
    use crate::registry::MethodRegistry;

    fn speak(symbol: &str) -> Implementation {
        Implementation::constant(symbol, Value::from(symbol))
    }

    #[test]
    fn root_table_starts_empty_and_appends() {
        let mut h = Hierarchy::new();
        let mut reg = MethodRegistry::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        h.define_method(&mut reg, base, MethodId::nullary("speak"), speak("Base.speak"))
            .unwrap();

        let table = build_table(h.get(base).unwrap(), None).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(Slot(0)).unwrap().implementation.symbol(), "Base.speak");
    }

    #[test]
    fn subclass_requires_parent_table() {
        let mut h = Hierarchy::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        let derived = h.define_class("Derived", Some(base), vec![]).unwrap();

        let err = build_table(h.get(derived).unwrap(), None).unwrap_err();
        assert_eq!(
            err,
            DispatchError::OrderingViolation {
                class: "Derived".into(),
                reason: OrderingReason::ParentNotBuilt {
                    parent: "Base".into()
                },
            }
        );
    }

    #[test]
    fn foreign_parent_table_is_rejected() {
        let mut h = Hierarchy::new();
        let a = h.define_class("A", None, vec![]).unwrap();
        let b = h.define_class("B", None, vec![]).unwrap();
        let a_table = build_table(h.get(a).unwrap(), None).unwrap();

        let err = build_table(h.get(b).unwrap(), Some(&a_table)).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::OrderingViolation {
                reason: OrderingReason::WrongParentTable { .. },
                ..
            }
        ));
    }

    #[test]
    fn declared_but_unimplemented_method_fails_the_build() {
        let mut h = Hierarchy::new();
        let mut reg = MethodRegistry::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        h.declare_method(&mut reg, base, MethodId::nullary("speak")).unwrap();

        let err = build_table(h.get(base).unwrap(), None).unwrap_err();
        assert_eq!(err.code(), "D0009");
    }

    #[test]
    fn building_twice_is_structurally_identical() {
        let mut h = Hierarchy::new();
        let mut reg = MethodRegistry::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        h.define_method(&mut reg, base, MethodId::nullary("speak"), speak("Base.speak"))
            .unwrap();
        h.define_method(&mut reg, base, MethodId::nullary("run"), speak("Base.run"))
            .unwrap();

        let first = build_table(h.get(base).unwrap(), None).unwrap();
        let second = build_table(h.get(base).unwrap(), None).unwrap();
        assert!(first.structurally_eq(&second));
    }
}
