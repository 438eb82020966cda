//! Class descriptors and the hierarchy that owns them.
//!
//! The hierarchy is an arena of [`ClassDescriptor`]s linked by optional
//! parent ids. A parent must exist before a child is defined, so the parent
//! graph is acyclic by construction and definition order is a valid
//! top-down build order.

use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{DispatchError, OrderingReason};
use crate::ident::{ClassId, MethodId, Slot};
use crate::registry::{Declared, MethodRegistry};
use crate::table::{self, DispatchTable, EntryOrigin, Implementation, SlotDump, TableDump};

/// Whether a declaration introduced a slot or reused an inherited one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotKind {
    Introduced,
    Overridden,
}

/// A virtual method declared by one class.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub method: MethodId,
    pub slot: Slot,
    pub kind: SlotKind,
    /// Filled in by [`Hierarchy::implement`]; required before the table is built.
    pub implementation: Option<Implementation>,
}

/// One class of the hierarchy.
#[derive(Debug)]
pub struct ClassDescriptor {
    id: ClassId,
    name: Arc<str>,
    parent: Option<ClassId>,
    parent_name: Option<Arc<str>>,
    fields: Vec<String>,
    /// Inherited fields followed by `fields`.
    layout: Arc<[String]>,
    methods: Vec<MethodDecl>,
    table: OnceLock<Arc<DispatchTable>>,
}

impl ClassDescriptor {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    /// Fields declared by this class only.
    pub fn own_fields(&self) -> &[String] {
        &self.fields
    }

    /// The full, prefix-stable field layout of an instance of this class.
    pub fn field_layout(&self) -> &[String] {
        &self.layout
    }

    /// Declared methods in declaration order.
    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    /// The frozen dispatch table, once built.
    pub fn table(&self) -> Option<&Arc<DispatchTable>> {
        self.table.get()
    }
}

/// Owns every class descriptor for its whole lifetime.
#[derive(Debug, Default)]
pub struct Hierarchy {
    classes: Vec<ClassDescriptor>,
    by_name: FxHashMap<String, ClassId>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a class. `parent` must already be defined in this hierarchy.
    pub fn define_class(
        &mut self,
        name: impl Into<String>,
        parent: Option<ClassId>,
        fields: Vec<String>,
    ) -> Result<ClassId, DispatchError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(DispatchError::DuplicateClass { name });
        }

        let (inherited, parent_name) = match parent {
            Some(pid) => {
                let parent = self.descriptor(pid)?;
                (parent.field_layout().to_vec(), Some(parent.shared_name()))
            }
            None => (Vec::new(), None),
        };

        let mut layout = inherited;
        for field in &fields {
            if layout.contains(field) {
                return Err(DispatchError::DuplicateField {
                    class: name,
                    field: field.clone(),
                });
            }
            layout.push(field.clone());
        }

        let id = ClassId(self.classes.len() as u32);
        tracing::debug!(class = %name, id = id.0, parent = ?parent_name, "defined class");
        self.by_name.insert(name.clone(), id);
        self.classes.push(ClassDescriptor {
            id,
            name: Arc::from(name),
            parent,
            parent_name,
            fields,
            layout: Arc::from(layout),
            methods: Vec::new(),
            table: OnceLock::new(),
        });
        Ok(id)
    }

    /// Reserve a slot for `method` in `class` and record the declaration.
    pub fn declare_method(
        &mut self,
        registry: &mut MethodRegistry,
        class: ClassId,
        method: MethodId,
    ) -> Result<Declared, DispatchError> {
        self.ensure_open(class)?;
        let declared = registry.declare(self, class, &method)?;
        self.classes[class.index()].methods.push(MethodDecl {
            method,
            slot: declared.slot,
            kind: declared.kind,
            implementation: None,
        });
        Ok(declared)
    }

    /// Attach the implementation of a method `class` already declared.
    pub fn implement(
        &mut self,
        class: ClassId,
        method: &MethodId,
        implementation: Implementation,
    ) -> Result<(), DispatchError> {
        self.ensure_open(class)?;
        let descriptor = &mut self.classes[class.index()];
        let Some(decl) = descriptor.methods.iter_mut().find(|d| &d.method == method) else {
            return Err(DispatchError::UndeclaredMethod {
                class: descriptor.name.to_string(),
                method: method.clone(),
            });
        };
        if decl.implementation.is_some() {
            return Err(DispatchError::Conflict {
                class: descriptor.name.to_string(),
                method: method.clone(),
            });
        }
        decl.implementation = Some(implementation);
        Ok(())
    }

    /// Declare and implement in one step.
    pub fn define_method(
        &mut self,
        registry: &mut MethodRegistry,
        class: ClassId,
        method: MethodId,
        implementation: Implementation,
    ) -> Result<Declared, DispatchError> {
        let declared = self.declare_method(registry, class, method.clone())?;
        self.implement(class, &method, implementation)?;
        Ok(declared)
    }

    /// Build and freeze the table of `class` from its parent's frozen table.
    ///
    /// A class that is already built returns its existing table unchanged.
    pub fn build_table(&self, class: ClassId) -> Result<Arc<DispatchTable>, DispatchError> {
        let descriptor = self.descriptor(class)?;
        if let Some(table) = descriptor.table.get() {
            return Ok(Arc::clone(table));
        }

        let parent_table = match descriptor.parent {
            Some(pid) => match self.classes[pid.index()].table.get() {
                Some(table) => Some(Arc::clone(table)),
                None => {
                    return Err(DispatchError::OrderingViolation {
                        class: descriptor.name.to_string(),
                        reason: OrderingReason::ParentNotBuilt {
                            parent: self.classes[pid.index()].name.to_string(),
                        },
                    })
                }
            },
            None => None,
        };

        let built = Arc::new(table::build_table(descriptor, parent_table.as_deref())?);
        tracing::debug!(class = %descriptor.name, slots = built.len(), "froze dispatch table");
        Ok(Arc::clone(descriptor.table.get_or_init(|| built)))
    }

    /// Build every class in definition order, which is always top-down.
    pub fn build_all(&self) -> Result<(), DispatchError> {
        for class in &self.classes {
            self.build_table(class.id)?;
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(id.index())
    }

    /// Like [`get`](Self::get), but unknown ids are an error.
    pub fn descriptor(&self, id: ClassId) -> Result<&ClassDescriptor, DispatchError> {
        self.get(id).ok_or_else(|| DispatchError::UnknownClass {
            name: format!("#{}", id.0),
        })
    }

    pub fn name(&self, id: ClassId) -> &str {
        self.get(id).map_or("<unknown>", |c| c.name())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All classes in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.iter()
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.get(id).and_then(|c| c.parent)
    }

    /// `id` followed by each of its ancestors up to the root.
    pub fn lineage(&self, id: ClassId) -> Lineage<'_> {
        Lineage {
            hierarchy: self,
            next: self.get(id).map(|c| c.id),
        }
    }

    /// Whether `class` is `ancestor` or one of its descendants.
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.lineage(class).any(|c| c == ancestor)
    }

    pub fn table(&self, id: ClassId) -> Option<&Arc<DispatchTable>> {
        self.get(id).and_then(|c| c.table())
    }

    pub fn field_layout(&self, id: ClassId) -> &[String] {
        self.get(id).map(|c| c.field_layout()).unwrap_or(&[])
    }

    pub fn field_index(&self, id: ClassId, field: &str) -> Option<usize> {
        self.field_layout(id).iter().position(|f| f == field)
    }

    /// A printable view of a built table, with each slot's origin.
    pub fn dump(&self, id: ClassId) -> Option<TableDump> {
        let class = self.get(id)?;
        let table = class.table()?;
        let slots = table
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let origin = if entry.owner != id {
                    EntryOrigin::Inherited
                } else if class
                    .methods
                    .iter()
                    .any(|d| d.slot.index() == i && d.kind == SlotKind::Overridden)
                {
                    EntryOrigin::Override
                } else {
                    EntryOrigin::New
                };
                SlotDump {
                    slot: i as u32,
                    method: entry.method.to_string(),
                    symbol: entry.implementation.symbol().to_string(),
                    owner: entry.owner_name.to_string(),
                    origin,
                }
            })
            .collect();
        Some(TableDump {
            class: class.name.to_string(),
            extends: class.parent_name.as_deref().map(str::to_string),
            slots,
        })
    }

    /// Declarations are only accepted while the class table is not frozen.
    fn ensure_open(&self, class: ClassId) -> Result<(), DispatchError> {
        let descriptor = self.descriptor(class)?;
        if descriptor.table.get().is_some() {
            return Err(DispatchError::OrderingViolation {
                class: descriptor.name.to_string(),
                reason: OrderingReason::TableFrozen,
            });
        }
        Ok(())
    }
}

/// Iterator over a class and its ancestors, most-derived first.
pub struct Lineage<'a> {
    hierarchy: &'a Hierarchy,
    next: Option<ClassId>,
}

impl Iterator for Lineage<'_> {
    type Item = ClassId;

    fn next(&mut self) -> Option<ClassId> {
        let current = self.next?;
        self.next = self.hierarchy.parent(current);
        Some(current)
    }
}
