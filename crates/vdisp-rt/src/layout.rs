//! Object layout and construction.
//!
//! An instance is its class's frozen table plus one value per field of the
//! class's layout. The table reference is set at construction and never
//! changes, so every later dispatch on the instance sees the same table.

use std::sync::Arc;

use crate::error::DispatchError;
use crate::hierarchy::Hierarchy;
use crate::ident::ClassId;
use crate::table::DispatchTable;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Instance {
    table: Arc<DispatchTable>,
    fields: Box<[Value]>,
}

impl Instance {
    /// The runtime class of the instance.
    pub fn class(&self) -> ClassId {
        self.table.class()
    }

    pub fn class_name(&self) -> &str {
        self.table.class_name()
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    /// Field value by layout index.
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Whether the runtime class is `class` or one of its descendants.
    pub fn is_instance_of(&self, hierarchy: &Hierarchy, class: ClassId) -> bool {
        hierarchy.is_subclass_of(self.class(), class)
    }
}

/// Construct an instance with every field set to `()`.
pub fn construct(hierarchy: &Hierarchy, class: ClassId) -> Result<Instance, DispatchError> {
    construct_with(hierarchy, class, std::iter::empty::<(&str, Value)>())
}

/// Construct an instance, initializing the named fields.
///
/// Fields not named keep `()`. Naming a field outside the class layout is
/// an error. The class table must already be built: construction never
/// builds it implicitly.
pub fn construct_with<I, S>(
    hierarchy: &Hierarchy,
    class: ClassId,
    inits: I,
) -> Result<Instance, DispatchError>
where
    I: IntoIterator<Item = (S, Value)>,
    S: AsRef<str>,
{
    let descriptor = hierarchy.descriptor(class)?;
    let table = descriptor
        .table()
        .ok_or_else(|| DispatchError::ClassNotBuilt {
            class: descriptor.name().to_string(),
        })?;

    let layout = descriptor.field_layout();
    let mut fields = vec![Value::Unit; layout.len()].into_boxed_slice();
    for (name, value) in inits {
        let name = name.as_ref();
        let index = layout
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| DispatchError::UnknownField {
                class: descriptor.name().to_string(),
                field: name.to_string(),
            })?;
        fields[index] = value;
    }

    Ok(Instance {
        table: Arc::clone(table),
        fields,
    })
}
