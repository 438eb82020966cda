//! Late-bound method invocation.
//!
//! The dispatcher only ever looks at the receiver's own table: the static
//! type a caller used to find the slot plays no part at run time.

use crate::error::DispatchError;
use crate::ident::Slot;
use crate::layout::Instance;
use crate::table::TableEntry;
use crate::value::Value;

/// The entry at `slot` in the receiver's table.
pub fn lookup(instance: &Instance, slot: Slot) -> Result<&TableEntry, DispatchError> {
    let table = instance.table();
    table.get(slot).ok_or_else(|| DispatchError::OutOfRangeSlot {
        class: table.class_name().to_string(),
        slot,
        len: table.len(),
    })
}

/// Invoke whatever implementation the receiver's table holds at `slot`.
///
/// Arguments are checked against the parameter list of the slot's method
/// identity before the body runs.
pub fn invoke(instance: &Instance, slot: Slot, args: &[Value]) -> Result<Value, DispatchError> {
    let entry = lookup(instance, slot)?;
    check_args(entry, args)?;
    tracing::trace!(
        class = instance.class_name(),
        %slot,
        method = %entry.method,
        target = entry.implementation.symbol(),
        "dispatch"
    );
    entry.implementation.call(instance, args)
}

fn check_args(entry: &TableEntry, args: &[Value]) -> Result<(), DispatchError> {
    let params = &entry.method.params;
    if params.len() != args.len() {
        return Err(DispatchError::ArityMismatch {
            method: entry.method.clone(),
            expected: params.len(),
            found: args.len(),
        });
    }
    for (index, (param, arg)) in params.iter().zip(args).enumerate() {
        if !arg.conforms_to(param) {
            return Err(DispatchError::ArgumentType {
                method: entry.method.clone(),
                index,
                expected: param.clone(),
                found: arg.type_name(),
            });
        }
    }
    Ok(())
}

impl Instance {
    /// Shorthand for [`invoke`] with `self` as the receiver.
    pub fn invoke(&self, slot: Slot, args: &[Value]) -> Result<Value, DispatchError> {
        invoke(self, slot, args)
    }
}
