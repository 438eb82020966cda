//! Virtual dispatch runtime.
//!
//! Classes form a single-inheritance hierarchy. Each class gets one frozen
//! dispatch table built from its superclass's table; every instance of the
//! class refers to that table, and [`dispatch::invoke`] calls whatever the
//! receiver's table holds at a slot.
//!
//! A typical session:
//!
//! 1. define classes top-down with [`Hierarchy::define_class`],
//! 2. declare and implement methods through a [`MethodRegistry`],
//! 3. build tables with [`Hierarchy::build_table`] or [`Hierarchy::build_all`],
//! 4. construct instances with [`construct`] and call through slots.

pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod ident;
pub mod layout;
pub mod registry;
pub mod table;
pub mod value;

pub use dispatch::{invoke, lookup};
pub use error::{DispatchError, OrderingReason};
pub use hierarchy::{ClassDescriptor, Hierarchy, MethodDecl, SlotKind};
pub use ident::{is_identifier, ClassId, MethodId, Slot};
pub use layout::{construct, construct_with, Instance};
pub use registry::{Declared, MethodRegistry};
pub use table::{DispatchTable, EntryOrigin, Implementation, MethodBody, SlotDump, TableDump, TableEntry};
pub use value::{Value, ANY_TYPE};
