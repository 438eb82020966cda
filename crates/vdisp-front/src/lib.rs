//! Class-definition front end.
//!
//! Loads a hierarchy file (TOML) into a [`Program`]: classes are ordered
//! superclass-first, their methods declared through a per-load
//! [`vdisp_rt::MethodRegistry`], bodies compiled with `vdisp-script`, and
//! every table built and frozen top-down.

pub mod call;
pub mod class_graph;
pub mod diagnostics;
pub mod error;
pub mod manifest;
pub mod program;

pub use call::{call_instance, call_object, resolve_method, CallOutcome};
pub use diagnostics::{render, to_json, DiagnosticOptions};
pub use error::LoadError;
pub use manifest::{read_source, Manifest, Scalar};
pub use program::Program;
