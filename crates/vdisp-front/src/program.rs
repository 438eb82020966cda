//! The build pipeline: from a hierarchy file to frozen tables and objects.

use rustc_hash::FxHashMap;
use vdisp_common::Span;
use vdisp_rt::{
    construct_with, ClassId, Hierarchy, Instance, MethodRegistry, SlotKind, TableDump, Value,
};
use vdisp_script::{compile_method, parse_signature, ScriptError, Signature};

use crate::call::{self, CallOutcome};
use crate::class_graph::order_classes;
use crate::error::LoadError;
use crate::manifest::{span_of, string_origin, CallDef, ClassDef, Manifest};

/// A loaded hierarchy: built classes, named objects and the file's calls.
#[derive(Debug, Default)]
pub struct Program {
    hierarchy: Hierarchy,
    registry: MethodRegistry,
    objects: FxHashMap<String, Instance>,
    /// Object names in creation order.
    object_names: Vec<String>,
    calls: Vec<CallDef>,
}

impl Program {
    /// Parse, order, declare, compile and build everything in `source`.
    pub fn load(source: &str) -> Result<Program, LoadError> {
        let manifest = Manifest::from_str(source)?;
        let order = order_classes(&manifest.classes)?;

        let mut program = Program {
            hierarchy: Hierarchy::new(),
            registry: MethodRegistry::new(),
            objects: FxHashMap::default(),
            object_names: Vec::new(),
            calls: Vec::new(),
        };
        for index in order {
            program.load_class(source, &manifest.classes[index])?;
        }

        for object in &manifest.objects {
            let name = object.name.get_ref();
            let class = program.class_id(object.class.get_ref(), span_of(&object.class))?;
            let inits = object
                .fields
                .iter()
                .map(|(field, value)| (field.as_str(), value.get_ref().to_value()));
            let instance = construct_with(&program.hierarchy, class, inits)
                .map_err(|e| LoadError::dispatch(e, span_of(&object.name)))?;
            program.insert_object(name, instance, Some(span_of(&object.name)))?;
        }

        program.calls = manifest.calls;
        tracing::info!(
            classes = program.hierarchy.len(),
            objects = program.object_names.len(),
            calls = program.calls.len(),
            "loaded hierarchy"
        );
        Ok(program)
    }

    fn load_class(&mut self, source: &str, def: &ClassDef) -> Result<(), LoadError> {
        let name = def.name.get_ref();
        let name_span = span_of(&def.name);
        let parent = match &def.extends {
            Some(ext) => Some(self.class_id(ext.get_ref(), span_of(ext))?),
            None => None,
        };
        let fields = def.fields.iter().map(|f| f.get_ref().clone()).collect();
        let class = self
            .hierarchy
            .define_class(name.as_str(), parent, fields)
            .map_err(|e| LoadError::dispatch(e, name_span))?;
        let script_error = |error: ScriptError| LoadError::Script {
            class: name.clone(),
            error,
        };

        // Declare every method before compiling any body, so bodies can
        // call methods declared after them.
        let mut signatures: Vec<Signature> = Vec::with_capacity(def.methods.len());
        for method in &def.methods {
            let sig_span = span_of(&method.signature);
            let signature = parse_signature(method.signature.get_ref())
                .map_err(|e| script_error(locate(e, source, &method.signature, sig_span)))?;
            let declared = self
                .hierarchy
                .declare_method(&mut self.registry, class, signature.method_id())
                .map_err(|e| LoadError::dispatch(e, sig_span))?;
            if let Some(flag) = &method.is_override {
                let overrides = declared.kind == SlotKind::Overridden;
                if *flag.get_ref() != overrides {
                    return Err(LoadError::OverrideMismatch {
                        class: name.clone(),
                        method: signature.method_id(),
                        expected_override: *flag.get_ref(),
                        span: sig_span,
                    });
                }
            }
            signatures.push(signature);
        }

        for (method, signature) in def.methods.iter().zip(&signatures) {
            let body_span = span_of(&method.body);
            let implementation = compile_method(
                &self.hierarchy,
                &self.registry,
                class,
                signature,
                method.body.get_ref(),
            )
            .map_err(|e| script_error(locate(e, source, &method.body, body_span)))?;
            self.hierarchy
                .implement(class, &signature.method_id(), implementation)
                .map_err(|e| LoadError::dispatch(e, span_of(&method.signature)))?;
        }

        self.hierarchy
            .build_table(class)
            .map_err(|e| LoadError::dispatch(e, name_span))?;
        tracing::debug!(class = %name, methods = def.methods.len(), "loaded class");
        Ok(())
    }

    fn class_id(&self, name: &str, span: Span) -> Result<ClassId, LoadError> {
        self.hierarchy.resolve(name).ok_or_else(|| {
            LoadError::dispatch(
                vdisp_rt::DispatchError::UnknownClass {
                    name: name.to_string(),
                },
                span,
            )
        })
    }

    /// Add a named object. Names are unique within a program.
    pub fn insert_object(
        &mut self,
        name: &str,
        instance: Instance,
        span: Option<Span>,
    ) -> Result<(), LoadError> {
        if self.objects.contains_key(name) {
            return Err(LoadError::DuplicateObject {
                name: name.to_string(),
                span,
            });
        }
        self.objects.insert(name.to_string(), instance);
        self.object_names.push(name.to_string());
        Ok(())
    }

    /// Construct an instance of `class` without naming it.
    pub fn construct<'a>(
        &self,
        class: &str,
        inits: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Instance, LoadError> {
        let id = self.hierarchy.resolve(class).ok_or_else(|| {
            LoadError::dispatch(
                vdisp_rt::DispatchError::UnknownClass {
                    name: class.to_string(),
                },
                None,
            )
        })?;
        construct_with(&self.hierarchy, id, inits).map_err(|e| LoadError::dispatch(e, None))
    }

    pub fn object(&self, name: &str) -> Option<&Instance> {
        self.objects.get(name)
    }

    /// Objects in creation order.
    pub fn objects(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.object_names
            .iter()
            .filter_map(|name| Some((name.as_str(), self.objects.get(name)?)))
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn calls(&self) -> &[CallDef] {
        &self.calls
    }

    /// Dumps of every class table, in definition order.
    pub fn dumps(&self) -> Vec<TableDump> {
        self.hierarchy
            .iter()
            .filter_map(|class| self.hierarchy.dump(class.id()))
            .collect()
    }

    /// Run every `[[call]]` of the file, in order.
    pub fn run(&self) -> Vec<CallOutcome> {
        self.calls.iter().map(|c| call::run_call(self, c)).collect()
    }
}

/// Rebase a script error onto the manifest. When the value's text cannot
/// be mapped offset-for-offset, point at the whole value instead.
fn locate(
    error: ScriptError,
    source: &str,
    value: &toml::Spanned<String>,
    value_span: Span,
) -> ScriptError {
    match string_origin(source, value) {
        Some(origin) => error.shifted(origin),
        None => ScriptError {
            span: value_span,
            related: None,
            ..error
        },
    }
}
