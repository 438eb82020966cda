//! End-to-end runtime scenarios: hierarchy, tables, construction, dispatch.

use std::sync::Arc;

use vdisp_rt::{
    construct, construct_with, invoke, DispatchError, Hierarchy, Implementation, MethodId,
    MethodRegistry, OrderingReason, Slot, Value,
};

fn says(symbol: &str) -> Implementation {
    let out = symbol.to_string();
    Implementation::new(symbol, move |_, _| Ok(Value::from(out.as_str())))
}

/// Base { speak, sleep } and Derived : Base { override speak, new run }.
fn base_derived() -> (Hierarchy, MethodRegistry) {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let base = h.define_class("Base", None, vec![]).unwrap();
    let derived = h.define_class("Derived", Some(base), vec![]).unwrap();
    h.define_method(&mut reg, base, MethodId::nullary("speak"), says("Base.speak"))
        .unwrap();
    h.define_method(&mut reg, base, MethodId::nullary("sleep"), says("Base.sleep"))
        .unwrap();
    h.define_method(&mut reg, derived, MethodId::nullary("speak"), says("Derived.speak"))
        .unwrap();
    h.define_method(&mut reg, derived, MethodId::nullary("run"), says("Derived.run"))
        .unwrap();
    h.build_all().unwrap();
    (h, reg)
}

#[test]
fn override_is_selected_by_runtime_class() {
    let (h, reg) = base_derived();
    let base = h.resolve("Base").unwrap();
    let derived = h.resolve("Derived").unwrap();

    // The call site resolves against the static type Base...
    let speak = reg.resolve(&h, base, &MethodId::nullary("speak")).unwrap();
    let sleep = reg.resolve(&h, base, &MethodId::nullary("sleep")).unwrap();
    assert_eq!((speak, sleep), (Slot(0), Slot(1)));

    // ...and the receiver's table decides what runs.
    let b = construct(&h, base).unwrap();
    let d = construct(&h, derived).unwrap();
    assert_eq!(invoke(&b, speak, &[]).unwrap(), Value::from("Base.speak"));
    assert_eq!(invoke(&d, speak, &[]).unwrap(), Value::from("Derived.speak"));
    assert_eq!(invoke(&d, sleep, &[]).unwrap(), Value::from("Base.sleep"));

    let run = reg.resolve(&h, derived, &MethodId::nullary("run")).unwrap();
    assert_eq!(run, Slot(2));
    assert_eq!(invoke(&d, run, &[]).unwrap(), Value::from("Derived.run"));
    assert!(matches!(
        invoke(&b, run, &[]),
        Err(DispatchError::OutOfRangeSlot { len: 2, .. })
    ));
}

#[test]
fn subclass_tables_extend_the_parent_prefix() {
    let (h, _) = base_derived();
    let base = h.table(h.resolve("Base").unwrap()).unwrap();
    let derived = h.table(h.resolve("Derived").unwrap()).unwrap();

    assert!(derived.len() >= base.len());
    for (b, d) in base.entries().iter().zip(derived.entries()) {
        assert_eq!(b.method, d.method);
    }
    // slot 1 is inherited unchanged and shares the parent's body
    assert!(base.entries()[1]
        .implementation
        .same_body(&derived.entries()[1].implementation));
}

fn symbols(h: &Hierarchy, class: &str) -> Vec<String> {
    let table = h.table(h.resolve(class).unwrap()).unwrap();
    table
        .entries()
        .iter()
        .map(|e| e.implementation.symbol().to_string())
        .collect()
}

#[test]
fn base_and_derived_tables_hold_exactly_their_slots() {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let base = h.define_class("Base", None, vec![]).unwrap();
    let derived = h.define_class("Derived", Some(base), vec![]).unwrap();
    h.define_method(&mut reg, base, MethodId::nullary("speak"), says("Base.speak"))
        .unwrap();
    h.define_method(&mut reg, derived, MethodId::nullary("speak"), says("Derived.speak"))
        .unwrap();
    h.define_method(&mut reg, derived, MethodId::nullary("run"), says("Derived.run"))
        .unwrap();
    h.build_all().unwrap();

    assert_eq!(symbols(&h, "Base"), vec!["Base.speak"]);
    assert_eq!(symbols(&h, "Derived"), vec!["Derived.speak", "Derived.run"]);

    let b = construct(&h, base).unwrap();
    assert!(matches!(
        invoke(&b, Slot(1), &[]),
        Err(DispatchError::OutOfRangeSlot { len: 1, .. })
    ));
}

#[test]
fn table_length_grows_only_with_new_methods() {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let base = h.define_class("Base", None, vec![]).unwrap();
    let same = h.define_class("OverridesOnly", Some(base), vec![]).unwrap();
    let more = h.define_class("AddsOne", Some(base), vec![]).unwrap();
    for name in ["speak", "sleep"] {
        h.define_method(&mut reg, base, MethodId::nullary(name), says("Base"))
            .unwrap();
    }
    h.define_method(&mut reg, same, MethodId::nullary("speak"), says("OverridesOnly"))
        .unwrap();
    h.define_method(&mut reg, same, MethodId::nullary("sleep"), says("OverridesOnly"))
        .unwrap();
    h.define_method(&mut reg, more, MethodId::nullary("speak"), says("AddsOne"))
        .unwrap();
    h.define_method(&mut reg, more, MethodId::nullary("run"), says("AddsOne"))
        .unwrap();
    h.build_all().unwrap();

    let len = |id| h.table(id).unwrap().len();
    assert_eq!(len(base), 2);
    assert_eq!(len(same), len(base));
    assert_eq!(len(more), len(base) + 1);
    assert_eq!(symbols(&h, "OverridesOnly"), vec!["OverridesOnly", "OverridesOnly"]);
    assert_eq!(symbols(&h, "AddsOne"), vec!["AddsOne", "Base", "AddsOne"]);
}

#[test]
fn multi_level_override_keeps_the_slot() {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let a = h.define_class("A", None, vec![]).unwrap();
    let b = h.define_class("B", Some(a), vec![]).unwrap();
    let c = h.define_class("C", Some(b), vec![]).unwrap();
    let name = MethodId::nullary("name");
    h.define_method(&mut reg, a, MethodId::nullary("pad"), says("A.pad"))
        .unwrap();
    h.define_method(&mut reg, a, name.clone(), says("A.name")).unwrap();
    h.define_method(&mut reg, c, name.clone(), says("C.name")).unwrap();
    h.build_all().unwrap();

    let slot = reg.resolve(&h, a, &name).unwrap();
    assert_eq!(reg.resolve(&h, b, &name), Some(slot));
    assert_eq!(reg.resolve(&h, c, &name), Some(slot));

    let results: Vec<_> = [a, b, c]
        .into_iter()
        .map(|class| invoke(&construct(&h, class).unwrap(), slot, &[]).unwrap())
        .collect();
    assert_eq!(
        results,
        vec![Value::from("A.name"), Value::from("A.name"), Value::from("C.name")]
    );
}

#[test]
fn building_out_of_order_fails_without_side_effects() {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let base = h.define_class("Base", None, vec![]).unwrap();
    let derived = h.define_class("Derived", Some(base), vec![]).unwrap();
    h.define_method(&mut reg, base, MethodId::nullary("speak"), says("Base.speak"))
        .unwrap();

    let err = h.build_table(derived).unwrap_err();
    assert_eq!(
        err,
        DispatchError::OrderingViolation {
            class: "Derived".into(),
            reason: OrderingReason::ParentNotBuilt {
                parent: "Base".into()
            }
        }
    );
    assert!(matches!(
        construct(&h, derived),
        Err(DispatchError::ClassNotBuilt { .. })
    ));

    h.build_table(base).unwrap();
    let table = h.build_table(derived).unwrap();
    assert_eq!(table.len(), 1);
}

#[test]
fn rebuilding_is_idempotent() {
    let (h, _) = base_derived();
    let derived = h.resolve("Derived").unwrap();
    let first = h.build_table(derived).unwrap();
    let second = h.build_table(derived).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.structurally_eq(&second));
}

#[test]
fn fields_read_by_bodies_use_the_inherited_index() {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let animal = h.define_class("Animal", None, vec!["name".into()]).unwrap();
    let dog = h.define_class("Dog", Some(animal), vec!["breed".into()]).unwrap();
    let name_at = h.field_index(animal, "name").unwrap();
    h.define_method(
        &mut reg,
        animal,
        MethodId::nullary("name"),
        Implementation::new("Animal.name", move |this, _| {
            Ok(this.field(name_at).cloned().unwrap_or_default())
        }),
    )
    .unwrap();
    h.build_all().unwrap();

    let rex = construct_with(&h, dog, [("breed", Value::from("lab")), ("name", Value::from("Rex"))])
        .unwrap();
    assert_eq!(rex.invoke(Slot(0), &[]).unwrap(), Value::from("Rex"));
}

#[test]
fn concurrent_dispatch_on_shared_tables() {
    let (h, reg) = base_derived();
    let base = h.resolve("Base").unwrap();
    let derived = h.resolve("Derived").unwrap();
    let speak = reg.resolve(&h, base, &MethodId::nullary("speak")).unwrap();
    let objects: Vec<_> = (0..8)
        .map(|i| construct(&h, if i % 2 == 0 { base } else { derived }).unwrap())
        .collect();

    std::thread::scope(|s| {
        for (i, obj) in objects.iter().enumerate() {
            s.spawn(move || {
                let expected = if i % 2 == 0 { "Base.speak" } else { "Derived.speak" };
                for _ in 0..100 {
                    assert_eq!(obj.invoke(speak, &[]).unwrap(), Value::from(expected));
                }
            });
        }
    });
}

#[test]
fn sibling_slots_do_not_leak_across_branches() {
    let mut h = Hierarchy::new();
    let mut reg = MethodRegistry::new();
    let base = h.define_class("Base", None, vec![]).unwrap();
    let dog = h.define_class("Dog", Some(base), vec![]).unwrap();
    let cat = h.define_class("Cat", Some(base), vec![]).unwrap();
    h.define_method(&mut reg, base, MethodId::nullary("speak"), says("Base.speak"))
        .unwrap();
    h.define_method(&mut reg, dog, MethodId::nullary("fetch"), says("Dog.fetch"))
        .unwrap();
    h.define_method(&mut reg, cat, MethodId::nullary("purr"), says("Cat.purr"))
        .unwrap();
    h.build_all().unwrap();

    let fetch = reg.resolve(&h, dog, &MethodId::nullary("fetch")).unwrap();
    let purr = reg.resolve(&h, cat, &MethodId::nullary("purr")).unwrap();
    assert_eq!(fetch, purr);
    assert_eq!(
        construct(&h, dog).unwrap().invoke(fetch, &[]).unwrap(),
        Value::from("Dog.fetch")
    );
    assert_eq!(
        construct(&h, cat).unwrap().invoke(purr, &[]).unwrap(),
        Value::from("Cat.purr")
    );
}
