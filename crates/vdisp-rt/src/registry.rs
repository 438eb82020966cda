//! Method registry: slot assignment for virtual method identities.
//!
//! A registry is scoped to one hierarchy-construction session and is passed
//! explicitly to every step that declares or resolves methods.
//!
//! Slots are numbered per inheritance chain. A class's first new method
//! takes the slot right after everything it inherits, so tables stay dense
//! and a method keeps its slot in every descendant. Unrelated siblings may
//! hand out the same index to different methods; nothing ever dispatches
//! across siblings.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{DispatchError, OrderingReason};
use crate::hierarchy::{Hierarchy, SlotKind};
use crate::ident::{ClassId, MethodId, Slot};

/// The outcome of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declared {
    pub slot: Slot,
    pub kind: SlotKind,
}

/// Per-class slot record.
#[derive(Debug, Clone, Default)]
struct ClassSlots {
    /// Every identity reachable from this class, inherited or declared.
    slots: FxHashMap<MethodId, Slot>,
    /// Identity occupying each slot, indexed by slot.
    by_slot: Vec<MethodId>,
    introduced: Vec<Slot>,
    overridden: Vec<Slot>,
    declared: FxHashSet<MethodId>,
    /// First subclass that copied this record. Once set, new slots here
    /// would collide with slots already numbered in that subclass.
    sealed_by: Option<ClassId>,
}

impl ClassSlots {
    fn inherit(&self) -> ClassSlots {
        ClassSlots {
            slots: self.slots.clone(),
            by_slot: self.by_slot.clone(),
            ..ClassSlots::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct MethodRegistry {
    classes: FxHashMap<ClassId, ClassSlots>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `method` on `class`.
    ///
    /// If an ancestor already declared the identity this is an override and
    /// the inherited slot is returned; otherwise the next slot is allocated.
    /// Declaring the same identity twice in one class is a conflict.
    pub fn declare(
        &mut self,
        hierarchy: &Hierarchy,
        class: ClassId,
        method: &MethodId,
    ) -> Result<Declared, DispatchError> {
        let descriptor = hierarchy.descriptor(class)?;
        if descriptor.table().is_some() {
            return Err(DispatchError::OrderingViolation {
                class: descriptor.name().to_string(),
                reason: OrderingReason::TableFrozen,
            });
        }

        let record = self.open(hierarchy, class);
        if record.declared.contains(method) {
            return Err(DispatchError::Conflict {
                class: descriptor.name().to_string(),
                method: method.clone(),
            });
        }

        if let Some(&slot) = record.slots.get(method) {
            record.declared.insert(method.clone());
            record.overridden.push(slot);
            tracing::debug!(class = descriptor.name(), %method, %slot, "override");
            return Ok(Declared {
                slot,
                kind: SlotKind::Overridden,
            });
        }

        if let Some(subclass) = record.sealed_by {
            return Err(DispatchError::OrderingViolation {
                class: descriptor.name().to_string(),
                reason: OrderingReason::SlotsHandedOut {
                    subclass: hierarchy.name(subclass).to_string(),
                },
            });
        }

        let slot = Slot(record.by_slot.len() as u32);
        record.declared.insert(method.clone());
        record.slots.insert(method.clone(), slot);
        record.by_slot.push(method.clone());
        record.introduced.push(slot);
        tracing::debug!(class = descriptor.name(), %method, %slot, "new virtual method");
        Ok(Declared {
            slot,
            kind: SlotKind::Introduced,
        })
    }

    /// Map a static method identity to its slot, as seen from `class`.
    pub fn resolve(&self, hierarchy: &Hierarchy, class: ClassId, method: &MethodId) -> Option<Slot> {
        self.nearest(hierarchy, class)?.slots.get(method).copied()
    }

    /// Every identity named `name` reachable from `class`, in slot order.
    pub fn candidates(&self, hierarchy: &Hierarchy, class: ClassId, name: &str) -> Vec<(MethodId, Slot)> {
        let Some(record) = self.nearest(hierarchy, class) else {
            return Vec::new();
        };
        record
            .by_slot
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name == name)
            .map(|(i, m)| (m.clone(), Slot(i as u32)))
            .collect()
    }

    /// Number of slots in the table `class` will get.
    pub fn slot_count(&self, hierarchy: &Hierarchy, class: ClassId) -> usize {
        self.nearest(hierarchy, class).map_or(0, |r| r.by_slot.len())
    }

    /// The identity occupying `slot` in `class`'s table.
    pub fn method_at(&self, hierarchy: &Hierarchy, class: ClassId, slot: Slot) -> Option<&MethodId> {
        self.nearest(hierarchy, class)?.by_slot.get(slot.index())
    }

    /// Slots `class` itself introduced, in allocation order.
    pub fn introduced(&self, class: ClassId) -> &[Slot] {
        self.classes.get(&class).map_or(&[], |r| r.introduced.as_slice())
    }

    /// Inherited slots `class` supplies its own implementation for.
    pub fn overridden(&self, class: ClassId) -> &[Slot] {
        self.classes.get(&class).map_or(&[], |r| r.overridden.as_slice())
    }

    /// The record for `class`, creating it (and any missing ancestors) by
    /// copying the parent's record. Opening a class seals its parent.
    fn open(&mut self, hierarchy: &Hierarchy, class: ClassId) -> &mut ClassSlots {
        if !self.classes.contains_key(&class) {
            let seeded = match hierarchy.parent(class) {
                Some(parent) => {
                    let record = self.open(hierarchy, parent);
                    record.sealed_by.get_or_insert(class);
                    record.inherit()
                }
                None => ClassSlots::default(),
            };
            self.classes.insert(class, seeded);
        }
        self.classes.entry(class).or_default()
    }

    /// The closest record on `class`'s lineage. Classes that never declared
    /// anything share the record of their nearest declaring ancestor.
    fn nearest(&self, hierarchy: &Hierarchy, class: ClassId) -> Option<&ClassSlots> {
        hierarchy.lineage(class).find_map(|c| self.classes.get(&c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Hierarchy, ClassId, ClassId) {
        let mut h = Hierarchy::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        let derived = h.define_class("Derived", Some(base), vec![]).unwrap();
        (h, base, derived)
    }

    #[test]
    fn new_methods_get_consecutive_slots() {
        let (h, base, _) = setup();
        let mut reg = MethodRegistry::new();
        let a = reg.declare(&h, base, &MethodId::nullary("speak")).unwrap();
        let b = reg.declare(&h, base, &MethodId::nullary("sleep")).unwrap();
        assert_eq!(a, Declared { slot: Slot(0), kind: SlotKind::Introduced });
        assert_eq!(b, Declared { slot: Slot(1), kind: SlotKind::Introduced });
        assert_eq!(reg.introduced(base), [Slot(0), Slot(1)]);
    }

    #[test]
    fn redeclaring_in_a_subclass_is_an_override() {
        let (h, base, derived) = setup();
        let mut reg = MethodRegistry::new();
        reg.declare(&h, base, &MethodId::nullary("speak")).unwrap();

        let over = reg.declare(&h, derived, &MethodId::nullary("speak")).unwrap();
        let run = reg.declare(&h, derived, &MethodId::nullary("run")).unwrap();
        assert_eq!(over, Declared { slot: Slot(0), kind: SlotKind::Overridden });
        assert_eq!(run, Declared { slot: Slot(1), kind: SlotKind::Introduced });
        assert_eq!(reg.overridden(derived), [Slot(0)]);
        assert_eq!(reg.slot_count(&h, derived), 2);
        assert_eq!(reg.slot_count(&h, base), 1);
    }

    #[test]
    fn duplicate_declaration_in_one_class_conflicts() {
        let (h, base, derived) = setup();
        let mut reg = MethodRegistry::new();
        reg.declare(&h, base, &MethodId::nullary("speak")).unwrap();
        let err = reg.declare(&h, base, &MethodId::nullary("speak")).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Conflict {
                class: "Base".into(),
                method: MethodId::nullary("speak")
            }
        );

        reg.declare(&h, derived, &MethodId::nullary("speak")).unwrap();
        let err = reg.declare(&h, derived, &MethodId::nullary("speak")).unwrap_err();
        assert_eq!(err.code(), "D0001");
    }

    #[test]
    fn parameter_types_are_part_of_the_identity() {
        let (h, base, _) = setup();
        let mut reg = MethodRegistry::new();
        let s = reg
            .declare(&h, base, &MethodId::new("greet", vec!["Str".into()]))
            .unwrap();
        let i = reg
            .declare(&h, base, &MethodId::new("greet", vec!["Int".into()]))
            .unwrap();
        assert_ne!(s.slot, i.slot);
        assert_eq!(reg.candidates(&h, base, "greet").len(), 2);
    }

    #[test]
    fn new_slot_on_a_sealed_parent_is_an_ordering_violation() {
        let (h, base, derived) = setup();
        let mut reg = MethodRegistry::new();
        reg.declare(&h, base, &MethodId::nullary("speak")).unwrap();
        reg.declare(&h, derived, &MethodId::nullary("run")).unwrap();

        let err = reg.declare(&h, base, &MethodId::nullary("late")).unwrap_err();
        assert_eq!(
            err,
            DispatchError::OrderingViolation {
                class: "Base".into(),
                reason: OrderingReason::SlotsHandedOut {
                    subclass: "Derived".into()
                }
            }
        );
        // the rejected identity is not recorded
        assert_eq!(reg.resolve(&h, base, &MethodId::nullary("late")), None);
    }

    #[test]
    fn siblings_number_independently() {
        let mut h = Hierarchy::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        let dog = h.define_class("Dog", Some(base), vec![]).unwrap();
        let cat = h.define_class("Cat", Some(base), vec![]).unwrap();
        let mut reg = MethodRegistry::new();
        reg.declare(&h, base, &MethodId::nullary("speak")).unwrap();
        let fetch = reg.declare(&h, dog, &MethodId::nullary("fetch")).unwrap();
        let purr = reg.declare(&h, cat, &MethodId::nullary("purr")).unwrap();

        assert_eq!(fetch.slot, Slot(1));
        assert_eq!(purr.slot, Slot(1));
        assert_eq!(reg.resolve(&h, dog, &MethodId::nullary("purr")), None);
    }

    #[test]
    fn resolve_falls_back_to_the_nearest_declaring_ancestor() {
        let mut h = Hierarchy::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        let mid = h.define_class("Mid", Some(base), vec![]).unwrap();
        let leaf = h.define_class("Leaf", Some(mid), vec![]).unwrap();
        let mut reg = MethodRegistry::new();
        reg.declare(&h, base, &MethodId::nullary("speak")).unwrap();

        assert_eq!(reg.resolve(&h, leaf, &MethodId::nullary("speak")), Some(Slot(0)));
        assert_eq!(reg.slot_count(&h, leaf), 1);
        assert_eq!(
            reg.method_at(&h, leaf, Slot(0)),
            Some(&MethodId::nullary("speak"))
        );
        assert!(reg.introduced(leaf).is_empty());
    }

    #[test]
    fn declaring_deep_opens_every_ancestor() {
        let mut h = Hierarchy::new();
        let base = h.define_class("Base", None, vec![]).unwrap();
        let mid = h.define_class("Mid", Some(base), vec![]).unwrap();
        let leaf = h.define_class("Leaf", Some(mid), vec![]).unwrap();
        let mut reg = MethodRegistry::new();
        reg.declare(&h, leaf, &MethodId::nullary("only_leaf")).unwrap();

        // Mid is now sealed by Leaf, so it can no longer introduce slots.
        let err = reg.declare(&h, mid, &MethodId::nullary("late")).unwrap_err();
        assert_eq!(err.code(), "D0004");
    }
}
