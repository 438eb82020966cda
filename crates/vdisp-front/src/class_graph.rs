//! Superclass-first ordering of the classes in a hierarchy file.
//!
//! Classes may appear in any order in the file. Tables can only be built
//! top-down, so the loader first sorts classes so that every class comes
//! after its superclass.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::error::LoadError;
use crate::manifest::{span_of, ClassDef};

/// Order `classes` superclass-first using Kahn's algorithm.
///
/// Returns indices into `classes`. Among classes that are ready at the same
/// time, the one written first in the file comes first, so a file already
/// in top-down order keeps its order.
pub fn order_classes(classes: &[ClassDef]) -> Result<Vec<usize>, LoadError> {
    let mut by_name: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, class) in classes.iter().enumerate() {
        let name = class.name.get_ref().as_str();
        if let Some(&first) = by_name.get(name) {
            return Err(LoadError::DuplicateClass {
                name: name.to_string(),
                span: span_of(&class.name),
                first: span_of(&classes[first].name),
            });
        }
        by_name.insert(name, i);
    }

    // parent[i] = index of class i's superclass
    let mut parent: Vec<Option<usize>> = Vec::with_capacity(classes.len());
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); classes.len()];
    for (i, class) in classes.iter().enumerate() {
        let p = match &class.extends {
            None => None,
            Some(ext) => match by_name.get(ext.get_ref().as_str()) {
                Some(&p) => Some(p),
                None => {
                    return Err(LoadError::UnknownParent {
                        class: class.name.get_ref().clone(),
                        parent: ext.get_ref().clone(),
                        span: span_of(ext),
                    })
                }
            },
        };
        if let Some(p) = p {
            children[p].push(i);
        }
        parent.push(p);
    }

    // Each class has at most one unmet dependency: its superclass.
    let mut ready: BTreeSet<usize> = (0..classes.len()).filter(|&i| parent[i].is_none()).collect();
    let mut order = Vec::with_capacity(classes.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        ready.extend(children[i].iter().copied());
    }

    if order.len() == classes.len() {
        Ok(order)
    } else {
        let placed: BTreeSet<usize> = order.into_iter().collect();
        Err(cycle_error(classes, &parent, &placed))
    }
}

/// Follow `extends` edges from the first unplaced class until a class
/// repeats. Every unplaced class sits on or below a cycle.
fn cycle_error(classes: &[ClassDef], parent: &[Option<usize>], placed: &BTreeSet<usize>) -> LoadError {
    let Some(start) = (0..classes.len()).find(|i| !placed.contains(i)) else {
        return LoadError::Manifest {
            message: "class ordering failed".to_string(),
            span: None,
        };
    };

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    while !path.contains(&current) {
        path.push(current);
        match parent[current] {
            Some(p) => current = p,
            None => break,
        }
    }

    let begin = path.iter().position(|&i| i == current).unwrap_or(0);
    let mut names: Vec<String> = path[begin..]
        .iter()
        .map(|&i| classes[i].name.get_ref().clone())
        .collect();
    names.push(classes[current].name.get_ref().clone());

    let span = classes[current]
        .extends
        .as_ref()
        .map_or_else(|| span_of(&classes[current].name), span_of);
    LoadError::Cycle { path: names, span }
}
