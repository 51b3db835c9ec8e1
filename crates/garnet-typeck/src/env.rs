//! Local scopes.
//!
//! A [`Scope`] is the flow state of one traversal: local variable bindings
//! plus what has definitely been assigned so far. Branching constructs clone
//! the scope per branch and [`Scope::merge`] joins them afterwards.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ty::{TypeId, TypeRegistry};

/// A storage location a pointer may refer to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Local(String),
    Ivar(TypeId, String),
    Global(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scope {
    /// Local variable name to its type at this point.
    pub vars: FxHashMap<String, TypeId>,
    /// Instance variables assigned on every path reaching this point.
    pub ivars_assigned: FxHashSet<String>,
    pub globals_assigned: FxHashSet<String>,
    /// Locals holding the address of another variable (`p = x.ptr`).
    pub pointer_targets: FxHashMap<String, Slot>,
    /// Flow left this scope through `return`, `break` or `next`.
    pub terminated: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.vars.get(name).copied()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Assign `ty` to `name`. Repeated assignments accumulate into a union.
    pub fn bind(&mut self, reg: &mut TypeRegistry, name: &str, ty: TypeId) -> TypeId {
        let bound = match self.vars.get(name) {
            Some(&old) => reg.union2(old, ty),
            None => ty,
        };
        self.vars.insert(name.to_string(), bound);
        bound
    }

    /// Overwrite the binding of `name` outright.
    pub fn replace(&mut self, name: &str, ty: TypeId) {
        self.vars.insert(name.to_string(), ty);
    }

    /// Join the scopes at the end of alternative branches.
    ///
    /// Terminated branches do not reach the join and are ignored. A variable
    /// bound in only some of the live branches becomes nilable. If no branch
    /// is live the result is terminated.
    pub fn merge(reg: &mut TypeRegistry, branches: Vec<Scope>) -> Scope {
        let live: Vec<&Scope> = branches.iter().filter(|b| !b.terminated).collect();
        if live.is_empty() {
            let mut merged = branches.into_iter().next().unwrap_or_default();
            merged.terminated = true;
            return merged;
        }

        let mut names: Vec<&String> = live.iter().flat_map(|b| b.vars.keys()).collect();
        names.sort();
        names.dedup();

        let mut merged = Scope::new();
        for name in names {
            let found: Vec<TypeId> = live.iter().filter_map(|b| b.get(name)).collect();
            let mut ty = reg.union(&found);
            if found.len() < live.len() {
                ty = reg.nilable(ty);
            }
            merged.vars.insert(name.clone(), ty);
        }

        merged.ivars_assigned = intersect(live.iter().map(|b| &b.ivars_assigned));
        merged.globals_assigned = intersect(live.iter().map(|b| &b.globals_assigned));
        for (name, slot) in &live[0].pointer_targets {
            if live.iter().all(|b| b.pointer_targets.get(name) == Some(slot)) {
                merged.pointer_targets.insert(name.clone(), slot.clone());
            }
        }
        merged
    }

    /// Widen the bindings this scope already has with those of `other`.
    /// Names in `shadowed` are ignored. Returns whether anything changed.
    pub fn absorb(&mut self, reg: &mut TypeRegistry, other: &Scope, shadowed: &[String]) -> bool {
        let mut changed = false;
        let names: Vec<String> = self.vars.keys().cloned().collect();
        for name in names {
            if shadowed.contains(&name) {
                continue;
            }
            let (Some(mine), Some(theirs)) = (self.get(&name), other.get(&name)) else {
                continue;
            };
            let widened = reg.union2(mine, theirs);
            if widened != mine {
                self.vars.insert(name, widened);
                changed = true;
            }
        }
        changed
    }

    /// Bindings sorted by name, for use as a memo key.
    pub fn snapshot(&self) -> Vec<(String, TypeId)> {
        let mut vars: Vec<(String, TypeId)> =
            self.vars.iter().map(|(k, v)| (k.clone(), *v)).collect();
        vars.sort();
        vars
    }
}

fn intersect<'a>(mut sets: impl Iterator<Item = &'a FxHashSet<String>>) -> FxHashSet<String> {
    let Some(first) = sets.next() else {
        return FxHashSet::default();
    };
    let mut out = first.clone();
    for set in sets {
        out.retain(|name| set.contains(name));
    }
    out
}
