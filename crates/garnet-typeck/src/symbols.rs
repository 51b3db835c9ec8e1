//! Program-wide symbol tables: defs, constants, externals and globals.

use garnet_ast::{NodeId, Restriction};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ty::{TypeId, TypeRegistry};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DefId(pub u32);

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub default_value: Option<NodeId>,
    pub restriction: Option<Restriction>,
}

/// A registered `def`.
#[derive(Clone, Debug)]
pub struct DefInfo {
    /// The `Def` node in the source tree.
    pub node: NodeId,
    pub name: String,
    /// Type the def was declared on: a class, a metaclass for class
    /// methods, or `Program` for top-level defs.
    pub owner: TypeId,
    pub params: Vec<Param>,
    pub body: Option<NodeId>,
    /// The body contains a `yield`.
    pub yields: bool,
    /// Namespace for constant lookup inside the body.
    pub namespace: Option<TypeId>,
}

impl DefInfo {
    pub fn required(&self) -> usize {
        self.params.iter().filter(|p| p.default_value.is_none()).count()
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.required() && count <= self.params.len()
    }

    pub fn arity_label(&self) -> String {
        let required = self.required();
        if required == self.params.len() {
            required.to_string()
        } else {
            format!("{}..{}", required, self.params.len())
        }
    }
}

/// A `fun` declared inside a `lib`.
#[derive(Clone, Debug)]
pub struct ExternalFun {
    pub name: String,
    pub real_name: String,
    pub params: Vec<TypeId>,
    pub return_type: TypeId,
    pub varargs: bool,
}

pub struct SymbolTable {
    defs: Vec<DefInfo>,
    by_owner: FxHashMap<(TypeId, String), Vec<DefId>>,
    by_node: FxHashMap<NodeId, DefId>,
    constants: FxHashMap<(Option<TypeId>, String), TypeId>,
    externals: FxHashMap<(TypeId, String), ExternalFun>,
    globals: FxHashMap<String, TypeId>,
    generation: u64,
}

impl SymbolTable {
    /// Tables seeded with the built-in type names.
    pub fn new(reg: &TypeRegistry) -> Self {
        let core = &reg.core;
        let mut table = Self {
            defs: Vec::new(),
            by_owner: FxHashMap::default(),
            by_node: FxHashMap::default(),
            constants: FxHashMap::default(),
            externals: FxHashMap::default(),
            globals: FxHashMap::default(),
            generation: 0,
        };
        for (name, ty) in [
            ("Nil", core.nil),
            ("Bool", core.bool),
            ("Char", core.char),
            ("Int", core.int),
            ("Long", core.long),
            ("Float", core.float),
            ("Double", core.double),
            ("Symbol", core.symbol),
            ("Object", core.object),
            ("String", core.string),
            ("Regexp", core.regexp),
            ("Range", core.range),
            ("Array", core.array),
            ("Hash", core.hash),
            ("Pointer", core.pointer),
        ] {
            table.define_constant(None, name, ty);
        }
        table
    }

    /// Changes whenever a global widens.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Defs ───────────────────────────────────────────────────────────

    /// Register a def. Registering the same node again returns its id.
    pub fn add_def(&mut self, info: DefInfo) -> DefId {
        if let Some(&id) = self.by_node.get(&info.node) {
            return id;
        }
        let id = DefId(self.defs.len() as u32);
        self.by_node.insert(info.node, id);
        self.by_owner
            .entry((info.owner, info.name.clone()))
            .or_default()
            .push(id);
        self.defs.push(info);
        id
    }

    pub fn def(&self, id: DefId) -> &DefInfo {
        &self.defs[id.0 as usize]
    }

    /// Defs named `name` declared directly on `owner`, oldest first.
    pub fn defs_on(&self, owner: TypeId, name: &str) -> &[DefId] {
        self.by_owner
            .get(&(owner, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // ── Constants ──────────────────────────────────────────────────────

    pub fn constant(&self, namespace: Option<TypeId>, name: &str) -> Option<TypeId> {
        self.constants.get(&(namespace, name.to_string())).copied()
    }

    pub fn define_constant(&mut self, namespace: Option<TypeId>, name: &str, ty: TypeId) {
        self.constants.insert((namespace, name.to_string()), ty);
    }

    // ── Externals ──────────────────────────────────────────────────────

    pub fn add_external(&mut self, lib: TypeId, fun: ExternalFun) {
        self.externals.insert((lib, fun.name.clone()), fun);
    }

    pub fn external(&self, lib: TypeId, name: &str) -> Option<&ExternalFun> {
        self.externals.get(&(lib, name.to_string()))
    }

    // ── Globals ────────────────────────────────────────────────────────

    pub fn global(&self, name: &str) -> Option<TypeId> {
        self.globals.get(name).copied()
    }

    /// Widen global `name` by `ty`; returns the widened type.
    pub fn add_global(&mut self, reg: &mut TypeRegistry, name: &str, ty: TypeId) -> TypeId {
        let widened = match self.global(name) {
            Some(old) => reg.union2(old, ty),
            None => ty,
        };
        if self.globals.insert(name.to_string(), widened) != Some(widened) {
            self.generation += 1;
        }
        widened
    }
}
