//! Type representation and the program-wide type registry.
//!
//! Types live in a [`TypeRegistry`] owned by one inference run and are
//! referred to by [`TypeId`]. Object types are nominal: every class (and every
//! instance of a generic class) gets its own id, and two ids are never equal
//! just because their instance-variable tables look alike. Pointers,
//! metaclasses and unions are interned, so structurally equal ones share an
//! id and can be compared with `==`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Handle to a type in a [`TypeRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

/// Built-in value types with a fixed identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Primitive {
    Nil,
    Bool,
    Char,
    Int,
    Long,
    Float,
    Double,
    Symbol,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Nil => "Nil",
            Primitive::Bool => "Bool",
            Primitive::Char => "Char",
            Primitive::Int => "Int",
            Primitive::Long => "Long",
            Primitive::Float => "Float",
            Primitive::Double => "Double",
            Primitive::Symbol => "Symbol",
        }
    }

    /// Widening rank of numeric primitives: Int < Long < Float < Double.
    pub fn numeric_rank(self) -> Option<u8> {
        match self {
            Primitive::Int => Some(0),
            Primitive::Long => Some(1),
            Primitive::Float => Some(2),
            Primitive::Double => Some(3),
            _ => None,
        }
    }
}

/// A nominal class type.
#[derive(Clone, Debug, Serialize)]
pub struct ObjectType {
    pub name: String,
    /// Enclosing namespace for constant lookup.
    pub namespace: Option<TypeId>,
    pub superclass: Option<TypeId>,
    /// `Some` for generic classes (`class Foo[T]`, `class Foo[]`).
    pub type_vars: Option<Vec<String>>,
    /// For an instance of a generic class: the class it was created from.
    pub generic_base: Option<TypeId>,
    /// Included modules, most recent last.
    pub includes: Vec<TypeId>,
    /// Instance variables discovered so far, keyed with their `@` sigil.
    pub ivars: BTreeMap<String, TypeId>,
    /// Instance variables assigned on every path through `initialize`.
    pub initialized: BTreeSet<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>, namespace: Option<TypeId>, superclass: Option<TypeId>) -> Self {
        Self {
            name: name.into(),
            namespace,
            superclass,
            type_vars: None,
            generic_base: None,
            includes: Vec::new(),
            ivars: BTreeMap::new(),
            initialized: BTreeSet::new(),
        }
    }

    pub fn is_generic(&self) -> bool {
        self.type_vars.is_some()
    }
}

/// A module or `lib` namespace.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleType {
    pub name: String,
    pub namespace: Option<TypeId>,
    /// Linked library name for `lib` declarations.
    pub libname: Option<String>,
    pub is_lib: bool,
}

#[derive(Clone, Debug, Serialize)]
pub enum Type {
    Primitive(Primitive),
    Object(ObjectType),
    Module(ModuleType),
    Pointer(TypeId),
    /// The class of a type: receiver of `new` and class methods.
    Metaclass(TypeId),
    /// Two or more members, flattened, sorted by id, without duplicates.
    Union(Vec<TypeId>),
    /// Uninhabited. Never surfaced in results.
    NoReturn,
}

/// Ids of the types every program starts with.
#[derive(Clone, Debug, Serialize)]
pub struct CoreTypes {
    pub no_return: TypeId,
    pub nil: TypeId,
    pub bool: TypeId,
    pub char: TypeId,
    pub int: TypeId,
    pub long: TypeId,
    pub float: TypeId,
    pub double: TypeId,
    pub symbol: TypeId,
    pub object: TypeId,
    pub program: TypeId,
    pub string: TypeId,
    pub regexp: TypeId,
    pub range: TypeId,
    pub array: TypeId,
    pub hash: TypeId,
    pub pointer: TypeId,
}

/// Owner of every type created during one inference run.
#[derive(Clone, Debug, Serialize)]
pub struct TypeRegistry {
    types: Vec<Type>,
    pub core: CoreTypes,
    #[serde(skip)]
    pointers: FxHashMap<TypeId, TypeId>,
    #[serde(skip)]
    metaclasses: FxHashMap<TypeId, TypeId>,
    #[serde(skip)]
    unions: FxHashMap<Vec<TypeId>, TypeId>,
    /// Bumped whenever an instance-variable table grows.
    #[serde(skip)]
    generation: u64,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut types = Vec::new();
        let mut push = |ty: Type| {
            types.push(ty);
            TypeId(types.len() as u32 - 1)
        };
        let no_return = push(Type::NoReturn);
        let nil = push(Type::Primitive(Primitive::Nil));
        let bool = push(Type::Primitive(Primitive::Bool));
        let char = push(Type::Primitive(Primitive::Char));
        let int = push(Type::Primitive(Primitive::Int));
        let long = push(Type::Primitive(Primitive::Long));
        let float = push(Type::Primitive(Primitive::Float));
        let double = push(Type::Primitive(Primitive::Double));
        let symbol = push(Type::Primitive(Primitive::Symbol));
        let object = push(Type::Object(ObjectType::new("Object", None, None)));
        let program = push(Type::Object(ObjectType::new("Program", None, None)));
        let child = |name: &str, generic: bool| {
            let mut obj = ObjectType::new(name, None, Some(object));
            if generic {
                obj.type_vars = Some(Vec::new());
            }
            Type::Object(obj)
        };
        let string = push(child("String", false));
        let regexp = push(child("Regexp", false));
        let range = push(child("Range", true));
        let array = push(child("Array", true));
        let hash = push(child("Hash", true));
        let pointer = push(child("Pointer", true));

        Self {
            types,
            core: CoreTypes {
                no_return,
                nil,
                bool,
                char,
                int,
                long,
                float,
                double,
                symbol,
                object,
                program,
                string,
                regexp,
                range,
                array,
                hash,
                pointer,
            },
            pointers: FxHashMap::default(),
            metaclasses: FxHashMap::default(),
            unions: FxHashMap::default(),
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    fn push(&mut self, ty: Type) -> TypeId {
        self.types.push(ty);
        TypeId(self.types.len() as u32 - 1)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Constructors ───────────────────────────────────────────────────

    pub fn add_object(&mut self, obj: ObjectType) -> TypeId {
        self.push(Type::Object(obj))
    }

    pub fn add_module(&mut self, module: ModuleType) -> TypeId {
        self.push(Type::Module(module))
    }

    /// A fresh instance of generic class `base` with an empty ivar table.
    pub fn instantiate(&mut self, base: TypeId) -> TypeId {
        let mut obj = match self.object(base) {
            Some(obj) => obj.clone(),
            None => return base,
        };
        obj.generic_base = Some(base);
        obj.ivars.clear();
        obj.initialized.clear();
        self.push(Type::Object(obj))
    }

    pub fn pointer_of(&mut self, elem: TypeId) -> TypeId {
        if let Some(&id) = self.pointers.get(&elem) {
            return id;
        }
        let id = self.push(Type::Pointer(elem));
        self.pointers.insert(elem, id);
        id
    }

    pub fn metaclass_of(&mut self, ty: TypeId) -> TypeId {
        if let Some(&id) = self.metaclasses.get(&ty) {
            return id;
        }
        let id = self.push(Type::Metaclass(ty));
        self.metaclasses.insert(ty, id);
        id
    }

    /// Canonical union: nested unions are flattened, duplicates dropped,
    /// `NoReturn` members ignored. One member collapses to itself, none to
    /// `NoReturn`.
    pub fn union(&mut self, types: &[TypeId]) -> TypeId {
        let mut members = Vec::with_capacity(types.len());
        for &ty in types {
            match self.get(ty) {
                Type::Union(inner) => members.extend(inner.iter().copied()),
                Type::NoReturn => {}
                _ => members.push(ty),
            }
        }
        members.sort();
        members.dedup();
        match members.len() {
            0 => self.core.no_return,
            1 => members[0],
            _ => {
                if let Some(&id) = self.unions.get(&members) {
                    return id;
                }
                let id = self.push(Type::Union(members.clone()));
                self.unions.insert(members, id);
                id
            }
        }
    }

    pub fn union2(&mut self, a: TypeId, b: TypeId) -> TypeId {
        if a == b {
            return a;
        }
        self.union(&[a, b])
    }

    pub fn nilable(&mut self, ty: TypeId) -> TypeId {
        let nil = self.core.nil;
        self.union2(ty, nil)
    }

    /// `ty` with every member matching `drop` removed.
    pub fn remove(&mut self, ty: TypeId, drop: impl Fn(&Self, TypeId) -> bool) -> TypeId {
        let kept: Vec<TypeId> = self
            .members(ty)
            .into_iter()
            .filter(|&m| !drop(self, m))
            .collect();
        self.union(&kept)
    }

    pub fn without_nil(&mut self, ty: TypeId) -> TypeId {
        let nil = self.core.nil;
        self.remove(ty, |_, m| m == nil)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Members of a union, nothing for `NoReturn`, the type itself otherwise.
    pub fn members(&self, ty: TypeId) -> Vec<TypeId> {
        match self.get(ty) {
            Type::Union(members) => members.clone(),
            Type::NoReturn => Vec::new(),
            _ => vec![ty],
        }
    }

    pub fn is_no_return(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::NoReturn)
    }

    pub fn contains(&self, ty: TypeId, member: TypeId) -> bool {
        ty == member || self.members(ty).contains(&member)
    }

    pub fn primitive(&self, ty: TypeId) -> Option<Primitive> {
        match self.get(ty) {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn object(&self, ty: TypeId) -> Option<&ObjectType> {
        match self.get(ty) {
            Type::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn object_mut(&mut self, ty: TypeId) -> Option<&mut ObjectType> {
        match &mut self.types[ty.0 as usize] {
            Type::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn pointee(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(ty) {
            Type::Pointer(elem) => Some(*elem),
            _ => None,
        }
    }

    pub fn instance_of(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(ty) {
            Type::Metaclass(inner) => Some(*inner),
            _ => None,
        }
    }

    /// The class whose def table serves `ty`: the generic base for instances.
    pub fn def_owner(&self, ty: TypeId) -> TypeId {
        self.object(ty).and_then(|o| o.generic_base).unwrap_or(ty)
    }

    /// Is `ty` an instance of the generic class `base`, or `base` itself?
    pub fn is_instance_of(&self, ty: TypeId, base: TypeId) -> bool {
        self.def_owner(ty) == base
    }

    /// Linear method-resolution order of `ty`.
    ///
    /// A class comes first, then its included modules (latest first), then
    /// its superclass chain. Primitives and pointers end in `Object`.
    /// Metaclasses follow their instance type's superclass chain.
    pub fn ancestors(&mut self, ty: TypeId) -> Vec<TypeId> {
        match self.get(ty).clone() {
            Type::Object(_) => {
                let mut chain = Vec::new();
                let mut current = Some(self.def_owner(ty));
                while let Some(class) = current {
                    if chain.contains(&class) {
                        break;
                    }
                    chain.push(class);
                    let Some(obj) = self.object(class) else { break };
                    chain.extend(obj.includes.iter().rev().copied());
                    current = obj.superclass;
                }
                chain
            }
            Type::Primitive(_) => vec![ty, self.core.object],
            Type::Pointer(_) => vec![self.core.pointer, self.core.object],
            Type::Metaclass(inner) => {
                let classes: Vec<TypeId> = self
                    .ancestors(inner)
                    .into_iter()
                    .filter(|&a| matches!(self.get(a), Type::Object(_) | Type::Primitive(_) | Type::Module(_)))
                    .collect();
                classes.into_iter().map(|a| self.metaclass_of(a)).collect()
            }
            Type::Module(_) => vec![ty],
            Type::Union(_) | Type::NoReturn => Vec::new(),
        }
    }

    /// Does a value of type `ty` satisfy a restriction naming `target`?
    pub fn satisfies(&mut self, ty: TypeId, target: TypeId) -> bool {
        if ty == target {
            return true;
        }
        if matches!(self.get(ty), Type::Union(_) | Type::NoReturn) {
            return false;
        }
        self.ancestors(ty).contains(&target)
    }

    /// Is a value of type `ty` an instance of `class`, or of a subclass or
    /// includer of it? Metaclasses are not considered.
    pub fn is_a(&self, ty: TypeId, class: TypeId) -> bool {
        if ty == class || class == self.core.object && !self.is_no_return(ty) {
            return true;
        }
        match self.get(ty) {
            Type::Object(_) => {
                let mut current = Some(self.def_owner(ty));
                while let Some(c) = current {
                    if c == class {
                        return true;
                    }
                    let Some(obj) = self.object(c) else { break };
                    if obj.includes.contains(&class) {
                        return true;
                    }
                    current = obj.superclass;
                }
                false
            }
            Type::Pointer(_) => class == self.core.pointer,
            _ => false,
        }
    }

    // ── Instance variables ─────────────────────────────────────────────

    pub fn ivar(&self, obj: TypeId, name: &str) -> Option<TypeId> {
        self.object(obj).and_then(|o| o.ivars.get(name).copied())
    }

    /// Widen `name` on `obj` by `ty`. Returns whether the table changed.
    ///
    /// Pointer members are joined, so a slot holds at most one pointer type.
    pub fn add_ivar(&mut self, obj: TypeId, name: &str, ty: TypeId) -> bool {
        let widened = match self.ivar(obj, name) {
            Some(old) => self.union2(old, ty),
            None => ty,
        };
        let widened = self.join_pointers(widened);
        self.set_ivar(obj, name, widened)
    }

    /// `ty` with all pointer members folded into one pointer to the union
    /// of their element types.
    pub fn join_pointers(&mut self, ty: TypeId) -> TypeId {
        let members = self.members(ty);
        let (pointers, mut rest): (Vec<TypeId>, Vec<TypeId>) =
            members.into_iter().partition(|&m| self.pointee(m).is_some());
        if pointers.len() < 2 {
            return ty;
        }
        let elems: Vec<TypeId> = pointers.iter().filter_map(|&p| self.pointee(p)).collect();
        let elem = self.union(&elems);
        rest.push(self.pointer_of(elem));
        self.union(&rest)
    }

    /// Replace the slot outright. Used when a pointer-valued slot is refined.
    pub fn set_ivar(&mut self, obj: TypeId, name: &str, ty: TypeId) -> bool {
        let Some(object) = self.object_mut(obj) else {
            return false;
        };
        let changed = object.ivars.insert(name.to_string(), ty) != Some(ty);
        if changed {
            self.generation += 1;
        }
        changed
    }

    pub fn mark_initialized(&mut self, obj: TypeId, names: impl IntoIterator<Item = String>) {
        let Some(object) = self.object_mut(obj) else {
            return;
        };
        let before = object.initialized.len();
        object.initialized.extend(names);
        if object.initialized.len() != before {
            self.generation += 1;
        }
    }

    pub fn is_initialized(&self, obj: TypeId, name: &str) -> bool {
        self.object(obj).is_some_and(|o| o.initialized.contains(name))
    }

    // ── Display ────────────────────────────────────────────────────────

    pub fn display(&self, ty: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { reg: self, ty }
    }

    pub fn name(&self, ty: TypeId) -> String {
        self.display(ty).to_string()
    }
}

/// Human-readable type name. Union members are listed alphabetically with
/// `Nil` last.
pub struct TypeDisplay<'a> {
    reg: &'a TypeRegistry,
    ty: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reg.get(self.ty) {
            Type::Primitive(p) => f.write_str(p.name()),
            Type::Object(obj) => f.write_str(&obj.name),
            Type::Module(module) => f.write_str(&module.name),
            Type::Pointer(elem) => write!(f, "Pointer({})", self.reg.display(*elem)),
            Type::Metaclass(inner) => write!(f, "{}:Class", self.reg.display(*inner)),
            Type::NoReturn => f.write_str("NoReturn"),
            Type::Union(members) => {
                let nil = self.reg.core.nil;
                let mut names: Vec<String> = members
                    .iter()
                    .filter(|&&m| m != nil)
                    .map(|&m| self.reg.name(m))
                    .collect();
                names.sort();
                if members.contains(&nil) {
                    names.push("Nil".to_string());
                }
                f.write_str(&names.join(" | "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_dedups() {
        let mut reg = TypeRegistry::new();
        let (int, double) = (reg.core.int, reg.core.double);
        let a = reg.union(&[int, double, int]);
        let b = reg.union(&[double, int]);
        assert_eq!(a, b);
        assert_eq!(reg.members(a), vec![int, double]);
    }

    #[test]
    fn singleton_union_collapses() {
        let mut reg = TypeRegistry::new();
        let int = reg.core.int;
        assert_eq!(reg.union(&[int]), int);
        assert_eq!(reg.union(&[int, int]), int);
    }

    #[test]
    fn nested_unions_flatten() {
        let mut reg = TypeRegistry::new();
        let (int, nil, char) = (reg.core.int, reg.core.nil, reg.core.char);
        let inner = reg.union(&[int, nil]);
        let outer = reg.union(&[inner, char]);
        assert_eq!(reg.members(outer), vec![nil, char, int]);
        assert!(reg.members(outer).iter().all(|&m| !matches!(reg.get(m), Type::Union(_))));
    }

    #[test]
    fn empty_union_is_bottom_and_bottom_is_identity() {
        let mut reg = TypeRegistry::new();
        let bottom = reg.union(&[]);
        assert!(reg.is_no_return(bottom));
        let int = reg.core.int;
        assert_eq!(reg.union2(bottom, int), int);
    }

    #[test]
    fn objects_are_nominal() {
        let mut reg = TypeRegistry::new();
        let object = reg.core.object;
        let a = reg.add_object(ObjectType::new("Foo", None, Some(object)));
        let b = reg.add_object(ObjectType::new("Foo", None, Some(object)));
        assert_ne!(a, b);
        let pa = reg.pointer_of(a);
        assert_eq!(reg.pointer_of(a), pa);
        assert_ne!(reg.pointer_of(b), pa);
    }

    #[test]
    fn display_sorts_with_nil_last() {
        let mut reg = TypeRegistry::new();
        let (int, nil, double) = (reg.core.int, reg.core.nil, reg.core.double);
        let u = reg.union(&[nil, int, double]);
        assert_eq!(reg.name(u), "Double | Int | Nil");
        let p = reg.pointer_of(u);
        assert_eq!(reg.name(p), "Pointer(Double | Int | Nil)");
    }

    #[test]
    fn ancestors_include_modules_then_superclass() {
        let mut reg = TypeRegistry::new();
        let object = reg.core.object;
        let module = reg.add_module(ModuleType {
            name: "Greet".into(),
            namespace: None,
            libname: None,
            is_lib: false,
        });
        let base = reg.add_object(ObjectType::new("Base", None, Some(object)));
        let mut derived = ObjectType::new("Derived", None, Some(base));
        derived.includes.push(module);
        let derived = reg.add_object(derived);
        assert_eq!(reg.ancestors(derived), vec![derived, module, base, object]);
    }

    #[test]
    fn generic_instances_share_def_owner() {
        let mut reg = TypeRegistry::new();
        let array = reg.core.array;
        let a = reg.instantiate(array);
        let b = reg.instantiate(array);
        assert_ne!(a, b);
        assert_eq!(reg.def_owner(a), array);
        assert_eq!(reg.ancestors(b)[0], array);
    }

    #[test]
    fn ivar_slots_hold_one_pointer_type() {
        let mut reg = TypeRegistry::new();
        let object = reg.core.object;
        let foo = reg.add_object(ObjectType::new("Foo", None, Some(object)));
        let (int, bottom) = (reg.core.int, reg.core.no_return);
        let fresh = reg.pointer_of(bottom);
        let ints = reg.pointer_of(int);
        reg.add_ivar(foo, "@buf", ints);
        assert!(!reg.add_ivar(foo, "@buf", fresh));
        assert_eq!(reg.ivar(foo, "@buf"), Some(ints));
    }

    #[test]
    fn ivar_widening_bumps_generation() {
        let mut reg = TypeRegistry::new();
        let object = reg.core.object;
        let foo = reg.add_object(ObjectType::new("Foo", None, Some(object)));
        let start = reg.generation();
        let int = reg.core.int;
        assert!(reg.add_ivar(foo, "@x", int));
        assert!(!reg.add_ivar(foo, "@x", int));
        let double = reg.core.double;
        assert!(reg.add_ivar(foo, "@x", double));
        assert_eq!(reg.generation(), start + 2);
        assert_eq!(reg.name(reg.ivar(foo, "@x").unwrap()), "Double | Int");
    }
}
