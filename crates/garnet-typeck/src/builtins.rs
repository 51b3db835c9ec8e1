//! Built-in methods of the core types.
//!
//! These stand in for the prelude a standard library loader would supply:
//! the engine calls them like already-typed defs and never looks at a body.
//! Receivers and arguments are always single union members; the caller does
//! the cartesian split.

use crate::ty::{Primitive, Type, TypeId, TypeRegistry};

/// What a built-in call evaluates to.
#[derive(Clone, Debug, PartialEq)]
pub enum Native {
    Value(TypeId),
    /// The block is yielded `values`; the call itself types as `result`.
    Yields { values: Vec<TypeId>, result: TypeId },
    /// A store through a pointer. The pointer now has type `pointer`, the
    /// call types as the stored value.
    Store { pointer: TypeId, value: TypeId },
}

#[derive(Clone, Debug, PartialEq)]
pub enum NativeError {
    Arity { expected: &'static str },
    Argument { expected: String, found: String },
}

type NativeResult = Result<Native, NativeError>;

/// Resolve `recv.name(args)` against the built-in methods.
///
/// `None` when no built-in of that name exists for the receiver.
pub fn native_call(
    reg: &mut TypeRegistry,
    recv: TypeId,
    name: &str,
    args: &[TypeId],
) -> Option<NativeResult> {
    let specific = match reg.get(recv).clone() {
        Type::Primitive(p) => primitive_method(reg, recv, p, name, args),
        Type::Pointer(elem) => pointer_method(reg, recv, elem, name, args),
        Type::Metaclass(inner) => class_method(reg, inner, name, args),
        Type::Object(_) => object_method(reg, recv, name, args),
        _ => None,
    };
    specific.or_else(|| any_method(reg, recv, name, args))
}

fn arity(args: &[TypeId], n: usize, expected: &'static str) -> Result<(), NativeError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(NativeError::Arity { expected })
    }
}

fn expect_int(reg: &TypeRegistry, arg: TypeId) -> Result<(), NativeError> {
    if arg == reg.core.int || arg == reg.core.long {
        Ok(())
    } else {
        Err(NativeError::Argument {
            expected: "Int".into(),
            found: reg.name(arg),
        })
    }
}

fn numeric(reg: &TypeRegistry, ty: TypeId) -> Option<Primitive> {
    reg.primitive(ty).filter(|p| p.numeric_rank().is_some())
}

/// The wider of two numeric primitives.
pub fn widest(reg: &TypeRegistry, a: TypeId, b: TypeId) -> Option<TypeId> {
    let ra = numeric(reg, a)?.numeric_rank()?;
    let rb = numeric(reg, b)?.numeric_rank()?;
    Some(if ra >= rb { a } else { b })
}

// ── Primitives ─────────────────────────────────────────────────────────

fn primitive_method(
    reg: &mut TypeRegistry,
    recv: TypeId,
    prim: Primitive,
    name: &str,
    args: &[TypeId],
) -> Option<NativeResult> {
    let core = reg.core.clone();
    if prim.numeric_rank().is_some() {
        let result = match name {
            "+" | "-" | "*" | "/" | "%" => arity(args, 1, "1").and_then(|_| {
                widest(reg, recv, args[0]).map(Native::Value).ok_or_else(|| {
                    NativeError::Argument {
                        expected: "a number".into(),
                        found: reg.name(args[0]),
                    }
                })
            }),
            "<" | "<=" | ">" | ">=" => arity(args, 1, "1").and_then(|_| {
                match numeric(reg, args[0]) {
                    Some(_) => Ok(Native::Value(core.bool)),
                    None => Err(NativeError::Argument {
                        expected: "a number".into(),
                        found: reg.name(args[0]),
                    }),
                }
            }),
            "-@" | "+@" => arity(args, 0, "0").map(|_| Native::Value(recv)),
            "to_i" => arity(args, 0, "0").map(|_| Native::Value(core.int)),
            "to_l" => arity(args, 0, "0").map(|_| Native::Value(core.long)),
            "to_f" => arity(args, 0, "0").map(|_| Native::Value(core.float)),
            "to_d" => arity(args, 0, "0").map(|_| Native::Value(core.double)),
            "chr" if prim == Primitive::Int => arity(args, 0, "0").map(|_| Native::Value(core.char)),
            "times" if prim == Primitive::Int => arity(args, 0, "0").map(|_| Native::Yields {
                values: vec![core.int],
                result: recv,
            }),
            _ => return None,
        };
        return Some(result);
    }
    let result = match (prim, name) {
        (Primitive::Char, "ord") => arity(args, 0, "0").map(|_| Native::Value(core.int)),
        (Primitive::Char, "<" | "<=" | ">" | ">=") => arity(args, 1, "1").and_then(|_| {
            if args[0] == core.char {
                Ok(Native::Value(core.bool))
            } else {
                Err(NativeError::Argument {
                    expected: "Char".into(),
                    found: reg.name(args[0]),
                })
            }
        }),
        (Primitive::Bool, "&" | "|") => arity(args, 1, "1").map(|_| Native::Value(core.bool)),
        _ => return None,
    };
    Some(result)
}

// ── Pointers ───────────────────────────────────────────────────────────

fn pointer_method(
    reg: &mut TypeRegistry,
    recv: TypeId,
    elem: TypeId,
    name: &str,
    args: &[TypeId],
) -> Option<NativeResult> {
    let loaded = if reg.is_no_return(elem) { reg.core.nil } else { elem };
    let result = match name {
        "value" => arity(args, 0, "0").map(|_| Native::Value(loaded)),
        "value=" => arity(args, 1, "1").map(|_| store(reg, elem, args[0])),
        "[]" => arity(args, 1, "1")
            .and_then(|_| expect_int(reg, args[0]))
            .map(|_| Native::Value(loaded)),
        "[]=" => arity(args, 2, "2")
            .and_then(|_| expect_int(reg, args[0]))
            .map(|_| store(reg, elem, args[1])),
        "+" | "realloc" => arity(args, 1, "1")
            .and_then(|_| expect_int(reg, args[0]))
            .map(|_| Native::Value(recv)),
        "as" => arity(args, 1, "1").and_then(|_| cast(reg, args[0])),
        _ => return None,
    };
    Some(result)
}

fn store(reg: &mut TypeRegistry, elem: TypeId, value: TypeId) -> Native {
    let widened = reg.union2(elem, value);
    Native::Store {
        pointer: reg.pointer_of(widened),
        value,
    }
}

/// `ptr.as(T)`: a pointer to a primitive, or the object type itself.
fn cast(reg: &mut TypeRegistry, target: TypeId) -> NativeResult {
    let Some(target) = reg.instance_of(target) else {
        return Err(NativeError::Argument {
            expected: "a type".into(),
            found: reg.name(target),
        });
    };
    if matches!(reg.get(target), Type::Primitive(_)) {
        Ok(Native::Value(reg.pointer_of(target)))
    } else {
        Ok(Native::Value(target))
    }
}

// ── Classes ────────────────────────────────────────────────────────────

fn class_method(
    reg: &mut TypeRegistry,
    class: TypeId,
    name: &str,
    args: &[TypeId],
) -> Option<NativeResult> {
    if class == reg.core.pointer && name == "malloc" {
        let result = arity(args, 1, "1")
            .and_then(|_| expect_int(reg, args[0]))
            .map(|_| {
                let bottom = reg.core.no_return;
                Native::Value(reg.pointer_of(bottom))
            });
        return Some(result);
    }
    None
}

// ── Core objects ───────────────────────────────────────────────────────

fn object_method(
    reg: &mut TypeRegistry,
    recv: TypeId,
    name: &str,
    args: &[TypeId],
) -> Option<NativeResult> {
    let core = reg.core.clone();
    if recv == core.string {
        let result = match name {
            "length" => arity(args, 0, "0").map(|_| Native::Value(core.int)),
            "+" => arity(args, 1, "1").and_then(|_| {
                if args[0] == core.string {
                    Ok(Native::Value(core.string))
                } else {
                    Err(NativeError::Argument {
                        expected: "String".into(),
                        found: reg.name(args[0]),
                    })
                }
            }),
            "[]" => arity(args, 1, "1")
                .and_then(|_| expect_int(reg, args[0]))
                .map(|_| Native::Value(core.char)),
            _ => return None,
        };
        return Some(result);
    }

    if reg.is_instance_of(recv, core.array) {
        let elem = element(reg, recv, "@buffer");
        let result = match name {
            "length" | "size" => arity(args, 0, "0").map(|_| Native::Value(core.int)),
            "empty?" => arity(args, 0, "0").map(|_| Native::Value(core.bool)),
            "[]" => arity(args, 1, "1")
                .and_then(|_| expect_int(reg, args[0]))
                .map(|_| Native::Value(loaded(reg, elem))),
            "[]=" => arity(args, 2, "2")
                .and_then(|_| expect_int(reg, args[0]))
                .map(|_| {
                    widen_element(reg, recv, "@buffer", args[1]);
                    Native::Value(args[1])
                }),
            "push" | "<<" => arity(args, 1, "1").map(|_| {
                widen_element(reg, recv, "@buffer", args[0]);
                Native::Value(recv)
            }),
            "each" => arity(args, 0, "0").map(|_| Native::Yields {
                values: vec![loaded(reg, elem)],
                result: recv,
            }),
            _ => return None,
        };
        return Some(result);
    }

    if reg.is_instance_of(recv, core.hash) {
        let values = element(reg, recv, "@values");
        let result = match name {
            "length" | "size" => arity(args, 0, "0").map(|_| Native::Value(core.int)),
            "has_key?" => arity(args, 1, "1").map(|_| Native::Value(core.bool)),
            "[]" => arity(args, 1, "1").map(|_| Native::Value(loaded(reg, values))),
            "[]=" => arity(args, 2, "2").map(|_| {
                widen_element(reg, recv, "@keys", args[0]);
                widen_element(reg, recv, "@values", args[1]);
                Native::Value(args[1])
            }),
            _ => return None,
        };
        return Some(result);
    }

    if is_lib_struct(reg, recv) {
        if let Some(field) = name.strip_suffix('=') {
            let ivar = format!("@{}", field);
            let declared = reg.ivar(recv, &ivar)?;
            let result = arity(args, 1, "1").and_then(|_| {
                if reg.satisfies(args[0], declared) {
                    Ok(Native::Value(args[0]))
                } else {
                    Err(NativeError::Argument {
                        expected: reg.name(declared),
                        found: reg.name(args[0]),
                    })
                }
            });
            return Some(result);
        }
        let declared = reg.ivar(recv, &format!("@{}", name))?;
        return Some(arity(args, 0, "0").map(|_| Native::Value(declared)));
    }

    if reg.is_instance_of(recv, core.range) {
        let from = reg.ivar(recv, "@from").unwrap_or(core.nil);
        let to = reg.ivar(recv, "@to").unwrap_or(core.nil);
        let result = match name {
            "begin" => arity(args, 0, "0").map(|_| Native::Value(from)),
            "end" => arity(args, 0, "0").map(|_| Native::Value(to)),
            "each" => arity(args, 0, "0").map(|_| Native::Yields {
                values: vec![from],
                result: recv,
            }),
            _ => return None,
        };
        return Some(result);
    }

    None
}

/// A struct declared inside a `lib`: its fields are fixed at declaration.
fn is_lib_struct(reg: &TypeRegistry, ty: TypeId) -> bool {
    let Some(ns) = reg.object(ty).and_then(|o| o.namespace) else {
        return false;
    };
    matches!(reg.get(ns), Type::Module(module) if module.is_lib)
}

fn element(reg: &TypeRegistry, obj: TypeId, ivar: &str) -> TypeId {
    reg.ivar(obj, ivar)
        .and_then(|p| reg.pointee(p))
        .unwrap_or(reg.core.no_return)
}

fn loaded(reg: &TypeRegistry, elem: TypeId) -> TypeId {
    if reg.is_no_return(elem) {
        reg.core.nil
    } else {
        elem
    }
}

/// Widen the pointer-typed buffer `ivar` of a container so it also holds
/// `value`.
pub fn widen_element(reg: &mut TypeRegistry, obj: TypeId, ivar: &str, value: TypeId) {
    let old = element(reg, obj, ivar);
    let elem = reg.union2(old, value);
    let pointer = reg.pointer_of(elem);
    reg.set_ivar(obj, ivar, pointer);
}

/// Seed the instance variables of an array instance holding `elem`.
pub fn init_array(reg: &mut TypeRegistry, obj: TypeId, elem: TypeId) {
    let int = reg.core.int;
    widen_element(reg, obj, "@buffer", elem);
    reg.add_ivar(obj, "@length", int);
    reg.add_ivar(obj, "@capacity", int);
    reg.mark_initialized(obj, ["@buffer", "@length", "@capacity"].map(String::from));
}

pub fn init_hash(reg: &mut TypeRegistry, obj: TypeId, key: TypeId, value: TypeId) {
    let int = reg.core.int;
    widen_element(reg, obj, "@keys", key);
    widen_element(reg, obj, "@values", value);
    reg.add_ivar(obj, "@length", int);
    reg.mark_initialized(obj, ["@keys", "@values", "@length"].map(String::from));
}

pub fn init_range(reg: &mut TypeRegistry, obj: TypeId, from: TypeId, to: TypeId) {
    reg.add_ivar(obj, "@from", from);
    reg.add_ivar(obj, "@to", to);
    reg.mark_initialized(obj, ["@from", "@to"].map(String::from));
}

// ── Every receiver ─────────────────────────────────────────────────────

fn any_method(
    reg: &mut TypeRegistry,
    recv: TypeId,
    name: &str,
    args: &[TypeId],
) -> Option<NativeResult> {
    let core = reg.core.clone();
    let result = match name {
        "==" | "!=" | "same?" => arity(args, 1, "1").map(|_| Native::Value(core.bool)),
        "!@" | "nil?" => arity(args, 0, "0").map(|_| Native::Value(core.bool)),
        "to_s" | "inspect" => arity(args, 0, "0").map(|_| Native::Value(core.string)),
        "object_id" => arity(args, 0, "0").map(|_| Native::Value(core.long)),
        "class" => arity(args, 0, "0").map(|_| Native::Value(reg.metaclass_of(recv))),
        _ => return None,
    };
    Some(result)
}
