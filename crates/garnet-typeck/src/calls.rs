//! Call resolution.
//!
//! A call is resolved once per combination of receiver and argument union
//! members. Each combination goes through, in order:
//!
//! 1. user defs along the receiver's ancestor chain,
//! 2. `new` on a class, which allocates and runs `initialize`,
//! 3. `fun` declarations when the receiver is a `lib`,
//! 4. built-in methods,
//! 5. top-level defs, for calls without an explicit receiver.
//!
//! The call types as the union of every combination's result.

use garnet_ast::{Node, NodeId, Restriction};
use tracing::trace;

use crate::builtins::{self, Native, NativeError};
use crate::error::TypeError;
use crate::infer::{BlockCtx, Ctx, Engine, FrameKind, Infer};
use crate::symbols::{DefId, DefInfo};
use crate::ty::{Type, TypeId};

/// Outcome of searching def tables for an overload.
pub(crate) enum Lookup {
    Found(DefId),
    NotFound {
        /// Arity label of a same-named def that took a different count.
        arity_miss: Option<String>,
        /// First restriction that rejected an argument.
        restriction_miss: Option<TypeError>,
    },
}

/// Every way to pick one member from each list.
pub(crate) fn cartesian(lists: &[Vec<TypeId>]) -> Vec<Vec<TypeId>> {
    let mut out = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(out.len() * list.len());
        for prefix in &out {
            for &member in list {
                let mut combo = prefix.clone();
                combo.push(member);
                next.push(combo);
            }
        }
        out = next;
    }
    out
}

impl Engine<'_> {
    pub(crate) fn infer_call(&mut self, ctx: &mut Ctx, id: NodeId) -> Infer<TypeId> {
        let Node::Call {
            obj,
            name,
            args,
            block,
        } = self.ast.get(id).clone()
        else {
            unreachable!("infer_call called on a non-call node");
        };
        if obj.is_none() && name == "super" {
            return self.infer_super(ctx, id, &args, block);
        }

        let receiver = match obj {
            Some(obj) => Some(self.infer(ctx, obj)?),
            None => None,
        };
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            arg_types.push(self.infer(ctx, arg)?);
        }

        let block_idx = block.map(|b| self.push_block(ctx, b));
        let outcome = self.dispatch(ctx, id, &name, receiver, &arg_types, block_idx);
        let (ty, stored) = self.finish_block(ctx, block_idx, outcome)?;

        if let (Some(obj), Some(pointer)) = (obj, stored) {
            self.rebind_pointer(ctx, obj, pointer)?;
        }
        Ok(ty)
    }

    // ── Blocks ─────────────────────────────────────────────────────────

    pub(crate) fn push_block(&mut self, ctx: &Ctx, block: NodeId) -> usize {
        let (arg_nodes, body) = match self.ast.get(block) {
            Node::Block { args, body } => (args.clone(), *body),
            _ => (Vec::new(), None),
        };
        let args = arg_nodes
            .iter()
            .filter_map(|&a| match self.ast.get(a) {
                Node::Var { name } => Some(name.clone()),
                _ => None,
            })
            .collect();
        let bottom = self.reg.core.no_return;
        self.blocks.push(BlockCtx {
            node: block,
            arg_nodes,
            args,
            body,
            self_type: ctx.self_type,
            def_target: ctx.def_target,
            namespace: ctx.namespace,
            spec: ctx.spec,
            method: ctx.method.clone(),
            outer_block: ctx.block,
            scope: ctx.scope.clone(),
            value: bottom,
            breaks: bottom,
            returns: bottom,
        });
        self.blocks.len() - 1
    }

    /// Pop the call's block and fold its effects into the caller: widened
    /// locals, `return`s from the enclosing method, and `break` values.
    pub(crate) fn finish_block(
        &mut self,
        ctx: &mut Ctx,
        block_idx: Option<usize>,
        outcome: Infer<(TypeId, Option<TypeId>)>,
    ) -> Infer<(TypeId, Option<TypeId>)> {
        let Some(idx) = block_idx else {
            return outcome;
        };
        self.blocks.truncate(idx + 1);
        let Some(block) = self.blocks.pop() else {
            return outcome;
        };
        let (ty, stored) = outcome?;
        self.record(block.node, block.value);
        ctx.scope.absorb(&mut self.reg, &block.scope, &block.args);
        if !self.reg.is_no_return(block.returns) {
            self.add_return(ctx, block.returns);
        }
        Ok((self.reg.union2(ty, block.breaks), stored))
    }

    /// Run block `idx` with `values` bound to its parameters until the
    /// block's value and the caller locals it widens are stable.
    pub(crate) fn yield_block(&mut self, idx: usize, values: &[TypeId], site: NodeId) -> Infer<TypeId> {
        let block = self.blocks[idx].clone();
        let nil = self.reg.core.nil;
        let max = self.config.max_fixpoint_passes;
        for _ in 0..max {
            let before_vars = self.blocks[idx].scope.vars.clone();
            let before_value = self.blocks[idx].value;

            let mut ctx = self.frame(FrameKind::Block, block.self_type, block.def_target, block.namespace);
            ctx.spec = block.spec;
            ctx.method = block.method.clone();
            ctx.block = block.outer_block;
            ctx.in_block = Some(idx);
            ctx.scope = self.blocks[idx].scope.clone();
            ctx.scope.terminated = false;
            for (i, name) in block.args.iter().enumerate() {
                let ty = values.get(i).copied().unwrap_or(nil);
                ctx.scope.replace(name, ty);
                let node = block.arg_nodes[i];
                let seen = match self.types.get(&node) {
                    Some(&old) => self.reg.union2(old, ty),
                    None => ty,
                };
                self.record(node, seen);
            }

            let body = self.infer_opt(&mut ctx, block.body)?;
            let value = self.reg.union2(self.blocks[idx].value, body);
            let scope = ctx.scope;
            let entry = &mut self.blocks[idx];
            entry.value = value;
            entry.scope.absorb(&mut self.reg, &scope, &block.args);
            if entry.scope.vars == before_vars && entry.value == before_value {
                return Ok(loaded_value(self, value));
            }
        }
        Err(TypeError::NonConvergent {
            what: "a block".into(),
            passes: max,
            location: self.loc(site),
        })
    }

    // ── Dispatch ───────────────────────────────────────────────────────

    /// Resolve `name` for every receiver and argument member. Also returns
    /// the widened pointer type when the call stored through a pointer.
    pub(crate) fn dispatch(
        &mut self,
        ctx: &mut Ctx,
        site: NodeId,
        name: &str,
        receiver: Option<TypeId>,
        args: &[TypeId],
        block: Option<usize>,
    ) -> Infer<(TypeId, Option<TypeId>)> {
        let implicit = receiver.is_none();
        let recv = receiver.unwrap_or(ctx.self_type);
        let recv_members = self.reg.members(recv);
        let arg_members: Vec<Vec<TypeId>> = args.iter().map(|&a| self.reg.members(a)).collect();
        if recv_members.is_empty() || arg_members.iter().any(Vec::is_empty) {
            return Ok((self.reg.core.no_return, None));
        }

        let mut results = Vec::new();
        let mut stored = Vec::new();
        for member in recv_members {
            for combo in cartesian(&arg_members) {
                let (ty, store) = self.dispatch_one(ctx, site, name, member, &combo, implicit, block)?;
                results.push(ty);
                stored.extend(store);
            }
        }
        let ty = self.reg.union(&results);
        let stored = if stored.is_empty() {
            None
        } else {
            Some(self.reg.union(&stored))
        };
        Ok((ty, stored))
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_one(
        &mut self,
        ctx: &mut Ctx,
        site: NodeId,
        name: &str,
        recv: TypeId,
        args: &[TypeId],
        implicit: bool,
        block: Option<usize>,
    ) -> Infer<(TypeId, Option<TypeId>)> {
        let owners = self.reg.ancestors(recv);
        let (arity_miss, restriction_miss) = match self.lookup_in(&owners, recv, name, args)? {
            Lookup::Found(def) => {
                let (ty, _) = self.instantiate(ctx, site, def, recv, args.to_vec(), block)?;
                return Ok((ty, None));
            }
            Lookup::NotFound {
                arity_miss,
                restriction_miss,
            } => (arity_miss, restriction_miss),
        };

        if let Some(class) = self.reg.instance_of(recv) {
            if name == "new" && self.reg.object(class).is_some() {
                let instance = self.allocate(ctx, site, class, args, block)?;
                return Ok((instance, None));
            }
            if let Some(ty) = self.call_external(site, class, name, args)? {
                return Ok((ty, None));
            }
        }

        if let Some(native) = builtins::native_call(&mut self.reg, recv, name, args) {
            return match native {
                Ok(Native::Value(ty)) => Ok((ty, None)),
                Ok(Native::Yields { values, result }) => {
                    let Some(idx) = block else {
                        return Err(TypeError::NoBlockGiven {
                            method: name.to_string(),
                            location: self.loc(site),
                        });
                    };
                    self.yield_block(idx, &values, site)?;
                    Ok((result, None))
                }
                Ok(Native::Store { pointer, value }) => Ok((value, Some(pointer))),
                Err(NativeError::Arity { expected }) => Err(TypeError::WrongArgumentCount {
                    name: name.to_string(),
                    expected: expected.to_string(),
                    found: args.len(),
                    location: self.loc(site),
                }),
                Err(NativeError::Argument { expected, found }) => Err(TypeError::Mismatch {
                    expected,
                    found,
                    context: format!("argument of '{}'", name),
                    location: self.loc(site),
                }),
            };
        }

        let program = self.reg.core.program;
        if implicit && recv != program {
            if let Lookup::Found(def) = self.lookup_in(&[program], program, name, args)? {
                let (ty, _) = self.instantiate(ctx, site, def, program, args.to_vec(), block)?;
                return Ok((ty, None));
            }
        }

        if let Some(err) = restriction_miss {
            return Err(err);
        }
        if let Some(expected) = arity_miss {
            return Err(TypeError::WrongArgumentCount {
                name: name.to_string(),
                expected,
                found: args.len(),
                location: self.loc(site),
            });
        }
        trace!(name, receiver = %self.reg.display(recv), "no method");
        Err(TypeError::UndefinedMethod {
            name: name.to_string(),
            receiver: self.reg.name(recv),
            location: self.loc(site),
        })
    }

    /// `Class.new(args)`: a fresh instance for generic classes, then
    /// `initialize` if one is defined.
    fn allocate(
        &mut self,
        ctx: &mut Ctx,
        site: NodeId,
        class: TypeId,
        args: &[TypeId],
        block: Option<usize>,
    ) -> Infer<TypeId> {
        let generic = self.reg.object(class).is_some_and(|o| o.is_generic());
        let instance = if generic {
            self.instance_for(site, class)
        } else {
            class
        };
        let owners = self.reg.ancestors(instance);
        match self.lookup_in(&owners, instance, "initialize", args)? {
            Lookup::Found(def) => {
                let (_, spec) = self.instantiate(ctx, site, def, instance, args.to_vec(), block)?;
                let assigned = self.spec(spec).assigned_ivars.clone();
                self.reg.mark_initialized(instance, assigned);
            }
            Lookup::NotFound {
                arity_miss: None,
                restriction_miss: None,
            } if args.is_empty() => {}
            Lookup::NotFound {
                arity_miss,
                restriction_miss,
            } => {
                if let Some(err) = restriction_miss {
                    return Err(err);
                }
                return Err(TypeError::WrongArgumentCount {
                    name: "new".into(),
                    expected: arity_miss.unwrap_or_else(|| "0".into()),
                    found: args.len(),
                    location: self.loc(site),
                });
            }
        }
        Ok(instance)
    }

    /// A `fun` of `lib`, checked against its declared parameter types.
    fn call_external(
        &mut self,
        site: NodeId,
        lib: TypeId,
        name: &str,
        args: &[TypeId],
    ) -> Infer<Option<TypeId>> {
        if !matches!(self.reg.get(lib), Type::Module(module) if module.is_lib) {
            return Ok(None);
        }
        let Some(fun) = self.symbols.external(lib, name).cloned() else {
            return Ok(None);
        };
        let arity_ok = if fun.varargs {
            args.len() >= fun.params.len()
        } else {
            args.len() == fun.params.len()
        };
        if !arity_ok {
            let expected = if fun.varargs {
                format!("{}+", fun.params.len())
            } else {
                fun.params.len().to_string()
            };
            return Err(TypeError::WrongArgumentCount {
                name: name.to_string(),
                expected,
                found: args.len(),
                location: self.loc(site),
            });
        }
        for (i, (&arg, &param)) in args.iter().zip(&fun.params).enumerate() {
            if !self.reg.satisfies(arg, param) {
                return Err(TypeError::Mismatch {
                    expected: self.reg.name(param),
                    found: self.reg.name(arg),
                    context: format!("argument {} of '{}'", i + 1, fun.real_name),
                    location: self.loc(site),
                });
            }
        }
        Ok(Some(fun.return_type))
    }

    // ── Overloads ──────────────────────────────────────────────────────

    /// First owner, in order, with a def accepting `args`. Within one owner
    /// the most specific match wins; ties go to the latest def.
    pub(crate) fn lookup_in(
        &mut self,
        owners: &[TypeId],
        self_type: TypeId,
        name: &str,
        args: &[TypeId],
    ) -> Infer<Lookup> {
        let mut arity_miss = None;
        let mut restriction_miss = None;
        for &owner in owners {
            let defs = self.symbols.defs_on(owner, name).to_vec();
            let mut best: Option<(u32, DefId)> = None;
            for def in defs {
                let info = self.symbols.def(def).clone();
                if !info.accepts(args.len()) {
                    arity_miss.get_or_insert_with(|| info.arity_label());
                    continue;
                }
                match self.match_score(&info, self_type, args)? {
                    Ok(score) => {
                        if best.map_or(true, |(b, _)| score >= b) {
                            best = Some((score, def));
                        }
                    }
                    Err(miss) => {
                        restriction_miss.get_or_insert(miss);
                    }
                }
            }
            if let Some((_, def)) = best {
                return Ok(Lookup::Found(def));
            }
        }
        Ok(Lookup::NotFound {
            arity_miss,
            restriction_miss,
        })
    }

    /// How closely `args` match the restrictions of `def`: two points per
    /// exact match, one per subtype match. The inner error describes the
    /// first rejected argument.
    fn match_score(
        &mut self,
        def: &DefInfo,
        self_type: TypeId,
        args: &[TypeId],
    ) -> Infer<Result<u32, TypeError>> {
        let mut score = 0;
        for (param, &arg) in def.params.iter().zip(args) {
            let target = match &param.restriction {
                None => continue,
                Some(Restriction::SelfType) => self_type,
                Some(Restriction::Type(ident)) => self.resolve_ident(def.namespace, *ident)?,
            };
            if arg == target {
                score += 2;
            } else if self.reg.satisfies(arg, target) {
                score += 1;
            } else {
                return Ok(Err(TypeError::Mismatch {
                    expected: self.reg.name(target),
                    found: self.reg.name(arg),
                    context: format!("argument '{}' of '{}'", param.name, def.name),
                    location: self.loc(def.node),
                }));
            }
        }
        Ok(Ok(score))
    }

    // ── Pointer stores ─────────────────────────────────────────────────

    /// After `p.value = v`, the receiver holds the widened pointer.
    fn rebind_pointer(&mut self, ctx: &mut Ctx, obj: NodeId, pointer: TypeId) -> Infer<()> {
        let value = self.reg.pointee(pointer).unwrap_or(self.reg.core.no_return);
        match self.ast.get(obj).clone() {
            Node::Var { name } => {
                let Some(old) = ctx.scope.get(&name) else {
                    return Ok(());
                };
                let rebound = self.replace_pointers(old, pointer);
                ctx.scope.replace(&name, rebound);
                self.record(obj, rebound);
                if let Some(slot) = ctx.scope.pointer_targets.get(&name).cloned() {
                    self.write_slot(ctx, slot, value);
                }
            }
            Node::InstanceVar { name } => {
                let owner = ctx.self_type;
                let old = self.reg.ivar(owner, &name).unwrap_or(pointer);
                let rebound = self.replace_pointers(old, pointer);
                self.reg.set_ivar(owner, &name, rebound);
                self.record(obj, rebound);
            }
            _ => {}
        }
        Ok(())
    }

    fn replace_pointers(&mut self, ty: TypeId, pointer: TypeId) -> TypeId {
        let mut members: Vec<TypeId> = self
            .reg
            .members(ty)
            .into_iter()
            .filter(|&m| self.reg.pointee(m).is_none())
            .collect();
        members.push(pointer);
        self.reg.union(&members)
    }
}

/// A block that never produced a value yields Nil to its caller.
fn loaded_value(engine: &Engine<'_>, value: TypeId) -> TypeId {
    if engine.reg.is_no_return(value) {
        engine.reg.core.nil
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartesian_covers_every_combination() {
        let (a, b, c) = (TypeId(1), TypeId(2), TypeId(3));
        let combos = cartesian(&[vec![a, b], vec![c]]);
        assert_eq!(combos, vec![vec![a, c], vec![b, c]]);
        assert_eq!(cartesian(&[]), vec![Vec::<TypeId>::new()]);
        assert!(cartesian(&[vec![a], vec![]]).is_empty());
    }
}
