//! `super` calls.
//!
//! `super` resolves the enclosing method's name starting *after* the class
//! that defined the running def, along the ancestors of the current `self`.
//! With no explicit arguments, the enclosing method's parameters are
//! forwarded with their current types.

use garnet_ast::NodeId;

use crate::calls::{cartesian, Lookup};
use crate::error::TypeError;
use crate::infer::{Ctx, Engine, Infer};
use crate::ty::TypeId;

impl Engine<'_> {
    pub(crate) fn infer_super(
        &mut self,
        ctx: &mut Ctx,
        id: NodeId,
        args: &[NodeId],
        block: Option<NodeId>,
    ) -> Infer<TypeId> {
        let Some(method) = ctx.method.clone() else {
            return Err(TypeError::NoSuperMethod {
                name: "super".into(),
                owner: self.reg.name(ctx.self_type),
                location: self.loc(id),
            });
        };

        let arg_types = if args.is_empty() {
            method
                .params
                .iter()
                .filter_map(|p| ctx.scope.get(p))
                .collect()
        } else {
            let mut tys = Vec::with_capacity(args.len());
            for &arg in args {
                tys.push(self.infer(ctx, arg)?);
            }
            tys
        };

        let block_idx = block.map(|b| self.push_block(ctx, b));
        let outcome = self.dispatch_super(ctx, id, &method.name, method.owner, &arg_types, block_idx);
        let (ty, _) = self.finish_block(ctx, block_idx, outcome.map(|ty| (ty, None)))?;
        Ok(ty)
    }

    fn dispatch_super(
        &mut self,
        ctx: &mut Ctx,
        id: NodeId,
        name: &str,
        owner: TypeId,
        args: &[TypeId],
        block: Option<usize>,
    ) -> Infer<TypeId> {
        let self_type = ctx.self_type;
        let ancestors = self.reg.ancestors(self_type);
        let start = ancestors
            .iter()
            .position(|&a| a == owner)
            .map_or(ancestors.len(), |p| p + 1);
        let candidates = ancestors[start..].to_vec();

        let arg_members: Vec<Vec<TypeId>> = args.iter().map(|&a| self.reg.members(a)).collect();
        if arg_members.iter().any(Vec::is_empty) {
            return Ok(self.reg.core.no_return);
        }

        let mut results = Vec::new();
        for combo in cartesian(&arg_members) {
            match self.lookup_in(&candidates, self_type, name, &combo)? {
                Lookup::Found(def) => {
                    let (ty, spec) = self.instantiate(ctx, id, def, self_type, combo, block)?;
                    results.push(ty);
                    let assigned = self.spec(spec).assigned_ivars.clone();
                    ctx.scope.ivars_assigned.extend(assigned);
                }
                Lookup::NotFound { .. } => {
                    return Err(TypeError::NoSuperMethod {
                        name: name.to_string(),
                        owner: self.reg.name(owner),
                        location: self.loc(id),
                    });
                }
            }
        }
        Ok(self.reg.union(&results))
    }
}
