//! Specialization of defs per call signature, and the recursion fixpoint.
//!
//! A def body is inferred once per distinct `(def, self type, argument
//! types, block)` key. Each specialization gets its own deep copy of the
//! body, so the same source node can carry different types in different
//! specializations.
//!
//! A call that reaches a specialization already on the inference stack
//! returns that specialization's provisional type, starting at `NoReturn`.
//! Once the body is done, the provisional type is widened with the result
//! and the body re-inferred until nothing changes. Specializations inferred
//! while a recursive cycle was open only depend on the cycle's outermost
//! member; they stay unsettled and are re-inferred on their next call until
//! that member settles.

use garnet_ast::{Node, NodeId};
use serde::Serialize;
use tracing::{debug, debug_span, trace};

use crate::env::{Scope, Slot};
use crate::error::TypeError;
use crate::infer::{BlockCtx, Ctx, Engine, FrameKind, Infer, MethodCtx};
use crate::symbols::DefId;
use crate::ty::TypeId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SpecId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecState {
    Pending,
    InProgress,
    Stable,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SpecKey {
    pub def: DefId,
    pub self_type: TypeId,
    pub args: Vec<TypeId>,
    pub block: Option<NodeId>,
    /// Caller locals visible to the block.
    pub captured: Vec<(String, TypeId)>,
}

/// A table slot read by a body, with what it held at the time.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SlotRead {
    pub slot: Slot,
    pub value: Option<TypeId>,
    pub initialized: bool,
}

/// What running a body did to the block it was given.
#[derive(Clone, Debug)]
pub(crate) struct BlockEffects {
    pub scope: Scope,
    pub value: TypeId,
    pub breaks: TypeId,
    pub returns: TypeId,
}

/// One def inferred for one call signature.
#[derive(Clone, Debug)]
pub struct Specialization {
    pub def: DefId,
    pub name: String,
    pub owner: TypeId,
    pub self_type: TypeId,
    pub arg_types: Vec<TypeId>,
    /// Copies of the def's `Arg` nodes.
    pub args: Vec<NodeId>,
    /// Copy of the def's body.
    pub body: Option<NodeId>,
    pub state: SpecState,
    pub return_type: Option<TypeId>,
    pub passes: u32,
    pub(crate) provisional: TypeId,
    pub(crate) recursed: bool,
    /// Outermost open specialization this result was computed against.
    pub(crate) tentative_on: Option<SpecId>,
    pub(crate) reads: Vec<SlotRead>,
    /// Instance variables assigned on every path through the body.
    pub(crate) assigned_ivars: Vec<String>,
    pub(crate) block_effects: Option<BlockEffects>,
}

impl Engine<'_> {
    pub(crate) fn spec(&self, id: SpecId) -> &Specialization {
        &self.specs[id.0 as usize]
    }

    fn spec_mut(&mut self, id: SpecId) -> &mut Specialization {
        &mut self.specs[id.0 as usize]
    }

    /// Type of calling `def` on `self_type` with `args` from call node
    /// `site`. Infers the body unless a settled result is memoized.
    pub(crate) fn instantiate(
        &mut self,
        ctx: &mut Ctx,
        site: NodeId,
        def: DefId,
        self_type: TypeId,
        args: Vec<TypeId>,
        block: Option<usize>,
    ) -> Infer<(TypeId, SpecId)> {
        // A block the body never yields to cannot change its result.
        let block = block.filter(|_| self.symbols.def(def).yields);
        let key = SpecKey {
            def,
            self_type,
            args,
            block: block.map(|b| self.blocks[b].node),
            captured: block.map(|b| self.blocks[b].scope.snapshot()).unwrap_or_default(),
        };
        let id = match self.memo.get(&key) {
            Some(&id) => id,
            None => self.create_spec(key),
        };
        let targets = self.call_targets.entry(site).or_default();
        if !targets.contains(&id) {
            targets.push(id);
        }

        match self.spec(id).state {
            SpecState::InProgress => {
                self.note_recursion(id);
                return Ok((self.spec(id).provisional, id));
            }
            SpecState::Stable if !self.is_stale(id) => {
                if let (Some(idx), Some(effects)) = (block, self.spec(id).block_effects.clone()) {
                    self.apply_block_effects(idx, &effects);
                }
            }
            _ => {
                let depth = self.config.max_specialization_depth;
                if self.stack.len() >= depth as usize {
                    let def_node = self.symbols.def(def).node;
                    return Err(TypeError::SpecializationOverflow {
                        name: self.spec(id).name.clone(),
                        depth,
                        location: self.loc(site).or_else(|| self.loc(def_node)),
                    });
                }
                self.infer_spec(id, block)?
            }
        }

        let reads = self.spec(id).reads.clone();
        for read in reads {
            self.note_read(ctx.spec, read);
        }
        let spec = self.spec(id);
        Ok((spec.return_type.unwrap_or(spec.provisional), id))
    }

    fn create_spec(&mut self, key: SpecKey) -> SpecId {
        let info = self.symbols.def(key.def).clone();
        let def_node = info.node;
        let (arg_nodes, body) = match self.ast.get(def_node).clone() {
            Node::Def { args, body, .. } => (args, body),
            _ => (Vec::new(), None),
        };
        let args = arg_nodes.into_iter().map(|a| self.ast.deep_clone(a)).collect();
        let body = body.map(|b| self.ast.deep_clone(b));
        let id = SpecId(self.specs.len() as u32);
        debug!(
            name = %info.name,
            self_type = %self.reg.display(key.self_type),
            "new specialization"
        );
        self.specs.push(Specialization {
            def: key.def,
            name: info.name,
            owner: info.owner,
            self_type: key.self_type,
            arg_types: key.args.clone(),
            args,
            body,
            state: SpecState::Pending,
            return_type: None,
            passes: 0,
            provisional: self.reg.core.no_return,
            recursed: false,
            tentative_on: None,
            reads: Vec::new(),
            assigned_ivars: Vec::new(),
            block_effects: None,
        });
        self.memo.insert(key, id);
        id
    }

    /// A call reached `id` while its body is still being inferred. Every
    /// specialization opened above it now depends on the cycle.
    fn note_recursion(&mut self, id: SpecId) {
        self.spec_mut(id).recursed = true;
        let Some(pos) = self.stack.iter().position(|&s| s == id) else {
            return;
        };
        trace!(name = %self.spec(id).name, depth = self.stack.len() - pos, "recursive call");
        for i in pos + 1..self.stack.len() {
            let dependent = self.stack[i];
            let keep = self
                .spec(dependent)
                .tentative_on
                .and_then(|t| self.stack.iter().position(|&s| s == t))
                .is_some_and(|p| p < pos);
            if !keep {
                self.spec_mut(dependent).tentative_on = Some(id);
            }
        }
    }

    /// Did anything the body read change since it was inferred?
    fn is_stale(&self, id: SpecId) -> bool {
        self.spec(id).reads.iter().any(|read| match &read.slot {
            Slot::Ivar(obj, name) => {
                self.reg.ivar(*obj, name) != read.value
                    || self.reg.is_initialized(*obj, name) != read.initialized
            }
            Slot::Global(name) => self.symbols.global(name) != read.value,
            Slot::Local(_) => false,
        })
    }

    pub(crate) fn infer_spec(&mut self, id: SpecId, block: Option<usize>) -> Infer<()> {
        let span = debug_span!(
            "infer_specialization",
            name = %self.spec(id).name,
            self_type = %self.reg.display(self.spec(id).self_type),
        );
        let _enter = span.enter();

        let bottom = self.reg.core.no_return;
        let spec = self.spec_mut(id);
        spec.state = SpecState::InProgress;
        spec.tentative_on = None;
        spec.provisional = bottom;
        self.stack.push(id);
        let outcome = self.spec_passes(id, block);
        self.stack.pop();
        let result = match outcome {
            Ok(ty) => ty,
            Err(err) => {
                self.spec_mut(id).state = SpecState::Pending;
                return Err(err);
            }
        };

        let effects = block.map(|idx| {
            let b = &self.blocks[idx];
            BlockEffects {
                scope: b.scope.clone(),
                value: b.value,
                breaks: b.breaks,
                returns: b.returns,
            }
        });
        let spec = &mut self.specs[id.0 as usize];
        spec.return_type = Some(result);
        spec.block_effects = effects;
        debug!(
            name = %spec.name,
            passes = spec.passes,
            return_type = %self.reg.display(result),
            "inferred specialization"
        );

        match self.spec(id).tentative_on {
            Some(root) => {
                self.spec_mut(id).state = SpecState::Pending;
                for spec in &mut self.specs {
                    if spec.tentative_on == Some(id) {
                        spec.tentative_on = Some(root);
                    }
                }
            }
            None => {
                let (bottom, nil) = (self.reg.core.no_return, self.reg.core.nil);
                for (i, spec) in self.specs.iter_mut().enumerate() {
                    if i == id.0 as usize || spec.tentative_on == Some(id) {
                        spec.tentative_on = None;
                        spec.state = SpecState::Stable;
                        // A settled body that never returns evaluates to nil.
                        if spec.return_type == Some(bottom) {
                            spec.return_type = Some(nil);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn spec_passes(&mut self, id: SpecId, block: Option<usize>) -> Infer<TypeId> {
        let max = self.config.max_fixpoint_passes;
        for pass in 1..=max {
            let spec = self.spec_mut(id);
            spec.recursed = false;
            spec.reads.clear();
            spec.passes = pass;
            let result = self.run_spec_body(id, block)?;
            let provisional = self.spec(id).provisional;
            if !self.spec(id).recursed {
                return Ok(result);
            }
            let widened = self.reg.union2(provisional, result);
            if widened == provisional {
                return Ok(widened);
            }
            trace!(pass, provisional = %self.reg.display(widened), "widening recursive result");
            self.spec_mut(id).provisional = widened;
        }
        let spec = self.spec(id);
        Err(TypeError::NonConvergent {
            what: format!("'{}'", spec.name),
            passes: max,
            location: self.loc(self.symbols.def(spec.def).node),
        })
    }

    /// Infer the body once: parameters, then statements.
    fn run_spec_body(&mut self, id: SpecId, block: Option<usize>) -> Infer<TypeId> {
        let spec = self.spec(id).clone();
        let info = self.symbols.def(spec.def).clone();
        let mut ctx = self.frame(FrameKind::Method, spec.self_type, spec.owner, info.namespace);
        ctx.spec = Some(id);
        ctx.block = block;
        ctx.method = Some(MethodCtx {
            owner: spec.owner,
            name: spec.name.clone(),
            params: info.params.iter().map(|p| p.name.clone()).collect(),
        });

        let nil = self.reg.core.nil;
        for (i, &arg) in spec.args.iter().enumerate() {
            let Node::Arg {
                name,
                default_value,
                ..
            } = self.ast.get(arg).clone()
            else {
                continue;
            };
            let ty = match (spec.arg_types.get(i), default_value) {
                (Some(&ty), _) => ty,
                (None, Some(default)) => self.infer(&mut ctx, default)?,
                (None, None) => nil,
            };
            ctx.scope.bind(&mut self.reg, &name, ty);
            self.record(arg, ty);
        }

        let body = self.infer_opt(&mut ctx, spec.body)?;
        let result = self.reg.union2(body, ctx.return_type);
        let mut assigned: Vec<String> = ctx.scope.ivars_assigned.into_iter().collect();
        assigned.sort();
        self.spec_mut(id).assigned_ivars = assigned;
        Ok(result)
    }

    fn apply_block_effects(&mut self, idx: usize, effects: &BlockEffects) {
        let args = self.blocks[idx].args.clone();
        let BlockCtx {
            scope,
            value,
            breaks,
            returns,
            ..
        } = &mut self.blocks[idx];
        scope.absorb(&mut self.reg, &effects.scope, &args);
        *value = self.reg.union2(*value, effects.value);
        *breaks = self.reg.union2(*breaks, effects.breaks);
        *returns = self.reg.union2(*returns, effects.returns);
    }
}
