//! The inference engine: statement and expression typing.
//!
//! [`Engine`] walks the tree depth first. Each node's type is written to a
//! side table as soon as it is computed. Calls are handed to [`crate::calls`],
//! which may instantiate and infer a def body through [`crate::fixpoint`].
//!
//! The whole program is re-walked while instance-variable or global tables
//! keep widening, since a read typed early in a pass may have missed an
//! assignment discovered later in the same pass.

use garnet_ast::{traverse, Ast, Node, NodeId, Visitor};
use garnet_common::Location;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::builtins;
use crate::config::InferConfig;
use crate::env::{Scope, Slot};
use crate::error::TypeError;
use crate::fixpoint::{SlotRead, SpecId, SpecKey, SpecState, Specialization};
use crate::symbols::{DefId, DefInfo, ExternalFun, Param, SymbolTable};
use crate::ty::{ModuleType, ObjectType, Type, TypeId, TypeRegistry};

pub(crate) type Infer<T> = Result<T, TypeError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameKind {
    TopLevel,
    ClassBody,
    Method,
    Block,
}

/// The def a frame is executing, for `super` and `yield` messages.
#[derive(Clone, Debug)]
pub(crate) struct MethodCtx {
    pub owner: TypeId,
    pub name: String,
    pub params: Vec<String>,
}

/// Evaluation context of one frame.
pub(crate) struct Ctx {
    pub kind: FrameKind,
    pub self_type: TypeId,
    /// Where a `def` in this frame registers.
    pub def_target: TypeId,
    pub namespace: Option<TypeId>,
    pub scope: Scope,
    pub spec: Option<SpecId>,
    pub method: Option<MethodCtx>,
    /// Block passed to the running method, the target of `yield`.
    pub block: Option<usize>,
    /// Set when this frame runs the body of a block.
    pub in_block: Option<usize>,
    pub return_type: TypeId,
    pub loop_depth: u32,
}

/// A block literal attached to a call that is currently being resolved.
#[derive(Clone, Debug)]
pub(crate) struct BlockCtx {
    pub node: NodeId,
    pub arg_nodes: Vec<NodeId>,
    pub args: Vec<String>,
    pub body: Option<NodeId>,
    pub self_type: TypeId,
    pub def_target: TypeId,
    pub namespace: Option<TypeId>,
    pub spec: Option<SpecId>,
    pub method: Option<MethodCtx>,
    pub outer_block: Option<usize>,
    /// The caller's locals, widened by every run of the body.
    pub scope: Scope,
    pub value: TypeId,
    pub breaks: TypeId,
    pub returns: TypeId,
}

pub(crate) struct Engine<'c> {
    pub ast: Ast,
    pub reg: TypeRegistry,
    pub symbols: SymbolTable,
    pub config: &'c InferConfig,
    pub types: FxHashMap<NodeId, TypeId>,
    pub call_targets: FxHashMap<NodeId, Vec<SpecId>>,
    pub specs: Vec<Specialization>,
    pub memo: FxHashMap<SpecKey, SpecId>,
    /// Specializations currently being inferred, outermost first.
    pub stack: Vec<SpecId>,
    pub blocks: Vec<BlockCtx>,
    /// Generic instances created by a literal or `new` call node.
    instances: FxHashMap<(NodeId, TypeId), TypeId>,
}

/// Local variables assigned anywhere in a subtree, nested defs and blocks
/// excluded.
struct AssignedVars(Vec<String>);

impl Visitor for AssignedVars {
    fn enter(&mut self, ast: &Ast, _id: NodeId, node: &Node) -> bool {
        let targets = match node {
            Node::Def { .. } | Node::ClassDef { .. } | Node::ModuleDef { .. } | Node::Block { .. } => {
                return false
            }
            Node::Assign { target, .. } => vec![*target],
            Node::MultiAssign { targets, .. } => targets.clone(),
            _ => return true,
        };
        for target in targets {
            if let Node::Var { name } = ast.get(target) {
                if !self.0.contains(name) {
                    self.0.push(name.clone());
                }
            }
        }
        true
    }
}

struct Descendants(Vec<NodeId>);

impl Visitor for Descendants {
    fn enter(&mut self, _ast: &Ast, id: NodeId, _node: &Node) -> bool {
        self.0.push(id);
        true
    }
}

impl<'c> Engine<'c> {
    pub fn new(ast: Ast, config: &'c InferConfig) -> Self {
        let reg = TypeRegistry::new();
        let symbols = SymbolTable::new(&reg);
        Self {
            ast,
            reg,
            symbols,
            config,
            types: FxHashMap::default(),
            call_targets: FxHashMap::default(),
            specs: Vec::new(),
            memo: FxHashMap::default(),
            stack: Vec::new(),
            blocks: Vec::new(),
            instances: FxHashMap::default(),
        }
    }

    /// Infer the program rooted at `root` until instance-variable and
    /// global tables stop widening.
    pub fn run(&mut self, root: NodeId) -> Infer<TypeId> {
        let max = self.config.max_program_passes;
        for pass in 1..=max {
            let before = self.generation();
            self.blocks.clear();
            self.stack.clear();
            let program = self.reg.core.program;
            let mut ctx = self.frame(FrameKind::TopLevel, program, program, None);
            let outcome = self.infer(&mut ctx, root);
            let changed = self.generation() != before;
            match outcome {
                Ok(ty) if !changed => return Ok(ty),
                Ok(_) => debug!(pass, "instance variables widened, re-running program"),
                Err(err) if !changed || pass == max => return Err(err),
                Err(err) => {
                    debug!(pass, %err, "error after widening, re-running program");
                    self.reset_unsettled();
                }
            }
        }
        Err(TypeError::NonConvergent {
            what: "the program".into(),
            passes: max,
            location: self.loc(root),
        })
    }

    fn generation(&self) -> (u64, u64) {
        (self.reg.generation(), self.symbols.generation())
    }

    pub fn frame(
        &self,
        kind: FrameKind,
        self_type: TypeId,
        def_target: TypeId,
        namespace: Option<TypeId>,
    ) -> Ctx {
        Ctx {
            kind,
            self_type,
            def_target,
            namespace,
            scope: Scope::new(),
            spec: None,
            method: None,
            block: None,
            in_block: None,
            return_type: self.reg.core.no_return,
            loop_depth: 0,
        }
    }

    pub fn loc(&self, id: NodeId) -> Option<Location> {
        self.ast.location(id).cloned()
    }

    pub fn record(&mut self, id: NodeId, ty: TypeId) {
        self.types.insert(id, ty);
    }

    /// The generic instance owned by node `id`, created on first use.
    pub fn instance_for(&mut self, id: NodeId, base: TypeId) -> TypeId {
        if let Some(&ty) = self.instances.get(&(id, base)) {
            return ty;
        }
        let ty = self.reg.instantiate(base);
        self.instances.insert((id, base), ty);
        ty
    }

    // ── Expressions ────────────────────────────────────────────────────

    pub fn infer(&mut self, ctx: &mut Ctx, id: NodeId) -> Infer<TypeId> {
        // Nested specializations recurse through here; grow the stack on demand.
        stacker::maybe_grow(64 * 1024, 2 * 1024 * 1024, || self.infer_node(ctx, id))
    }

    fn infer_node(&mut self, ctx: &mut Ctx, id: NodeId) -> Infer<TypeId> {
        let core = self.reg.core.clone();
        let node = self.ast.get(id).clone();
        let ty = match node {
            Node::Expressions { exps } => self.infer_exps(ctx, &exps)?,

            Node::NilLiteral => core.nil,
            Node::BoolLiteral { .. } => core.bool,
            Node::IntLiteral { .. } => core.int,
            Node::LongLiteral { .. } => core.long,
            Node::FloatLiteral { .. } => core.float,
            Node::DoubleLiteral { .. } => core.double,
            Node::CharLiteral { .. } => core.char,
            Node::StringLiteral { .. } => core.string,
            Node::SymbolLiteral { .. } => core.symbol,
            Node::RegexpLiteral { .. } => core.regexp,
            Node::RangeLiteral { from, to, .. } => {
                let from = self.infer(ctx, from)?;
                let to = self.infer(ctx, to)?;
                let range = self.instance_for(id, core.range);
                builtins::init_range(&mut self.reg, range, from, to);
                range
            }
            Node::ArrayLiteral { elements } => {
                let mut elems = Vec::with_capacity(elements.len());
                for element in elements {
                    elems.push(self.infer(ctx, element)?);
                }
                let elem = self.reg.union(&elems);
                let array = self.instance_for(id, core.array);
                builtins::init_array(&mut self.reg, array, elem);
                array
            }
            Node::HashLiteral { entries } => {
                let mut keys = Vec::with_capacity(entries.len());
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    keys.push(self.infer(ctx, key)?);
                    values.push(self.infer(ctx, value)?);
                }
                let key = self.reg.union(&keys);
                let value = self.reg.union(&values);
                let hash = self.instance_for(id, core.hash);
                builtins::init_hash(&mut self.reg, hash, key, value);
                hash
            }

            Node::ClassDef {
                name,
                superclass,
                type_vars,
                body,
            } => self.infer_class(ctx, &name, superclass, type_vars, body)?,
            Node::ModuleDef { name, body } => self.infer_module(ctx, &name, body)?,
            Node::Def { .. } => {
                self.register_def(ctx, id)?;
                core.nil
            }
            Node::Arg { .. } | Node::When { .. } | Node::Block { .. } => core.nil,

            Node::Var { name } => self.read_var(ctx, id, &name)?,
            Node::InstanceVar { name } => self.read_ivar(ctx, id, &name)?,
            Node::Global { name } => self.read_global(ctx, &name),
            Node::Ident { names, global } => {
                let ty = self.resolve_path(ctx.namespace, &names, global, id)?;
                self.reg.metaclass_of(ty)
            }

            Node::And { left, right } => self.infer_and(ctx, left, right)?,
            Node::Or { left, right } => self.infer_or(ctx, left, right)?,
            Node::SimpleOr { left, right } => {
                let left = self.infer(ctx, left)?;
                let right = self.infer(ctx, right)?;
                self.reg.union2(left, right)
            }
            Node::Call { .. } => self.infer_call(ctx, id)?,
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => self.infer_if(ctx, cond, then_branch, else_branch)?,
            Node::Assign { target, value } => {
                let ty = self.infer(ctx, value)?;
                let slot = self.pointer_slot(ctx, value);
                self.assign_to(ctx, target, ty, slot)?;
                ty
            }
            Node::MultiAssign { targets, values } => {
                self.infer_multi_assign(ctx, id, &targets, &values)?
            }
            Node::While {
                cond,
                body,
                run_once,
            } => self.infer_while(ctx, id, cond, body, run_once)?,
            Node::Case {
                cond,
                whens,
                else_branch,
            } => self.infer_case(ctx, cond, &whens, else_branch)?,

            Node::Return { exps } => {
                let ty = self.jump_value(ctx, id, &exps)?;
                self.add_return(ctx, ty);
                ctx.scope.terminated = true;
                core.no_return
            }
            Node::Break { exps } => {
                let ty = self.jump_value(ctx, id, &exps)?;
                if ctx.loop_depth == 0 {
                    if let Some(idx) = ctx.in_block {
                        let breaks = self.reg.union2(self.blocks[idx].breaks, ty);
                        self.blocks[idx].breaks = breaks;
                    }
                }
                ctx.scope.terminated = true;
                core.no_return
            }
            Node::Next { exps } => {
                let ty = self.jump_value(ctx, id, &exps)?;
                if ctx.loop_depth == 0 {
                    if let Some(idx) = ctx.in_block {
                        let value = self.reg.union2(self.blocks[idx].value, ty);
                        self.blocks[idx].value = value;
                    }
                }
                ctx.scope.terminated = true;
                core.no_return
            }
            Node::Yield { exps } => {
                let mut values = Vec::with_capacity(exps.len());
                for exp in exps {
                    values.push(self.infer(ctx, exp)?);
                }
                let Some(idx) = ctx.block else {
                    let method = match (&ctx.method, ctx.kind) {
                        (Some(m), _) => m.name.clone(),
                        (None, FrameKind::ClassBody) => "<class body>".into(),
                        (None, _) => "<program>".into(),
                    };
                    return Err(TypeError::NoBlockGiven {
                        method,
                        location: self.loc(id),
                    });
                };
                self.yield_block(idx, &values, id)?
            }

            Node::PointerOf { var } => self.infer_pointer_of(ctx, var)?,
            Node::IsA { obj, target } => {
                self.infer(ctx, obj)?;
                self.infer(ctx, target)?;
                core.bool
            }
            Node::Require { string } => {
                self.infer(ctx, string)?;
                core.nil
            }
            Node::LibDef {
                name,
                libname,
                body,
            } => {
                self.infer_lib(ctx, &name, libname, body)?;
                core.nil
            }
            Node::FunDef { .. }
            | Node::FunDefArg { .. }
            | Node::TypeDef { .. }
            | Node::StructDef { .. } => core.nil,
            Node::Include { name } => {
                self.infer_include(ctx, name)?;
                core.nil
            }
        };
        self.record(id, ty);
        Ok(ty)
    }

    pub fn infer_opt(&mut self, ctx: &mut Ctx, id: Option<NodeId>) -> Infer<TypeId> {
        match id {
            Some(id) => self.infer(ctx, id),
            None => Ok(self.reg.core.nil),
        }
    }

    fn infer_exps(&mut self, ctx: &mut Ctx, exps: &[NodeId]) -> Infer<TypeId> {
        let mut last = self.reg.core.nil;
        for &exp in exps {
            if ctx.scope.terminated {
                self.mark_unreachable(exp);
                continue;
            }
            last = self.infer(ctx, exp)?;
        }
        if ctx.scope.terminated {
            Ok(self.reg.core.no_return)
        } else {
            Ok(last)
        }
    }

    /// Code after a jump never runs; its nodes type as uninhabited.
    fn mark_unreachable(&mut self, id: NodeId) {
        let mut all = Descendants(Vec::new());
        traverse(&self.ast, id, &mut all);
        let bottom = self.reg.core.no_return;
        for id in all.0 {
            self.types.entry(id).or_insert(bottom);
        }
    }

    /// Run `f` against `scope` instead of the frame's scope, handing back
    /// the scope it ended with.
    pub fn in_scope<F>(&mut self, ctx: &mut Ctx, scope: Scope, f: F) -> Infer<(TypeId, Scope)>
    where
        F: FnOnce(&mut Self, &mut Ctx) -> Infer<TypeId>,
    {
        let saved = std::mem::replace(&mut ctx.scope, scope);
        let result = f(self, ctx);
        let inner = std::mem::replace(&mut ctx.scope, saved);
        Ok((result?, inner))
    }

    // ── Variables ──────────────────────────────────────────────────────

    fn read_var(&mut self, ctx: &mut Ctx, id: NodeId, name: &str) -> Infer<TypeId> {
        if name == "self" {
            return Ok(ctx.self_type);
        }
        ctx.scope.get(name).ok_or_else(|| TypeError::UninitializedRead {
            name: name.to_string(),
            location: self.loc(id),
        })
    }

    /// The object whose table holds instance variables in this frame.
    fn ivar_owner(&self, ctx: &Ctx, id: NodeId) -> Infer<TypeId> {
        if self.reg.object(ctx.self_type).is_some() {
            Ok(ctx.self_type)
        } else {
            Err(TypeError::Mismatch {
                expected: "an object".into(),
                found: self.reg.name(ctx.self_type),
                context: "instance variable access".into(),
                location: self.loc(id),
            })
        }
    }

    /// An instance variable read is nilable unless this frame already
    /// assigned it or every `initialize` path does.
    fn read_ivar(&mut self, ctx: &mut Ctx, id: NodeId, name: &str) -> Infer<TypeId> {
        let obj = self.ivar_owner(ctx, id)?;
        let value = self.reg.ivar(obj, name);
        let initialized = self.reg.is_initialized(obj, name);
        self.note_read(
            ctx.spec,
            SlotRead {
                slot: Slot::Ivar(obj, name.to_string()),
                value,
                initialized,
            },
        );
        let ty = value.unwrap_or(self.reg.core.no_return);
        if initialized || ctx.scope.ivars_assigned.contains(name) {
            Ok(ty)
        } else {
            Ok(self.reg.nilable(ty))
        }
    }

    fn read_global(&mut self, ctx: &mut Ctx, name: &str) -> TypeId {
        let value = self.symbols.global(name);
        self.note_read(
            ctx.spec,
            SlotRead {
                slot: Slot::Global(name.to_string()),
                value,
                initialized: false,
            },
        );
        let ty = value.unwrap_or(self.reg.core.no_return);
        if ctx.scope.globals_assigned.contains(name) {
            ty
        } else {
            self.reg.nilable(ty)
        }
    }

    /// The slot whose address `value` takes, if it is a `.ptr` expression.
    fn pointer_slot(&self, ctx: &Ctx, value: NodeId) -> Option<Slot> {
        let Node::PointerOf { var } = self.ast.get(value) else {
            return None;
        };
        match self.ast.get(*var) {
            Node::Var { name } => Some(Slot::Local(name.clone())),
            Node::InstanceVar { name } => Some(Slot::Ivar(ctx.self_type, name.clone())),
            Node::Global { name } => Some(Slot::Global(name.clone())),
            _ => None,
        }
    }

    pub fn assign_to(
        &mut self,
        ctx: &mut Ctx,
        target: NodeId,
        ty: TypeId,
        slot: Option<Slot>,
    ) -> Infer<()> {
        let bound = match self.ast.get(target).clone() {
            Node::Var { name } => {
                match slot {
                    Some(slot) => ctx.scope.pointer_targets.insert(name.clone(), slot),
                    None => ctx.scope.pointer_targets.remove(&name),
                };
                ctx.scope.bind(&mut self.reg, &name, ty)
            }
            Node::InstanceVar { name } => {
                let obj = self.ivar_owner(ctx, target)?;
                self.reg.add_ivar(obj, &name, ty);
                ctx.scope.ivars_assigned.insert(name.clone());
                self.reg.ivar(obj, &name).unwrap_or(ty)
            }
            Node::Global { name } => {
                ctx.scope.globals_assigned.insert(name.clone());
                self.symbols.add_global(&mut self.reg, &name, ty)
            }
            other => {
                return Err(TypeError::Mismatch {
                    expected: "a variable".into(),
                    found: other.kind().to_string(),
                    context: "assignment target".into(),
                    location: self.loc(target),
                })
            }
        };
        self.record(target, bound);
        Ok(())
    }

    /// Store `value` into `slot`, the pointee of a pointer written through.
    pub fn write_slot(&mut self, ctx: &mut Ctx, slot: Slot, value: TypeId) {
        match slot {
            Slot::Local(name) => {
                ctx.scope.bind(&mut self.reg, &name, value);
            }
            Slot::Ivar(obj, name) => {
                self.reg.add_ivar(obj, &name, value);
            }
            Slot::Global(name) => {
                self.symbols.add_global(&mut self.reg, &name, value);
            }
        }
    }

    fn infer_multi_assign(
        &mut self,
        ctx: &mut Ctx,
        id: NodeId,
        targets: &[NodeId],
        values: &[NodeId],
    ) -> Infer<TypeId> {
        let mut tys = Vec::with_capacity(values.len());
        for &value in values {
            tys.push(self.infer(ctx, value)?);
        }
        if targets.len() == values.len() {
            for (&target, &ty) in targets.iter().zip(&tys) {
                self.assign_to(ctx, target, ty, None)?;
            }
        } else if let [single] = tys.as_slice() {
            let array = self.reg.core.array;
            let mut elems = Vec::new();
            for member in self.reg.members(*single) {
                if !self.reg.is_instance_of(member, array) {
                    return Err(TypeError::Mismatch {
                        expected: "Array".into(),
                        found: self.reg.name(member),
                        context: "multiple assignment source".into(),
                        location: self.loc(id),
                    });
                }
                let elem = self
                    .reg
                    .ivar(member, "@buffer")
                    .and_then(|p| self.reg.pointee(p))
                    .unwrap_or(self.reg.core.nil);
                elems.push(elem);
            }
            let elem = self.reg.union(&elems);
            let elem = if self.reg.is_no_return(elem) { self.reg.core.nil } else { elem };
            for &target in targets {
                self.assign_to(ctx, target, elem, None)?;
            }
        } else {
            return Err(TypeError::Mismatch {
                expected: format!("{} values", targets.len()),
                found: format!("{} values", values.len()),
                context: "multiple assignment".into(),
                location: self.loc(id),
            });
        }
        Ok(self.reg.core.nil)
    }

    fn infer_pointer_of(&mut self, ctx: &mut Ctx, var: NodeId) -> Infer<TypeId> {
        let pointee = match self.ast.get(var).clone() {
            Node::InstanceVar { name } => {
                let obj = self.ivar_owner(ctx, var)?;
                let raw = self.reg.ivar(obj, &name).unwrap_or(self.reg.core.no_return);
                self.record(var, raw);
                raw
            }
            _ => self.infer(ctx, var)?,
        };
        Ok(self.reg.pointer_of(pointee))
    }

    fn jump_value(&mut self, ctx: &mut Ctx, id: NodeId, exps: &[NodeId]) -> Infer<TypeId> {
        match exps {
            [] => Ok(self.reg.core.nil),
            [single] => self.infer(ctx, *single),
            many => {
                let mut tys = Vec::with_capacity(many.len());
                for &exp in many {
                    tys.push(self.infer(ctx, exp)?);
                }
                let elem = self.reg.union(&tys);
                let array = self.instance_for(id, self.reg.core.array);
                builtins::init_array(&mut self.reg, array, elem);
                Ok(array)
            }
        }
    }

    pub fn add_return(&mut self, ctx: &mut Ctx, ty: TypeId) {
        match ctx.in_block {
            Some(idx) => {
                let returns = self.reg.union2(self.blocks[idx].returns, ty);
                self.blocks[idx].returns = returns;
            }
            None => ctx.return_type = self.reg.union2(ctx.return_type, ty),
        }
    }

    // ── Flow ───────────────────────────────────────────────────────────

    fn infer_if(
        &mut self,
        ctx: &mut Ctx,
        cond: NodeId,
        then_branch: Option<NodeId>,
        else_branch: Option<NodeId>,
    ) -> Infer<TypeId> {
        self.infer(ctx, cond)?;
        let (then_scope, else_scope) = self.narrow(ctx, cond);
        let (then_ty, then_scope) =
            self.in_scope(ctx, then_scope, |e, ctx| e.infer_opt(ctx, then_branch))?;
        let (else_ty, else_scope) =
            self.in_scope(ctx, else_scope, |e, ctx| e.infer_opt(ctx, else_branch))?;
        ctx.scope = Scope::merge(&mut self.reg, vec![then_scope, else_scope]);
        Ok(self.reg.union2(then_ty, else_ty))
    }

    fn infer_and(&mut self, ctx: &mut Ctx, left: NodeId, right: NodeId) -> Infer<TypeId> {
        let left_ty = self.infer(ctx, left)?;
        let (narrowed, _) = self.narrow(ctx, left);
        let (right_ty, right_scope) =
            self.in_scope(ctx, narrowed, |e, ctx| e.infer(ctx, right))?;
        let base = ctx.scope.clone();
        ctx.scope = Scope::merge(&mut self.reg, vec![base, right_scope]);
        Ok(self.reg.union2(left_ty, right_ty))
    }

    fn infer_or(&mut self, ctx: &mut Ctx, left: NodeId, right: NodeId) -> Infer<TypeId> {
        let left_ty = self.infer(ctx, left)?;
        let (_, otherwise) = self.narrow(ctx, left);
        let (right_ty, right_scope) =
            self.in_scope(ctx, otherwise, |e, ctx| e.infer(ctx, right))?;
        let base = ctx.scope.clone();
        ctx.scope = Scope::merge(&mut self.reg, vec![base, right_scope]);
        Ok(self.reg.union2(left_ty, right_ty))
    }

    /// Scopes for the truthy and falsy outcomes of `cond`.
    pub fn narrow(&mut self, ctx: &Ctx, cond: NodeId) -> (Scope, Scope) {
        let mut truthy = ctx.scope.clone();
        let mut falsy = ctx.scope.clone();
        self.refine(cond, &mut truthy, &mut falsy);
        (truthy, falsy)
    }

    fn refine(&mut self, cond: NodeId, truthy: &mut Scope, falsy: &mut Scope) {
        match self.ast.get(cond).clone() {
            Node::Var { name } => {
                if let Some(ty) = truthy.get(&name) {
                    let non_nil = self.reg.without_nil(ty);
                    truthy.replace(&name, non_nil);
                }
            }
            Node::IsA { obj, target } => {
                let Node::Var { name } = self.ast.get(obj).clone() else {
                    return;
                };
                let Some(class) = self.types.get(&target).and_then(|&t| self.reg.instance_of(t))
                else {
                    return;
                };
                if let Some(ty) = truthy.get(&name) {
                    let matching = self.reg.remove(ty, |reg, m| !reg.is_a(m, class));
                    truthy.replace(&name, matching);
                }
                if let Some(ty) = falsy.get(&name) {
                    let rest = self.reg.remove(ty, |reg, m| reg.is_a(m, class));
                    falsy.replace(&name, rest);
                }
            }
            Node::And { left, right } => {
                let mut ignored = falsy.clone();
                self.refine(left, truthy, &mut ignored);
                self.refine(right, truthy, &mut ignored);
            }
            Node::Call {
                obj: Some(obj),
                name,
                args,
                ..
            } if args.is_empty() => match name.as_str() {
                "!@" => self.refine(obj, falsy, truthy),
                "nil?" => {
                    if let Node::Var { name } = self.ast.get(obj).clone() {
                        let nil = self.reg.core.nil;
                        if let Some(ty) = truthy.get(&name) {
                            if self.reg.contains(ty, nil) {
                                truthy.replace(&name, nil);
                            }
                        }
                        if let Some(ty) = falsy.get(&name) {
                            let non_nil = self.reg.without_nil(ty);
                            falsy.replace(&name, non_nil);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn infer_case(
        &mut self,
        ctx: &mut Ctx,
        cond: NodeId,
        whens: &[NodeId],
        else_branch: Option<NodeId>,
    ) -> Infer<TypeId> {
        self.infer(ctx, cond)?;
        let subject = match self.ast.get(cond) {
            Node::Var { name } => Some(name.clone()),
            _ => None,
        };
        let mut tys = Vec::with_capacity(whens.len() + 1);
        let mut scopes = Vec::with_capacity(whens.len() + 1);
        for &when in whens {
            let Node::When { conds, body } = self.ast.get(when).clone() else {
                continue;
            };
            let mut classes = Vec::new();
            for &c in &conds {
                let ty = self.infer(ctx, c)?;
                if matches!(self.ast.get(c), Node::Ident { .. }) {
                    classes.extend(self.reg.instance_of(ty));
                }
            }
            let mut scope = ctx.scope.clone();
            if let Some(name) = &subject {
                if classes.len() == conds.len() && !classes.is_empty() {
                    if let Some(ty) = scope.get(name) {
                        let narrowed = self
                            .reg
                            .remove(ty, |reg, m| !classes.iter().any(|&c| reg.is_a(m, c)));
                        scope.replace(name, narrowed);
                    }
                }
            }
            let (ty, scope) = self.in_scope(ctx, scope, |e, ctx| e.infer_opt(ctx, body))?;
            self.record(when, ty);
            tys.push(ty);
            scopes.push(scope);
        }
        let base = ctx.scope.clone();
        let (ty, scope) = self.in_scope(ctx, base, |e, ctx| e.infer_opt(ctx, else_branch))?;
        tys.push(ty);
        scopes.push(scope);
        ctx.scope = Scope::merge(&mut self.reg, scopes);
        Ok(self.reg.union(&tys))
    }

    /// Loops type as Nil. Locals assigned in the body start out as Nil and
    /// the body is re-inferred until the locals it touches stop widening.
    fn infer_while(
        &mut self,
        ctx: &mut Ctx,
        id: NodeId,
        cond: NodeId,
        body: Option<NodeId>,
        run_once: bool,
    ) -> Infer<TypeId> {
        let nil = self.reg.core.nil;
        if run_once {
            ctx.loop_depth += 1;
            let first = self.infer_opt(ctx, body);
            ctx.loop_depth -= 1;
            first?;
            ctx.scope.terminated = false;
        }
        if let Some(body) = body {
            let mut assigned = AssignedVars(Vec::new());
            traverse(&self.ast, body, &mut assigned);
            for name in assigned.0 {
                if !ctx.scope.is_bound(&name) {
                    ctx.scope.replace(&name, nil);
                }
            }
        }

        let max = self.config.max_fixpoint_passes;
        for _ in 0..max {
            let before = ctx.scope.vars.clone();
            self.infer(ctx, cond)?;
            let (inside, _) = self.narrow(ctx, cond);
            ctx.loop_depth += 1;
            let pass = self.in_scope(ctx, inside, |e, ctx| e.infer_opt(ctx, body));
            ctx.loop_depth -= 1;
            let (_, after) = pass?;
            ctx.scope.absorb(&mut self.reg, &after, &[]);
            if ctx.scope.vars == before {
                return Ok(nil);
            }
        }
        Err(TypeError::NonConvergent {
            what: "a while loop".into(),
            passes: max,
            location: self.loc(id),
        })
    }

    // ── Constants ──────────────────────────────────────────────────────

    fn namespace_of(&self, ty: TypeId) -> Option<TypeId> {
        match self.reg.get(ty) {
            Type::Object(obj) => obj.namespace,
            Type::Module(module) => module.namespace,
            _ => None,
        }
    }

    /// Resolve a constant path, searching enclosing namespaces outward.
    pub fn resolve_path(
        &self,
        namespace: Option<TypeId>,
        names: &[String],
        global: bool,
        id: NodeId,
    ) -> Infer<TypeId> {
        let undefined = || TypeError::UndefinedConstant {
            name: names.join("::"),
            location: self.loc(id),
        };
        let (first, rest) = names.split_first().ok_or_else(undefined)?;
        let mut found = None;
        if !global {
            let mut ns = namespace;
            while let Some(current) = ns {
                if let Some(ty) = self.symbols.constant(Some(current), first) {
                    found = Some(ty);
                    break;
                }
                ns = self.namespace_of(current);
            }
        }
        let mut ty = found
            .or_else(|| self.symbols.constant(None, first))
            .ok_or_else(undefined)?;
        for name in rest {
            ty = self.symbols.constant(Some(ty), name).ok_or_else(undefined)?;
        }
        Ok(ty)
    }

    /// Resolve an `Ident` node to the type it names, without typing the node.
    pub fn resolve_ident(&self, namespace: Option<TypeId>, id: NodeId) -> Infer<TypeId> {
        match self.ast.get(id) {
            Node::Ident { names, global } => self.resolve_path(namespace, names, *global, id),
            other => Err(TypeError::Mismatch {
                expected: "a constant".into(),
                found: other.kind().to_string(),
                context: "type name".into(),
                location: self.loc(id),
            }),
        }
    }

    // ── Definitions ────────────────────────────────────────────────────

    fn infer_class(
        &mut self,
        ctx: &mut Ctx,
        name: &str,
        superclass: Option<NodeId>,
        type_vars: Option<Vec<String>>,
        body: Option<NodeId>,
    ) -> Infer<TypeId> {
        let superclass = match superclass {
            Some(node) => {
                let meta = self.infer(ctx, node)?;
                self.reg.instance_of(meta)
            }
            None => None,
        };
        let class = match self.symbols.constant(ctx.namespace, name) {
            Some(existing) => existing,
            None => {
                let superclass = superclass.unwrap_or(self.reg.core.object);
                let mut obj = ObjectType::new(name, ctx.namespace, Some(superclass));
                obj.type_vars = type_vars;
                let class = self.reg.add_object(obj);
                self.symbols.define_constant(ctx.namespace, name, class);
                debug!(class = name, "registered class");
                class
            }
        };
        let meta = self.reg.metaclass_of(class);
        let mut inner = self.frame(FrameKind::ClassBody, meta, class, Some(class));
        inner.spec = ctx.spec;
        self.infer_opt(&mut inner, body)?;
        Ok(self.reg.core.nil)
    }

    fn infer_module(&mut self, ctx: &mut Ctx, name: &str, body: Option<NodeId>) -> Infer<TypeId> {
        let module = match self.symbols.constant(ctx.namespace, name) {
            Some(existing) => existing,
            None => {
                let module = self.reg.add_module(ModuleType {
                    name: name.to_string(),
                    namespace: ctx.namespace,
                    libname: None,
                    is_lib: false,
                });
                self.symbols.define_constant(ctx.namespace, name, module);
                module
            }
        };
        let meta = self.reg.metaclass_of(module);
        let mut inner = self.frame(FrameKind::ClassBody, meta, module, Some(module));
        inner.spec = ctx.spec;
        self.infer_opt(&mut inner, body)?;
        Ok(self.reg.core.nil)
    }

    fn infer_include(&mut self, ctx: &mut Ctx, name: NodeId) -> Infer<()> {
        let meta = self.infer(ctx, name)?;
        let module = self.reg.instance_of(meta).unwrap_or(meta);
        if !matches!(self.reg.get(module), Type::Module(_)) {
            return Err(TypeError::Mismatch {
                expected: "a module".into(),
                found: self.reg.name(module),
                context: "include".into(),
                location: self.loc(name),
            });
        }
        if let Some(target) = self.reg.object_mut(ctx.def_target) {
            if !target.includes.contains(&module) {
                target.includes.push(module);
            }
        }
        Ok(())
    }

    fn register_def(&mut self, ctx: &mut Ctx, id: NodeId) -> Infer<DefId> {
        let Node::Def {
            receiver,
            name,
            args,
            body,
            yields,
        } = self.ast.get(id).clone()
        else {
            unreachable!("register_def called on a non-def node");
        };
        let owner = match receiver {
            Some(receiver) => self.infer(ctx, receiver)?,
            None => ctx.def_target,
        };
        let params = args
            .iter()
            .filter_map(|&arg| match self.ast.get(arg) {
                Node::Arg {
                    name,
                    default_value,
                    restriction,
                } => Some(Param {
                    name: name.clone(),
                    default_value: *default_value,
                    restriction: restriction.clone(),
                }),
                _ => None,
            })
            .collect();
        Ok(self.symbols.add_def(DefInfo {
            node: id,
            name,
            owner,
            params,
            body,
            yields,
            namespace: ctx.namespace,
        }))
    }

    // ── Externals ──────────────────────────────────────────────────────

    fn infer_lib(
        &mut self,
        ctx: &mut Ctx,
        name: &str,
        libname: Option<String>,
        body: Option<NodeId>,
    ) -> Infer<()> {
        let lib = match self.symbols.constant(ctx.namespace, name) {
            Some(existing) => existing,
            None => {
                let lib = self.reg.add_module(ModuleType {
                    name: name.to_string(),
                    namespace: ctx.namespace,
                    libname,
                    is_lib: true,
                });
                self.symbols.define_constant(ctx.namespace, name, lib);
                lib
            }
        };
        let nil = self.reg.core.nil;
        for stmt in self.statements(body) {
            match self.ast.get(stmt).clone() {
                Node::FunDef {
                    name,
                    real_name,
                    args,
                    return_type,
                    ptr,
                    varargs,
                } => {
                    let mut params = Vec::with_capacity(args.len());
                    for arg in args {
                        let ty = self.field_type(lib, arg)?;
                        self.record(arg, ty);
                        params.push(ty);
                    }
                    let return_type = match return_type {
                        Some(ident) => self.lib_type(lib, ident, ptr)?,
                        None => nil,
                    };
                    self.symbols.add_external(
                        lib,
                        ExternalFun {
                            name,
                            real_name,
                            params,
                            return_type,
                            varargs,
                        },
                    );
                }
                Node::TypeDef {
                    name,
                    type_ident,
                    ptr,
                } => {
                    let ty = self.lib_type(lib, type_ident, ptr)?;
                    self.symbols.define_constant(Some(lib), &name, ty);
                }
                Node::StructDef { name, fields } => {
                    let object = self.reg.core.object;
                    let st = match self.symbols.constant(Some(lib), &name) {
                        Some(existing) => existing,
                        None => {
                            let st = self.reg.add_object(ObjectType::new(&name, Some(lib), Some(object)));
                            self.symbols.define_constant(Some(lib), &name, st);
                            st
                        }
                    };
                    let mut names = Vec::with_capacity(fields.len());
                    for field in fields {
                        let ty = self.field_type(lib, field)?;
                        self.record(field, ty);
                        if let Node::FunDefArg { name, .. } = self.ast.get(field) {
                            let ivar = format!("@{}", name);
                            self.reg.add_ivar(st, &ivar, ty);
                            names.push(ivar);
                        }
                    }
                    self.reg.mark_initialized(st, names);
                }
                _ => {}
            }
            self.record(stmt, nil);
        }
        Ok(())
    }

    fn field_type(&mut self, lib: TypeId, arg: NodeId) -> Infer<TypeId> {
        match self.ast.get(arg).clone() {
            Node::FunDefArg {
                type_ident, ptr, ..
            } => self.lib_type(lib, type_ident, ptr),
            other => Err(TypeError::Mismatch {
                expected: "a typed field".into(),
                found: other.kind().to_string(),
                context: "lib declaration".into(),
                location: self.loc(arg),
            }),
        }
    }

    /// A type named inside a `lib`, wrapped in `ptr` levels of pointer.
    /// `Void` stands for Nil.
    fn lib_type(&mut self, lib: TypeId, ident: NodeId, ptr: u32) -> Infer<TypeId> {
        let is_void = matches!(
            self.ast.get(ident),
            Node::Ident { names, .. } if names.len() == 1 && names[0] == "Void"
        );
        let mut ty = if is_void {
            self.reg.core.nil
        } else {
            self.resolve_ident(Some(lib), ident)?
        };
        let meta = self.reg.metaclass_of(ty);
        self.record(ident, meta);
        for _ in 0..ptr {
            ty = self.reg.pointer_of(ty);
        }
        Ok(ty)
    }

    /// The statements of an optional body.
    pub fn statements(&self, body: Option<NodeId>) -> Vec<NodeId> {
        match body {
            Some(id) => match self.ast.get(id) {
                Node::Expressions { exps } => exps.clone(),
                _ => vec![id],
            },
            None => Vec::new(),
        }
    }

    // ── Specialization bookkeeping ─────────────────────────────────────

    pub fn note_read(&mut self, spec: Option<SpecId>, read: SlotRead) {
        let Some(spec) = spec else { return };
        let reads = &mut self.specs[spec.0 as usize].reads;
        if !reads.iter().any(|r| r.slot == read.slot) {
            reads.push(read);
        }
    }

    fn reset_unsettled(&mut self) {
        for spec in &mut self.specs {
            if spec.state != SpecState::Stable {
                spec.state = SpecState::Pending;
                spec.tentative_on = None;
            }
        }
    }
}
