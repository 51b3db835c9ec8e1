//! Garnet type checker: flow-sensitive inference with per-signature
//! specialization of defs.
//!
//! Garnet has no type annotations beyond optional argument restrictions.
//! Every def is inferred separately for each combination of receiver and
//! argument types it is called with, local variables accumulate union types
//! along control flow, and instance-variable tables grow as assignments are
//! discovered anywhere in the program.
//!
//! # Architecture
//!
//! - [`ty`]: Type representation and the [`TypeRegistry`](ty::TypeRegistry)
//! - [`env`]: Local scopes and branch merging
//! - [`symbols`]: Defs, constants, externals and globals
//! - [`builtins`]: Built-in methods of the core types
//! - `infer`: Statement and expression typing, the program pass loop
//! - `calls`: Call dispatch, overloads, allocation and blocks
//! - `fixpoint`: Specialization memo and the recursion fixpoint
//! - `super_dispatch`: `super` resolution along the ancestor chain
//! - [`error`] and [`diagnostics`]: Type errors and their rendering

pub mod builtins;
mod calls;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
mod fixpoint;
mod infer;
mod super_dispatch;
pub mod symbols;
pub mod ty;

use std::collections::BTreeMap;

use garnet_ast::{Ast, NodeId, ParsedProgram};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info_span};

pub use crate::config::InferConfig;
pub use crate::diagnostics::{render_diagnostic, DiagnosticOptions};
pub use crate::error::{ErrorKind, TypeError};
pub use crate::fixpoint::{SpecId, SpecState, Specialization};
use crate::infer::Engine;
use crate::ty::{TypeId, TypeRegistry};

/// The result of type checking a Garnet program.
///
/// `ast` is the input tree followed by the cloned bodies of every
/// specialization; all node ids in the result refer to it.
pub struct TypeckResult {
    pub ast: Ast,
    pub root: NodeId,
    /// Inferred type of every node visited.
    pub types: FxHashMap<NodeId, TypeId>,
    /// Specializations each call node was bound to.
    pub call_targets: FxHashMap<NodeId, Vec<SpecId>>,
    pub specializations: Vec<Specialization>,
    pub registry: TypeRegistry,
    /// Type errors found during checking. Inference stops at the first.
    pub errors: Vec<TypeError>,
    /// Type of the program's last expression. `None` if checking failed.
    pub result_type: Option<TypeId>,
}

/// Type-check a program with the default limits.
pub fn check(program: &ParsedProgram) -> TypeckResult {
    check_with(program, &InferConfig::default())
}

pub fn check_with(program: &ParsedProgram, config: &InferConfig) -> TypeckResult {
    let span = info_span!("typeck", nodes = program.ast.len());
    let _enter = span.enter();

    let mut engine = Engine::new(program.ast.clone(), config);
    let outcome = engine.run(program.root);
    // `NoReturn` never leaves the engine: code that does not produce a
    // value is reported as nil.
    let (bottom, nil) = (engine.reg.core.no_return, engine.reg.core.nil);
    let settle = |ty: TypeId| if ty == bottom { nil } else { ty };
    for ty in engine.types.values_mut() {
        *ty = settle(*ty);
    }
    for spec in &mut engine.specs {
        spec.return_type = spec.return_type.map(settle);
    }
    let (result_type, errors) = match outcome {
        Ok(ty) => (Some(settle(ty)), Vec::new()),
        Err(err) => {
            debug!(%err, "type checking failed");
            (None, vec![err])
        }
    };
    TypeckResult {
        ast: engine.ast,
        root: program.root,
        types: engine.types,
        call_targets: engine.call_targets,
        specializations: engine.specs,
        registry: engine.reg,
        errors,
        result_type,
    }
}

impl TypeckResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn type_of(&self, id: NodeId) -> Option<TypeId> {
        self.types.get(&id).copied()
    }

    pub fn type_name(&self, id: NodeId) -> Option<String> {
        self.type_of(id).map(|ty| self.registry.name(ty))
    }

    /// Display name of the program's type, `None` on error.
    pub fn result_name(&self) -> Option<String> {
        self.result_type.map(|ty| self.registry.name(ty))
    }

    /// Specializations bound to call node `call`, in resolution order.
    pub fn targets(&self, call: NodeId) -> &[SpecId] {
        self.call_targets
            .get(&call)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn spec(&self, id: SpecId) -> &Specialization {
        &self.specializations[id.0 as usize]
    }

    /// Render every error against `source`, one diagnostic after another.
    pub fn render_errors(&self, source: &str, filename: &str, options: &DiagnosticOptions) -> String {
        self.errors
            .iter()
            .map(|err| render_diagnostic(err, source, filename, options))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A serializable view with type names resolved.
    pub fn summary(&self) -> Summary {
        let nodes = self
            .types
            .iter()
            .map(|(&id, &ty)| {
                let node = NodeSummary {
                    kind: self.ast.get(id).kind().name(),
                    ty: self.registry.name(ty),
                };
                (id.0, node)
            })
            .collect();
        let specializations = self
            .specializations
            .iter()
            .map(|spec| SpecSummary {
                name: spec.name.clone(),
                self_type: self.registry.name(spec.self_type),
                args: spec.arg_types.iter().map(|&t| self.registry.name(t)).collect(),
                return_type: spec.return_type.map(|t| self.registry.name(t)),
                state: spec.state,
                passes: spec.passes,
            })
            .collect();
        Summary {
            result_type: self.result_name(),
            errors: self.errors.clone(),
            nodes,
            specializations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub result_type: Option<String>,
    pub errors: Vec<TypeError>,
    pub nodes: BTreeMap<u32, NodeSummary>,
    pub specializations: Vec<SpecSummary>,
}

#[derive(Debug, Serialize)]
pub struct NodeSummary {
    pub kind: &'static str,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Serialize)]
pub struct SpecSummary {
    pub name: String,
    pub self_type: String,
    pub args: Vec<String>,
    pub return_type: Option<String>,
    pub state: SpecState,
    pub passes: u32,
}
