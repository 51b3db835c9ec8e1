//! Garnet syntax tree model.
//!
//! The tree is produced by an external parser and handed to the type checker.
//! Nodes live in an [`Ast`] arena and refer to their children through
//! [`NodeId`] handles; each node is owned by exactly one parent slot. The
//! parent back-reference is a plain id resolved through the arena and is only
//! meant for scope lookups.
//!
//! # Architecture
//!
//! - [`node`]: the closed [`Node`] enum, its fieldless [`NodeKind`] tag, and
//!   per-variant child enumeration
//! - [`tree`]: the [`Ast`] arena, parent links, deep copy, structural equality
//! - [`visit`]: enter/leave traversal in surface-syntax order
//! - [`build`]: helpers for constructing trees (tests and tooling)

pub mod build;
pub mod node;
pub mod tree;
pub mod visit;

pub use build::AstBuilder;
pub use node::{Node, NodeId, NodeKind, Restriction};
pub use tree::{Ast, NodeData, ParsedProgram, TreeError};
pub use visit::{traverse, Visitor};
