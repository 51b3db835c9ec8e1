//! Node variants of the Garnet syntax tree.
//!
//! Every variant is listed in one closed enum. Child links are [`NodeId`]
//! handles into the owning [`Ast`](crate::Ast) arena, so a `Node` on its own
//! is a shallow value: comparing two `Node`s with `==` compares child ids, not
//! child structure. Use [`Ast::structurally_eq`](crate::Ast::structurally_eq)
//! for the recursive comparison.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to a node inside an [`Ast`](crate::Ast) arena.
///
/// Only meaningful for the arena that produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type restriction written on a def argument: `x : Int` or `x : self`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    /// `: self`, the receiver's own type.
    SelfType,
    /// `: Name`, an `Ident` node naming a type.
    Type(NodeId),
}

/// A syntax tree node.
///
/// Variants with optional bodies use `None` for an empty body, the same way
/// a parser collapses an empty expression list. A body holding a single
/// expression stores that expression directly rather than a one-element
/// `Expressions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// A sequence of expressions; its value is the last one.
    Expressions { exps: Vec<NodeId> },

    // ── Literals ───────────────────────────────────────────────────────
    NilLiteral,
    BoolLiteral { value: bool },
    IntLiteral { value: i64 },
    LongLiteral { value: i64 },
    FloatLiteral { value: f64 },
    DoubleLiteral { value: f64 },
    CharLiteral { value: char },
    StringLiteral { value: String },
    SymbolLiteral { value: String },
    RangeLiteral {
        from: NodeId,
        to: NodeId,
        exclusive: bool,
    },
    RegexpLiteral { value: String },
    ArrayLiteral { elements: Vec<NodeId> },
    /// Key/value pairs in source order.
    HashLiteral { entries: Vec<(NodeId, NodeId)> },

    // ── Definitions ────────────────────────────────────────────────────
    /// `class Name[T] < Super ... end`. `type_vars` is `Some` for generic
    /// classes, including `class Name[]` with no named variables.
    ClassDef {
        name: String,
        superclass: Option<NodeId>,
        type_vars: Option<Vec<String>>,
        body: Option<NodeId>,
    },
    ModuleDef { name: String, body: Option<NodeId> },
    /// `def [receiver.]name(args) body end`.
    Def {
        receiver: Option<NodeId>,
        name: String,
        args: Vec<NodeId>,
        body: Option<NodeId>,
        yields: bool,
    },
    /// A def argument.
    Arg {
        name: String,
        default_value: Option<NodeId>,
        restriction: Option<Restriction>,
    },

    // ── Names ──────────────────────────────────────────────────────────
    /// A local variable or block argument.
    Var { name: String },
    /// A global variable. The name keeps its `$` sigil.
    Global { name: String },
    /// An instance variable. The name keeps its `@` sigil.
    InstanceVar { name: String },
    /// A constant path: `Foo`, `C::Foo`, `::Foo`.
    Ident { names: Vec<String>, global: bool },

    // ── Control flow ───────────────────────────────────────────────────
    And { left: NodeId, right: NodeId },
    Or { left: NodeId, right: NodeId },
    /// Non short-circuiting `||`.
    SimpleOr { left: NodeId, right: NodeId },
    /// `[obj.]name(args) [block]`. Infix operators use the operator as name.
    Call {
        obj: Option<NodeId>,
        name: String,
        args: Vec<NodeId>,
        block: Option<NodeId>,
    },
    If {
        cond: NodeId,
        then_branch: Option<NodeId>,
        else_branch: Option<NodeId>,
    },
    Assign { target: NodeId, value: NodeId },
    MultiAssign {
        targets: Vec<NodeId>,
        values: Vec<NodeId>,
    },
    /// `while cond body end`, or `begin body end while cond` when `run_once`.
    While {
        cond: NodeId,
        body: Option<NodeId>,
        run_once: bool,
    },
    /// `do |args| body end`. Arguments are `Var` nodes.
    Block {
        args: Vec<NodeId>,
        body: Option<NodeId>,
    },
    Case {
        cond: NodeId,
        whens: Vec<NodeId>,
        else_branch: Option<NodeId>,
    },
    When {
        conds: Vec<NodeId>,
        body: Option<NodeId>,
    },
    Return { exps: Vec<NodeId> },
    Break { exps: Vec<NodeId> },
    Next { exps: Vec<NodeId> },
    Yield { exps: Vec<NodeId> },

    // ── Low level ──────────────────────────────────────────────────────
    /// `var.ptr`: address of a local or instance variable.
    PointerOf { var: NodeId },
    /// `obj.is_a?(Const)`.
    IsA { obj: NodeId, target: NodeId },
    /// `require "file"`.
    Require { string: NodeId },
    /// `lib Name("libname") ... end`.
    LibDef {
        name: String,
        libname: Option<String>,
        body: Option<NodeId>,
    },
    /// `fun name [= real_name](args[, ...]) [: Type***]`.
    FunDef {
        name: String,
        real_name: String,
        args: Vec<NodeId>,
        return_type: Option<NodeId>,
        ptr: u32,
        varargs: bool,
    },
    /// `name : [out] Type***` inside a `fun` or `struct`.
    FunDefArg {
        name: String,
        type_ident: NodeId,
        ptr: u32,
        out: bool,
    },
    /// `type Name : Type***` inside a `lib`.
    TypeDef {
        name: String,
        type_ident: NodeId,
        ptr: u32,
    },
    /// `struct Name fields end` inside a `lib`. Fields are `FunDefArg` nodes.
    StructDef { name: String, fields: Vec<NodeId> },
    /// `include Module` inside a class body.
    Include { name: NodeId },
}

/// Fieldless tag of a [`Node`] variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Expressions,
    NilLiteral,
    BoolLiteral,
    IntLiteral,
    LongLiteral,
    FloatLiteral,
    DoubleLiteral,
    CharLiteral,
    StringLiteral,
    SymbolLiteral,
    RangeLiteral,
    RegexpLiteral,
    ArrayLiteral,
    HashLiteral,
    ClassDef,
    ModuleDef,
    Def,
    Arg,
    Var,
    Global,
    InstanceVar,
    Ident,
    And,
    Or,
    SimpleOr,
    Call,
    If,
    Assign,
    MultiAssign,
    While,
    Block,
    Case,
    When,
    Return,
    Break,
    Next,
    Yield,
    PointerOf,
    IsA,
    Require,
    LibDef,
    FunDef,
    FunDefArg,
    TypeDef,
    StructDef,
    Include,
}

impl NodeKind {
    /// The snake_case name used in serialized trees and debug output.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Expressions => "expressions",
            NodeKind::NilLiteral => "nil_literal",
            NodeKind::BoolLiteral => "bool_literal",
            NodeKind::IntLiteral => "int_literal",
            NodeKind::LongLiteral => "long_literal",
            NodeKind::FloatLiteral => "float_literal",
            NodeKind::DoubleLiteral => "double_literal",
            NodeKind::CharLiteral => "char_literal",
            NodeKind::StringLiteral => "string_literal",
            NodeKind::SymbolLiteral => "symbol_literal",
            NodeKind::RangeLiteral => "range_literal",
            NodeKind::RegexpLiteral => "regexp_literal",
            NodeKind::ArrayLiteral => "array_literal",
            NodeKind::HashLiteral => "hash_literal",
            NodeKind::ClassDef => "class_def",
            NodeKind::ModuleDef => "module_def",
            NodeKind::Def => "def",
            NodeKind::Arg => "arg",
            NodeKind::Var => "var",
            NodeKind::Global => "global",
            NodeKind::InstanceVar => "instance_var",
            NodeKind::Ident => "ident",
            NodeKind::And => "and",
            NodeKind::Or => "or",
            NodeKind::SimpleOr => "simple_or",
            NodeKind::Call => "call",
            NodeKind::If => "if",
            NodeKind::Assign => "assign",
            NodeKind::MultiAssign => "multi_assign",
            NodeKind::While => "while",
            NodeKind::Block => "block",
            NodeKind::Case => "case",
            NodeKind::When => "when",
            NodeKind::Return => "return",
            NodeKind::Break => "break",
            NodeKind::Next => "next",
            NodeKind::Yield => "yield",
            NodeKind::PointerOf => "pointer_of",
            NodeKind::IsA => "is_a",
            NodeKind::Require => "require",
            NodeKind::LibDef => "lib_def",
            NodeKind::FunDef => "fun_def",
            NodeKind::FunDefArg => "fun_def_arg",
            NodeKind::TypeDef => "type_def",
            NodeKind::StructDef => "struct_def",
            NodeKind::Include => "include",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Expressions { .. } => NodeKind::Expressions,
            Node::NilLiteral => NodeKind::NilLiteral,
            Node::BoolLiteral { .. } => NodeKind::BoolLiteral,
            Node::IntLiteral { .. } => NodeKind::IntLiteral,
            Node::LongLiteral { .. } => NodeKind::LongLiteral,
            Node::FloatLiteral { .. } => NodeKind::FloatLiteral,
            Node::DoubleLiteral { .. } => NodeKind::DoubleLiteral,
            Node::CharLiteral { .. } => NodeKind::CharLiteral,
            Node::StringLiteral { .. } => NodeKind::StringLiteral,
            Node::SymbolLiteral { .. } => NodeKind::SymbolLiteral,
            Node::RangeLiteral { .. } => NodeKind::RangeLiteral,
            Node::RegexpLiteral { .. } => NodeKind::RegexpLiteral,
            Node::ArrayLiteral { .. } => NodeKind::ArrayLiteral,
            Node::HashLiteral { .. } => NodeKind::HashLiteral,
            Node::ClassDef { .. } => NodeKind::ClassDef,
            Node::ModuleDef { .. } => NodeKind::ModuleDef,
            Node::Def { .. } => NodeKind::Def,
            Node::Arg { .. } => NodeKind::Arg,
            Node::Var { .. } => NodeKind::Var,
            Node::Global { .. } => NodeKind::Global,
            Node::InstanceVar { .. } => NodeKind::InstanceVar,
            Node::Ident { .. } => NodeKind::Ident,
            Node::And { .. } => NodeKind::And,
            Node::Or { .. } => NodeKind::Or,
            Node::SimpleOr { .. } => NodeKind::SimpleOr,
            Node::Call { .. } => NodeKind::Call,
            Node::If { .. } => NodeKind::If,
            Node::Assign { .. } => NodeKind::Assign,
            Node::MultiAssign { .. } => NodeKind::MultiAssign,
            Node::While { .. } => NodeKind::While,
            Node::Block { .. } => NodeKind::Block,
            Node::Case { .. } => NodeKind::Case,
            Node::When { .. } => NodeKind::When,
            Node::Return { .. } => NodeKind::Return,
            Node::Break { .. } => NodeKind::Break,
            Node::Next { .. } => NodeKind::Next,
            Node::Yield { .. } => NodeKind::Yield,
            Node::PointerOf { .. } => NodeKind::PointerOf,
            Node::IsA { .. } => NodeKind::IsA,
            Node::Require { .. } => NodeKind::Require,
            Node::LibDef { .. } => NodeKind::LibDef,
            Node::FunDef { .. } => NodeKind::FunDef,
            Node::FunDefArg { .. } => NodeKind::FunDefArg,
            Node::TypeDef { .. } => NodeKind::TypeDef,
            Node::StructDef { .. } => NodeKind::StructDef,
            Node::Include { .. } => NodeKind::Include,
        }
    }

    /// Immediate children in surface-syntax order.
    ///
    /// For a call this is receiver, arguments, then block; for a hash literal
    /// each key precedes its value.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            Node::NilLiteral
            | Node::BoolLiteral { .. }
            | Node::IntLiteral { .. }
            | Node::LongLiteral { .. }
            | Node::FloatLiteral { .. }
            | Node::DoubleLiteral { .. }
            | Node::CharLiteral { .. }
            | Node::StringLiteral { .. }
            | Node::SymbolLiteral { .. }
            | Node::RegexpLiteral { .. }
            | Node::Var { .. }
            | Node::Global { .. }
            | Node::InstanceVar { .. }
            | Node::Ident { .. } => {}
            Node::Expressions { exps }
            | Node::Return { exps }
            | Node::Break { exps }
            | Node::Next { exps }
            | Node::Yield { exps } => out.extend(exps.iter().copied()),
            Node::ArrayLiteral { elements } => out.extend(elements.iter().copied()),
            Node::HashLiteral { entries } => {
                for &(key, value) in entries {
                    out.push(key);
                    out.push(value);
                }
            }
            Node::RangeLiteral { from, to, .. } => {
                out.push(*from);
                out.push(*to);
            }
            Node::ClassDef {
                superclass, body, ..
            } => {
                out.extend(*superclass);
                out.extend(*body);
            }
            Node::ModuleDef { body, .. } | Node::LibDef { body, .. } => out.extend(*body),
            Node::Def {
                receiver,
                args,
                body,
                ..
            } => {
                out.extend(*receiver);
                out.extend(args.iter().copied());
                out.extend(*body);
            }
            Node::Arg {
                default_value,
                restriction,
                ..
            } => {
                out.extend(*default_value);
                if let Some(Restriction::Type(ident)) = restriction {
                    out.push(*ident);
                }
            }
            Node::And { left, right }
            | Node::Or { left, right }
            | Node::SimpleOr { left, right } => {
                out.push(*left);
                out.push(*right);
            }
            Node::Call {
                obj, args, block, ..
            } => {
                out.extend(*obj);
                out.extend(args.iter().copied());
                out.extend(*block);
            }
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push(*cond);
                out.extend(*then_branch);
                out.extend(*else_branch);
            }
            Node::Assign { target, value } => {
                out.push(*target);
                out.push(*value);
            }
            Node::MultiAssign { targets, values } => {
                out.extend(targets.iter().copied());
                out.extend(values.iter().copied());
            }
            Node::While { cond, body, run_once } => {
                if *run_once {
                    out.extend(*body);
                    out.push(*cond);
                } else {
                    out.push(*cond);
                    out.extend(*body);
                }
            }
            Node::Block { args, body } => {
                out.extend(args.iter().copied());
                out.extend(*body);
            }
            Node::Case {
                cond,
                whens,
                else_branch,
            } => {
                out.push(*cond);
                out.extend(whens.iter().copied());
                out.extend(*else_branch);
            }
            Node::When { conds, body } => {
                out.extend(conds.iter().copied());
                out.extend(*body);
            }
            Node::PointerOf { var } => out.push(*var),
            Node::IsA { obj, target } => {
                out.push(*obj);
                out.push(*target);
            }
            Node::Require { string } => out.push(*string),
            Node::FunDef {
                args, return_type, ..
            } => {
                out.extend(args.iter().copied());
                out.extend(*return_type);
            }
            Node::FunDefArg { type_ident, .. } | Node::TypeDef { type_ident, .. } => {
                out.push(*type_ident)
            }
            Node::StructDef { fields, .. } => out.extend(fields.iter().copied()),
            Node::Include { name } => out.push(*name),
        }
        out
    }

    /// Rebuild this node with every child id passed through `f`.
    ///
    /// Children are mapped in field order.
    pub fn map_children(&self, f: &mut dyn FnMut(NodeId) -> NodeId) -> Node {
        fn many(ids: &[NodeId], f: &mut dyn FnMut(NodeId) -> NodeId) -> Vec<NodeId> {
            ids.iter().map(|&id| f(id)).collect()
        }
        match self {
            Node::NilLiteral
            | Node::BoolLiteral { .. }
            | Node::IntLiteral { .. }
            | Node::LongLiteral { .. }
            | Node::FloatLiteral { .. }
            | Node::DoubleLiteral { .. }
            | Node::CharLiteral { .. }
            | Node::StringLiteral { .. }
            | Node::SymbolLiteral { .. }
            | Node::RegexpLiteral { .. }
            | Node::Var { .. }
            | Node::Global { .. }
            | Node::InstanceVar { .. }
            | Node::Ident { .. } => self.clone(),
            Node::Expressions { exps } => Node::Expressions {
                exps: many(exps, f),
            },
            Node::Return { exps } => Node::Return {
                exps: many(exps, f),
            },
            Node::Break { exps } => Node::Break {
                exps: many(exps, f),
            },
            Node::Next { exps } => Node::Next {
                exps: many(exps, f),
            },
            Node::Yield { exps } => Node::Yield {
                exps: many(exps, f),
            },
            Node::ArrayLiteral { elements } => Node::ArrayLiteral {
                elements: many(elements, f),
            },
            Node::HashLiteral { entries } => Node::HashLiteral {
                entries: entries.iter().map(|&(k, v)| (f(k), f(v))).collect(),
            },
            Node::RangeLiteral {
                from,
                to,
                exclusive,
            } => Node::RangeLiteral {
                from: f(*from),
                to: f(*to),
                exclusive: *exclusive,
            },
            Node::ClassDef {
                name,
                superclass,
                type_vars,
                body,
            } => Node::ClassDef {
                name: name.clone(),
                superclass: superclass.map(&mut *f),
                type_vars: type_vars.clone(),
                body: body.map(&mut *f),
            },
            Node::ModuleDef { name, body } => Node::ModuleDef {
                name: name.clone(),
                body: body.map(&mut *f),
            },
            Node::Def {
                receiver,
                name,
                args,
                body,
                yields,
            } => Node::Def {
                receiver: receiver.map(&mut *f),
                name: name.clone(),
                args: many(args, f),
                body: body.map(&mut *f),
                yields: *yields,
            },
            Node::Arg {
                name,
                default_value,
                restriction,
            } => Node::Arg {
                name: name.clone(),
                default_value: default_value.map(&mut *f),
                restriction: match restriction {
                    Some(Restriction::Type(ident)) => Some(Restriction::Type(f(*ident))),
                    other => other.clone(),
                },
            },
            Node::And { left, right } => Node::And {
                left: f(*left),
                right: f(*right),
            },
            Node::Or { left, right } => Node::Or {
                left: f(*left),
                right: f(*right),
            },
            Node::SimpleOr { left, right } => Node::SimpleOr {
                left: f(*left),
                right: f(*right),
            },
            Node::Call {
                obj,
                name,
                args,
                block,
            } => Node::Call {
                obj: obj.map(&mut *f),
                name: name.clone(),
                args: many(args, f),
                block: block.map(&mut *f),
            },
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => Node::If {
                cond: f(*cond),
                then_branch: then_branch.map(&mut *f),
                else_branch: else_branch.map(&mut *f),
            },
            Node::Assign { target, value } => Node::Assign {
                target: f(*target),
                value: f(*value),
            },
            Node::MultiAssign { targets, values } => Node::MultiAssign {
                targets: many(targets, f),
                values: many(values, f),
            },
            Node::While {
                cond,
                body,
                run_once,
            } => Node::While {
                cond: f(*cond),
                body: body.map(&mut *f),
                run_once: *run_once,
            },
            Node::Block { args, body } => Node::Block {
                args: many(args, f),
                body: body.map(&mut *f),
            },
            Node::Case {
                cond,
                whens,
                else_branch,
            } => Node::Case {
                cond: f(*cond),
                whens: many(whens, f),
                else_branch: else_branch.map(&mut *f),
            },
            Node::When { conds, body } => Node::When {
                conds: many(conds, f),
                body: body.map(&mut *f),
            },
            Node::PointerOf { var } => Node::PointerOf { var: f(*var) },
            Node::IsA { obj, target } => Node::IsA {
                obj: f(*obj),
                target: f(*target),
            },
            Node::Require { string } => Node::Require { string: f(*string) },
            Node::LibDef {
                name,
                libname,
                body,
            } => Node::LibDef {
                name: name.clone(),
                libname: libname.clone(),
                body: body.map(&mut *f),
            },
            Node::FunDef {
                name,
                real_name,
                args,
                return_type,
                ptr,
                varargs,
            } => Node::FunDef {
                name: name.clone(),
                real_name: real_name.clone(),
                args: many(args, f),
                return_type: return_type.map(&mut *f),
                ptr: *ptr,
                varargs: *varargs,
            },
            Node::FunDefArg {
                name,
                type_ident,
                ptr,
                out,
            } => Node::FunDefArg {
                name: name.clone(),
                type_ident: f(*type_ident),
                ptr: *ptr,
                out: *out,
            },
            Node::TypeDef {
                name,
                type_ident,
                ptr,
            } => Node::TypeDef {
                name: name.clone(),
                type_ident: f(*type_ident),
                ptr: *ptr,
            },
            Node::StructDef { name, fields } => Node::StructDef {
                name: name.clone(),
                fields: many(fields, f),
            },
            Node::Include { name } => Node::Include { name: f(*name) },
        }
    }
}
