//! Programmatic tree construction.
//!
//! The checker never parses source text, so tests and tools build trees
//! directly. [`AstBuilder`] keeps the bookkeeping out of the way: body lists
//! collapse the way a parser collapses them, constant paths are split on
//! `::`, and a def's `yields` flag is derived from its body.

use garnet_common::Location;

use crate::node::{Node, NodeId, Restriction};
use crate::tree::{Ast, ParsedProgram};
use crate::visit::{traverse, Visitor};

#[derive(Default)]
pub struct AstBuilder {
    ast: Ast,
}

struct FindYield(bool);

impl Visitor for FindYield {
    fn enter(&mut self, _ast: &Ast, _id: NodeId, node: &Node) -> bool {
        match node {
            Node::Yield { .. } => {
                self.0 = true;
                false
            }
            Node::Def { .. } | Node::ClassDef { .. } | Node::ModuleDef { .. } => false,
            _ => !self.0,
        }
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        self.ast.alloc(node)
    }

    /// Attach a source position to an already built node.
    pub fn at(&mut self, id: NodeId, line: u32, column: u32) -> NodeId {
        self.ast.set_location(id, Location::new(line, column));
        id
    }

    /// Wrap the top-level statements and hand back the program.
    pub fn program(mut self, stmts: Vec<NodeId>) -> ParsedProgram {
        let root = self.push(Node::Expressions { exps: stmts });
        ParsedProgram::new(self.ast, root)
    }

    pub fn finish(self, root: NodeId) -> ParsedProgram {
        ParsedProgram::new(self.ast, root)
    }

    // ── Sequences ──────────────────────────────────────────────────────

    /// Always an `Expressions` node, even for zero or one entries.
    pub fn exprs(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.push(Node::Expressions { exps })
    }

    /// Parser-style body: nothing for an empty list, the expression itself
    /// for a single entry, an `Expressions` node otherwise.
    pub fn body(&mut self, mut exps: Vec<NodeId>) -> Option<NodeId> {
        match exps.len() {
            0 => None,
            1 => exps.pop(),
            _ => Some(self.exprs(exps)),
        }
    }

    // ── Literals ───────────────────────────────────────────────────────

    pub fn nil(&mut self) -> NodeId {
        self.push(Node::NilLiteral)
    }

    pub fn bool(&mut self, value: bool) -> NodeId {
        self.push(Node::BoolLiteral { value })
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.push(Node::IntLiteral { value })
    }

    pub fn long(&mut self, value: i64) -> NodeId {
        self.push(Node::LongLiteral { value })
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.push(Node::FloatLiteral { value })
    }

    pub fn double(&mut self, value: f64) -> NodeId {
        self.push(Node::DoubleLiteral { value })
    }

    pub fn char(&mut self, value: char) -> NodeId {
        self.push(Node::CharLiteral { value })
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.push(Node::StringLiteral {
            value: value.to_string(),
        })
    }

    pub fn symbol(&mut self, value: &str) -> NodeId {
        self.push(Node::SymbolLiteral {
            value: value.to_string(),
        })
    }

    pub fn regexp(&mut self, value: &str) -> NodeId {
        self.push(Node::RegexpLiteral {
            value: value.to_string(),
        })
    }

    pub fn range(&mut self, from: NodeId, to: NodeId, exclusive: bool) -> NodeId {
        self.push(Node::RangeLiteral {
            from,
            to,
            exclusive,
        })
    }

    pub fn array(&mut self, elements: Vec<NodeId>) -> NodeId {
        self.push(Node::ArrayLiteral { elements })
    }

    pub fn hash(&mut self, entries: Vec<(NodeId, NodeId)>) -> NodeId {
        self.push(Node::HashLiteral { entries })
    }

    // ── Names ──────────────────────────────────────────────────────────

    pub fn var(&mut self, name: &str) -> NodeId {
        self.push(Node::Var {
            name: name.to_string(),
        })
    }

    pub fn global(&mut self, name: &str) -> NodeId {
        self.push(Node::Global {
            name: name.to_string(),
        })
    }

    pub fn ivar(&mut self, name: &str) -> NodeId {
        self.push(Node::InstanceVar {
            name: name.to_string(),
        })
    }

    /// A constant path. `"A::B"` splits into segments, a leading `::` marks
    /// it global.
    pub fn ident(&mut self, path: &str) -> NodeId {
        let global = path.starts_with("::");
        let names = path
            .trim_start_matches("::")
            .split("::")
            .map(str::to_string)
            .collect();
        self.push(Node::Ident { names, global })
    }

    // ── Assignment ─────────────────────────────────────────────────────

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.push(Node::Assign { target, value })
    }

    /// `name = value` for a local variable.
    pub fn set(&mut self, name: &str, value: NodeId) -> NodeId {
        let target = self.var(name);
        self.assign(target, value)
    }

    /// `@name = value`; `name` includes the sigil.
    pub fn set_ivar(&mut self, name: &str, value: NodeId) -> NodeId {
        let target = self.ivar(name);
        self.assign(target, value)
    }

    pub fn multi_assign(&mut self, targets: Vec<NodeId>, values: Vec<NodeId>) -> NodeId {
        self.push(Node::MultiAssign { targets, values })
    }

    // ── Calls ──────────────────────────────────────────────────────────

    /// Receiverless call: `name(args)`.
    pub fn call(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        self.push(Node::Call {
            obj: None,
            name: name.to_string(),
            args,
            block: None,
        })
    }

    pub fn call_on(&mut self, obj: NodeId, name: &str, args: Vec<NodeId>) -> NodeId {
        self.push(Node::Call {
            obj: Some(obj),
            name: name.to_string(),
            args,
            block: None,
        })
    }

    pub fn call_with_block(
        &mut self,
        obj: Option<NodeId>,
        name: &str,
        args: Vec<NodeId>,
        block: NodeId,
    ) -> NodeId {
        self.push(Node::Call {
            obj,
            name: name.to_string(),
            args,
            block: Some(block),
        })
    }

    /// Infix operator: `left op right`.
    pub fn op(&mut self, left: NodeId, op: &str, right: NodeId) -> NodeId {
        self.call_on(left, op, vec![right])
    }

    /// `Const.new(args)`.
    pub fn new_object(&mut self, class: &str, args: Vec<NodeId>) -> NodeId {
        let ident = self.ident(class);
        self.call_on(ident, "new", args)
    }

    /// `super` with or without explicit arguments.
    pub fn super_call(&mut self, args: Vec<NodeId>) -> NodeId {
        self.call("super", args)
    }

    pub fn block(&mut self, args: &[&str], body: Vec<NodeId>) -> NodeId {
        let args: Vec<NodeId> = args.iter().map(|a| self.var(a)).collect();
        let body = self.body(body);
        self.push(Node::Block { args, body })
    }

    // ── Definitions ────────────────────────────────────────────────────

    pub fn arg(&mut self, name: &str) -> NodeId {
        self.push(Node::Arg {
            name: name.to_string(),
            default_value: None,
            restriction: None,
        })
    }

    pub fn arg_default(&mut self, name: &str, default_value: NodeId) -> NodeId {
        self.push(Node::Arg {
            name: name.to_string(),
            default_value: Some(default_value),
            restriction: None,
        })
    }

    /// `name : Type`.
    pub fn arg_typed(&mut self, name: &str, type_name: &str) -> NodeId {
        let ident = self.ident(type_name);
        self.push(Node::Arg {
            name: name.to_string(),
            default_value: None,
            restriction: Some(Restriction::Type(ident)),
        })
    }

    /// `name : self`.
    pub fn arg_self(&mut self, name: &str) -> NodeId {
        self.push(Node::Arg {
            name: name.to_string(),
            default_value: None,
            restriction: Some(Restriction::SelfType),
        })
    }

    pub fn def(&mut self, name: &str, args: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        self.def_with_receiver(None, name, args, body)
    }

    /// `def self.name` or `def Const.name`.
    pub fn def_on(
        &mut self,
        receiver: &str,
        name: &str,
        args: Vec<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let receiver = if receiver == "self" {
            self.var("self")
        } else {
            self.ident(receiver)
        };
        self.def_with_receiver(Some(receiver), name, args, body)
    }

    fn def_with_receiver(
        &mut self,
        receiver: Option<NodeId>,
        name: &str,
        args: Vec<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let body = self.body(body);
        let yields = body.is_some_and(|b| {
            let mut finder = FindYield(false);
            traverse(&self.ast, b, &mut finder);
            finder.0
        });
        self.push(Node::Def {
            receiver,
            name: name.to_string(),
            args,
            body,
            yields,
        })
    }

    pub fn class(&mut self, name: &str, superclass: Option<&str>, body: Vec<NodeId>) -> NodeId {
        self.class_def(name, superclass, None, body)
    }

    pub fn generic_class(
        &mut self,
        name: &str,
        type_vars: &[&str],
        superclass: Option<&str>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let vars: Vec<String> = type_vars.iter().map(|v| v.to_string()).collect();
        self.class_def(name, superclass, Some(vars), body)
    }

    fn class_def(
        &mut self,
        name: &str,
        superclass: Option<&str>,
        type_vars: Option<Vec<String>>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let superclass = superclass.map(|s| self.ident(s));
        let body = self.body(body);
        self.push(Node::ClassDef {
            name: name.to_string(),
            superclass,
            type_vars,
            body,
        })
    }

    pub fn module(&mut self, name: &str, body: Vec<NodeId>) -> NodeId {
        let body = self.body(body);
        self.push(Node::ModuleDef {
            name: name.to_string(),
            body,
        })
    }

    pub fn include(&mut self, module: &str) -> NodeId {
        let name = self.ident(module);
        self.push(Node::Include { name })
    }

    // ── Control flow ───────────────────────────────────────────────────

    pub fn if_else(&mut self, cond: NodeId, then: Vec<NodeId>, else_: Vec<NodeId>) -> NodeId {
        let then_branch = self.body(then);
        let else_branch = self.body(else_);
        self.push(Node::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn and(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.push(Node::And { left, right })
    }

    pub fn or(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.push(Node::Or { left, right })
    }

    pub fn simple_or(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.push(Node::SimpleOr { left, right })
    }

    pub fn while_loop(&mut self, cond: NodeId, body: Vec<NodeId>) -> NodeId {
        let body = self.body(body);
        self.push(Node::While {
            cond,
            body,
            run_once: false,
        })
    }

    /// `begin body end while cond`.
    pub fn do_while(&mut self, body: Vec<NodeId>, cond: NodeId) -> NodeId {
        let body = self.body(body);
        self.push(Node::While {
            cond,
            body,
            run_once: true,
        })
    }

    pub fn case(&mut self, cond: NodeId, whens: Vec<NodeId>, else_: Vec<NodeId>) -> NodeId {
        let else_branch = self.body(else_);
        self.push(Node::Case {
            cond,
            whens,
            else_branch,
        })
    }

    pub fn when(&mut self, conds: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        let body = self.body(body);
        self.push(Node::When { conds, body })
    }

    pub fn ret(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.push(Node::Return { exps })
    }

    pub fn brk(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.push(Node::Break { exps })
    }

    pub fn next(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.push(Node::Next { exps })
    }

    pub fn yield_(&mut self, exps: Vec<NodeId>) -> NodeId {
        self.push(Node::Yield { exps })
    }

    // ── Low level ──────────────────────────────────────────────────────

    pub fn pointer_of(&mut self, var: NodeId) -> NodeId {
        self.push(Node::PointerOf { var })
    }

    pub fn is_a(&mut self, obj: NodeId, type_name: &str) -> NodeId {
        let target = self.ident(type_name);
        self.push(Node::IsA { obj, target })
    }

    pub fn require(&mut self, file: &str) -> NodeId {
        let string = self.string(file);
        self.push(Node::Require { string })
    }

    pub fn lib(&mut self, name: &str, libname: Option<&str>, body: Vec<NodeId>) -> NodeId {
        let body = self.body(body);
        self.push(Node::LibDef {
            name: name.to_string(),
            libname: libname.map(str::to_string),
            body,
        })
    }

    /// `fun name(args) : Type*`. The return type is a name plus pointer depth.
    pub fn fun(
        &mut self,
        name: &str,
        args: Vec<NodeId>,
        return_type: Option<(&str, u32)>,
    ) -> NodeId {
        let (return_type, ptr) = match return_type {
            Some((type_name, ptr)) => (Some(self.ident(type_name)), ptr),
            None => (None, 0),
        };
        self.push(Node::FunDef {
            name: name.to_string(),
            real_name: name.to_string(),
            args,
            return_type,
            ptr,
            varargs: false,
        })
    }

    pub fn fun_arg(&mut self, name: &str, type_name: &str, ptr: u32) -> NodeId {
        let type_ident = self.ident(type_name);
        self.push(Node::FunDefArg {
            name: name.to_string(),
            type_ident,
            ptr,
            out: false,
        })
    }

    pub fn type_def(&mut self, name: &str, type_name: &str, ptr: u32) -> NodeId {
        let type_ident = self.ident(type_name);
        self.push(Node::TypeDef {
            name: name.to_string(),
            type_ident,
            ptr,
        })
    }

    pub fn struct_def(&mut self, name: &str, fields: Vec<NodeId>) -> NodeId {
        self.push(Node::StructDef {
            name: name.to_string(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_collapses_like_a_parser() {
        let mut b = AstBuilder::new();
        assert_eq!(b.body(vec![]), None);
        let one = b.int(1);
        assert_eq!(b.body(vec![one]), Some(one));
        let two = b.int(2);
        let both = b.body(vec![one, two]).unwrap();
        assert_eq!(b.ast().get(both), &Node::Expressions { exps: vec![one, two] });
    }

    #[test]
    fn ident_splits_paths() {
        let mut b = AstBuilder::new();
        let id = b.ident("::A::B");
        assert_eq!(
            b.ast().get(id),
            &Node::Ident {
                names: vec!["A".into(), "B".into()],
                global: true
            }
        );
    }

    #[test]
    fn def_detects_yield_outside_nested_defs() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let y = b.yield_(vec![one]);
        let yielding = b.def("each", vec![], vec![y]);

        let inner_yield = b.yield_(vec![]);
        let inner = b.def("inner", vec![], vec![inner_yield]);
        let outer = b.def("outer", vec![], vec![inner]);

        let ast = b.ast();
        assert!(matches!(ast.get(yielding), Node::Def { yields: true, .. }));
        assert!(matches!(ast.get(outer), Node::Def { yields: false, .. }));
    }

    #[test]
    fn program_wraps_statements() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let program = b.program(vec![one]);
        assert_eq!(program.ast.parent(one), Some(program.root));
        assert!(program.prepare().is_ok());
    }
}
