//! Enter/leave traversal over an [`Ast`].
//!
//! Implement [`Visitor`], override the hooks you need, and hand it to
//! [`traverse`]. Children are walked in surface-syntax order, the same order
//! [`Node::children`] returns them.

use crate::node::{Node, NodeId};
use crate::tree::Ast;

pub trait Visitor {
    /// Called before a node's children. Return `false` to skip them.
    fn enter(&mut self, _ast: &Ast, _id: NodeId, _node: &Node) -> bool {
        true
    }

    /// Called after a node's children, or right after `enter` returned `false`.
    fn leave(&mut self, _ast: &Ast, _id: NodeId, _node: &Node) {}
}

pub fn traverse<V: Visitor + ?Sized>(ast: &Ast, id: NodeId, visitor: &mut V) {
    let node = ast.get(id);
    if visitor.enter(ast, id, node) {
        for child in node.children() {
            traverse(ast, child, visitor);
        }
    }
    visitor.leave(ast, id, node);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Trace(Vec<String>);

    impl Visitor for Trace {
        fn enter(&mut self, _ast: &Ast, _id: NodeId, node: &Node) -> bool {
            self.0.push(format!("+{}", node.kind()));
            !matches!(node, Node::Def { .. })
        }

        fn leave(&mut self, _ast: &Ast, _id: NodeId, node: &Node) {
            self.0.push(format!("-{}", node.kind()));
        }
    }

    #[test]
    fn enter_and_leave_in_surface_order() {
        let mut ast = Ast::new();
        let recv = ast.alloc(Node::Var { name: "a".into() });
        let arg = ast.alloc(Node::IntLiteral { value: 1 });
        let call = ast.alloc(Node::Call {
            obj: Some(recv),
            name: "+".into(),
            args: vec![arg],
            block: None,
        });
        let mut trace = Trace(Vec::new());
        traverse(&ast, call, &mut trace);
        assert_eq!(
            trace.0,
            vec!["+call", "+var", "-var", "+int_literal", "-int_literal", "-call"]
        );
    }

    #[test]
    fn returning_false_skips_children() {
        let mut ast = Ast::new();
        let body = ast.alloc(Node::NilLiteral);
        let def = ast.alloc(Node::Def {
            receiver: None,
            name: "foo".into(),
            args: vec![],
            body: Some(body),
            yields: false,
        });
        let mut trace = Trace(Vec::new());
        traverse(&ast, def, &mut trace);
        assert_eq!(trace.0, vec!["+def", "-def"]);
    }
}
