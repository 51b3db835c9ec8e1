//! The syntax tree arena.

use std::fmt;

use garnet_common::Location;
use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeId};

/// One arena slot: the node, where it came from, and who owns it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeData {
    pub node: Node,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Owning node. Derived from child links, never read from input.
    #[serde(skip)]
    pub parent: Option<NodeId>,
}

/// Arena holding every node of one program, plus any copies made later.
///
/// Ids are never reused, so a `NodeId` stays valid for the lifetime of the
/// arena even after the tree is extended with cloned subtrees.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<NodeData>,
}

/// A malformed tree handed in from outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// A child link points past the end of the arena.
    DanglingChild { parent: NodeId, child: NodeId },
    /// A node is claimed by more than one parent slot.
    SharedChild { child: NodeId },
    /// The root id is out of range.
    MissingRoot { root: NodeId },
    /// The root is a child of another node, which puts it on a cycle or
    /// under a second tree.
    OwnedRoot { root: NodeId, parent: NodeId },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::DanglingChild { parent, child } => {
                write!(f, "node {} refers to missing child {}", parent, child)
            }
            TreeError::SharedChild { child } => {
                write!(f, "node {} has more than one parent", child)
            }
            TreeError::MissingRoot { root } => write!(f, "root node {} does not exist", root),
            TreeError::OwnedRoot { root, parent } => {
                write!(f, "root node {} is a child of node {}", root, parent)
            }
        }
    }
}

impl std::error::Error for TreeError {}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node and claim its children.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.alloc_at(node, None)
    }

    pub fn alloc_at(&mut self, node: Node, location: Option<Location>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for child in node.children() {
            if let Some(data) = self.nodes.get_mut(child.index()) {
                data.parent = Some(id);
            }
        }
        self.nodes.push(NodeData {
            node,
            location,
            parent: None,
        });
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()].node
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn location(&self, id: NodeId) -> Option<&Location> {
        self.nodes[id.index()].location.as_ref()
    }

    pub fn set_location(&mut self, id: NodeId, location: Location) {
        self.nodes[id.index()].location = Some(location);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Walk parent links upward, starting with the parent of `id`.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Recompute every parent link from child links.
    ///
    /// Needed after deserialization, where parents are not part of the input.
    pub fn link_parents(&mut self) {
        for data in &mut self.nodes {
            data.parent = None;
        }
        for index in 0..self.nodes.len() {
            let parent = NodeId(index as u32);
            for child in self.nodes[index].node.children() {
                if let Some(data) = self.nodes.get_mut(child.index()) {
                    data.parent = Some(parent);
                }
            }
        }
    }

    /// Check that every child link is in range and owned exactly once.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut owned = vec![false; self.nodes.len()];
        for parent in self.ids() {
            for child in self.get(parent).children() {
                let slot = owned
                    .get_mut(child.index())
                    .ok_or(TreeError::DanglingChild { parent, child })?;
                if *slot {
                    return Err(TreeError::SharedChild { child });
                }
                *slot = true;
            }
        }
        Ok(())
    }

    /// Copy the subtree at `id` into fresh slots of this arena.
    ///
    /// The copy keeps locations, has no parent, and shares nothing with the
    /// original: mutating one never affects the other.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let node = self.get(id).clone();
        let location = self.nodes[id.index()].location.clone();
        let copied = node.map_children(&mut |child| self.deep_clone(child));
        self.alloc_at(copied, location)
    }

    /// Structural equality of the subtree at `a` here and `b` in `other`.
    ///
    /// Same variant, same scalar fields, and pairwise equal children.
    /// Locations and parent links are ignored.
    pub fn structurally_eq(&self, a: NodeId, other: &Ast, b: NodeId) -> bool {
        let left = self.get(a);
        let right = other.get(b);
        if left.kind() != right.kind() {
            return false;
        }
        let erase = |node: &Node| node.map_children(&mut |_| NodeId(0));
        if erase(left) != erase(right) {
            return false;
        }
        let left_children = left.children();
        let right_children = right.children();
        left_children.len() == right_children.len()
            && left_children
                .iter()
                .zip(&right_children)
                .all(|(&l, &r)| self.structurally_eq(l, other, r))
    }
}

impl std::ops::Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.get(id)
    }
}

/// A whole program as delivered by the front end: arena plus root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParsedProgram {
    pub ast: Ast,
    pub root: NodeId,
}

impl ParsedProgram {
    pub fn new(ast: Ast, root: NodeId) -> Self {
        Self { ast, root }
    }

    /// Validate links and rebuild parents after loading from outside.
    pub fn prepare(mut self) -> Result<Self, TreeError> {
        if self.root.index() >= self.ast.len() {
            return Err(TreeError::MissingRoot { root: self.root });
        }
        self.ast.validate()?;
        self.ast.link_parents();
        // With single ownership and a parentless root, every walk down from
        // the root terminates.
        if let Some(parent) = self.ast.parent(self.root) {
            return Err(TreeError::OwnedRoot {
                root: self.root,
                parent,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ast: &mut Ast) -> NodeId {
        let one = ast.alloc_at(Node::IntLiteral { value: 1 }, Some(Location::new(1, 5)));
        let x = ast.alloc(Node::Var { name: "x".into() });
        let assign = ast.alloc(Node::Assign {
            target: x,
            value: one,
        });
        let y = ast.alloc(Node::Var { name: "x".into() });
        ast.alloc(Node::Expressions {
            exps: vec![assign, y],
        })
    }

    #[test]
    fn alloc_links_parents() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let assign = match ast.get(root) {
            Node::Expressions { exps } => exps[0],
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(ast.parent(assign), Some(root));
        assert_eq!(ast.parent(root), None);
        assert_eq!(ast.ancestors(NodeId(0)).collect::<Vec<_>>(), vec![assign, root]);
    }

    #[test]
    fn deep_clone_is_equal_but_independent() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let copy = ast.deep_clone(root);
        assert_ne!(copy, root);
        assert!(ast.structurally_eq(root, &ast, copy));
        assert_eq!(ast.parent(copy), None);
        let copied_children = ast.get(copy).children();
        assert!(copied_children.iter().all(|&c| ast.parent(c) == Some(copy)));
        assert!(copied_children.iter().all(|&c| c.0 > root.0));
    }

    #[test]
    fn deep_clone_keeps_locations() {
        let mut ast = Ast::new();
        let lit = ast.alloc_at(Node::IntLiteral { value: 7 }, Some(Location::new(3, 9)));
        let copy = ast.deep_clone(lit);
        assert_eq!(ast.location(copy), Some(&Location::new(3, 9)));
    }

    #[test]
    fn structural_equality_ignores_locations() {
        let mut a = Ast::new();
        let mut b = Ast::new();
        let ra = a.alloc_at(Node::IntLiteral { value: 1 }, Some(Location::new(1, 1)));
        let rb = b.alloc_at(Node::IntLiteral { value: 1 }, Some(Location::new(9, 9)));
        assert!(a.structurally_eq(ra, &b, rb));
        let rc = b.alloc(Node::IntLiteral { value: 2 });
        assert!(!a.structurally_eq(ra, &b, rc));
        let rd = b.alloc(Node::LongLiteral { value: 1 });
        assert!(!a.structurally_eq(ra, &b, rd));
    }

    #[test]
    fn validate_rejects_shared_children() {
        let mut ast = Ast::new();
        let x = ast.alloc(Node::Var { name: "x".into() });
        ast.alloc(Node::Expressions { exps: vec![x, x] });
        assert_eq!(ast.validate(), Err(TreeError::SharedChild { child: x }));
    }

    #[test]
    fn prepare_rejects_a_root_on_a_cycle() {
        // 1 -> 0 -> 1
        let mut ast = Ast::new();
        let inner = ast.alloc(Node::Expressions { exps: vec![NodeId(1)] });
        let root = ast.alloc(Node::Expressions { exps: vec![inner] });
        let err = ParsedProgram::new(ast, root).prepare().unwrap_err();
        assert_eq!(err, TreeError::OwnedRoot { root, parent: inner });
        assert_eq!(err.to_string(), "root node #1 is a child of node #0");
    }

    #[test]
    fn prepare_rejects_missing_root() {
        let program = ParsedProgram::new(Ast::new(), NodeId(3));
        assert_eq!(
            program.prepare().unwrap_err(),
            TreeError::MissingRoot { root: NodeId(3) }
        );
    }
}
