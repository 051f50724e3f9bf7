//! The abstract syntax tree produced by the parser and consumed by the code
//! generator.
//!
//! The original implementation this crate is modelled on stores each node's
//! children as a circular doubly-linked sibling list threaded through a
//! fixed-size memory pool. That's an artifact of manual arena allocation in
//! a language without growable ordered collections; here the same tree is
//! just an arena of [`Node`]s addressed by [`NodeId`], each holding an
//! ordered `Vec<NodeId>` of its children. The only behavior worth carrying
//! over explicitly is that a few lowerings need "the last child" (an
//! `if` with no `else`, the false-branch of `?:`) — that's simply
//! `children.last()`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod interner;
mod node;

pub use interner::{Interner, Symbol};
pub use node::{BaseType, Node, NodeId, NodePayload, NodeTag, Operator};

/// An arena of AST nodes, addressed by [`NodeId`].
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Allocate a new, childless node and return its id.
    pub fn alloc(&mut self, tag: NodeTag, payload: NodePayload) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            tag,
            payload,
            children: Vec::new(),
        });
        id
    }

    /// Append `child` to `parent`'s ordered child list.
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0 as usize].children.push(child);
    }

    /// Borrow a node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Mutably borrow a node by id.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Number of nodes allocated so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena has no nodes yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_preserve_insertion_order() {
        let mut ast = Ast::new();
        let parent = ast.alloc(NodeTag::Block, NodePayload::None);
        let a = ast.alloc(NodeTag::Stmt, NodePayload::None);
        let b = ast.alloc(NodeTag::Stmt, NodePayload::None);
        let c = ast.alloc(NodeTag::Stmt, NodePayload::None);
        for child in [a, b, c] {
            ast.push_child(parent, child);
        }
        assert_eq!(ast.node(parent).children, vec![a, b, c]);
        assert_eq!(ast.node(parent).children.last(), Some(&c));
    }
}
