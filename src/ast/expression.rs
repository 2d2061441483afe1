// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Arena-allocated expression trees
//!
//! All nodes of one expression live in a single vector; parent and child
//! links are [`NodeId`] indices. Apart from the write-once constant-fold
//! cache and compiled-accessor handle, an [`Expression`] is immutable after
//! [`ExpressionBuilder::build`] and can be shared between threads.

use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use super::operator::OperatorKind;
use super::visitor::Renderer;
use crate::compiler::CompiledAccessor;
use crate::error::{OgnlError, Result};
use crate::model::Value;

/// Index of a node inside its [`Expression`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node variants
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// `source.name`; one child evaluating to the property name
    PropertyRef,
    /// `source[index]`; one child evaluating to the index or key
    IndexedRef,
    /// `source.name(args...)`; children are the arguments
    MethodCall { name: Arc<str> },
    /// `#root`
    RootRef,
    /// `#this`, the object currently navigated from
    ThisRef,
    /// `#name`
    ContextVarRef { name: Arc<str> },
    Constant(Value),
    /// Children are the operands
    Operator(OperatorKind),
    /// `a.b.c()`; children are the steps
    Sequence,
    /// `{a, b}`; children are the elements
    ListLiteral,
    /// `target = value`
    Assign,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::PropertyRef => "property",
            NodeKind::IndexedRef => "index",
            NodeKind::MethodCall { .. } => "method call",
            NodeKind::RootRef => "root reference",
            NodeKind::ThisRef => "this reference",
            NodeKind::ContextVarRef { .. } => "variable reference",
            NodeKind::Constant(_) => "constant",
            NodeKind::Operator(_) => "operator",
            NodeKind::Sequence => "chain",
            NodeKind::ListLiteral => "list",
            NodeKind::Assign => "assignment",
        }
    }
}

/// Outcome of the first-evaluation constant check
#[derive(Debug, Clone)]
pub(crate) enum ConstantFold {
    NotConstant,
    Folded(Value),
}

/// One node of an expression tree
pub struct Node {
    kind: NodeKind,
    children: SmallVec<[NodeId; 4]>,
    parent: Option<NodeId>,
    constant: OnceCell<ConstantFold>,
    accessor: OnceCell<CompiledAccessor>,
}

impl Node {
    fn new(kind: NodeKind, children: SmallVec<[NodeId; 4]>) -> Self {
        Self {
            kind,
            children,
            parent: None,
            constant: OnceCell::new(),
            accessor: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Diagnostic back-reference; never used for ownership
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn constant_fold(&self) -> Option<&ConstantFold> {
        self.constant.get()
    }

    /// Record the constant check; the first writer wins, later writers are
    /// discarded and observe the stored outcome
    pub(crate) fn record_constant_fold(&self, fold: ConstantFold) -> &ConstantFold {
        self.constant.get_or_init(|| fold)
    }

    pub fn compiled_accessor(&self) -> Option<&CompiledAccessor> {
        self.accessor.get()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("parent", &self.parent)
            .field("compiled", &self.accessor.get().is_some())
            .finish()
    }
}

/// A parsed expression: an arena of nodes and the id of its root
#[derive(Debug)]
pub struct Expression {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Expression {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render the subtree rooted at `id` back to expression text
    pub fn render(&self, id: NodeId) -> String {
        Renderer::render(self, id)
    }

    /// Side-effect-free, context-independent check of a node
    ///
    /// Constants are constant, method calls and references never are.
    /// Operators are constant when all operands are. A property or index
    /// step is constant when its key is constant and it follows only
    /// constant steps inside a chain.
    pub fn is_constant(&self, id: NodeId) -> bool {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Constant(_) => true,
            NodeKind::Operator(_) | NodeKind::Sequence => {
                node.children.iter().all(|&child| self.is_constant(child))
            }
            NodeKind::PropertyRef | NodeKind::IndexedRef => {
                node.children.iter().all(|&child| self.is_constant(child))
                    && self.follows_constant_steps(id)
            }
            NodeKind::MethodCall { .. }
            | NodeKind::RootRef
            | NodeKind::ThisRef
            | NodeKind::ContextVarRef { .. }
            | NodeKind::ListLiteral
            | NodeKind::Assign => false,
        }
    }

    fn follows_constant_steps(&self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if !matches!(self.kind(parent), NodeKind::Sequence) {
            return false;
        }
        let steps = self.children(parent);
        match steps.iter().position(|&step| step == id) {
            Some(0) | None => false,
            Some(position) => steps[..position].iter().all(|&step| self.is_constant(step)),
        }
    }

    /// Cached value of a node classified as constant, once evaluated
    pub fn folded_value(&self, id: NodeId) -> Option<&Value> {
        match self.node(id).constant_fold()? {
            ConstantFold::Folded(value) => Some(value),
            ConstantFold::NotConstant => None,
        }
    }

    /// Accessor compiled for the whole expression, if any
    pub fn compiled_accessor(&self) -> Option<&CompiledAccessor> {
        self.node(self.root).compiled_accessor()
    }

    /// Install a compiled accessor on `id`; the handle is set at most once
    ///
    /// Returns the accessor now in place, which is `accessor` unless a
    /// concurrent compilation got there first.
    pub fn install_accessor(&self, id: NodeId, accessor: CompiledAccessor) -> &CompiledAccessor {
        self.node(id).accessor.get_or_init(|| accessor)
    }

    /// Property name when the node is a property step with a constant key
    pub fn property_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::PropertyRef => match self.children(id).first().map(|&c| self.kind(c)) {
                Some(NodeKind::Constant(Value::String(name))) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.root))
    }
}

/// Builds an [`Expression`] bottom-up
///
/// ```rust
/// use octofhir_ognl::ast::ExpressionBuilder;
///
/// let mut b = ExpressionBuilder::new();
/// let name = b.property("name");
/// let length = b.method("length", []);
/// let chain = b.sequence([name, length]);
/// let expression = b.build(chain).unwrap();
/// assert_eq!(expression.to_string(), "name.length()");
/// ```
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    nodes: Vec<Node>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: NodeKind, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(kind, children.into_iter().collect()));
        id
    }

    pub fn constant(&mut self, value: impl Into<Value>) -> NodeId {
        self.push(NodeKind::Constant(value.into()), [])
    }

    /// Property with a constant name
    pub fn property(&mut self, name: &str) -> NodeId {
        let key = self.constant(name);
        self.push(NodeKind::PropertyRef, [key])
    }

    /// Property whose name is computed by `key`
    pub fn property_expr(&mut self, key: NodeId) -> NodeId {
        self.push(NodeKind::PropertyRef, [key])
    }

    pub fn index(&mut self, index: NodeId) -> NodeId {
        self.push(NodeKind::IndexedRef, [index])
    }

    pub fn method(&mut self, name: &str, args: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.push(NodeKind::MethodCall { name: Arc::from(name) }, args)
    }

    pub fn root(&mut self) -> NodeId {
        self.push(NodeKind::RootRef, [])
    }

    pub fn this(&mut self) -> NodeId {
        self.push(NodeKind::ThisRef, [])
    }

    pub fn variable(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::ContextVarRef { name: Arc::from(name) }, [])
    }

    pub fn operator(&mut self, kind: OperatorKind, operands: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.push(NodeKind::Operator(kind), operands)
    }

    pub fn binary(&mut self, kind: OperatorKind, left: NodeId, right: NodeId) -> NodeId {
        self.operator(kind, [left, right])
    }

    pub fn unary(&mut self, kind: OperatorKind, operand: NodeId) -> NodeId {
        self.operator(kind, [operand])
    }

    pub fn conditional(&mut self, test: NodeId, then: NodeId, otherwise: NodeId) -> NodeId {
        self.operator(OperatorKind::Conditional, [test, then, otherwise])
    }

    pub fn sequence(&mut self, steps: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.push(NodeKind::Sequence, steps)
    }

    pub fn list(&mut self, items: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.push(NodeKind::ListLiteral, items)
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.push(NodeKind::Assign, [target, value])
    }

    /// Validate the tree shape, wire parent links and freeze the arena
    pub fn build(mut self, root: NodeId) -> Result<Expression> {
        if root.index() >= self.nodes.len() {
            return Err(OgnlError::syntax(format!("unknown root node {root}")));
        }

        for index in 0..self.nodes.len() {
            let id = NodeId::new(index);
            let node = &self.nodes[index];
            check_shape(id, &node.kind, node.children.len())?;

            for child in node.children.clone() {
                if child.index() >= self.nodes.len() {
                    return Err(OgnlError::syntax(format!("node {id} refers to unknown node {child}")));
                }
                if child == root {
                    return Err(OgnlError::syntax(format!("root node {root} used as a child of {id}")));
                }
                let slot = &mut self.nodes[child.index()].parent;
                if slot.is_some() {
                    return Err(OgnlError::syntax(format!("node {child} has more than one parent")));
                }
                *slot = Some(id);
            }
        }

        Ok(Expression {
            nodes: self.nodes,
            root,
        })
    }
}

fn check_shape(id: NodeId, kind: &NodeKind, children: usize) -> Result<()> {
    let valid = match kind {
        NodeKind::PropertyRef | NodeKind::IndexedRef => children == 1,
        NodeKind::Assign => children == 2,
        NodeKind::RootRef | NodeKind::ThisRef | NodeKind::ContextVarRef { .. } | NodeKind::Constant(_) => {
            children == 0
        }
        NodeKind::Operator(op) => op.arity().accepts(children),
        NodeKind::Sequence => children > 0,
        NodeKind::MethodCall { .. } | NodeKind::ListLiteral => true,
    };
    if valid {
        Ok(())
    } else {
        Err(OgnlError::syntax(format!(
            "{} node {id} cannot have {children} children",
            kind.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_wires_parents() {
        let mut b = ExpressionBuilder::new();
        let tags = b.property("tags");
        let one = b.constant(1);
        let index = b.index(one);
        let chain = b.sequence([tags, index]);
        let expression = b.build(chain).unwrap();

        assert_eq!(expression.parent(tags), Some(chain));
        assert_eq!(expression.parent(one), Some(index));
        assert_eq!(expression.parent(chain), None);
        assert_eq!(expression.to_string(), "tags[1]");
    }

    #[test]
    fn test_builder_rejects_shared_children() {
        let mut b = ExpressionBuilder::new();
        let one = b.constant(1);
        let sum = b.binary(OperatorKind::Add, one, one);
        let error = b.build(sum).unwrap_err();
        assert!(matches!(error.kind(), crate::error::ErrorKind::Syntax { .. }));
    }

    #[test]
    fn test_builder_rejects_bad_arity() {
        let mut b = ExpressionBuilder::new();
        let one = b.constant(1);
        let two = b.constant(2);
        let three = b.constant(3);
        let bad = b.operator(OperatorKind::Subtract, [one, two, three]);
        assert!(b.build(bad).is_err());

        let mut b = ExpressionBuilder::new();
        let one = b.constant(1);
        let two = b.constant(2);
        let three = b.constant(3);
        let sum = b.operator(OperatorKind::Add, [one, two, three]);
        assert!(b.build(sum).is_ok());
    }

    #[test]
    fn test_constant_classification() {
        let mut b = ExpressionBuilder::new();
        let map = b.constant(Value::map([("x", Value::Int(1))]));
        let x = b.property("x");
        let chain = b.sequence([map, x]);
        let y = b.property("y");
        let two = b.constant(2);
        let sum = b.binary(OperatorKind::Add, y, two);
        let list = b.list([chain, sum]);
        let expression = b.build(list).unwrap();

        assert!(expression.is_constant(chain));
        assert!(expression.is_constant(x));
        assert!(!expression.is_constant(y));
        assert!(!expression.is_constant(sum));
        assert!(!expression.is_constant(list));
    }

    #[test]
    fn test_first_constant_fold_wins() {
        let mut b = ExpressionBuilder::new();
        let one = b.constant(1);
        let two = b.constant(2);
        let sum = b.binary(OperatorKind::Add, one, two);
        let expression = b.build(sum).unwrap();
        let node = expression.node(sum);

        assert!(matches!(
            node.record_constant_fold(ConstantFold::Folded(Value::Int(3))),
            ConstantFold::Folded(Value::Int(3))
        ));
        assert!(matches!(
            node.record_constant_fold(ConstantFold::NotConstant),
            ConstantFold::Folded(Value::Int(3))
        ));
        assert_eq!(expression.folded_value(sum), Some(&Value::Int(3)));
        assert_eq!(expression.folded_value(one), None);
    }
}
