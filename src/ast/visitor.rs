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

//! Visitor pattern for expression traversal

use super::expression::{Expression, NodeId, NodeKind};
use super::operator::OperatorKind;
use crate::model::Value;

/// Trait for visiting expression nodes
pub trait Visitor: Sized {
    /// The result type of visiting a node
    type Result;

    /// Visit any node, dispatching on its kind
    fn visit_node(&mut self, expr: &Expression, id: NodeId) -> Self::Result {
        walk_node(self, expr, id)
    }

    /// Visit a property step; `key` evaluates to the property name
    fn visit_property(&mut self, expr: &Expression, id: NodeId, key: NodeId) -> Self::Result;

    /// Visit an index step
    fn visit_index(&mut self, expr: &Expression, id: NodeId, index: NodeId) -> Self::Result;

    /// Visit a method call
    fn visit_method_call(
        &mut self,
        expr: &Expression,
        id: NodeId,
        name: &str,
        args: &[NodeId],
    ) -> Self::Result;

    /// Visit `#root`
    fn visit_root(&mut self, expr: &Expression, id: NodeId) -> Self::Result;

    /// Visit `#this`
    fn visit_this(&mut self, expr: &Expression, id: NodeId) -> Self::Result;

    /// Visit a context variable reference
    fn visit_variable(&mut self, expr: &Expression, id: NodeId, name: &str) -> Self::Result;

    /// Visit a literal
    fn visit_constant(&mut self, expr: &Expression, id: NodeId, value: &Value) -> Self::Result;

    /// Visit an operator application
    fn visit_operator(
        &mut self,
        expr: &Expression,
        id: NodeId,
        op: OperatorKind,
        operands: &[NodeId],
    ) -> Self::Result;

    /// Visit a navigation chain
    fn visit_sequence(&mut self, expr: &Expression, id: NodeId, steps: &[NodeId]) -> Self::Result;

    /// Visit a list literal
    fn visit_list(&mut self, expr: &Expression, id: NodeId, items: &[NodeId]) -> Self::Result;

    /// Visit an assignment
    fn visit_assign(
        &mut self,
        expr: &Expression,
        id: NodeId,
        target: NodeId,
        value: NodeId,
    ) -> Self::Result;
}

/// Default dispatch from a node to the matching `visit_*` method
pub fn walk_node<V: Visitor>(visitor: &mut V, expr: &Expression, id: NodeId) -> V::Result {
    let children = expr.children(id);
    match expr.kind(id) {
        NodeKind::PropertyRef => visitor.visit_property(expr, id, children[0]),
        NodeKind::IndexedRef => visitor.visit_index(expr, id, children[0]),
        NodeKind::MethodCall { name } => visitor.visit_method_call(expr, id, name, children),
        NodeKind::RootRef => visitor.visit_root(expr, id),
        NodeKind::ThisRef => visitor.visit_this(expr, id),
        NodeKind::ContextVarRef { name } => visitor.visit_variable(expr, id, name),
        NodeKind::Constant(value) => visitor.visit_constant(expr, id, value),
        NodeKind::Operator(op) => visitor.visit_operator(expr, id, *op, children),
        NodeKind::Sequence => visitor.visit_sequence(expr, id, children),
        NodeKind::ListLiteral => visitor.visit_list(expr, id, children),
        NodeKind::Assign => visitor.visit_assign(expr, id, children[0], children[1]),
    }
}

/// Renders a subtree back to expression text
pub(crate) struct Renderer {
    out: String,
}

impl Renderer {
    pub(crate) fn render(expr: &Expression, id: NodeId) -> String {
        let mut renderer = Renderer { out: String::new() };
        renderer.visit_node(expr, id);
        renderer.out
    }

    fn operand(&mut self, expr: &Expression, id: NodeId) {
        let grouped = match expr.kind(id) {
            NodeKind::Operator(op) => !op.is_unary(),
            NodeKind::Assign => true,
            _ => false,
        };
        if grouped {
            self.out.push('(');
            self.visit_node(expr, id);
            self.out.push(')');
        } else {
            self.visit_node(expr, id);
        }
    }

    fn separated(&mut self, expr: &Expression, items: &[NodeId]) {
        for (i, &item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.visit_node(expr, item);
        }
    }
}

fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Value::Char(c) => {
            out.push('\'');
            out.push(*c);
            out.push('\'');
        }
        Value::Long(n) => out.push_str(&format!("{n}L")),
        Value::Float(n) => out.push_str(&format!("{}f", Value::Float(*n))),
        Value::BigInteger(n) => out.push_str(&format!("{n}H")),
        Value::BigDecimal(d) => out.push_str(&format!("{d}B")),
        other => out.push_str(&other.to_string()),
    }
}

impl Visitor for Renderer {
    type Result = ();

    fn visit_property(&mut self, expr: &Expression, id: NodeId, key: NodeId) {
        match expr.property_name(id) {
            Some(name) => self.out.push_str(name),
            None => {
                self.out.push('(');
                self.visit_node(expr, key);
                self.out.push(')');
            }
        }
    }

    fn visit_index(&mut self, expr: &Expression, _id: NodeId, index: NodeId) {
        self.out.push('[');
        self.visit_node(expr, index);
        self.out.push(']');
    }

    fn visit_method_call(&mut self, expr: &Expression, _id: NodeId, name: &str, args: &[NodeId]) {
        self.out.push_str(name);
        self.out.push('(');
        self.separated(expr, args);
        self.out.push(')');
    }

    fn visit_root(&mut self, _expr: &Expression, _id: NodeId) {
        self.out.push_str("#root");
    }

    fn visit_this(&mut self, _expr: &Expression, _id: NodeId) {
        self.out.push_str("#this");
    }

    fn visit_variable(&mut self, _expr: &Expression, _id: NodeId, name: &str) {
        self.out.push('#');
        self.out.push_str(name);
    }

    fn visit_constant(&mut self, _expr: &Expression, _id: NodeId, value: &Value) {
        write_literal(&mut self.out, value);
    }

    fn visit_operator(&mut self, expr: &Expression, _id: NodeId, op: OperatorKind, operands: &[NodeId]) {
        match op {
            OperatorKind::Conditional => {
                self.operand(expr, operands[0]);
                self.out.push_str(" ? ");
                self.operand(expr, operands[1]);
                self.out.push_str(" : ");
                self.operand(expr, operands[2]);
            }
            op if op.is_unary() => {
                self.out.push_str(op.symbol());
                self.operand(expr, operands[0]);
            }
            op => {
                for (i, &operand) in operands.iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                        self.out.push_str(op.symbol());
                        self.out.push(' ');
                    }
                    self.operand(expr, operand);
                }
            }
        }
    }

    fn visit_sequence(&mut self, expr: &Expression, _id: NodeId, steps: &[NodeId]) {
        for (i, &step) in steps.iter().enumerate() {
            if i > 0 && !matches!(expr.kind(step), NodeKind::IndexedRef) {
                self.out.push('.');
            }
            self.operand(expr, step);
        }
    }

    fn visit_list(&mut self, expr: &Expression, _id: NodeId, items: &[NodeId]) {
        self.out.push('{');
        self.separated(expr, items);
        self.out.push('}');
    }

    fn visit_assign(&mut self, expr: &Expression, _id: NodeId, target: NodeId, value: NodeId) {
        self.visit_node(expr, target);
        self.out.push_str(" = ");
        self.operand(expr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExpressionBuilder;

    #[test]
    fn test_render_operators_and_literals() {
        let mut b = ExpressionBuilder::new();
        let x = b.property("x");
        let one = b.constant(1i64);
        let sum = b.binary(OperatorKind::Add, x, one);
        let greeting = b.constant("hi \"there\"");
        let flag = b.variable("flag");
        let negated = b.unary(OperatorKind::Not, flag);
        let choice = b.conditional(negated, sum, greeting);
        let expression = b.build(choice).unwrap();

        assert_eq!(
            expression.to_string(),
            "!#flag ? (x + 1L) : \"hi \\\"there\\\"\""
        );
    }

    #[test]
    fn test_render_chain_with_index_and_list() {
        let mut b = ExpressionBuilder::new();
        let root = b.root();
        let tags = b.property("tags");
        let zero = b.constant(0);
        let first = b.index(zero);
        let chain = b.sequence([root, tags, first]);
        let this = b.this();
        let list = b.list([chain, this]);
        let expression = b.build(list).unwrap();

        assert_eq!(expression.to_string(), "{#root.tags[0], #this}");
    }

    struct NodeCounter(usize);

    impl Visitor for NodeCounter {
        type Result = ();

        fn visit_property(&mut self, expr: &Expression, _id: NodeId, key: NodeId) {
            self.0 += 1;
            self.visit_node(expr, key);
        }
        fn visit_index(&mut self, expr: &Expression, _id: NodeId, index: NodeId) {
            self.0 += 1;
            self.visit_node(expr, index);
        }
        fn visit_method_call(&mut self, expr: &Expression, _id: NodeId, _name: &str, args: &[NodeId]) {
            self.0 += 1;
            args.iter().for_each(|&a| self.visit_node(expr, a));
        }
        fn visit_root(&mut self, _expr: &Expression, _id: NodeId) {
            self.0 += 1;
        }
        fn visit_this(&mut self, _expr: &Expression, _id: NodeId) {
            self.0 += 1;
        }
        fn visit_variable(&mut self, _expr: &Expression, _id: NodeId, _name: &str) {
            self.0 += 1;
        }
        fn visit_constant(&mut self, _expr: &Expression, _id: NodeId, _value: &Value) {
            self.0 += 1;
        }
        fn visit_operator(&mut self, expr: &Expression, _id: NodeId, _op: OperatorKind, operands: &[NodeId]) {
            self.0 += 1;
            operands.iter().for_each(|&o| self.visit_node(expr, o));
        }
        fn visit_sequence(&mut self, expr: &Expression, _id: NodeId, steps: &[NodeId]) {
            self.0 += 1;
            steps.iter().for_each(|&s| self.visit_node(expr, s));
        }
        fn visit_list(&mut self, expr: &Expression, _id: NodeId, items: &[NodeId]) {
            self.0 += 1;
            items.iter().for_each(|&i| self.visit_node(expr, i));
        }
        fn visit_assign(&mut self, expr: &Expression, _id: NodeId, target: NodeId, value: NodeId) {
            self.0 += 1;
            self.visit_node(expr, target);
            self.visit_node(expr, value);
        }
    }

    #[test]
    fn test_walk_reaches_every_node() {
        let mut b = ExpressionBuilder::new();
        let name = b.property("name");
        let value = b.constant("Bob");
        let assign = b.assign(name, value);
        let expression = b.build(assign).unwrap();

        let mut counter = NodeCounter(0);
        counter.visit_node(&expression, expression.root());
        assert_eq!(counter.0, expression.len());
    }
}
