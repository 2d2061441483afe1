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

//! Tree-walking interpreter
//!
//! Interpretation is the reference semantics of an expression; compiled
//! accessors must produce the same observable results.
//!
//! Scoping rules:
//!
//! - chain steps receive the previous step's result as their source;
//! - property keys, index expressions and method arguments are evaluated
//!   against the context root;
//! - operator operands and list items are evaluated against the source.
//!
//! Each node decides on its first evaluation whether it is constant. A
//! constant node is evaluated once and its value cached on the node, so
//! later evaluations skip it even when they run against other roots.

use log::debug;

use super::context::OgnlContext;
use super::evaluation::FrameGuard;
use super::operations;
use crate::ast::{ConstantFold, Expression, NodeId, NodeKind, OperatorKind};
use crate::error::{OgnlError, Result};
use crate::model::{TypeCoercion, Value};

/// Evaluates the nodes of one expression
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'e> {
    expression: &'e Expression,
}

impl<'e> Interpreter<'e> {
    pub fn new(expression: &'e Expression) -> Self {
        Self { expression }
    }

    pub fn expression(&self) -> &'e Expression {
        self.expression
    }

    /// Value of node `id` evaluated against `source`
    pub fn get_value(&self, ctx: &mut OgnlContext, id: NodeId, source: &Value) -> Result<Value> {
        let mut frame = FrameGuard::enter(ctx, id, source, false);
        let outcome = self
            .get_folded(&mut frame, id, source)
            .map_err(|error| error.at_node(id, || self.expression.render(id)));
        frame.complete_get(&outcome);
        outcome
    }

    /// Assign `value` through node `id`, with `target` as the object the
    /// node navigates from
    pub fn set_value(&self, ctx: &mut OgnlContext, id: NodeId, target: &Value, value: Value) -> Result<()> {
        let mut frame = FrameGuard::enter(ctx, id, target, true);
        frame.set_current_object(target.clone());
        frame.set_current_node(Some(id));
        let outcome = self
            .set_body(&mut frame, id, target, value)
            .map_err(|error| error.at_node(id, || self.expression.render(id)));
        frame.complete_set(&outcome);
        outcome
    }

    fn get_folded(&self, ctx: &mut OgnlContext, id: NodeId, source: &Value) -> Result<Value> {
        ctx.set_current_object(source.clone());
        ctx.set_current_node(Some(id));

        let node = self.expression.node(id);
        match node.constant_fold() {
            Some(ConstantFold::Folded(value)) => return Ok(value.clone()),
            Some(ConstantFold::NotConstant) => return self.get_body(ctx, id, source),
            None => {}
        }

        if !self.expression.is_constant(id) {
            node.record_constant_fold(ConstantFold::NotConstant);
            return self.get_body(ctx, id, source);
        }

        let value = self.get_body(ctx, id, source)?;
        debug!("folded constant {} = {value}", self.expression.render(id));
        node.record_constant_fold(ConstantFold::Folded(value.clone()));
        Ok(value)
    }

    fn get_body(&self, ctx: &mut OgnlContext, id: NodeId, source: &Value) -> Result<Value> {
        let children = self.expression.children(id);
        match self.expression.kind(id) {
            NodeKind::Constant(value) => Ok(value.clone()),
            NodeKind::RootRef => Ok(ctx.root().clone()),
            NodeKind::ThisRef => Ok(source.clone()),
            NodeKind::ContextVarRef { name } => Ok(ctx.variable(name)),
            NodeKind::PropertyRef | NodeKind::IndexedRef => {
                let key = self.evaluate_key(ctx, children)?;
                if source.is_null() {
                    return Err(OgnlError::null_source("get", TypeCoercion::string_value(&key)));
                }
                let value = ctx.resolver().get_property(source, &key)?;
                if value.is_null() {
                    return Ok(ctx.resolver().null_handler(source).null_property_value(source, &key));
                }
                Ok(value)
            }
            NodeKind::MethodCall { name } => {
                let args = self.evaluate_arguments(ctx, children)?;
                if source.is_null() {
                    return Err(OgnlError::null_source("call", name.to_string()));
                }
                let resolver = ctx.resolver().clone();
                let result = resolver.call_method(source, name, &args)?;
                if result.is_null() {
                    return Ok(resolver.null_handler(source).null_method_result(source, name, &args));
                }
                Ok(result)
            }
            NodeKind::Operator(op) => self.evaluate_operator(ctx, *op, children, source),
            NodeKind::Sequence => {
                let mut current = source.clone();
                for &step in children {
                    current = self.get_value(ctx, step, &current)?;
                }
                Ok(current)
            }
            NodeKind::ListLiteral => {
                let items = children
                    .iter()
                    .map(|&item| self.get_value(ctx, item, source))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            NodeKind::Assign => {
                let (target, value) = (children[0], children[1]);
                let value = self.get_value(ctx, value, source)?;
                self.set_value(ctx, target, source, value.clone())?;
                Ok(value)
            }
        }
    }

    fn evaluate_key(&self, ctx: &mut OgnlContext, children: &[NodeId]) -> Result<Value> {
        let root = ctx.root().clone();
        match children.first() {
            Some(&key) => self.get_value(ctx, key, &root),
            None => Err(OgnlError::inappropriate("property access without a key")),
        }
    }

    fn evaluate_arguments(&self, ctx: &mut OgnlContext, children: &[NodeId]) -> Result<Vec<Value>> {
        let root = ctx.root().clone();
        children
            .iter()
            .map(|&arg| self.get_value(ctx, arg, &root))
            .collect()
    }

    fn evaluate_operator(
        &self,
        ctx: &mut OgnlContext,
        op: OperatorKind,
        operands: &[NodeId],
        source: &Value,
    ) -> Result<Value> {
        match op {
            OperatorKind::And | OperatorKind::Or => {
                let decisive = op == OperatorKind::Or;
                let mut last = Value::Null;
                for &operand in operands {
                    last = self.get_value(ctx, operand, source)?;
                    if TypeCoercion::boolean_value(&last) == decisive {
                        break;
                    }
                }
                Ok(last)
            }
            OperatorKind::Conditional => {
                let test = self.get_value(ctx, operands[0], source)?;
                let branch = if TypeCoercion::boolean_value(&test) {
                    operands[1]
                } else {
                    operands[2]
                };
                self.get_value(ctx, branch, source)
            }
            _ => {
                let values = operands
                    .iter()
                    .map(|&operand| self.get_value(ctx, operand, source))
                    .collect::<Result<Vec<_>>>()?;
                operations::apply(op, &values)
            }
        }
    }

    fn set_body(&self, ctx: &mut OgnlContext, id: NodeId, target: &Value, value: Value) -> Result<()> {
        let children = self.expression.children(id);
        match self.expression.kind(id) {
            NodeKind::RootRef => {
                ctx.set_root(value);
                Ok(())
            }
            NodeKind::ContextVarRef { name } => ctx.set_variable(name, value),
            NodeKind::PropertyRef | NodeKind::IndexedRef => {
                let key = self.evaluate_key(ctx, children)?;
                if target.is_null() {
                    return Err(OgnlError::null_source("set", TypeCoercion::string_value(&key)));
                }
                ctx.resolver().set_property(target, &key, value)
            }
            NodeKind::Sequence => {
                let Some((&last, init)) = children.split_last() else {
                    return Err(OgnlError::inappropriate("cannot assign to an empty chain"));
                };
                let mut current = target.clone();
                for &step in init {
                    current = self.get_value(ctx, step, &current)?;
                }
                self.set_value(ctx, last, &current, value)
            }
            NodeKind::MethodCall { name } => {
                let mut args = self.evaluate_arguments(ctx, children)?;
                if target.is_null() {
                    return Err(OgnlError::null_source("set", name.to_string()));
                }
                let resolver = ctx.resolver().clone();
                let (_, setter) = resolver.resolve_synthetic_pair(target, name, &args)?;
                args.push(value);
                resolver.invoke(&setter, target, &args).map(|_| ())
            }
            kind @ (NodeKind::Constant(_)
            | NodeKind::ThisRef
            | NodeKind::Operator(_)
            | NodeKind::ListLiteral
            | NodeKind::Assign) => Err(OgnlError::inappropriate(format!(
                "cannot assign to {} '{}'",
                kind.name(),
                self.expression.render(id)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExpressionBuilder;
    use crate::model::{PrimitiveKind, TypeRef};
    use crate::registry::{ClassBuilder, ClassRegistry, MemberResolver, MethodSignature};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter {
        hits: i32,
    }

    fn context() -> OgnlContext {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(
            ClassBuilder::<Counter>::new("Counter")
                .method(MethodSignature::new("peek", vec![], TypeRef::Boxed(PrimitiveKind::Int)), |c, _| {
                    Ok(Value::Int(c.hits))
                })
                .method_mut(MethodSignature::new("bump", vec![], TypeRef::Map), |c, _| {
                    c.hits += 1;
                    Ok(Value::map([("after", Value::Int(c.hits))]))
                })
                .build(),
        );
        OgnlContext::new(Arc::new(MemberResolver::new(registry)))
    }

    fn evaluate(expression: &Expression, ctx: &mut OgnlContext, root: Value) -> Result<Value> {
        ctx.set_root(root.clone());
        Interpreter::new(expression).get_value(ctx, expression.root(), &root)
    }

    #[test]
    fn test_short_circuit_yields_deciding_operand() {
        let mut b = ExpressionBuilder::new();
        let zero = b.constant(0);
        let boom = b.method("explode", []);
        let and = b.binary(OperatorKind::And, zero, boom);
        let expression = b.build(and).unwrap();

        let mut ctx = context();
        assert_eq!(evaluate(&expression, &mut ctx, Value::Null).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_chain_invokes_each_step_once() {
        let mut b = ExpressionBuilder::new();
        let bump = b.method("bump", []);
        let after = b.property("after");
        let chain = b.sequence([bump, after]);
        let expression = b.build(chain).unwrap();

        let mut ctx = context();
        let counter = Value::object("Counter", Counter::default());
        assert_eq!(evaluate(&expression, &mut ctx, counter.clone()).unwrap(), Value::Int(1));
        assert_eq!(evaluate(&expression, &mut ctx, counter.clone()).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_null_intermediate_is_reported() {
        let mut b = ExpressionBuilder::new();
        let missing = b.property("missing");
        let length = b.method("length", []);
        let chain = b.sequence([missing, length]);
        let expression = b.build(chain).unwrap();

        let mut ctx = context();
        let error = evaluate(&expression, &mut ctx, Value::empty_map()).unwrap_err();
        assert!(matches!(error.kind(), crate::error::ErrorKind::NullSource { .. }));
        assert_eq!(error.expression(), Some("length()"));
    }

    #[test]
    fn test_read_only_nodes_reject_assignment() {
        let mut b = ExpressionBuilder::new();
        let one = b.constant(1);
        let two = b.constant(2);
        let sum = b.binary(OperatorKind::Add, one, two);
        let expression = b.build(sum).unwrap();

        let mut ctx = context();
        let interpreter = Interpreter::new(&expression);
        for id in [expression.root(), one] {
            let error = interpreter.set_value(&mut ctx, id, &Value::Null, Value::Int(5)).unwrap_err();
            assert!(error.is_inappropriate());
        }
    }

    #[test]
    fn test_assign_returns_value() {
        let mut b = ExpressionBuilder::new();
        let target = b.variable("total");
        let one = b.constant(1);
        let two = b.constant(2);
        let sum = b.binary(OperatorKind::Add, one, two);
        let assign = b.assign(target, sum);
        let expression = b.build(assign).unwrap();

        let mut ctx = context();
        assert_eq!(evaluate(&expression, &mut ctx, Value::Null).unwrap(), Value::Int(3));
        assert_eq!(ctx.variable("total"), Value::Int(3));
    }

    #[test]
    fn test_frames_balance_on_failure() {
        let mut b = ExpressionBuilder::new();
        let name = b.property("name");
        let nope = b.method("nope", []);
        let chain = b.sequence([name, nope]);
        let expression = b.build(chain).unwrap();

        let mut ctx = context();
        ctx.set_trace_evaluations(true);
        ctx.set_keep_last_evaluation(true);
        let root = Value::map([("name", Value::from("Ann"))]);
        assert!(evaluate(&expression, &mut ctx, root).unwrap_err().is_no_such_member());

        assert_eq!(ctx.push_count(), ctx.pop_count());
        assert_eq!(ctx.stack_depth(), 0);
        let last = ctx.last_evaluation().expect("trace kept");
        assert!(last.error().is_some());
        assert_eq!(last.children().len(), 2);
    }
}
