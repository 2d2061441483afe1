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

//! Per-call evaluation context
//!
//! An [`OgnlContext`] holds the mutable state of one logical evaluation:
//!
//! - **Root**: the object graph the expression runs against; `#root`
//!   reads it and assigning to `#root` replaces it.
//! - **Current object / node**: where navigation currently stands.
//! - **Variables**: named values reachable as `#name`. `root` and `context`
//!   are reserved: `#context` is a map view of the variables themselves.
//! - **Type tracking**: the current and previous static types, updated by
//!   the source emitter so that sibling fragments compose with the right
//!   casts.
//! - **Evaluation stack**: frames pushed and popped around node
//!   evaluations when tracing is on.
//!
//! A context is not meant to be shared between threads; expressions are.

use indexmap::IndexMap;
use log::trace;
use parking_lot::RwLock;
use std::sync::Arc;

use super::evaluation::Evaluation;
use crate::ast::NodeId;
use crate::error::{OgnlError, Result};
use crate::model::{MapRef, TypeRef, Value};
use crate::registry::{ClassRegistry, MemberResolver};

/// Variable name bound to the root object
pub const ROOT_VARIABLE: &str = "root";

/// Variable name bound to the variable map
pub const CONTEXT_VARIABLE: &str = "context";

/// Mutable state of one evaluation
pub struct OgnlContext {
    resolver: Arc<MemberResolver>,
    root: Value,
    current_object: Value,
    current_node: Option<NodeId>,
    current_type: Option<TypeRef>,
    previous_type: Option<TypeRef>,
    variables: MapRef,
    trace_evaluations: bool,
    keep_last_evaluation: bool,
    evaluation_stack: Vec<Evaluation>,
    last_evaluation: Option<Evaluation>,
    pushes: usize,
    pops: usize,
}

impl OgnlContext {
    /// Context with a null root, no variables and tracing off
    pub fn new(resolver: Arc<MemberResolver>) -> Self {
        Self {
            resolver,
            root: Value::Null,
            current_object: Value::Null,
            current_node: None,
            current_type: None,
            previous_type: None,
            variables: Arc::new(RwLock::new(IndexMap::new())),
            trace_evaluations: false,
            keep_last_evaluation: false,
            evaluation_stack: Vec::new(),
            last_evaluation: None,
            pushes: 0,
            pops: 0,
        }
    }

    pub fn resolver(&self) -> &Arc<MemberResolver> {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        self.resolver.registry()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    pub fn current_object(&self) -> &Value {
        &self.current_object
    }

    pub fn set_current_object(&mut self, object: Value) {
        self.current_object = object;
    }

    pub fn current_node(&self) -> Option<NodeId> {
        self.current_node
    }

    pub fn set_current_node(&mut self, node: Option<NodeId>) {
        self.current_node = node;
    }

    /// Static type of the fragment emitted last
    pub fn current_type(&self) -> Option<&TypeRef> {
        self.current_type.as_ref()
    }

    /// Record a new current type, shifting the old one to previous
    pub fn set_current_type(&mut self, ty: Option<TypeRef>) {
        self.previous_type = std::mem::replace(&mut self.current_type, ty);
    }

    pub fn previous_type(&self) -> Option<&TypeRef> {
        self.previous_type.as_ref()
    }

    /// Value of `#name`; undefined variables are null
    pub fn variable(&self, name: &str) -> Value {
        match name {
            ROOT_VARIABLE => self.root.clone(),
            CONTEXT_VARIABLE => Value::Map(self.variables.clone()),
            _ => self.variables.read().get(name).cloned().unwrap_or_default(),
        }
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        matches!(name, ROOT_VARIABLE | CONTEXT_VARIABLE) || self.variables.read().contains_key(name)
    }

    /// Bind `#name`; the reserved names cannot be rebound
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<()> {
        if matches!(name, ROOT_VARIABLE | CONTEXT_VARIABLE) {
            return Err(OgnlError::inappropriate(format!(
                "#{name} is reserved and cannot be assigned"
            )));
        }
        self.variables.write().insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.variables.write().shift_remove(name)
    }

    /// Shared map backing `#context`
    pub fn variables(&self) -> &MapRef {
        &self.variables
    }

    pub fn trace_evaluations(&self) -> bool {
        self.trace_evaluations
    }

    pub fn set_trace_evaluations(&mut self, enabled: bool) {
        self.trace_evaluations = enabled;
    }

    pub fn keep_last_evaluation(&self) -> bool {
        self.keep_last_evaluation
    }

    pub fn set_keep_last_evaluation(&mut self, keep: bool) {
        self.keep_last_evaluation = keep;
        if !keep {
            self.last_evaluation = None;
        }
    }

    pub fn push_frame(&mut self, frame: Evaluation) {
        trace!("push frame for node {} (depth {})", frame.node(), self.evaluation_stack.len());
        self.pushes += 1;
        self.evaluation_stack.push(frame);
    }

    /// Pop the innermost frame and attach it to its parent
    ///
    /// The frame moves into the trace tree: under its parent, or into the
    /// last evaluation when it is outermost and `keep_last_evaluation` is
    /// set. Returns the node the popped frame evaluated.
    pub fn pop_frame(&mut self) -> Option<NodeId> {
        let frame = self.evaluation_stack.pop()?;
        self.pops += 1;
        let node = frame.node();
        trace!("pop frame for node {node} (depth {})", self.evaluation_stack.len());

        match self.evaluation_stack.last_mut() {
            Some(parent) => parent.add_child(frame),
            None if self.keep_last_evaluation => self.last_evaluation = Some(frame),
            None => {}
        }
        Some(node)
    }

    pub fn current_evaluation(&self) -> Option<&Evaluation> {
        self.evaluation_stack.last()
    }

    pub(crate) fn current_evaluation_mut(&mut self) -> Option<&mut Evaluation> {
        self.evaluation_stack.last_mut()
    }

    /// Outermost frame of the last traced top-level call
    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.last_evaluation.as_ref()
    }

    pub fn take_last_evaluation(&mut self) -> Option<Evaluation> {
        self.last_evaluation.take()
    }

    pub fn stack_depth(&self) -> usize {
        self.evaluation_stack.len()
    }

    /// Frames pushed since the context was created
    pub fn push_count(&self) -> usize {
        self.pushes
    }

    /// Frames popped since the context was created
    pub fn pop_count(&self) -> usize {
        self.pops
    }
}

impl std::fmt::Debug for OgnlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OgnlContext")
            .field("root", &self.root)
            .field("current_node", &self.current_node)
            .field("variables", &self.variables.read().len())
            .field("trace_evaluations", &self.trace_evaluations)
            .field("stack_depth", &self.evaluation_stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> OgnlContext {
        OgnlContext::new(Arc::new(MemberResolver::new(Arc::new(ClassRegistry::new()))))
    }

    #[test]
    fn test_reserved_variables() {
        let mut ctx = context();
        ctx.set_root(Value::from("r"));
        ctx.set_variable("user", Value::Int(1)).unwrap();

        assert_eq!(ctx.variable("root"), Value::from("r"));
        assert_eq!(ctx.variable("user"), Value::Int(1));
        assert_eq!(ctx.variable("missing"), Value::Null);
        assert!(ctx.set_variable("root", Value::Null).unwrap_err().is_inappropriate());
        assert!(ctx.set_variable("context", Value::Null).unwrap_err().is_inappropriate());

        let Value::Map(view) = ctx.variable("context") else {
            panic!("#context must be a map");
        };
        view.write().insert("added".into(), Value::Int(2));
        assert_eq!(ctx.variable("added"), Value::Int(2));
    }

    #[test]
    fn test_pop_builds_tree() {
        let mut ctx = context();
        ctx.set_keep_last_evaluation(true);
        ctx.push_frame(Evaluation::new(NodeId::new(0), Value::Null, false));
        ctx.push_frame(Evaluation::new(NodeId::new(1), Value::Null, false));
        assert_eq!(ctx.pop_frame(), Some(NodeId::new(1)));
        assert_eq!(ctx.pop_frame(), Some(NodeId::new(0)));

        let last = ctx.last_evaluation().expect("root frame kept");
        assert_eq!(last.node(), NodeId::new(0));
        assert_eq!(last.children().len(), 1);
        assert_eq!(last.size(), 2);
        assert_eq!((ctx.push_count(), ctx.pop_count()), (2, 2));
        assert!(ctx.pop_frame().is_none());
    }
}
