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

//! Evaluation frames and the scoped guard that pushes and pops them
//!
//! When tracing is enabled every node evaluation runs inside a
//! [`FrameGuard`]. The guard pushes an [`Evaluation`] on creation and pops
//! it when dropped, so the frame stack stays balanced on every exit path,
//! including early returns through `?`. Popped frames are attached to their
//! parent frame, forming a tree that mirrors the evaluated nodes.

use std::ops::{Deref, DerefMut};

use super::context::OgnlContext;
use crate::ast::NodeId;
use crate::error::{OgnlError, Result};
use crate::model::Value;

/// One traced node evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    node: NodeId,
    source: Value,
    is_set: bool,
    result: Option<Value>,
    error: Option<OgnlError>,
    children: Vec<Evaluation>,
}

impl Evaluation {
    pub(crate) fn new(node: NodeId, source: Value, is_set: bool) -> Self {
        Self {
            node,
            source,
            is_set,
            result: None,
            error: None,
            children: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Object the node was evaluated against
    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn is_set_operation(&self) -> bool {
        self.is_set
    }

    /// Value produced by a successful get
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&OgnlError> {
        self.error.as_ref()
    }

    /// Nested evaluations, in completion order
    pub fn children(&self) -> &[Evaluation] {
        &self.children
    }

    pub(crate) fn add_child(&mut self, child: Evaluation) {
        self.children.push(child);
    }

    /// Number of evaluations in this subtree, `self` included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Evaluation::size).sum::<usize>()
    }
}

/// Scoped evaluation frame
///
/// Dereferences to the [`OgnlContext`] it borrows. A frame is pushed only
/// when the context traces evaluations; the guard remembers whether it did
/// so that toggling tracing mid-evaluation cannot unbalance the stack.
pub struct FrameGuard<'a> {
    context: &'a mut OgnlContext,
    pushed: bool,
}

impl<'a> FrameGuard<'a> {
    pub fn enter(context: &'a mut OgnlContext, node: NodeId, source: &Value, is_set: bool) -> Self {
        let pushed = context.trace_evaluations();
        if pushed {
            context.push_frame(Evaluation::new(node, source.clone(), is_set));
        }
        Self { context, pushed }
    }

    /// Record the outcome of a get on the guarded frame
    pub fn complete_get(&mut self, outcome: &Result<Value>) {
        if !self.pushed {
            return;
        }
        if let Some(frame) = self.context.current_evaluation_mut() {
            match outcome {
                Ok(value) => frame.result = Some(value.clone()),
                Err(error) => frame.error = Some(error.clone()),
            }
        }
    }

    /// Record the outcome of a set on the guarded frame
    pub fn complete_set(&mut self, outcome: &Result<()>) {
        if !self.pushed {
            return;
        }
        if let (Some(frame), Err(error)) = (self.context.current_evaluation_mut(), outcome) {
            frame.error = Some(error.clone());
        }
    }
}

impl Deref for FrameGuard<'_> {
    type Target = OgnlContext;

    fn deref(&self) -> &OgnlContext {
        self.context
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut OgnlContext {
        self.context
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if self.pushed {
            self.context.pop_frame();
        }
    }
}
