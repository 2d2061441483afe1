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

//! Error types for expression evaluation and compilation

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::ast::NodeId;
use crate::model::CoercionError;

/// Shared, type-erased cause of a failed method invocation
pub type InvocationCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The category of an [`OgnlError`]
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// Malformed expression text (produced by an external parser)
    #[error("syntax error: {message}")]
    Syntax { message: String },

    /// No property, index accessor or method overload matched
    #[error("no such member '{member}' on {type_name}")]
    NoSuchMember { type_name: String, member: String },

    /// Incompatible value/type pair
    #[error(transparent)]
    Coercion(CoercionError),

    /// Set attempted on a read-only node, or a get requiring missing context
    #[error("inappropriate expression: {message}")]
    InappropriateExpression { message: String },

    /// The resolved method itself failed
    #[error("method {type_name}.{method} failed: {cause}")]
    MethodInvocationFailed {
        type_name: String,
        method: String,
        cause: InvocationCause,
    },

    /// Source emission hit a construct it cannot represent
    #[error("unsupported compilation: {message}")]
    UnsupportedCompilation { message: String },

    /// Member access on a null value in the middle of a navigation
    #[error("source is null for {operation} '{member}'")]
    NullSource { operation: String, member: String },

    /// Indexed access outside of a list or array
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    /// Integer division by zero, big integer overflow
    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },
}

/// Error raised by evaluation, assignment and compilation entry points
///
/// Carries the node on which the failure surfaced. The innermost failing
/// node wins: once attached, outer nodes leave the attachment untouched.
#[derive(Debug, Clone)]
pub struct OgnlError {
    kind: ErrorKind,
    node: Option<NodeId>,
    expression: Option<String>,
}

impl OgnlError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            node: None,
            expression: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax {
            message: message.into(),
        })
    }

    pub fn no_such_member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchMember {
            type_name: type_name.into(),
            member: member.into(),
        })
    }

    pub fn inappropriate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InappropriateExpression {
            message: message.into(),
        })
    }

    pub fn invocation_failed(
        type_name: impl Into<String>,
        method: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        let cause: Box<dyn std::error::Error + Send + Sync + 'static> = cause.into();
        Self::new(ErrorKind::MethodInvocationFailed {
            type_name: type_name.into(),
            method: method.into(),
            cause: Arc::from(cause),
        })
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedCompilation {
            message: message.into(),
        })
    }

    pub fn null_source(operation: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(ErrorKind::NullSource {
            operation: operation.into(),
            member: member.into(),
        })
    }

    pub fn index_out_of_bounds(index: i64, length: usize) -> Self {
        Self::new(ErrorKind::IndexOutOfBounds { index, length })
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arithmetic {
            message: message.into(),
        })
    }

    /// Attach the offending node unless an inner node already claimed the error
    pub fn at_node(mut self, node: NodeId, render: impl FnOnce() -> String) -> Self {
        if self.node.is_none() {
            self.node = Some(node);
            self.expression = Some(render());
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// Node the error was raised from, if any
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Rendered text of the offending node
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// The original failure behind a `MethodInvocationFailed` error
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match &self.kind {
            ErrorKind::MethodInvocationFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }

    pub fn is_no_such_member(&self) -> bool {
        matches!(self.kind, ErrorKind::NoSuchMember { .. })
    }

    pub fn is_coercion(&self) -> bool {
        matches!(self.kind, ErrorKind::Coercion(_))
    }

    pub fn is_inappropriate(&self) -> bool {
        matches!(self.kind, ErrorKind::InappropriateExpression { .. })
    }

    pub fn is_unsupported_compilation(&self) -> bool {
        matches!(self.kind, ErrorKind::UnsupportedCompilation { .. })
    }

    pub fn is_invocation_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::MethodInvocationFailed { .. })
    }
}

impl fmt::Display for OgnlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expression) => write!(f, "{} (in `{}`)", self.kind, expression),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for OgnlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::MethodInvocationFailed { cause, .. } => Some(cause.as_ref()),
            ErrorKind::Coercion(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ErrorKind> for OgnlError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<CoercionError> for OgnlError {
    fn from(error: CoercionError) -> Self {
        Self::new(ErrorKind::Coercion(error))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, OgnlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_node_wins() {
        let error = OgnlError::no_such_member("Person", "age")
            .at_node(NodeId::new(3), || "age".to_string())
            .at_node(NodeId::new(0), || "person.age".to_string());

        assert_eq!(error.node(), Some(NodeId::new(3)));
        assert_eq!(error.expression(), Some("age"));
        assert_eq!(
            error.to_string(),
            "no such member 'age' on Person (in `age`)"
        );
    }

    #[test]
    fn test_invocation_cause_is_exposed() {
        let error = OgnlError::invocation_failed("Counter", "explode", "boom");
        assert!(error.is_invocation_failure());
        assert_eq!(error.cause().map(|c| c.to_string()), Some("boom".into()));
        assert!(std::error::Error::source(&error).is_some());
    }
}
