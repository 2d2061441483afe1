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

//! OGNL-style object graph navigation in Rust
//!
//! Evaluates pre-parsed expression trees against object graphs: property
//! chains, indexed access, method calls, operators and assignments. Members
//! are resolved at runtime through a [`ClassRegistry`] of class
//! descriptors.
//!
//! ```rust
//! use octofhir_ognl::{ExpressionBuilder, OgnlEngine, Value};
//! use serde_json::json;
//!
//! let engine = OgnlEngine::new();
//! let root = Value::from(json!({ "name": "Ann", "tags": ["x", "y"] }));
//!
//! let mut b = ExpressionBuilder::new();
//! let name = b.property("name");
//! let length = b.method("length", []);
//! let chain = b.sequence([name, length]);
//! let expression = b.build(chain).unwrap();
//!
//! assert_eq!(engine.get_value(&expression, &root).unwrap(), Value::Int(3));
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod registry;

pub use ast::{Expression, ExpressionBuilder, NodeId, NodeKind, OperatorKind};
pub use compiler::{AccessorSource, CompiledAccessor, ExpressionAccessor, ExpressionCompiler};
pub use config::EngineConfig;
pub use engine::OgnlEngine;
pub use error::{ErrorKind, OgnlError, Result};
pub use evaluator::{Evaluation, OgnlContext};
pub use model::{TypeRef, Value};
pub use registry::{ClassBuilder, ClassDescriptor, ClassRegistry, MethodSignature, NullHandler};
