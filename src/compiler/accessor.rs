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

//! Compiled accessor contracts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::evaluator::OgnlContext;
use crate::model::{TypeRef, Value};

/// Executable substitute for interpreting an expression
pub trait ExpressionAccessor: Send + Sync {
    fn get(&self, ctx: &mut OgnlContext, target: &Value) -> Result<Value>;

    fn set(&self, ctx: &mut OgnlContext, target: &Value, value: Value) -> Result<()>;
}

/// Turns emitted source into an [`ExpressionAccessor`]
///
/// The engine only emits source; what executes it is up to the
/// implementation (a code generator, a cached native closure, ...).
pub trait ExpressionCompiler: Send + Sync {
    fn compile(&self, source: &AccessorSource) -> Result<Arc<dyn ExpressionAccessor>>;
}

/// Source fragments emitted for one expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessorSource {
    /// Body of the getter, an expression over `$root` and `$target`
    pub get_source: String,
    /// Body of the setter, using `$value`; `None` when the expression
    /// cannot be assigned through compiled code
    pub set_source: Option<String>,
    /// Runtime type of the sample root the source was emitted against
    pub root_type: TypeRef,
}

/// Accessor installed on an expression
#[derive(Clone)]
pub struct CompiledAccessor {
    accessor: Arc<dyn ExpressionAccessor>,
    source: AccessorSource,
}

impl CompiledAccessor {
    pub fn new(accessor: Arc<dyn ExpressionAccessor>, source: AccessorSource) -> Self {
        Self { accessor, source }
    }

    pub fn source(&self) -> &AccessorSource {
        &self.source
    }

    /// No setter source could be emitted; assignments are interpreted
    pub fn is_read_only(&self) -> bool {
        self.source.set_source.is_none()
    }

    pub fn get(&self, ctx: &mut OgnlContext, target: &Value) -> Result<Value> {
        self.accessor.get(ctx, target)
    }

    pub fn set(&self, ctx: &mut OgnlContext, target: &Value, value: Value) -> Result<()> {
        self.accessor.set(ctx, target, value)
    }
}

impl fmt::Debug for CompiledAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledAccessor")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
