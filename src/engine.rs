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

//! OGNL engine - the main entry point for evaluating expressions

use log::debug;
use std::sync::Arc;

use crate::ast::Expression;
use crate::compiler::{CompiledAccessor, ExpressionCompiler, SourceEmitter};
use crate::config::EngineConfig;
use crate::error::{OgnlError, Result};
use crate::evaluator::{Interpreter, OgnlContext};
use crate::model::Value;
use crate::registry::{ClassRegistry, MemberResolver};

/// Evaluates expressions against object graphs
///
/// The engine is cheap to clone and can be shared between threads; each
/// evaluation runs in its own [`OgnlContext`].
#[derive(Clone)]
pub struct OgnlEngine {
    resolver: Arc<MemberResolver>,
    config: EngineConfig,
    compiler: Option<Arc<dyn ExpressionCompiler>>,
}

impl Default for OgnlEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OgnlEngine {
    /// Engine with the built-in classes and default configuration
    pub fn new() -> Self {
        Self::with_config(Arc::new(ClassRegistry::new()), EngineConfig::default())
    }

    /// Engine resolving members through `registry`
    pub fn with_registry(registry: Arc<ClassRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<ClassRegistry>, config: EngineConfig) -> Self {
        let resolver = if config.enable_resolution_cache {
            MemberResolver::with_cache(registry, config.max_resolution_cache_size)
        } else {
            MemberResolver::new(registry)
        };
        Self {
            resolver: Arc::new(resolver),
            config,
            compiler: None,
        }
    }

    /// Use `compiler` to turn emitted accessor source into executable code
    pub fn with_compiler(mut self, compiler: Arc<dyn ExpressionCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &Arc<MemberResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh context carrying the configured tracing toggles
    pub fn create_context(&self) -> OgnlContext {
        let mut ctx = OgnlContext::new(self.resolver.clone());
        ctx.set_trace_evaluations(self.config.trace_evaluations);
        ctx.set_keep_last_evaluation(self.config.keep_last_evaluation);
        ctx
    }

    /// Evaluate `expression` against `root` in `ctx`
    ///
    /// Uses the compiled accessor when one is installed on the expression.
    pub fn evaluate_get(&self, expression: &Expression, ctx: &mut OgnlContext, root: &Value) -> Result<Value> {
        ctx.set_root(root.clone());
        if let Some(accessor) = expression.compiled_accessor() {
            return accessor.get(ctx, root);
        }
        Interpreter::new(expression).get_value(ctx, expression.root(), root)
    }

    /// Assign `value` through `expression` starting from `root`
    ///
    /// Read-only compiled accessors fall back to interpretation.
    pub fn evaluate_set(
        &self,
        expression: &Expression,
        ctx: &mut OgnlContext,
        root: &Value,
        value: Value,
    ) -> Result<()> {
        ctx.set_root(root.clone());
        match expression.compiled_accessor() {
            Some(accessor) if !accessor.is_read_only() => accessor.set(ctx, root, value),
            _ => Interpreter::new(expression).set_value(ctx, expression.root(), root, value),
        }
    }

    /// Evaluate in a fresh context
    pub fn get_value(&self, expression: &Expression, root: &Value) -> Result<Value> {
        let mut ctx = self.create_context();
        self.evaluate_get(expression, &mut ctx, root)
    }

    /// Assign in a fresh context
    pub fn set_value(&self, expression: &Expression, root: &Value, value: Value) -> Result<()> {
        let mut ctx = self.create_context();
        self.evaluate_set(expression, &mut ctx, root, value)
    }

    /// Compile `expression` into an accessor and install it
    ///
    /// Source is emitted against `sample_root`, running the getters and
    /// methods the expression reaches. Compiling an expression that
    /// already carries an accessor returns the installed one.
    pub fn compile<'x>(&self, expression: &'x Expression, sample_root: &Value) -> Result<&'x CompiledAccessor> {
        if let Some(installed) = expression.compiled_accessor() {
            return Ok(installed);
        }
        let compiler = self
            .compiler
            .as_ref()
            .ok_or_else(|| OgnlError::unsupported("no expression compiler configured"))?;

        let mut ctx = self.create_context();
        let source = SourceEmitter::new(expression).emit(&mut ctx, sample_root)?;
        let accessor = compiler.compile(&source)?;
        debug!(
            "compiled {expression}: get `{}`, set `{}`",
            source.get_source,
            source.set_source.as_deref().unwrap_or("<read-only>")
        );
        Ok(expression.install_accessor(expression.root(), CompiledAccessor::new(accessor, source)))
    }
}

impl std::fmt::Debug for OgnlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OgnlEngine")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .field("compiler", &self.compiler.is_some())
            .finish()
    }
}
