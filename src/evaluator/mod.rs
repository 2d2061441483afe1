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

//! Expression evaluation
//!
//! Interprets an [`Expression`](crate::ast::Expression) against a root
//! object within an [`OgnlContext`], optionally recording an
//! [`Evaluation`] tree of every node visited.

mod context;
mod evaluation;
mod interpreter;
pub mod operations;

pub use context::{CONTEXT_VARIABLE, OgnlContext, ROOT_VARIABLE};
pub use evaluation::{Evaluation, FrameGuard};
pub use interpreter::Interpreter;
pub use operations::NumericType;
