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

//! Hooks consulted when a property read or method call yields null

use crate::model::Value;

/// Per-class strategy for null member results
///
/// Registered on a class descriptor and inherited by subclasses.
pub trait NullHandler: Send + Sync {
    /// Replacement for a null property value read from `target`
    fn null_property_value(&self, target: &Value, property: &Value) -> Value;

    /// Replacement for a null result of `target.method(args)`
    fn null_method_result(&self, target: &Value, method: &str, args: &[Value]) -> Value;
}

/// Default handler: null stays null
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughNullHandler;

impl NullHandler for PassThroughNullHandler {
    fn null_property_value(&self, _target: &Value, _property: &Value) -> Value {
        Value::Null
    }

    fn null_method_result(&self, _target: &Value, _method: &str, _args: &[Value]) -> Value {
        Value::Null
    }
}
