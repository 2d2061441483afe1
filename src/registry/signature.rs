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

//! Method signatures for overload resolution

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{TypeCoercion, TypeHierarchy, TypeRef, Value};

/// Declared shape of a method overload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Method name
    pub name: String,
    /// Parameter types; for a variadic method the last entry is the element
    /// type of the trailing arguments
    pub parameters: Vec<TypeRef>,
    /// Return type
    pub return_type: TypeRef,
    /// Whether the last parameter accepts any number of arguments
    pub variadic: bool,
}

impl MethodSignature {
    /// Create a fixed-arity signature
    pub fn new(name: impl Into<String>, parameters: Vec<TypeRef>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            parameters,
            return_type,
            variadic: false,
        }
    }

    /// Create a variadic signature; `parameters` must not be empty
    pub fn variadic(name: impl Into<String>, parameters: Vec<TypeRef>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            variadic: !parameters.is_empty(),
            parameters,
            return_type,
        }
    }

    /// Number of leading, individually typed parameters
    pub fn fixed_arity(&self) -> usize {
        if self.variadic {
            self.parameters.len() - 1
        } else {
            self.parameters.len()
        }
    }

    /// Check whether `count` arguments can be passed
    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.fixed_arity()
        } else {
            count == self.parameters.len()
        }
    }

    /// Declared type of the parameter receiving argument `index`
    pub fn parameter_for(&self, index: usize) -> Option<&TypeRef> {
        if self.variadic && index >= self.fixed_arity() {
            self.parameters.last()
        } else {
            self.parameters.get(index)
        }
    }

    /// Sum of assignment distances for the given argument types
    ///
    /// `None` entries stand for null arguments. Returns `None` when any
    /// argument is not directly assignable to its parameter.
    pub fn match_cost(&self, args: &[Option<TypeRef>], hierarchy: &dyn TypeHierarchy) -> Option<u32> {
        if !self.accepts_arity(args.len()) {
            return None;
        }
        args.iter().enumerate().try_fold(0u32, |total, (i, arg)| {
            let parameter = self.parameter_for(i)?;
            parameter
                .assignment_distance(arg.as_ref(), hierarchy)
                .map(|distance| total + distance)
        })
    }

    /// Check whether every argument converts to its parameter type
    pub fn accepts_with_conversion(&self, args: &[Value], hierarchy: &dyn TypeHierarchy) -> bool {
        !self.variadic
            && args.len() == self.parameters.len()
            && args
                .iter()
                .zip(&self.parameters)
                .all(|(arg, parameter)| TypeCoercion::coerce(arg, parameter, hierarchy).is_ok())
    }

    /// Whether any declared parameter is primitive or an array
    pub fn needs_conversion(&self) -> bool {
        self.parameters.iter().any(|p| p.is_primitive() || p.is_array())
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{parameter}")?;
            if self.variadic && i + 1 == self.parameters.len() {
                write!(f, "...")?;
            }
        }
        write!(f, ") -> {}", self.return_type)
    }
}
