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

//! Type system definitions for the object graph

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Primitive value kinds
///
/// Primitives only appear as declared parameter, property and return types.
/// Runtime values always report the boxed form of their kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Keyword name, as used in declarations (`int`, `double`, ...)
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Name of the boxed wrapper class
    pub fn wrapper_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Character",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Short => "Short",
            PrimitiveKind::Int => "Integer",
            PrimitiveKind::Long => "Long",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Double => "Double",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Boolean | PrimitiveKind::Char)
    }

    fn widening_rank(self) -> Option<u32> {
        match self {
            PrimitiveKind::Byte => Some(0),
            PrimitiveKind::Short | PrimitiveKind::Char => Some(1),
            PrimitiveKind::Int => Some(2),
            PrimitiveKind::Long => Some(3),
            PrimitiveKind::Float => Some(4),
            PrimitiveKind::Double => Some(5),
            PrimitiveKind::Boolean => None,
        }
    }

    /// Number of primitive widening steps from `self` to `target`, if allowed
    pub fn widening_distance(self, target: PrimitiveKind) -> Option<u32> {
        if self == target {
            return Some(0);
        }
        // char only widens to int and beyond; nothing widens to char
        if target == PrimitiveKind::Char || (self == PrimitiveKind::Char && target == PrimitiveKind::Short) {
            return None;
        }
        let from = self.widening_rank()?;
        let to = target.widening_rank()?;
        (to > from).then_some(to - from)
    }

    pub fn from_wrapper_name(name: &str) -> Option<Self> {
        Some(match name {
            "Boolean" => PrimitiveKind::Boolean,
            "Character" => PrimitiveKind::Char,
            "Byte" => PrimitiveKind::Byte,
            "Short" => PrimitiveKind::Short,
            "Integer" => PrimitiveKind::Int,
            "Long" => PrimitiveKind::Long,
            "Float" => PrimitiveKind::Float,
            "Double" => PrimitiveKind::Double,
            _ => return None,
        })
    }
}

/// Static or runtime type of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// Universal supertype
    Object,
    /// Supertype of boxed numerics and the big number types
    Number,
    /// Non-nullable primitive
    Primitive(PrimitiveKind),
    /// Nullable wrapper of a primitive
    Boxed(PrimitiveKind),
    BigInteger,
    BigDecimal,
    String,
    List,
    Map,
    /// Typed array
    Array(Box<TypeRef>),
    /// Class registered in the class registry
    Class(Arc<str>),
    /// Return type of methods producing no value
    Void,
}

impl TypeRef {
    pub fn class(name: impl AsRef<str>) -> Self {
        TypeRef::from_class_name(name.as_ref())
    }

    pub fn array_of(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    /// Map a registry class name back to a type
    pub fn from_class_name(name: &str) -> Self {
        if let Some(kind) = PrimitiveKind::from_wrapper_name(name) {
            return TypeRef::Boxed(kind);
        }
        match name {
            "Object" => TypeRef::Object,
            "Number" => TypeRef::Number,
            "BigInteger" => TypeRef::BigInteger,
            "BigDecimal" => TypeRef::BigDecimal,
            "String" => TypeRef::String,
            "List" => TypeRef::List,
            "Map" => TypeRef::Map,
            "Array" => TypeRef::array_of(TypeRef::Object),
            "void" => TypeRef::Void,
            other => TypeRef::Class(Arc::from(other)),
        }
    }

    /// Key of the class descriptor describing values of this type
    pub fn class_name(&self) -> &str {
        match self {
            TypeRef::Object => "Object",
            TypeRef::Number => "Number",
            TypeRef::Primitive(kind) | TypeRef::Boxed(kind) => kind.wrapper_name(),
            TypeRef::BigInteger => "BigInteger",
            TypeRef::BigDecimal => "BigDecimal",
            TypeRef::String => "String",
            TypeRef::List => "List",
            TypeRef::Map => "Map",
            TypeRef::Array(_) => "Array",
            TypeRef::Class(name) => name,
            TypeRef::Void => "void",
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeRef::Array(_))
    }

    pub fn element_type(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            TypeRef::Primitive(kind) | TypeRef::Boxed(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Replace a primitive with its wrapper type, other types are unchanged
    pub fn widen(&self) -> TypeRef {
        match self {
            TypeRef::Primitive(kind) => TypeRef::Boxed(*kind),
            other => other.clone(),
        }
    }

    /// Superclass of the built-in types; registered classes need a hierarchy
    pub fn builtin_superclass(&self) -> Option<TypeRef> {
        match self {
            TypeRef::Object | TypeRef::Primitive(_) | TypeRef::Void | TypeRef::Class(_) => None,
            TypeRef::Boxed(kind) if kind.is_numeric() => Some(TypeRef::Number),
            TypeRef::BigInteger | TypeRef::BigDecimal => Some(TypeRef::Number),
            _ => Some(TypeRef::Object),
        }
    }

    /// Walk from `self` up to `Object`, `self` included
    pub fn ancestors(&self, hierarchy: &dyn TypeHierarchy) -> Vec<TypeRef> {
        let mut chain = vec![self.widen()];
        while let Some(parent) = chain.last().and_then(|t| hierarchy.superclass_of(t)) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
        }
        chain
    }

    /// Reference assignability, including boxing and unboxing of the same kind
    pub fn is_assignable_from(&self, other: &TypeRef, hierarchy: &dyn TypeHierarchy) -> bool {
        self.assignment_distance(Some(other), hierarchy).is_some()
    }

    /// Cost of passing a value of type `arg` where `self` is declared
    ///
    /// `None` for `arg` stands for the null value. Lower is more specific:
    /// identity is 0, boxing 1, primitive widening 2..=7, and every
    /// superclass step costs 10.
    pub fn assignment_distance(
        &self,
        arg: Option<&TypeRef>,
        hierarchy: &dyn TypeHierarchy,
    ) -> Option<u32> {
        let Some(arg) = arg else {
            return match self {
                TypeRef::Primitive(_) => None,
                TypeRef::Object => Some(20),
                _ => Some(1),
            };
        };

        if self == arg {
            return Some(0);
        }

        match (self, arg) {
            (TypeRef::Primitive(p), TypeRef::Boxed(a)) | (TypeRef::Boxed(p), TypeRef::Primitive(a))
                if p == a =>
            {
                Some(1)
            }
            (TypeRef::Primitive(p), TypeRef::Boxed(a) | TypeRef::Primitive(a)) => {
                a.widening_distance(*p).map(|steps| 2 + steps)
            }
            (TypeRef::Primitive(_), _) => None,
            (_, TypeRef::Primitive(a)) => self
                .assignment_distance(Some(&TypeRef::Boxed(*a)), hierarchy)
                .map(|d| d + 1),
            (TypeRef::Array(p), TypeRef::Array(a)) => {
                if p.is_primitive() || a.is_primitive() {
                    None
                } else {
                    p.assignment_distance(Some(a), hierarchy)
                }
            }
            _ => arg
                .ancestors(hierarchy)
                .iter()
                .position(|ancestor| ancestor == self)
                .map(|depth| depth as u32 * 10),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(kind) => write!(f, "{}", kind.name()),
            TypeRef::Array(element) => write!(f, "{element}[]"),
            other => write!(f, "{}", other.class_name()),
        }
    }
}

/// Superclass lookup used for assignability and least-upper-bound searches
pub trait TypeHierarchy {
    fn superclass_of(&self, ty: &TypeRef) -> Option<TypeRef>;
}

/// Hierarchy knowing only the built-in types; registered classes extend `Object`
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinHierarchy;

impl TypeHierarchy for BuiltinHierarchy {
    fn superclass_of(&self, ty: &TypeRef) -> Option<TypeRef> {
        match ty {
            TypeRef::Class(_) => Some(TypeRef::Object),
            other => other.builtin_superclass(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxing_and_widening_distances() {
        let h = BuiltinHierarchy;
        let int = TypeRef::Primitive(PrimitiveKind::Int);
        let long = TypeRef::Primitive(PrimitiveKind::Long);
        let boxed_int = TypeRef::Boxed(PrimitiveKind::Int);

        assert_eq!(int.assignment_distance(Some(&boxed_int), &h), Some(1));
        assert_eq!(long.assignment_distance(Some(&boxed_int), &h), Some(3));
        assert_eq!(int.assignment_distance(Some(&TypeRef::Boxed(PrimitiveKind::Long)), &h), None);
        assert_eq!(int.assignment_distance(None, &h), None);
    }

    #[test]
    fn test_superclass_distances() {
        let h = BuiltinHierarchy;
        let boxed_int = TypeRef::Boxed(PrimitiveKind::Int);

        assert_eq!(TypeRef::Number.assignment_distance(Some(&boxed_int), &h), Some(10));
        assert_eq!(TypeRef::Object.assignment_distance(Some(&boxed_int), &h), Some(20));
        assert!(!TypeRef::String.is_assignable_from(&boxed_int, &h));
        assert!(TypeRef::Object.is_assignable_from(&TypeRef::class("Person"), &h));
    }

    #[test]
    fn test_class_name_round_trip() {
        for name in ["Integer", "String", "Map", "List", "Person", "Number"] {
            assert_eq!(TypeRef::from_class_name(name).class_name(), name);
        }
        assert_eq!(TypeRef::array_of(TypeRef::String).to_string(), "String[]");
        assert_eq!(TypeRef::Primitive(PrimitiveKind::Int).to_string(), "int");
    }
}
