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

//! Core value types for the object graph

use indexmap::IndexMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::types::{PrimitiveKind, TypeRef};

/// Shared, mutable list
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// Shared, mutable map with insertion-ordered string keys
pub type MapRef = Arc<RwLock<IndexMap<String, Value>>>;

/// Shared instance of a registered class
pub type ObjectRef = Arc<Instance>;

/// Value produced and consumed by expressions
///
/// Scalars are held inline. Lists, maps, arrays and objects are shared
/// references, so navigating into them and assigning through them mutates
/// the caller's object graph.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    BigInteger(i128),
    Float(f32),
    Double(f64),
    BigDecimal(Decimal),
    String(String),
    List(ListRef),
    Map(MapRef),
    Array(Arc<ArrayValue>),
    Object(ObjectRef),
}

/// Fixed-length array with a declared element type
pub struct ArrayValue {
    element_type: TypeRef,
    items: RwLock<Vec<Value>>,
}

impl ArrayValue {
    pub fn new(element_type: TypeRef, items: Vec<Value>) -> Self {
        Self {
            element_type,
            items: RwLock::new(items),
        }
    }

    pub fn element_type(&self) -> &TypeRef {
        &self.element_type
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    /// Replace the element at `index`, returning false when out of bounds
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }
}

/// Instance of a registered class: a class name plus type-erased state
pub struct Instance {
    class: Arc<str>,
    state: RwLock<Box<dyn Any + Send + Sync>>,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(class: impl Into<Arc<str>>, state: T) -> Self {
        Self {
            class: class.into(),
            state: RwLock::new(Box::new(state)),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn class(&self) -> &Arc<str> {
        &self.class
    }

    /// Borrow the state as `T`; `None` when the instance holds another type
    pub fn with_state<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.read();
        state.downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the state as `T`
    pub fn with_state_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut state = self.state.write();
        state.downcast_mut::<T>().map(f)
    }
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(RwLock::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn empty_map() -> Self {
        Value::Map(Arc::new(RwLock::new(IndexMap::new())))
    }

    pub fn array(element_type: TypeRef, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(ArrayValue::new(
            element_type,
            items.into_iter().collect(),
        )))
    }

    /// Wrap `state` as an instance of the registered class `class`
    pub fn object<T: Any + Send + Sync>(class: impl Into<Arc<str>>, state: T) -> Self {
        Value::Object(Arc::new(Instance::new(class, state)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Registry key of this value's class; `"null"` for the null value
    pub fn class_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "Boolean",
            Value::Char(_) => "Character",
            Value::Byte(_) => "Byte",
            Value::Short(_) => "Short",
            Value::Int(_) => "Integer",
            Value::Long(_) => "Long",
            Value::BigInteger(_) => "BigInteger",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::BigDecimal(_) => "BigDecimal",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Array(_) => "Array",
            Value::Object(object) => object.class_name(),
        }
    }

    /// Runtime type of the value, `None` for null
    pub fn runtime_type(&self) -> Option<TypeRef> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(_) => TypeRef::Boxed(PrimitiveKind::Boolean),
            Value::Char(_) => TypeRef::Boxed(PrimitiveKind::Char),
            Value::Byte(_) => TypeRef::Boxed(PrimitiveKind::Byte),
            Value::Short(_) => TypeRef::Boxed(PrimitiveKind::Short),
            Value::Int(_) => TypeRef::Boxed(PrimitiveKind::Int),
            Value::Long(_) => TypeRef::Boxed(PrimitiveKind::Long),
            Value::BigInteger(_) => TypeRef::BigInteger,
            Value::Float(_) => TypeRef::Boxed(PrimitiveKind::Float),
            Value::Double(_) => TypeRef::Boxed(PrimitiveKind::Double),
            Value::BigDecimal(_) => TypeRef::BigDecimal,
            Value::String(_) => TypeRef::String,
            Value::List(_) => TypeRef::List,
            Value::Map(_) => TypeRef::Map,
            Value::Array(array) => TypeRef::array_of(array.element_type().clone()),
            Value::Object(object) => TypeRef::Class(object.class().clone()),
        })
    }

    /// Elements of a list or array, `None` for anything else
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.read().clone()),
            Value::Array(array) => Some(array.to_vec()),
            _ => None,
        }
    }
}

fn format_real(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        write!(f, "{value:.1}")
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Short(n) => write!(f, "{n}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::BigInteger(n) => write!(f, "{n}"),
            Value::Float(n) => format_real(f, f64::from(*n)),
            Value::Double(n) => format_real(f, *n),
            Value::BigDecimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(list) => write_sequence(f, &list.read_recursive()),
            Value::Array(array) => write_sequence(f, &array.items.read_recursive()),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.read_recursive().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                write!(f, "}}")
            }
            Value::Object(object) => {
                write!(f, "{}@{:x}", object.class_name(), Arc::as_ptr(object) as usize)
            }
        }
    }
}

fn write_sequence(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::Null => write!(f, "null"),
            other => write!(f, "{}({other})", other.class_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::BigInteger(a), Value::BigInteger(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::BigDecimal(a), Value::BigDecimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            // Recursive reads: a receiver locked by a built-in method may be compared against itself
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b) || *a.read_recursive() == *b.read_recursive()
            }
            (Value::Map(a), Value::Map(b)) => {
                Arc::ptr_eq(a, b) || *a.read_recursive() == *b.read_recursive()
            }
            (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.element_type == b.element_type
                        && *a.items.read_recursive() == *b.items.read_recursive())
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::Char(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::BigDecimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::list(values)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i).map_or(Value::Long(i), Value::Int)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from)),
            serde_json::Value::Object(entries) => {
                Value::map(entries.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let value = Value::from(json!({"name": "Ann", "tags": ["x", "y"], "age": 41, "ratio": 0.5}));
        let Value::Map(map) = &value else {
            panic!("expected map, got {value:?}");
        };
        let map = map.read();
        assert_eq!(map.get("name"), Some(&Value::string("Ann")));
        assert_eq!(map.get("age"), Some(&Value::Int(41)));
        assert_eq!(map.get("ratio"), Some(&Value::Double(0.5)));
        assert_eq!(
            map.get("tags"),
            Some(&Value::list([Value::from("x"), Value::from("y")]))
        );
    }

    #[test]
    fn test_display_matches_string_conversion_rules() {
        assert_eq!(Value::Double(1.0).to_string(), "1.0");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::list([Value::Int(1), Value::from("a")]).to_string(),
            "[1, a]"
        );
        assert_eq!(Value::map([("k", Value::Int(1))]).to_string(), "{k=1}");
    }

    #[test]
    fn test_object_state_access() {
        struct Counter {
            hits: u32,
        }

        let value = Value::object("Counter", Counter { hits: 0 });
        let object = value.as_object().expect("object");
        object.with_state_mut(|c: &mut Counter| c.hits += 2);
        assert_eq!(object.with_state(|c: &Counter| c.hits), Some(2));
        assert_eq!(object.with_state(|s: &String| s.len()), None);
        assert_eq!(value.runtime_type(), Some(TypeRef::class("Counter")));
    }
}
