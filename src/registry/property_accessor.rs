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

//! Dynamic property access for container classes
//!
//! Lists, maps and arrays have no fixed property set: their "properties"
//! are keys and indices. A [`PropertyAccessor`] on a class descriptor is
//! consulted before declared properties and bean methods.

use crate::error::{OgnlError, Result};
use crate::model::{TypeCoercion, TypeHierarchy, TypeRef, Value};

/// Key-driven property access
pub trait PropertyAccessor: Send + Sync {
    /// Read `key` from `target`; `Ok(None)` leaves the key to declared members
    fn get(&self, target: &Value, key: &Value) -> Result<Option<Value>>;

    /// Whether [`PropertyAccessor::set`] takes over writes of `key`
    fn handles_set(&self, target: &Value, key: &Value) -> bool;

    /// Write `key`; `Ok(false)` leaves the key to declared members
    fn set(&self, target: &Value, key: &Value, value: Value, hierarchy: &dyn TypeHierarchy) -> Result<bool>;
}

/// Integral index carried by a key, if any
fn index_of(key: &Value) -> Option<i64> {
    match key {
        Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::BigInteger(_) => {
            TypeCoercion::long_value(key).ok()
        }
        _ => None,
    }
}

fn checked_index(index: i64, length: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < length)
        .ok_or_else(|| OgnlError::index_out_of_bounds(index, length))
}

/// Map keys read as properties; `size`, `isEmpty`, `keys` and `values`
/// apply only when no entry with that key exists
#[derive(Debug, Default, Clone, Copy)]
pub struct MapAccessor;

impl PropertyAccessor for MapAccessor {
    fn get(&self, target: &Value, key: &Value) -> Result<Option<Value>> {
        let Value::Map(map) = target else {
            return Ok(None);
        };
        let key = TypeCoercion::string_value(key);
        let map = map.read();
        if let Some(value) = map.get(&key) {
            return Ok(Some(value.clone()));
        }
        Ok(Some(match key.as_str() {
            "size" => Value::Int(map.len() as i32),
            "isEmpty" => Value::Boolean(map.is_empty()),
            "keys" | "keySet" => Value::list(map.keys().map(|k| Value::from(k.as_str()))),
            "values" => Value::list(map.values().cloned()),
            _ => Value::Null,
        }))
    }

    fn handles_set(&self, target: &Value, _key: &Value) -> bool {
        matches!(target, Value::Map(_))
    }

    fn set(&self, target: &Value, key: &Value, value: Value, _hierarchy: &dyn TypeHierarchy) -> Result<bool> {
        let Value::Map(map) = target else {
            return Ok(false);
        };
        map.write().insert(TypeCoercion::string_value(key), value);
        Ok(true)
    }
}

/// Integral keys index the list; `size` and `isEmpty` are pseudo-properties
#[derive(Debug, Default, Clone, Copy)]
pub struct ListAccessor;

impl PropertyAccessor for ListAccessor {
    fn get(&self, target: &Value, key: &Value) -> Result<Option<Value>> {
        let Value::List(list) = target else {
            return Ok(None);
        };
        let list = list.read();
        if let Some(index) = index_of(key) {
            let index = checked_index(index, list.len())?;
            return Ok(Some(list[index].clone()));
        }
        Ok(match key.as_str() {
            Some("size") => Some(Value::Int(list.len() as i32)),
            Some("isEmpty") => Some(Value::Boolean(list.is_empty())),
            _ => None,
        })
    }

    fn handles_set(&self, target: &Value, key: &Value) -> bool {
        matches!(target, Value::List(_)) && index_of(key).is_some()
    }

    fn set(&self, target: &Value, key: &Value, value: Value, _hierarchy: &dyn TypeHierarchy) -> Result<bool> {
        let (Value::List(list), Some(index)) = (target, index_of(key)) else {
            return Ok(false);
        };
        let mut list = list.write();
        let index = checked_index(index, list.len())?;
        list[index] = value;
        Ok(true)
    }
}

/// Integral keys index the array; `length` is a pseudo-property
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayAccessor;

impl PropertyAccessor for ArrayAccessor {
    fn get(&self, target: &Value, key: &Value) -> Result<Option<Value>> {
        let Value::Array(array) = target else {
            return Ok(None);
        };
        if let Some(index) = index_of(key) {
            let index = checked_index(index, array.len())?;
            return Ok(array.get(index));
        }
        Ok(match key.as_str() {
            Some("length") => Some(Value::Int(array.len() as i32)),
            _ => None,
        })
    }

    fn handles_set(&self, target: &Value, key: &Value) -> bool {
        matches!(target, Value::Array(_)) && index_of(key).is_some()
    }

    fn set(&self, target: &Value, key: &Value, value: Value, hierarchy: &dyn TypeHierarchy) -> Result<bool> {
        let (Value::Array(array), Some(index)) = (target, index_of(key)) else {
            return Ok(false);
        };
        let index = checked_index(index, array.len())?;
        let element: &TypeRef = array.element_type();
        let converted = TypeCoercion::coerce(&value, element, hierarchy)?;
        Ok(array.set(index, converted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuiltinHierarchy, PrimitiveKind};

    #[test]
    fn test_map_keys_shadow_pseudo_properties() {
        let map = Value::map([("size", Value::from("large")), ("a", Value::Int(1))]);
        assert_eq!(MapAccessor.get(&map, &Value::from("size")).unwrap(), Some(Value::from("large")));
        assert_eq!(MapAccessor.get(&map, &Value::from("isEmpty")).unwrap(), Some(Value::Boolean(false)));
        assert_eq!(MapAccessor.get(&map, &Value::from("missing")).unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_list_bounds() {
        let list = Value::list([Value::from("x"), Value::from("y")]);
        assert_eq!(ListAccessor.get(&list, &Value::Int(1)).unwrap(), Some(Value::from("y")));
        assert!(ListAccessor.get(&list, &Value::Int(2)).is_err());
        assert!(ListAccessor.get(&list, &Value::Int(-1)).is_err());
        assert_eq!(ListAccessor.get(&list, &Value::from("name")).unwrap(), None);
    }

    #[test]
    fn test_array_set_converts_element() {
        let array = Value::array(TypeRef::Primitive(PrimitiveKind::Int), [Value::Int(1), Value::Int(2)]);
        assert!(ArrayAccessor.set(&array, &Value::Int(0), Value::from("7"), &BuiltinHierarchy).unwrap());
        assert_eq!(ArrayAccessor.get(&array, &Value::Int(0)).unwrap(), Some(Value::Int(7)));
        assert_eq!(ArrayAccessor.get(&array, &Value::from("length")).unwrap(), Some(Value::Int(2)));
    }
}
