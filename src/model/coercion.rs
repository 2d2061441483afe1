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

//! Value coercion and conversion rules
//!
//! Numeric narrowing follows two's-complement rules, per pair:
//!
//! - `long` to `int`/`short`/`byte`: keep the low-order bits (wraps).
//! - `double`/`float` to any integral type: truncate toward zero into a
//!   `long`, saturating at the `long` range (`NaN` becomes 0), then wrap.
//! - `double` to `float`: round to nearest, overflow becomes infinity.
//! - big integer to `long`: keep the low-order 64 bits.
//! - big decimal to an integral type: truncate toward zero; values outside
//!   the `long` range are a [`CoercionError`].
//! - integral to `char`: keep the low-order 16 bits; surrogate code units
//!   are a [`CoercionError`].
//!
//! Every other incompatible pair is a [`CoercionError`]; nothing else is
//! silently truncated.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::str::FromStr;
use thiserror::Error;

use super::types::{PrimitiveKind, TypeHierarchy, TypeRef};
use super::value::Value;

/// Result type for type coercion operations
pub type CoercionResult<T> = Result<T, CoercionError>;

/// A value could not be converted to the requested type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} ({source_type}) to {target_type}{}", reason_suffix(.reason))]
pub struct CoercionError {
    /// Rendered source value
    pub value: String,
    /// Runtime type of the source value
    pub source_type: String,
    /// Requested target type
    pub target_type: String,
    /// Extra detail, e.g. a parse failure
    pub reason: Option<String>,
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl CoercionError {
    pub fn new(value: &Value, target: impl ToString) -> Self {
        Self {
            value: value.to_string(),
            source_type: value.class_name().to_string(),
            target_type: target.to_string(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Type coercion utility for object graph values
pub struct TypeCoercion;

impl TypeCoercion {
    /// Convert `value` so that it can be stored in a slot declared as `target`
    ///
    /// Null converts to the default value of a primitive target and stays
    /// null for every reference target.
    pub fn coerce(
        value: &Value,
        target: &TypeRef,
        hierarchy: &dyn TypeHierarchy,
    ) -> CoercionResult<Value> {
        match target {
            TypeRef::Object => Ok(value.clone()),
            TypeRef::Void => Err(CoercionError::new(value, target)),
            TypeRef::Primitive(kind) => Self::coerce_to_primitive(value, *kind),
            _ if value.is_null() => Ok(Value::Null),
            TypeRef::Boxed(kind) => Self::coerce_to_primitive(value, *kind),
            TypeRef::Number => match value {
                Value::Byte(_)
                | Value::Short(_)
                | Value::Int(_)
                | Value::Long(_)
                | Value::BigInteger(_)
                | Value::Float(_)
                | Value::Double(_)
                | Value::BigDecimal(_) => Ok(value.clone()),
                _ => Err(CoercionError::new(value, target)),
            },
            TypeRef::BigInteger => Self::big_integer_value(value).map(Value::BigInteger),
            TypeRef::BigDecimal => Self::big_decimal_value(value).map(Value::BigDecimal),
            TypeRef::String => Ok(Value::String(Self::string_value(value))),
            TypeRef::Array(element) => Self::to_array(value, element, hierarchy),
            TypeRef::List => match value {
                Value::List(_) => Ok(value.clone()),
                Value::Array(array) => Ok(Value::list(array.to_vec())),
                _ => Err(CoercionError::new(value, target)),
            },
            TypeRef::Map => match value {
                Value::Map(_) => Ok(value.clone()),
                _ => Err(CoercionError::new(value, target)),
            },
            TypeRef::Class(_) => match value.runtime_type() {
                Some(actual) if target.is_assignable_from(&actual, hierarchy) => Ok(value.clone()),
                _ => Err(CoercionError::new(value, target)),
            },
        }
    }

    /// Convert to the given primitive kind, boxed in a [`Value`]
    pub fn coerce_to_primitive(value: &Value, kind: PrimitiveKind) -> CoercionResult<Value> {
        Ok(match kind {
            PrimitiveKind::Boolean => Value::Boolean(Self::boolean_value(value)),
            PrimitiveKind::Char => Value::Char(Self::char_value(value)?),
            PrimitiveKind::Byte => Value::Byte(Self::long_value(value)? as i8),
            PrimitiveKind::Short => Value::Short(Self::long_value(value)? as i16),
            PrimitiveKind::Int => Value::Int(Self::long_value(value)? as i32),
            PrimitiveKind::Long => Value::Long(Self::long_value(value)?),
            PrimitiveKind::Float => Value::Float(Self::double_value(value)? as f32),
            PrimitiveKind::Double => Value::Double(Self::double_value(value)?),
        })
    }

    /// Replace a primitive type with its wrapper
    pub fn widen(ty: &TypeRef) -> TypeRef {
        ty.widen()
    }

    /// Least upper bound of `candidates`
    ///
    /// Keeps the current best while it accepts the next candidate, switches to
    /// the candidate when that accepts the current best, and otherwise climbs
    /// the current best's superclass chain until an ancestor accepts both.
    /// Falls back to `Object`.
    pub fn best_matching_type(candidates: &[TypeRef], hierarchy: &dyn TypeHierarchy) -> TypeRef {
        let mut widened = candidates.iter().map(TypeRef::widen);
        let Some(mut best) = widened.next() else {
            return TypeRef::Object;
        };

        for candidate in widened {
            if best.is_assignable_from(&candidate, hierarchy) {
                continue;
            }
            if candidate.is_assignable_from(&best, hierarchy) {
                best = candidate;
                continue;
            }
            best = best
                .ancestors(hierarchy)
                .into_iter()
                .skip(1)
                .find(|ancestor| ancestor.is_assignable_from(&candidate, hierarchy))
                .unwrap_or(TypeRef::Object);
        }

        best
    }

    /// Truthiness: null is false, numbers are true unless zero, strings parse
    /// `"true"` case-insensitively, every other value is true
    pub fn boolean_value(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Char(c) => *c != '\0',
            Value::Byte(n) => *n != 0,
            Value::Short(n) => *n != 0,
            Value::Int(n) => *n != 0,
            Value::Long(n) => *n != 0,
            Value::BigInteger(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Double(n) => *n != 0.0,
            Value::BigDecimal(d) => !d.is_zero(),
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            _ => true,
        }
    }

    pub fn long_value(value: &Value) -> CoercionResult<i64> {
        match value {
            Value::Boolean(b) => Ok(i64::from(*b)),
            Value::Char(c) => Ok(i64::from(u32::from(*c))),
            Value::Byte(n) => Ok(i64::from(*n)),
            Value::Short(n) => Ok(i64::from(*n)),
            Value::Int(n) => Ok(i64::from(*n)),
            Value::Long(n) => Ok(*n),
            Value::BigInteger(n) => Ok(*n as i64),
            Value::Float(n) => Ok(*n as i64),
            Value::Double(n) => Ok(*n as i64),
            Value::BigDecimal(d) => d
                .trunc()
                .to_i64()
                .ok_or_else(|| CoercionError::new(value, "long").with_reason("out of range")),
            Value::String(s) => s.trim().parse::<i64>().map_err(|e| {
                CoercionError::new(value, "long").with_reason(e.to_string())
            }),
            _ => Err(CoercionError::new(value, "long")),
        }
    }

    pub fn double_value(value: &Value) -> CoercionResult<f64> {
        match value {
            Value::Float(n) => Ok(f64::from(*n)),
            Value::Double(n) => Ok(*n),
            Value::BigInteger(n) => Ok(*n as f64),
            Value::BigDecimal(d) => d
                .to_f64()
                .ok_or_else(|| CoercionError::new(value, "double")),
            Value::String(s) => s.trim().parse::<f64>().map_err(|e| {
                CoercionError::new(value, "double").with_reason(e.to_string())
            }),
            Value::Boolean(_)
            | Value::Char(_)
            | Value::Byte(_)
            | Value::Short(_)
            | Value::Int(_)
            | Value::Long(_) => Self::long_value(value).map(|n| n as f64),
            _ => Err(CoercionError::new(value, "double")),
        }
    }

    pub fn big_integer_value(value: &Value) -> CoercionResult<i128> {
        match value {
            Value::BigInteger(n) => Ok(*n),
            Value::BigDecimal(d) => d
                .trunc()
                .to_i128()
                .ok_or_else(|| CoercionError::new(value, TypeRef::BigInteger)),
            Value::String(s) => s.trim().parse::<i128>().map_err(|e| {
                CoercionError::new(value, TypeRef::BigInteger).with_reason(e.to_string())
            }),
            Value::Float(_) | Value::Double(_) => {
                let real = Self::double_value(value)?;
                if real.is_finite() {
                    Ok(real.trunc() as i128)
                } else {
                    Err(CoercionError::new(value, TypeRef::BigInteger))
                }
            }
            _ => Self::long_value(value)
                .map(i128::from)
                .map_err(|_| CoercionError::new(value, TypeRef::BigInteger)),
        }
    }

    pub fn big_decimal_value(value: &Value) -> CoercionResult<Decimal> {
        let converted = match value {
            Value::BigDecimal(d) => Some(*d),
            Value::BigInteger(n) => Decimal::from_i128(*n),
            Value::Float(n) => Decimal::from_f32(*n),
            Value::Double(n) => Decimal::from_f64(*n),
            Value::String(s) => {
                return Decimal::from_str(s.trim()).map_err(|e| {
                    CoercionError::new(value, TypeRef::BigDecimal).with_reason(e.to_string())
                });
            }
            _ => Self::long_value(value).ok().map(Decimal::from),
        };
        converted.ok_or_else(|| CoercionError::new(value, TypeRef::BigDecimal))
    }

    pub fn char_value(value: &Value) -> CoercionResult<char> {
        match value {
            Value::Char(c) => Ok(*c),
            Value::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(CoercionError::new(value, "char")
                        .with_reason("expected a single character")),
                }
            }
            Value::Null => Ok('\0'),
            _ => {
                let code = Self::long_value(value)? as u16;
                char::from_u32(u32::from(code))
                    .ok_or_else(|| CoercionError::new(value, "char").with_reason("surrogate code unit"))
            }
        }
    }

    /// String form of a value; null renders as `"null"`
    pub fn string_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Convert a list, array or single value into an array of `element`
    pub fn to_array(
        value: &Value,
        element: &TypeRef,
        hierarchy: &dyn TypeHierarchy,
    ) -> CoercionResult<Value> {
        if let Value::Array(array) = value {
            if array.element_type() == element {
                return Ok(value.clone());
            }
        }
        let items = match value {
            Value::Null => return Ok(Value::Null),
            other => other.elements().unwrap_or_else(|| vec![other.clone()]),
        };
        let converted = items
            .iter()
            .map(|item| Self::coerce(item, element, hierarchy))
            .collect::<CoercionResult<Vec<_>>>()?;
        Ok(Value::array(element.clone(), converted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BuiltinHierarchy;

    #[test]
    fn test_numeric_narrowing_rules() {
        let int = TypeRef::Primitive(PrimitiveKind::Int);
        let h = BuiltinHierarchy;

        assert_eq!(
            TypeCoercion::coerce(&Value::Long(1 << 33 | 7), &int, &h),
            Ok(Value::Int(7))
        );
        assert_eq!(TypeCoercion::coerce(&Value::Double(-2.9), &int, &h), Ok(Value::Int(-2)));
        assert_eq!(TypeCoercion::coerce(&Value::Double(f64::NAN), &int, &h), Ok(Value::Int(0)));
        assert_eq!(TypeCoercion::coerce(&Value::from(" 42 "), &int, &h), Ok(Value::Int(42)));
        assert!(TypeCoercion::coerce(&Value::from("4x"), &int, &h).is_err());
    }

    #[test]
    fn test_null_handling() {
        let h = BuiltinHierarchy;
        assert_eq!(
            TypeCoercion::coerce(&Value::Null, &TypeRef::Primitive(PrimitiveKind::Int), &h),
            Ok(Value::Int(0))
        );
        assert_eq!(
            TypeCoercion::coerce(&Value::Null, &TypeRef::Boxed(PrimitiveKind::Int), &h),
            Ok(Value::Null)
        );
        assert_eq!(TypeCoercion::coerce(&Value::Null, &TypeRef::String, &h), Ok(Value::Null));
    }

    #[test]
    fn test_incompatible_reference_type_is_rejected() {
        let error = TypeCoercion::coerce(&Value::from("abc"), &TypeRef::Map, &BuiltinHierarchy)
            .expect_err("string is not a map");
        assert_eq!(error.value, "abc");
        assert_eq!(error.source_type, "String");
        assert_eq!(error.target_type, "Map");
    }

    #[test]
    fn test_to_array_wraps_single_values() {
        let h = BuiltinHierarchy;
        let array = TypeCoercion::to_array(&Value::Int(3), &TypeRef::String, &h).unwrap();
        assert_eq!(array, Value::array(TypeRef::String, [Value::from("3")]));

        let list = Value::list([Value::Int(1), Value::Long(2)]);
        let array = TypeCoercion::to_array(&list, &TypeRef::Boxed(PrimitiveKind::Long), &h).unwrap();
        assert_eq!(
            array,
            Value::array(TypeRef::Boxed(PrimitiveKind::Long), [Value::Long(1), Value::Long(2)])
        );
    }

    #[test]
    fn test_best_matching_type() {
        let h = BuiltinHierarchy;
        let int = TypeRef::Boxed(PrimitiveKind::Int);
        let double = TypeRef::Primitive(PrimitiveKind::Double);

        assert_eq!(
            TypeCoercion::best_matching_type(&[int.clone(), double], &h),
            TypeRef::Number
        );
        assert_eq!(
            TypeCoercion::best_matching_type(&[TypeRef::Number, int.clone()], &h),
            TypeRef::Number
        );
        assert_eq!(
            TypeCoercion::best_matching_type(&[int, TypeRef::String], &h),
            TypeRef::Object
        );
        assert_eq!(TypeCoercion::best_matching_type(&[], &h), TypeRef::Object);
    }

    #[test]
    fn test_boolean_value() {
        assert!(!TypeCoercion::boolean_value(&Value::Null));
        assert!(!TypeCoercion::boolean_value(&Value::Int(0)));
        assert!(TypeCoercion::boolean_value(&Value::Double(0.1)));
        assert!(TypeCoercion::boolean_value(&Value::from("TRUE")));
        assert!(!TypeCoercion::boolean_value(&Value::from("yes")));
        assert!(TypeCoercion::boolean_value(&Value::empty_map()));
    }
}
