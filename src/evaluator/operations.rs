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

//! Operator semantics
//!
//! Binary arithmetic first picks a common numeric type for both operands
//! (see [`NumericType::common`]) and computes in that type. Integral
//! results are computed on `long` with two's-complement wrapping and
//! narrowed to `int` when the common type is `int` or narrower. Big
//! integers use checked arithmetic and report overflow.

use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::ast::OperatorKind;
use crate::error::{OgnlError, Result};
use crate::model::{CoercionError, TypeCoercion, Value};

/// Numeric rank of a value's type, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumericType {
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    BigInteger,
    Float,
    Double,
    BigDecimal,
    NonNumeric,
}

impl NumericType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Boolean(_) => NumericType::Bool,
            Value::Byte(_) => NumericType::Byte,
            Value::Char(_) => NumericType::Char,
            Value::Short(_) => NumericType::Short,
            Value::Int(_) => NumericType::Int,
            Value::Long(_) => NumericType::Long,
            Value::BigInteger(_) => NumericType::BigInteger,
            Value::Float(_) => NumericType::Float,
            Value::Double(_) => NumericType::Double,
            Value::BigDecimal(_) => NumericType::BigDecimal,
            _ => NumericType::NonNumeric,
        }
    }

    fn is_real(self) -> bool {
        self >= NumericType::Float
    }

    /// Type both operands are converted to before computing
    ///
    /// With `can_be_non_numeric`, a non-numeric or char operand makes the
    /// operation non-numeric (string concatenation, natural comparison).
    /// Otherwise non-numeric operands count as `double`. Mixing a real type
    /// with a big integer yields big decimal; mixing a real type with a
    /// `long` yields at least `double`.
    pub fn common(t1: Self, t2: Self, can_be_non_numeric: bool) -> Self {
        use NumericType::*;

        if t1 == t2 {
            return t1;
        }
        if can_be_non_numeric && (t1 == NonNumeric || t2 == NonNumeric || t1 == Char || t2 == Char) {
            return NonNumeric;
        }
        let t1 = if t1 == NonNumeric { Double } else { t1 };
        let t2 = if t2 == NonNumeric { Double } else { t2 };

        match (t1.is_real(), t2.is_real()) {
            (true, true) => t1.max(t2),
            (true, false) => Self::real_with_integral(t1, t2),
            (false, true) => Self::real_with_integral(t2, t1),
            (false, false) => t1.max(t2),
        }
    }

    fn real_with_integral(real: Self, integral: Self) -> Self {
        if integral < NumericType::Int {
            real
        } else if integral == NumericType::BigInteger {
            NumericType::BigDecimal
        } else {
            real.max(NumericType::Double)
        }
    }

    fn of_pair(v1: &Value, v2: &Value, can_be_non_numeric: bool) -> Self {
        Self::common(Self::of(v1), Self::of(v2), can_be_non_numeric)
    }
}

fn integer(ty: NumericType, value: i64) -> Value {
    match ty {
        NumericType::Long => Value::Long(value),
        NumericType::Float if (value as f32) as i64 == value => Value::Float(value as f32),
        NumericType::Float | NumericType::Double if (value as f64) as i64 == value => {
            Value::Double(value as f64)
        }
        NumericType::Float | NumericType::Double => Value::Long(value),
        NumericType::BigInteger | NumericType::BigDecimal => Value::BigInteger(i128::from(value)),
        _ => Value::Int(value as i32),
    }
}

fn real(ty: NumericType, value: f64) -> Value {
    match ty {
        NumericType::Float => Value::Float(value as f32),
        _ => Value::Double(value),
    }
}

fn long(value: &Value) -> Result<i64> {
    Ok(TypeCoercion::long_value(value)?)
}

fn double(value: &Value) -> Result<f64> {
    Ok(TypeCoercion::double_value(value)?)
}

fn big_integer(value: &Value) -> Result<i128> {
    Ok(TypeCoercion::big_integer_value(value)?)
}

fn big_decimal(value: &Value) -> Result<Decimal> {
    Ok(TypeCoercion::big_decimal_value(value)?)
}

fn overflow(op: &str, v1: &Value, v2: &Value) -> OgnlError {
    OgnlError::arithmetic(format!("{v1} {op} {v2} overflows"))
}

fn checked_big(op: &str, v1: &Value, v2: &Value, f: impl Fn(i128, i128) -> Option<i128>) -> Result<Value> {
    f(big_integer(v1)?, big_integer(v2)?)
        .map(Value::BigInteger)
        .ok_or_else(|| overflow(op, v1, v2))
}

fn checked_decimal(op: &str, v1: &Value, v2: &Value, f: impl Fn(Decimal, Decimal) -> Option<Decimal>) -> Result<Value> {
    f(big_decimal(v1)?, big_decimal(v2)?)
        .map(Value::BigDecimal)
        .ok_or_else(|| overflow(op, v1, v2))
}

/// `+`: numeric addition, or concatenation when either side is non-numeric
pub fn add(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of_pair(v1, v2, true) {
        NumericType::BigInteger => checked_big("+", v1, v2, i128::checked_add),
        NumericType::BigDecimal => checked_decimal("+", v1, v2, Decimal::checked_add),
        ty @ (NumericType::Float | NumericType::Double) => Ok(real(ty, double(v1)? + double(v2)?)),
        NumericType::NonNumeric => {
            let numeric = |v: &Value| NumericType::of(v) != NumericType::NonNumeric;
            if (numeric(v1) && v2.is_null()) || (numeric(v2) && v1.is_null()) {
                return Err(OgnlError::arithmetic(format!("cannot add {v1} and {v2}")));
            }
            Ok(Value::String(format!(
                "{}{}",
                TypeCoercion::string_value(v1),
                TypeCoercion::string_value(v2)
            )))
        }
        ty => Ok(integer(ty, long(v1)?.wrapping_add(long(v2)?))),
    }
}

pub fn subtract(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of_pair(v1, v2, false) {
        NumericType::BigInteger => checked_big("-", v1, v2, i128::checked_sub),
        NumericType::BigDecimal => checked_decimal("-", v1, v2, Decimal::checked_sub),
        ty @ (NumericType::Float | NumericType::Double) => Ok(real(ty, double(v1)? - double(v2)?)),
        ty => Ok(integer(ty, long(v1)?.wrapping_sub(long(v2)?))),
    }
}

pub fn multiply(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of_pair(v1, v2, false) {
        NumericType::BigInteger => checked_big("*", v1, v2, i128::checked_mul),
        NumericType::BigDecimal => checked_decimal("*", v1, v2, Decimal::checked_mul),
        ty @ (NumericType::Float | NumericType::Double) => Ok(real(ty, double(v1)? * double(v2)?)),
        ty => Ok(integer(ty, long(v1)?.wrapping_mul(long(v2)?))),
    }
}

fn division_by_zero() -> OgnlError {
    OgnlError::arithmetic("/ by zero")
}

/// `/`: integral division truncates; integral division by zero fails
pub fn divide(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of_pair(v1, v2, false) {
        NumericType::BigInteger => {
            let divisor = big_integer(v2)?;
            if divisor == 0 {
                return Err(division_by_zero());
            }
            checked_big("/", v1, v2, i128::checked_div)
        }
        NumericType::BigDecimal => {
            if big_decimal(v2)?.is_zero() {
                return Err(division_by_zero());
            }
            checked_decimal("/", v1, v2, Decimal::checked_div)
        }
        ty @ (NumericType::Float | NumericType::Double) => Ok(real(ty, double(v1)? / double(v2)?)),
        ty => {
            let divisor = long(v2)?;
            if divisor == 0 {
                return Err(division_by_zero());
            }
            Ok(integer(ty, long(v1)?.wrapping_div(divisor)))
        }
    }
}

/// `%`: computed on integral values, including for real operands
pub fn remainder(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of_pair(v1, v2, false) {
        NumericType::BigInteger | NumericType::BigDecimal => {
            let divisor = big_integer(v2)?;
            if divisor == 0 {
                return Err(division_by_zero());
            }
            checked_big("%", v1, v2, i128::checked_rem)
        }
        ty => {
            let divisor = long(v2)?;
            if divisor == 0 {
                return Err(division_by_zero());
            }
            Ok(integer(ty, long(v1)?.wrapping_rem(divisor)))
        }
    }
}

pub fn negate(value: &Value) -> Result<Value> {
    match NumericType::of(value) {
        NumericType::BigInteger => big_integer(value)?
            .checked_neg()
            .map(Value::BigInteger)
            .ok_or_else(|| OgnlError::arithmetic(format!("-{value} overflows"))),
        NumericType::BigDecimal => Ok(Value::BigDecimal(-big_decimal(value)?)),
        ty @ (NumericType::Float | NumericType::Double) => Ok(real(ty, -double(value)?)),
        NumericType::NonNumeric => Ok(Value::Double(-double(value)?)),
        ty => Ok(integer(ty, long(value)?.wrapping_neg())),
    }
}

pub fn bit_negate(value: &Value) -> Result<Value> {
    match NumericType::of(value) {
        NumericType::BigInteger | NumericType::BigDecimal => Ok(Value::BigInteger(!big_integer(value)?)),
        ty => Ok(integer(ty, !long(value)?)),
    }
}

fn bitwise(v1: &Value, v2: &Value, big: fn(i128, i128) -> i128, small: fn(i64, i64) -> i64) -> Result<Value> {
    match NumericType::of_pair(v1, v2, false) {
        NumericType::BigInteger | NumericType::BigDecimal => {
            Ok(Value::BigInteger(big(big_integer(v1)?, big_integer(v2)?)))
        }
        ty => Ok(integer(ty, small(long(v1)?, long(v2)?))),
    }
}

pub fn bit_and(v1: &Value, v2: &Value) -> Result<Value> {
    bitwise(v1, v2, |a, b| a & b, |a, b| a & b)
}

pub fn bit_or(v1: &Value, v2: &Value) -> Result<Value> {
    bitwise(v1, v2, |a, b| a | b, |a, b| a | b)
}

pub fn xor(v1: &Value, v2: &Value) -> Result<Value> {
    bitwise(v1, v2, |a, b| a ^ b, |a, b| a ^ b)
}

/// Shift distance, masked the way `long` shifts are
fn distance(value: &Value) -> Result<u32> {
    Ok((long(value)? & 0x3f) as u32)
}

pub fn shift_left(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of(v1) {
        NumericType::BigInteger | NumericType::BigDecimal => {
            // Shifting must be reversible, otherwise bits were lost
            let value = big_integer(v1)?;
            u32::try_from(long(v2)?)
                .ok()
                .and_then(|shift| value.checked_shl(shift).filter(|shifted| shifted >> shift == value))
                .map(Value::BigInteger)
                .ok_or_else(|| overflow("<<", v1, v2))
        }
        ty => Ok(integer(ty, long(v1)?.wrapping_shl(distance(v2)?))),
    }
}

pub fn shift_right(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of(v1) {
        NumericType::BigInteger | NumericType::BigDecimal => {
            let shift = u32::try_from(long(v2)?).unwrap_or(u32::MAX).min(127);
            Ok(Value::BigInteger(big_integer(v1)? >> shift))
        }
        ty => Ok(integer(ty, long(v1)?.wrapping_shr(distance(v2)?))),
    }
}

pub fn unsigned_shift_right(v1: &Value, v2: &Value) -> Result<Value> {
    match NumericType::of(v1) {
        NumericType::BigInteger | NumericType::BigDecimal => shift_right(v1, v2),
        ty if ty <= NumericType::Int => {
            let shift = (long(v2)? & 0x1f) as u32;
            let shifted = ((long(v1)? as i32 as u32) >> shift) as i32;
            Ok(Value::Int(shifted))
        }
        ty => {
            let shifted = ((long(v1)? as u64) >> distance(v2)?) as i64;
            Ok(integer(ty, shifted))
        }
    }
}

/// Natural ordering with numeric conversion
///
/// Numbers compare by value in their common type; two non-numeric values
/// must both be strings. `NaN` compares greater than everything.
pub fn compare(v1: &Value, v2: &Value) -> Result<Ordering> {
    let (t1, t2) = (NumericType::of(v1), NumericType::of(v2));
    match NumericType::common(t1, t2, true) {
        NumericType::BigInteger => Ok(big_integer(v1)?.cmp(&big_integer(v2)?)),
        NumericType::BigDecimal => Ok(big_decimal(v1)?.cmp(&big_decimal(v2)?)),
        NumericType::NonNumeric if t1 == NumericType::NonNumeric && t2 == NumericType::NonNumeric => {
            match (v1, v2) {
                (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
                _ => Err(CoercionError::new(v1, v2.class_name())
                    .with_reason("values are not comparable")
                    .into()),
            }
        }
        NumericType::NonNumeric | NumericType::Float | NumericType::Double => {
            let (d1, d2) = (double(v1)?, double(v2)?);
            Ok(if d1 == d2 {
                Ordering::Equal
            } else if d1 < d2 {
                Ordering::Less
            } else {
                Ordering::Greater
            })
        }
        _ => Ok(long(v1)?.cmp(&long(v2)?)),
    }
}

/// Equality with numeric conversion; never fails
///
/// Null equals only null. Values that compare equal under [`compare`] are
/// equal, as are structurally equal values.
pub fn equal(v1: &Value, v2: &Value) -> bool {
    if v1.is_null() || v2.is_null() {
        return v1.is_null() && v2.is_null();
    }
    if let (Value::Array(a), Value::Array(b)) = (v1, v2) {
        let (a, b) = (a.to_vec(), b.to_vec());
        return a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| equal(x, y));
    }
    v1 == v2 || matches!(compare(v1, v2), Ok(Ordering::Equal))
}

/// `in`: membership in a list, array, map values or string characters
pub fn contains(container: &Value, item: &Value) -> bool {
    match container {
        Value::Null => false,
        Value::List(list) => list.read_recursive().iter().any(|element| equal(item, element)),
        Value::Array(array) => array.to_vec().iter().any(|element| equal(item, element)),
        Value::Map(map) => map.read_recursive().values().any(|element| equal(item, element)),
        Value::String(s) => match item {
            Value::Char(c) => s.contains(*c),
            _ => false,
        },
        other => equal(item, other),
    }
}

/// Apply a non-short-circuit operator to already evaluated operands
///
/// Chains of two or more operands fold left to right.
pub fn apply(op: OperatorKind, operands: &[Value]) -> Result<Value> {
    let (first, rest) = operands
        .split_first()
        .ok_or_else(|| OgnlError::inappropriate(format!("operator {op} without operands")))?;
    let binary: fn(&Value, &Value) -> Result<Value> = match op {
        OperatorKind::Negate => return negate(first),
        OperatorKind::BitNot => return bit_negate(first),
        OperatorKind::Not => return Ok(Value::Boolean(!TypeCoercion::boolean_value(first))),
        OperatorKind::Add => add,
        OperatorKind::Subtract => subtract,
        OperatorKind::Multiply => multiply,
        OperatorKind::Divide => divide,
        OperatorKind::Remainder => remainder,
        OperatorKind::BitAnd => bit_and,
        OperatorKind::BitOr => bit_or,
        OperatorKind::Xor => xor,
        OperatorKind::ShiftLeft => shift_left,
        OperatorKind::ShiftRight => shift_right,
        OperatorKind::UnsignedShiftRight => unsigned_shift_right,
        OperatorKind::Equal => |a, b| Ok(Value::Boolean(equal(a, b))),
        OperatorKind::NotEqual => |a, b| Ok(Value::Boolean(!equal(a, b))),
        OperatorKind::Less => |a, b| Ok(Value::Boolean(compare(a, b)? == Ordering::Less)),
        OperatorKind::LessOrEqual => |a, b| Ok(Value::Boolean(compare(a, b)? != Ordering::Greater)),
        OperatorKind::Greater => |a, b| Ok(Value::Boolean(compare(a, b)? == Ordering::Greater)),
        OperatorKind::GreaterOrEqual => |a, b| Ok(Value::Boolean(compare(a, b)? != Ordering::Less)),
        OperatorKind::In => |a, b| Ok(Value::Boolean(contains(b, a))),
        OperatorKind::NotIn => |a, b| Ok(Value::Boolean(!contains(b, a))),
        OperatorKind::And | OperatorKind::Or | OperatorKind::Conditional => {
            return Err(OgnlError::inappropriate(format!(
                "operator {op} must be evaluated lazily"
            )));
        }
    };

    rest.iter()
        .try_fold(first.clone(), |accumulated, operand| binary(&accumulated, operand))
}
