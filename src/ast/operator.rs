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

//! Operator definitions

use std::fmt;

/// Operator kinds of an `Operator` node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Negate,

    // Bitwise
    BitAnd,
    BitOr,
    Xor,
    BitNot,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,

    // Logical
    And,
    Or,
    Not,

    // Comparison
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,

    // Membership
    In,
    NotIn,

    /// `test ? then : else`
    Conditional,
}

/// Number of operands an operator accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    /// Left-associative chain of two or more operands
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl OperatorKind {
    pub fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Add => "+",
            OperatorKind::Subtract => "-",
            OperatorKind::Multiply => "*",
            OperatorKind::Divide => "/",
            OperatorKind::Remainder => "%",
            OperatorKind::Negate => "-",
            OperatorKind::BitAnd => "&",
            OperatorKind::BitOr => "|",
            OperatorKind::Xor => "^",
            OperatorKind::BitNot => "~",
            OperatorKind::ShiftLeft => "<<",
            OperatorKind::ShiftRight => ">>",
            OperatorKind::UnsignedShiftRight => ">>>",
            OperatorKind::And => "&&",
            OperatorKind::Or => "||",
            OperatorKind::Not => "!",
            OperatorKind::Equal => "==",
            OperatorKind::NotEqual => "!=",
            OperatorKind::Less => "<",
            OperatorKind::LessOrEqual => "<=",
            OperatorKind::Greater => ">",
            OperatorKind::GreaterOrEqual => ">=",
            OperatorKind::In => "in",
            OperatorKind::NotIn => "not in",
            OperatorKind::Conditional => "?:",
        }
    }

    /// Name of the runtime helper used in emitted source
    pub fn helper_name(self) -> &'static str {
        match self {
            OperatorKind::Add => "add",
            OperatorKind::Subtract => "subtract",
            OperatorKind::Multiply => "multiply",
            OperatorKind::Divide => "divide",
            OperatorKind::Remainder => "remainder",
            OperatorKind::Negate => "negate",
            OperatorKind::BitAnd => "binaryAnd",
            OperatorKind::BitOr => "binaryOr",
            OperatorKind::Xor => "binaryXor",
            OperatorKind::BitNot => "bitNegate",
            OperatorKind::ShiftLeft => "shiftLeft",
            OperatorKind::ShiftRight => "shiftRight",
            OperatorKind::UnsignedShiftRight => "unsignedShiftRight",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Not => "not",
            OperatorKind::Equal => "equal",
            OperatorKind::NotEqual => "notEqual",
            OperatorKind::Less => "less",
            OperatorKind::LessOrEqual => "lessOrEqual",
            OperatorKind::Greater => "greater",
            OperatorKind::GreaterOrEqual => "greaterOrEqual",
            OperatorKind::In => "in",
            OperatorKind::NotIn => "notIn",
            OperatorKind::Conditional => "conditional",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            OperatorKind::Negate | OperatorKind::BitNot | OperatorKind::Not => Arity::Exactly(1),
            OperatorKind::Conditional => Arity::Exactly(3),
            OperatorKind::Add
            | OperatorKind::Multiply
            | OperatorKind::BitAnd
            | OperatorKind::BitOr
            | OperatorKind::Xor
            | OperatorKind::And
            | OperatorKind::Or => Arity::AtLeast(2),
            _ => Arity::Exactly(2),
        }
    }

    pub fn is_unary(self) -> bool {
        self.arity() == Arity::Exactly(1)
    }

    /// Operators whose later operands may be skipped
    pub fn is_short_circuit(self) -> bool {
        matches!(
            self,
            OperatorKind::And | OperatorKind::Or | OperatorKind::Conditional
        )
    }

    /// Operators that always produce a boolean
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            OperatorKind::Not
                | OperatorKind::Equal
                | OperatorKind::NotEqual
                | OperatorKind::Less
                | OperatorKind::LessOrEqual
                | OperatorKind::Greater
                | OperatorKind::GreaterOrEqual
                | OperatorKind::In
                | OperatorKind::NotIn
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
