//! Binary operator kinds of an [`Expression`](super::Expression).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Non-zero and not NaN.
pub fn is_truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

pub(crate) fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    Equals,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::And,
        Operator::Or,
        Operator::Equals,
        Operator::NotEqual,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThan,
        Operator::LessThanOrEqual,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Equals => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide
        )
    }

    /// Comparison and logical operators yield exactly `1.0` or `0.0`.
    pub fn is_boolean(self) -> bool {
        !self.is_arithmetic()
    }

    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Operator::Add => left + right,
            Operator::Subtract => left - right,
            Operator::Multiply => left * right,
            Operator::Divide => left / right,
            Operator::And => flag(is_truthy(left) && is_truthy(right)),
            Operator::Or => flag(is_truthy(left) || is_truthy(right)),
            Operator::Equals => flag(left == right),
            Operator::NotEqual => flag(left != right),
            Operator::GreaterThan => flag(left > right),
            Operator::GreaterThanOrEqual => flag(left >= right),
            Operator::LessThan => flag(left < right),
            Operator::LessThanOrEqual => flag(left <= right),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Accepts the symbol (`">="`) or a name (`greater_than_or_equal`, `ge`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(op) = Operator::ALL.iter().find(|op| op.symbol() == s) {
            return Ok(*op);
        }
        let name = s.to_ascii_lowercase().replace(|c: char| matches!(c, '_' | '-' | ' '), "");
        match name.as_str() {
            "add" | "plus" => Ok(Operator::Add),
            "subtract" | "minus" => Ok(Operator::Subtract),
            "multiply" | "times" => Ok(Operator::Multiply),
            "divide" => Ok(Operator::Divide),
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            "equals" | "eq" => Ok(Operator::Equals),
            "notequal" | "ne" => Ok(Operator::NotEqual),
            "greaterthan" | "gt" => Ok(Operator::GreaterThan),
            "greaterthanorequal" | "ge" => Ok(Operator::GreaterThanOrEqual),
            "lessthan" | "lt" => Ok(Operator::LessThan),
            "lessthanorequal" | "le" => Ok(Operator::LessThanOrEqual),
            _ => Err(format!("unknown operator: '{s}'")),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.symbol().to_string()
    }
}
