//! Variable types and type inference

use super::expression::{Expression, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a workflow variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// Text value; also the default for anything not inferred otherwise
    #[default]
    String,
    /// Classifier output
    Tensor,
}

impl ValueType {
    /// Get the string representation of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Tensor => "tensor",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared type of a workflow input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Variable type
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl From<ValueType> for VariableSpec {
    fn from(value_type: ValueType) -> Self {
        Self { value_type }
    }
}

/// Infer the type an expression produces
///
/// Arithmetic always yields a number, classification a tensor. Variable
/// reads are not resolved through other variables and infer `string`.
pub fn infer_type(expr: &Expression) -> ValueType {
    match expr {
        Expression::Literal {
            value: Scalar::Number(_),
        } => ValueType::Number,
        Expression::Literal {
            value: Scalar::Bool(_),
        } => ValueType::Boolean,
        Expression::Binary { .. } => ValueType::Number,
        Expression::Classify { .. } => ValueType::Tensor,
        Expression::Literal {
            value: Scalar::String(_),
        }
        | Expression::Variable { .. } => ValueType::String,
    }
}
