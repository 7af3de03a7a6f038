//! Scalar types, typed literals, and pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scalar type of an override constant or literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// 32-bit IEEE float.
    F32,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
    /// Boolean.
    Bool,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::Bool => "bool",
        };
        f.write_str(text)
    }
}

/// A typed constant value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Literal {
    /// A 32-bit float.
    F32(f32),
    /// A 32-bit signed integer.
    I32(i32),
    /// A 32-bit unsigned integer.
    U32(u32),
    /// A boolean.
    Bool(bool),
}

impl Literal {
    /// Converts a pipeline-supplied numeric value into a literal of type `ty`.
    ///
    /// Integer conversions truncate toward zero and reject non-finite or
    /// out-of-range values. Float conversion rejects values that are not
    /// finite in `f32`. Booleans are `true` for any non-zero value.
    pub fn from_f64(ty: ScalarType, value: f64) -> Option<Literal> {
        match ty {
            ScalarType::Bool => Some(Literal::Bool(value != 0.0 && !value.is_nan())),
            ScalarType::F32 => {
                let narrowed = value as f32;
                narrowed.is_finite().then_some(Literal::F32(narrowed))
            }
            ScalarType::I32 => {
                let truncated = value.trunc();
                (value.is_finite()
                    && truncated >= f64::from(i32::MIN)
                    && truncated <= f64::from(i32::MAX))
                .then_some(Literal::I32(truncated as i32))
            }
            ScalarType::U32 => {
                let truncated = value.trunc();
                (value.is_finite() && truncated >= 0.0 && truncated <= f64::from(u32::MAX))
                    .then_some(Literal::U32(truncated as u32))
            }
        }
    }

    /// Returns the scalar type of this literal.
    pub fn ty(&self) -> ScalarType {
        match self {
            Literal::F32(_) => ScalarType::F32,
            Literal::I32(_) => ScalarType::I32,
            Literal::U32(_) => ScalarType::U32,
            Literal::Bool(_) => ScalarType::Bool,
        }
    }

    /// Returns the value as a `u32` if it is a non-negative integer literal.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Literal::U32(v) => Some(v),
            Literal::I32(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::F32(v) => write!(f, "{v}f"),
            Literal::I32(v) => write!(f, "{v}i"),
            Literal::U32(v) => write!(f, "{v}u"),
            Literal::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    /// Vertex shading.
    Vertex,
    /// Fragment shading.
    Fragment,
    /// Compute dispatch.
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        f.write_str(text)
    }
}
