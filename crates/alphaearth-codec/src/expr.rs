//! Lazily built per-pixel expression graphs.
//!
//! An [`Expr`] records band math instead of computing it. Remote backends
//! receive the graph as JSON and translate each node into their own image
//! operations. [`Expr::eval`] evaluates the same graph locally, which is how
//! the eager and lazy paths are kept in agreement.

use serde::{Deserialize, Serialize};

use crate::numeric::sign;
use crate::{dequantize_curve, quantize_curve, CodecError, Numeric, Result};

/// Single-argument operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Absolute value.
    Abs,
    /// Sign, with zero mapping to zero.
    Signum,
}

/// Two-argument operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `lhs + rhs`
    Add,
    /// `lhs - rhs`
    Subtract,
    /// `lhs * rhs`
    Multiply,
    /// `lhs / rhs`
    Divide,
    /// `lhs ^ rhs`
    Pow,
}

/// Pixel type conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    /// Truncate and saturate to an unsigned byte.
    ToByte,
    /// Round to 32-bit float.
    ToFloat,
    /// Keep as 64-bit float.
    ToDouble,
}

/// A node in a per-pixel expression graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    /// The input pixel value (every selected band, independently).
    Input,
    /// A constant.
    Constant {
        /// Constant value.
        value: f64,
    },
    /// A unary operation.
    Unary {
        /// Operation to apply.
        op: UnaryOp,
        /// Operand.
        arg: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// Operation to apply.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Clamp into a fixed range.
    Clamp {
        /// Operand.
        arg: Box<Expr>,
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
    /// Pixel type conversion.
    Cast {
        /// Operand.
        arg: Box<Expr>,
        /// Target type.
        to: CastType,
    },
}

impl Expr {
    /// The input pixel.
    pub fn input() -> Self {
        Expr::Input
    }

    /// A constant node.
    pub fn constant(value: f64) -> Self {
        Expr::Constant { value }
    }

    /// Full forward transform: curve followed by the byte cast.
    pub fn quantize(input: Expr) -> Self {
        quantize_curve(&input).cast(CastType::ToByte)
    }

    /// Full inverse transform: curve followed by the float cast.
    pub fn dequantize(input: Expr) -> Self {
        dequantize_curve(&input).cast(CastType::ToFloat)
    }

    /// Wrap this node in a type conversion.
    pub fn cast(self, to: CastType) -> Self {
        Expr::Cast {
            arg: Box::new(self),
            to,
        }
    }

    /// Convert to 32-bit float.
    pub fn to_float(self) -> Self {
        self.cast(CastType::ToFloat)
    }

    /// Convert to 64-bit float.
    pub fn to_double(self) -> Self {
        self.cast(CastType::ToDouble)
    }

    fn unary(&self, op: UnaryOp) -> Self {
        Expr::Unary {
            op,
            arg: Box::new(self.clone()),
        }
    }

    fn binary(&self, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self.clone()),
            rhs: Box::new(rhs),
        }
    }

    /// Evaluate the graph for one input value.
    pub fn eval(&self, input: f64) -> f64 {
        match self {
            Expr::Input => input,
            Expr::Constant { value } => *value,
            Expr::Unary { op, arg } => {
                let v = arg.eval(input);
                match op {
                    UnaryOp::Abs => v.abs(),
                    UnaryOp::Signum => sign(v),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(input);
                let b = rhs.eval(input);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Subtract => a - b,
                    BinaryOp::Multiply => a * b,
                    BinaryOp::Divide => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Expr::Clamp { arg, low, high } => {
                let v = arg.eval(input);
                // NaN propagates; bounds are applied one at a time so bad bounds cannot panic
                if v.is_nan() {
                    v
                } else {
                    v.max(*low).min(*high)
                }
            }
            Expr::Cast { arg, to } => {
                let v = arg.eval(input);
                match to {
                    CastType::ToByte => f64::from(v as u8),
                    CastType::ToFloat => f64::from(v as f32),
                    CastType::ToDouble => v,
                }
            }
        }
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        match self {
            Expr::Input | Expr::Constant { .. } => 1,
            Expr::Unary { arg, .. } | Expr::Clamp { arg, .. } | Expr::Cast { arg, .. } => {
                1 + arg.node_count()
            }
            Expr::Binary { lhs, rhs, .. } => 1 + lhs.node_count() + rhs.node_count(),
        }
    }

    /// Serialize the graph to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a graph from JSON, rejecting clamps with NaN or inverted bounds.
    pub fn from_json(json: &str) -> Result<Self> {
        let expr: Expr = serde_json::from_str(json)?;
        expr.validate()?;
        Ok(expr)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Expr::Input | Expr::Constant { .. } => Ok(()),
            Expr::Clamp { arg, low, high } => {
                if low.is_nan() || high.is_nan() || low > high {
                    return Err(CodecError::InvalidExpr(format!(
                        "clamp bounds [{}, {}] are not an ordered range",
                        low, high
                    )));
                }
                arg.validate()
            }
            Expr::Unary { arg, .. } | Expr::Cast { arg, .. } => arg.validate(),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.validate()?;
                rhs.validate()
            }
        }
    }
}

impl Numeric for Expr {
    fn abs(&self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    fn signum(&self) -> Self {
        self.unary(UnaryOp::Signum)
    }

    fn pow(&self, exponent: f64) -> Self {
        self.binary(BinaryOp::Pow, Expr::constant(exponent))
    }

    fn multiply(&self, other: &Self) -> Self {
        self.binary(BinaryOp::Multiply, other.clone())
    }

    fn scale(&self, factor: f64) -> Self {
        self.binary(BinaryOp::Multiply, Expr::constant(factor))
    }

    fn offset(&self, amount: f64) -> Self {
        self.binary(BinaryOp::Add, Expr::constant(amount))
    }

    fn divide(&self, divisor: f64) -> Self {
        self.binary(BinaryOp::Divide, Expr::constant(divisor))
    }

    fn clamp_to(&self, low: f64, high: f64) -> Self {
        Expr::Clamp {
            arg: Box::new(self.clone()),
            low,
            high,
        }
    }
}
