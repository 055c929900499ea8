//! # alphaearth-codec
//!
//! Byte quantization for AlphaEarth satellite embeddings.
//!
//! Each embedding channel is a unit-vector component in [-1, 1]. The codec
//! packs a channel into a single `u8` through a signed square-root curve,
//! which spends more byte levels on low-magnitude components:
//!
//! ```text
//! quantize:    b = trunc(clamp(sign(x) * |x|^0.5 * 127.5, -127, 127) + 128)
//! dequantize:  y = (b - 128) / 127.5,  x = sign(y) * y^2
//! ```
//!
//! The curve is written once, generically over [`Numeric`]. Two backends
//! implement that trait:
//! - `f64`: eager evaluation on in-memory values ([`quantize`], [`quantize_slice`], ...)
//! - [`Expr`]: a lazily built expression graph that can be serialized and
//!   handed to a remote execution engine, or evaluated locally with [`Expr::eval`]
//!
//! Both produce identical numbers for identical inputs.
//!
//! ## Examples
//!
//! ```
//! use alphaearth_codec::{dequantize, quantize, Expr};
//!
//! assert_eq!(quantize(0.0), 128);
//! let restored = dequantize(quantize(0.25));
//! assert!((f64::from(restored) - 0.25).abs() < alphaearth_codec::MAX_ROUND_TRIP_ERROR);
//!
//! // The same transform as a graph for remote evaluation
//! let graph = Expr::quantize(Expr::input());
//! assert_eq!(graph.eval(0.25), f64::from(quantize(0.25)));
//! ```
//!
//! Values outside [-1, 1] are not rejected: the clamp in the forward curve
//! maps them to the extreme bytes 1 and 255.

mod curve;
mod error;
mod expr;
mod numeric;

pub use curve::{
    dequantize, dequantize_curve, dequantize_into, dequantize_slice, quantize, quantize_curve,
    quantize_into, quantize_slice, BYTE_CENTER, BYTE_LIMIT, BYTE_SCALE, CURVE_EXPONENT,
    MAX_ROUND_TRIP_ERROR,
};
pub use error::CodecError;
pub use expr::{BinaryOp, CastType, Expr, UnaryOp};
pub use numeric::Numeric;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
