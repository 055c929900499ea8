//! Error types for the codec crate.

use thiserror::Error;

/// Errors that can occur when working with codec expressions.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The expression could not be encoded or decoded as JSON.
    #[error("Expression JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The expression graph is malformed.
    #[error("Invalid expression: {0}")]
    InvalidExpr(String),

    /// Output buffer length does not match the input length.
    #[error("Buffer length mismatch: input has {input} samples, output has {output}")]
    LengthMismatch {
        /// Number of input samples.
        input: usize,
        /// Number of output slots.
        output: usize,
    },
}
