//! The quantization curve and its eager adapters.

use crate::{CodecError, Numeric, Result};

/// Exponent of the forward power curve (square root).
pub const CURVE_EXPONENT: f64 = 0.5;

/// Scale from the curve range [-1, 1] to byte steps.
pub const BYTE_SCALE: f64 = 127.5;

/// Clamp limit applied after scaling, in byte steps from the center.
pub const BYTE_LIMIT: f64 = 127.0;

/// Byte value that represents zero.
pub const BYTE_CENTER: f64 = 128.0;

/// Largest `|dequantize(quantize(x)) - x|` for `x` in [-1, 1].
///
/// Truncation loses at most one byte step (`1 / 127.5`) in the curve domain,
/// and squaring at most doubles that near `|x| = 1`.
pub const MAX_ROUND_TRIP_ERROR: f64 = 2.0 / BYTE_SCALE;

/// Forward curve, before the final byte cast.
///
/// Produces a value in [1, 255] for any finite input.
pub fn quantize_curve<N: Numeric>(x: &N) -> N {
    x.abs()
        .pow(CURVE_EXPONENT)
        .multiply(&x.signum())
        .scale(BYTE_SCALE)
        .clamp_to(-BYTE_LIMIT, BYTE_LIMIT)
        .offset(BYTE_CENTER)
}

/// Inverse curve, from a byte value back to the embedding range.
pub fn dequantize_curve<N: Numeric>(b: &N) -> N {
    let y = b.offset(-BYTE_CENTER).divide(BYTE_SCALE);
    y.abs().pow(1.0 / CURVE_EXPONENT).multiply(&y.signum())
}

/// Quantize one embedding component to a byte.
///
/// The cast truncates toward zero and saturates, so NaN becomes 0.
pub fn quantize(x: f32) -> u8 {
    quantize_curve(&f64::from(x)) as u8
}

/// Dequantize one byte back to an embedding component.
pub fn dequantize(b: u8) -> f32 {
    dequantize_curve(&f64::from(b)) as f32
}

/// Quantize a buffer of components.
pub fn quantize_slice<T: Copy + Into<f64>>(values: &[T]) -> Vec<u8> {
    values
        .iter()
        .map(|&v| quantize_curve(&v.into()) as u8)
        .collect()
}

/// Dequantize a buffer of bytes.
pub fn dequantize_slice(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| dequantize(b)).collect()
}

/// Quantize into a pre-sized output buffer.
pub fn quantize_into<T: Copy + Into<f64>>(values: &[T], out: &mut [u8]) -> Result<()> {
    if values.len() != out.len() {
        return Err(CodecError::LengthMismatch {
            input: values.len(),
            output: out.len(),
        });
    }
    for (slot, &v) in out.iter_mut().zip(values) {
        *slot = quantize_curve(&v.into()) as u8;
    }
    Ok(())
}

/// Dequantize into a pre-sized output buffer.
pub fn dequantize_into(bytes: &[u8], out: &mut [f32]) -> Result<()> {
    if bytes.len() != out.len() {
        return Err(CodecError::LengthMismatch {
            input: bytes.len(),
            output: out.len(),
        });
    }
    for (slot, &b) in out.iter_mut().zip(bytes) {
        *slot = dequantize(b);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zero_is_midpoint() {
        assert_eq!(quantize(0.0), 128);
        assert_eq!(quantize(-0.0), 128);
        assert_eq!(dequantize(128), 0.0);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(-1.0), 1);
        // Clamped rather than rejected
        assert_eq!(quantize(3.0), 255);
        assert_eq!(quantize(-7.5), 1);
    }

    #[test]
    fn test_nan_maps_to_zero() {
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_known_values() {
        // sqrt(0.25) * 127.5 = 63.75 -> 128 + 63 = 191
        assert_eq!(quantize(0.25), 191);
        // -63.75 + 128 = 64.25 -> 64
        assert_eq!(quantize(-0.25), 64);
        assert_abs_diff_eq!(dequantize(191), (63.0_f32 / 127.5).powi(2), epsilon = 1e-7);
    }

    #[test]
    fn test_round_trip_error_bound() {
        let steps = 20_000;
        for i in 0..=steps {
            let x = -1.0 + 2.0 * i as f32 / steps as f32;
            let err = (dequantize(quantize(x)) - x).abs() as f64;
            assert!(
                err <= MAX_ROUND_TRIP_ERROR,
                "x={} err={} exceeds {}",
                x,
                err,
                MAX_ROUND_TRIP_ERROR
            );
        }
    }

    #[test]
    fn test_monotonic() {
        let steps = 10_000;
        let mut previous = quantize(-1.0);
        for i in 1..=steps {
            let x = -1.0 + 2.0 * i as f32 / steps as f32;
            let q = quantize(x);
            assert!(q >= previous, "quantize not monotonic at x={}", x);
            previous = q;
        }
    }

    #[test]
    fn test_byte_round_trip_within_one() {
        for b in 1..=255u8 {
            let back = quantize(dequantize(b));
            assert!(
                (i16::from(back) - i16::from(b)).abs() <= 1,
                "b={} came back as {}",
                b,
                back
            );
        }
    }

    #[test]
    fn test_slices_match_scalar() {
        let values = [-0.9_f32, -0.1, 0.0, 0.05, 0.7];
        let bytes = quantize_slice(&values);
        let expected: Vec<u8> = values.iter().map(|&v| quantize(v)).collect();
        assert_eq!(bytes, expected);

        let wide: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
        assert_eq!(quantize_slice(&wide), expected);

        let restored = dequantize_slice(&bytes);
        assert_eq!(restored.len(), values.len());
    }

    #[test]
    fn test_into_length_mismatch() {
        let mut out = [0u8; 2];
        let err = quantize_into(&[0.1_f32, 0.2, 0.3], &mut out).unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthMismatch {
                input: 3,
                output: 2
            }
        ));

        let mut floats = [0.0_f32; 3];
        dequantize_into(&[1, 128, 255], &mut floats).unwrap();
        assert_eq!(floats[1], 0.0);
    }
}
