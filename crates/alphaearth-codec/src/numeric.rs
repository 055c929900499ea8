//! Numeric abstraction shared by the eager and lazy codec backends.

/// Operations the quantization curve is built from.
///
/// Implementors either compute the result immediately (`f64`) or record the
/// operation in a graph ([`crate::Expr`]). Every method must have the same
/// meaning in both, otherwise the two backends drift apart.
pub trait Numeric: Sized {
    /// Absolute value.
    fn abs(&self) -> Self;

    /// Sign of the value: -1, 0 or 1. Zero maps to zero.
    fn signum(&self) -> Self;

    /// Raise to a constant power.
    fn pow(&self, exponent: f64) -> Self;

    /// Element-wise product with another value of the same backend.
    fn multiply(&self, other: &Self) -> Self;

    /// Multiply by a constant.
    fn scale(&self, factor: f64) -> Self;

    /// Add a constant.
    fn offset(&self, amount: f64) -> Self;

    /// Divide by a constant.
    fn divide(&self, divisor: f64) -> Self;

    /// Clamp into `[low, high]`.
    fn clamp_to(&self, low: f64, high: f64) -> Self;
}

/// Sign with `signum(0) == 0`, unlike [`f64::signum`] which returns 1 for +0.
pub(crate) fn sign(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value.signum()
    }
}

impl Numeric for f64 {
    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn signum(&self) -> Self {
        sign(*self)
    }

    fn pow(&self, exponent: f64) -> Self {
        self.powf(exponent)
    }

    fn multiply(&self, other: &Self) -> Self {
        self * other
    }

    fn scale(&self, factor: f64) -> Self {
        self * factor
    }

    fn offset(&self, amount: f64) -> Self {
        self + amount
    }

    fn divide(&self, divisor: f64) -> Self {
        self / divisor
    }

    fn clamp_to(&self, low: f64, high: f64) -> Self {
        // f64::clamp propagates NaN, which the byte cast later maps to 0
        self.clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_of_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(0.3), 1.0);
        assert_eq!(sign(-0.3), -1.0);
    }

    #[test]
    fn test_f64_ops() {
        let x = -0.25_f64;
        assert_eq!(Numeric::abs(&x), 0.25);
        assert_eq!(x.pow(2.0), 0.0625);
        assert_eq!(x.scale(4.0), -1.0);
        assert_eq!(x.offset(1.0), 0.75);
        assert_eq!(x.divide(0.5), -0.5);
        assert_eq!(x.clamp_to(-0.1, 0.1), -0.1);
        assert_eq!(x.multiply(&2.0), -0.5);
    }
}
