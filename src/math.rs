//! Shared numerical primitives anchored on `nalgebra`.

/// Primary scalar type used across the crate.
pub type Scalar = f64;
/// Primary complex scalar type for non-Hermitian spectra.
pub type CScalar = num_complex::Complex<Scalar>;

/// Returns the residual norm scaled by the right-hand-side norm, or the raw
/// norm when the right-hand side is zero.
#[must_use]
pub fn relative_residual(residual_norm: Scalar, rhs_norm: Scalar) -> Scalar {
    if rhs_norm > 0.0 {
        residual_norm / rhs_norm
    } else {
        residual_norm
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn relative_residual_scales_by_rhs() {
        assert_relative_eq!(relative_residual(1.0e-6, 2.0), 5.0e-7, epsilon = 1.0e-18);
    }

    #[test]
    fn relative_residual_passes_through_for_zero_rhs() {
        assert_relative_eq!(relative_residual(3.0, 0.0), 3.0, epsilon = 1.0e-18);
    }
}
