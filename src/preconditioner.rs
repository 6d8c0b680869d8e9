//! Preconditioner contract consumed by the iterative solvers.
//!
//! A preconditioner is applied implicitly: `apply` computes `z = P⁻¹ r`, and
//! the engine always composes it with the operator (`A · P⁻¹ · v`). How the
//! inverse action is realized — factorization, polynomial, explicit matrix —
//! is the implementation's business.

use nalgebra::{ComplexField, DVector};
#[cfg(feature = "sparse")]
use nalgebra_sparse::CscMatrix;

#[cfg(feature = "sparse")]
use crate::operator::LinearOperator;

/// Applies the inverse action `z = P⁻¹ r` of a preconditioner.
///
/// Like [`crate::operator::LinearOperator`], implementations must be
/// side-effect-free on their own state and yield identical output for
/// identical input.
pub trait Preconditioner<T: ComplexField + Copy> {
    /// Computes `z = P⁻¹ r`, overwriting `z`.
    fn apply(&self, r: &DVector<T>, z: &mut DVector<T>);
}

/// The trivial preconditioner `P = I`.
///
/// With the identity, the engine reduces to the unpreconditioned method and
/// the internal iterate coincides with the returned solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl<T: ComplexField + Copy> Preconditioner<T> for IdentityPreconditioner {
    fn apply(&self, r: &DVector<T>, z: &mut DVector<T>) {
        z.copy_from(r);
    }
}

/// An explicit inverse held as a sparse matrix: `z = M r` where `M ≈ A⁻¹`.
#[cfg(feature = "sparse")]
impl<T: ComplexField + Copy> Preconditioner<T> for CscMatrix<T> {
    fn apply(&self, r: &DVector<T>, z: &mut DVector<T>) {
        LinearOperator::apply(self, r, z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_copies_input() {
        let r = DVector::from_vec(vec![1.0_f64, -2.0, 0.5]);
        let mut z = DVector::zeros(3);
        IdentityPreconditioner.apply(&r, &mut z);
        assert_eq!(z, r);
    }

    #[cfg(feature = "sparse")]
    #[test]
    fn explicit_inverse_scales_componentwise() {
        use approx::assert_relative_eq;
        use nalgebra_sparse::coo::CooMatrix;

        use crate::math::Scalar;

        // Inverse of diag(2, 4, 8).
        let mut coo = CooMatrix::new(3, 3);
        for (i, d) in [2.0_f64, 4.0, 8.0].into_iter().enumerate() {
            coo.push(i, i, 1.0 / d);
        }
        let inv = CscMatrix::from(&coo);

        let r = DVector::from_vec(vec![2.0_f64, 4.0, 8.0]);
        let mut z = DVector::zeros(3);
        Preconditioner::<Scalar>::apply(&inv, &r, &mut z);
        for i in 0..3 {
            assert_relative_eq!(z[i], 1.0, epsilon = 1e-15);
        }
    }
}
