//! Linear operator contract consumed by the iterative solvers.
//!
//! The engine never sees a matrix; it sees something that can apply itself to
//! a vector. Stock implementations are provided for `nalgebra` dense matrices
//! and (behind the `sparse` feature) `nalgebra-sparse` CSC matrices, so
//! callers without custom kernels can solve directly.

use nalgebra::{ComplexField, DMatrix, DVector};
#[cfg(feature = "sparse")]
use nalgebra_sparse::CscMatrix;

/// A square operator `A` applied to length-`n` vectors.
///
/// Implementations must be side-effect-free on their own state: applying the
/// operator twice to the same input yields the same output. The solvers rely
/// on this to recompute residuals from the definition.
pub trait LinearOperator<T: ComplexField + Copy> {
    /// Dimension `n` of the square operator.
    fn dim(&self) -> usize;

    /// Computes `output = A * input`.
    ///
    /// Both vectors have length `n`; `output` is overwritten.
    fn apply(&self, input: &DVector<T>, output: &mut DVector<T>);
}

#[cfg(feature = "sparse")]
impl<T: ComplexField + Copy> LinearOperator<T> for CscMatrix<T> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, input: &DVector<T>, output: &mut DVector<T>) {
        output.fill(T::zero());
        for (row, col, &val) in self.triplet_iter() {
            output[row] += val * input[col];
        }
    }
}

impl<T: ComplexField + Copy> LinearOperator<T> for DMatrix<T> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, input: &DVector<T>, output: &mut DVector<T>) {
        output.gemv(T::one(), self, input, T::zero());
    }
}

/// Computes the residual `out = b - A * x` from its definition.
pub fn residual<T, A>(a: &A, x: &DVector<T>, b: &DVector<T>, out: &mut DVector<T>)
where
    T: ComplexField + Copy,
    A: LinearOperator<T> + ?Sized,
{
    a.apply(x, out);
    // out <- b - out
    out.axpy(T::one(), b, -T::one());
}

#[cfg(all(test, feature = "sparse"))]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra_sparse::coo::CooMatrix;
    use num_complex::Complex;

    use crate::math::Scalar;

    use super::*;

    fn tridiagonal(n: usize) -> (CscMatrix<Complex<Scalar>>, DMatrix<Complex<Scalar>>) {
        let mut coo = CooMatrix::new(n, n);
        let mut dense = DMatrix::zeros(n, n);
        for i in 0..n {
            coo.push(i, i, Complex::new(4.0, 0.5));
            dense[(i, i)] = Complex::new(4.0, 0.5);
            if i > 0 {
                coo.push(i, i - 1, Complex::new(-1.0, 0.0));
                dense[(i, i - 1)] = Complex::new(-1.0, 0.0);
            }
            if i + 1 < n {
                coo.push(i, i + 1, Complex::new(-1.0, 0.1));
                dense[(i, i + 1)] = Complex::new(-1.0, 0.1);
            }
        }
        (CscMatrix::from(&coo), dense)
    }

    #[test]
    fn csc_apply_matches_dense_gemv() {
        let (csc, dense) = tridiagonal(6);
        let x = DVector::from_fn(6, |i, _| Complex::new(i as Scalar + 1.0, -0.25));

        let mut sparse_out = DVector::zeros(6);
        let mut dense_out = DVector::zeros(6);
        csc.apply(&x, &mut sparse_out);
        dense.apply(&x, &mut dense_out);

        for i in 0..6 {
            assert_relative_eq!(sparse_out[i].re, dense_out[i].re, epsilon = 1e-12);
            assert_relative_eq!(sparse_out[i].im, dense_out[i].im, epsilon = 1e-12);
        }
    }

    #[test]
    fn residual_vanishes_at_exact_solution() {
        let (csc, _) = tridiagonal(5);
        let x = DVector::from_element(5, Complex::new(1.0, 1.0));
        let mut b = DVector::zeros(5);
        csc.apply(&x, &mut b);

        let mut r = DVector::zeros(5);
        residual(&csc, &x, &b, &mut r);
        assert_relative_eq!(r.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn apply_overwrites_stale_output() {
        let (csc, _) = tridiagonal(4);
        let x = DVector::from_element(4, Complex::new(1.0, 0.0));
        let mut out = DVector::from_element(4, Complex::new(7.0, 7.0));
        let mut fresh = DVector::zeros(4);
        csc.apply(&x, &mut out);
        csc.apply(&x, &mut fresh);
        assert_eq!(out, fresh);
    }
}
