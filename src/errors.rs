//! Shared error types used across submodules.

use thiserror::Error;

/// Top-level error type for the crate.
///
/// Factorization-style failures (zero pivot, negative weight, singularity)
/// belong to the preconditioner and reordering subsystems the solvers compose
/// with. The iterative engine itself reports numerical breakdown through the
/// monitor's stop channel and raises this type only for illegal usage of its
/// entry points.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// A zero pivot was encountered during factorization.
    #[error("zero pivot during factorization: {0}")]
    ZeroPivot(String),
    /// A negative weight was produced while building auxiliary scaling data.
    #[error("negative weight: {0}")]
    NegativeWeight(String),
    /// A numeric update was requested out of order.
    #[error("illegal update: {0}")]
    IllegalUpdate(String),
    /// A solve was requested with inconsistent or unprepared inputs.
    #[error("illegal solve: {0}")]
    IllegalSolve(String),
    /// The matrix is singular or numerically singular.
    #[error("matrix is singular")]
    SingularMatrix,
}

impl SolverError {
    /// Stable numeric code for the failure reason.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::ZeroPivot(_) => -1,
            Self::NegativeWeight(_) => -2,
            Self::IllegalUpdate(_) => -3,
            Self::IllegalSolve(_) => -4,
            Self::SingularMatrix => -5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SolverError::ZeroPivot("d(2,2)".into()).code(), -1);
        assert_eq!(SolverError::IllegalSolve("dim".into()).code(), -4);
        assert_eq!(SolverError::SingularMatrix.code(), -5);
    }

    #[test]
    fn display_carries_context() {
        let err = SolverError::IllegalSolve("rhs length 2, matrix dimension 3".into());
        assert_eq!(
            err.to_string(),
            "illegal solve: rhs length 2, matrix dimension 3"
        );
    }
}
