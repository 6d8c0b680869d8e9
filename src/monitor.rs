//! Convergence monitoring for the iterative solvers.
//!
//! The engine drives the recurrence; the monitor decides when to stop. It is
//! consulted after essentially every vector update and is also the side
//! channel for reporting algorithmic breakdown, so a caller can distinguish
//! "converged", "ran out of budget" and "the method broke down" without the
//! solver ever returning an error for a numerical outcome.

use nalgebra::RealField;

/// Default number of consecutive stagnant updates tolerated by
/// [`ResidualMonitor`] before the run is declared finished.
pub const DEFAULT_STAGNATION_LIMIT: usize = 20;

/// Convergence and progress oracle consumed by the solver engine.
///
/// The engine only acts on the boolean/void returns of these operations and
/// never inspects the monitor's internals. Residual norms passed to
/// [`Monitor::need_check_convergence`] come from the cheap recurrence and may
/// have drifted; only norms passed to [`Monitor::finished_with`] and
/// [`Monitor::update_residual`] are recomputed from the definition.
pub trait Monitor<R: RealField> {
    /// Accounts `fractional_work` of an outer iteration.
    ///
    /// The engine reports a fixed fraction per sub-phase regardless of how
    /// many inner steps actually executed, so a full outer cycle sums to one
    /// iteration and a broken cycle to a fraction of one.
    fn increment(&mut self, fractional_work: f32);

    /// Returns true when the recurrence norm `cheap_norm` warrants
    /// recomputing the residual from its definition.
    fn need_check_convergence(&mut self, cheap_norm: R) -> bool;

    /// Records the recomputed residual norm and reports whether the run is
    /// finished.
    fn finished_with(&mut self, exact_norm: R) -> bool;

    /// Reports whether the run is finished, from internally tracked state.
    fn finished(&self) -> bool;

    /// Declares a fatal breakdown with a numeric code and reason.
    ///
    /// After `stop`, [`Monitor::finished`] must report true.
    fn stop(&mut self, code: i32, reason: &str);

    /// Counts one stagnant update.
    fn increment_stag(&mut self);

    /// Resets the stagnation counter after a meaningful update.
    fn reset_stag(&mut self);

    /// Returns true when the recorded residual norm satisfies the
    /// convergence criterion.
    fn converged(&self) -> bool;

    /// Records the true residual norm of the returned iterate.
    fn update_residual(&mut self, norm: R);
}

/// Stock monitor: relative/absolute tolerance on the residual norm, an outer
/// iteration budget, and a stagnation limit.
///
/// The convergence criterion is `‖r‖ ≤ abs_tol + rel_tol · ‖b‖`, evaluated
/// against recomputed residual norms only. Work is accounted in fractional
/// iterations, so the budget is compared against an `f32` accumulator.
#[derive(Debug, Clone)]
pub struct ResidualMonitor<R: RealField> {
    tolerance: R,
    max_iterations: f32,
    work: f32,
    residual: Option<R>,
    stag_count: usize,
    stag_limit: usize,
    stopped: bool,
    code: i32,
    reason: Option<String>,
}

impl<R: RealField> ResidualMonitor<R> {
    /// Creates a monitor for a right-hand side of norm `rhs_norm` with an
    /// outer-iteration budget and relative/absolute tolerances.
    pub fn new(rhs_norm: R, max_iterations: usize, rel_tol: R, abs_tol: R) -> Self {
        Self {
            tolerance: abs_tol + rel_tol * rhs_norm,
            max_iterations: max_iterations as f32,
            work: 0.0,
            residual: None,
            stag_count: 0,
            stag_limit: DEFAULT_STAGNATION_LIMIT,
            stopped: false,
            code: 0,
            reason: None,
        }
    }

    /// Overrides the stagnation limit.
    #[must_use]
    pub const fn with_stagnation_limit(mut self, limit: usize) -> Self {
        self.stag_limit = limit;
        self
    }

    /// Accumulated outer-iteration count (fractional).
    #[must_use]
    pub const fn iterations(&self) -> f32 {
        self.work
    }

    /// Last recorded (recomputed) residual norm, if any.
    #[must_use]
    pub fn residual_norm(&self) -> Option<R> {
        self.residual.clone()
    }

    /// Effective convergence threshold.
    #[must_use]
    pub fn tolerance(&self) -> R {
        self.tolerance.clone()
    }

    /// Breakdown code recorded by [`Monitor::stop`], if the run was stopped.
    #[must_use]
    pub const fn stop_code(&self) -> Option<i32> {
        if self.stopped {
            Some(self.code)
        } else {
            None
        }
    }

    /// Breakdown reason recorded by [`Monitor::stop`], if the run was stopped.
    #[must_use]
    pub fn stop_reason(&self) -> Option<&str> {
        if self.stopped {
            self.reason.as_deref()
        } else {
            None
        }
    }

    /// True when the run ended by exceeding the stagnation limit.
    #[must_use]
    pub const fn stagnated(&self) -> bool {
        self.stag_count > self.stag_limit
    }
}

impl<R: RealField> Monitor<R> for ResidualMonitor<R> {
    fn increment(&mut self, fractional_work: f32) {
        self.work += fractional_work;
    }

    fn need_check_convergence(&mut self, cheap_norm: R) -> bool {
        cheap_norm <= self.tolerance
    }

    fn finished_with(&mut self, exact_norm: R) -> bool {
        self.residual = Some(exact_norm);
        self.finished()
    }

    fn finished(&self) -> bool {
        self.stopped
            || self.converged()
            || self.work >= self.max_iterations
            || self.stagnated()
    }

    fn stop(&mut self, code: i32, reason: &str) {
        self.stopped = true;
        self.code = code;
        self.reason = Some(reason.to_owned());
    }

    fn increment_stag(&mut self) {
        self.stag_count += 1;
    }

    fn reset_stag(&mut self) {
        self.stag_count = 0;
    }

    fn converged(&self) -> bool {
        self.residual
            .as_ref()
            .is_some_and(|norm| *norm <= self.tolerance)
    }

    fn update_residual(&mut self, norm: R) {
        self.residual = Some(norm);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn monitor() -> ResidualMonitor<f64> {
        ResidualMonitor::new(2.0, 10, 1.0e-6, 1.0e-12)
    }

    #[test]
    fn tolerance_combines_relative_and_absolute() {
        assert_relative_eq!(monitor().tolerance(), 2.0e-6 + 1.0e-12, epsilon = 1e-18);
    }

    #[test]
    fn fresh_monitor_is_neither_finished_nor_converged() {
        let m = monitor();
        assert!(!m.finished());
        assert!(!m.converged());
        assert_eq!(m.residual_norm(), None);
        assert_eq!(m.stop_code(), None);
    }

    #[test]
    fn cheap_norm_triggers_exact_check_at_tolerance() {
        let mut m = monitor();
        assert!(!m.need_check_convergence(1.0e-3));
        assert!(m.need_check_convergence(1.0e-9));
    }

    #[test]
    fn finished_with_records_and_converges() {
        let mut m = monitor();
        assert!(m.finished_with(1.0e-9));
        assert!(m.converged());
        assert_relative_eq!(m.residual_norm().unwrap(), 1.0e-9, epsilon = 1e-18);
    }

    #[test]
    fn exact_norm_above_tolerance_keeps_running() {
        let mut m = monitor();
        assert!(!m.finished_with(1.0e-3));
        assert!(!m.converged());
    }

    #[test]
    fn work_budget_exhaustion_finishes_without_convergence() {
        let mut m = monitor();
        for _ in 0..40 {
            m.increment(0.25);
        }
        assert_relative_eq!(f64::from(m.iterations()), 10.0, epsilon = 1e-6);
        assert!(m.finished());
        assert!(!m.converged());
    }

    #[test]
    fn stop_latches_code_and_reason() {
        let mut m = monitor();
        m.stop(-11, "gamma is zero");
        assert!(m.finished());
        assert!(!m.converged());
        assert_eq!(m.stop_code(), Some(-11));
        assert_eq!(m.stop_reason(), Some("gamma is zero"));
    }

    #[test]
    fn stagnation_limit_finishes_the_run() {
        let mut m = monitor().with_stagnation_limit(3);
        for _ in 0..3 {
            m.increment_stag();
        }
        assert!(!m.finished());
        m.increment_stag();
        assert!(m.finished());
        assert!(m.stagnated());

        let mut reset = monitor().with_stagnation_limit(3);
        for _ in 0..3 {
            reset.increment_stag();
        }
        reset.reset_stag();
        reset.increment_stag();
        assert!(!reset.finished());
    }

    #[test]
    fn update_residual_feeds_convergence() {
        let mut m = monitor();
        m.update_residual(5.0e-13);
        assert!(m.converged());
    }
}
