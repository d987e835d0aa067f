//! Error types for the optimization engine.
//!
//! Data and degeneracy errors abort a request. `InfeasibleTarget` is the one
//! variant the frontier sweep recovers from locally by dropping the grid point.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the estimator and the optimizers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Too few observations or assets.
    #[error("Insufficient data: {reason}")]
    InsufficientData {
        /// What was missing.
        reason: String,
    },

    /// The solver exhausted its iteration budget without a feasible solution.
    #[error("Optimization diverged in {solver} after {iterations} iterations")]
    OptimizationDiverged {
        /// Which optimizer gave up.
        solver: &'static str,
        /// Iterations spent.
        iterations: u64,
    },

    /// A ratio would divide by a (near) zero risk.
    #[error("Degenerate risk in {operation}: portfolio risk {risk:e} is indistinguishable from zero")]
    DegenerateRisk {
        /// The operation that needed the ratio.
        operation: &'static str,
        /// The offending risk value.
        risk: f64,
    },

    /// No long-only portfolio attains the requested return.
    #[error("Infeasible target return {target}: attainable range is [{min}, {max}]")]
    InfeasibleTarget {
        /// Requested portfolio return.
        target: f64,
        /// Lowest attainable return.
        min: f64,
        /// Highest attainable return.
        max: f64,
    },

    /// A solver output could not be repaired into a valid weight vector.
    #[error("Invalid weights: {reason}")]
    InvalidWeights {
        /// Why the vector was rejected.
        reason: String,
    },
}

impl EngineError {
    /// Create an insufficient data error.
    #[must_use]
    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    /// Create an invalid weights error.
    #[must_use]
    pub fn invalid_weights(reason: impl Into<String>) -> Self {
        Self::InvalidWeights {
            reason: reason.into(),
        }
    }

    /// Create a diverged error.
    #[must_use]
    pub fn diverged(solver: &'static str, iterations: u64) -> Self {
        Self::OptimizationDiverged { solver, iterations }
    }
}
