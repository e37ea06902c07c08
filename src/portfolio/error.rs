//! # Portfolio Errors
//!
//! $$
//! \text{estimation error}\Rightarrow\text{abort},\qquad \text{solver error}\Rightarrow\text{local}
//! $$
//!
//! Error taxonomy shared by the estimation, optimization and sampling stages.

use thiserror::Error;

/// Errors raised by the portfolio engine and its components.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PortfolioError {
  /// Fewer usable assets than a covariance needs after cleaning.
  #[error("insufficient data: {retained} asset(s) retained after cleaning, at least {required} required")]
  InsufficientAssets { retained: usize, required: usize },

  /// Too short an observation window after cleaning.
  #[error("insufficient data: {periods} return period(s) available, at least {required} required")]
  InsufficientPeriods { periods: usize, required: usize },

  /// Shrunk covariance failed the positive semi-definiteness check.
  #[error("degenerate covariance: {0}")]
  DegenerateCovariance(String),

  /// Solver failure for one requested portfolio.
  #[error("optimization did not converge for {objective}: {reason}")]
  OptimizationDidNotConverge { objective: String, reason: String },

  /// Target return not attainable under the weight bounds.
  #[error("target return {target:.6} outside attainable range [{min:.6}, {max:.6}]")]
  InfeasibleTarget { target: f64, min: f64, max: f64 },

  /// Monte Carlo sampler could not satisfy the configured bounds.
  #[error("infeasible bounds: {accepted} of {requested} samples accepted after {attempts} attempts")]
  InfeasibleBounds {
    requested: usize,
    accepted: usize,
    attempts: usize,
  },

  /// Malformed caller input (price tables, bounds, weights).
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Inconsistent engine configuration.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
}

impl PortfolioError {
  /// Internal invariant violations that must halt the whole run.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::DegenerateCovariance(_))
  }

  /// Errors a caller can act on (wider window, relaxed bounds, retry).
  pub fn is_recoverable(&self) -> bool {
    !self.is_fatal()
  }

  pub(crate) fn not_converged(objective: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::OptimizationDidNotConverge {
      objective: objective.into(),
      reason: reason.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_degenerate_covariance_is_fatal() {
    assert!(PortfolioError::DegenerateCovariance("neg eigenvalue".into()).is_fatal());
    assert!(PortfolioError::InsufficientAssets {
      retained: 1,
      required: 2
    }
    .is_recoverable());
    assert!(PortfolioError::not_converged("max_sharpe", "iteration limit").is_recoverable());
  }

  #[test]
  fn messages_name_the_shortfall() {
    let err = PortfolioError::InsufficientPeriods {
      periods: 12,
      required: 30,
    };
    assert_eq!(
      err.to_string(),
      "insufficient data: 12 return period(s) available, at least 30 required"
    );
  }
}
