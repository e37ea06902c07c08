//! # Portfolio Scorer
//!
//! $$
//! \mu_p=\mathbf w^\top\mu,\qquad \sigma_p=\sqrt{\mathbf w^\top\Sigma\mathbf w},\qquad
//! S_p=\frac{\mu_p-r_f}{\sigma_p}
//! $$
//!

use super::error::PortfolioError;
use super::risk_model::RiskModel;
use super::types::PointQuality;
use super::types::PortfolioPoint;

/// Objective functions bound to one risk model.
///
/// Every optimizer and the sampler evaluate weights through this trait so the
/// quadratic form lives in one place.
pub trait PortfolioObjectiveExt {
  /// `w · mu`
  fn evaluate_return(&self, weights: &[f64]) -> f64;

  /// `w' Σ w`, clamped at zero.
  fn evaluate_variance(&self, weights: &[f64]) -> f64;

  /// `sqrt(w' Σ w)`
  fn evaluate_volatility(&self, weights: &[f64]) -> f64 {
    self.evaluate_variance(weights).sqrt()
  }

  /// Sharpe ratio, zero for a zero-volatility portfolio.
  fn evaluate_sharpe(&self, weights: &[f64], risk_free: f64) -> f64 {
    sharpe_ratio(
      self.evaluate_return(weights),
      self.evaluate_volatility(weights),
      risk_free,
    )
  }

  fn evaluate_negative_sharpe(&self, weights: &[f64], risk_free: f64) -> f64 {
    -self.evaluate_sharpe(weights, risk_free)
  }
}

impl PortfolioObjectiveExt for RiskModel {
  fn evaluate_return(&self, weights: &[f64]) -> f64 {
    weights
      .iter()
      .zip(self.expected_returns().iter())
      .map(|(w, m)| w * m)
      .sum()
  }

  fn evaluate_variance(&self, weights: &[f64]) -> f64 {
    let cov = self.covariance();
    let mut var = 0.0;
    for (i, &wi) in weights.iter().enumerate() {
      if wi == 0.0 {
        continue;
      }
      let row = cov.row(i);
      let sigma_w: f64 = row.iter().zip(weights.iter()).map(|(c, w)| c * w).sum();
      var += wi * sigma_w;
    }
    // Rounding can push a PSD quadratic form slightly below zero.
    var.max(0.0)
  }
}

/// `(ret - r_f) / vol`, defined as zero when `vol` is exactly zero.
pub fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free: f64) -> f64 {
  if volatility > 0.0 {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  }
}

/// Score one weight vector against a risk model.
pub fn score_portfolio(
  weights: &[f64],
  model: &RiskModel,
  risk_free: f64,
) -> Result<PortfolioPoint, PortfolioError> {
  if weights.len() != model.n_assets() {
    return Err(PortfolioError::InvalidInput(format!(
      "{} weights for {} assets",
      weights.len(),
      model.n_assets()
    )));
  }
  if weights.iter().any(|w| !w.is_finite()) {
    return Err(PortfolioError::InvalidInput("weights must be finite".into()));
  }

  Ok(score_unchecked(weights.to_vec(), model, risk_free))
}

pub(crate) fn score_unchecked(weights: Vec<f64>, model: &RiskModel, risk_free: f64) -> PortfolioPoint {
  let expected_return = model.evaluate_return(&weights);
  let volatility = model.evaluate_volatility(&weights);
  PortfolioPoint {
    sharpe: sharpe_ratio(expected_return, volatility, risk_free),
    weights,
    expected_return,
    volatility,
    quality: PointQuality::Exact,
  }
}
