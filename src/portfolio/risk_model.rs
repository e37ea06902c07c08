//! # Risk Model
//!
//! $$
//! \hat\Sigma=(1-\delta)S+\delta\,\bar m\,I,\qquad \bar m=\tfrac1N\operatorname{tr}S,\qquad
//! \delta=\min\!\Big(1,\frac{b^2}{d^2}\Big)
//! $$
//!
//! Annualized expected returns and a Ledoit-Wolf shrunk covariance.

use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;

use super::data::ReturnSeries;
use super::error::PortfolioError;
use super::types::AssetUniverse;

/// Trading days per year.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

/// Relative eigenvalue tolerance for the semi-definiteness check.
const PSD_TOL: f64 = 1e-12;

/// Expected-return vector and covariance matrix over one asset universe.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskModel {
  universe: AssetUniverse,
  expected_returns: Array1<f64>,
  covariance: Array2<f64>,
  shrinkage: f64,
}

impl RiskModel {
  /// Assemble a model from known annualized moments.
  pub fn new(
    universe: AssetUniverse,
    expected_returns: Array1<f64>,
    covariance: Array2<f64>,
  ) -> Result<Self, PortfolioError> {
    let n = universe.len();
    if expected_returns.len() != n || covariance.dim() != (n, n) {
      return Err(PortfolioError::InvalidInput(format!(
        "risk model dimensions disagree: {n} assets, {} returns, {:?} covariance",
        expected_returns.len(),
        covariance.dim()
      )));
    }
    if expected_returns.iter().any(|m| !m.is_finite()) {
      return Err(PortfolioError::InvalidInput(
        "expected returns must be finite".into(),
      ));
    }

    let scale = covariance.iter().fold(1.0f64, |acc, v| acc.max(v.abs()));
    for i in 0..n {
      for j in (i + 1)..n {
        if (covariance[[i, j]] - covariance[[j, i]]).abs() > 1e-10 * scale {
          return Err(PortfolioError::InvalidInput(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    check_positive_semi_definite(covariance.view())?;

    Ok(Self {
      universe,
      expected_returns,
      covariance,
      shrinkage: 0.0,
    })
  }

  pub fn universe(&self) -> &AssetUniverse {
    &self.universe
  }

  pub fn n_assets(&self) -> usize {
    self.expected_returns.len()
  }

  pub fn expected_returns(&self) -> &Array1<f64> {
    &self.expected_returns
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  /// Shrinkage intensity the estimator applied, zero for hand-built models.
  pub fn shrinkage(&self) -> f64 {
    self.shrinkage
  }

  /// Per-asset annualized volatilities.
  pub fn volatilities(&self) -> Array1<f64> {
    self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Correlation matrix implied by the covariance.
  pub fn correlation(&self) -> Array2<f64> {
    let n = self.n_assets();
    let sigmas = self.volatilities();
    Array2::from_shape_fn((n, n), |(i, j)| {
      let denom = sigmas[i] * sigmas[j];
      if i == j {
        1.0
      } else if denom > 1e-15 {
        (self.covariance[[i, j]] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    })
  }

  /// Smallest and largest expected return in the universe.
  pub fn return_range(&self) -> (f64, f64) {
    self
      .expected_returns
      .iter()
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &m| {
        (lo.min(m), hi.max(m))
      })
  }
}

/// Turns a [`ReturnSeries`] into an annualized [`RiskModel`].
#[derive(Clone, Copy, Debug)]
pub struct RiskModelEstimator {
  pub periods_per_year: f64,
  /// Lower clamp on the data-driven shrinkage intensity.
  pub shrinkage_floor: f64,
}

impl Default for RiskModelEstimator {
  fn default() -> Self {
    Self {
      periods_per_year: DEFAULT_PERIODS_PER_YEAR,
      shrinkage_floor: 1e-6,
    }
  }
}

impl RiskModelEstimator {
  pub fn estimate(&self, series: &ReturnSeries) -> Result<RiskModel, PortfolioError> {
    let returns = series.returns();
    if returns.nrows() < 2 || returns.ncols() == 0 {
      return Err(PortfolioError::InsufficientPeriods {
        periods: returns.nrows(),
        required: 2,
      });
    }

    let mean = returns
      .mean_axis(Axis(0))
      .ok_or_else(|| PortfolioError::InvalidInput("empty return series".into()))?;
    let expected_returns = &mean * self.periods_per_year;

    let (shrunk, shrinkage) = ledoit_wolf(returns, self.shrinkage_floor);
    let covariance = shrunk * self.periods_per_year;

    check_positive_semi_definite(covariance.view())?;

    debug!(
      assets = series.n_assets(),
      periods = series.n_periods(),
      shrinkage,
      "estimated risk model"
    );

    Ok(RiskModel {
      universe: series.universe().clone(),
      expected_returns,
      covariance,
      shrinkage,
    })
  }
}

/// Ledoit-Wolf shrinkage of the sample covariance toward a scaled identity.
///
/// Returns the shrunk per-period covariance and the intensity used. The
/// sample covariance is the maximum-likelihood estimate on demeaned returns.
pub fn ledoit_wolf(returns: ArrayView2<'_, f64>, floor: f64) -> (Array2<f64>, f64) {
  let n_obs = returns.nrows() as f64;
  let n_assets = returns.ncols();
  let p = n_assets as f64;

  let mean = returns
    .mean_axis(Axis(0))
    .unwrap_or_else(|| Array1::zeros(n_assets));
  let x = &returns - &mean;

  let sample = x.t().dot(&x) / n_obs;
  let sample = (&sample + &sample.t()) * 0.5;
  let trace = sample.diag().sum();
  let target = trace / p;

  let x2 = x.mapv(|v| v * v);
  let sum_sq_sample: f64 = sample.iter().map(|v| v * v).sum();
  let beta_raw: f64 = x2.t().dot(&x2).sum();

  let beta = (beta_raw / n_obs - sum_sq_sample) / (p * n_obs);
  let delta = (sum_sq_sample - 2.0 * target * trace + p * target * target) / p;
  let beta = beta.min(delta);

  let intensity = if delta > 0.0 && beta > 0.0 {
    beta / delta
  } else {
    0.0
  };
  let intensity = intensity.clamp(floor.clamp(0.0, 1.0), 1.0);

  let mut shrunk = sample * (1.0 - intensity);
  for i in 0..n_assets {
    shrunk[[i, i]] += intensity * target;
  }

  (shrunk, intensity)
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue(matrix: ArrayView2<'_, f64>) -> f64 {
  let n = matrix.nrows();
  if n == 0 {
    return 0.0;
  }
  let m = DMatrix::from_fn(n, n, |i, j| matrix[[i, j]]);
  m.symmetric_eigen().eigenvalues.min()
}

fn check_positive_semi_definite(covariance: ArrayView2<'_, f64>) -> Result<(), PortfolioError> {
  if covariance.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::DegenerateCovariance(
      "covariance contains non-finite entries".into(),
    ));
  }

  let scale = covariance.diag().iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
  let min_eig = min_eigenvalue(covariance);
  if min_eig < -PSD_TOL * scale.max(1.0) {
    return Err(PortfolioError::DegenerateCovariance(format!(
      "smallest eigenvalue {min_eig:.3e} is negative"
    )));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use ndarray::array;
  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use rand_distr::Distribution;
  use rand_distr::StandardNormal;

  use super::*;
  use crate::portfolio::types::ReturnKind;

  fn random_series(n_periods: usize, n_assets: usize, seed: u64) -> ReturnSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let returns = Array2::from_shape_fn((n_periods, n_assets), |(_, j)| {
      let z: f64 = StandardNormal.sample(&mut rng);
      0.0004 * (j as f64 + 1.0) + 0.01 * z
    });
    let ids: Vec<String> = (0..n_assets).map(|j| format!("A{j}")).collect();
    ReturnSeries::new(AssetUniverse::new(ids).unwrap(), returns, ReturnKind::Log).unwrap()
  }

  #[test]
  fn annualizes_mean_returns() {
    let returns = array![[0.01, 0.02], [0.03, -0.02], [0.02, 0.0]];
    let series = ReturnSeries::new(
      AssetUniverse::new(["AAA", "BBB"]).unwrap(),
      returns,
      ReturnKind::Simple,
    )
    .unwrap();
    let model = RiskModelEstimator::default().estimate(&series).unwrap();

    assert!((model.expected_returns()[0] - 0.02 * 252.0).abs() < 1e-12);
    assert!(model.expected_returns()[1].abs() < 1e-12);
  }

  #[test]
  fn estimation_is_bitwise_deterministic() {
    let series = random_series(120, 6, 11);
    let estimator = RiskModelEstimator::default();
    let a = estimator.estimate(&series).unwrap();
    let b = estimator.estimate(&series).unwrap();

    assert_eq!(a.expected_returns(), b.expected_returns());
    assert_eq!(a.covariance(), b.covariance());
    assert_eq!(a.shrinkage().to_bits(), b.shrinkage().to_bits());
  }

  #[test]
  fn shrunk_covariance_is_symmetric_positive_definite() {
    // More assets than periods: the sample covariance is singular.
    let series = random_series(8, 12, 3);
    let model = RiskModelEstimator::default().estimate(&series).unwrap();
    let cov = model.covariance();

    for i in 0..cov.nrows() {
      for j in 0..cov.ncols() {
        assert_eq!(cov[[i, j]].to_bits(), cov[[j, i]].to_bits());
      }
    }
    assert!(min_eigenvalue(cov.view()) > 0.0);
    assert!(model.shrinkage() > 0.0 && model.shrinkage() <= 1.0);
  }

  #[test]
  fn two_period_series_still_positive_definite() {
    let returns = array![[0.01, 0.02, -0.01], [-0.01, 0.0, 0.01]];
    let series = ReturnSeries::new(
      AssetUniverse::new(["A", "B", "C"]).unwrap(),
      returns,
      ReturnKind::Log,
    )
    .unwrap();
    let model = RiskModelEstimator::default().estimate(&series).unwrap();

    assert!(min_eigenvalue(model.covariance().view()) > 0.0);
  }

  #[test]
  fn intensity_matches_hand_computation() {
    let returns = array![[0.01, 0.03], [-0.02, 0.01], [0.03, -0.02], [0.0, 0.02]];
    let (shrunk, delta) = ledoit_wolf(returns.view(), 0.0);

    let x = &returns - &returns.mean_axis(Axis(0)).unwrap();
    let s = x.t().dot(&x) / 4.0;
    let m = (s[[0, 0]] + s[[1, 1]]) / 2.0;
    let d2 = ((s[[0, 0]] - m).powi(2) + (s[[1, 1]] - m).powi(2) + 2.0 * s[[0, 1]].powi(2)) / 2.0;
    let mut b_bar2 = 0.0;
    for t in 0..4 {
      let xt = x.row(t);
      let outer_dev = (xt[0] * xt[0] - s[[0, 0]]).powi(2)
        + (xt[1] * xt[1] - s[[1, 1]]).powi(2)
        + 2.0 * (xt[0] * xt[1] - s[[0, 1]]).powi(2);
      b_bar2 += outer_dev / 2.0;
    }
    let b2 = (b_bar2 / 16.0).min(d2);
    let expected = b2 / d2;

    assert!((delta - expected).abs() < 1e-12);
    assert!((shrunk[[0, 1]] - (1.0 - expected) * s[[0, 1]]).abs() < 1e-15);
  }

  #[test]
  fn rejects_indefinite_covariance() {
    let err = RiskModel::new(
      AssetUniverse::new(["A", "B"]).unwrap(),
      array![0.1, 0.05],
      array![[0.04, 0.1], [0.1, 0.04]],
    )
    .unwrap_err();
    assert!(err.is_fatal());
  }

  #[test]
  fn correlation_from_covariance() {
    let model = RiskModel::new(
      AssetUniverse::new(["A", "B"]).unwrap(),
      array![0.1, 0.05],
      array![[0.04, 0.012], [0.012, 0.09]],
    )
    .unwrap();
    let corr = model.correlation();

    assert!((corr[[0, 1]] - 0.2).abs() < 1e-12);
    assert_eq!(corr[[1, 1]], 1.0);
    assert_eq!(model.return_range(), (0.05, 0.1));
  }
}
