//! # Efficient Frontier
//!
//! $$
//! \sigma^\*(m)=\min_{\mathbf w}\sqrt{\mathbf w^\top\Sigma\mathbf w}
//! \quad\text{s.t.}\quad \mathbf w^\top\mu=m,\ \mathbf 1^\top\mathbf w=1,\ \ell\le\mathbf w\le u
//! $$
//!
//! Minimum-volatility curve over an even grid of target returns.

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::error::PortfolioError;
use super::optimizers::PortfolioOptimizer;
use super::optimizers::ReturnConstraint;
use super::optimizers::SolverSettings;
use super::risk_model::RiskModel;
use super::types::PortfolioPoint;
use super::types::WeightBounds;

/// One grid point: its target and either the solved portfolio or the reason
/// there is none.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontierPoint {
  pub target_return: f64,
  pub result: Result<PortfolioPoint, PortfolioError>,
}

impl FrontierPoint {
  pub fn is_valid(&self) -> bool {
    self.result.is_ok()
  }

  /// `None` when the grid point is infeasible or its solve failed.
  pub fn volatility(&self) -> Option<f64> {
    self.point().map(|p| p.volatility)
  }

  pub fn point(&self) -> Option<&PortfolioPoint> {
    self.result.as_ref().ok()
  }
}

/// Traced frontier, grid points ordered by increasing target return.
#[derive(Clone, Debug)]
pub struct EfficientFrontier {
  points: Vec<FrontierPoint>,
  min_volatility: Result<PortfolioPoint, PortfolioError>,
}

impl EfficientFrontier {
  pub fn points(&self) -> &[FrontierPoint] {
    &self.points
  }

  /// Solved grid points only; what a chart should draw.
  pub fn valid_points(&self) -> impl Iterator<Item = (f64, &PortfolioPoint)> + '_ {
    self
      .points
      .iter()
      .filter_map(|p| p.point().map(|point| (p.target_return, point)))
  }

  pub fn n_valid(&self) -> usize {
    self.points.iter().filter(|p| p.is_valid()).count()
  }

  /// Global minimum-volatility portfolio, the pivot of the curve.
  pub fn min_volatility(&self) -> Result<&PortfolioPoint, &PortfolioError> {
    self.min_volatility.as_ref()
  }

  /// Solved points at or above the pivot's return. Falls back to the lowest
  /// volatility grid point when the pivot solve failed.
  pub fn efficient_branch(&self) -> Vec<&PortfolioPoint> {
    let pivot_return = match &self.min_volatility {
      Ok(p) => Some(p.expected_return),
      Err(_) => self
        .valid_points()
        .min_by_key(|(_, p)| OrderedFloat(p.volatility))
        .map(|(_, p)| p.expected_return),
    };
    let Some(pivot_return) = pivot_return else {
      return Vec::new();
    };

    self
      .valid_points()
      .map(|(_, p)| p)
      .filter(|p| p.expected_return >= pivot_return - 1e-9)
      .collect()
  }
}

/// Repeats the minimum-volatility solve across a grid of target returns.
#[derive(Clone, Debug)]
pub struct FrontierTracer {
  pub n_points: usize,
  pub bounds: Option<WeightBounds>,
  pub risk_free: f64,
  pub settings: SolverSettings,
}

impl FrontierTracer {
  pub fn new(
    n_points: usize,
    bounds: Option<WeightBounds>,
    risk_free: f64,
    settings: SolverSettings,
  ) -> Self {
    Self {
      n_points,
      bounds,
      risk_free,
      settings,
    }
  }

  /// Even grid from the lowest to the highest asset return.
  pub fn grid(&self, model: &RiskModel) -> Vec<f64> {
    let (lo, hi) = model.return_range();
    match self.n_points {
      0 => Vec::new(),
      1 => vec![0.5 * (lo + hi)],
      n => (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
        .collect(),
    }
  }

  /// Trace the curve. Grid points are solved in parallel; a failed point is
  /// recorded and never aborts the others.
  pub fn trace(&self, model: &RiskModel) -> Result<EfficientFrontier, PortfolioError> {
    if self.n_points < 2 {
      return Err(PortfolioError::InvalidConfig(format!(
        "frontier needs at least 2 grid points, got {}",
        self.n_points
      )));
    }

    let optimizer = PortfolioOptimizer::new(model, self.bounds.clone(), self.risk_free, self.settings)?;
    let min_volatility = optimizer.min_volatility(None);

    let points: Vec<FrontierPoint> = self
      .grid(model)
      .into_par_iter()
      .map(|target| {
        let result = optimizer.min_volatility(Some(ReturnConstraint::Exactly(target)));
        if let Err(err) = &result {
          warn!(target_return = target, %err, "frontier grid point has no solution");
        }
        FrontierPoint {
          target_return: target,
          result,
        }
      })
      .collect();

    debug!(
      grid = points.len(),
      solved = points.iter().filter(|p| p.is_valid()).count(),
      "traced efficient frontier"
    );

    Ok(EfficientFrontier {
      points,
      min_volatility,
    })
  }
}
