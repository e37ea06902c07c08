//! # Monte Carlo Portfolios
//!
//! $$
//! \mathbf w^{(k)}\sim\operatorname{Dir}(\alpha\mathbf 1),\qquad
//! \mathbf w^{(k)}\ \text{accepted iff}\ \ell\le\mathbf w^{(k)}\le u
//! $$
//!
//! Random feasible portfolios for risk/return clouds and as a cross-check of
//! the analytic optimizers.

use impl_new_derive::ImplNew;
use ordered_float::OrderedFloat;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Dirichlet;
use rand_distr::Distribution;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::error::PortfolioError;
use super::risk_model::RiskModel;
use super::scorer::score_unchecked;
use super::types::PointQuality;
use super::types::PortfolioPoint;
use super::types::WeightBounds;

/// Smallest block of attempts evaluated together when rejecting.
const REJECTION_BLOCK: usize = 1024;

/// Sampler knobs carried by the engine configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MonteCarloSettings {
  pub n_samples: usize,
  /// Symmetric Dirichlet concentration, `1.0` is uniform on the simplex.
  pub concentration: f64,
  /// `None` draws a fresh seed per run.
  pub seed: Option<u64>,
  /// Attempt ceiling as a multiple of `n_samples`.
  pub rejection_factor: usize,
}

impl Default for MonteCarloSettings {
  fn default() -> Self {
    Self {
      n_samples: 10_000,
      concentration: 1.0,
      seed: Some(42),
      rejection_factor: 50,
    }
  }
}

/// Draws Dirichlet portfolios, rejecting those outside `bounds`.
#[derive(ImplNew, Clone, Debug)]
pub struct MonteCarloSampler {
  pub n_samples: usize,
  pub concentration: f64,
  pub seed: Option<u64>,
  pub rejection_factor: usize,
  pub bounds: Option<WeightBounds>,
}

impl MonteCarloSampler {
  pub fn from_settings(settings: &MonteCarloSettings, bounds: Option<WeightBounds>) -> Self {
    Self::new(
      settings.n_samples,
      settings.concentration,
      settings.seed,
      settings.rejection_factor,
      bounds,
    )
  }

  /// Draw and score one independent batch.
  ///
  /// Attempt `k` uses its own RNG seeded from `(seed, k)` and accepted draws
  /// are kept in attempt order, so the cloud does not depend on how rayon
  /// schedules the work.
  pub fn sample(&self, model: &RiskModel, risk_free: f64) -> Result<SimulationCloud, PortfolioError> {
    let n = model.n_assets();
    if n == 0 || self.n_samples == 0 {
      return Err(PortfolioError::InvalidInput(
        "sampling needs at least one asset and one sample".into(),
      ));
    }
    if !(self.concentration.is_finite() && self.concentration > 0.0) {
      return Err(PortfolioError::InvalidInput(format!(
        "Dirichlet concentration must be positive, got {}",
        self.concentration
      )));
    }
    if let Some(bounds) = &self.bounds {
      if bounds.len() != n {
        return Err(PortfolioError::InvalidInput(format!(
          "{} bounds for {n} assets",
          bounds.len()
        )));
      }
    }

    let bounds = self.bounds.as_ref().filter(|b| !b.is_unit_simplex());
    let seed = self.seed.unwrap_or_else(rand::random);
    let ceiling = self
      .n_samples
      .saturating_mul(self.rejection_factor.max(1));
    let dirichlet = if n > 1 {
      Some(
        Dirichlet::new_with_size(self.concentration, n)
          .map_err(|e| PortfolioError::InvalidInput(e.to_string()))?,
      )
    } else {
      None
    };

    let mut accepted: Vec<Vec<f64>> = Vec::with_capacity(self.n_samples);
    let mut attempts = 0usize;

    while accepted.len() < self.n_samples && attempts < ceiling {
      let needed = self.n_samples - accepted.len();
      let block = match bounds {
        Some(_) => (2 * needed).max(REJECTION_BLOCK),
        None => needed,
      }
      .min(ceiling - attempts);

      let draws: Vec<Option<Vec<f64>>> = (attempts..attempts + block)
        .into_par_iter()
        .map(|k| {
          let w = match &dirichlet {
            Some(dist) => {
              let mut rng = StdRng::seed_from_u64(stream_seed(seed, k as u64));
              dist.sample(&mut rng)
            }
            None => vec![1.0],
          };
          let finite = w.iter().all(|v| v.is_finite());
          let inside = bounds.map_or(true, |b| b.contains(&w, 0.0));
          (finite && inside).then_some(w)
        })
        .collect();

      attempts += block;
      accepted.extend(draws.into_iter().flatten().take(needed));
    }

    if accepted.len() < self.n_samples {
      warn!(
        requested = self.n_samples,
        accepted = accepted.len(),
        attempts,
        "rejection sampling exhausted its attempt budget"
      );
      return Err(PortfolioError::InfeasibleBounds {
        requested: self.n_samples,
        accepted: accepted.len(),
        attempts,
      });
    }

    let points: Vec<PortfolioPoint> = accepted
      .into_par_iter()
      .map(|w| score_unchecked(w, model, risk_free).with_quality(PointQuality::Sampled))
      .collect();

    debug!(samples = points.len(), attempts, seed, "sampled portfolio cloud");

    Ok(SimulationCloud {
      points,
      attempts,
      seed,
    })
  }
}

/// Scored Monte Carlo portfolios in draw order.
#[derive(Clone, Debug, Default)]
pub struct SimulationCloud {
  points: Vec<PortfolioPoint>,
  attempts: usize,
  seed: u64,
}

impl SimulationCloud {
  pub fn points(&self) -> &[PortfolioPoint] {
    &self.points
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Dirichlet draws spent, rejected ones included.
  pub fn attempts(&self) -> usize {
    self.attempts
  }

  /// Seed the batch was drawn with, for reproducing it.
  pub fn seed(&self) -> u64 {
    self.seed
  }

  pub fn max_sharpe(&self) -> Option<&PortfolioPoint> {
    self.points.iter().max_by_key(|p| OrderedFloat(p.sharpe))
  }

  pub fn max_return(&self) -> Option<&PortfolioPoint> {
    self.points.iter().max_by_key(|p| OrderedFloat(p.expected_return))
  }

  pub fn min_volatility(&self) -> Option<&PortfolioPoint> {
    self.points.iter().min_by_key(|p| OrderedFloat(p.volatility))
  }
}

/// SplitMix64 finalizer over `(seed, index)`.
fn stream_seed(seed: u64, index: u64) -> u64 {
  let mut z = seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
  z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
  z ^ (z >> 31)
}
