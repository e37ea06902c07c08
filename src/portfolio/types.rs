//! # Portfolio Types
//!
//! $$
//! \mathcal W=\{\mathbf w\in\mathbb R^N:\ \mathbf 1^\top\mathbf w=1,\ \ell_i\le w_i\le u_i\}
//! $$
//!
//! Asset universe, weight boxes and scored portfolio points.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Display;

use super::error::PortfolioError;

/// Periodic return convention.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReturnKind {
  /// `ln(p_t / p_{t-1})`
  #[default]
  Log,
  /// `p_t / p_{t-1} - 1`
  Simple,
}

impl ReturnKind {
  /// Return between two consecutive prices. Non-finite for non-positive prices.
  pub fn period_return(&self, prev: f64, curr: f64) -> f64 {
    if !(prev > 0.0 && curr > 0.0) {
      return f64::NAN;
    }

    match self {
      Self::Log => (curr / prev).ln(),
      Self::Simple => curr / prev - 1.0,
    }
  }
}

/// Ordered list of asset identifiers with a reverse lookup.
///
/// Every vector and matrix in a run is indexed by position in this list, so
/// dropping an asset always goes through [`AssetUniverse::subset`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetUniverse {
  ids: Vec<String>,
  index: HashMap<String, usize>,
}

impl AssetUniverse {
  pub fn new<I, S>(ids: I) -> Result<Self, PortfolioError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    let mut index = HashMap::with_capacity(ids.len());

    for (i, id) in ids.iter().enumerate() {
      if id.trim().is_empty() {
        return Err(PortfolioError::InvalidInput(format!(
          "asset identifier at position {i} is empty"
        )));
      }
      if index.insert(id.clone(), i).is_some() {
        return Err(PortfolioError::InvalidInput(format!(
          "duplicate asset identifier `{id}`"
        )));
      }
    }

    Ok(Self { ids, index })
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn ids(&self) -> &[String] {
    &self.ids
  }

  pub fn id(&self, idx: usize) -> Option<&str> {
    self.ids.get(idx).map(String::as_str)
  }

  pub fn index_of(&self, id: &str) -> Option<usize> {
    self.index.get(id).copied()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.index.contains_key(id)
  }

  /// Keep only the assets at `positions`, in the given order.
  pub fn subset(&self, positions: &[usize]) -> Self {
    let ids: Vec<String> = positions
      .iter()
      .filter_map(|&i| self.ids.get(i).cloned())
      .collect();
    let index = ids
      .iter()
      .enumerate()
      .map(|(i, id)| (id.clone(), i))
      .collect();
    Self { ids, index }
  }
}

/// Per-asset box constraint `lower_i <= w_i <= upper_i`.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightBounds {
  lower: Vec<f64>,
  upper: Vec<f64>,
}

impl WeightBounds {
  pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, PortfolioError> {
    if lower.len() != upper.len() {
      return Err(PortfolioError::InvalidInput(format!(
        "bounds length mismatch: {} lower vs {} upper",
        lower.len(),
        upper.len()
      )));
    }

    for (i, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
      if !lo.is_finite() || !hi.is_finite() {
        return Err(PortfolioError::InvalidInput(format!(
          "bounds for asset {i} must be finite"
        )));
      }
      if lo > hi {
        return Err(PortfolioError::InvalidInput(format!(
          "lower bound {lo} exceeds upper bound {hi} for asset {i}"
        )));
      }
    }

    let lo_sum: f64 = lower.iter().sum();
    let hi_sum: f64 = upper.iter().sum();
    if lo_sum > 1.0 + 1e-12 || hi_sum < 1.0 - 1e-12 {
      return Err(PortfolioError::InvalidInput(format!(
        "no fully invested portfolio fits the bounds (sum of lower {lo_sum:.6}, sum of upper {hi_sum:.6})"
      )));
    }

    Ok(Self { lower, upper })
  }

  /// `[0, 1]` for every asset: long-only, no leverage.
  pub fn long_only(n: usize) -> Self {
    Self {
      lower: vec![0.0; n],
      upper: vec![1.0; n],
    }
  }

  pub fn len(&self) -> usize {
    self.lower.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lower.is_empty()
  }

  pub fn lower(&self) -> &[f64] {
    &self.lower
  }

  pub fn upper(&self) -> &[f64] {
    &self.upper
  }

  /// True when every box is `[0, 1]`, i.e. the feasible set is the full simplex.
  pub fn is_unit_simplex(&self) -> bool {
    self.lower.iter().all(|&lo| lo == 0.0) && self.upper.iter().all(|&hi| hi >= 1.0)
  }

  pub fn contains(&self, weights: &[f64], tol: f64) -> bool {
    weights.len() == self.len()
      && weights
        .iter()
        .zip(self.lower.iter().zip(self.upper.iter()))
        .all(|(&w, (&lo, &hi))| w >= lo - tol && w <= hi + tol)
  }
}

/// Caller-facing bounds keyed by asset identifier, resolved against the
/// universe that survives cleaning.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetBounds {
  /// Box applied to assets without an override.
  pub default: (f64, f64),
  /// Per-asset position limits.
  pub overrides: BTreeMap<String, (f64, f64)>,
}

impl Default for AssetBounds {
  fn default() -> Self {
    Self {
      default: (0.0, 1.0),
      overrides: BTreeMap::new(),
    }
  }
}

impl AssetBounds {
  /// Same upper limit for every asset, long-only.
  pub fn max_weight(upper: f64) -> Self {
    Self {
      default: (0.0, upper),
      overrides: BTreeMap::new(),
    }
  }

  pub fn with_override(mut self, id: impl Into<String>, lower: f64, upper: f64) -> Self {
    self.overrides.insert(id.into(), (lower, upper));
    self
  }

  /// Overrides naming assets outside the universe are ignored.
  pub fn resolve(&self, universe: &AssetUniverse) -> Result<WeightBounds, PortfolioError> {
    let (lower, upper): (Vec<f64>, Vec<f64>) = universe
      .ids()
      .iter()
      .map(|id| *self.overrides.get(id).unwrap_or(&self.default))
      .unzip();
    WeightBounds::new(lower, upper)
  }
}

/// How much trust a [`PortfolioPoint`] deserves.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointQuality {
  /// Scored from caller weights or a converged solve.
  #[default]
  Exact,
  /// Best point of a solve that stopped on its iteration limit.
  Approximate,
  /// Drawn by the Monte Carlo sampler.
  Sampled,
}

impl Display for PointQuality {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PointQuality::Exact => write!(f, "exact"),
      PointQuality::Approximate => write!(f, "approximate"),
      PointQuality::Sampled => write!(f, "sampled"),
    }
  }
}

/// A weight vector together with its model return, volatility and Sharpe ratio.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioPoint {
  /// Weights in universe order.
  pub weights: Vec<f64>,
  /// `w · mu`
  pub expected_return: f64,
  /// `sqrt(w' Σ w)`
  pub volatility: f64,
  /// `(expected_return - r_f) / volatility`, zero when volatility is zero.
  pub sharpe: f64,
  pub quality: PointQuality,
}

impl PortfolioPoint {
  pub fn is_approximate(&self) -> bool {
    self.quality == PointQuality::Approximate
  }

  pub(crate) fn with_quality(mut self, quality: PointQuality) -> Self {
    self.quality = quality;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn universe_rejects_duplicates() {
    let err = AssetUniverse::new(["AAA", "BBB", "AAA"]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }

  #[test]
  fn subset_reindexes_positions() {
    let universe = AssetUniverse::new(["AAA", "BBB", "CCC"]).unwrap();
    let sub = universe.subset(&[0, 2]);

    assert_eq!(sub.ids(), &["AAA".to_string(), "CCC".to_string()]);
    assert_eq!(sub.index_of("CCC"), Some(1));
    assert_eq!(sub.index_of("BBB"), None);
  }

  #[test]
  fn bounds_must_admit_a_budget_portfolio() {
    assert!(WeightBounds::new(vec![0.0, 0.0], vec![0.4, 0.4]).is_err());
    assert!(WeightBounds::new(vec![0.6, 0.6], vec![1.0, 1.0]).is_err());
    assert!(WeightBounds::new(vec![0.0, 0.0], vec![0.5, 0.5]).is_ok());
  }

  #[test]
  fn asset_bounds_resolve_by_identifier() {
    let universe = AssetUniverse::new(["AAA", "BBB", "CCC"]).unwrap();
    let bounds = AssetBounds::max_weight(0.6)
      .with_override("BBB", 0.1, 0.3)
      .with_override("ZZZ", 0.0, 0.0)
      .resolve(&universe)
      .unwrap();

    assert_eq!(bounds.lower(), &[0.0, 0.1, 0.0]);
    assert_eq!(bounds.upper(), &[0.6, 0.3, 0.6]);
    assert!(!bounds.is_unit_simplex());
  }

  #[test]
  fn non_positive_prices_yield_nan_returns() {
    assert!(ReturnKind::Log.period_return(0.0, 1.0).is_nan());
    assert!((ReturnKind::Simple.period_return(100.0, 110.0) - 0.1).abs() < 1e-12);
  }
}
