//! # Reference Portfolio
//!
//! $$
//! \Big|\sum_i w_i-1\Big|\le\varepsilon,\qquad \ell_i\le w_i\le u_i
//! $$
//!
//! Caller-supplied ("informed") weights are checked against the cleaned
//! universe and scored only when every check passes. Invalid weights are
//! reported, never clamped or renormalized.

use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use super::error::PortfolioError;
use super::risk_model::RiskModel;
use super::scorer::score_unchecked;
use super::types::PortfolioPoint;
use super::types::WeightBounds;

/// Weights keyed by asset identifier, in the order the caller gave them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferencePortfolio {
  entries: Vec<(String, f64)>,
}

impl ReferencePortfolio {
  pub fn new<I, S>(entries: I) -> Self
  where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
  {
    Self {
      entries: entries.into_iter().map(|(id, w)| (id.into(), w)).collect(),
    }
  }

  pub fn entries(&self) -> &[(String, f64)] {
    &self.entries
  }

  pub fn total(&self) -> f64 {
    self.entries.iter().map(|(_, w)| w).sum()
  }
}

/// Parses `AAA=0.6,BBB=0.4`.
impl FromStr for ReferencePortfolio {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut entries = Vec::new();
    for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
      let (id, weight) = item.split_once('=').ok_or_else(|| {
        PortfolioError::InvalidInput(format!("expected ASSET=WEIGHT, got '{item}'"))
      })?;
      let weight: f64 = weight.trim().parse().map_err(|_| {
        PortfolioError::InvalidInput(format!("weight for '{}' is not a number", id.trim()))
      })?;
      entries.push((id.trim().to_string(), weight));
    }
    Ok(Self { entries })
  }
}

/// One reason a reference portfolio cannot be scored.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReferenceIssue {
  #[error("reference portfolio has no weights")]
  Empty,

  #[error("weights sum to {sum:.6}, expected 1 within {tolerance:e}")]
  BudgetMismatch { sum: f64, tolerance: f64 },

  #[error("weight for {asset} is not finite")]
  NonFinite { asset: String },

  #[error("{asset} is listed more than once")]
  Duplicate { asset: String },

  #[error("{asset} is not in the asset universe")]
  UnknownAsset { asset: String },

  #[error("{asset} was dropped during cleaning but carries weight {weight}")]
  DroppedAsset { asset: String, weight: f64 },

  #[error("weight {weight} for {asset} outside [{lower}, {upper}]")]
  OutOfBounds {
    asset: String,
    weight: f64,
    lower: f64,
    upper: f64,
  },
}

/// What became of the reference portfolio in one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ReferenceOutcome {
  #[default]
  NotSupplied,
  Scored(PortfolioPoint),
  Rejected(Vec<ReferenceIssue>),
}

impl ReferenceOutcome {
  pub fn point(&self) -> Option<&PortfolioPoint> {
    match self {
      Self::Scored(point) => Some(point),
      _ => None,
    }
  }

  pub fn issues(&self) -> &[ReferenceIssue] {
    match self {
      Self::Rejected(issues) => issues,
      _ => &[],
    }
  }
}

impl Display for ReferenceOutcome {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NotSupplied => write!(f, "not supplied"),
      Self::Scored(_) => write!(f, "scored"),
      Self::Rejected(issues) => {
        let reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();
        write!(f, "rejected: {}", reasons.join("; "))
      }
    }
  }
}

/// Align reference weights to the model's universe, collecting every issue.
///
/// Assets the caller leaves out get weight zero.
pub fn align_reference(
  reference: &ReferencePortfolio,
  model: &RiskModel,
  bounds: &WeightBounds,
  dropped: &[String],
  tolerance: f64,
) -> Result<Vec<f64>, Vec<ReferenceIssue>> {
  if reference.entries().is_empty() {
    return Err(vec![ReferenceIssue::Empty]);
  }

  let universe = model.universe();
  let mut issues = Vec::new();
  let mut seen = HashSet::new();
  let mut weights = vec![0.0; universe.len()];

  for (asset, weight) in reference.entries() {
    if !seen.insert(asset.as_str()) {
      issues.push(ReferenceIssue::Duplicate {
        asset: asset.clone(),
      });
      continue;
    }
    if !weight.is_finite() {
      issues.push(ReferenceIssue::NonFinite {
        asset: asset.clone(),
      });
      continue;
    }
    match universe.index_of(asset) {
      Some(idx) => weights[idx] = *weight,
      None if dropped.contains(asset) => {
        if *weight != 0.0 {
          issues.push(ReferenceIssue::DroppedAsset {
            asset: asset.clone(),
            weight: *weight,
          });
        }
      }
      None => issues.push(ReferenceIssue::UnknownAsset {
        asset: asset.clone(),
      }),
    }
  }

  for (idx, &w) in weights.iter().enumerate() {
    let (lower, upper) = (bounds.lower()[idx], bounds.upper()[idx]);
    if w < lower - tolerance || w > upper + tolerance {
      issues.push(ReferenceIssue::OutOfBounds {
        asset: universe.ids()[idx].clone(),
        weight: w,
        lower,
        upper,
      });
    }
  }

  let sum = reference.total();
  if sum.is_finite() && (sum - 1.0).abs() > tolerance {
    issues.push(ReferenceIssue::BudgetMismatch { sum, tolerance });
  }

  if issues.is_empty() {
    Ok(weights)
  } else {
    Err(issues)
  }
}

/// Validate and score; every issue is logged as a warning.
pub fn evaluate_reference(
  reference: Option<&ReferencePortfolio>,
  model: &RiskModel,
  bounds: &WeightBounds,
  dropped: &[String],
  tolerance: f64,
  risk_free: f64,
) -> ReferenceOutcome {
  let Some(reference) = reference else {
    return ReferenceOutcome::NotSupplied;
  };

  match align_reference(reference, model, bounds, dropped, tolerance) {
    Ok(weights) => ReferenceOutcome::Scored(score_unchecked(weights, model, risk_free)),
    Err(issues) => {
      for issue in &issues {
        warn!(%issue, "reference portfolio rejected");
      }
      ReferenceOutcome::Rejected(issues)
    }
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::types::AssetUniverse;

  fn model() -> RiskModel {
    RiskModel::new(
      AssetUniverse::new(["AAA", "BBB", "CCC"]).unwrap(),
      array![0.08, 0.1, 0.12],
      array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]],
    )
    .unwrap()
  }

  fn evaluate(reference: &ReferencePortfolio) -> ReferenceOutcome {
    evaluate_reference(
      Some(reference),
      &model(),
      &WeightBounds::long_only(3),
      &["DDD".to_string()],
      1e-6,
      0.0,
    )
  }

  #[test]
  #[traced_test]
  fn short_budget_is_reported_not_renormalized() {
    let reference = ReferencePortfolio::new([("AAA", 0.5), ("BBB", 0.27), ("CCC", 0.2)]);
    let outcome = evaluate(&reference);

    assert!(outcome.point().is_none());
    match outcome.issues() {
      [ReferenceIssue::BudgetMismatch { sum, .. }] => assert!((sum - 0.97).abs() < 1e-12),
      other => panic!("unexpected issues {other:?}"),
    }
    assert!(logs_contain("reference portfolio rejected"));
    assert!(logs_contain("0.970000"));
  }

  #[test]
  fn valid_reference_is_scored_in_universe_order() {
    let reference = ReferencePortfolio::new([("CCC", 0.2), ("AAA", 0.8)]);
    let point = evaluate(&reference).point().cloned().unwrap();

    assert_eq!(point.weights, vec![0.8, 0.0, 0.2]);
    assert!((point.expected_return - (0.8 * 0.08 + 0.2 * 0.12)).abs() < 1e-12);
  }

  #[test]
  fn collects_every_issue() {
    let reference = ReferencePortfolio::new([
      ("AAA", 1.2),
      ("AAA", 0.1),
      ("ZZZ", 0.1),
      ("DDD", 0.3),
      ("BBB", f64::NAN),
    ]);
    let issues = evaluate(&reference).issues().to_vec();

    assert!(issues.contains(&ReferenceIssue::Duplicate { asset: "AAA".into() }));
    assert!(issues.contains(&ReferenceIssue::UnknownAsset { asset: "ZZZ".into() }));
    assert!(issues.contains(&ReferenceIssue::NonFinite { asset: "BBB".into() }));
    assert!(issues.contains(&ReferenceIssue::DroppedAsset {
      asset: "DDD".into(),
      weight: 0.3
    }));
    assert!(issues.iter().any(|i| matches!(i, ReferenceIssue::OutOfBounds { asset, .. } if asset == "AAA")));
  }

  #[test]
  fn negative_weight_violates_long_only_bounds() {
    let reference = ReferencePortfolio::new([("AAA", -0.1), ("BBB", 0.6), ("CCC", 0.5)]);
    let issues = evaluate(&reference).issues().to_vec();

    assert_eq!(issues.len(), 1);
    assert!(matches!(issues[0], ReferenceIssue::OutOfBounds { .. }));
  }

  #[test]
  fn not_supplied_is_distinct_from_rejected() {
    let outcome = evaluate_reference(
      None,
      &model(),
      &WeightBounds::long_only(3),
      &[],
      1e-6,
      0.0,
    );
    assert_eq!(outcome, ReferenceOutcome::NotSupplied);
    assert!(outcome.issues().is_empty());
  }

  #[test]
  fn parses_cli_syntax() {
    let reference: ReferencePortfolio = "AAA=0.6, BBB = 0.4".parse().unwrap();
    assert_eq!(
      reference.entries(),
      &[("AAA".to_string(), 0.6), ("BBB".to_string(), 0.4)]
    );
    assert!("AAA:0.6".parse::<ReferencePortfolio>().is_err());
    assert!("AAA=abc".parse::<ReferencePortfolio>().is_err());
  }
}
