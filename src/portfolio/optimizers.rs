//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf w\in\mathcal W} f(\mathbf w)\quad\text{s.t.}\quad \mathbf w^\top\mu\ \{\ge,=\}\ r^\*,\qquad
//! \mathcal W=\{\mathbf 1^\top\mathbf w=1,\ \ell\le\mathbf w\le u\}
//! $$
//!
//! Nelder-Mead over the Euclidean projection onto the bounded simplex, with an
//! augmented Lagrangian outer loop for the return constraint.
//!
//! Minimum volatility is a convex problem, so the local solve is also the
//! global one. Maximum Sharpe is not convex over a bounded simplex and a
//! single solve from equal weights can stop at a local optimum.

use std::cmp::Ordering;
use std::fmt::Display;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use tracing::debug;
use tracing::warn;

use super::error::PortfolioError;
use super::risk_model::RiskModel;
use super::scorer::PortfolioObjectiveExt;
use super::scorer::score_unchecked;
use super::types::PointQuality;
use super::types::PortfolioPoint;
use super::types::WeightBounds;

/// Weight on `||x - P(x)||²`, pulls solver iterates back onto the feasible set.
const PROJECTION_PENALTY: f64 = 1.0;
const PROJECTION_BISECTIONS: usize = 100;
const MAX_PENALTY: f64 = 1e12;

/// Iteration limits and tolerances shared by every solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverSettings {
  /// Nelder-Mead iterations per run.
  pub max_iters: u64,
  /// Standard deviation of simplex costs at which a run stops.
  pub sd_tolerance: f64,
  /// Extra Nelder-Mead runs restarted from the best point.
  pub restarts: usize,
  /// Edge length of the initial simplex.
  pub initial_step: f64,
  /// Augmented Lagrangian updates for return-constrained solves.
  pub max_outer_iters: usize,
  /// Accepted violation of the return constraint.
  pub constraint_tolerance: f64,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      sd_tolerance: 1e-13,
      restarts: 4,
      initial_step: 0.1,
      max_outer_iters: 30,
      constraint_tolerance: 1e-7,
    }
  }
}

/// What the solver minimizes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Objective {
  /// Minimize `-(w·mu - r_f) / sqrt(w'Σw)`.
  MaxSharpe,
  /// Minimize `w'Σw`.
  MinVolatility,
  /// Minimize `-w·mu`.
  MaxReturn,
}

impl Display for Objective {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Objective::MaxSharpe => write!(f, "max_sharpe"),
      Objective::MinVolatility => write!(f, "min_volatility"),
      Objective::MaxReturn => write!(f, "max_return"),
    }
  }
}

/// Constraint on the portfolio expected return.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReturnConstraint {
  /// `w·mu >= target`
  AtLeast(f64),
  /// `w·mu == target`
  Exactly(f64),
}

impl ReturnConstraint {
  pub fn target(&self) -> f64 {
    match self {
      Self::AtLeast(t) | Self::Exactly(t) => *t,
    }
  }

  /// Positive when the constraint is violated.
  fn violation(&self, ret: f64) -> f64 {
    match self {
      Self::AtLeast(t) => (t - ret).max(0.0),
      Self::Exactly(t) => (t - ret).abs(),
    }
  }
}

/// Constrained mean-variance optimizer bound to one risk model.
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer<'a> {
  model: &'a RiskModel,
  bounds: WeightBounds,
  risk_free: f64,
  settings: SolverSettings,
}

impl<'a> PortfolioOptimizer<'a> {
  /// `bounds` defaults to `[0, 1]` per asset.
  pub fn new(
    model: &'a RiskModel,
    bounds: Option<WeightBounds>,
    risk_free: f64,
    settings: SolverSettings,
  ) -> Result<Self, PortfolioError> {
    let n = model.n_assets();
    if n == 0 {
      return Err(PortfolioError::InvalidInput("empty asset universe".into()));
    }

    let bounds = bounds.unwrap_or_else(|| WeightBounds::long_only(n));
    if bounds.len() != n {
      return Err(PortfolioError::InvalidInput(format!(
        "{} bounds for {n} assets",
        bounds.len()
      )));
    }

    Ok(Self {
      model,
      bounds,
      risk_free,
      settings,
    })
  }

  pub fn bounds(&self) -> &WeightBounds {
    &self.bounds
  }

  /// Highest Sharpe ratio, optionally subject to a minimum acceptable return.
  pub fn max_sharpe(&self, min_return: Option<f64>) -> Result<PortfolioPoint, PortfolioError> {
    self.solve(Objective::MaxSharpe, min_return.map(ReturnConstraint::AtLeast))
  }

  /// Lowest volatility, optionally at or above a target return.
  pub fn min_volatility(
    &self,
    constraint: Option<ReturnConstraint>,
  ) -> Result<PortfolioPoint, PortfolioError> {
    self.solve(Objective::MinVolatility, constraint)
  }

  /// Highest expected return under the budget and box constraints.
  pub fn max_return(&self) -> Result<PortfolioPoint, PortfolioError> {
    let solved = self.solve(Objective::MaxReturn, None);
    let vertex = self.extreme_portfolio(true);
    let vertex_ret = self.model.evaluate_return(&vertex);

    // The optimum of a linear objective sits on a vertex; keep whichever is higher.
    match solved {
      Ok(point) if point.expected_return >= vertex_ret - 1e-12 => Ok(point),
      _ => Ok(score_unchecked(vertex, self.model, self.risk_free)),
    }
  }

  /// Lowest and highest expected return any feasible portfolio attains.
  pub fn attainable_return_range(&self) -> (f64, f64) {
    let lo = self.model.evaluate_return(&self.extreme_portfolio(false));
    let hi = self.model.evaluate_return(&self.extreme_portfolio(true));
    (lo, hi)
  }

  /// Run one objective with an optional return constraint.
  pub fn solve(
    &self,
    objective: Objective,
    constraint: Option<ReturnConstraint>,
  ) -> Result<PortfolioPoint, PortfolioError> {
    let constraint = match constraint {
      Some(c) => self.check_target(c)?,
      None => None,
    };

    let n = self.model.n_assets();
    let mut x = project_capped_simplex(&vec![1.0 / n as f64; n], &self.bounds);

    let Some(constraint) = constraint else {
      let (best, converged) = self.minimize(objective, None, x)?;
      return Ok(self.finish(objective, best, converged));
    };

    let tol = self.settings.constraint_tolerance;
    let mut multiplier = 0.0;
    let mut penalty = 10.0;
    let mut last_violation = f64::INFINITY;
    let mut converged = false;

    for outer in 0..self.settings.max_outer_iters.max(1) {
      let (best, inner_converged) = self.minimize(
        objective,
        Some(Lagrangian {
          constraint,
          multiplier,
          penalty,
        }),
        x,
      )?;
      x = best;

      let w = project_capped_simplex(&x, &self.bounds);
      let ret = self.model.evaluate_return(&w);
      let violation = constraint.violation(ret);
      converged = inner_converged;

      debug!(%objective, outer, violation, multiplier, penalty, "augmented lagrangian step");

      if violation <= tol {
        return Ok(self.finish(objective, x, converged));
      }

      let gap = constraint.target() - ret;
      multiplier = match constraint {
        ReturnConstraint::AtLeast(_) => (multiplier + penalty * gap).max(0.0),
        ReturnConstraint::Exactly(_) => multiplier + penalty * gap,
      };
      if violation > 0.25 * last_violation {
        penalty = (penalty * 10.0).min(MAX_PENALTY);
      }
      last_violation = violation;
    }

    let w = project_capped_simplex(&x, &self.bounds);
    let violation = constraint.violation(self.model.evaluate_return(&w));
    if violation <= tol * 1e3 {
      warn!(%objective, violation, "return constraint met only approximately");
      Ok(self.finish(objective, x, false))
    } else {
      warn!(%objective, violation, converged, "return constraint not satisfied");
      Err(PortfolioError::not_converged(
        objective.to_string(),
        format!(
          "return constraint violated by {violation:.3e} after {} updates",
          self.settings.max_outer_iters
        ),
      ))
    }
  }

  /// Drop constraints that cannot bind, reject ones no portfolio can meet.
  fn check_target(
    &self,
    constraint: ReturnConstraint,
  ) -> Result<Option<ReturnConstraint>, PortfolioError> {
    let (min, max) = self.attainable_return_range();
    let target = constraint.target();
    let slack = self.settings.constraint_tolerance;

    if !target.is_finite() {
      return Err(PortfolioError::InvalidInput(
        "target return must be finite".into(),
      ));
    }

    match constraint {
      ReturnConstraint::AtLeast(t) if t > max + slack => {
        Err(PortfolioError::InfeasibleTarget { target: t, min, max })
      }
      ReturnConstraint::AtLeast(t) if t <= min => Ok(None),
      ReturnConstraint::AtLeast(t) => Ok(Some(ReturnConstraint::AtLeast(t.min(max)))),
      ReturnConstraint::Exactly(t) if t > max + slack || t < min - slack => {
        Err(PortfolioError::InfeasibleTarget { target: t, min, max })
      }
      ReturnConstraint::Exactly(t) => Ok(Some(ReturnConstraint::Exactly(t.clamp(min, max)))),
    }
  }

  /// Nelder-Mead with restarts from the best point; returns the best
  /// parameter and whether the last run met its tolerance.
  fn minimize(
    &self,
    objective: Objective,
    lagrangian: Option<Lagrangian>,
    x0: Vec<f64>,
  ) -> Result<(Vec<f64>, bool), PortfolioError> {
    let mut x = x0;
    let mut best_cost = f64::INFINITY;
    let mut converged = false;
    let mut step = self.settings.initial_step;

    for _ in 0..=self.settings.restarts {
      let cost = ProjectedCost {
        model: self.model.clone(),
        bounds: self.bounds.clone(),
        objective,
        risk_free: self.risk_free,
        lagrangian,
      };
      let simplex = simplex_around(&x, step);

      let solver = NelderMead::new(simplex)
        .with_sd_tolerance(self.settings.sd_tolerance)
        .map_err(|e| PortfolioError::not_converged(objective.to_string(), e.to_string()))?;
      let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(self.settings.max_iters))
        .run()
        .map_err(|e| PortfolioError::not_converged(objective.to_string(), e.to_string()))?;

      let state = res.state();
      let run_cost = state.get_best_cost();
      if !run_cost.is_finite() {
        return Err(PortfolioError::not_converged(
          objective.to_string(),
          "objective evaluated to a non-finite value",
        ));
      }
      converged = matches!(
        state.get_termination_reason(),
        Some(TerminationReason::SolverConverged)
      );
      if let Some(best) = state.get_best_param() {
        if run_cost <= best_cost {
          x = best.clone();
        }
      }

      let improvement = best_cost - run_cost;
      best_cost = best_cost.min(run_cost);
      if converged && improvement <= 10.0 * self.settings.sd_tolerance {
        break;
      }
      step = (step * 0.5).max(1e-4);
    }

    Ok((x, converged))
  }

  fn finish(&self, objective: Objective, x: Vec<f64>, converged: bool) -> PortfolioPoint {
    let w = project_capped_simplex(&x, &self.bounds);
    let quality = if converged {
      PointQuality::Exact
    } else {
      warn!(%objective, "solver stopped on its iteration limit, result is approximate");
      PointQuality::Approximate
    };
    score_unchecked(w, self.model, self.risk_free).with_quality(quality)
  }

  /// Vertex of the bounded simplex with the highest (or lowest) return:
  /// start from the lower bounds and fill the best assets up to their caps.
  fn extreme_portfolio(&self, highest: bool) -> Vec<f64> {
    let mu = self.model.expected_returns();
    let mut order: Vec<usize> = (0..mu.len()).collect();
    order.sort_by(|&a, &b| {
      let ord = mu[a].partial_cmp(&mu[b]).unwrap_or(Ordering::Equal);
      if highest { ord.reverse() } else { ord }
    });

    let mut w = self.bounds.lower().to_vec();
    let mut remaining = 1.0 - w.iter().sum::<f64>();
    for i in order {
      if remaining <= 0.0 {
        break;
      }
      let room = self.bounds.upper()[i] - w[i];
      let add = room.min(remaining);
      w[i] += add;
      remaining -= add;
    }
    w
  }
}

#[derive(Clone, Copy, Debug)]
struct Lagrangian {
  constraint: ReturnConstraint,
  multiplier: f64,
  penalty: f64,
}

impl Lagrangian {
  fn term(&self, ret: f64) -> f64 {
    let gap = self.constraint.target() - ret;
    match self.constraint {
      ReturnConstraint::Exactly(_) => self.multiplier * gap + 0.5 * self.penalty * gap * gap,
      ReturnConstraint::AtLeast(_) => {
        let shifted = (gap + self.multiplier / self.penalty).max(0.0);
        0.5 * self.penalty * shifted * shifted
          - self.multiplier * self.multiplier / (2.0 * self.penalty)
      }
    }
  }
}

struct ProjectedCost {
  model: RiskModel,
  bounds: WeightBounds,
  objective: Objective,
  risk_free: f64,
  lagrangian: Option<Lagrangian>,
}

impl CostFunction for ProjectedCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let w = project_capped_simplex(x, &self.bounds);
    let base = match self.objective {
      Objective::MaxSharpe => self.model.evaluate_negative_sharpe(&w, self.risk_free),
      Objective::MinVolatility => self.model.evaluate_variance(&w),
      Objective::MaxReturn => -self.model.evaluate_return(&w),
    };
    let constraint = self
      .lagrangian
      .map_or(0.0, |l| l.term(self.model.evaluate_return(&w)));
    let drift: f64 = x.iter().zip(w.iter()).map(|(a, b)| (a - b).powi(2)).sum();

    Ok(base + constraint + PROJECTION_PENALTY * drift)
  }
}

fn simplex_around(x0: &[f64], step: f64) -> Vec<Vec<f64>> {
  let mut simplex = Vec::with_capacity(x0.len() + 1);
  simplex.push(x0.to_vec());
  for i in 0..x0.len() {
    let mut point = x0.to_vec();
    point[i] += step;
    simplex.push(point);
  }
  simplex
}

/// Euclidean projection onto `{w : sum(w) = 1, lower <= w <= upper}`.
///
/// Solves `sum(clamp(x - tau, lower, upper)) = 1` for the shift `tau` by
/// bisection; the sum is non-increasing in `tau`.
pub fn project_capped_simplex(x: &[f64], bounds: &WeightBounds) -> Vec<f64> {
  let lower = bounds.lower();
  let upper = bounds.upper();
  let shifted = |tau: f64| -> f64 {
    x.iter()
      .zip(lower.iter().zip(upper.iter()))
      .map(|(&xi, (&lo, &hi))| (xi - tau).clamp(lo, hi))
      .sum()
  };

  let mut tau_lo = x
    .iter()
    .zip(upper.iter())
    .map(|(xi, hi)| xi - hi)
    .fold(f64::INFINITY, f64::min);
  let mut tau_hi = x
    .iter()
    .zip(lower.iter())
    .map(|(xi, lo)| xi - lo)
    .fold(f64::NEG_INFINITY, f64::max);
  if !(tau_lo.is_finite() && tau_hi.is_finite()) {
    return vec![1.0 / x.len().max(1) as f64; x.len()];
  }

  for _ in 0..PROJECTION_BISECTIONS {
    let mid = 0.5 * (tau_lo + tau_hi);
    if mid <= tau_lo || mid >= tau_hi {
      break;
    }
    if shifted(mid) > 1.0 {
      tau_lo = mid;
    } else {
      tau_hi = mid;
    }
  }

  let tau = 0.5 * (tau_lo + tau_hi);
  x.iter()
    .zip(lower.iter().zip(upper.iter()))
    .map(|(&xi, (&lo, &hi))| (xi - tau).clamp(lo, hi))
    .collect()
}
