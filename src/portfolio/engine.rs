//! # Portfolio Engine
//!
//! $$
//! \text{prices}\to r_t\to(\mu,\Sigma)\to\{\mathbf w_{\max S},\mathbf w_{\max\mu},\mathbf w_{\min\sigma},\ \sigma^\*(m),\ \{\mathbf w^{(k)}\}\}
//! $$
//!
//! One batch analysis run from a price table to every named portfolio.

use tracing::info;

use super::data::MissingPricePolicy;
use super::data::PriceSeries;
use super::data::ReturnSeriesBuilder;
use super::error::PortfolioError;
use super::frontier::EfficientFrontier;
use super::frontier::FrontierTracer;
use super::monte_carlo::MonteCarloSampler;
use super::monte_carlo::MonteCarloSettings;
use super::monte_carlo::SimulationCloud;
use super::optimizers::PortfolioOptimizer;
use super::optimizers::SolverSettings;
use super::reference::ReferenceOutcome;
use super::reference::ReferencePortfolio;
use super::reference::evaluate_reference;
use super::risk_model::DEFAULT_PERIODS_PER_YEAR;
use super::risk_model::RiskModel;
use super::risk_model::RiskModelEstimator;
use super::types::AssetBounds;
use super::types::PortfolioPoint;
use super::types::ReturnKind;
use super::types::WeightBounds;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioEngineConfig {
  /// Trading periods per year used to annualize.
  pub periods_per_year: f64,
  /// Risk-free rate used in Sharpe computations.
  pub risk_free: f64,
  pub return_kind: ReturnKind,
  pub missing_prices: MissingPricePolicy,
  /// Fewest return observations accepted after cleaning.
  pub min_periods: usize,
  /// Per-asset weight bounds, `[0, 1]` when absent.
  pub bounds: Option<AssetBounds>,
  /// Minimum acceptable return for the maximum-Sharpe solve.
  pub min_return: Option<f64>,
  pub solver: SolverSettings,
  pub monte_carlo: MonteCarloSettings,
  /// Target returns on the frontier grid.
  pub frontier_points: usize,
  /// Allowed deviation of the reference weights from a full budget.
  pub weight_tolerance: f64,
  /// Lower clamp on the shrinkage intensity.
  pub shrinkage_floor: f64,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      periods_per_year: DEFAULT_PERIODS_PER_YEAR,
      risk_free: 0.0,
      return_kind: ReturnKind::Log,
      missing_prices: MissingPricePolicy::ForwardFill,
      min_periods: 30,
      bounds: None,
      min_return: None,
      solver: SolverSettings::default(),
      monte_carlo: MonteCarloSettings::default(),
      frontier_points: 50,
      weight_tolerance: 1e-6,
      shrinkage_floor: 1e-6,
    }
  }
}

impl PortfolioEngineConfig {
  pub fn validate(&self) -> Result<(), PortfolioError> {
    let invalid = |msg: String| Err(PortfolioError::InvalidConfig(msg));

    if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
      return invalid(format!(
        "periods_per_year must be positive, got {}",
        self.periods_per_year
      ));
    }
    if !self.risk_free.is_finite() {
      return invalid("risk_free must be finite".into());
    }
    if let Some(min_return) = self.min_return {
      if !min_return.is_finite() {
        return invalid("min_return must be finite".into());
      }
    }
    if self.frontier_points < 2 {
      return invalid(format!(
        "frontier_points must be at least 2, got {}",
        self.frontier_points
      ));
    }
    if self.monte_carlo.n_samples == 0 {
      return invalid("monte_carlo.n_samples must be positive".into());
    }
    if !(self.monte_carlo.concentration.is_finite() && self.monte_carlo.concentration > 0.0) {
      return invalid("monte_carlo.concentration must be positive".into());
    }
    if self.monte_carlo.rejection_factor == 0 {
      return invalid("monte_carlo.rejection_factor must be at least 1".into());
    }
    if self.solver.max_iters == 0 {
      return invalid("solver.max_iters must be positive".into());
    }
    if !(self.weight_tolerance.is_finite() && self.weight_tolerance >= 0.0) {
      return invalid("weight_tolerance must be non-negative".into());
    }
    if !(0.0..=1.0).contains(&self.shrinkage_floor) {
      return invalid(format!(
        "shrinkage_floor must lie in [0, 1], got {}",
        self.shrinkage_floor
      ));
    }
    if let Some(bounds) = &self.bounds {
      let boxes = std::iter::once(("default", &bounds.default))
        .chain(bounds.overrides.iter().map(|(id, b)| (id.as_str(), b)));
      for (id, (lo, hi)) in boxes {
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
          return invalid(format!("bounds for {id} are not an interval: [{lo}, {hi}]"));
        }
      }
    }

    Ok(())
  }

  fn return_builder(&self) -> ReturnSeriesBuilder {
    ReturnSeriesBuilder {
      kind: self.return_kind,
      missing_prices: self.missing_prices,
      min_periods: self.min_periods,
    }
  }

  fn estimator(&self) -> RiskModelEstimator {
    RiskModelEstimator {
      periods_per_year: self.periods_per_year,
      shrinkage_floor: self.shrinkage_floor,
    }
  }
}

/// Everything one run produced. Per-portfolio failures are kept as `Err`
/// values next to the portfolios that did solve.
#[derive(Clone, Debug)]
pub struct AnalysisReport {
  pub risk_model: RiskModel,
  pub bounds: WeightBounds,
  /// Return observations the model was estimated on.
  pub n_periods: usize,
  /// Assets removed during cleaning.
  pub dropped_assets: Vec<String>,
  pub risk_free: f64,
  pub max_sharpe: Result<PortfolioPoint, PortfolioError>,
  pub max_return: Result<PortfolioPoint, PortfolioError>,
  pub min_volatility: Result<PortfolioPoint, PortfolioError>,
  pub reference: ReferenceOutcome,
  pub frontier: Result<EfficientFrontier, PortfolioError>,
  pub simulation: Result<SimulationCloud, PortfolioError>,
}

impl AnalysisReport {
  /// Best sampled Sharpe ratio, the Monte Carlo counterpart of `max_sharpe`.
  pub fn sampled_max_sharpe(&self) -> Option<&PortfolioPoint> {
    self.simulation.as_ref().ok().and_then(SimulationCloud::max_sharpe)
  }

  /// Best sampled return, the Monte Carlo counterpart of `max_return`.
  pub fn sampled_max_return(&self) -> Option<&PortfolioPoint> {
    self.simulation.as_ref().ok().and_then(SimulationCloud::max_return)
  }

  /// Named portfolios in display order; `None` marks a missing result.
  pub fn named_points(&self) -> Vec<(&'static str, Option<&PortfolioPoint>)> {
    vec![
      ("max_sharpe", self.max_sharpe.as_ref().ok()),
      ("max_return", self.max_return.as_ref().ok()),
      ("min_volatility", self.min_volatility.as_ref().ok()),
      ("reference", self.reference.point()),
      ("mc_max_sharpe", self.sampled_max_sharpe()),
      ("mc_max_return", self.sampled_max_return()),
    ]
  }
}

/// Single entry point for an analysis run.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Run the whole pipeline.
  ///
  /// Configuration and estimation failures abort with `Err`. Failures of an
  /// individual optimizer, the sampler or the frontier are stored in the
  /// report and never stop the rest.
  pub fn run(
    &self,
    prices: &PriceSeries,
    reference: Option<&ReferencePortfolio>,
  ) -> Result<AnalysisReport, PortfolioError> {
    self.config.validate()?;

    let series = self.config.return_builder().build(prices)?;
    let model = self.config.estimator().estimate(&series)?;
    let bounds = match &self.config.bounds {
      Some(bounds) => bounds.resolve(model.universe())?,
      None => WeightBounds::long_only(model.n_assets()),
    };

    info!(
      assets = model.n_assets(),
      periods = series.n_periods(),
      dropped = series.dropped().len(),
      shrinkage = model.shrinkage(),
      "risk model ready"
    );

    let cfg = &self.config;
    let optimizer = PortfolioOptimizer::new(&model, Some(bounds.clone()), cfg.risk_free, cfg.solver)?;
    let max_sharpe = optimizer.max_sharpe(cfg.min_return);
    let max_return = optimizer.max_return();
    let min_volatility = optimizer.min_volatility(None);

    let reference = evaluate_reference(
      reference,
      &model,
      &bounds,
      series.dropped(),
      cfg.weight_tolerance,
      cfg.risk_free,
    );

    let frontier = FrontierTracer::new(cfg.frontier_points, Some(bounds.clone()), cfg.risk_free, cfg.solver)
      .trace(&model);
    let simulation = MonteCarloSampler::from_settings(&cfg.monte_carlo, Some(bounds.clone()))
      .sample(&model, cfg.risk_free);

    Ok(AnalysisReport {
      n_periods: series.n_periods(),
      dropped_assets: series.dropped().to_vec(),
      risk_free: cfg.risk_free,
      risk_model: model,
      bounds,
      max_sharpe,
      max_return,
      min_volatility,
      reference,
      frontier,
      simulation,
    })
  }
}
