//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Mean-variance portfolio construction: return series, shrinkage risk
//! model, constrained optimizers, Monte Carlo sampling and the efficient
//! frontier.

pub mod data;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod monte_carlo;
pub mod optimizers;
pub mod reference;
pub mod report;
pub mod risk_model;
pub mod scorer;
pub mod types;

pub use data::MissingPricePolicy;
pub use data::PriceSeries;
pub use data::ReturnSeries;
pub use data::ReturnSeriesBuilder;
pub use engine::AnalysisReport;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use error::PortfolioError;
pub use frontier::EfficientFrontier;
pub use frontier::FrontierPoint;
pub use frontier::FrontierTracer;
pub use monte_carlo::MonteCarloSampler;
pub use monte_carlo::MonteCarloSettings;
pub use monte_carlo::SimulationCloud;
pub use optimizers::Objective;
pub use optimizers::PortfolioOptimizer;
pub use optimizers::ReturnConstraint;
pub use optimizers::SolverSettings;
pub use optimizers::project_capped_simplex;
pub use reference::ReferenceIssue;
pub use reference::ReferenceOutcome;
pub use reference::ReferencePortfolio;
pub use reference::evaluate_reference;
pub use risk_model::RiskModel;
pub use risk_model::RiskModelEstimator;
pub use risk_model::ledoit_wolf;
pub use scorer::PortfolioObjectiveExt;
pub use scorer::score_portfolio;
pub use scorer::sharpe_ratio;
pub use types::AssetBounds;
pub use types::AssetUniverse;
pub use types::PointQuality;
pub use types::PortfolioPoint;
pub use types::ReturnKind;
pub use types::WeightBounds;
