//! Mean-variance analysis of a CSV price table.
//!
//! ```bash
//! markowitz prices.csv --reference AAPL=0.4,MSFT=0.3,XOM=0.3 --max-weight 0.6 --plot frontier.html
//! RUST_LOG=markowitz_rs=debug markowitz prices.csv --simple-returns --samples 20000
//! ```

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use markowitz_rs::io::read_price_csv;
use markowitz_rs::portfolio::AssetBounds;
use markowitz_rs::portfolio::MonteCarloSettings;
use markowitz_rs::portfolio::PortfolioEngine;
use markowitz_rs::portfolio::PortfolioEngineConfig;
use markowitz_rs::portfolio::ReferencePortfolio;
use markowitz_rs::portfolio::ReturnKind;
use markowitz_rs::visualization::FrontierPlotter;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "markowitz")]
#[command(about = "Markowitz portfolio analysis of a price history", long_about = None)]
#[command(version)]
struct Cli {
  /// Wide CSV: date column, then one closing-price column per asset
  prices: PathBuf,

  /// Reference allocation, e.g. AAPL=0.5,MSFT=0.5
  #[arg(short, long)]
  reference: Option<ReferencePortfolio>,

  /// Annual risk-free rate
  #[arg(long, default_value_t = 0.0)]
  risk_free: f64,

  /// Minimum acceptable return for the maximum-Sharpe portfolio
  #[arg(long)]
  min_return: Option<f64>,

  /// Monte Carlo sample count
  #[arg(short, long, default_value_t = 10_000)]
  samples: usize,

  /// Monte Carlo seed
  #[arg(long, default_value_t = 42)]
  seed: u64,

  /// Efficient frontier grid resolution
  #[arg(short, long, default_value_t = 50)]
  frontier_points: usize,

  /// Upper weight limit applied to every asset
  #[arg(long)]
  max_weight: Option<f64>,

  /// Trading periods per year
  #[arg(long, default_value_t = 252.0)]
  periods_per_year: f64,

  /// Simple instead of log returns
  #[arg(long)]
  simple_returns: bool,

  /// Write an HTML chart of the cloud and frontier
  #[arg(long)]
  plot: Option<PathBuf>,

  /// Default log filter when RUST_LOG is unset
  #[arg(long, default_value = "info")]
  log_level: String,
}

impl Cli {
  fn config(&self) -> PortfolioEngineConfig {
    PortfolioEngineConfig {
      periods_per_year: self.periods_per_year,
      risk_free: self.risk_free,
      return_kind: if self.simple_returns {
        ReturnKind::Simple
      } else {
        ReturnKind::Log
      },
      bounds: self.max_weight.map(AssetBounds::max_weight),
      min_return: self.min_return,
      monte_carlo: MonteCarloSettings {
        n_samples: self.samples,
        seed: Some(self.seed),
        ..MonteCarloSettings::default()
      },
      frontier_points: self.frontier_points,
      ..PortfolioEngineConfig::default()
    }
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str())),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let prices = read_price_csv(&cli.prices)?;
  info!(
    path = %cli.prices.display(),
    assets = prices.universe().len(),
    rows = prices.n_periods(),
    "loaded price table"
  );

  let report = PortfolioEngine::new(cli.config())
    .run(&prices, cli.reference.as_ref())
    .context("analysis failed")?;

  println!("{}", report.render());

  if let Some(path) = &cli.plot {
    FrontierPlotter::default()
      .write_html(&report, path)
      .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote frontier chart");
  }

  Ok(())
}
