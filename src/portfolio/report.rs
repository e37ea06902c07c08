//! # Report Tables
//!
//! $$
//! (\text{name},\ \mu_p,\ \sigma_p,\ S_p,\ \text{status})
//! $$
//!
//! Plain-text rendering of an [`AnalysisReport`]. A missing portfolio prints
//! as `-` with the reason in the status column, never as zero.

use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use prettytable::format;

use super::engine::AnalysisReport;
use super::error::PortfolioError;
use super::reference::ReferenceOutcome;
use super::types::PortfolioPoint;

const MISSING: &str = "-";

impl AnalysisReport {
  /// One row per named portfolio: return, volatility, Sharpe ratio, status.
  pub fn summary_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(vec![
      Cell::new("portfolio"),
      Cell::new("return"),
      Cell::new("volatility"),
      Cell::new("sharpe"),
      Cell::new("status"),
    ]));

    let rows: [(&str, Result<&PortfolioPoint, String>); 6] = [
      ("max_sharpe", status_of(&self.max_sharpe)),
      ("max_return", status_of(&self.max_return)),
      ("min_volatility", status_of(&self.min_volatility)),
      ("reference", reference_status(&self.reference)),
      (
        "mc_max_sharpe",
        sampled_status(self.sampled_max_sharpe(), &self.simulation),
      ),
      (
        "mc_max_return",
        sampled_status(self.sampled_max_return(), &self.simulation),
      ),
    ];

    for (name, row) in rows {
      let cells = match row {
        Ok(p) => vec![
          Cell::new(name),
          Cell::new(&format!("{:.4}", p.expected_return)),
          Cell::new(&format!("{:.4}", p.volatility)),
          Cell::new(&format!("{:.4}", p.sharpe)),
          Cell::new(&p.quality.to_string()),
        ],
        Err(reason) => vec![
          Cell::new(name),
          Cell::new(MISSING),
          Cell::new(MISSING),
          Cell::new(MISSING),
          Cell::new(&reason),
        ],
      };
      table.add_row(Row::new(cells));
    }

    table
  }

  /// Asset weights of every available named portfolio, one row per asset.
  pub fn weights_table(&self) -> Table {
    let named: Vec<(&str, &PortfolioPoint)> = self
      .named_points()
      .into_iter()
      .filter_map(|(name, point)| point.map(|p| (name, p)))
      .collect();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    let mut titles = vec![Cell::new("asset")];
    titles.extend(named.iter().map(|(name, _)| Cell::new(name)));
    table.set_titles(Row::new(titles));

    for (i, id) in self.risk_model.universe().ids().iter().enumerate() {
      let mut cells = vec![Cell::new(id)];
      cells.extend(
        named
          .iter()
          .map(|(_, p)| Cell::new(&format!("{:.4}", p.weights[i]))),
      );
      table.add_row(Row::new(cells));
    }

    table
  }

  /// Summary, weights and a note on cleaning and frontier coverage.
  pub fn render(&self) -> String {
    let mut out = format!(
      "{} assets, {} periods, shrinkage {:.4}\n",
      self.risk_model.n_assets(),
      self.n_periods,
      self.risk_model.shrinkage()
    );
    if !self.dropped_assets.is_empty() {
      out.push_str(&format!("dropped: {}\n", self.dropped_assets.join(", ")));
    }
    match &self.frontier {
      Ok(frontier) => out.push_str(&format!(
        "frontier: {} of {} grid points solved\n",
        frontier.n_valid(),
        frontier.points().len()
      )),
      Err(err) => out.push_str(&format!("frontier: {err}\n")),
    }
    out.push('\n');
    out.push_str(&self.summary_table().to_string());
    out.push('\n');
    out.push_str(&self.weights_table().to_string());
    out
  }
}

fn status_of(result: &Result<PortfolioPoint, PortfolioError>) -> Result<&PortfolioPoint, String> {
  result.as_ref().map_err(ToString::to_string)
}

fn reference_status(outcome: &ReferenceOutcome) -> Result<&PortfolioPoint, String> {
  match outcome {
    ReferenceOutcome::Scored(point) => Ok(point),
    other => Err(other.to_string()),
  }
}

fn sampled_status<'a, T>(
  point: Option<&'a PortfolioPoint>,
  simulation: &Result<T, PortfolioError>,
) -> Result<&'a PortfolioPoint, String> {
  match (point, simulation) {
    (Some(point), _) => Ok(point),
    (None, Err(err)) => Err(err.to_string()),
    (None, Ok(_)) => Err("no samples".into()),
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;
  use crate::portfolio::reference::ReferenceIssue;
  use crate::portfolio::risk_model::RiskModel;
  use crate::portfolio::scorer::score_portfolio;
  use crate::portfolio::types::AssetUniverse;
  use crate::portfolio::types::WeightBounds;

  fn report() -> AnalysisReport {
    let model = RiskModel::new(
      AssetUniverse::new(["AAA", "BBB"]).unwrap(),
      array![0.1, 0.05],
      array![[0.04, 0.0], [0.0, 0.04]],
    )
    .unwrap();
    let point = score_portfolio(&[0.5, 0.5], &model, 0.0).unwrap();

    AnalysisReport {
      bounds: WeightBounds::long_only(2),
      n_periods: 252,
      dropped_assets: vec!["CCC".into()],
      risk_free: 0.0,
      max_sharpe: Ok(point.clone()),
      max_return: Err(PortfolioError::not_converged("max_return", "iteration limit")),
      min_volatility: Ok(point),
      reference: ReferenceOutcome::Rejected(vec![ReferenceIssue::Empty]),
      frontier: Err(PortfolioError::InvalidConfig("frontier disabled".into())),
      simulation: Err(PortfolioError::InfeasibleBounds {
        requested: 10,
        accepted: 0,
        attempts: 500,
      }),
      risk_model: model,
    }
  }

  #[test]
  fn missing_results_print_as_dash_with_reason() {
    let text = report().summary_table().to_string();

    assert!(text.contains("max_return"));
    assert!(text.contains("iteration limit"));
    assert!(text.contains("rejected: reference portfolio has no weights"));
    assert!(text.contains("0 of 10 samples accepted"));
    assert!(text.contains("0.0750"));
  }

  #[test]
  fn weights_table_lists_available_portfolios() {
    let report = report();
    let table = report.weights_table();

    assert_eq!(table.len(), 2);
    let text = table.to_string();
    assert!(text.contains("max_sharpe"));
    assert!(!text.contains("max_return"));
  }

  #[test]
  fn render_mentions_dropped_assets() {
    let text = report().render();
    assert!(text.contains("dropped: CCC"));
    assert!(text.contains("frontier: invalid configuration"));
  }
}
