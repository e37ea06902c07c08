//! # Visualization
//!
//! $$
//! \{(\sigma_k,\mu_k)\}_{k=1}^{N}\ \cup\ \{(\sigma^\*(m),m)\}\ \mapsto\ \text{risk/return chart}
//! $$
//!
use std::path::Path;

use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;
use plotly::common::ColorScale;
use plotly::common::ColorScalePalette;
use plotly::common::Line;
use plotly::common::Marker;
use plotly::common::MarkerSymbol;
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::layout::Margin;

use crate::portfolio::AnalysisReport;

/// Risk/return chart of one analysis run: Monte Carlo cloud coloured by
/// Sharpe ratio, the efficient frontier and the named portfolios.
#[derive(Clone, Debug)]
pub struct FrontierPlotter {
  title: String,
  height: usize,
  line_width: f64,
  cloud_opacity: f64,
  show_legend: bool,
}

impl Default for FrontierPlotter {
  fn default() -> Self {
    Self {
      title: "Efficient frontier".to_string(),
      height: 720,
      line_width: 2.5,
      cloud_opacity: 0.45,
      show_legend: true,
    }
  }
}

impl FrontierPlotter {
  pub fn new(title: &str) -> Self {
    Self {
      title: title.to_string(),
      ..Self::default()
    }
  }

  pub fn height(mut self, height: usize) -> Self {
    self.height = height;
    self
  }

  pub fn line_width(mut self, w: f64) -> Self {
    self.line_width = w;
    self
  }

  pub fn cloud_opacity(mut self, opacity: f64) -> Self {
    self.cloud_opacity = opacity.clamp(0.0, 1.0);
    self
  }

  pub fn show_legend(mut self, show: bool) -> Self {
    self.show_legend = show;
    self
  }

  pub fn plot(&self, report: &AnalysisReport) -> Plot {
    let mut plot = Plot::new();
    plot.set_layout(
      Layout::new()
        .title(self.title.as_str())
        .auto_size(true)
        .height(self.height)
        .margin(Margin::new().left(64).right(24).top(72).bottom(56))
        .x_axis(Axis::new().title("annualized volatility"))
        .y_axis(Axis::new().title("annualized expected return")),
    );

    if let Ok(cloud) = &report.simulation {
      let (x, y): (Vec<f64>, Vec<f64>) = cloud
        .points()
        .iter()
        .map(|p| (p.volatility, p.expected_return))
        .unzip();
      let sharpe: Vec<f64> = cloud.points().iter().map(|p| p.sharpe).collect();
      let trace = Scatter::new(x, y)
        .mode(Mode::Markers)
        .name("simulated portfolios")
        .marker(
          Marker::new()
            .size(4)
            .opacity(self.cloud_opacity)
            .color_array(sharpe)
            .color_scale(ColorScale::Palette(ColorScalePalette::Viridis))
            .show_scale(true),
        )
        .show_legend(self.show_legend);
      plot.add_trace(trace);
    }

    if let Ok(frontier) = &report.frontier {
      let (x, y): (Vec<f64>, Vec<f64>) = frontier
        .valid_points()
        .map(|(_, p)| (p.volatility, p.expected_return))
        .unzip();
      let trace = Scatter::new(x, y)
        .mode(Mode::Lines)
        .name("efficient frontier")
        .line(Line::new().width(self.line_width))
        .show_legend(self.show_legend);
      plot.add_trace(trace);
    }

    for (name, point) in report.named_points() {
      let Some(point) = point else {
        continue;
      };
      let hover = format!(
        "{name}<br>return: {:.4}<br>volatility: {:.4}<br>sharpe: {:.4}",
        point.expected_return, point.volatility, point.sharpe
      );
      let trace = Scatter::new(vec![point.volatility], vec![point.expected_return])
        .mode(Mode::Markers)
        .name(name)
        .marker(Marker::new().size(14).symbol(MarkerSymbol::Star))
        .hover_text_array(vec![hover])
        .hover_template("%{hovertext}<extra></extra>")
        .show_legend(self.show_legend);
      plot.add_trace(trace);
    }

    plot
  }

  /// Standalone HTML page with the plotly bundle inlined.
  pub fn write_html<P: AsRef<Path>>(&self, report: &AnalysisReport, path: P) -> std::io::Result<()> {
    std::fs::write(path, self.plot(report).to_html())
  }
}
