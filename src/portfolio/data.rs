//! # Portfolio Data
//!
//! $$
//! r_t=\ln\frac{p_t}{p_{t-1}}\quad\text{or}\quad r_t=\frac{p_t}{p_{t-1}}-1
//! $$
//!
//! Price tables, forward-fill imputation and the return series builder.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;
use tracing::info;

use super::error::PortfolioError;
use super::types::AssetUniverse;
use super::types::ReturnKind;

/// Fewest assets a covariance-based run can work with.
pub const MIN_ASSETS: usize = 2;

/// Imputation applied to prices before returns are computed.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum MissingPricePolicy {
  /// Carry the last observed price forward over gaps.
  #[default]
  ForwardFill,
  /// No imputation, an asset with any gap is dropped.
  Drop,
}

/// Wide price table: one row per timestamp, one column per asset.
///
/// Missing observations are stored as `NaN`.
#[derive(Clone, Debug)]
pub struct PriceSeries {
  timestamps: Vec<NaiveDate>,
  universe: AssetUniverse,
  prices: Array2<f64>,
}

impl PriceSeries {
  /// Build from a shared timestamp axis and per-asset columns.
  pub fn new(
    timestamps: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
  ) -> Result<Self, PortfolioError> {
    if timestamps.windows(2).any(|w| w[0] >= w[1]) {
      return Err(PortfolioError::InvalidInput(
        "timestamps must be strictly increasing".into(),
      ));
    }

    let n_rows = timestamps.len();
    let mut prices = Array2::<f64>::from_elem((n_rows, columns.len()), f64::NAN);
    let mut ids = Vec::with_capacity(columns.len());

    for (j, (id, column)) in columns.into_iter().enumerate() {
      if column.len() != n_rows {
        return Err(PortfolioError::InvalidInput(format!(
          "asset `{id}` has {} prices for {n_rows} timestamps",
          column.len()
        )));
      }
      for (i, p) in column.into_iter().enumerate() {
        prices[[i, j]] = if p.is_finite() { p } else { f64::NAN };
      }
      ids.push(id);
    }

    Ok(Self {
      timestamps,
      universe: AssetUniverse::new(ids)?,
      prices,
    })
  }

  /// Build from long-format `(asset, date, price)` observations.
  ///
  /// The timestamp axis is the union of all dates; an asset with no price on
  /// a date gets a gap. Two prices for the same asset and date are rejected.
  pub fn from_observations<I, S>(observations: I) -> Result<Self, PortfolioError>
  where
    I: IntoIterator<Item = (S, NaiveDate, f64)>,
    S: Into<String>,
  {
    let mut by_asset: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    let mut dates = BTreeSet::new();

    for (id, date, price) in observations {
      let id = id.into();
      dates.insert(date);
      if by_asset.entry(id.clone()).or_default().insert(date, price).is_some() {
        return Err(PortfolioError::InvalidInput(format!(
          "duplicate observation for `{id}` on {date}"
        )));
      }
    }

    let timestamps: Vec<NaiveDate> = dates.into_iter().collect();
    let columns = by_asset
      .into_iter()
      .map(|(id, series)| {
        let column = timestamps
          .iter()
          .map(|d| series.get(d).copied().unwrap_or(f64::NAN))
          .collect();
        (id, column)
      })
      .collect();

    Self::new(timestamps, columns)
  }

  pub fn timestamps(&self) -> &[NaiveDate] {
    &self.timestamps
  }

  pub fn universe(&self) -> &AssetUniverse {
    &self.universe
  }

  /// `(periods, assets)` view of the table.
  pub fn prices(&self) -> ArrayView2<'_, f64> {
    self.prices.view()
  }

  pub fn column(&self, id: &str) -> Option<ArrayView1<'_, f64>> {
    self
      .universe
      .index_of(id)
      .map(|j| self.prices.index_axis(Axis(1), j))
  }

  pub fn n_periods(&self) -> usize {
    self.timestamps.len()
  }

  /// Copy of the table with every gap filled by the last observed price.
  ///
  /// Leading gaps stay missing: there is nothing to carry forward.
  pub fn forward_filled(&self) -> Self {
    let mut prices = self.prices.clone();
    for mut column in prices.columns_mut() {
      let mut last = f64::NAN;
      for p in column.iter_mut() {
        if p.is_nan() {
          *p = last;
        } else {
          last = *p;
        }
      }
    }

    Self {
      timestamps: self.timestamps.clone(),
      universe: self.universe.clone(),
      prices,
    }
  }

  /// Copy of the table without assets that were never observed.
  pub fn without_empty_columns(&self) -> Self {
    let keep: Vec<usize> = self
      .prices
      .columns()
      .into_iter()
      .enumerate()
      .filter(|(_, col)| col.iter().any(|p| !p.is_nan()))
      .map(|(j, _)| j)
      .collect();

    Self {
      timestamps: self.timestamps.clone(),
      universe: self.universe.subset(&keep),
      prices: self.prices.select(Axis(1), &keep),
    }
  }
}

/// Complete periodic returns for the retained asset universe.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  universe: AssetUniverse,
  returns: Array2<f64>,
  kind: ReturnKind,
  dropped: Vec<String>,
}

impl ReturnSeries {
  /// Wrap an already computed `(periods, assets)` return matrix.
  pub fn new(
    universe: AssetUniverse,
    returns: Array2<f64>,
    kind: ReturnKind,
  ) -> Result<Self, PortfolioError> {
    if returns.ncols() != universe.len() {
      return Err(PortfolioError::InvalidInput(format!(
        "return matrix has {} columns for {} assets",
        returns.ncols(),
        universe.len()
      )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
      return Err(PortfolioError::InvalidInput(
        "return series must be complete and finite".into(),
      ));
    }

    Ok(Self {
      universe,
      returns,
      kind,
      dropped: Vec::new(),
    })
  }

  pub fn universe(&self) -> &AssetUniverse {
    &self.universe
  }

  /// `(periods, assets)` view.
  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  pub fn kind(&self) -> ReturnKind {
    self.kind
  }

  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  pub fn n_assets(&self) -> usize {
    self.returns.ncols()
  }

  /// Assets removed during cleaning, in their original order.
  pub fn dropped(&self) -> &[String] {
    &self.dropped
  }
}

/// Converts a [`PriceSeries`] into a complete [`ReturnSeries`].
#[derive(Clone, Copy, Debug)]
pub struct ReturnSeriesBuilder {
  pub kind: ReturnKind,
  pub missing_prices: MissingPricePolicy,
  /// Fewest return observations accepted.
  pub min_periods: usize,
}

impl Default for ReturnSeriesBuilder {
  fn default() -> Self {
    Self {
      kind: ReturnKind::Log,
      missing_prices: MissingPricePolicy::ForwardFill,
      min_periods: 30,
    }
  }
}

impl ReturnSeriesBuilder {
  pub fn build(&self, prices: &PriceSeries) -> Result<ReturnSeries, PortfolioError> {
    let observed = prices.without_empty_columns();
    let table = match self.missing_prices {
      MissingPricePolicy::ForwardFill => observed.forward_filled(),
      MissingPricePolicy::Drop => observed,
    };

    let raw = period_returns(table.prices(), self.kind);
    let keep: Vec<usize> = (0..raw.ncols())
      .filter(|&j| raw.column(j).iter().all(|r| r.is_finite()))
      .collect();
    let universe = table.universe().subset(&keep);

    let dropped: Vec<String> = prices
      .universe()
      .ids()
      .iter()
      .filter(|id| !universe.contains(id.as_str()))
      .cloned()
      .collect();
    if !dropped.is_empty() {
      info!(
        dropped = ?dropped,
        "dropping assets with incomplete return series"
      );
    }

    if keep.len() < MIN_ASSETS {
      return Err(PortfolioError::InsufficientAssets {
        retained: keep.len(),
        required: MIN_ASSETS,
      });
    }

    let periods = raw.nrows();
    if periods < self.min_periods.max(2) {
      return Err(PortfolioError::InsufficientPeriods {
        periods,
        required: self.min_periods.max(2),
      });
    }

    debug!(
      assets = keep.len(),
      periods,
      kind = ?self.kind,
      "built return series"
    );

    Ok(ReturnSeries {
      universe,
      returns: raw.select(Axis(1), &keep),
      kind: self.kind,
      dropped,
    })
  }
}

/// Row-wise returns of a price table; missing or invalid prices give `NaN`.
pub fn period_returns(prices: ArrayView2<'_, f64>, kind: ReturnKind) -> Array2<f64> {
  let n_rows = prices.nrows().saturating_sub(1);
  Array2::from_shape_fn((n_rows, prices.ncols()), |(t, j)| {
    kind.period_return(prices[[t, j]], prices[[t + 1, j]])
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..n)
      .map(|i| start + chrono::Days::new(i as u64))
      .collect()
  }

  fn trending(n: usize, start: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| start * (1.0 + step).powi(i as i32)).collect()
  }

  #[test]
  fn rejects_non_increasing_timestamps() {
    let mut ts = dates(3);
    ts.swap(1, 2);
    let err = PriceSeries::new(ts, vec![("AAA".into(), vec![1.0, 2.0, 3.0])]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }

  #[test]
  fn forward_fill_keeps_leading_gaps() {
    let prices = PriceSeries::new(
      dates(5),
      vec![("AAA".into(), vec![f64::NAN, 10.0, f64::NAN, f64::NAN, 12.0])],
    )
    .unwrap();
    let filled = prices.forward_filled();
    let col = filled.column("AAA").unwrap();

    assert!(col[0].is_nan());
    assert_eq!(col[2], 10.0);
    assert_eq!(col[3], 10.0);
    assert_eq!(col[4], 12.0);
  }

  #[test]
  fn log_returns_match_price_ratio() {
    let prices = PriceSeries::new(
      dates(3),
      vec![
        ("AAA".into(), vec![100.0, 110.0, 121.0]),
        ("BBB".into(), vec![50.0, 50.0, 25.0]),
      ],
    )
    .unwrap();
    let builder = ReturnSeriesBuilder {
      min_periods: 2,
      ..Default::default()
    };
    let series = builder.build(&prices).unwrap();

    assert_eq!(series.n_periods(), 2);
    assert!((series.returns()[[0, 0]] - 1.1_f64.ln()).abs() < 1e-12);
    assert!((series.returns()[[1, 1]] - 0.5_f64.ln()).abs() < 1e-12);
  }

  #[test]
  fn drops_assets_with_gaps_under_drop_policy() {
    let n = 40;
    let mut gappy = trending(n, 20.0, 0.002);
    gappy[10] = f64::NAN;
    let prices = PriceSeries::new(
      dates(n),
      vec![
        ("AAA".into(), trending(n, 100.0, 0.001)),
        ("BBB".into(), gappy),
        ("CCC".into(), trending(n, 30.0, -0.001)),
      ],
    )
    .unwrap();

    let builder = ReturnSeriesBuilder {
      missing_prices: MissingPricePolicy::Drop,
      ..Default::default()
    };
    let series = builder.build(&prices).unwrap();

    assert_eq!(series.universe().ids(), &["AAA".to_string(), "CCC".to_string()]);
    assert_eq!(series.dropped(), &["BBB".to_string()]);
    assert_eq!(series.n_periods(), n - 1);

    let filled = ReturnSeriesBuilder::default().build(&prices).unwrap();
    assert_eq!(filled.n_assets(), 3);
  }

  #[test]
  fn never_quoted_asset_is_dropped_before_filling() {
    let n = 40;
    let prices = PriceSeries::new(
      dates(n),
      vec![
        ("AAA".into(), trending(n, 100.0, 0.001)),
        ("BBB".into(), vec![f64::NAN; n]),
        ("CCC".into(), trending(n, 30.0, 0.002)),
      ],
    )
    .unwrap();

    let series = ReturnSeriesBuilder::default().build(&prices).unwrap();

    assert_eq!(series.universe().ids(), &["AAA".to_string(), "CCC".to_string()]);
    assert_eq!(series.dropped(), &["BBB".to_string()]);
    assert_eq!(series.n_periods(), n - 1);
  }

  #[test]
  fn single_surviving_asset_is_insufficient() {
    let n = 40;
    let prices = PriceSeries::new(
      dates(n),
      vec![
        ("AAA".into(), trending(n, 100.0, 0.001)),
        ("BBB".into(), vec![f64::NAN; n]),
      ],
    )
    .unwrap();

    let err = ReturnSeriesBuilder::default().build(&prices).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::InsufficientAssets {
        retained: 1,
        required: 2
      }
    );
  }

  #[test]
  fn short_window_is_insufficient() {
    let n = 10;
    let prices = PriceSeries::new(
      dates(n),
      vec![
        ("AAA".into(), trending(n, 100.0, 0.001)),
        ("BBB".into(), trending(n, 10.0, 0.003)),
      ],
    )
    .unwrap();

    let err = ReturnSeriesBuilder::default().build(&prices).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::InsufficientPeriods {
        periods: 9,
        required: 30
      }
    );
  }

  #[test]
  fn observations_are_aligned_on_union_of_dates() {
    let d = dates(3);
    let prices = PriceSeries::from_observations(vec![
      ("AAA", d[0], 1.0),
      ("AAA", d[2], 3.0),
      ("BBB", d[1], 2.0),
    ])
    .unwrap();

    assert_eq!(prices.n_periods(), 3);
    assert!(prices.column("AAA").unwrap()[1].is_nan());
    assert!(prices.column("BBB").unwrap()[0].is_nan());

    let empty = PriceSeries::new(
      d.clone(),
      vec![
        ("AAA".into(), vec![1.0, 2.0, 3.0]),
        ("ZZZ".into(), vec![f64::NAN; 3]),
      ],
    )
    .unwrap()
    .without_empty_columns();
    assert_eq!(empty.universe().ids(), &["AAA".to_string()]);
  }

  #[test]
  fn duplicate_observations_are_rejected() {
    let d = dates(1)[0];
    let err = PriceSeries::from_observations(vec![("AAA", d, 1.0), ("AAA", d, 2.0)]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }
}
