//! Multi-source alignment.
//!
//! Joins named raw series onto one timestamp grid and resolves missing cells:
//! - Grid: union of all timestamps, or the calendar of one reference series
//! - A cell is missing when its source delivered no observation in the grid
//!   interval ending at that row (slower series are as-of joined)
//! - Leading rows before every series has started are dropped
//! - Interior gaps are forward-filled or linearly interpolated up to a
//!   per-series limit; longer gaps fail the alignment

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::types::{DataError, Dataset, RawSeries, Timestamp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("No series to align")]
    NoSeries,

    #[error("Unknown reference series: {0}")]
    UnknownSeries(String),

    #[error("Series {series} has duplicate timestamp {at}")]
    DuplicateTimestamp { series: String, at: Timestamp },

    #[error("Series {series} has no usable observations")]
    NoObservations { series: String },

    #[error("Data gap in {series}: {missing} missing rows from {start} to {end} (max {max_gap})")]
    DataGap {
        series: String,
        start: Timestamp,
        end: Timestamp,
        missing: usize,
        max_gap: usize,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}

/// How missing cells are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMethod {
    /// Carry the last observed value forward.
    #[default]
    ForwardFill,
    /// Time-weighted interpolation between the surrounding observations.
    /// Uses the observation after the gap, so it looks ahead within the gap.
    /// Trailing gaps fall back to forward fill.
    Linear,
}

/// Which timestamps form the output grid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calendar {
    /// Outer join of every series' timestamps.
    #[default]
    Union,
    /// Timestamps of the named series (typically the traded instrument).
    Reference(String),
}

/// Per-series override of the global fill policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesPolicy {
    pub fill: Option<FillMethod>,
    pub max_gap: Option<usize>,
}

/// Alignment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Default fill method.
    pub fill: FillMethod,
    /// Default maximum number of consecutive missing rows that may be filled.
    pub max_gap: usize,
    /// Output grid.
    pub calendar: Calendar,
    /// Overrides keyed by series name.
    pub series_overrides: BTreeMap<String, SeriesPolicy>,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            fill: FillMethod::ForwardFill,
            max_gap: 5,
            calendar: Calendar::Union,
            series_overrides: BTreeMap::new(),
        }
    }
}

impl AlignerConfig {
    /// Series whose fill method reads observations after a gap, `"*"` for
    /// the default policy. Such fills are unsafe ahead of a walk-forward split.
    pub fn lookahead_series(&self) -> Option<&str> {
        if self.fill == FillMethod::Linear {
            return Some("*");
        }
        self.series_overrides
            .iter()
            .find(|(_, p)| p.fill == Some(FillMethod::Linear))
            .map(|(name, _)| name.as_str())
    }

    fn policy_for(&self, series: &str) -> (FillMethod, usize) {
        let over = self.series_overrides.get(series);
        (
            over.and_then(|p| p.fill).unwrap_or(self.fill),
            over.and_then(|p| p.max_gap).unwrap_or(self.max_gap),
        )
    }
}

/// What the aligner did to produce the dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// Grid rows dropped before every series had started.
    pub dropped_leading: usize,
    /// Filled cells per series.
    pub filled: BTreeMap<String, usize>,
}

/// Merges raw series into one continuous dataset.
pub struct Aligner {
    config: AlignerConfig,
}

impl Aligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Align the series; columns follow input order.
    pub fn align(&self, series: &[RawSeries]) -> Result<Dataset, AlignError> {
        self.align_with_report(series).map(|(ds, _)| ds)
    }

    pub fn align_with_report(
        &self,
        series: &[RawSeries],
    ) -> Result<(Dataset, AlignmentReport), AlignError> {
        if series.is_empty() {
            return Err(AlignError::NoSeries);
        }

        let sorted = series
            .iter()
            .map(sorted_points)
            .collect::<Result<Vec<_>, _>>()?;

        let grid: Vec<Timestamp> = match &self.config.calendar {
            Calendar::Union => sorted
                .iter()
                .flat_map(|pts| pts.iter().map(|(ts, _)| *ts))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Calendar::Reference(name) => {
                let idx = series
                    .iter()
                    .position(|s| &s.name == name)
                    .ok_or_else(|| AlignError::UnknownSeries(name.clone()))?;
                sorted[idx].iter().map(|(ts, _)| *ts).collect()
            }
        };

        let cells: Vec<Vec<Option<f64>>> = sorted.iter().map(|pts| as_of_join(&grid, pts)).collect();

        // Drop rows until every series has delivered a value.
        let mut start = 0;
        for (s, col) in series.iter().zip(&cells) {
            let first = col
                .iter()
                .position(Option::is_some)
                .ok_or_else(|| AlignError::NoObservations {
                    series: s.name.clone(),
                })?;
            start = start.max(first);
        }
        let grid = &grid[start..];

        let mut report = AlignmentReport {
            dropped_leading: start,
            ..Default::default()
        };
        let mut values = Array2::zeros((grid.len(), series.len()));
        for (j, (s, col)) in series.iter().zip(&cells).enumerate() {
            let (method, max_gap) = self.config.policy_for(&s.name);
            let (filled, count) = fill_column(&s.name, grid, &col[start..], method, max_gap)?;
            for (i, v) in filled.into_iter().enumerate() {
                values[[i, j]] = v;
            }
            report.filled.insert(s.name.clone(), count);
        }

        debug!(
            "Aligned {} series onto {} rows ({} leading rows dropped)",
            series.len(),
            grid.len(),
            start
        );

        let columns = series.iter().map(|s| s.name.clone()).collect();
        let dataset = Dataset::new(columns, grid.to_vec(), values)?;
        Ok((dataset, report))
    }
}

fn sorted_points(series: &RawSeries) -> Result<Vec<(Timestamp, f64)>, AlignError> {
    let mut points = series.points.clone();
    points.sort_by_key(|(ts, _)| *ts);
    if let Some(pair) = points.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(AlignError::DuplicateTimestamp {
            series: series.name.clone(),
            at: pair[0].0,
        });
    }
    Ok(points)
}

/// For each grid row, the latest finite observation in `(previous row, row]`.
fn as_of_join(grid: &[Timestamp], points: &[(Timestamp, f64)]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(grid.len());
    let mut j = 0;
    for t in grid {
        let mut latest = None;
        while j < points.len() && points[j].0 <= *t {
            if points[j].1.is_finite() {
                latest = Some(points[j].1);
            }
            j += 1;
        }
        out.push(latest);
    }
    out
}

/// Fill one column whose first cell is present.
fn fill_column(
    name: &str,
    grid: &[Timestamp],
    cells: &[Option<f64>],
    method: FillMethod,
    max_gap: usize,
) -> Result<(Vec<f64>, usize), AlignError> {
    let mut out = Vec::with_capacity(cells.len());
    let mut filled = 0;
    let mut i = 0;

    while i < cells.len() {
        if let Some(v) = cells[i] {
            out.push(v);
            i += 1;
            continue;
        }

        let gap_start = i;
        while i < cells.len() && cells[i].is_none() {
            i += 1;
        }
        let missing = i - gap_start;
        if missing > max_gap {
            return Err(AlignError::DataGap {
                series: name.to_string(),
                start: grid[gap_start],
                end: grid[i - 1],
                missing,
                max_gap,
            });
        }

        // Leading rows were dropped, so a left anchor always exists.
        let left_idx = gap_start - 1;
        let left = out[left_idx];
        let right = cells.get(i).copied().flatten();

        for k in gap_start..i {
            let v = match (method, right) {
                (FillMethod::Linear, Some(right)) => {
                    let span = (grid[i] - grid[left_idx]).num_seconds() as f64;
                    let offset = (grid[k] - grid[left_idx]).num_seconds() as f64;
                    left + (right - left) * offset / span
                }
                _ => left,
            };
            out.push(v);
        }
        filled += missing;
    }

    Ok((out, filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn day(offset: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset)
    }

    fn series(name: &str, points: &[(i64, f64)]) -> RawSeries {
        RawSeries::new(name, points.iter().map(|(d, v)| (day(*d), *v)).collect())
    }

    #[test]
    fn test_outer_join_forward_fill() {
        let price = series("price", &[(0, 100.0), (1, 101.0), (2, 102.0), (3, 103.0)]);
        let macro_ = series("rate", &[(0, 5.0), (2, 5.25)]);

        let aligner = Aligner::new(AlignerConfig::default());
        let (ds, report) = aligner.align_with_report(&[price, macro_]).unwrap();

        assert_eq!(ds.len(), 4);
        assert_eq!(ds.column(1).to_vec(), vec![5.0, 5.0, 5.25, 5.25]);
        assert_eq!(report.filled["rate"], 2);
        assert_eq!(report.filled["price"], 0);
    }

    #[test]
    fn test_linear_interpolation_is_time_weighted() {
        let a = series("a", &[(0, 0.0), (1, 1.0), (2, 2.0), (4, 4.0)]);
        let b = series("b", &[(0, 10.0), (4, 50.0)]);
        let config = AlignerConfig {
            fill: FillMethod::Linear,
            ..Default::default()
        };

        let ds = Aligner::new(config).align(&[a, b]).unwrap();
        // Grid is days 0, 1, 2, 4.
        assert_eq!(ds.column(1).to_vec(), vec![10.0, 20.0, 30.0, 50.0]);
    }

    #[test]
    fn test_linear_trailing_gap_falls_back_to_forward_fill() {
        let a = series("a", &[(0, 0.0), (1, 1.0), (2, 2.0)]);
        let b = series("b", &[(0, 7.0)]);
        let config = AlignerConfig {
            fill: FillMethod::Linear,
            ..Default::default()
        };
        let ds = Aligner::new(config).align(&[a, b]).unwrap();
        assert_eq!(ds.column(1).to_vec(), vec![7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_gap_exceeding_limit_fails() {
        let a = series("a", &[(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        let b = series("b", &[(0, 2.0), (4, 2.0)]);
        let config = AlignerConfig {
            max_gap: 2,
            ..Default::default()
        };

        let err = Aligner::new(config).align(&[a, b]).unwrap_err();
        match err {
            AlignError::DataGap {
                series,
                start,
                end,
                missing,
                max_gap,
            } => {
                assert_eq!(series, "b");
                assert_eq!(start, day(1));
                assert_eq!(end, day(3));
                assert_eq!(missing, 3);
                assert_eq!(max_gap, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_series_override_allows_longer_gap() {
        let a = series("a", &[(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        let b = series("b", &[(0, 2.0), (4, 3.0)]);
        let mut config = AlignerConfig {
            max_gap: 1,
            ..Default::default()
        };
        config.series_overrides.insert(
            "b".into(),
            SeriesPolicy {
                fill: None,
                max_gap: Some(3),
            },
        );

        let ds = Aligner::new(config).align(&[a, b]).unwrap();
        assert_eq!(ds.column(1).to_vec(), vec![2.0, 2.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reference_calendar_as_of_joins_slower_series() {
        // Trading days 1..=5; the macro series is published on day 0 and day 3.
        let price = series("price", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0)]);
        let macro_ = series("cpi", &[(0, 300.0), (3, 301.0)]);
        let config = AlignerConfig {
            calendar: Calendar::Reference("price".into()),
            ..Default::default()
        };

        let ds = Aligner::new(config).align(&[price, macro_]).unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.first_timestamp(), Some(day(1)));
        assert_eq!(ds.column(1).to_vec(), vec![300.0, 300.0, 301.0, 301.0, 301.0]);
    }

    #[test]
    fn test_leading_rows_dropped_until_all_series_start() {
        let a = series("a", &[(0, 1.0), (1, 2.0), (2, 3.0)]);
        let b = series("b", &[(1, 10.0), (2, 11.0)]);

        let (ds, report) = Aligner::new(AlignerConfig::default())
            .align_with_report(&[a, b])
            .unwrap();
        assert_eq!(report.dropped_leading, 1);
        assert_eq!(ds.first_timestamp(), Some(day(1)));
    }

    #[test]
    fn test_non_finite_values_count_as_missing() {
        let a = series("a", &[(0, 1.0), (1, f64::NAN), (2, 3.0)]);
        let ds = Aligner::new(AlignerConfig::default()).align(&[a]).unwrap();
        assert_eq!(ds.column(0).to_vec(), vec![1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_errors() {
        let aligner = Aligner::new(AlignerConfig::default());
        assert_eq!(aligner.align(&[]).unwrap_err(), AlignError::NoSeries);

        let dup = series("a", &[(0, 1.0), (0, 2.0)]);
        assert!(matches!(
            aligner.align(&[dup]).unwrap_err(),
            AlignError::DuplicateTimestamp { .. }
        ));

        let config = AlignerConfig {
            calendar: Calendar::Reference("missing".into()),
            ..Default::default()
        };
        let a = series("a", &[(0, 1.0)]);
        assert_eq!(
            Aligner::new(config).align(&[a.clone()]).unwrap_err(),
            AlignError::UnknownSeries("missing".into())
        );

        let empty = series("empty", &[]);
        assert!(matches!(
            aligner.align(&[a, empty]).unwrap_err(),
            AlignError::NoObservations { .. }
        ));
    }

    #[test]
    fn test_lookahead_series() {
        let mut config = AlignerConfig::default();
        assert_eq!(config.lookahead_series(), None);

        config.series_overrides.insert(
            "cpi".into(),
            SeriesPolicy {
                fill: Some(FillMethod::Linear),
                max_gap: None,
            },
        );
        assert_eq!(config.lookahead_series(), Some("cpi"));

        config.series_overrides.clear();
        config.fill = FillMethod::Linear;
        assert_eq!(config.lookahead_series(), Some("*"));
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let a = series("a", &[(2, 3.0), (0, 1.0), (1, 2.0)]);
        let ds = Aligner::new(AlignerConfig::default()).align(&[a]).unwrap();
        assert_eq!(ds.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
