//! Forecast accuracy metrics.
//!
//! Computed once over the full concatenation of realized forecasts.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::walkforward::ForecastRecord;

/// How the direction of a forecast is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionBasis {
    /// Change relative to the previous observed value (level targets).
    PreviousValue,
    /// Sign of the value itself (return targets).
    Sign,
}

/// Forecast accuracy statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Realized forecasts scored.
    pub count: usize,
    pub rmse: f64,
    pub mae: f64,
    /// Mean of `predicted - realized`.
    pub bias: f64,
    pub max_abs_error: f64,
    /// Fraction of forecasts with the correct direction. `None` when no
    /// record has a direction basis.
    pub directional_accuracy: Option<f64>,
}

impl ForecastMetrics {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let direction = self
            .directional_accuracy
            .map(|d| format!("{:.1}%", d * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "Forecast Summary\n\
             ================\n\
             Forecasts: {}\n\
             RMSE: {:.6}\n\
             MAE: {:.6}\n\
             Bias: {:.6}\n\
             Max Abs Error: {:.6}\n\
             Directional Accuracy: {}",
            self.count, self.rmse, self.mae, self.bias, self.max_abs_error, direction
        )
    }
}

fn direction(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Score every realized record. Returns `None` if none are realized.
    pub fn calculate(records: &[ForecastRecord], basis: DirectionBasis) -> Option<ForecastMetrics> {
        let scored: Vec<(&ForecastRecord, f64)> = records
            .iter()
            .filter_map(|r| r.error().map(|e| (r, e)))
            .collect();
        if scored.is_empty() {
            return None;
        }

        let errors: Vec<f64> = scored.iter().map(|(_, e)| *e).collect();
        let squared: Vec<f64> = errors.iter().map(|e| e * e).collect();
        let absolute: Vec<f64> = errors.iter().map(|e| e.abs()).collect();

        let directions: Vec<bool> = scored
            .iter()
            .filter_map(|(r, _)| Self::direction_hit(r, basis))
            .collect();
        let directional_accuracy = (!directions.is_empty())
            .then(|| directions.iter().filter(|hit| **hit).count() as f64 / directions.len() as f64);

        Some(ForecastMetrics {
            count: scored.len(),
            rmse: squared.iter().mean().sqrt(),
            mae: absolute.iter().mean(),
            bias: errors.iter().mean(),
            max_abs_error: absolute.iter().fold(0.0, |a, &b| a.max(b)),
            directional_accuracy,
        })
    }

    fn direction_hit(record: &ForecastRecord, basis: DirectionBasis) -> Option<bool> {
        let realized = record.realized?;
        match basis {
            DirectionBasis::Sign => Some(direction(record.predicted) == direction(realized)),
            DirectionBasis::PreviousValue => {
                let prev = record.previous?;
                Some(direction(record.predicted - prev) == direction(realized - prev))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn records(rows: &[(f64, Option<f64>, Option<f64>)]) -> Vec<ForecastRecord> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(predicted, realized, previous))| ForecastRecord {
                timestamp: start + Duration::days(i as i64),
                predicted,
                realized,
                previous,
                fold: Some(0),
            })
            .collect()
    }

    #[test]
    fn test_error_metrics() {
        let recs = records(&[
            (1.0, Some(2.0), None),
            (3.0, Some(1.0), None),
            (5.0, None, None),
        ]);
        let m = MetricsCalculator::calculate(&recs, DirectionBasis::PreviousValue).unwrap();
        assert_eq!(m.count, 2);
        assert!((m.rmse - (2.5f64).sqrt()).abs() < 1e-12);
        assert!((m.mae - 1.5).abs() < 1e-12);
        assert!((m.bias - 0.5).abs() < 1e-12);
        assert_eq!(m.max_abs_error, 2.0);
        assert_eq!(m.directional_accuracy, None);
    }

    #[test]
    fn test_directional_accuracy_against_previous() {
        let recs = records(&[
            (11.0, Some(12.0), Some(10.0)), // up, up
            (9.0, Some(11.0), Some(10.0)),  // down, up
            (8.0, Some(7.0), Some(10.0)),   // down, down
            (12.0, Some(13.0), Some(10.0)), // up, up
        ]);
        let m = MetricsCalculator::calculate(&recs, DirectionBasis::PreviousValue).unwrap();
        assert_eq!(m.directional_accuracy, Some(0.75));
    }

    #[test]
    fn test_directional_accuracy_by_sign() {
        let recs = records(&[(0.01, Some(0.02), None), (-0.01, Some(0.03), None)]);
        let m = MetricsCalculator::calculate(&recs, DirectionBasis::Sign).unwrap();
        assert_eq!(m.directional_accuracy, Some(0.5));
    }

    #[test]
    fn test_no_realized_records() {
        let recs = records(&[(1.0, None, None)]);
        assert!(MetricsCalculator::calculate(&recs, DirectionBasis::Sign).is_none());
        assert!(MetricsCalculator::calculate(&[], DirectionBasis::Sign).is_none());
    }

    #[test]
    fn test_summary_mentions_counts() {
        let recs = records(&[(1.0, Some(1.5), Some(1.0))]);
        let summary = MetricsCalculator::calculate(&recs, DirectionBasis::PreviousValue)
            .unwrap()
            .summary();
        assert!(summary.contains("Forecasts: 1"));
    }
}
