//! Forecast metrics module.
//!
//! Scores realized forecasts:
//! - Root-mean-squared and mean-absolute error
//! - Bias and worst-case error
//! - Directional accuracy

pub mod calculator;

pub use calculator::{DirectionBasis, ForecastMetrics, MetricsCalculator};
