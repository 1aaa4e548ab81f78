//! Regime-aware walk-forward forecasting for market and macro series.
//!
//! This crate provides:
//! - Multi-source alignment onto one timestamp grid with bounded gap filling
//! - Feature derivation: returns, seasonality, regime labels, train-only scaling
//! - Sliding-window sample construction
//! - Forecast models: stacked LSTM, ridge baseline, ensemble
//! - Leak-free walk-forward backtesting with forecast accuracy metrics
//! - Mean-variance allocation from forecasts

pub mod config;
pub mod data;
pub mod features;
mod linalg;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod portfolio;
pub mod regime;
pub mod walkforward;
pub mod window;

use thiserror::Error;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig};
pub use data::{AlignError, Aligner, AlignerConfig, DataError, Dataset, RawSeries, Timestamp};
pub use features::{FeatureConfig, FeatureEngine, FeatureError, FeatureSet, TargetKind};
pub use metrics::{ForecastMetrics, MetricsCalculator};
pub use model::{build_model, CancellationToken, ForecastModel, ModelConfig, ModelError, ModelKind};
pub use pipeline::{AllocationOutcome, ForecastPipeline};
pub use portfolio::{OptimizerConfig, OptimizerError, Portfolio, PortfolioOptimizer, WeightBounds};
pub use regime::{Regime, RegimeError, RegimeSource};
pub use walkforward::{BacktestError, BacktestReport, Backtester, FoldConfig, ForecastLog, ForecastRecord};
pub use window::{Window, WindowBuilder, WindowError};

/// Any error the pipeline can surface.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Regime(#[from] RegimeError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Fill method for series {0} interpolates toward later observations; backtests need forward fill")]
    LookaheadFill(String),

    #[error("No basis to convert the forecast for {0} into a return")]
    NoReturnBasis(String),

    #[error("Asset {asset}: {source}")]
    Asset {
        asset: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn asset(asset: String, source: Error) -> Self {
        Self::Asset {
            asset,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
