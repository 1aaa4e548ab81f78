//! Portfolio allocation from return forecasts.

pub mod covariance;
pub mod optimizer;

pub use covariance::{returns_from_levels, sample_covariance, shrink_covariance};
pub use optimizer::{
    Allocation, OptimizerConfig, OptimizerError, Portfolio, PortfolioOptimizer, SolveMethod, WeightBounds,
};
