//! Walk-forward validation module.
//!
//! Rolling-origin evaluation: every fold trains on rows strictly before its
//! cutoff, forecasts the next `horizon` rows, then the cutoff advances by
//! `stride`.

pub mod backtester;
pub mod folds;
pub mod records;

pub use backtester::{BacktestError, BacktestReport, Backtester, FoldFailure, FoldOutcome, FoldReport, FoldRun};
pub use folds::{Fold, FoldConfig, FoldError, Folds};
pub use records::{ForecastLog, ForecastRecord, RecordError};
