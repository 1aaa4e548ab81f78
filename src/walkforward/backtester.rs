//! Walk-forward backtester.
//!
//! Each fold fits its own scaler and model on rows strictly before the
//! cutoff, then forecasts the evaluation rows one step ahead. Folds share no
//! mutable state, so they run sequentially or on the rayon pool with
//! identical output.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{Dataset, Timestamp};
use crate::features::{FeatureEngine, FeatureError, FeatureSet, TargetKind};
use crate::metrics::{DirectionBasis, ForecastMetrics, MetricsCalculator};
use crate::model::{build_model, CancellationToken, ModelConfig, ModelError, TrainingReport};
use crate::window::{Window, WindowBuilder, WindowError};

use super::folds::{Fold, FoldConfig, FoldError};
use super::records::{ForecastLog, ForecastRecord, RecordError};

/// Why a single fold could not produce forecasts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FoldFailure {
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("Fold {index} failed (train through {train_end:?}, eval from {eval_start:?}): {source}")]
    Fold {
        index: usize,
        train_end: Option<Timestamp>,
        eval_start: Option<Timestamp>,
        #[source]
        source: FoldFailure,
    },

    #[error("No folds fit in {rows} rows")]
    NoFolds { rows: usize },

    #[error("All {} folds failed or were skipped", folds.len())]
    AllFoldsFailed { folds: Vec<FoldReport> },

    #[error("Forecast time {at} is not after the last observation {last}")]
    ForecastNotAfterData { at: Timestamp, last: Timestamp },

    #[error(transparent)]
    Folds(#[from] FoldError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// What happened in a fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FoldOutcome {
    Completed {
        training: TrainingReport,
        forecasts: usize,
        /// Last timestamp the scaler was fit on.
        fitted_through: Timestamp,
    },
    /// Too little data to build windows; tolerated by configuration.
    Skipped { reason: String },
    /// Training diverged; the fold's predictions were discarded.
    Failed { reason: String },
}

/// Per-fold report with timestamp ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: Fold,
    pub train_start: Option<Timestamp>,
    pub train_end: Option<Timestamp>,
    pub eval_start: Option<Timestamp>,
    pub eval_end: Option<Timestamp>,
    pub outcome: FoldOutcome,
}

impl FoldReport {
    fn new(fold: &Fold, features: &FeatureSet, outcome: FoldOutcome) -> Self {
        let ds = features.dataset();
        Self {
            fold: fold.clone(),
            train_start: ds.timestamp(fold.train.start),
            train_end: fold.train.end.checked_sub(1).and_then(|i| ds.timestamp(i)),
            eval_start: ds.timestamp(fold.eval.start),
            eval_end: fold.eval.end.checked_sub(1).and_then(|i| ds.timestamp(i)),
            outcome,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, FoldOutcome::Completed { .. })
    }
}

/// Output of one successful fold.
#[derive(Debug, Clone)]
pub struct FoldRun {
    pub fold: Fold,
    pub training: TrainingReport,
    pub records: Vec<ForecastRecord>,
    pub fitted_through: Timestamp,
}

/// Complete walk-forward result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub forecasts: ForecastLog,
    pub folds: Vec<FoldReport>,
    /// Over the concatenation of all fold forecasts.
    pub metrics: ForecastMetrics,
}

impl BacktestReport {
    pub fn completed_folds(&self) -> usize {
        self.folds.iter().filter(|f| f.is_completed()).count()
    }

    pub fn failed_folds(&self) -> usize {
        self.folds
            .iter()
            .filter(|f| matches!(f.outcome, FoldOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped_folds(&self) -> usize {
        self.folds
            .iter()
            .filter(|f| matches!(f.outcome, FoldOutcome::Skipped { .. }))
            .count()
    }

    /// Get summary string.
    pub fn summary(&self) -> String {
        format!(
            "Walk-Forward Results: {} folds ({} completed, {} skipped, {} failed)\n{}",
            self.folds.len(),
            self.completed_folds(),
            self.skipped_folds(),
            self.failed_folds(),
            self.metrics.summary()
        )
    }
}

/// Walk-forward backtester.
#[derive(Clone)]
pub struct Backtester {
    engine: FeatureEngine,
    window_len: usize,
    model: ModelConfig,
    folds: FoldConfig,
    cancel: CancellationToken,
}

impl Backtester {
    /// `engine` is used as a template; each fold gets its own unfitted copy.
    pub fn new(engine: FeatureEngine, window_len: usize, model: ModelConfig, folds: FoldConfig) -> Self {
        Self {
            engine: engine.unfitted(),
            window_len,
            model,
            folds,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token observed by every fold's training loop.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn fold_config(&self) -> &FoldConfig {
        &self.folds
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    fn direction_basis(&self) -> DirectionBasis {
        match self.engine.config().target_kind {
            TargetKind::Level => DirectionBasis::PreviousValue,
            TargetKind::Return => DirectionBasis::Sign,
        }
    }

    /// Derive features from an aligned dataset and run every fold.
    pub fn run(&self, aligned: &Dataset) -> Result<BacktestReport, BacktestError> {
        let features = self.engine.derive(aligned)?;
        self.run_features(&features)
    }

    /// Run every fold over already derived (unscaled) features.
    pub fn run_features(&self, features: &FeatureSet) -> Result<BacktestReport, BacktestError> {
        let folds: Vec<Fold> = self.folds.folds(features.len())?.collect();
        if folds.is_empty() {
            return Err(BacktestError::NoFolds {
                rows: features.len(),
            });
        }
        info!(
            "Generated {} walk-forward folds over {} rows (window {}, model {})",
            folds.len(),
            features.len(),
            self.window_len,
            self.model.kind.name()
        );

        let results: Vec<Result<FoldRun, FoldFailure>> = if self.folds.parallel {
            folds.par_iter().map(|f| self.run_fold(features, f)).collect()
        } else {
            folds.iter().map(|f| self.run_fold(features, f)).collect()
        };

        let mut forecasts = ForecastLog::new();
        let mut reports = Vec::with_capacity(folds.len());
        for (fold, result) in folds.iter().zip(results) {
            let outcome = match result {
                Ok(run) => {
                    let count = run.records.len();
                    for record in run.records {
                        forecasts.push(record)?;
                    }
                    FoldOutcome::Completed {
                        training: run.training,
                        forecasts: count,
                        fitted_through: run.fitted_through,
                    }
                }
                Err(FoldFailure::Window(WindowError::InsufficientData { len, window }))
                    if self.folds.tolerate_short_folds =>
                {
                    warn!(
                        "Fold {}/{} skipped: {} rows for window length {}",
                        fold.index + 1,
                        folds.len(),
                        len,
                        window
                    );
                    FoldOutcome::Skipped {
                        reason: WindowError::InsufficientData { len, window }.to_string(),
                    }
                }
                // Per-fold numeric failures; the remaining folds still run.
                Err(FoldFailure::Model(
                    err @ (ModelError::TrainingDiverged { .. }
                    | ModelError::Singular
                    | ModelError::NonFinitePrediction),
                )) => {
                    warn!("Fold {}/{} failed: {}", fold.index + 1, folds.len(), err);
                    FoldOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
                Err(source) => {
                    let report = FoldReport::new(fold, features, FoldOutcome::Failed {
                        reason: source.to_string(),
                    });
                    return Err(BacktestError::Fold {
                        index: fold.index,
                        train_end: report.train_end,
                        eval_start: report.eval_start,
                        source,
                    });
                }
            };
            reports.push(FoldReport::new(fold, features, outcome));
        }

        let Some(metrics) = MetricsCalculator::calculate(forecasts.records(), self.direction_basis()) else {
            return Err(BacktestError::AllFoldsFailed { folds: reports });
        };
        info!(
            "Walk-forward complete: {} forecasts, RMSE {:.6}, MAE {:.6}",
            metrics.count, metrics.rmse, metrics.mae
        );

        Ok(BacktestReport {
            forecasts,
            folds: reports,
            metrics,
        })
    }

    /// Fit on `fold.train` and forecast every row of `fold.eval`.
    pub fn run_fold(&self, features: &FeatureSet, fold: &Fold) -> Result<FoldRun, FoldFailure> {
        info!(
            "Processing fold {}: train rows {}..{}, eval rows {}..{}",
            fold.index + 1,
            fold.train.start,
            fold.train.end,
            fold.eval.start,
            fold.eval.end
        );

        let builder = WindowBuilder::new(self.window_len, features.target_index());
        let train = features.slice(fold.train.clone());
        let mut engine = self.engine.unfitted();
        let fitted_through = engine.fit_scaler(&train)?.fitted_through();

        let scaled_train = engine.transform(&train)?;
        let train_windows: Vec<Window> = builder.windows(scaled_train.dataset())?.collect();

        // Evaluation inputs reach back `window_len` rows before the cutoff.
        let context_start = fold
            .eval
            .start
            .checked_sub(self.window_len)
            .ok_or(WindowError::InsufficientData {
                len: fold.eval.start,
                window: self.window_len,
            })?;
        let context = features.slice(context_start..fold.eval.end);
        let scaled_context = engine.transform(&context)?;
        let eval_windows = builder.windows(scaled_context.dataset())?;

        let seed = self.model.seed.wrapping_add(fold.index as u64);
        let mut model = build_model(&self.model.clone().with_seed(seed))?;
        let training = model.train(&train_windows, &self.cancel)?;

        model.reset_state();
        let target = features.target_index();
        let mut records = Vec::with_capacity(eval_windows.len());
        for window in eval_windows {
            let scaled = model.predict(window.input.view())?;
            records.push(ForecastRecord {
                timestamp: window.target_timestamp,
                predicted: engine.inverse_value(target, scaled)?,
                realized: context.target_value(window.target_index),
                previous: context.target_value(window.target_index - 1),
                fold: Some(fold.index),
            });
        }
        model.reset_state();

        info!(
            "Fold {} complete: {} forecasts, {} epochs, best loss {:.6}",
            fold.index + 1,
            records.len(),
            training.epochs_run,
            training.best_loss
        );

        Ok(FoldRun {
            fold: fold.clone(),
            training,
            records,
            fitted_through,
        })
    }

    /// Train on all of `aligned` and forecast the target at `at`.
    pub fn forecast_next(&self, aligned: &Dataset, at: Timestamp) -> Result<ForecastRecord, BacktestError> {
        let features = self.engine.derive(aligned)?;
        if let Some(last) = features.dataset().last_timestamp() {
            if at <= last {
                return Err(BacktestError::ForecastNotAfterData { at, last });
            }
        }

        let mut engine = self.engine.unfitted();
        engine.fit_scaler(&features)?;
        let scaled = engine.transform(&features)?;
        let builder = WindowBuilder::new(self.window_len, features.target_index());
        let windows: Vec<Window> = builder.windows(scaled.dataset())?.collect();

        let mut model = build_model(&self.model)?;
        let training = model.train(&windows, &self.cancel)?;
        info!(
            "Forward model trained on {} windows ({} epochs)",
            windows.len(),
            training.epochs_run
        );

        let input = builder.latest_input(scaled.dataset())?;
        let target = features.target_index();
        let predicted = engine.inverse_value(target, model.predict(input.view())?)?;
        Ok(ForecastRecord {
            timestamp: at,
            predicted,
            realized: None,
            previous: features.len().checked_sub(1).and_then(|i| features.target_value(i)),
            fold: None,
        })
    }

    /// Backtest independent assets in parallel with this configuration.
    pub fn run_assets(
        &self,
        assets: &BTreeMap<String, Dataset>,
    ) -> BTreeMap<String, Result<BacktestReport, BacktestError>> {
        assets
            .par_iter()
            .map(|(name, aligned)| {
                info!("Backtesting asset {}", name);
                (name.clone(), self.run(aligned))
            })
            .collect()
    }

    /// Forward forecasts for independent assets in parallel.
    pub fn forecast_assets(
        &self,
        assets: &BTreeMap<String, Dataset>,
        at: Timestamp,
    ) -> BTreeMap<String, Result<ForecastRecord, BacktestError>> {
        assets
            .par_iter()
            .map(|(name, aligned)| (name.clone(), self.forecast_next(aligned, at)))
            .collect()
    }
}
