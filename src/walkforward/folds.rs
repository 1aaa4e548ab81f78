//! Walk-forward fold generation.
//!
//! Folds are described by row ranges over the feature dataset. Training
//! always ends strictly before the cutoff and evaluation starts at it.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FoldError {
    #[error("Fold horizon must be positive")]
    ZeroHorizon,

    #[error("Initial training length must be positive")]
    ZeroInitialTrain,

    #[error("Stride {stride} is shorter than horizon {horizon}; evaluation ranges would overlap")]
    OverlappingFolds { stride: usize, horizon: usize },

    #[error("max_train_len must be positive when set")]
    ZeroMaxTrainLen,
}

/// A single walk-forward fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Fold number (0-indexed).
    pub index: usize,
    /// First evaluation row.
    pub cutoff: usize,
    /// Rows used for fitting. Ends at `cutoff`.
    pub train: Range<usize>,
    /// Rows forecast and scored.
    pub eval: Range<usize>,
    /// Evaluation range is shorter than the configured horizon.
    pub partial: bool,
}

impl Fold {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn eval_len(&self) -> usize {
        self.eval.len()
    }
}

/// Configuration for walk-forward folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    /// Rows before the first cutoff.
    pub initial_train: usize,
    /// Evaluation rows per fold.
    pub horizon: usize,
    /// Cutoff advance between folds. Must be at least `horizon`.
    pub stride: usize,
    /// Rolling training window; `None` expands from the first row.
    pub max_train_len: Option<usize>,
    /// Emit a final fold shorter than `horizon` when data runs out mid-fold.
    pub allow_partial_final: bool,
    /// Skip folds too short to build windows instead of failing the run.
    pub tolerate_short_folds: bool,
    /// Run folds on the rayon pool.
    pub parallel: bool,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            initial_train: 252, // ~1 year of trading days
            horizon: 21,
            stride: 21,
            max_train_len: None,
            allow_partial_final: false,
            tolerate_short_folds: true,
            parallel: false,
        }
    }
}

impl FoldConfig {
    pub fn validate(&self) -> Result<(), FoldError> {
        if self.horizon == 0 {
            return Err(FoldError::ZeroHorizon);
        }
        if self.initial_train == 0 {
            return Err(FoldError::ZeroInitialTrain);
        }
        if self.stride < self.horizon {
            return Err(FoldError::OverlappingFolds {
                stride: self.stride,
                horizon: self.horizon,
            });
        }
        if self.max_train_len == Some(0) {
            return Err(FoldError::ZeroMaxTrainLen);
        }
        Ok(())
    }

    /// Number of folds for a dataset of `n` rows. Zero for an invalid config.
    pub fn fold_count(&self, n: usize) -> usize {
        if self.validate().is_err() {
            return 0;
        }
        let full = if n >= self.initial_train + self.horizon {
            (n - self.initial_train - self.horizon) / self.stride + 1
        } else {
            0
        };
        let next_cutoff = self.initial_train + full * self.stride;
        if self.allow_partial_final && next_cutoff < n {
            full + 1
        } else {
            full
        }
    }

    /// Lazy fold sequence over `n` rows.
    pub fn folds(&self, n: usize) -> Result<Folds, FoldError> {
        self.validate()?;
        Ok(Folds {
            config: self.clone(),
            n,
            next: 0,
            count: self.fold_count(n),
        })
    }
}

/// Lazy, restartable sequence of folds. Clone to restart.
#[derive(Debug, Clone)]
pub struct Folds {
    config: FoldConfig,
    n: usize,
    next: usize,
    count: usize,
}

impl Folds {
    /// Fold `index` without advancing the iterator.
    pub fn get(&self, index: usize) -> Option<Fold> {
        if index >= self.count {
            return None;
        }
        let cutoff = self.config.initial_train + index * self.config.stride;
        let train_start = self
            .config
            .max_train_len
            .map_or(0, |max| cutoff.saturating_sub(max));
        let eval_end = (cutoff + self.config.horizon).min(self.n);
        Some(Fold {
            index,
            cutoff,
            train: train_start..cutoff,
            eval: cutoff..eval_end,
            partial: eval_end - cutoff < self.config.horizon,
        })
    }
}

impl Iterator for Folds {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        let fold = self.get(self.next)?;
        self.next += 1;
        Some(fold)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next.min(self.count);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Folds {}
