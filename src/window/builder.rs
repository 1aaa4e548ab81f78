//! Fixed-length input windows with next-step targets.
//!
//! For a dataset of `n` rows and window length `L`, window `i` covers rows
//! `i..i + L` and its target is the target column at row `i + L`. The
//! [`Windows`] iterator is lazy, cloneable (restartable) and deterministic.

use std::ops::Range;

use ndarray::{s, Array2};
use thiserror::Error;

use crate::data::{Dataset, Timestamp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("Insufficient data: {len} rows for window length {window}")]
    InsufficientData { len: usize, window: usize },

    #[error("Window length must be positive")]
    ZeroLength,

    #[error("Target column {column} out of range ({n_features} features)")]
    InvalidTargetColumn { column: usize, n_features: usize },

    #[error("Invalid target range {start}..{end} for {len} rows and window length {window}")]
    InvalidTargetRange {
        start: usize,
        end: usize,
        len: usize,
        window: usize,
    },
}

/// One training/evaluation sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// `L x F` scaled features, oldest row first.
    pub input: Array2<f64>,
    /// Scaled target value at `target_index`.
    pub target: f64,
    /// Row of the target in the source dataset.
    pub target_index: usize,
    pub target_timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBuilder {
    window_len: usize,
    target_column: usize,
}

impl WindowBuilder {
    pub fn new(window_len: usize, target_column: usize) -> Self {
        Self {
            window_len,
            target_column,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn target_column(&self) -> usize {
        self.target_column
    }

    /// All `n - L` windows of `dataset`.
    pub fn windows<'a>(&self, dataset: &'a Dataset) -> Result<Windows<'a>, WindowError> {
        self.check(dataset)?;
        if dataset.len() <= self.window_len {
            return Err(WindowError::InsufficientData {
                len: dataset.len(),
                window: self.window_len,
            });
        }
        Ok(Windows {
            dataset,
            window_len: self.window_len,
            target_column: self.target_column,
            next: self.window_len,
            end: dataset.len(),
        })
    }

    /// Windows whose target rows fall in `targets`.
    ///
    /// Every target row needs `L` rows of history before it, so
    /// `targets.start >= L` is required.
    pub fn windows_targeting<'a>(
        &self,
        dataset: &'a Dataset,
        targets: Range<usize>,
    ) -> Result<Windows<'a>, WindowError> {
        self.check(dataset)?;
        if dataset.len() <= self.window_len {
            return Err(WindowError::InsufficientData {
                len: dataset.len(),
                window: self.window_len,
            });
        }
        if targets.start < self.window_len || targets.end > dataset.len() || targets.start > targets.end {
            return Err(WindowError::InvalidTargetRange {
                start: targets.start,
                end: targets.end,
                len: dataset.len(),
                window: self.window_len,
            });
        }
        Ok(Windows {
            dataset,
            window_len: self.window_len,
            target_column: self.target_column,
            next: targets.start,
            end: targets.end,
        })
    }

    /// The most recent `L` rows, used as input for a forward forecast.
    pub fn latest_input(&self, dataset: &Dataset) -> Result<Array2<f64>, WindowError> {
        self.check(dataset)?;
        let n = dataset.len();
        if n < self.window_len {
            return Err(WindowError::InsufficientData {
                len: n,
                window: self.window_len,
            });
        }
        Ok(dataset.values().slice(s![n - self.window_len..n, ..]).to_owned())
    }

    fn check(&self, dataset: &Dataset) -> Result<(), WindowError> {
        if self.window_len == 0 {
            return Err(WindowError::ZeroLength);
        }
        if self.target_column >= dataset.n_features() {
            return Err(WindowError::InvalidTargetColumn {
                column: self.target_column,
                n_features: dataset.n_features(),
            });
        }
        Ok(())
    }
}

/// Lazy iterator over windows. Clone it to restart from the same position.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    dataset: &'a Dataset,
    window_len: usize,
    target_column: usize,
    /// Target row of the next window.
    next: usize,
    end: usize,
}

impl Iterator for Windows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next >= self.end {
            return None;
        }
        let t = self.next;
        self.next += 1;

        let input = self
            .dataset
            .values()
            .slice(s![t - self.window_len..t, ..])
            .to_owned();
        Some(Window {
            input,
            target: self.dataset.value(t, self.target_column)?,
            target_index: t,
            target_timestamp: self.dataset.timestamp(t)?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}
