//! Per-feature scaling state.
//!
//! A [`ScalerState`] is fit once on a training slice and is immutable
//! afterwards. The same state is applied to training and held-out rows, so
//! nothing about the held-out rows leaks into the scaling.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::{Dataset, Timestamp};

use super::engine::FeatureError;

/// Ranges or deviations below this are treated as constant columns.
const DEGENERATE_SCALE: f64 = 1e-12;

/// Scaling method for continuous features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    /// `(x - min) / (max - min)`.
    #[default]
    MinMax,
    /// `(x - mean) / std`.
    Standard,
}

/// Fitted scale for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FeatureScale {
    MinMax { min: f64, max: f64 },
    Standard { mean: f64, std: f64 },
    /// Already bounded features (seasonal, regime) pass through unchanged.
    Passthrough,
}

impl FeatureScale {
    pub fn transform(&self, x: f64) -> f64 {
        match *self {
            Self::MinMax { min, max } => {
                let range = max - min;
                if range.abs() <= DEGENERATE_SCALE {
                    x - min
                } else {
                    (x - min) / range
                }
            }
            Self::Standard { mean, std } => {
                if std <= DEGENERATE_SCALE {
                    x - mean
                } else {
                    (x - mean) / std
                }
            }
            Self::Passthrough => x,
        }
    }

    pub fn inverse(&self, y: f64) -> f64 {
        match *self {
            Self::MinMax { min, max } => {
                let range = max - min;
                if range.abs() <= DEGENERATE_SCALE {
                    y + min
                } else {
                    y * range + min
                }
            }
            Self::Standard { mean, std } => {
                if std <= DEGENERATE_SCALE {
                    y + mean
                } else {
                    y * std + mean
                }
            }
            Self::Passthrough => y,
        }
    }
}

/// Immutable per-feature scaling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    columns: Vec<String>,
    scales: Vec<FeatureScale>,
    fitted_rows: usize,
    fitted_through: Timestamp,
}

impl ScalerState {
    /// Fit on `train`. `passthrough[j]` marks columns left unscaled.
    pub(crate) fn fit(
        train: &Dataset,
        kind: ScalerKind,
        passthrough: &[bool],
    ) -> Result<Self, FeatureError> {
        let fitted_through = train.last_timestamp().ok_or(FeatureError::EmptyTrainingSlice)?;
        if passthrough.len() != train.n_features() {
            return Err(FeatureError::SchemaMismatch {
                expected: passthrough.len(),
                got: train.n_features(),
            });
        }

        let scales = (0..train.n_features())
            .map(|j| {
                if passthrough[j] {
                    return FeatureScale::Passthrough;
                }
                let col = train.column(j);
                match kind {
                    ScalerKind::MinMax => FeatureScale::MinMax {
                        min: col.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
                        max: col.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
                    },
                    ScalerKind::Standard => FeatureScale::Standard {
                        mean: col.iter().mean(),
                        std: col.iter().population_std_dev(),
                    },
                }
            })
            .collect();

        Ok(Self {
            columns: train.columns().to_vec(),
            scales,
            fitted_rows: train.len(),
            fitted_through,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn scales(&self) -> &[FeatureScale] {
        &self.scales
    }

    pub fn scale(&self, col: usize) -> Option<&FeatureScale> {
        self.scales.get(col)
    }

    /// Number of rows the scaler was fit on.
    pub fn fitted_rows(&self) -> usize {
        self.fitted_rows
    }

    /// Timestamp of the last row the scaler saw.
    pub fn fitted_through(&self) -> Timestamp {
        self.fitted_through
    }

    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset, FeatureError> {
        self.map(dataset, FeatureScale::transform)
    }

    pub fn inverse_transform(&self, dataset: &Dataset) -> Result<Dataset, FeatureError> {
        self.map(dataset, FeatureScale::inverse)
    }

    fn map(&self, dataset: &Dataset, f: fn(&FeatureScale, f64) -> f64) -> Result<Dataset, FeatureError> {
        if dataset.columns() != self.columns.as_slice() {
            return Err(FeatureError::SchemaMismatch {
                expected: self.columns.len(),
                got: dataset.n_features(),
            });
        }
        let mut values: Array2<f64> = dataset.values().to_owned();
        for (j, scale) in self.scales.iter().enumerate() {
            values.column_mut(j).mapv_inplace(|x| f(scale, x));
        }
        Ok(dataset.with_values(self.columns.clone(), values)?)
    }
}
