//! The forecast-model capability set.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::window::Window;

use super::cancel::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Training diverged at epoch {epoch}: loss = {loss}")]
    TrainingDiverged { epoch: usize, loss: f64 },

    #[error("No training windows")]
    NoTrainingData,

    #[error("Model has not been trained")]
    NotTrained,

    #[error("Input shape mismatch: expected {expected:?}, got {got:?}")]
    InputShape {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Prediction is not finite")]
    NonFinitePrediction,

    #[error("Normal equations are singular; increase the ridge penalty")]
    Singular,

    #[error("Invalid model config: {0}")]
    InvalidConfig(String),
}

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Ran all configured epochs.
    Completed,
    /// Validation loss stopped improving for `patience` epochs.
    EarlyStopped,
    /// Cancellation observed at an epoch boundary.
    Cancelled,
}

/// Losses for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
}

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    /// Epoch whose parameters were kept. `None` if cancelled before the first epoch.
    pub best_epoch: Option<usize>,
    /// Monitored loss (validation if available, else training) of the kept parameters.
    pub best_loss: f64,
    pub history: Vec<EpochLoss>,
    pub stop_reason: StopReason,
}

impl TrainingReport {
    pub fn final_train_loss(&self) -> Option<f64> {
        self.history.last().map(|e| e.train_loss)
    }
}

/// A trainable one-step-ahead sequence predictor.
///
/// Instances own their parameters and any recurrent state. `Send` so folds
/// can train on worker threads.
pub trait ForecastModel: Send {
    fn name(&self) -> &str;

    /// Fit on chronologically ordered windows. Retraining starts from a fresh
    /// initialization derived from the configured seed.
    fn train(
        &mut self,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<TrainingReport, ModelError>;

    /// Scaled prediction for one `L x F` input sequence.
    fn predict(&mut self, input: ArrayView2<'_, f64>) -> Result<f64, ModelError>;

    /// Clear carried recurrent state. Parameters are untouched.
    fn reset_state(&mut self);

    fn is_trained(&self) -> bool;
}

/// Mean-squared error over windows using `predict`. Resets state before and after.
pub fn evaluate_mse(model: &mut dyn ForecastModel, windows: &[Window]) -> Result<f64, ModelError> {
    if windows.is_empty() {
        return Err(ModelError::NoTrainingData);
    }
    model.reset_state();
    let mut total = 0.0;
    for window in windows {
        let err = model.predict(window.input.view())? - window.target;
        total += err * err;
    }
    model.reset_state();
    Ok(total / windows.len() as f64)
}
