//! Ridge-regression baseline on the flattened input window.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::debug;

use crate::linalg::{cholesky, cholesky_solve};
use crate::window::Window;

use super::cancel::CancellationToken;
use super::traits::{EpochLoss, ForecastModel, ModelError, StopReason, TrainingReport};

/// Minimizes `||y - Xβ - b||² + ridge·||β||²` in closed form. The intercept
/// is not penalized.
#[derive(Debug, Clone)]
pub struct LinearForecaster {
    ridge: f64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    input_shape: Option<(usize, usize)>,
}

impl LinearForecaster {
    pub fn new(ridge: f64) -> Self {
        Self {
            ridge,
            coefficients: None,
            intercept: 0.0,
            input_shape: None,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl ForecastModel for LinearForecaster {
    fn name(&self) -> &str {
        "linear"
    }

    fn train(
        &mut self,
        windows: &[Window],
        _cancel: &CancellationToken,
    ) -> Result<TrainingReport, ModelError> {
        let first = windows.first().ok_or(ModelError::NoTrainingData)?;
        let shape = first.input.dim();
        let width = shape.0 * shape.1;

        let mut x = Array2::<f64>::zeros((windows.len(), width));
        let mut y = Array1::<f64>::zeros(windows.len());
        for (r, window) in windows.iter().enumerate() {
            if window.input.dim() != shape {
                return Err(ModelError::InputShape {
                    expected: shape,
                    got: window.input.dim(),
                });
            }
            for (c, v) in window.input.iter().enumerate() {
                x[[r, c]] = *v;
            }
            y[r] = window.target;
        }

        let x_mean = x.mean_axis(Axis(0)).ok_or(ModelError::NoTrainingData)?;
        let y_mean = y.mean().ok_or(ModelError::NoTrainingData)?;
        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let mut gram = xc.t().dot(&xc);
        for i in 0..width {
            gram[[i, i]] += self.ridge;
        }
        let l = cholesky(gram.view()).ok_or(ModelError::Singular)?;
        let beta = cholesky_solve(&l, xc.t().dot(&yc).view());
        let intercept = y_mean - x_mean.dot(&beta);

        let residuals = x.dot(&beta) + intercept - &y;
        let train_loss = residuals.mapv(|r| r * r).mean().unwrap_or(f64::NAN);
        if !train_loss.is_finite() {
            return Err(ModelError::TrainingDiverged {
                epoch: 0,
                loss: train_loss,
            });
        }
        debug!(train_loss, features = width, "ridge fit");

        self.coefficients = Some(beta);
        self.intercept = intercept;
        self.input_shape = Some(shape);

        Ok(TrainingReport {
            epochs_run: 1,
            best_epoch: Some(0),
            best_loss: train_loss,
            history: vec![EpochLoss {
                epoch: 0,
                train_loss,
                validation_loss: None,
            }],
            stop_reason: StopReason::Completed,
        })
    }

    fn predict(&mut self, input: ArrayView2<'_, f64>) -> Result<f64, ModelError> {
        let beta = self.coefficients.as_ref().ok_or(ModelError::NotTrained)?;
        let expected = self.input_shape.ok_or(ModelError::NotTrained)?;
        if input.dim() != expected {
            return Err(ModelError::InputShape {
                expected,
                got: input.dim(),
            });
        }
        let prediction = input
            .iter()
            .zip(beta.iter())
            .map(|(x, b)| x * b)
            .sum::<f64>()
            + self.intercept;
        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(ModelError::NonFinitePrediction)
        }
    }

    fn reset_state(&mut self) {}

    fn is_trained(&self) -> bool {
        self.coefficients.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn windows(n: usize, target: impl Fn(&Array2<f64>) -> f64) -> Vec<Window> {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let series: Vec<f64> = (0..n + 3)
            .map(|i| (i as f64 * 0.7).sin() + 0.3 * (i as f64 * 1.3).cos())
            .collect();
        (0..n)
            .map(|i| {
                let input = Array2::from_shape_fn((3, 1), |(t, _)| series[i + t]);
                Window {
                    target: target(&input),
                    input,
                    target_index: i + 3,
                    target_timestamp: ts,
                }
            })
            .collect()
    }

    #[test]
    fn test_recovers_linear_relation() {
        let data = windows(50, |x| 2.0 * x[[2, 0]] + 1.0);
        let mut model = LinearForecaster::new(1e-9);
        let report = model.train(&data, &CancellationToken::new()).unwrap();
        assert!(report.best_loss < 1e-10);

        let beta = model.coefficients().unwrap();
        assert!((beta[2] - 2.0).abs() < 1e-4);
        assert!((model.intercept() - 1.0).abs() < 1e-4);

        let pred = model.predict(data[7].input.view()).unwrap();
        assert!((pred - data[7].target).abs() < 1e-6);
    }

    #[test]
    fn test_constant_inputs_are_singular_without_ridge() {
        let mut data = windows(10, |_| 1.0);
        for w in &mut data {
            w.input.fill(0.5);
        }
        let mut model = LinearForecaster::new(0.0);
        assert_eq!(
            model.train(&data, &CancellationToken::new()).unwrap_err(),
            ModelError::Singular
        );

        // Any positive ridge makes the system solvable.
        let mut ridge = LinearForecaster::new(0.1);
        ridge.train(&data, &CancellationToken::new()).unwrap();
        assert!((ridge.predict(data[0].input.view()).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_predict_before_train() {
        let data = windows(5, |_| 0.0);
        let mut model = LinearForecaster::new(1.0);
        assert_eq!(
            model.predict(data[0].input.view()).unwrap_err(),
            ModelError::NotTrained
        );
    }
}
