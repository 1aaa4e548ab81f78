//! Equal-weight ensemble of forecast models.

use ndarray::ArrayView2;

use crate::window::Window;

use super::cancel::CancellationToken;
use super::traits::{ForecastModel, ModelError, StopReason, TrainingReport};

pub struct EnsembleForecaster {
    members: Vec<Box<dyn ForecastModel>>,
    reports: Vec<TrainingReport>,
}

impl EnsembleForecaster {
    pub fn new(members: Vec<Box<dyn ForecastModel>>) -> Self {
        Self {
            members,
            reports: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Reports from the last training run, in member order.
    pub fn member_reports(&self) -> &[TrainingReport] {
        &self.reports
    }
}

impl ForecastModel for EnsembleForecaster {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn train(
        &mut self,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<TrainingReport, ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::InvalidConfig("ensemble has no members".into()));
        }
        let reports = self
            .members
            .iter_mut()
            .map(|m| m.train(windows, cancel))
            .collect::<Result<Vec<_>, _>>()?;

        let stop_reason = if reports.iter().any(|r| r.stop_reason == StopReason::Cancelled) {
            StopReason::Cancelled
        } else {
            StopReason::Completed
        };
        let summary = TrainingReport {
            epochs_run: reports.iter().map(|r| r.epochs_run).max().unwrap_or(0),
            best_epoch: None,
            best_loss: reports.iter().map(|r| r.best_loss).sum::<f64>() / reports.len() as f64,
            history: Vec::new(),
            stop_reason,
        };
        self.reports = reports;
        Ok(summary)
    }

    fn predict(&mut self, input: ArrayView2<'_, f64>) -> Result<f64, ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::NotTrained);
        }
        let mut total = 0.0;
        for member in &mut self.members {
            total += member.predict(input)?;
        }
        Ok(total / self.members.len() as f64)
    }

    fn reset_state(&mut self) {
        for member in &mut self.members {
            member.reset_state();
        }
    }

    fn is_trained(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.is_trained())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearForecaster;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn windows() -> Vec<Window> {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..20)
            .map(|i| {
                let input = Array2::from_shape_fn((2, 1), |(t, _)| ((i + t) as f64).sin());
                Window {
                    target: ((i + 2) as f64).sin(),
                    input,
                    target_index: i + 2,
                    target_timestamp: ts,
                }
            })
            .collect()
    }

    #[test]
    fn test_mean_of_members() {
        let data = windows();
        let mut low = LinearForecaster::new(0.01);
        let mut high = LinearForecaster::new(10.0);
        let token = CancellationToken::new();
        low.train(&data, &token).unwrap();
        high.train(&data, &token).unwrap();
        let input = data[4].input.view();
        let expected = (low.predict(input).unwrap() + high.predict(input).unwrap()) / 2.0;

        let mut ensemble = EnsembleForecaster::new(vec![
            Box::new(LinearForecaster::new(0.01)),
            Box::new(LinearForecaster::new(10.0)),
        ]);
        assert!(!ensemble.is_trained());
        ensemble.train(&data, &token).unwrap();
        assert!(ensemble.is_trained());
        assert_eq!(ensemble.member_reports().len(), 2);
        assert!((ensemble.predict(input).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_ensemble() {
        let mut ensemble = EnsembleForecaster::new(Vec::new());
        assert!(ensemble.train(&windows(), &CancellationToken::new()).is_err());
    }
}
