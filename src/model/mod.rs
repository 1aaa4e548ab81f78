//! Forecast models.
//!
//! Variants implement [`ForecastModel`] and are selected by [`ModelKind`] at
//! construction through [`build_model`].

pub mod cancel;
pub mod config;
pub mod ensemble;
pub mod linear;
pub mod lstm;
mod optim;
pub mod traits;

pub use cancel::CancellationToken;
pub use config::{ModelConfig, ModelKind};
pub use ensemble::EnsembleForecaster;
pub use linear::LinearForecaster;
pub use lstm::{LstmForecaster, RecurrentState};
pub use traits::{evaluate_mse, EpochLoss, ForecastModel, ModelError, StopReason, TrainingReport};

/// Build a fresh, untrained model for `config`.
///
/// Ensemble members get consecutive seeds starting at `config.seed`.
pub fn build_model(config: &ModelConfig) -> Result<Box<dyn ForecastModel>, ModelError> {
    config.validate()?;
    Ok(build_kind(config, &config.kind))
}

fn build_kind(config: &ModelConfig, kind: &ModelKind) -> Box<dyn ForecastModel> {
    match kind {
        ModelKind::Lstm => Box::new(LstmForecaster::new(config.clone().with_kind(ModelKind::Lstm))),
        ModelKind::Linear { ridge } => Box::new(LinearForecaster::new(*ridge)),
        ModelKind::Ensemble { members } => Box::new(EnsembleForecaster::new(
            members
                .iter()
                .enumerate()
                .map(|(i, member)| {
                    let seeded = config.clone().with_seed(config.seed.wrapping_add(i as u64));
                    build_kind(&seeded, member)
                })
                .collect(),
        )),
    }
}
