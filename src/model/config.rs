//! Model configuration.

use serde::{Deserialize, Serialize};

use super::traits::ModelError;

/// Model variant, selected at construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    /// Stacked LSTM with a linear head.
    #[default]
    Lstm,
    /// Ridge regression on the flattened window.
    Linear { ridge: f64 },
    /// Mean of the member forecasts.
    Ensemble { members: Vec<ModelKind> },
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lstm => "lstm",
            Self::Linear { .. } => "linear",
            Self::Ensemble { .. } => "ensemble",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub epochs: usize,
    pub batch_size: usize,
    /// Probability of dropping a hidden unit during training.
    pub dropout: f64,
    pub learning_rate: f64,
    pub hidden_size: usize,
    /// Stacked recurrent layers.
    pub num_layers: usize,
    /// Fraction of the most recent training windows held out for early stopping.
    pub validation_split: f64,
    /// Epochs without improvement before stopping. 0 disables early stopping.
    pub patience: usize,
    /// Global gradient-norm clip.
    pub gradient_clip: Option<f64>,
    pub seed: u64,
    /// Carry hidden/cell state across consecutive predict calls.
    pub carry_state: bool,
    /// Shuffle training windows each epoch.
    pub shuffle: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Lstm,
            epochs: 50,
            batch_size: 32,
            dropout: 0.2,
            learning_rate: 0.001,
            hidden_size: 32,
            num_layers: 2,
            validation_split: 0.1,
            patience: 10,
            gradient_clip: Some(1.0),
            seed: 42,
            carry_state: false,
            shuffle: true,
        }
    }
}

impl ModelConfig {
    pub fn with_kind(mut self, kind: ModelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_carry_state(mut self, carry: bool) -> Self {
        self.carry_state = carry;
        self
    }

    /// Small, fast configuration for tests and smoke runs.
    pub fn small() -> Self {
        Self {
            epochs: 5,
            batch_size: 16,
            hidden_size: 8,
            num_layers: 1,
            learning_rate: 0.01,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| Err(ModelError::InvalidConfig(msg));
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return invalid(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".into());
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if let Some(clip) = self.gradient_clip {
            if clip <= 0.0 || clip.is_nan() {
                return invalid(format!("gradient_clip must be positive, got {clip}"));
            }
        }
        self.validate_kind(&self.kind)
    }

    fn validate_kind(&self, kind: &ModelKind) -> Result<(), ModelError> {
        match kind {
            ModelKind::Lstm => {
                if self.hidden_size == 0 || self.num_layers == 0 {
                    return Err(ModelError::InvalidConfig(
                        "hidden_size and num_layers must be positive".into(),
                    ));
                }
                Ok(())
            }
            ModelKind::Linear { ridge } => {
                if *ridge < 0.0 || !ridge.is_finite() {
                    return Err(ModelError::InvalidConfig(format!(
                        "ridge penalty must be non-negative, got {ridge}"
                    )));
                }
                Ok(())
            }
            ModelKind::Ensemble { members } => {
                if members.is_empty() {
                    return Err(ModelError::InvalidConfig("ensemble has no members".into()));
                }
                members.iter().try_for_each(|m| self.validate_kind(m))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
        assert!(ModelConfig::small().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ModelConfig::default().with_dropout(1.0).validate().is_err());
        assert!(ModelConfig::default().with_batch_size(0).validate().is_err());
        assert!(ModelConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(ModelConfig::default()
            .with_kind(ModelKind::Linear { ridge: -1.0 })
            .validate()
            .is_err());
        assert!(ModelConfig::default()
            .with_kind(ModelKind::Ensemble { members: vec![] })
            .validate()
            .is_err());
    }

    #[test]
    fn test_kind_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            model: ModelConfig,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [model]
            epochs = 3
            kind = { type = "ensemble", members = [{ type = "lstm" }, { type = "linear", ridge = 0.5 }] }
            "#,
        )
        .unwrap();
        assert_eq!(parsed.model.epochs, 3);
        assert_eq!(
            parsed.model.kind,
            ModelKind::Ensemble {
                members: vec![ModelKind::Lstm, ModelKind::Linear { ridge: 0.5 }]
            }
        );
        assert_eq!(parsed.model.hidden_size, 32);
    }
}
