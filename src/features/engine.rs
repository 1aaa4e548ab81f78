//! Feature engine.
//!
//! Two stages:
//! 1. [`FeatureEngine::derive`] adds return, seasonal and regime columns. It is
//!    stateless and causal (row `i` depends only on rows `0..=i`), so it can run
//!    once over the full history.
//! 2. [`FeatureEngine::fit_scaler`] fits the scaling state on a training slice,
//!    exactly once; [`FeatureEngine::transform`] applies it.

use std::ops::Range;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{DataError, Dataset};
use crate::regime::{Regime, RegimeError, RegimeSource};

use super::scaler::{ScalerKind, ScalerState};
use super::seasonality::SeasonalityConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("Scaler has not been fitted; call fit_scaler before transform")]
    NotFitted,

    #[error("Scaler already fitted; scaling state is immutable")]
    AlreadyFitted,

    #[error("Schema mismatch: expected {expected} columns, got {got}")]
    SchemaMismatch { expected: usize, got: usize },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Training slice is empty")]
    EmptyTrainingSlice,

    #[error("Not enough rows to derive features: {0}")]
    TooShort(usize),

    #[error("Regime features requested but no regime source configured")]
    MissingRegimeSource,

    #[error(transparent)]
    Regime(#[from] RegimeError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// What the model forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Next-step level of the target column.
    Level,
    /// Next-step simple return of the target column.
    #[default]
    Return,
}

/// Role of a derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Continuous,
    Seasonal,
    Regime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Aligned column to forecast.
    pub target: String,
    pub target_kind: TargetKind,
    /// Columns that get an extra simple-return column `<name>_ret`.
    pub return_features: Vec<String>,
    pub seasonality: SeasonalityConfig,
    pub scaler: ScalerKind,
    /// Add one-hot regime columns (requires a regime source).
    pub include_regime: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            target: "price".to_string(),
            target_kind: TargetKind::Return,
            return_features: Vec::new(),
            seasonality: SeasonalityConfig::default(),
            scaler: ScalerKind::MinMax,
            include_regime: false,
        }
    }
}

/// Derived features plus the bookkeeping the window builder and scaler need.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    dataset: Dataset,
    kinds: Vec<FeatureKind>,
    target_index: usize,
    target_kind: TargetKind,
}

impl FeatureSet {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    /// Column index of the forecast target.
    pub fn target_index(&self) -> usize {
        self.target_index
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.dataset.n_features()
    }

    /// Unscaled target value at `row`.
    pub fn target_value(&self, row: usize) -> Option<f64> {
        self.dataset.value(row, self.target_index)
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            dataset: self.dataset.slice(range),
            kinds: self.kinds.clone(),
            target_index: self.target_index,
            target_kind: self.target_kind,
        }
    }

    fn with_dataset(&self, dataset: Dataset) -> Self {
        Self {
            dataset,
            kinds: self.kinds.clone(),
            target_index: self.target_index,
            target_kind: self.target_kind,
        }
    }
}

/// Derives features and owns the per-feature scaling state.
#[derive(Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
    regime: Option<Arc<dyn RegimeSource>>,
    scaler: Option<ScalerState>,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            regime: None,
            scaler: None,
        }
    }

    pub fn with_regime_source(mut self, source: Arc<dyn RegimeSource>) -> Self {
        self.regime = Some(source);
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Same configuration and regime source, no scaling state.
    pub fn unfitted(&self) -> Self {
        Self {
            config: self.config.clone(),
            regime: self.regime.clone(),
            scaler: None,
        }
    }

    /// Add derived columns to an aligned dataset.
    ///
    /// Column order: aligned columns, `<name>_ret` columns, seasonal columns,
    /// regime one-hot columns. When any return column is derived the first
    /// row is dropped.
    pub fn derive(&self, aligned: &Dataset) -> Result<FeatureSet, FeatureError> {
        let target_col = aligned
            .column_index(&self.config.target)
            .ok_or_else(|| FeatureError::UnknownColumn(self.config.target.clone()))?;

        let mut return_sources = Vec::new();
        for name in &self.config.return_features {
            let idx = aligned
                .column_index(name)
                .ok_or_else(|| FeatureError::UnknownColumn(name.clone()))?;
            if !return_sources.contains(&idx) {
                return_sources.push(idx);
            }
        }
        if self.config.target_kind == TargetKind::Return && !return_sources.contains(&target_col) {
            return_sources.push(target_col);
        }

        let skip = usize::from(!return_sources.is_empty());
        if aligned.len() <= skip {
            return Err(FeatureError::TooShort(aligned.len()));
        }

        let regimes = if self.config.include_regime {
            let source = self.regime.as_ref().ok_or(FeatureError::MissingRegimeSource)?;
            Some(source.classify(aligned)?)
        } else {
            None
        };

        let mut columns: Vec<String> = aligned.columns().to_vec();
        let mut kinds = vec![FeatureKind::Continuous; columns.len()];
        for &idx in &return_sources {
            columns.push(format!("{}_ret", aligned.columns()[idx]));
            kinds.push(FeatureKind::Continuous);
        }
        for name in self.config.seasonality.column_names() {
            columns.push(name);
            kinds.push(FeatureKind::Seasonal);
        }
        if regimes.is_some() {
            for regime in Regime::ALL {
                columns.push(regime.column_name().to_string());
                kinds.push(FeatureKind::Regime);
            }
        }

        let rows = aligned.len() - skip;
        let raw = aligned.values();
        let mut values = Array2::zeros((rows, columns.len()));
        for r in 0..rows {
            let src = r + skip;
            let mut j = 0;
            for v in raw.row(src) {
                values[[r, j]] = *v;
                j += 1;
            }
            for &idx in &return_sources {
                let prev = raw[[src - 1, idx]];
                values[[r, j]] = if prev.abs() > f64::EPSILON {
                    raw[[src, idx]] / prev - 1.0
                } else {
                    0.0
                };
                j += 1;
            }
            for v in self.config.seasonality.encode(aligned.timestamps()[src]) {
                values[[r, j]] = v;
                j += 1;
            }
            if let Some(labels) = &regimes {
                for v in labels[src].one_hot() {
                    values[[r, j]] = v;
                    j += 1;
                }
            }
        }

        let target_index = match self.config.target_kind {
            TargetKind::Level => target_col,
            TargetKind::Return => {
                let name = format!("{}_ret", self.config.target);
                columns
                    .iter()
                    .position(|c| *c == name)
                    .ok_or(FeatureError::UnknownColumn(name))?
            }
        };

        let timestamps = aligned.timestamps()[skip..].to_vec();
        let dataset = Dataset::new(columns, timestamps, values)?;
        Ok(FeatureSet {
            dataset,
            kinds,
            target_index,
            target_kind: self.config.target_kind,
        })
    }

    /// Fit the scaling state on a training slice. Must be called exactly once.
    pub fn fit_scaler(&mut self, train: &FeatureSet) -> Result<&ScalerState, FeatureError> {
        if self.scaler.is_some() {
            return Err(FeatureError::AlreadyFitted);
        }
        let passthrough: Vec<bool> = train
            .kinds
            .iter()
            .map(|k| *k != FeatureKind::Continuous)
            .collect();
        let state = ScalerState::fit(&train.dataset, self.config.scaler, &passthrough)?;
        Ok(&*self.scaler.insert(state))
    }

    pub fn scaler(&self) -> Option<&ScalerState> {
        self.scaler.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn transform(&self, features: &FeatureSet) -> Result<FeatureSet, FeatureError> {
        let scaler = self.scaler.as_ref().ok_or(FeatureError::NotFitted)?;
        Ok(features.with_dataset(scaler.transform(&features.dataset)?))
    }

    pub fn inverse_transform(&self, features: &FeatureSet) -> Result<FeatureSet, FeatureError> {
        let scaler = self.scaler.as_ref().ok_or(FeatureError::NotFitted)?;
        Ok(features.with_dataset(scaler.inverse_transform(&features.dataset)?))
    }

    /// Map one scaled value of column `col` back to its original units.
    pub fn inverse_value(&self, col: usize, scaled: f64) -> Result<f64, FeatureError> {
        let scaler = self.scaler.as_ref().ok_or(FeatureError::NotFitted)?;
        let scale = scaler.scale(col).ok_or(FeatureError::SchemaMismatch {
            expected: scaler.columns().len(),
            got: col + 1,
        })?;
        Ok(scale.inverse(scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::seasonality::SeasonalEncoding;
    use crate::regime::{ThresholdRegimeConfig, ThresholdRegimeRule};
    use chrono::{Duration, TimeZone, Utc};
    use ndarray::array;

    fn aligned() -> Dataset {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..4).map(|i| start + Duration::days(i)).collect();
        Dataset::new(
            vec!["price".into(), "activity".into()],
            ts,
            array![[100.0, 52.0], [110.0, 53.0], [99.0, 49.0], [99.0, 51.0]],
        )
        .unwrap()
    }

    fn plain_config(kind: TargetKind) -> FeatureConfig {
        FeatureConfig {
            target_kind: kind,
            seasonality: SeasonalityConfig {
                month: false,
                day_of_week: false,
                encoding: SeasonalEncoding::Cyclic,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_derive_return_target() {
        let engine = FeatureEngine::new(plain_config(TargetKind::Return));
        let features = engine.derive(&aligned()).unwrap();

        assert_eq!(features.len(), 3);
        assert_eq!(
            features.dataset().columns(),
            &["price".to_string(), "activity".into(), "price_ret".into()]
        );
        assert_eq!(features.target_index(), 2);
        let ret = features.dataset().column(2).to_vec();
        assert!((ret[0] - 0.1).abs() < 1e-12);
        assert!((ret[1] - (99.0 / 110.0 - 1.0)).abs() < 1e-12);
        assert_eq!(ret[2], 0.0);
    }

    #[test]
    fn test_derive_level_target_keeps_all_rows() {
        let engine = FeatureEngine::new(plain_config(TargetKind::Level));
        let features = engine.derive(&aligned()).unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features.target_index(), 0);
        assert_eq!(features.target_value(1), Some(110.0));
    }

    #[test]
    fn test_derive_seasonal_and_regime_columns() {
        let config = FeatureConfig {
            target_kind: TargetKind::Level,
            include_regime: true,
            ..Default::default()
        };
        let rule = ThresholdRegimeRule::new(ThresholdRegimeConfig {
            trend_lookback: 1,
            ..Default::default()
        });
        let engine = FeatureEngine::new(config).with_regime_source(Arc::new(rule));
        let features = engine.derive(&aligned()).unwrap();

        assert_eq!(features.n_features(), 2 + 4 + 5);
        assert_eq!(features.kinds()[2], FeatureKind::Seasonal);
        assert_eq!(features.kinds()[10], FeatureKind::Regime);
        let contraction = features.dataset().column_index("regime_contraction").unwrap();
        assert_eq!(features.dataset().value(2, contraction), Some(1.0));
    }

    #[test]
    fn test_regime_requires_source() {
        let config = FeatureConfig {
            include_regime: true,
            ..plain_config(TargetKind::Level)
        };
        let err = FeatureEngine::new(config).derive(&aligned()).unwrap_err();
        assert_eq!(err, FeatureError::MissingRegimeSource);
    }

    #[test]
    fn test_unknown_target() {
        let config = FeatureConfig {
            target: "spx".into(),
            ..plain_config(TargetKind::Level)
        };
        let err = FeatureEngine::new(config).derive(&aligned()).unwrap_err();
        assert_eq!(err, FeatureError::UnknownColumn("spx".into()));
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let engine = FeatureEngine::new(plain_config(TargetKind::Level));
        let features = engine.derive(&aligned()).unwrap();
        assert_eq!(engine.transform(&features).unwrap_err(), FeatureError::NotFitted);
        assert_eq!(engine.inverse_value(0, 0.5).unwrap_err(), FeatureError::NotFitted);
    }

    #[test]
    fn test_fit_scaler_exactly_once() {
        let mut engine = FeatureEngine::new(plain_config(TargetKind::Level));
        let features = engine.derive(&aligned()).unwrap();
        engine.fit_scaler(&features.slice(0..2)).unwrap();
        assert_eq!(
            engine.fit_scaler(&features).unwrap_err(),
            FeatureError::AlreadyFitted
        );
        // Scaler still reflects the first fit.
        assert_eq!(engine.scaler().unwrap().fitted_rows(), 2);
    }

    #[test]
    fn test_transform_round_trip_and_inverse_value() {
        let mut engine = FeatureEngine::new(FeatureConfig {
            target_kind: TargetKind::Level,
            ..Default::default()
        });
        let features = engine.derive(&aligned()).unwrap();
        engine.fit_scaler(&features).unwrap();

        let scaled = engine.transform(&features).unwrap();
        let back = engine.inverse_transform(&scaled).unwrap();
        for (a, b) in features.dataset().values().iter().zip(back.dataset().values().iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        let scaled_target = scaled.target_value(1).unwrap();
        assert_eq!(scaled_target, 1.0);
        assert!((engine.inverse_value(0, scaled_target).unwrap() - 110.0).abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_copy_has_no_state() {
        let mut engine = FeatureEngine::new(plain_config(TargetKind::Level));
        let features = engine.derive(&aligned()).unwrap();
        engine.fit_scaler(&features).unwrap();
        assert!(engine.is_fitted());
        assert!(!engine.unfitted().is_fitted());
    }
}
