//! Economic regime classification.
//!
//! Regime labels are a pluggable signal: anything implementing
//! [`RegimeSource`] can label a dataset. Two sources ship with the crate:
//! a causal threshold/trend rule on one indicator column, and an external
//! label series joined as-of.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Dataset, Timestamp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegimeError {
    #[error("Unknown indicator column: {0}")]
    UnknownIndicator(String),
}

/// Economic-cycle regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Indicator above the contraction level and rising.
    Expansion,
    /// Indicator above the contraction level and flat or falling.
    Slowdown,
    /// Indicator below the contraction level.
    Contraction,
    /// Rising again shortly after a contraction.
    Recovery,
    /// Not enough history to classify.
    Unknown,
}

impl Regime {
    /// All regimes in one-hot column order.
    pub const ALL: [Regime; 5] = [
        Regime::Expansion,
        Regime::Slowdown,
        Regime::Contraction,
        Regime::Recovery,
        Regime::Unknown,
    ];

    /// Position in the one-hot encoding.
    pub fn index(&self) -> usize {
        match self {
            Self::Expansion => 0,
            Self::Slowdown => 1,
            Self::Contraction => 2,
            Self::Recovery => 3,
            Self::Unknown => 4,
        }
    }

    /// Feature column name for the one-hot encoding.
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Expansion => "regime_expansion",
            Self::Slowdown => "regime_slowdown",
            Self::Contraction => "regime_contraction",
            Self::Recovery => "regime_recovery",
            Self::Unknown => "regime_unknown",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Expansion => "Growth above trend",
            Self::Slowdown => "Growth decelerating",
            Self::Contraction => "Economic contraction",
            Self::Recovery => "Recovery from contraction",
            Self::Unknown => "Unknown regime",
        }
    }

    /// One-hot vector of length `Regime::ALL.len()`.
    pub fn one_hot(&self) -> [f64; 5] {
        let mut out = [0.0; 5];
        out[self.index()] = 1.0;
        out
    }
}

/// A source of regime labels.
///
/// Implementations must be causal: the label for row `i` may depend only on
/// rows `0..=i`. Feature derivation labels the full history once and relies
/// on this to stay free of lookahead.
pub trait RegimeSource: Send + Sync {
    /// One label per dataset row.
    fn classify(&self, dataset: &Dataset) -> Result<Vec<Regime>, RegimeError>;
}

/// Configuration for the threshold/trend rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdRegimeConfig {
    /// Indicator column (a growth proxy such as an activity index).
    pub indicator: String,
    /// Indicator level below which the economy is in contraction.
    pub contraction_level: f64,
    /// Lookback for the trend (rows).
    pub trend_lookback: usize,
    /// Trend (change over the lookback) above which growth counts as rising.
    pub trend_threshold: f64,
    /// Rows after a contraction during which a rising indicator counts as recovery.
    pub recovery_window: usize,
}

impl Default for ThresholdRegimeConfig {
    fn default() -> Self {
        Self {
            indicator: "activity".to_string(),
            contraction_level: 50.0,
            trend_lookback: 20, // ~1 month of trading days
            trend_threshold: 0.0,
            recovery_window: 60,
        }
    }
}

/// Level/trend rule on one indicator column.
#[derive(Debug, Clone)]
pub struct ThresholdRegimeRule {
    config: ThresholdRegimeConfig,
}

impl ThresholdRegimeRule {
    pub fn new(config: ThresholdRegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholdRegimeConfig {
        &self.config
    }

    fn classify_row(&self, level: f64, trend: Option<f64>, recently_contracted: bool) -> Regime {
        if level < self.config.contraction_level {
            return Regime::Contraction;
        }

        let Some(trend) = trend else {
            return Regime::Unknown;
        };
        let rising = trend > self.config.trend_threshold;

        if rising && recently_contracted {
            Regime::Recovery
        } else if rising {
            Regime::Expansion
        } else {
            Regime::Slowdown
        }
    }
}

impl RegimeSource for ThresholdRegimeRule {
    fn classify(&self, dataset: &Dataset) -> Result<Vec<Regime>, RegimeError> {
        let col = dataset
            .column_index(&self.config.indicator)
            .ok_or_else(|| RegimeError::UnknownIndicator(self.config.indicator.clone()))?;
        let values = dataset.column(col);

        let mut labels = Vec::with_capacity(values.len());
        let mut last_contraction: Option<usize> = None;

        for (i, &level) in values.iter().enumerate() {
            let trend = (self.config.trend_lookback > 0 && i >= self.config.trend_lookback)
                .then(|| level - values[i - self.config.trend_lookback]);
            let recently_contracted = last_contraction
                .map(|at| i - at <= self.config.recovery_window)
                .unwrap_or(false);

            let regime = self.classify_row(level, trend, recently_contracted);
            if regime == Regime::Contraction {
                last_contraction = Some(i);
            }
            labels.push(regime);
        }

        Ok(labels)
    }
}

/// Externally supplied regime labels, joined as-of on timestamp.
#[derive(Debug, Clone, Default)]
pub struct LabelSeries {
    labels: Vec<(Timestamp, Regime)>,
}

impl LabelSeries {
    pub fn new(mut labels: Vec<(Timestamp, Regime)>) -> Self {
        labels.sort_by_key(|(ts, _)| *ts);
        Self { labels }
    }

    /// Latest label at or before `at`.
    pub fn label_at(&self, at: Timestamp) -> Regime {
        let idx = self.labels.partition_point(|(ts, _)| *ts <= at);
        if idx == 0 {
            Regime::Unknown
        } else {
            self.labels[idx - 1].1
        }
    }
}

impl RegimeSource for LabelSeries {
    fn classify(&self, dataset: &Dataset) -> Result<Vec<Regime>, RegimeError> {
        Ok(dataset.timestamps().iter().map(|ts| self.label_at(*ts)).collect())
    }
}

/// Statistics for a regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: Regime,
    pub rows: usize,
    pub pct_of_total: f64,
    /// Number of distinct spells (maximal runs of consecutive rows).
    pub spells: usize,
}

/// Per-regime row counts and spell counts.
pub fn regime_stats(labels: &[Regime]) -> BTreeMap<Regime, RegimeStats> {
    let mut stats: BTreeMap<Regime, RegimeStats> = BTreeMap::new();
    let total = labels.len();

    for (i, regime) in labels.iter().enumerate() {
        let entry = stats.entry(*regime).or_insert_with(|| RegimeStats {
            regime: *regime,
            rows: 0,
            pct_of_total: 0.0,
            spells: 0,
        });
        entry.rows += 1;
        if i == 0 || labels[i - 1] != *regime {
            entry.spells += 1;
        }
    }

    for entry in stats.values_mut() {
        entry.pct_of_total = entry.rows as f64 / total as f64 * 100.0;
    }

    stats
}
