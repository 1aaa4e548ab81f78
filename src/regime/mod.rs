//! Economic regime classification module.
//!
//! Labels each observation with a discrete economic-cycle regime:
//! - Expansion: indicator above the contraction level, trending up
//! - Slowdown: above the contraction level, flat or trending down
//! - Contraction: below the contraction level
//! - Recovery: trending up shortly after a contraction
//!
//! The rule is pluggable through [`RegimeSource`]; external labels can be
//! supplied with [`LabelSeries`].

pub mod classifier;

pub use classifier::{
    regime_stats, LabelSeries, Regime, RegimeError, RegimeSource, RegimeStats, ThresholdRegimeConfig,
    ThresholdRegimeRule,
};
