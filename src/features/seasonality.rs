//! Calendar features. Pure functions of the timestamp.

use std::f64::consts::TAU;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::data::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalEncoding {
    /// sin/cos pair on the unit circle; December sits next to January.
    #[default]
    Cyclic,
    /// Single value in `[0, 1]`.
    Ordinal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalityConfig {
    pub month: bool,
    pub day_of_week: bool,
    pub encoding: SeasonalEncoding,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            month: true,
            day_of_week: true,
            encoding: SeasonalEncoding::Cyclic,
        }
    }
}

impl SeasonalityConfig {
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (enabled, base) in [(self.month, "month"), (self.day_of_week, "dow")] {
            if !enabled {
                continue;
            }
            match self.encoding {
                SeasonalEncoding::Cyclic => {
                    names.push(format!("{base}_sin"));
                    names.push(format!("{base}_cos"));
                }
                SeasonalEncoding::Ordinal => names.push(base.to_string()),
            }
        }
        names
    }

    /// Encoded features for one timestamp, in `column_names` order.
    pub fn encode(&self, ts: Timestamp) -> Vec<f64> {
        let mut out = Vec::with_capacity(4);
        if self.month {
            push_encoded(&mut out, self.encoding, ts.month0() as f64, 12.0);
        }
        if self.day_of_week {
            push_encoded(
                &mut out,
                self.encoding,
                ts.weekday().num_days_from_monday() as f64,
                7.0,
            );
        }
        out
    }
}

fn push_encoded(out: &mut Vec<f64>, encoding: SeasonalEncoding, position: f64, period: f64) {
    match encoding {
        SeasonalEncoding::Cyclic => {
            let angle = TAU * position / period;
            out.push(angle.sin());
            out.push(angle.cos());
        }
        SeasonalEncoding::Ordinal => out.push(position / (period - 1.0)),
    }
}
