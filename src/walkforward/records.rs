//! Forecast records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Timestamp;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Forecast for {got} is not after the last recorded timestamp {last}")]
    OutOfOrder { last: Timestamp, got: Timestamp },

    #[error("Forecast for {0} already has a realized value")]
    AlreadyRealized(Timestamp),

    #[error("No forecast recorded for {0}")]
    UnknownTimestamp(Timestamp),
}

/// One forecast in original (unscaled) units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// Timestamp being forecast.
    pub timestamp: Timestamp,
    pub predicted: f64,
    /// Observed value, once known.
    pub realized: Option<f64>,
    /// Last observed value before `timestamp`; the basis for direction.
    pub previous: Option<f64>,
    /// Fold that produced the forecast; `None` for forward forecasts.
    pub fold: Option<usize>,
}

impl ForecastRecord {
    /// `predicted - realized`, if realized.
    pub fn error(&self) -> Option<f64> {
        self.realized.map(|r| self.predicted - r)
    }

    pub fn is_realized(&self) -> bool {
        self.realized.is_some()
    }
}

/// Append-only, chronologically ordered forecast store.
///
/// Records can be appended and realized once; nothing else mutates them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastLog {
    records: Vec<ForecastRecord>,
}

impl ForecastLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ForecastRecord) -> Result<(), RecordError> {
        if let Some(last) = self.records.last() {
            if record.timestamp <= last.timestamp {
                return Err(RecordError::OutOfOrder {
                    last: last.timestamp,
                    got: record.timestamp,
                });
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// Append every record of `other`, which must start after this log ends.
    pub fn extend(&mut self, other: ForecastLog) -> Result<(), RecordError> {
        other.records.into_iter().try_for_each(|r| self.push(r))
    }

    /// Record the realized value for `timestamp`. Each record is realized at most once.
    pub fn realize(&mut self, timestamp: Timestamp, value: f64) -> Result<(), RecordError> {
        let idx = self
            .records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .map_err(|_| RecordError::UnknownTimestamp(timestamp))?;
        let record = &mut self.records[idx];
        if record.realized.is_some() {
            return Err(RecordError::AlreadyRealized(timestamp));
        }
        record.realized = Some(value);
        Ok(())
    }

    pub fn records(&self) -> &[ForecastRecord] {
        &self.records
    }

    pub fn get(&self, timestamp: Timestamp) -> Option<&ForecastRecord> {
        self.records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ForecastRecord> {
        self.records.iter()
    }

    /// `(timestamp, predicted, realized)` rows for reporting.
    pub fn rows(&self) -> Vec<(Timestamp, f64, Option<f64>)> {
        self.records
            .iter()
            .map(|r| (r.timestamp, r.predicted, r.realized))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ForecastLog {
    type Item = &'a ForecastRecord;
    type IntoIter = std::slice::Iter<'a, ForecastRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
