//! Core data types for the forecasting pipeline.
//!
//! Raw series arrive from the acquisition layer as `(timestamp, value)` pairs.
//! The aligner turns them into a [`Dataset`]: one row per timestamp, strictly
//! increasing, with a fixed column schema.

use std::ops::Range;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp type used throughout the crate.
pub type Timestamp = DateTime<Utc>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Shape mismatch: {rows} rows x {cols} columns for {timestamps} timestamps and {columns} column names")]
    Shape {
        rows: usize,
        cols: usize,
        timestamps: usize,
        columns: usize,
    },

    #[error("Timestamps not strictly increasing at {at}")]
    NotIncreasing { at: Timestamp },

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`2024-01-02T15:30:00Z`), naive date-times
/// (`2024-01-02T15:30:00`, interpreted as UTC) and plain dates (`2024-01-02`,
/// midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, DataError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(DataError::InvalidTimestamp(raw.to_string()))
}

/// A named raw series at its native frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    /// Series name; becomes the column name after alignment.
    pub name: String,
    /// Observations, not necessarily sorted.
    pub points: Vec<(Timestamp, f64)>,
}

impl RawSeries {
    pub fn new(name: impl Into<String>, points: Vec<(Timestamp, f64)>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Build a series from ISO-8601 timestamp strings.
    pub fn from_iso8601(name: impl Into<String>, points: &[(&str, f64)]) -> Result<Self, DataError> {
        let parsed = points
            .iter()
            .map(|(ts, v)| parse_timestamp(ts).map(|ts| (ts, *v)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, parsed))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One row of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: Timestamp,
    pub values: Vec<f64>,
}

/// Ordered, timestamp-indexed feature matrix.
///
/// Invariants enforced at construction: one row per timestamp, timestamps
/// strictly increasing, unique column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    timestamps: Vec<Timestamp>,
    values: Array2<f64>,
}

impl Dataset {
    pub fn new(
        columns: Vec<String>,
        timestamps: Vec<Timestamp>,
        values: Array2<f64>,
    ) -> Result<Self, DataError> {
        let (rows, cols) = values.dim();
        if rows != timestamps.len() || cols != columns.len() {
            return Err(DataError::Shape {
                rows,
                cols,
                timestamps: timestamps.len(),
                columns: columns.len(),
            });
        }
        for pair in timestamps.windows(2) {
            if pair[1] <= pair[0] {
                return Err(DataError::NotIncreasing { at: pair[1] });
            }
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            columns,
            timestamps,
            values,
        })
    }

    /// Build a dataset from observations; each must have one value per column.
    pub fn from_observations(
        columns: Vec<String>,
        observations: &[Observation],
    ) -> Result<Self, DataError> {
        let cols = columns.len();
        let mut values = Array2::zeros((observations.len(), cols));
        for (i, obs) in observations.iter().enumerate() {
            if obs.values.len() != cols {
                return Err(DataError::Shape {
                    rows: observations.len(),
                    cols: obs.values.len(),
                    timestamps: observations.len(),
                    columns: cols,
                });
            }
            for (j, v) in obs.values.iter().enumerate() {
                values[[i, j]] = *v;
            }
        }
        let timestamps = observations.iter().map(|o| o.timestamp).collect();
        Self::new(columns, timestamps, values)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn timestamp(&self, row: usize) -> Option<Timestamp> {
        self.timestamps.get(row).copied()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get([row, col]).copied()
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }

    pub fn column(&self, col: usize) -> ArrayView1<'_, f64> {
        self.values.column(col)
    }

    pub fn observation(&self, row: usize) -> Option<Observation> {
        let timestamp = self.timestamp(row)?;
        Some(Observation {
            timestamp,
            values: self.values.row(row).to_vec(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        self.timestamps
            .iter()
            .zip(self.values.axis_iter(Axis(0)))
            .map(|(ts, row)| Observation {
                timestamp: *ts,
                values: row.to_vec(),
            })
    }

    /// Copy of the rows in `range` (clamped to the dataset length).
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            columns: self.columns.clone(),
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values.slice(s![start..end, ..]).to_owned(),
        }
    }

    /// Same rows, new values matrix and schema. Used by feature derivation and scaling.
    pub fn with_values(&self, columns: Vec<String>, values: Array2<f64>) -> Result<Self, DataError> {
        Self::new(columns, self.timestamps.clone(), values)
    }
}
