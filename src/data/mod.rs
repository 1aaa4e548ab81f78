//! Data model and multi-source alignment.

pub mod aligner;
pub mod types;

pub use aligner::{AlignError, Aligner, AlignerConfig, AlignmentReport, Calendar, FillMethod, SeriesPolicy};
pub use types::{parse_timestamp, DataError, Dataset, Observation, RawSeries, Timestamp};
