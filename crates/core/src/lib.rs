//! Shared building blocks for the tsalarm workspace: configuration, the
//! common error type, calendar primitives, positive-result records and the
//! external time-series boundary.

pub mod config;
pub mod error;
pub mod result;
pub mod series;
pub mod time;

pub use config::Config;
pub use error::{AlarmError, Result};
pub use result::{PositiveResult, ResultGroup};
pub use series::{DataSource, JsonDirSource, MemorySource, TimeSeries};
pub use time::{DateTimePattern, IntervalBase, Schedule, TimeInterval};
