//! In-memory time series and the boundary to external data storage.
//!
//! The evaluator never reads storage directly: a [`DataSource`] resolves a
//! named series for a window into a [`TimeSeries`] before evaluation starts.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AlarmError, Result};
use crate::time::TimeInterval;

/// Regular-interval samples for one external identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub identifier: String,
    pub interval: TimeInterval,
    /// Sentinel reported for instants without data. NaN unless the source
    /// has its own convention (e.g. `-999`).
    pub missing: f64,
    samples: BTreeMap<NaiveDateTime, f64>,
}

impl TimeSeries {
    pub fn new(identifier: impl Into<String>, interval: TimeInterval) -> Self {
        Self {
            identifier: identifier.into(),
            interval,
            missing: f64::NAN,
            samples: BTreeMap::new(),
        }
    }

    pub fn with_missing(mut self, missing: f64) -> Self {
        self.missing = missing;
        self
    }

    pub fn insert(&mut self, t: NaiveDateTime, value: f64) {
        self.samples.insert(t, value);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_sample(mut self, t: NaiveDateTime, value: f64) -> Self {
        self.insert(t, value);
        self
    }

    /// Sample at `t`, or the missing sentinel.
    pub fn value_at(&self, t: NaiveDateTime) -> f64 {
        self.samples.get(&t).copied().unwrap_or(self.missing)
    }

    /// NaN is always missing; otherwise compare against the sentinel.
    pub fn is_missing(&self, value: f64) -> bool {
        is_missing_value(value, self.missing)
    }

    /// Copy of the samples inside `[start, end]`.
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> TimeSeries {
        TimeSeries {
            identifier: self.identifier.clone(),
            interval: self.interval,
            missing: self.missing,
            samples: self
                .samples
                .range(start..=end)
                .map(|(t, v)| (*t, *v))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Whether `value` counts as missing given a sentinel.
pub fn is_missing_value(value: f64, sentinel: f64) -> bool {
    value.is_nan() || value == sentinel
}

/// Resolves external identifiers into in-memory series.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Read `identifier` for the inclusive window `[start, end]`.
    async fn resolve(
        &self,
        identifier: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TimeSeries>;

    /// All identifiers currently known to the source.
    async fn identifiers(&self) -> Result<Vec<String>>;
}

// ── In-memory source ────────────────────────────────────────────────

/// Source backed by a map of fully loaded series.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    series: HashMap<String, TimeSeries>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: TimeSeries) {
        self.series.insert(series.identifier.clone(), series);
    }

    pub fn with(mut self, series: TimeSeries) -> Self {
        self.insert(series);
        self
    }
}

#[async_trait::async_trait]
impl DataSource for MemorySource {
    async fn resolve(
        &self,
        identifier: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TimeSeries> {
        self.series
            .get(identifier)
            .map(|s| s.window(start, end))
            .ok_or_else(|| AlarmError::DataSource {
                identifier: identifier.to_string(),
                message: "unknown identifier".to_string(),
            })
    }

    async fn identifiers(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.series.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ── JSON directory source ───────────────────────────────────────────

/// On-disk layout of one series file.
#[derive(Debug, Serialize, Deserialize)]
struct SeriesFile {
    interval: String,
    #[serde(default)]
    missing: Option<f64>,
    /// `[timestamp, value]` pairs; `null` values are stored as missing.
    samples: Vec<(NaiveDateTime, Option<f64>)>,
}

/// Source reading `<dir>/<identifier>.json` files.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, identifier: &str) -> Result<PathBuf> {
        if identifier.is_empty() || identifier.contains(|c: char| c == '/' || c == '\\') || identifier.starts_with('.') {
            return Err(AlarmError::DataSource {
                identifier: identifier.to_string(),
                message: "identifier is not a valid file name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{identifier}.json")))
    }
}

#[async_trait::async_trait]
impl DataSource for JsonDirSource {
    async fn resolve(
        &self,
        identifier: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TimeSeries> {
        let path = self.path_for(identifier)?;
        let contents = tokio::fs::read_to_string(&path).await?;
        let file: SeriesFile = serde_json::from_str(&contents).map_err(|e| AlarmError::DataSource {
            identifier: identifier.to_string(),
            message: e.to_string(),
        })?;

        let interval: TimeInterval = file.interval.parse()?;
        let mut series = TimeSeries::new(identifier, interval);
        if let Some(missing) = file.missing {
            series.missing = missing;
        }
        for (t, value) in file.samples {
            if t >= start && t <= end {
                series.insert(t, value.unwrap_or(series.missing));
            }
        }

        debug!(identifier, path = %path.display(), samples = series.len(), "resolved series");
        Ok(series)
    }

    async fn identifiers(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
            if !is_json {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
