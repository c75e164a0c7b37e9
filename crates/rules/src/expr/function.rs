//! Leaf nodes: constants and readers of external series.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tsalarm_core::series::is_missing_value;
use tsalarm_core::{DataSource, TimeInterval, TimeSeries};

use super::message::substitute;
use super::operator::flag;
use crate::error::{Result, RuleError};

/// Marker that binds an identifier to every matching external key.
pub const WILDCARD: char = '*';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FunctionKind {
    Constant,
    GetValue,
    Delta,
    IsMissing,
    IsNotMissing,
}

impl FunctionKind {
    /// Number of identifier arguments the kind takes.
    pub fn arity(self) -> usize {
        match self {
            FunctionKind::Constant => 0,
            FunctionKind::GetValue
            | FunctionKind::Delta
            | FunctionKind::IsMissing
            | FunctionKind::IsNotMissing => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FunctionKind::Constant => "Constant",
            FunctionKind::GetValue => "GetValue",
            FunctionKind::Delta => "Delta",
            FunctionKind::IsMissing => "IsMissing",
            FunctionKind::IsNotMissing => "IsNotMissing",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            FunctionKind::Constant => "$VALUE",
            FunctionKind::GetValue => "$TSID[0] value $VALUE at $DATETIME",
            FunctionKind::Delta => "$TSID[0] changed by $VALUE at $DATETIME",
            FunctionKind::IsMissing => "$TSID[0] is missing at $DATETIME",
            FunctionKind::IsNotMissing => "$TSID[0] is not missing at $DATETIME",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionKind {
    type Err = String;

    /// Case-insensitive; `GetValue`, `get_value` and `getvalue` are equal.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase().replace('_', "");
        match name.as_str() {
            "constant" => Ok(FunctionKind::Constant),
            "getvalue" => Ok(FunctionKind::GetValue),
            "delta" => Ok(FunctionKind::Delta),
            "ismissing" => Ok(FunctionKind::IsMissing),
            "isnotmissing" => Ok(FunctionKind::IsNotMissing),
            _ => Err(format!("unknown function: '{}'", s.trim())),
        }
    }
}

impl TryFrom<String> for FunctionKind {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FunctionKind> for String {
    fn from(kind: FunctionKind) -> Self {
        kind.name().to_string()
    }
}

/// A leaf of the expression tree.
///
/// Series are bound per pass by [`set_test_data`](Self::set_test_data);
/// a slot whose resolution failed reads as missing until the next pass.
#[derive(Debug, Clone)]
pub struct Function {
    kind: FunctionKind,
    inputs: Vec<String>,
    constant: f64,
    message: Option<String>,
    missing_value: Option<f64>,
    series: Vec<Option<TimeSeries>>,
    /// Input slots that name external series.
    tsid_positions: Vec<usize>,
    last_result: f64,
}

impl Function {
    pub fn constant(value: f64) -> Self {
        Self {
            kind: FunctionKind::Constant,
            inputs: Vec::new(),
            constant: value,
            message: None,
            missing_value: None,
            series: Vec::new(),
            tsid_positions: Vec::new(),
            last_result: f64::NAN,
        }
    }

    /// Build a series-reading function, checking the argument count.
    pub fn new(kind: FunctionKind, inputs: Vec<String>) -> Result<Self> {
        if kind == FunctionKind::Constant {
            return Err(RuleError::Validation(
                "Constant takes a value, not identifiers".to_string(),
            ));
        }
        if inputs.len() != kind.arity() {
            return Err(RuleError::Validation(format!(
                "{kind} takes {} argument(s), got {}",
                kind.arity(),
                inputs.len()
            )));
        }
        if let Some(empty) = inputs.iter().position(|id| id.trim().is_empty()) {
            return Err(RuleError::Validation(format!(
                "{kind} argument {empty} is empty"
            )));
        }

        let tsid_positions = (0..inputs.len()).collect();
        Ok(Self {
            kind,
            series: vec![None; inputs.len()],
            inputs,
            constant: f64::NAN,
            message: None,
            missing_value: None,
            tsid_positions,
            last_result: f64::NAN,
        })
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Explicit missing sentinel, overriding the bound series' own.
    pub fn with_missing_value(mut self, missing_value: Option<f64>) -> Self {
        self.missing_value = missing_value;
        self
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn tsid_positions(&self) -> &[usize] {
        &self.tsid_positions
    }

    pub fn last_result(&self) -> f64 {
        self.last_result
    }

    /// Resolve every external identifier for `[start, end]`.
    ///
    /// Returns `false` if any identifier failed to resolve or timed out;
    /// those slots read as missing. Other slots are still bound.
    pub async fn set_test_data(
        &mut self,
        source: &dyn DataSource,
        start: NaiveDateTime,
        end: NaiveDateTime,
        timeout: Duration,
    ) -> bool {
        let mut all_resolved = true;

        for &pos in &self.tsid_positions {
            let identifier = self.inputs[pos].as_str();
            let resolved = tokio::time::timeout(timeout, source.resolve(identifier, start, end)).await;

            self.series[pos] = match resolved {
                Ok(Ok(series)) => {
                    debug!(identifier, samples = series.len(), "bound series");
                    Some(series)
                }
                Ok(Err(e)) => {
                    warn!(identifier, error = %e, "data resolution failed, reading as missing");
                    all_resolved = false;
                    None
                }
                Err(_) => {
                    warn!(
                        identifier,
                        timeout_ms = timeout.as_millis() as u64,
                        "data resolution timed out, reading as missing"
                    );
                    all_resolved = false;
                    None
                }
            };
        }

        all_resolved
    }

    /// Bind a series to an input slot directly.
    pub fn bind_series(&mut self, position: usize, series: Option<TimeSeries>) {
        if let Some(slot) = self.series.get_mut(position) {
            *slot = series;
        }
    }

    /// Sampling intervals of the currently bound series.
    pub fn bound_intervals(&self) -> impl Iterator<Item = TimeInterval> + '_ {
        self.series.iter().flatten().map(|s| s.interval)
    }

    pub fn evaluate(&mut self, t: NaiveDateTime) -> f64 {
        let value = match self.kind {
            FunctionKind::Constant => self.constant,
            FunctionKind::GetValue => self.sample(0, t),
            FunctionKind::Delta => self.delta(t),
            FunctionKind::IsMissing => flag(self.is_missing_at(0, t)),
            FunctionKind::IsNotMissing => flag(!self.is_missing_at(0, t)),
        };
        self.last_result = value;
        value
    }

    /// Sentinel for slot `pos`: the override, else the series' own, else NaN.
    fn sentinel(&self, pos: usize) -> f64 {
        self.missing_value.unwrap_or_else(|| {
            self.series
                .get(pos)
                .and_then(Option::as_ref)
                .map_or(f64::NAN, |s| s.missing)
        })
    }

    fn sample(&self, pos: usize, t: NaiveDateTime) -> f64 {
        match self.series.get(pos).and_then(Option::as_ref) {
            Some(series) => series.value_at(t),
            None => self.sentinel(pos),
        }
    }

    fn is_missing_at(&self, pos: usize, t: NaiveDateTime) -> bool {
        is_missing_value(self.sample(pos, t), self.sentinel(pos))
    }

    /// `sample(t + interval) - sample(t)`; missing if either side is.
    fn delta(&self, t: NaiveDateTime) -> f64 {
        let Some(series) = self.series.first().and_then(Option::as_ref) else {
            return self.sentinel(0);
        };
        let next = series.interval.add_to(t, 1);
        if self.is_missing_at(0, t) || self.is_missing_at(0, next) {
            return self.sentinel(0);
        }
        series.value_at(next) - series.value_at(t)
    }

    pub fn build_positive_result_message(&self, t: NaiveDateTime) -> String {
        let template = self
            .message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message());
        let tsids: Vec<&str> = self.inputs.iter().map(String::as_str).collect();
        substitute(template, t, self.last_result, &tsids)
    }

    /// Input slots whose identifier carries the wildcard marker.
    pub fn wildcard_positions(&self) -> Vec<usize> {
        self.tsid_positions
            .iter()
            .copied()
            .filter(|&pos| self.inputs[pos].contains(WILDCARD))
            .collect()
    }

    /// Replace the wildcard marker in every wildcard slot with `capture`.
    pub fn set_wildcards(&mut self, capture: &str) {
        for pos in self.wildcard_positions() {
            self.inputs[pos] = self.inputs[pos].replacen(WILDCARD, capture, 1);
            self.series[pos] = None;
        }
    }
}
