//! Leveled explanations of a positive evaluation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Snapshot of one expression node's contribution to a positive instant.
///
/// Level 0 is the root of the test's tree; deeper nodes carry higher
/// levels. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositiveResult {
    pub level: u32,
    pub left_value: f64,
    pub right_value: f64,
    pub message: String,
    pub timestamp: NaiveDateTime,
    /// Id of the test whose evaluation produced this result.
    pub test_id: String,
}

/// All results produced by one positive evaluation instant, children
/// first and the root last.
pub type ResultGroup = Vec<PositiveResult>;

/// Timestamp of a group (taken from its first result).
pub fn group_timestamp(group: &[PositiveResult]) -> Option<NaiveDateTime> {
    group.first().map(|r| r.timestamp)
}

/// Id of the test that produced a group.
pub fn group_test_id(group: &[PositiveResult]) -> Option<&str> {
    group.first().map(|r| r.test_id.as_str())
}
