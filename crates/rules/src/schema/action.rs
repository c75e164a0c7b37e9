//! Action document: buffering, retention and delivery of results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tsalarm_notify::Severity;

use super::metadata::default_true;
use super::{CommonMetadata, ScheduleSpec};

/// A `kind: Action` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActionRule {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    /// Inactive actions keep buffering but never deliver.
    #[serde(default = "default_true")]
    pub active: bool,
    pub schedule: ScheduleSpec,
    /// Deepest result level included in notifications.
    #[serde(default)]
    pub result_level_cutoff: Option<u32>,
    /// Buffered groups older than this are dropped before each run.
    pub retention: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub subject_template: Option<String>,
    #[serde(default)]
    pub body_template: Option<String>,
    pub delivery: DeliverySpec,
}

/// Delivery channel, selected by the `channel` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum DeliverySpec {
    Log,
    Webhook {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
    },
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl DeliverySpec {
    pub fn channel(&self) -> &'static str {
        match self {
            DeliverySpec::Log => "log",
            DeliverySpec::Webhook { .. } => "webhook",
            DeliverySpec::Process { .. } => "process",
        }
    }
}
