//! Delivery trait definition and shared error types.

use std::collections::HashMap;

/// Errors that can occur during delivery of buffered results.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Process delivery failed: {0}")]
    Process(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject/title.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// `action_id`, `groups`, comma-joined `test_ids` and, when set, `severity`.
    pub metadata: HashMap<String, String>,
}

/// Trait for concrete delivery channels behind an [`Action`](crate::Action).
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver one rendered notification.
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;

    /// Human-readable name for this channel (e.g., "log", "webhook").
    fn channel_name(&self) -> &str;
}

/// Outcome of running a single action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchResult {
    pub action_id: String,
    pub channel: String,
    /// Number of result groups handed to the channel.
    pub groups: usize,
    pub success: bool,
    pub duration_ms: u64,
}
