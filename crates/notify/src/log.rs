//! Delivery into the process log.

use crate::traits::{Delivery, DeliveryError, Notification};

/// Writes each notification as a `tracing` event at `warn` level.
///
/// Always succeeds. Useful as a default channel and for dry runs.
#[derive(Debug, Default)]
pub struct LogDelivery;

impl LogDelivery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Delivery for LogDelivery {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::warn!(
            action_id = notification.metadata.get("action_id").map(String::as_str).unwrap_or(""),
            subject = %notification.subject,
            "{}",
            notification.body
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
