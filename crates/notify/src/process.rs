//! Delivery by spawning an external command.
//!
//! The notification is written to the child's stdin as JSON; subject and
//! action id are also exported as `TSALARM_SUBJECT` / `TSALARM_ACTION_ID`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::traits::{Delivery, DeliveryError, Notification};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProcessDelivery {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessDelivery {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, DeliveryError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(DeliveryError::Config("process delivery needs a command".to_string()));
        }
        Ok(Self {
            program,
            args,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Delivery for ProcessDelivery {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let payload = serde_json::to_vec(notification).map_err(|e| {
            DeliveryError::Config(format!("failed to serialize notification: {e}"))
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("TSALARM_SUBJECT", &notification.subject)
            .env(
                "TSALARM_ACTION_ID",
                notification.metadata.get("action_id").map(String::as_str).unwrap_or(""),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeliveryError::Process(format!("failed to spawn {}: {e}", self.program)))?;

        // writing the payload and waiting share one deadline; on timeout the
        // child is dropped and killed
        let run = async move {
            let written = match child.stdin.take() {
                Some(mut stdin) => stdin.write_all(&payload).await,
                None => Ok(()),
            };
            let output = child.wait_with_output().await?;
            Ok::<_, std::io::Error>((written, output))
        };

        let (written, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                DeliveryError::Process(format!(
                    "{} did not finish within {:?}",
                    self.program, self.timeout
                ))
            })?
            .map_err(|e| DeliveryError::Process(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::Process(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        written.map_err(|e| {
            DeliveryError::Process(format!("{} did not read the notification: {e}", self.program))
        })?;

        tracing::debug!(program = %self.program, "process delivery finished");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "process"
    }
}
