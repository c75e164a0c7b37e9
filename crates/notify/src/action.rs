//! [`Action`]: buffers positive result groups forwarded by tests and
//! delivers them on its own schedule.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tsalarm_core::result::{group_test_id, group_timestamp};
use tsalarm_core::{ResultGroup, Schedule, TimeInterval};

use crate::templating::{
    ActionContext, TemplateContext, TemplateRenderer, DEFAULT_BODY_TEMPLATE,
    DEFAULT_SUBJECT_TEMPLATE,
};
use crate::traits::{Delivery, Notification};

/// An action shared by every test that forwards to it.
///
/// Tests may run concurrently, so appends go through the mutex.
pub type SharedAction = Arc<tokio::sync::Mutex<Action>>;

/// Severity label attached to delivered notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Consumer of positive result groups.
pub struct Action {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub schedule: Schedule,
    /// Keep only results with `level <= cutoff`; `None` keeps everything.
    pub result_level_cutoff: Option<u32>,
    /// Groups older than `as_of - retention` are dropped before delivery.
    pub retention: TimeInterval,
    pub severity: Option<Severity>,
    subject_template: String,
    body_template: String,
    delivery: Arc<dyn Delivery>,
    renderer: Arc<TemplateRenderer>,
    buffered: Vec<ResultGroup>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("channel", &self.delivery.channel_name())
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        schedule: Schedule,
        retention: TimeInterval,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            active: true,
            schedule,
            result_level_cutoff: None,
            retention,
            severity: None,
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            delivery,
            renderer: Arc::new(TemplateRenderer::new()),
            buffered: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level_cutoff(mut self, cutoff: Option<u32>) -> Self {
        self.result_level_cutoff = cutoff;
        self
    }

    pub fn with_severity(mut self, severity: Option<Severity>) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Override the subject/body templates; both are syntax-checked.
    pub fn with_templates(
        mut self,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<Self, crate::DeliveryError> {
        if let Some(subject) = subject {
            self.renderer.validate(&subject)?;
            self.subject_template = subject;
        }
        if let Some(body) = body {
            self.renderer.validate(&body)?;
            self.body_template = body;
        }
        Ok(self)
    }

    pub fn into_shared(self) -> SharedAction {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn channel_name(&self) -> &str {
        self.delivery.channel_name()
    }

    /// Buffer the results of `group` that pass the level cutoff.
    ///
    /// Nothing is buffered when the filtered group is empty.
    pub fn add_results(&mut self, group: &[tsalarm_core::PositiveResult]) {
        let filtered: ResultGroup = group
            .iter()
            .filter(|r| self.result_level_cutoff.map_or(true, |cutoff| r.level <= cutoff))
            .cloned()
            .collect();

        if filtered.is_empty() {
            debug!(action_id = %self.id, "all results above level cutoff, nothing buffered");
            return;
        }
        self.buffered.push(filtered);
    }

    /// Drop buffered groups whose first result is older than `as_of - retention`.
    pub fn remove_old_results(&mut self, as_of: NaiveDateTime) {
        let cutoff = self.retention.sub_from(as_of);
        let before = self.buffered.len();
        self.buffered
            .retain(|group| group_timestamp(group).map_or(false, |t| t >= cutoff));
        let dropped = before - self.buffered.len();
        if dropped > 0 {
            debug!(action_id = %self.id, dropped, %cutoff, "dropped expired result groups");
        }
    }

    pub fn buffered_groups(&self) -> &[ResultGroup] {
        &self.buffered
    }

    pub fn is_time_to_run(&self, t: NaiveDateTime) -> bool {
        self.schedule.is_time_to_run(t)
    }

    /// Actions have no positive-run interval of their own.
    pub fn compute_next_run(&mut self, t: NaiveDateTime) -> NaiveDateTime {
        self.schedule.compute_next_run(t, false)
    }

    /// Deliver buffered groups for `test_id` (or all groups when `None`).
    ///
    /// Expired groups are removed first. Delivered groups leave the buffer;
    /// on failure they stay buffered for the next run. Returns `true` when
    /// there was nothing to deliver or delivery succeeded.
    pub async fn run_action(&mut self, as_of: NaiveDateTime, test_id: Option<&str>) -> bool {
        self.remove_old_results(as_of);

        let selected: Vec<usize> = self
            .buffered
            .iter()
            .enumerate()
            .filter(|(_, g)| test_id.map_or(true, |id| group_test_id(g) == Some(id)))
            .map(|(i, _)| i)
            .collect();

        if selected.is_empty() {
            debug!(action_id = %self.id, "no buffered results to deliver");
            return true;
        }

        let groups: Vec<ResultGroup> = selected.iter().map(|&i| self.buffered[i].clone()).collect();
        let notification = match self.render(&groups, as_of) {
            Ok(n) => n,
            Err(e) => {
                warn!(action_id = %self.id, error = %e, "failed to render notification");
                return false;
            }
        };

        match self.delivery.deliver(&notification).await {
            Ok(()) => {
                let mut index = 0;
                self.buffered.retain(|_| {
                    let keep = !selected.contains(&index);
                    index += 1;
                    keep
                });
                info!(
                    action_id = %self.id,
                    channel = self.delivery.channel_name(),
                    groups = groups.len(),
                    "delivered positive results"
                );
                true
            }
            Err(e) => {
                warn!(
                    action_id = %self.id,
                    channel = self.delivery.channel_name(),
                    error = %e,
                    "delivery failed, results stay buffered"
                );
                false
            }
        }
    }

    fn render(
        &self,
        groups: &[ResultGroup],
        now: NaiveDateTime,
    ) -> Result<Notification, crate::DeliveryError> {
        let ctx = TemplateContext::new(
            ActionContext {
                id: self.id.clone(),
                name: self.name.clone(),
                severity: self.severity.map(|s| s.to_string()),
            },
            groups,
            now,
        );

        let mut metadata = HashMap::from([
            ("action_id".to_string(), self.id.clone()),
            ("groups".to_string(), groups.len().to_string()),
        ]);
        if let Some(severity) = self.severity {
            metadata.insert("severity".to_string(), severity.to_string());
        }
        let mut test_ids: Vec<&str> = groups.iter().filter_map(|g| group_test_id(g)).collect();
        test_ids.sort_unstable();
        test_ids.dedup();
        metadata.insert("test_ids".to_string(), test_ids.join(","));

        Ok(Notification {
            subject: self.renderer.render(&self.subject_template, &ctx)?,
            body: self.renderer.render(&self.body_template, &ctx)?,
            metadata,
        })
    }
}
