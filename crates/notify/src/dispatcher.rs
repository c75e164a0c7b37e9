//! Runs due actions.
//!
//! The dispatcher holds every loaded action by id and, on each tick,
//! delivers the buffered results of those whose schedule has come due.
//! A failing action does not block the others.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::action::SharedAction;
use crate::traits::DispatchResult;

/// Owns the set of loaded actions, keyed by id.
#[derive(Default)]
pub struct Dispatcher {
    actions: BTreeMap<String, SharedAction>,
}

impl Dispatcher {
    pub fn new(actions: BTreeMap<String, SharedAction>) -> Self {
        Self { actions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_action(&mut self, id: String, action: SharedAction) {
        self.actions.insert(id, action);
    }

    /// Replace all actions (e.g. after hot-reload).
    pub fn rebuild(&mut self, actions: BTreeMap<String, SharedAction>) {
        self.actions = actions;
    }

    pub fn get(&self, id: &str) -> Option<&SharedAction> {
        self.actions.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SharedAction)> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every active action whose schedule is due at `now`, then
    /// advance its schedule. Inactive actions are skipped.
    pub async fn run_due(&self, now: NaiveDateTime) -> Vec<DispatchResult> {
        let mut results = Vec::new();

        for (id, shared) in &self.actions {
            let mut action = shared.lock().await;
            if !action.active || !action.is_time_to_run(now) {
                continue;
            }

            let groups = action.buffered_groups().len();
            let start = std::time::Instant::now();
            let success = action.run_action(now, None).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            let next = action.compute_next_run(now);

            tracing::debug!(action_id = %id, success, %next, "action ran");

            results.push(DispatchResult {
                action_id: id.clone(),
                channel: action.channel_name().to_string(),
                groups,
                success,
                duration_ms,
            });
        }

        results
    }
}
