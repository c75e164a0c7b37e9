//! Drives tests and actions on a clock.
//!
//! Each [`Engine::tick`] runs the tests that are in season and due, then
//! delivers the buffered results of the actions that are due. A failing
//! test or action never stops the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use tsalarm_core::{DataSource, TimeInterval};
use tsalarm_notify::{DispatchResult, Dispatcher};

use crate::builder::RuleSet;
use crate::error::RuleError;
use crate::test::Test;
use crate::wildcard::expand_all;

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tests_run: usize,
    pub out_of_season: usize,
    /// Tests whose pass forwarded at least one group.
    pub positive: usize,
    pub groups_forwarded: usize,
    /// `(test_id, error)` for passes that failed.
    pub failures: Vec<(String, String)>,
    pub deliveries: Vec<DispatchResult>,
    /// The tick stopped early because the cancel flag was raised.
    pub cancelled: bool,
}

pub struct Engine {
    tests: Vec<Test>,
    dispatcher: Dispatcher,
    source: Arc<dyn DataSource>,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        tests: Vec<Test>,
        dispatcher: Dispatcher,
        source: Arc<dyn DataSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            tests,
            dispatcher,
            source,
            timeout,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build from a freshly built rule set, expanding wildcard tests
    /// against the source's current identifiers.
    pub async fn from_rule_set(set: RuleSet, source: Arc<dyn DataSource>, timeout: Duration) -> Self {
        let tests = expand_all(set.tests, source.as_ref()).await;
        info!(tests = tests.len(), actions = set.actions.len(), "engine built");
        Self::new(tests, Dispatcher::new(set.actions), source, timeout)
    }

    /// Share an externally owned cancel flag (e.g. one set on Ctrl-C).
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Shortest run or positive-run interval among the tests, by nominal length.
    pub fn finest_interval(&self) -> Option<TimeInterval> {
        self.tests
            .iter()
            .flat_map(|t| std::iter::once(t.schedule.interval).chain(t.schedule.positive_interval))
            .min_by_key(|interval| interval.approx_duration())
    }

    /// Swap in a rebuilt rule set.
    ///
    /// Tests and actions that keep their id keep their next run time, and
    /// surviving actions keep their undelivered groups.
    pub async fn reload(&mut self, set: RuleSet) {
        let mut tests = expand_all(set.tests, self.source.as_ref()).await;
        let previous: HashMap<&str, &Test> = self.tests.iter().map(|t| (t.id.as_str(), t)).collect();
        for test in &mut tests {
            if let Some(old) = previous.get(test.id.as_str()) {
                test.schedule.set_next_run_time(old.schedule.next_run_time());
            }
        }

        for (id, fresh) in &set.actions {
            let Some(old) = self.dispatcher.get(id) else {
                continue;
            };
            if Arc::ptr_eq(old, fresh) {
                continue;
            }
            let old = old.lock().await;
            let mut fresh = fresh.lock().await;
            fresh.schedule.set_next_run_time(old.schedule.next_run_time());
            for group in old.buffered_groups() {
                fresh.add_results(group);
            }
        }

        info!(tests = tests.len(), actions = set.actions.len(), "engine reloaded");
        self.tests = tests;
        self.dispatcher.rebuild(set.actions);
    }

    /// Run everything that is due at `now`.
    pub async fn tick(&mut self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        for test in &mut self.tests {
            if self.cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            if !test.is_in_active_season(now) {
                debug!(test_id = %test.id, %now, "outside active season");
                report.out_of_season += 1;
                continue;
            }
            if !test.is_time_to_run(now) {
                continue;
            }

            report.tests_run += 1;
            match test
                .run_interval(now, self.source.as_ref(), self.timeout, &self.cancel)
                .await
            {
                Ok(forwarded) => {
                    if forwarded > 0 {
                        report.positive += 1;
                        report.groups_forwarded += forwarded;
                    }
                }
                Err(RuleError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(test_id = %test.id, error = %e, "test pass failed");
                    report.failures.push((test.id.clone(), e.to_string()));
                }
            }
            let next = test.compute_next_run(now);
            debug!(test_id = %test.id, %next, "test rescheduled");
        }

        if report.cancelled {
            info!(%now, "tick cancelled");
            return report;
        }

        report.deliveries = self.dispatcher.run_due(now).await;
        info!(
            %now,
            tests_run = report.tests_run,
            positive = report.positive,
            groups = report.groups_forwarded,
            deliveries = report.deliveries.len(),
            failures = report.failures.len(),
            "tick finished"
        );
        report
    }
}
