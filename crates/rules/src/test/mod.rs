//! [`Test`]: one expression tree with its schedule, season and run loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use tsalarm_core::time::truncate_to;
use tsalarm_core::{DataSource, IntervalBase, ResultGroup, Schedule, TimeInterval};
use tsalarm_notify::SharedAction;

use crate::error::{Result, RuleError};
use crate::expr::{is_truthy, Expression, PositiveContext};
use crate::season::ActiveSeason;

/// A schedulable condition over external series.
///
/// Each pass rebuilds `result_groups` from scratch; surviving groups are
/// forwarded to every linked action.
#[derive(Debug, Clone)]
pub struct Test {
    pub id: String,
    pub name: String,
    root: Expression,
    pub schedule: Schedule,
    /// Lookback scanned by each pass.
    pub evaluation_window: TimeInterval,
    pub season: Option<ActiveSeason>,
    /// Passes with fewer positive instants than this are discarded.
    pub positive_count_threshold: u32,
    /// Replaces the root result's message when set.
    pub message: Option<String>,
    result_groups: Vec<ResultGroup>,
    actions: Vec<SharedAction>,
    was_last_run_positive: bool,
}

impl Test {
    pub fn new(
        id: impl Into<String>,
        root: Expression,
        schedule: Schedule,
        evaluation_window: TimeInterval,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            root,
            schedule,
            evaluation_window,
            season: None,
            positive_count_threshold: 1,
            message: None,
            result_groups: Vec::new(),
            actions: Vec::new(),
            was_last_run_positive: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_season(mut self, season: Option<ActiveSeason>) -> Self {
        self.season = season;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.positive_count_threshold = threshold.max(1);
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_actions(mut self, actions: Vec<SharedAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn root(&self) -> &Expression {
        &self.root
    }

    pub fn actions(&self) -> &[SharedAction] {
        &self.actions
    }

    /// Groups produced by the latest pass.
    pub fn result_groups(&self) -> &[ResultGroup] {
        &self.result_groups
    }

    pub fn was_last_run_positive(&self) -> bool {
        self.was_last_run_positive
    }

    // ── Evaluation ──────────────────────────────────────────────────

    /// Evaluate the tree at `t`; on a positive instant buffer one group.
    pub fn run(&mut self, t: NaiveDateTime) -> bool {
        if !is_truthy(self.root.evaluate(t)) {
            return false;
        }

        let mut group = Vec::new();
        let ctx = PositiveContext {
            test_id: &self.id,
            message: self.message.as_deref(),
        };
        self.root.evaluate_positive_result(ctx, &mut group, t, 0);
        self.result_groups.push(group);
        true
    }

    /// One scheduling pass ending at `anchor`.
    ///
    /// Rebinds every leaf to data for the evaluation window, steps the
    /// tree over each sample instant and forwards the surviving groups.
    /// Returns the number of groups forwarded. A raised `cancel` flag
    /// aborts between steps with [`RuleError::Cancelled`], discarding the
    /// pass.
    pub async fn run_interval(
        &mut self,
        anchor: NaiveDateTime,
        source: &dyn DataSource,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<usize> {
        self.pre_run();

        let mut scan_start = self.evaluation_window.sub_from(anchor);
        let mut scan_end = anchor;

        let mut degraded = 0usize;
        for function in self.root.functions_mut() {
            if !function.set_test_data(source, scan_start, scan_end, timeout).await {
                degraded += 1;
            }
        }
        let interval = self.native_interval()?;

        if let Some((season_start, season_end)) =
            self.season.as_ref().and_then(|s| s.bounds_for(anchor))
        {
            if scan_start < season_start {
                scan_start = truncate_to(season_start, IntervalBase::Day);
            }
            if scan_end > season_end {
                scan_end = season_end;
            }
        }

        let mut steps = 0usize;
        match interval {
            Some(interval) => {
                let mut t = interval.align(scan_start);
                if t < scan_start {
                    t = interval.add_to(t, 1);
                }
                let end = interval.align(scan_end);
                while t <= end {
                    self.check_cancelled(cancel)?;
                    self.run(t);
                    steps += 1;
                    t = interval.add_to(t, 1);
                }
            }
            // nothing bound: evaluate once at the anchor
            None => {
                self.check_cancelled(cancel)?;
                if scan_start <= anchor && anchor <= scan_end {
                    self.run(anchor);
                    steps = 1;
                }
            }
        }

        let forwarded = self.post_run().await;
        info!(
            test_id = %self.id,
            %anchor,
            steps,
            degraded,
            groups = forwarded,
            "test pass finished"
        );
        Ok(forwarded)
    }

    fn pre_run(&mut self) {
        self.result_groups.clear();
        self.was_last_run_positive = false;
    }

    fn check_cancelled(&mut self, cancel: &AtomicBool) -> Result<()> {
        if cancel.load(Ordering::Relaxed) {
            self.result_groups.clear();
            debug!(test_id = %self.id, "pass cancelled");
            return Err(RuleError::Cancelled);
        }
        Ok(())
    }

    /// Apply the positive-count threshold, then hand every group to every
    /// linked action.
    async fn post_run(&mut self) -> usize {
        let count = self.result_groups.len();
        if self.positive_count_threshold > 1 && count < self.positive_count_threshold as usize {
            if count > 0 {
                debug!(
                    test_id = %self.id,
                    count,
                    threshold = self.positive_count_threshold,
                    "below positive count threshold, discarding pass"
                );
            }
            self.result_groups.clear();
            return 0;
        }

        for group in &self.result_groups {
            for action in &self.actions {
                action.lock().await.add_results(group);
            }
        }
        self.was_last_run_positive = count > 0;
        count
    }

    /// The sampling interval shared by every bound series, if any is bound.
    fn native_interval(&self) -> Result<Option<TimeInterval>> {
        let mut found: Option<TimeInterval> = None;
        for function in self.root.functions() {
            for interval in function.bound_intervals() {
                match found {
                    None => found = Some(interval),
                    Some(first) if first != interval => {
                        return Err(RuleError::IntervalMismatch {
                            test_id: self.id.clone(),
                            first,
                            second: interval,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(found)
    }

    // ── Scheduling ──────────────────────────────────────────────────

    pub fn is_in_active_season(&self, t: NaiveDateTime) -> bool {
        self.season.as_ref().map_or(true, |s| s.contains(t))
    }

    pub fn is_time_to_run(&self, t: NaiveDateTime) -> bool {
        self.schedule.is_time_to_run(t)
    }

    pub fn compute_next_run(&mut self, t: NaiveDateTime) -> NaiveDateTime {
        self.schedule.compute_next_run(t, self.was_last_run_positive)
    }

    // ── Wildcards ───────────────────────────────────────────────────

    pub fn wildcard_identifiers(&self) -> Vec<String> {
        self.root.wildcard_identifiers()
    }

    pub fn set_wildcards(&mut self, capture: &str) {
        self.root.set_wildcards(capture);
    }
}
