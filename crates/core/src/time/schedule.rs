//! Base-time anchored interval scheduling shared by tests and actions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::interval::TimeInterval;
use super::pattern::DateTimePattern;

/// Compute the next run instant after `now`.
///
/// The step is `positive_interval` when the last run was positive and one
/// is configured, otherwise `interval`. The naive `now + step` is realigned
/// onto the base time's phase. If the base time of the current cycle is
/// still ahead of `now` but earlier than that result, the current cycle's
/// base time wins so the first run of a cycle is never skipped.
pub fn next_run(
    now: NaiveDateTime,
    base: &DateTimePattern,
    interval: &TimeInterval,
    positive_interval: Option<&TimeInterval>,
    was_positive: bool,
) -> NaiveDateTime {
    let step = match positive_interval {
        Some(p) if was_positive => p,
        _ => interval,
    };

    let naive = step.add_to(now, 1);
    let mut next = base.realign(naive, step);
    if next <= now {
        next = base.realign(step.add_to(naive, 1), step);
    }

    let current = base.realign(now, step);
    if current > now && current < next {
        current
    } else {
        next
    }
}

/// Scheduling state for one test or action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub base: DateTimePattern,
    pub interval: TimeInterval,
    pub positive_interval: Option<TimeInterval>,
    next_run_time: Option<NaiveDateTime>,
}

impl Schedule {
    pub fn new(
        base: DateTimePattern,
        interval: TimeInterval,
        positive_interval: Option<TimeInterval>,
    ) -> Self {
        Self {
            base,
            interval,
            positive_interval,
            next_run_time: None,
        }
    }

    /// Whether a run is due at `t`.
    ///
    /// Before the first run the base time on `t`'s calendar day is the gate.
    pub fn is_time_to_run(&self, t: NaiveDateTime) -> bool {
        match self.next_run_time {
            Some(next) => t >= next,
            None => t >= self.base.realign(t, &TimeInterval::days(1)),
        }
    }

    /// Advance the schedule past `t` and return the new next-run instant.
    pub fn compute_next_run(&mut self, t: NaiveDateTime, was_positive: bool) -> NaiveDateTime {
        let next = next_run(
            t,
            &self.base,
            &self.interval,
            self.positive_interval.as_ref(),
            was_positive,
        );
        self.next_run_time = Some(next);
        next
    }

    pub fn next_run_time(&self) -> Option<NaiveDateTime> {
        self.next_run_time
    }

    /// Force the next run instant (e.g. when restoring persisted state).
    pub fn set_next_run_time(&mut self, next: Option<NaiveDateTime>) {
        self.next_run_time = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn daily_at_six() -> Schedule {
        Schedule::new(
            DateTimePattern::parse("06:00", "HH:mm").unwrap(),
            TimeInterval::days(1),
            Some(TimeInterval::hours(1)),
        )
    }

    #[test]
    fn snaps_to_current_cycle_base_time() {
        // 03:00 + 1 day realigns to tomorrow 06:00, but today's 06:00 is still ahead.
        let next = next_run(
            dt("2006-05-20 03:00:00"),
            &DateTimePattern::parse("06:00", "HH:mm").unwrap(),
            &TimeInterval::days(1),
            None,
            false,
        );
        assert_eq!(next, dt("2006-05-20 06:00:00"));
    }

    #[test]
    fn daily_after_base_time_goes_to_tomorrow() {
        let next = next_run(
            dt("2006-05-20 06:00:00"),
            &DateTimePattern::parse("06:00", "HH:mm").unwrap(),
            &TimeInterval::days(1),
            None,
            false,
        );
        assert_eq!(next, dt("2006-05-21 06:00:00"));
    }

    #[test]
    fn positive_interval_used_after_positive_run() {
        let mut s = daily_at_six();
        let next = s.compute_next_run(dt("2006-05-20 06:00:00"), true);
        // hourly phase: minutes from the base time, so 07:00
        assert_eq!(next, dt("2006-05-20 07:00:00"));

        let next = s.compute_next_run(dt("2006-05-20 07:00:00"), false);
        assert_eq!(next, dt("2006-05-21 06:00:00"));
    }

    #[test]
    fn fifteen_minute_grid_keeps_phase() {
        let base = DateTimePattern::parse("05", "mm").unwrap();
        let next = next_run(
            dt("2006-05-20 13:36:10"),
            &base,
            &TimeInterval::minutes(15),
            None,
            false,
        );
        assert_eq!(next, dt("2006-05-20 13:50:00"));
    }

    #[test]
    fn fifteen_minute_grid_below_phase_stays_on_grid() {
        let base = DateTimePattern::parse("05", "mm").unwrap();
        let mut s = Schedule::new(base, TimeInterval::minutes(15), None);

        let first = s.compute_next_run(dt("2006-05-20 13:48:10"), false);
        assert_eq!(first, dt("2006-05-20 13:50:00"));

        let second = s.compute_next_run(first, false);
        assert_eq!(second, dt("2006-05-20 14:05:00"));
        assert_eq!(second - first, chrono::Duration::minutes(15));
    }

    #[test]
    fn first_run_gated_on_base_time_of_day() {
        let s = daily_at_six();
        assert!(!s.is_time_to_run(dt("2006-05-20 05:59:00")));
        assert!(s.is_time_to_run(dt("2006-05-20 06:00:00")));
    }

    #[test]
    fn subsequent_runs_gated_on_next_run_time() {
        let mut s = daily_at_six();
        s.compute_next_run(dt("2006-05-20 06:00:00"), false);
        assert_eq!(s.next_run_time(), Some(dt("2006-05-21 06:00:00")));
        assert!(!s.is_time_to_run(dt("2006-05-20 23:00:00")));
        assert!(s.is_time_to_run(dt("2006-05-21 06:00:00")));
    }
}
