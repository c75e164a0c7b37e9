//! Recurring calendar windows outside which a test is not evaluated.

use chrono::{Datelike, Duration, Months, NaiveDateTime};

use tsalarm_core::DateTimePattern;

use crate::error::{Result, RuleError};

/// Yearly window such as `10-01 .. 04-01` (`MM-dd`), possibly crossing
/// the year boundary.
///
/// A bound without a time of day covers that whole day.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSeason {
    start: DateTimePattern,
    end: DateTimePattern,
}

impl ActiveSeason {
    pub fn parse(start: &str, end: &str, format: &str) -> Result<Self> {
        let start = DateTimePattern::parse(start, format)?;
        let end = DateTimePattern::parse(end, format)?;
        for (name, p) in [("start", &start), ("end", &end)] {
            if p.month.is_none() {
                return Err(RuleError::Validation(format!(
                    "season {name} needs a month field (format '{format}')"
                )));
            }
            if p.year.is_some() {
                return Err(RuleError::Validation(format!(
                    "season {name} must not carry a year; seasons recur yearly"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Season bounds relevant to `t`.
    ///
    /// When the season wraps (end before start within a year), instants up
    /// to this year's end belong to the season that started last year;
    /// later instants to the season ending next year.
    pub fn bounds_for(&self, t: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let year = t.year();
        let mut start = self.start.in_year(year)?;
        let mut end = self.end.in_year(year)?;
        if !self.end.has_time() {
            end = end + Duration::days(1) - Duration::seconds(1);
        }

        if end < start {
            if t <= end {
                start = start.checked_sub_months(Months::new(12))?;
            } else {
                end = end.checked_add_months(Months::new(12))?;
            }
        }
        Some((start, end))
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.bounds_for(t)
            .is_some_and(|(start, end)| start <= t && t <= end)
    }
}
