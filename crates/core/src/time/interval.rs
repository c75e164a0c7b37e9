//! Calendar intervals (`15Minute`, `1Day`, `Month`) and precision alignment.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::AlarmError;

/// Base unit of a [`TimeInterval`], ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntervalBase {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl IntervalBase {
    fn name(self) -> &'static str {
        match self {
            IntervalBase::Second => "Second",
            IntervalBase::Minute => "Minute",
            IntervalBase::Hour => "Hour",
            IntervalBase::Day => "Day",
            IntervalBase::Month => "Month",
            IntervalBase::Year => "Year",
        }
    }
}

impl FromStr for IntervalBase {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // only named units take a plural; `ms` must not read as minutes
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(IntervalBase::Second),
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(IntervalBase::Minute),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(IntervalBase::Hour),
            "d" | "day" | "days" => Ok(IntervalBase::Day),
            "mo" | "month" | "months" => Ok(IntervalBase::Month),
            "y" | "yr" | "yrs" | "year" | "years" => Ok(IntervalBase::Year),
            _ => Err(AlarmError::Parse(format!("unknown interval base: '{s}'"))),
        }
    }
}

/// A calendar interval: a multiplier over a base unit.
///
/// Month and year intervals are calendar-aware: adding one month to
/// January 31st lands on the last day of February.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub base: IntervalBase,
    pub multiplier: u32,
}

impl TimeInterval {
    pub fn new(base: IntervalBase, multiplier: u32) -> Self {
        Self { base, multiplier }
    }

    pub fn minutes(n: u32) -> Self {
        Self::new(IntervalBase::Minute, n)
    }

    pub fn hours(n: u32) -> Self {
        Self::new(IntervalBase::Hour, n)
    }

    pub fn days(n: u32) -> Self {
        Self::new(IntervalBase::Day, n)
    }

    /// Add `times` whole intervals to `t` (negative values step backward).
    pub fn add_to(&self, t: NaiveDateTime, times: i32) -> NaiveDateTime {
        let n = i64::from(self.multiplier) * i64::from(times);
        match self.base {
            IntervalBase::Second => t + Duration::seconds(n),
            IntervalBase::Minute => t + Duration::minutes(n),
            IntervalBase::Hour => t + Duration::hours(n),
            IntervalBase::Day => t + Duration::days(n),
            IntervalBase::Month => add_months(t, n),
            IntervalBase::Year => add_months(t, n * 12),
        }
    }

    /// Subtract one interval from `t`.
    pub fn sub_from(&self, t: NaiveDateTime) -> NaiveDateTime {
        self.add_to(t, -1)
    }

    /// Truncate `t` to this interval's precision (fields finer than the base are zeroed).
    pub fn truncate(&self, t: NaiveDateTime) -> NaiveDateTime {
        truncate_to(t, self.base)
    }

    /// Truncate `t` and floor the base field onto the clock grid of the
    /// multiplier (`15Minute`: :00, :15, :30, :45).
    pub fn align(&self, t: NaiveDateTime) -> NaiveDateTime {
        let t = self.truncate(t);
        let m = self.multiplier.max(1);
        let aligned = match self.base {
            IntervalBase::Second => t.with_second(t.second() / m * m),
            IntervalBase::Minute => t.with_minute(t.minute() / m * m),
            IntervalBase::Hour => t.with_hour(t.hour() / m * m),
            _ => None,
        };
        aligned.unwrap_or(t)
    }

    /// Nominal fixed length (30-day months, 365-day years) for comparing
    /// intervals; calendar arithmetic goes through [`TimeInterval::add_to`].
    pub fn approx_duration(&self) -> Duration {
        let unit = match self.base {
            IntervalBase::Second => Duration::seconds(1),
            IntervalBase::Minute => Duration::minutes(1),
            IntervalBase::Hour => Duration::hours(1),
            IntervalBase::Day => Duration::days(1),
            IntervalBase::Month => Duration::days(30),
            IntervalBase::Year => Duration::days(365),
        };
        unit * self.multiplier as i32
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.multiplier, self.base.name())
    }
}

impl FromStr for TimeInterval {
    type Err = AlarmError;

    /// Parse `"15Minute"`, `"Day"`, `"6 Hours"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let multiplier = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|e| AlarmError::Parse(format!("bad interval multiplier in '{s}': {e}")))?
        };
        if multiplier == 0 {
            return Err(AlarmError::Parse(format!("interval multiplier must be > 0: '{s}'")));
        }
        Ok(Self::new(unit.parse()?, multiplier))
    }
}

fn add_months(t: NaiveDateTime, n: i64) -> NaiveDateTime {
    let months = Months::new(n.unsigned_abs() as u32);
    let shifted = if n >= 0 {
        t.checked_add_months(months)
    } else {
        t.checked_sub_months(months)
    };
    shifted.unwrap_or(if n >= 0 {
        NaiveDateTime::MAX
    } else {
        NaiveDateTime::MIN
    })
}

/// Zero every field of `t` finer than `base`.
pub fn truncate_to(t: NaiveDateTime, base: IntervalBase) -> NaiveDateTime {
    let date = t.date();
    let (h, m, s) = (t.hour(), t.minute(), t.second());
    let (date, h, m, s) = match base {
        IntervalBase::Second => (date, h, m, s),
        IntervalBase::Minute => (date, h, m, 0),
        IntervalBase::Hour => (date, h, 0, 0),
        IntervalBase::Day => (date, 0, 0, 0),
        IntervalBase::Month => (first_of_month(date), 0, 0, 0),
        IntervalBase::Year => (
            NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
            0,
            0,
            0,
        ),
    };
    date.and_hms_opt(h, m, s).unwrap_or(t)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
