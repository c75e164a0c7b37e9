//! Partial date/time patterns such as base times (`"06:00"` / `"HH:mm"`)
//! and season bounds (`"10-01"` / `"MM-dd"`).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::interval::{IntervalBase, TimeInterval};
use crate::error::AlarmError;

/// Recognized format tokens. Case matters: `MM` is month, `mm` is minute.
const TOKENS: &[(&str, Field)] = &[
    ("yyyy", Field::Year),
    ("MM", Field::Month),
    ("dd", Field::Day),
    ("HH", Field::Hour),
    ("mm", Field::Minute),
    ("ss", Field::Second),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Field {
    fn base(self) -> IntervalBase {
        match self {
            Field::Year => IntervalBase::Year,
            Field::Month => IntervalBase::Month,
            Field::Day => IntervalBase::Day,
            Field::Hour => IntervalBase::Hour,
            Field::Minute => IntervalBase::Minute,
            Field::Second => IntervalBase::Second,
        }
    }

    fn range(self) -> (u32, u32) {
        match self {
            Field::Year => (0, 9999),
            Field::Month => (1, 12),
            Field::Day => (1, 31),
            Field::Hour => (0, 23),
            Field::Minute | Field::Second => (0, 59),
        }
    }
}

/// A date/time with only some fields significant, as described by its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimePattern {
    pub format: String,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
}

impl DateTimePattern {
    /// Parse `value` according to `format` (tokens `yyyy MM dd HH mm ss`,
    /// everything else is a literal that must match exactly).
    pub fn parse(value: &str, format: &str) -> Result<Self, AlarmError> {
        let mut pattern = Self {
            format: format.to_string(),
            year: None,
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
        };

        let value = value.trim();
        let mut fmt_rest = format;
        let mut val_rest = value;

        while !fmt_rest.is_empty() {
            if let Some((token, field)) = TOKENS.iter().find(|(tok, _)| fmt_rest.starts_with(tok)) {
                let width = token.len();
                if val_rest.len() < width || !val_rest.is_char_boundary(width) {
                    return Err(mismatch(value, format));
                }
                let (digits, rest) = val_rest.split_at(width);
                let n: u32 = digits.parse().map_err(|_| mismatch(value, format))?;
                let (lo, hi) = field.range();
                if n < lo || n > hi {
                    return Err(AlarmError::Parse(format!(
                        "field '{token}' out of range in '{value}'"
                    )));
                }
                pattern.set(*field, n);
                fmt_rest = &fmt_rest[width..];
                val_rest = rest;
            } else {
                let mut fmt_chars = fmt_rest.chars();
                let mut val_chars = val_rest.chars();
                let (Some(fc), Some(vc)) = (fmt_chars.next(), val_chars.next()) else {
                    return Err(mismatch(value, format));
                };
                if fc != vc {
                    return Err(mismatch(value, format));
                }
                fmt_rest = fmt_chars.as_str();
                val_rest = val_chars.as_str();
            }
        }

        if !val_rest.is_empty() {
            return Err(mismatch(value, format));
        }
        if pattern.fields().next().is_none() {
            return Err(AlarmError::Parse(format!("format '{format}' has no date/time fields")));
        }
        Ok(pattern)
    }

    fn set(&mut self, field: Field, n: u32) {
        match field {
            Field::Year => self.year = Some(n as i32),
            Field::Month => self.month = Some(n),
            Field::Day => self.day = Some(n),
            Field::Hour => self.hour = Some(n),
            Field::Minute => self.minute = Some(n),
            Field::Second => self.second = Some(n),
        }
    }

    fn get(&self, field: Field) -> Option<u32> {
        match field {
            Field::Year => self.year.map(|y| y as u32),
            Field::Month => self.month,
            Field::Day => self.day,
            Field::Hour => self.hour,
            Field::Minute => self.minute,
            Field::Second => self.second,
        }
    }

    fn fields(&self) -> impl Iterator<Item = (Field, u32)> + '_ {
        TOKENS
            .iter()
            .filter_map(move |(_, f)| self.get(*f).map(|v| (*f, v)))
    }

    /// Whether the pattern carries any time-of-day field.
    pub fn has_time(&self) -> bool {
        self.hour.is_some() || self.minute.is_some() || self.second.is_some()
    }

    /// Move `t` onto this pattern's phase for a cycle of `interval`.
    ///
    /// Fields finer than the interval's base take the pattern's value (or
    /// their minimum when the pattern omits them). The field equal to the
    /// base is snapped down onto the `pattern + k * multiplier` grid for
    /// second/minute/hour intervals. Coarser fields are left alone.
    pub fn realign(&self, t: NaiveDateTime, interval: &TimeInterval) -> NaiveDateTime {
        let mut parts = [
            (Field::Month, t.month()),
            (Field::Day, t.day()),
            (Field::Hour, t.hour()),
            (Field::Minute, t.minute()),
            (Field::Second, t.second()),
        ];

        // distance back to the previous grid slot; may cross into the coarser field
        let mut back = Duration::zero();
        for (field, value) in parts.iter_mut() {
            let base = field.base();
            if base < interval.base {
                *value = self.get(*field).unwrap_or(field.range().0);
            } else if base == interval.base && interval.multiplier > 1 {
                if let Some(phase) = self.get(*field) {
                    let offset = (*value as i64 - phase as i64).rem_euclid(interval.multiplier as i64);
                    back = match field {
                        Field::Hour => Duration::hours(offset),
                        Field::Minute => Duration::minutes(offset),
                        Field::Second => Duration::seconds(offset),
                        _ => Duration::zero(),
                    };
                }
            }
        }

        let [(_, month), (_, day), (_, hour), (_, minute), (_, second)] = parts;
        // every field is in range and the day is clamped, so only a year
        // outside chrono's range can fail here
        build(t.year(), month, day, hour, minute, second).map_or(t, |aligned| aligned - back)
    }

    /// Anchor this pattern in `year`; time fields default to midnight.
    pub fn in_year(&self, year: i32) -> Option<NaiveDateTime> {
        build(
            year,
            self.month?,
            self.day.unwrap_or(1),
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
        )
    }
}

fn mismatch(value: &str, format: &str) -> AlarmError {
    AlarmError::Parse(format!("'{value}' does not match format '{format}'"))
}

/// Build a date/time, clamping the day to the month's length.
fn build(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<NaiveDateTime> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = next_month.signed_duration_since(first).num_days() as u32;
    first
        .with_day(day.min(last_day))?
        .and_hms_opt(hour, minute, second)
}
