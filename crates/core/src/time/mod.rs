//! Calendar primitives: intervals, partial date/time patterns and the
//! base-time anchored schedule shared by tests and actions.

mod interval;
mod pattern;
mod schedule;

pub use interval::{truncate_to, IntervalBase, TimeInterval};
pub use pattern::DateTimePattern;
pub use schedule::{next_run, Schedule};
