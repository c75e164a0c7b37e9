//! Expands tests whose identifiers contain `*` into one concrete test per
//! matching series.
//!
//! Matching runs once, before scheduling, against the identifiers the data
//! source currently knows. The first wildcard identifier in tree order
//! drives the match; every wildcard slot then receives the same capture.

use tracing::{debug, warn};

use tsalarm_core::DataSource;

use crate::expr::WILDCARD;
use crate::test::Test;

/// Match `candidate` against a pattern with a single `*`, returning the
/// text the `*` stood for. Empty captures do not match.
pub fn capture<'a>(pattern: &str, candidate: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = pattern.split_once(WILDCARD)?;
    if suffix.contains(WILDCARD) {
        return None;
    }
    let rest = candidate.strip_prefix(prefix)?;
    let middle = rest.strip_suffix(suffix)?;
    (!middle.is_empty()).then_some(middle)
}

/// Concrete copies of `test`, one per identifier matching its first
/// wildcard identifier, with ids suffixed `[capture]`.
pub fn expand_test(test: &Test, identifiers: &[String]) -> Vec<Test> {
    let Some(pattern) = test.wildcard_identifiers().into_iter().next() else {
        return vec![test.clone()];
    };

    let mut captures: Vec<&str> = identifiers
        .iter()
        .filter_map(|id| capture(&pattern, id))
        .collect();
    captures.sort_unstable();
    captures.dedup();

    let expanded: Vec<Test> = captures
        .into_iter()
        .map(|cap| {
            let mut copy = test.clone();
            copy.set_wildcards(cap);
            copy.id = format!("{}[{}]", test.id, cap);
            copy
        })
        .collect();

    debug!(test_id = %test.id, %pattern, matches = expanded.len(), "wildcard expanded");
    expanded
}

/// Expand every wildcard test in `tests`; plain tests pass through.
///
/// If the source cannot list its identifiers, wildcard tests are dropped
/// for this build and a warning is logged.
pub async fn expand_all(tests: Vec<Test>, source: &dyn DataSource) -> Vec<Test> {
    if tests.iter().all(|t| t.wildcard_identifiers().is_empty()) {
        return tests;
    }

    let identifiers = match source.identifiers().await {
        Ok(ids) => Some(ids),
        Err(e) => {
            warn!(error = %e, "cannot list series identifiers, wildcard tests skipped");
            None
        }
    };

    let mut out = Vec::with_capacity(tests.len());
    for test in tests {
        if test.wildcard_identifiers().is_empty() {
            out.push(test);
            continue;
        }
        if let Some(ids) = &identifiers {
            let expanded = expand_test(&test, ids);
            if expanded.is_empty() {
                warn!(test_id = %test.id, "wildcard matched no series");
            }
            out.extend(expanded);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tsalarm_core::{
        AlarmError, DateTimePattern, MemorySource, Schedule, TimeInterval, TimeSeries,
    };

    use crate::expr::{Expression, Function, FunctionKind, Operator};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn level_test(left: &str, right: &str) -> Test {
        let root = Expression::new(
            Operator::GreaterThan,
            Function::new(FunctionKind::GetValue, vec![left.to_string()]).unwrap(),
            Function::new(FunctionKind::GetValue, vec![right.to_string()]).unwrap(),
        );
        Test::new(
            "level",
            root,
            Schedule::new(
                DateTimePattern::parse("06:00", "HH:mm").unwrap(),
                TimeInterval::days(1),
                None,
            ),
            TimeInterval::hours(6),
        )
    }

    fn leaf_ids(test: &Test) -> Vec<String> {
        test.root()
            .functions()
            .iter()
            .flat_map(|f| f.inputs().to_vec())
            .collect()
    }

    #[test]
    fn capture_single_star() {
        assert_eq!(capture("river.*.level", "river.north.level"), Some("north"));
        assert_eq!(capture("*.level", "lake.level"), Some("lake"));
        assert_eq!(capture("river.*", "river.south"), Some("south"));
        assert_eq!(capture("river.*.level", "river.north.flow"), None);
        assert_eq!(capture("river.*.level", "river..level"), None);
        assert_eq!(capture("river.level", "river.level"), None);
        assert_eq!(capture("a*b*c", "axbyc"), None);
    }

    #[test]
    fn expands_one_test_per_match() {
        let test = level_test("river.*.level", "river.*.alarm");
        let ids: Vec<String> = ["river.south.level", "river.north.level", "river.north.alarm", "lake.level"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let expanded = expand_test(&test, &ids);
        let names: Vec<&str> = expanded.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(names, vec!["level[north]", "level[south]"]);
        assert_eq!(leaf_ids(&expanded[0]), vec!["river.north.level", "river.north.alarm"]);
        assert!(expanded[0].wildcard_identifiers().is_empty());
        // the original stays untouched
        assert_eq!(test.wildcard_identifiers().len(), 2);
    }

    #[test]
    fn plain_tests_pass_through() {
        let test = level_test("A", "B");
        let expanded = expand_test(&test, &[]);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].id, "level");
    }

    #[tokio::test]
    async fn expand_all_reads_source_identifiers() {
        let source = MemorySource::new()
            .with(TimeSeries::new("gauge.a", TimeInterval::hours(1)).with_sample(dt("2006-05-20 00:00:00"), 1.0))
            .with(TimeSeries::new("gauge.b", TimeInterval::hours(1)));
        let tests = vec![level_test("gauge.*", "limit"), level_test("A", "B")];

        let out = expand_all(tests, &source).await;
        let names: Vec<&str> = out.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(names, vec!["level[a]", "level[b]", "level"]);
    }

    struct Unlistable;

    #[async_trait::async_trait]
    impl DataSource for Unlistable {
        async fn resolve(
            &self,
            identifier: &str,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> tsalarm_core::Result<TimeSeries> {
            Err(AlarmError::DataSource {
                identifier: identifier.to_string(),
                message: "offline".to_string(),
            })
        }

        async fn identifiers(&self) -> tsalarm_core::Result<Vec<String>> {
            Err(AlarmError::Other("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn unlistable_source_drops_only_wildcard_tests() {
        let tests = vec![level_test("gauge.*", "limit"), level_test("A", "B")];
        let out = expand_all(tests, &Unlistable).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "level");
    }
}
