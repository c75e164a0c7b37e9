//! Turns loaded documents into runtime [`Test`]s and shared [`Action`]s.
//!
//! Construction is all-or-nothing per document: any problem yields a
//! [`RuleError::Validation`] naming the offending field path, and nothing
//! partially built is returned.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use tsalarm_core::{DateTimePattern, Schedule, TimeInterval};
use tsalarm_notify::{
    Action, Delivery, LogDelivery, ProcessDelivery, SharedAction, WebhookDelivery,
};

use crate::error::{Result, RuleError};
use crate::expr::{Expression, Function, FunctionKind, Side};
use crate::schema::{ActionRule, DeliverySpec, ExpressionNode, RuleDocument, ScheduleSpec, TestRule};
use crate::season::ActiveSeason;
use crate::test::Test;

fn invalid(path: &str, message: impl std::fmt::Display) -> RuleError {
    RuleError::Validation(format!("{path}: {message}"))
}

/// Re-anchor a nested error at `path`, keeping its own wording.
fn at(path: &str, err: RuleError) -> RuleError {
    match err {
        RuleError::Validation(message) => invalid(path, message),
        RuleError::Core(inner) => invalid(path, inner),
        other => other,
    }
}

// ── Calendar fields ─────────────────────────────────────────────────

pub fn parse_interval(path: &str, value: &str) -> Result<TimeInterval> {
    value.parse().map_err(|e| invalid(path, e))
}

/// Build a [`Schedule`]; actions never carry a positive interval.
pub fn build_schedule(path: &str, spec: &ScheduleSpec, allow_positive: bool) -> Result<Schedule> {
    let base = DateTimePattern::parse(&spec.base_time, &spec.base_time_format)
        .map_err(|e| invalid(&format!("{path}.base_time"), e))?;
    let interval = parse_interval(&format!("{path}.interval"), &spec.interval)?;
    let positive_interval = match &spec.positive_interval {
        Some(_) if !allow_positive => {
            return Err(invalid(
                &format!("{path}.positive_interval"),
                "only tests reschedule on positive passes",
            ));
        }
        Some(value) => Some(parse_interval(&format!("{path}.positive_interval"), value)?),
        None => None,
    };
    Ok(Schedule::new(base, interval, positive_interval))
}

// ── Expression tree ─────────────────────────────────────────────────

/// Build one subtree.
pub fn build_node(path: &str, node: &ExpressionNode) -> Result<Side> {
    match node {
        ExpressionNode::Operation { op, left, right, message } => {
            let left = build_node(&format!("{path}.left"), left)?;
            let right = build_node(&format!("{path}.right"), right)?;
            Ok(Expression::new(*op, left, right)
                .with_message(message.clone())
                .into())
        }
        ExpressionNode::Function { function, args, message, missing_value } => {
            if *function == FunctionKind::Constant {
                return Err(invalid(path, "use `constant: <value>` for constants"));
            }
            if missing_value.is_some_and(|v| !v.is_finite()) {
                return Err(invalid(path, "missing_value must be a finite number"));
            }
            let leaf = Function::new(*function, args.clone())
                .map_err(|e| at(path, e))?
                .with_message(message.clone())
                .with_missing_value(*missing_value);
            Ok(leaf.into())
        }
        ExpressionNode::Constant { constant, message } => {
            if !constant.is_finite() {
                return Err(invalid(path, format!("constant must be finite, got {constant}")));
            }
            Ok(Function::constant(*constant).with_message(message.clone()).into())
        }
    }
}

/// Build a test's root; it must be an operator node.
pub fn build_expression(node: &ExpressionNode) -> Result<Expression> {
    match build_node("expression", node)? {
        Side::Expression(root) => Ok(*root),
        Side::Function(_) => Err(invalid(
            "expression",
            "the root must be an operator node (op/left/right)",
        )),
    }
}

// ── Actions ─────────────────────────────────────────────────────────

fn build_delivery(spec: &DeliverySpec) -> Result<Arc<dyn Delivery>> {
    let delivery: Arc<dyn Delivery> = match spec {
        DeliverySpec::Log => Arc::new(LogDelivery::new()),
        DeliverySpec::Webhook { url, method, headers } => Arc::new(
            WebhookDelivery::from_config(url.clone(), method.clone(), headers.clone())
                .map_err(|e| invalid("delivery", e))?,
        ),
        DeliverySpec::Process { command, args, timeout_secs } => {
            let mut process = ProcessDelivery::new(command.clone(), args.clone())
                .map_err(|e| invalid("delivery", e))?;
            if let Some(secs) = timeout_secs {
                process = process.with_timeout(Duration::from_secs(*secs));
            }
            Arc::new(process)
        }
    };
    Ok(delivery)
}

pub fn build_action(rule: &ActionRule) -> Result<Action> {
    let schedule = build_schedule("schedule", &rule.schedule, false)?;
    let retention = parse_interval("retention", &rule.retention)?;
    let delivery = build_delivery(&rule.delivery)?;

    Action::new(rule.metadata.id.clone(), schedule, retention, delivery)
        .with_name(rule.metadata.name.clone())
        .with_active(rule.active)
        .with_level_cutoff(rule.result_level_cutoff)
        .with_severity(rule.severity)
        .with_templates(rule.subject_template.clone(), rule.body_template.clone())
        .map_err(|e| invalid("templates", e))
}

// ── Tests ───────────────────────────────────────────────────────────

/// Build a test, linking it to already built actions by id.
pub fn build_test(rule: &TestRule, actions: &BTreeMap<String, SharedAction>) -> Result<Test> {
    let root = build_expression(&rule.expression)?;
    let schedule = build_schedule("schedule", &rule.schedule, true)?;
    let window = parse_interval("evaluation_window", &rule.evaluation_window)?;

    let season = rule
        .season
        .as_ref()
        .map(|s| ActiveSeason::parse(&s.start, &s.end, &s.format))
        .transpose()
        .map_err(|e| at("season", e))?;

    if rule.positive_count_threshold == 0 {
        return Err(invalid("positive_count_threshold", "must be at least 1"));
    }

    let mut linked = Vec::with_capacity(rule.actions.len());
    for (i, id) in rule.actions.iter().enumerate() {
        let action = actions
            .get(id)
            .ok_or_else(|| invalid(&format!("actions[{i}]"), format!("unknown action '{id}'")))?;
        linked.push(action.clone());
    }

    Ok(Test::new(rule.metadata.id.clone(), root, schedule, window)
        .with_name(rule.metadata.name.clone())
        .with_season(season)
        .with_threshold(rule.positive_count_threshold)
        .with_message(rule.message.clone())
        .with_actions(linked))
}

// ── Whole rule sets ─────────────────────────────────────────────────

/// Everything built from one snapshot of documents.
#[derive(Debug, Default)]
pub struct RuleSet {
    pub tests: Vec<Test>,
    pub actions: BTreeMap<String, SharedAction>,
    /// Documents that failed to build, keyed by document id.
    pub errors: HashMap<String, RuleError>,
}

/// Build every enabled document. Actions are built first so tests can
/// link to them; a failing document is reported and skipped.
pub fn build_rule_set<'a>(documents: impl IntoIterator<Item = &'a RuleDocument>) -> RuleSet {
    let mut set = RuleSet::default();
    let mut test_rules = Vec::new();

    for doc in documents {
        let meta = doc.metadata();
        if !meta.enabled {
            debug!(rule_id = %meta.id, kind = %doc.kind(), "document disabled, skipping");
            continue;
        }
        match doc {
            RuleDocument::Action(rule) => match build_action(rule) {
                Ok(action) => {
                    set.actions.insert(meta.id.clone(), action.into_shared());
                }
                Err(e) => {
                    warn!(rule_id = %meta.id, error = %e, "failed to build action");
                    set.errors.insert(meta.id.clone(), e);
                }
            },
            RuleDocument::Test(rule) => test_rules.push(rule),
        }
    }

    test_rules.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
    for rule in test_rules {
        match build_test(rule, &set.actions) {
            Ok(test) => set.tests.push(test),
            Err(e) => {
                warn!(rule_id = %rule.metadata.id, error = %e, "failed to build test");
                set.errors.insert(rule.metadata.id.clone(), e);
            }
        }
    }
    set
}
