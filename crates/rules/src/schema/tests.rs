//! Tests for schema types.

use super::*;
use crate::expr::{FunctionKind, Operator};
use tsalarm_notify::Severity;

const RIVER_TEST_YAML: &str = r#"
apiVersion: v1
kind: Test
metadata:
  id: river-high
  name: River level high
  description: Level above 4.5 m while the flow gauge still reports
  tags: [hydro, river]
schedule:
  base_time: "06:00"
  interval: 1d
  positive_interval: 1h
evaluation_window: 6h
season:
  start: "10-01"
  end: "04-01"
positive_count_threshold: 2
message: "River high at $DATETIME ($VALUE)"
expression:
  op: and
  left:
    op: ">"
    left: { function: get_value, args: [river.level] }
    right: { constant: 4.5 }
  right:
    op: "=="
    left: { function: is_missing, args: [river.flow], message: "flow gauge silent" }
    right: { constant: 0 }
actions: [ops-webhook]
"#;

const WEBHOOK_ACTION_YAML: &str = r#"
apiVersion: v1
kind: Action
metadata:
  id: ops-webhook
  name: Ops webhook
schedule:
  base_time: "00:00"
  interval: 15m
retention: 7d
result_level_cutoff: 1
severity: critical
delivery:
  channel: webhook
  url: "https://hooks.example.com/alerts"
  headers:
    Authorization: "Bearer ${OPS_TOKEN}"
"#;

#[test]
fn parse_test_rule() {
    let rule: TestRule = serde_yaml::from_str(RIVER_TEST_YAML).unwrap();
    assert_eq!(rule.api_version, "v1");
    assert_eq!(rule.metadata.id, "river-high");
    assert!(rule.metadata.enabled);
    assert_eq!(rule.schedule.base_time_format, "HH:mm");
    assert_eq!(rule.schedule.positive_interval.as_deref(), Some("1h"));
    assert_eq!(rule.evaluation_window, "6h");
    assert_eq!(rule.positive_count_threshold, 2);
    assert_eq!(rule.actions, vec!["ops-webhook"]);

    let season = rule.season.as_ref().unwrap();
    assert_eq!(season.format, "MM-dd");
    assert_eq!(season.end, "04-01");

    assert_eq!(rule.expression.node_count(), 7);
    match &rule.expression {
        ExpressionNode::Operation { op, right, .. } => {
            assert_eq!(*op, Operator::And);
            match right.as_ref() {
                ExpressionNode::Operation { op, left, .. } => {
                    assert_eq!(*op, Operator::Equals);
                    match left.as_ref() {
                        ExpressionNode::Function { function, args, message, .. } => {
                            assert_eq!(*function, FunctionKind::IsMissing);
                            assert_eq!(args, &vec!["river.flow".to_string()]);
                            assert_eq!(message.as_deref(), Some("flow gauge silent"));
                        }
                        other => panic!("expected function leaf, got {:?}", other),
                    }
                }
                other => panic!("expected operation, got {:?}", other),
            }
        }
        other => panic!("expected operation root, got {:?}", other),
    }
}

#[test]
fn parse_action_rule() {
    let rule: ActionRule = serde_yaml::from_str(WEBHOOK_ACTION_YAML).unwrap();
    assert_eq!(rule.metadata.id, "ops-webhook");
    assert!(rule.active);
    assert_eq!(rule.retention, "7d");
    assert_eq!(rule.result_level_cutoff, Some(1));
    assert_eq!(rule.severity, Some(Severity::Critical));
    match &rule.delivery {
        DeliverySpec::Webhook { url, method, headers } => {
            assert_eq!(url, "https://hooks.example.com/alerts");
            assert!(method.is_none());
            assert_eq!(
                headers.as_ref().unwrap().get("Authorization").map(String::as_str),
                Some("Bearer ${OPS_TOKEN}")
            );
        }
        other => panic!("expected webhook delivery, got {:?}", other),
    }
    assert_eq!(rule.delivery.channel(), "webhook");
}

#[test]
fn delivery_channels_deserialize() {
    let log: DeliverySpec = serde_yaml::from_str("channel: log").unwrap();
    assert_eq!(log, DeliverySpec::Log);

    let process: DeliverySpec = serde_yaml::from_str(
        "channel: process\ncommand: /usr/local/bin/page\nargs: [--team, hydro]\ntimeout_secs: 5",
    )
    .unwrap();
    match process {
        DeliverySpec::Process { command, args, timeout_secs } => {
            assert_eq!(command, "/usr/local/bin/page");
            assert_eq!(args, vec!["--team", "hydro"]);
            assert_eq!(timeout_secs, Some(5));
        }
        other => panic!("expected process delivery, got {:?}", other),
    }

    assert!(serde_yaml::from_str::<DeliverySpec>("channel: pigeon").is_err());
}

#[test]
fn round_trip() {
    let rule: TestRule = serde_yaml::from_str(RIVER_TEST_YAML).unwrap();
    let yaml = serde_yaml::to_string(&rule).unwrap();
    let rule2: TestRule = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(rule, rule2);
}

#[test]
fn malformed_yaml_errors() {
    // Missing expression
    let missing_expr = r#"
apiVersion: v1
kind: Test
metadata:
  id: t
  name: T
schedule: { base_time: "06:00", interval: 1d }
evaluation_window: 6h
"#;
    assert!(serde_yaml::from_str::<TestRule>(missing_expr).is_err());

    // Unknown operator
    let bad_op = r#"
apiVersion: v1
kind: Test
metadata:
  id: t
  name: T
schedule: { base_time: "06:00", interval: 1d }
evaluation_window: 6h
expression:
  op: "<=>"
  left: { constant: 1 }
  right: { constant: 2 }
"#;
    assert!(serde_yaml::from_str::<TestRule>(bad_op).is_err());

    // Unknown function
    let bad_fn = r#"
apiVersion: v1
kind: Test
metadata:
  id: t
  name: T
schedule: { base_time: "06:00", interval: 1d }
evaluation_window: 6h
expression:
  op: ">"
  left: { function: moving_average, args: [A] }
  right: { constant: 2 }
"#;
    assert!(serde_yaml::from_str::<TestRule>(bad_fn).is_err());

    // Unknown field in strict struct
    let unknown_field = r#"
apiVersion: v1
kind: Test
metadata:
  id: t
  name: T
  bogus_field: oops
schedule: { base_time: "06:00", interval: 1d }
evaluation_window: 6h
expression: { op: ">", left: { constant: 1 }, right: { constant: 0 } }
"#;
    assert!(serde_yaml::from_str::<TestRule>(unknown_field).is_err());
}

#[test]
fn defaults_apply() {
    let yaml = r#"
apiVersion: v1
kind: Test
metadata:
  id: t
  name: T
schedule: { base_time: "06:00", interval: 1d }
evaluation_window: 6h
expression: { op: ">", left: { function: get_value, args: [A] }, right: { constant: 0 } }
"#;
    let rule: TestRule = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(rule.positive_count_threshold, 1);
    assert!(rule.season.is_none());
    assert!(rule.message.is_none());
    assert!(rule.actions.is_empty());
    assert!(rule.schedule.positive_interval.is_none());
}

// ── RuleKind / RuleEnvelope / RuleDocument tests ────────────────

#[test]
fn rule_kind_from_str() {
    assert_eq!("Test".parse::<RuleKind>().unwrap(), RuleKind::Test);
    assert_eq!("Action".parse::<RuleKind>().unwrap(), RuleKind::Action);
    assert!("AnomalyRule".parse::<RuleKind>().is_err());
}

#[test]
fn envelope_dispatches_on_kind() {
    let env: RuleEnvelope = serde_yaml::from_str(RIVER_TEST_YAML).unwrap();
    assert_eq!(env.rule_kind().unwrap(), RuleKind::Test);
    let doc = env.parse_full().unwrap();
    assert_eq!(doc.kind(), RuleKind::Test);
    assert_eq!(doc.metadata().id, "river-high");
    assert!(doc.as_test().is_some());
    assert!(doc.as_action().is_none());

    let env: RuleEnvelope = serde_yaml::from_str(WEBHOOK_ACTION_YAML).unwrap();
    let doc = env.parse_full().unwrap();
    assert_eq!(doc.kind(), RuleKind::Action);
    assert!(doc.as_action().is_some());
}

#[test]
fn envelope_rejects_unknown_kind() {
    let yaml = RIVER_TEST_YAML.replace("kind: Test", "kind: Sensor");
    let env: RuleEnvelope = serde_yaml::from_str(&yaml).unwrap();
    assert!(env.parse_full().is_err());
}

#[test]
fn document_to_yaml_round_trips() {
    let env: RuleEnvelope = serde_yaml::from_str(WEBHOOK_ACTION_YAML).unwrap();
    let doc = env.parse_full().unwrap();
    let yaml = doc.to_yaml().unwrap();
    let again: RuleEnvelope = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(again.parse_full().unwrap(), doc);
}
