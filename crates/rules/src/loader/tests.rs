//! Tests for the rule loader module.

use std::fs;

use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tempfile::TempDir;

use super::watcher::handle_fs_event;
use super::*;
use crate::schema::RuleKind;

const VALID_TEST_YAML: &str = r#"
apiVersion: v1
kind: Test
metadata:
  id: river-high
  name: River high
schedule:
  base_time: "06:00"
  interval: 1d
evaluation_window: 6h
expression:
  op: ">"
  left: { function: get_value, args: [river.level] }
  right: { constant: 4.5 }
"#;

const VALID_ACTION_YAML: &str = r#"
apiVersion: v1
kind: Action
metadata:
  id: ops-log
  name: Ops log
schedule:
  base_time: "00:00"
  interval: 1h
retention: 7d
delivery:
  channel: log
"#;

fn temp_loader() -> (TempDir, RuleLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let loader = RuleLoader::new(dir.path().to_path_buf());
    (dir, loader)
}

fn loaded_ids(results: &[LoadResult]) -> Vec<&str> {
    results
        .iter()
        .filter_map(|r| match &r.status {
            LoadStatus::Loaded { rule_id } => Some(rule_id.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn load_rule_from_file() {
    let (dir, loader) = temp_loader();
    let rule_path = dir.path().join("river-high.yml");
    fs::write(&rule_path, VALID_TEST_YAML).unwrap();

    let doc = loader.load_file(&rule_path).unwrap();
    assert_eq!(doc.metadata().id, "river-high");
    assert_eq!(doc.metadata().name, "River high");
    assert!(doc.as_test().is_some());
}

#[test]
fn load_all_skips_dotfiles_and_non_yaml() {
    let (dir, loader) = temp_loader();

    fs::write(dir.path().join("rule1.yml"), VALID_TEST_YAML).unwrap();
    // Dotfile (should be skipped)
    fs::write(dir.path().join(".hidden.yml"), VALID_TEST_YAML).unwrap();
    // Non-YAML (should be skipped)
    fs::write(dir.path().join("readme.txt"), "not a rule").unwrap();

    let results = loader.load_all().unwrap();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();

    assert_eq!(loaded_ids(&results), vec!["river-high"]);
    assert_eq!(skipped, 2);

    let docs = loader.documents();
    let guard = docs.read().unwrap();
    assert!(guard.contains_key("river-high"));
}

#[test]
fn load_all_multi_kind_recursive() {
    let (dir, loader) = temp_loader();

    fs::write(dir.path().join("river-high.yml"), VALID_TEST_YAML).unwrap();
    let sub = dir.path().join("actions");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("ops-log.yaml"), VALID_ACTION_YAML).unwrap();

    let results = loader.load_all().unwrap();
    assert_eq!(loaded_ids(&results).len(), 2, "should load from root and subdirectory");

    let snapshot = loader.snapshot();
    let kinds: Vec<_> = snapshot.iter().map(|d| (d.metadata().id.as_str(), d.kind())).collect();
    assert_eq!(kinds, vec![("ops-log", RuleKind::Action), ("river-high", RuleKind::Test)]);
}

#[test]
fn invalid_yaml_produces_error_not_panic() {
    let (dir, loader) = temp_loader();
    let bad = dir.path().join("bad.yml");
    fs::write(&bad, "{{{{not yaml").unwrap();
    assert!(loader.load_file(&bad).is_err());
}

#[test]
fn empty_id_fails_validation() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("empty.yml");
    fs::write(&path, VALID_TEST_YAML.replace("id: river-high", "id: \"\"")).unwrap();
    let err = loader.load_file(&path).unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
}

#[test]
fn load_all_reports_failed_files() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("good.yml"), VALID_TEST_YAML).unwrap();
    fs::write(dir.path().join("bad.yml"), "kind: [").unwrap();
    fs::write(
        dir.path().join("unknown-kind.yml"),
        VALID_TEST_YAML.replace("kind: Test", "kind: Sensor"),
    )
    .unwrap();

    let results = loader.load_all().unwrap();
    let failed = results.iter().filter(|r| r.is_failed()).count();
    assert_eq!(failed, 2);
    assert_eq!(loaded_ids(&results), vec!["river-high"]);
}

#[test]
fn duplicate_ids_keep_the_first_file() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("a.yml"), VALID_TEST_YAML).unwrap();
    fs::write(dir.path().join("b.yml"), VALID_TEST_YAML).unwrap();

    let results = loader.load_all().unwrap();
    assert_eq!(loaded_ids(&results), vec!["river-high"]);
    let dup = results.iter().find(|r| r.is_failed()).unwrap();
    assert!(dup.path.ends_with("b.yml"));
}

#[test]
fn load_all_replaces_previous_set() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("river-high.yml");
    fs::write(&path, VALID_TEST_YAML).unwrap();
    loader.load_all().unwrap();
    let first = loader.generation();

    fs::remove_file(&path).unwrap();
    loader.load_all().unwrap();
    assert!(loader.snapshot().is_empty());
    assert!(loader.generation() > first);
}

#[test]
fn new_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let loader = RuleLoader::new(nested.clone());
    assert!(nested.is_dir());
    assert_eq!(loader.rules_dir(), nested.as_path());
}

// ── Hot-reload event handling ───────────────────────────────────────

#[test]
fn fs_events_upsert_and_remove() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("river-high.yml");
    let start = loader.generation();

    fs::write(&path, VALID_TEST_YAML).unwrap();
    let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
    handle_fs_event(&created, loader.state());
    assert_eq!(loader.snapshot().len(), 1);
    assert!(loader.generation() > start);

    // edited in place: the id changes, the old one must go
    fs::write(&path, VALID_TEST_YAML.replace("id: river-high", "id: river-very-high")).unwrap();
    let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path(path.clone());
    handle_fs_event(&modified, loader.state());
    let ids: Vec<String> = loader.snapshot().iter().map(|d| d.metadata().id.clone()).collect();
    assert_eq!(ids, vec!["river-very-high"]);

    fs::remove_file(&path).unwrap();
    let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path);
    handle_fs_event(&removed, loader.state());
    assert!(loader.snapshot().is_empty());
}

#[test]
fn bad_edit_keeps_previous_version() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("river-high.yml");
    fs::write(&path, VALID_TEST_YAML).unwrap();
    loader.load_all().unwrap();
    let before = loader.generation();

    fs::write(&path, "apiVersion: v1\nkind: Test\n").unwrap();
    let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path(path);
    handle_fs_event(&modified, loader.state());

    assert_eq!(loader.snapshot().len(), 1);
    assert_eq!(loader.generation(), before);
}

#[test]
fn fs_events_ignore_dotfiles_and_other_extensions() {
    let (dir, loader) = temp_loader();
    let hidden = dir.path().join(".river-high.yml");
    let text = dir.path().join("notes.txt");
    fs::write(&hidden, VALID_TEST_YAML).unwrap();
    fs::write(&text, VALID_TEST_YAML).unwrap();

    let event = Event::new(EventKind::Create(CreateKind::File))
        .add_path(hidden)
        .add_path(text);
    handle_fs_event(&event, loader.state());
    assert!(loader.snapshot().is_empty());
}
