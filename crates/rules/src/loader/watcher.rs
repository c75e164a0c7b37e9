//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;

use notify::event::ModifyKind;
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::core::{is_yaml, parse_document, SharedState};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, state: &SharedState) {
    for path in &event.paths {
        if !is_yaml(path) {
            continue;
        }

        // Skip dotfiles (editor swap and temp files)
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        match &event.kind {
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any) => {
                // a rename away from the watched name arrives as a modify
                if !path.exists() {
                    remove(state, path);
                    continue;
                }
                match fs::read_to_string(path) {
                    Ok(contents) => match parse_document(&contents) {
                        Ok(doc) => {
                            info!(
                                rule_id = %doc.metadata().id,
                                kind = %doc.kind(),
                                path = %path.display(),
                                "hot-reloaded rule"
                            );
                            state.upsert(path, doc);
                        }
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                error = %e,
                                "failed to parse rule during hot-reload, keeping previous version"
                            );
                        }
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read file during hot-reload");
                    }
                }
            }
            EventKind::Remove(_) => remove(state, path),
            _ => {}
        }
    }
}

fn remove(state: &SharedState, path: &std::path::Path) {
    if let Some(rule_id) = state.remove_path(path) {
        info!(rule_id = %rule_id, path = %path.display(), "removed rule after file deletion");
    }
}
