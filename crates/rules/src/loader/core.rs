//! Core [`RuleLoader`] struct: filesystem-backed document loading with optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::error::{Result, RuleError};
use crate::schema::{RuleDocument, RuleEnvelope};

use super::status::{LoadResult, LoadStatus};
use super::watcher::handle_fs_event;

/// State shared between the loader and its watcher callback.
#[derive(Debug, Clone, Default)]
pub(super) struct SharedState {
    /// All documents keyed by `metadata.id`.
    pub(super) documents: Arc<RwLock<HashMap<String, RuleDocument>>>,
    /// Which file each document came from.
    pub(super) sources: Arc<RwLock<HashMap<PathBuf, String>>>,
    /// Bumped on every change to `documents`.
    pub(super) generation: Arc<AtomicU64>,
}

impl SharedState {
    pub(super) fn upsert(&self, path: &Path, doc: RuleDocument) {
        let id = doc.metadata().id.clone();
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        // a file whose id changed leaves its old id behind
        if let Some(old_id) = sources.insert(path.to_path_buf(), id.clone()) {
            if old_id != id {
                documents.remove(&old_id);
            }
        }
        documents.insert(id, doc);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove whatever document `path` provided; returns its id.
    pub(super) fn remove_path(&self, path: &Path) -> Option<String> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let id = sources.remove(path)?;
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Some(id)
    }
}

/// Filesystem-backed document loader with optional hot-reload.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, deserializes
/// them into [`RuleDocument`] instances via two-pass deserialization, and
/// maintains an in-memory map keyed by document ID.
pub struct RuleLoader {
    /// Root directory containing rule YAML files.
    rules_dir: PathBuf,
    state: SharedState,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            state: SharedState::default(),
            _watcher: None,
        }
    }

    /// Recursively scan the rules directory and replace the in-memory set.
    ///
    /// Dotfiles (filenames starting with `.`) and non-YAML files are skipped.
    /// Parse errors and duplicate ids are reported per-file but do not abort
    /// the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let mut found: Vec<(PathBuf, RuleDocument)> = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut found, &mut results)?;

        let mut documents = HashMap::new();
        let mut sources = HashMap::new();
        for (path, doc) in found {
            let rule_id = doc.metadata().id.clone();
            if documents.contains_key(&rule_id) {
                warn!(rule_id = %rule_id, path = %path.display(), "duplicate rule id, file ignored");
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Failed {
                        error: format!("duplicate rule id '{rule_id}'"),
                    },
                });
                continue;
            }
            info!(rule_id = %rule_id, kind = %doc.kind(), path = %path.display(), "loaded rule");
            sources.insert(path.clone(), rule_id.clone());
            documents.insert(rule_id.clone(), doc);
            results.push(LoadResult {
                path,
                status: LoadStatus::Loaded { rule_id },
            });
        }

        *self.state.sources.write().unwrap_or_else(PoisonError::into_inner) = sources;
        *self.state.documents.write().unwrap_or_else(PoisonError::into_inner) = documents;
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        Ok(results)
    }

    /// Recursively scan a directory for YAML rule files.
    fn scan_dir_recursive(
        &self,
        dir: &Path,
        found: &mut Vec<(PathBuf, RuleDocument)>,
        results: &mut Vec<LoadResult>,
    ) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        // stable order so duplicate ids resolve the same way every time
        paths.sort();

        for path in paths {
            // Skip dotfiles/dotdirs
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            // Recurse into subdirectories
            if path.is_dir() {
                self.scan_dir_recursive(&path, found, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(doc) => found.push((path, doc)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse a single YAML file into a [`RuleDocument`] via two-pass deserialization.
    ///
    /// First pass: deserialize as [`RuleEnvelope`] to read the `kind` field.
    /// Second pass: reconstruct and deserialize into the kind-specific type.
    pub fn load_file(&self, path: &Path) -> Result<RuleDocument> {
        let contents = fs::read_to_string(path)?;
        parse_document(&contents)
    }

    /// Start a filesystem watcher with 500ms debounce.
    ///
    /// On file create/modify the document is re-parsed and upserted.
    /// On file delete the document is removed from the in-memory map.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let state = self.state.clone();

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => handle_fs_event(&event, &state),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        // Watch recursively to pick up changes in subdirectories.
        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;

        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.rules_dir.display(), "watching rules directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Get the rules directory path.
    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Get the shared documents map containing all kinds.
    pub fn documents(&self) -> Arc<RwLock<HashMap<String, RuleDocument>>> {
        Arc::clone(&self.state.documents)
    }

    /// Copy of the current documents, ordered by id.
    pub fn snapshot(&self) -> Vec<RuleDocument> {
        let documents = self.state.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut docs: Vec<RuleDocument> = documents.values().cloned().collect();
        docs.sort_by(|a, b| a.metadata().id.cmp(&b.metadata().id));
        docs
    }

    /// Changes seen so far; compare against a remembered value to detect reloads.
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> &SharedState {
        &self.state
    }
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

pub(super) fn parse_document(contents: &str) -> Result<RuleDocument> {
    // First pass: extract envelope (kind + metadata).
    let envelope: RuleEnvelope = serde_yaml::from_str(contents)?;

    if envelope.metadata.id.trim().is_empty() {
        return Err(RuleError::Validation(
            "rule metadata.id must not be empty".to_string(),
        ));
    }

    // Second pass: deserialize into kind-specific type.
    envelope.parse_full().map_err(|e| {
        RuleError::Validation(format!(
            "failed to parse rule '{}': {}",
            envelope.metadata.id, e
        ))
    })
}
