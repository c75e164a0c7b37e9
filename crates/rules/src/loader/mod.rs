//! Filesystem rule loader with hot-reload via `notify` watcher.
//!
//! Watches the rules directory for YAML file changes (create, modify, delete)
//! and reloads affected documents into the in-memory set. Every change bumps
//! a generation counter so the engine knows when to rebuild.

mod core;
mod status;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::RuleLoader;
pub use self::status::{LoadResult, LoadStatus};
