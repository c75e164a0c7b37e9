//! Time-series alarm rules: expression trees, tests and their scheduling.
//!
//! This crate provides:
//! - The Side/Expression/Function evaluator with positive-result explanation
//! - `Test`: schedule, active season and the per-pass run loop
//! - YAML `Test` / `Action` documents and the builder that validates them
//! - Wildcard expansion against the data source's identifiers
//! - Filesystem loader with hot-reload via `notify` watcher
//! - `Engine` that ticks tests and actions

pub mod builder;
pub mod engine;
pub mod error;
pub mod expr;
pub mod loader;
pub mod schema;
pub mod season;
pub mod test;
pub mod wildcard;

pub use builder::{build_rule_set, RuleSet};
pub use engine::{Engine, TickReport};
pub use error::{Result, RuleError};
pub use loader::{LoadResult, LoadStatus, RuleLoader};
pub use season::ActiveSeason;
pub use test::Test;
