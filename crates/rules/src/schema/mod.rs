//! YAML document schema with serde deserialization.
//!
//! - `RuleEnvelope`: lightweight first-pass header (apiVersion, kind, metadata)
//! - `RuleDocument`: enum dispatching to kind-specific types
//! - `TestRule`: schedule, season, threshold and the typed expression tree
//! - `ActionRule`: buffering, retention and delivery channel

mod action;
mod document;
mod envelope;
mod kind;
mod metadata;

pub use action::*;
pub use document::*;
pub use envelope::*;
pub use kind::*;
pub use metadata::*;
pub use test::*;

#[cfg(test)]
mod tests;
