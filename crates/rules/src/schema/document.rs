//! Multi-kind document container and accessors.

use super::{ActionRule, CommonMetadata, RuleKind, TestRule};

/// A fully deserialized document of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    Test(TestRule),
    Action(ActionRule),
}

impl RuleDocument {
    /// Get the document's metadata regardless of kind.
    pub fn metadata(&self) -> &CommonMetadata {
        match self {
            RuleDocument::Test(rule) => &rule.metadata,
            RuleDocument::Action(rule) => &rule.metadata,
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            RuleDocument::Test(_) => RuleKind::Test,
            RuleDocument::Action(_) => RuleKind::Action,
        }
    }

    pub fn as_test(&self) -> Option<&TestRule> {
        match self {
            RuleDocument::Test(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionRule> {
        match self {
            RuleDocument::Action(rule) => Some(rule),
            _ => None,
        }
    }

    /// Serialize this document to YAML, delegating to the inner type.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        match self {
            RuleDocument::Test(r) => serde_yaml::to_string(r),
            RuleDocument::Action(r) => serde_yaml::to_string(r),
        }
    }
}
