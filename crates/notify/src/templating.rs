//! Minijinja rendering of buffered result groups.
//!
//! Subject and body templates are arbitrary strings configured per action,
//! so a fresh [`minijinja::Environment`] is created per render call.

use chrono::NaiveDateTime;
use tsalarm_core::result::{group_test_id, group_timestamp};
use tsalarm_core::ResultGroup;

use crate::traits::DeliveryError;

/// Subject used when an action does not configure one.
pub const DEFAULT_SUBJECT_TEMPLATE: &str =
    "{% if action.severity %}[{{ action.severity | upper }}] {% endif %}{{ action.name }}: {{ count }} positive result group(s)";

/// Body used when an action does not configure one. Results are indented
/// two spaces per level.
pub const DEFAULT_BODY_TEMPLATE: &str = "{% for group in groups %}{{ group.test_id }} @ {{ group.timestamp }}
{% for r in group.results %}{{ r.indent }}{{ r.message }}
{% endfor %}{% endfor %}";

/// Context data available to delivery templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub action: ActionContext,
    pub groups: Vec<GroupContext>,
    /// Number of groups being delivered.
    pub count: usize,
    /// Delivery instant.
    pub now: String,
}

/// Action metadata exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionContext {
    pub id: String,
    pub name: String,
    pub severity: Option<String>,
}

/// One positive instant exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupContext {
    pub test_id: String,
    pub timestamp: String,
    pub results: Vec<ResultContext>,
}

/// One leveled result exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultContext {
    pub level: u32,
    pub indent: String,
    pub message: String,
    pub left_value: f64,
    pub right_value: f64,
    pub timestamp: String,
}

impl TemplateContext {
    pub fn new(action: ActionContext, groups: &[ResultGroup], now: NaiveDateTime) -> Self {
        let groups: Vec<GroupContext> = groups
            .iter()
            .map(|group| GroupContext {
                test_id: group_test_id(group).unwrap_or_default().to_string(),
                timestamp: group_timestamp(group)
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                results: group
                    .iter()
                    .map(|r| ResultContext {
                        level: r.level,
                        indent: "  ".repeat(r.level as usize),
                        message: r.message.clone(),
                        left_value: r.left_value,
                        right_value: r.right_value,
                        timestamp: r.timestamp.to_string(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            action,
            count: groups.len(),
            groups,
            now: now.to_string(),
        }
    }
}

/// Renders delivery templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, DeliveryError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| DeliveryError::Template(e.to_string()))
    }

    /// Check template syntax without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), DeliveryError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| DeliveryError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
