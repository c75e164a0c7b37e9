//! Expression tree evaluator.
//!
//! A tree is a closed sum type: [`Side`] is either an operator node
//! ([`Expression`]) or a leaf ([`Function`]). Evaluation caches each node's
//! value so a positive evaluation can be explained node by node.

mod expression;
mod function;
mod message;
mod operator;

pub use expression::{Expression, PositiveContext, Side};
pub use function::{Function, FunctionKind, WILDCARD};
pub use message::{format_datetime, format_value, substitute};
pub use operator::{is_truthy, Operator};
