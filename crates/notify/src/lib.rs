//! Actions and delivery channels for positive test results.
//!
//! This crate provides:
//! - `Action`: buffers result groups and delivers them on its own schedule
//! - `Delivery` trait with log, webhook and process channels
//! - Minijinja rendering of notification subject and body
//! - `Dispatcher` that runs due actions

pub mod action;
pub mod dispatcher;
pub mod log;
pub mod process;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use action::{Action, Severity, SharedAction};
pub use dispatcher::Dispatcher;
pub use log::LogDelivery;
pub use process::ProcessDelivery;
pub use traits::{Delivery, DeliveryError, DispatchResult, Notification};
pub use webhook::{AlarmPayload, WebhookDelivery};
