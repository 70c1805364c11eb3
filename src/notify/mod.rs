//! # Notifications
//!
//! Rules attached to a timeline ([`NotificationConfig`]) fire on lifecycle
//! triggers, optionally filtered by a declarative [`Condition`]. The
//! [`NotificationService`] renders `${item.*}` / `${timeline.*}` templates
//! and delivers them through per-channel [`NotificationHandler`]s.

mod config;
mod handlers;
mod service;
mod template;

pub use config::{Channel, Condition, NotificationConfig, Trigger};
pub use handlers::{
    ConsoleHandler, DispatchContext, NotificationHandler, RecordingHandler, RenderedNotification,
};
pub use service::{DispatchOutcome, NotificationError, NotificationService};
pub use template::{render, TemplateContext};
