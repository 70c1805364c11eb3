//! Channel handlers
//!
//! A handler delivers one rendered notification and reports success. Real
//! transports (SMTP, Slack, webhooks) are registered by the host; the crate
//! ships a console handler and an in-memory recorder.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

use super::config::{Channel, Trigger};
use crate::domain::{ItemId, TimelineId};

/// A notification ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNotification {
    pub timeline: TimelineId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemId>,
    pub trigger: Trigger,
    pub channel: Channel,
    pub recipients: Vec<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_config: Option<serde_json::Value>,
}

/// Per-delivery information passed to handlers
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext {
    /// Point after which the service stops waiting for the handler
    pub deadline: Instant,
}

impl DispatchContext {
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Delivers notifications for one channel
///
/// Handlers run on a blocking thread, so they may perform synchronous I/O.
/// They should give up once `ctx.deadline` has passed.
pub trait NotificationHandler: Send + Sync {
    fn send(&self, notification: &RenderedNotification, ctx: &DispatchContext) -> bool;
}

impl<F> NotificationHandler for F
where
    F: Fn(&RenderedNotification) -> bool + Send + Sync,
{
    fn send(&self, notification: &RenderedNotification, _ctx: &DispatchContext) -> bool {
        self(notification)
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHandler;

impl NotificationHandler for ConsoleHandler {
    fn send(&self, n: &RenderedNotification, _ctx: &DispatchContext) -> bool {
        info!(
            timeline = %n.timeline,
            item = n.item.as_ref().map(|i| i.as_str()).unwrap_or("-"),
            trigger = %n.trigger,
            recipients = ?n.recipients,
            "{}",
            n.message
        );
        true
    }
}

/// Keeps every notification in memory
#[derive(Debug)]
pub struct RecordingHandler {
    sent: Mutex<Vec<RenderedNotification>>,
    succeed: bool,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            succeed: true,
        }
    }

    /// A recorder that reports every delivery as failed
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            succeed: false,
        }
    }

    pub fn sent(&self) -> Vec<RenderedNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.message).collect()
    }
}

impl NotificationHandler for RecordingHandler {
    fn send(&self, notification: &RenderedNotification, _ctx: &DispatchContext) -> bool {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        self.succeed
    }
}
