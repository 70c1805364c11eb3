//! Notification dispatch
//!
//! Matches timeline events against a timeline's notification configs,
//! renders templates and hands the result to the channel's handler. Each
//! delivery runs on tokio's blocking pool under a timeout; a handler that
//! panics or stalls fails only its own delivery.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::{Channel, NotificationConfig, Trigger};
use super::handlers::{DispatchContext, NotificationHandler, RenderedNotification};
use super::template::{render, TemplateContext};
use crate::domain::{ItemId, Timeline, TimelineEvent, TimelineItem};

#[derive(Debug, Error, PartialEq)]
pub enum NotificationError {
    #[error("No handler registered for channel '{0}'")]
    MissingHandler(Channel),

    #[error("Handler for '{channel}' timed out after {}ms", .timeout.as_millis())]
    Timeout { channel: Channel, timeout: Duration },

    #[error("Handler for '{0}' panicked")]
    HandlerPanicked(Channel),

    #[error("Handler for '{0}' was cancelled: {1}")]
    Cancelled(Channel, String),

    #[error("Background dispatch needs a running tokio runtime")]
    NoRuntime,
}

/// Result of one delivery attempt
#[derive(Debug)]
pub struct DispatchOutcome {
    pub trigger: Trigger,
    pub channel: Channel,
    pub item: Option<ItemId>,
    pub result: Result<bool, NotificationError>,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self.result, Ok(true))
    }
}

/// Routes notifications to channel handlers
pub struct NotificationService {
    handlers: HashMap<Channel, Arc<dyn NotificationHandler>>,
    timeout: Duration,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationService {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers the handler for a channel, returning the one it replaces
    pub fn register_handler(
        &mut self,
        channel: Channel,
        handler: Arc<dyn NotificationHandler>,
    ) -> Option<Arc<dyn NotificationHandler>> {
        self.handlers.insert(channel, handler)
    }

    pub fn has_handler(&self, channel: Channel) -> bool {
        self.handlers.contains_key(&channel)
    }

    /// Values exposed to templates as `${timeline.*}` and `${item.*}`
    pub fn template_context(timeline: &Timeline, item: Option<&TimelineItem>) -> TemplateContext {
        TemplateContext {
            item: item.map(|i| serde_json::to_value(i).unwrap_or_default()),
            timeline: json!({
                "id": timeline.id,
                "name": timeline.name,
                "version": timeline.version,
                "status": timeline.status(),
                "createdBy": timeline.created_by,
                "progress": timeline.calculate_progress(),
                "itemCount": timeline.len(),
                "metadata": serde_json::to_value(&timeline.metadata).unwrap_or(Value::Null),
            }),
        }
    }

    pub fn render(
        config: &NotificationConfig,
        timeline: &Timeline,
        item: Option<&TimelineItem>,
    ) -> RenderedNotification {
        let context = Self::template_context(timeline, item);
        RenderedNotification {
            timeline: timeline.id.clone(),
            item: item.map(|i| i.id().clone()),
            trigger: config.trigger.clone(),
            channel: config.channel,
            recipients: config.recipients.clone().unwrap_or_default(),
            message: render(&config.template, &context),
            channel_config: config.channel_config.clone(),
        }
    }

    /// Renders and delivers one config, ignoring its trigger and condition
    pub async fn send_notification(
        &self,
        config: &NotificationConfig,
        timeline: &Timeline,
        item: Option<&TimelineItem>,
    ) -> Result<bool, NotificationError> {
        self.deliver(Self::render(config, timeline, item)).await
    }

    /// Runs the channel handler under the configured timeout
    pub async fn deliver(&self, notification: RenderedNotification) -> Result<bool, NotificationError> {
        let channel = notification.channel;
        let handler = self
            .handlers
            .get(&channel)
            .cloned()
            .ok_or(NotificationError::MissingHandler(channel))?;

        debug!(
            timeline = %notification.timeline,
            %channel,
            trigger = %notification.trigger,
            "delivering notification"
        );

        let ctx = DispatchContext {
            deadline: Instant::now() + self.timeout,
        };
        let task = tokio::task::spawn_blocking(move || handler.send(&notification, &ctx));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(delivered)) => {
                if !delivered {
                    warn!(%channel, "handler reported delivery failure");
                }
                Ok(delivered)
            }
            Ok(Err(err)) if err.is_panic() => {
                warn!(%channel, "notification handler panicked");
                Err(NotificationError::HandlerPanicked(channel))
            }
            Ok(Err(err)) => Err(NotificationError::Cancelled(channel, err.to_string())),
            Err(_) => {
                warn!(%channel, timeout_ms = self.timeout.as_millis() as u64, "notification handler timed out");
                Err(NotificationError::Timeout {
                    channel,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Renders every config whose trigger and condition match
    pub fn prepare(
        &self,
        timeline: &Timeline,
        trigger: &Trigger,
        item: Option<&ItemId>,
    ) -> Vec<RenderedNotification> {
        let item = item.and_then(|id| timeline.get(id));
        timeline
            .notifications
            .iter()
            .filter(|config| config.matches(trigger, item))
            .map(|config| Self::render(config, timeline, item))
            .collect()
    }

    /// Renders the notifications a timeline event fires
    pub fn prepare_event(&self, timeline: &Timeline, event: &TimelineEvent) -> Vec<RenderedNotification> {
        match Trigger::for_event(event) {
            Some(trigger) => self.prepare(timeline, &trigger, event.item()),
            None => Vec::new(),
        }
    }

    /// Delivers each notification in order; failures are reported, not raised
    pub async fn deliver_all(&self, notifications: Vec<RenderedNotification>) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(notifications.len());
        for notification in notifications {
            let trigger = notification.trigger.clone();
            let channel = notification.channel;
            let item = notification.item.clone();
            let result = self.deliver(notification).await;
            if let Err(err) = &result {
                warn!(%trigger, %channel, error = %err, "notification not delivered");
            }
            outcomes.push(DispatchOutcome {
                trigger,
                channel,
                item,
                result,
            });
        }
        outcomes
    }

    pub async fn dispatch_event(
        &self,
        timeline: &Timeline,
        event: &TimelineEvent,
    ) -> Vec<DispatchOutcome> {
        let prepared = self.prepare_event(timeline, event);
        self.deliver_all(prepared).await
    }

    /// Fires `custom:{name}` configs
    pub async fn dispatch_custom(
        &self,
        timeline: &Timeline,
        name: &str,
        item: Option<&ItemId>,
    ) -> Vec<DispatchOutcome> {
        let prepared = self.prepare(timeline, &Trigger::Custom(name.to_string()), item);
        self.deliver_all(prepared).await
    }

    /// Fire-and-forget dispatch on the current tokio runtime
    ///
    /// Templates are rendered before returning, so later timeline changes
    /// do not leak into the messages.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        timeline: &Timeline,
        event: &TimelineEvent,
    ) -> Result<JoinHandle<Vec<DispatchOutcome>>, NotificationError> {
        let runtime = Handle::try_current().map_err(|_| NotificationError::NoRuntime)?;
        let prepared = self.prepare_event(timeline, event);
        let service = Arc::clone(self);
        Ok(runtime.spawn(async move { service.deliver_all(prepared).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Milestone, Priority, Stage};
    use crate::notify::{Condition, RecordingHandler};
    use std::sync::Mutex;

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn timeline() -> Timeline {
        let mut tl = Timeline::with_id("tl-release".parse().unwrap(), "Release v1");
        let mut canary = Stage::new(id("canary"), "Canary");
        canary.core.priority = Priority::High;
        tl.add_stage(canary).unwrap();
        tl.add_stage(Stage::new(id("docs"), "Docs")).unwrap();
        tl.add_milestone(Milestone::new(id("ga"), "GA")).unwrap();
        tl
    }

    fn record_events(tl: &mut Timeline) -> Arc<Mutex<Vec<TimelineEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        tl.subscribe_all(Arc::new(move |e: &TimelineEvent| {
            sink.lock().unwrap().push(e.clone())
        }));
        events
    }

    fn service_with(channel: Channel, handler: Arc<dyn NotificationHandler>) -> NotificationService {
        let mut service = NotificationService::new();
        service.register_handler(channel, handler);
        service
    }

    #[tokio::test]
    async fn renders_and_sends() {
        let tl = timeline();
        let recorder = Arc::new(RecordingHandler::new());
        let service = service_with(Channel::Slack, recorder.clone());

        let config = NotificationConfig::new(
            Trigger::StageStart,
            Channel::Slack,
            "${timeline.name}: ${item.name} (${item.priority}) ${item.unknown}",
        )
        .with_recipients(vec!["#releases".into()]);

        let sent = service
            .send_notification(&config, &tl, tl.get(&id("canary")))
            .await
            .unwrap();
        assert!(sent);

        let notes = recorder.sent();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "Release v1: Canary (high) ${item.unknown}");
        assert_eq!(notes[0].recipients, vec!["#releases".to_string()]);
        assert_eq!(notes[0].item, Some(id("canary")));
    }

    #[tokio::test]
    async fn missing_handler_is_an_error() {
        let tl = timeline();
        let service = NotificationService::new();
        let config = NotificationConfig::new(Trigger::TimelineStart, Channel::Email, "hi");
        assert_eq!(
            service.send_notification(&config, &tl, None).await,
            Err(NotificationError::MissingHandler(Channel::Email))
        );
    }

    #[tokio::test]
    async fn handler_failure_is_reported() {
        let tl = timeline();
        let service = service_with(Channel::Sms, Arc::new(RecordingHandler::failing()));
        let config = NotificationConfig::new(Trigger::TimelineStart, Channel::Sms, "hi");
        assert_eq!(service.send_notification(&config, &tl, None).await, Ok(false));
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let tl = timeline();
        let service = service_with(
            Channel::Webhook,
            Arc::new(|_: &RenderedNotification| -> bool { panic!("boom") }),
        );
        let config = NotificationConfig::new(Trigger::TimelineStart, Channel::Webhook, "hi");
        assert_eq!(
            service.send_notification(&config, &tl, None).await,
            Err(NotificationError::HandlerPanicked(Channel::Webhook))
        );
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let tl = timeline();
        let service = service_with(
            Channel::Webhook,
            Arc::new(|_: &RenderedNotification| {
                std::thread::sleep(Duration::from_millis(300));
                true
            }),
        )
        .with_timeout(Duration::from_millis(20));
        let config = NotificationConfig::new(Trigger::TimelineStart, Channel::Webhook, "hi");
        assert!(matches!(
            service.send_notification(&config, &tl, None).await,
            Err(NotificationError::Timeout { channel: Channel::Webhook, .. })
        ));
    }

    #[tokio::test]
    async fn dispatch_filters_by_trigger_and_condition() {
        let mut tl = timeline();
        tl.notifications.push(
            NotificationConfig::new(Trigger::StageStart, Channel::Console, "started ${item.id}")
                .with_condition(Condition::PriorityAtLeast {
                    priority: Priority::High,
                }),
        );
        tl.notifications.push(NotificationConfig::new(
            Trigger::StageComplete,
            Channel::Console,
            "completed ${item.id}",
        ));
        let events = record_events(&mut tl);

        tl.start_item(&id("canary")).unwrap();
        tl.start_item(&id("docs")).unwrap();

        let recorder = Arc::new(RecordingHandler::new());
        let service = service_with(Channel::Console, recorder.clone());
        let events = events.lock().unwrap().clone();
        for event in &events {
            service.dispatch_event(&tl, event).await;
        }

        // docs is Medium priority, and nothing completed
        assert_eq!(recorder.messages(), vec!["started canary".to_string()]);
    }

    #[tokio::test]
    async fn dispatch_reports_missing_handler_without_failing() {
        let mut tl = timeline();
        tl.notifications.push(NotificationConfig::new(
            Trigger::TimelineStart,
            Channel::Email,
            "${timeline.name} started",
        ));
        tl.notifications.push(NotificationConfig::new(
            Trigger::TimelineStart,
            Channel::Console,
            "${timeline.name} started",
        ));
        let events = record_events(&mut tl);
        tl.start().unwrap();

        let recorder = Arc::new(RecordingHandler::new());
        let service = service_with(Channel::Console, recorder.clone());
        let event = events.lock().unwrap()[0].clone();
        let outcomes = service.dispatch_event(&tl, &event).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].result,
            Err(NotificationError::MissingHandler(Channel::Email))
        );
        assert!(outcomes[1].delivered());
        assert_eq!(recorder.messages(), vec!["Release v1 started".to_string()]);
    }

    #[tokio::test]
    async fn custom_triggers_fire_by_name() {
        let mut tl = timeline();
        tl.notifications.push(NotificationConfig::new(
            Trigger::Custom("rollback".into()),
            Channel::Console,
            "rolling back ${item.name}",
        ));
        let recorder = Arc::new(RecordingHandler::new());
        let service = service_with(Channel::Console, recorder.clone());

        assert!(service.dispatch_custom(&tl, "other", None).await.is_empty());
        let outcomes = service
            .dispatch_custom(&tl, "rollback", Some(&id("canary")))
            .await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(recorder.messages(), vec!["rolling back Canary".to_string()]);
    }

    #[tokio::test]
    async fn spawn_dispatch_runs_in_background() {
        let mut tl = timeline();
        tl.notifications.push(NotificationConfig::new(
            Trigger::MilestoneReached,
            Channel::Console,
            "${item.name} reached",
        ));
        let events = record_events(&mut tl);
        tl.reach_milestone(&id("ga")).unwrap();

        let recorder = Arc::new(RecordingHandler::new());
        let service = Arc::new(service_with(Channel::Console, recorder.clone()));
        let event = events.lock().unwrap()[0].clone();

        let handle = service.spawn_dispatch(&tl, &event).unwrap();
        let outcomes = handle.await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(recorder.messages(), vec!["GA reached".to_string()]);
    }

    #[test]
    fn spawn_dispatch_without_runtime() {
        let tl = timeline();
        let service = Arc::new(NotificationService::new());
        let event = TimelineEvent::TimelineStarted {
            timeline: tl.id.clone(),
        };
        assert!(matches!(
            service.spawn_dispatch(&tl, &event),
            Err(NotificationError::NoRuntime)
        ));
    }
}
