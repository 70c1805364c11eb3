//! Per-invocation state shared by timeline commands
//!
//! Opens the workspace, resolves which timeline a command targets, and runs
//! mutations as load / apply / save, dispatching the notifications the
//! mutation's events trigger.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};

use super::output::Output;
use crate::domain::{ItemId, Timeline, TimelineError, TimelineEvent, TimelineId};
use crate::notify::{Channel, DispatchOutcome, NotificationService, RenderedNotification};
use crate::storage::{JsonFileRepository, SharedTimelines, TimelineRepository, Workspace};

/// Prints console notifications to stderr, keeping stdout for command output
fn print_notification(notification: &RenderedNotification) -> bool {
    eprintln!("[notify:{}] {}", notification.channel, notification.message);
    true
}

pub struct Session<'a> {
    pub workspace: Workspace,
    pub output: &'a Output,
    timelines: SharedTimelines<JsonFileRepository>,
    selected: Option<String>,
}

impl<'a> Session<'a> {
    /// Opens the workspace containing the current directory
    pub fn open(output: &'a Output, selected: Option<String>) -> Result<Self> {
        let workspace = Workspace::open_current()?;
        output.verbose_ctx(
            "session",
            &format!("Opened workspace at: {}", workspace.root().display()),
        );
        let timelines = SharedTimelines::new(workspace.repository());
        Ok(Self {
            workspace,
            output,
            timelines,
            selected,
        })
    }

    pub fn repository(&self) -> &JsonFileRepository {
        self.timelines.repository()
    }

    /// The timeline a command targets: `--timeline`, else the only one stored
    pub fn timeline_id(&self) -> Result<TimelineId> {
        if let Some(raw) = &self.selected {
            return raw
                .parse()
                .with_context(|| format!("Invalid timeline id: {}", raw));
        }

        let mut timelines = self.repository().list_timelines()?;
        match timelines.len() {
            0 => bail!("No timelines yet. Create one with 'timeline new <name>'."),
            1 => Ok(timelines.remove(0).id),
            n => bail!(
                "{} timelines in this workspace; pick one with --timeline <id>",
                n
            ),
        }
    }

    pub fn load(&self) -> Result<Timeline> {
        let id = self.timeline_id()?;
        Ok(self.timelines.read(&id)?)
    }

    pub fn parse_item(raw: &str) -> Result<ItemId> {
        raw.parse()
            .with_context(|| format!("Invalid item id: {}", raw))
    }

    /// Applies `apply` to the selected timeline, saves it and fires notifications
    pub fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Timeline) -> Result<T, TimelineError>,
    {
        let id = self.timeline_id()?;
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let (value, snapshot) = self.timelines.update(&id, move |timeline| {
            let subscription = timeline.subscribe_all(Arc::new(move |event: &TimelineEvent| {
                if let Ok(mut events) = sink.lock() {
                    events.push(event.clone());
                }
            }));
            let result = apply(timeline);
            timeline.unsubscribe(subscription);
            result.map(|value| (value, timeline.clone()))
        })?;

        let events = events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default();
        self.output
            .verbose_ctx("session", &format!("{} event(s) emitted", events.len()));
        self.dispatch(&snapshot, &events)?;
        Ok(value)
    }

    /// Service with the console channel wired to stderr
    pub fn notification_service(&self) -> NotificationService {
        let settings = self.workspace.config().notifications();
        let mut service = NotificationService::new().with_timeout(settings.timeout());
        service.register_handler(Channel::Console, Arc::new(print_notification));
        service
    }

    /// Delivers notifications for `events`; delivery failures are warnings
    pub fn dispatch(&self, timeline: &Timeline, events: &[TimelineEvent]) -> Result<()> {
        if timeline.notifications.is_empty() || events.is_empty() {
            return Ok(());
        }

        let service = self.notification_service();
        let outcomes = runtime()?.block_on(async {
            let mut outcomes = Vec::new();
            for event in events {
                outcomes.extend(service.dispatch_event(timeline, event).await);
            }
            outcomes
        });
        self.report(&outcomes);
        Ok(())
    }

    pub fn report(&self, outcomes: &[DispatchOutcome]) {
        for outcome in outcomes {
            match &outcome.result {
                Ok(true) => self.output.verbose_ctx(
                    "notify",
                    &format!("{} sent via {}", outcome.trigger, outcome.channel),
                ),
                Ok(false) => self.output.warn(&format!(
                    "{} notification via {} was not delivered",
                    outcome.trigger, outcome.channel
                )),
                Err(err) => self.output.warn(&err.to_string()),
            }
        }
    }
}

/// Single-threaded runtime for one command's deliveries
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start notification runtime")
}
