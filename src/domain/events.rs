//! Timeline event bus
//!
//! Observers subscribe to one event kind or to all events. Delivery is
//! synchronous and in subscription order, immediately after the mutation
//! that produced the event.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::id::{ItemId, TimelineId};
use super::item::{DependencyType, ItemStatus};

/// Something that happened to a timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimelineEvent {
    StageAdded { timeline: TimelineId, item: ItemId },
    MilestoneAdded { timeline: TimelineId, item: ItemId },
    DependencyAdded {
        timeline: TimelineId,
        item: ItemId,
        depends_on: ItemId,
        dep_type: DependencyType,
    },
    DependencyRemoved {
        timeline: TimelineId,
        item: ItemId,
        depends_on: ItemId,
    },
    TimelineStarted { timeline: TimelineId },
    TimelineCompleted { timeline: TimelineId },
    StageStarted { timeline: TimelineId, item: ItemId },
    StageCompleted { timeline: TimelineId, item: ItemId },
    StageFailed { timeline: TimelineId, item: ItemId },
    MilestoneReached { timeline: TimelineId, item: ItemId },
    MilestoneMissed { timeline: TimelineId, item: ItemId },
    ItemStatusChanged {
        timeline: TimelineId,
        item: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    },
    /// An item's start gates became satisfied
    DependencyReady { timeline: TimelineId, item: ItemId },
}

/// Discriminant of [`TimelineEvent`], used as a subscription topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StageAdded,
    MilestoneAdded,
    DependencyAdded,
    DependencyRemoved,
    TimelineStarted,
    TimelineCompleted,
    StageStarted,
    StageCompleted,
    StageFailed,
    MilestoneReached,
    MilestoneMissed,
    ItemStatusChanged,
    DependencyReady,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StageAdded => "stage_added",
            EventKind::MilestoneAdded => "milestone_added",
            EventKind::DependencyAdded => "dependency_added",
            EventKind::DependencyRemoved => "dependency_removed",
            EventKind::TimelineStarted => "timeline_started",
            EventKind::TimelineCompleted => "timeline_completed",
            EventKind::StageStarted => "stage_started",
            EventKind::StageCompleted => "stage_completed",
            EventKind::StageFailed => "stage_failed",
            EventKind::MilestoneReached => "milestone_reached",
            EventKind::MilestoneMissed => "milestone_missed",
            EventKind::ItemStatusChanged => "item_status_changed",
            EventKind::DependencyReady => "dependency_ready",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TimelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TimelineEvent::StageAdded { .. } => EventKind::StageAdded,
            TimelineEvent::MilestoneAdded { .. } => EventKind::MilestoneAdded,
            TimelineEvent::DependencyAdded { .. } => EventKind::DependencyAdded,
            TimelineEvent::DependencyRemoved { .. } => EventKind::DependencyRemoved,
            TimelineEvent::TimelineStarted { .. } => EventKind::TimelineStarted,
            TimelineEvent::TimelineCompleted { .. } => EventKind::TimelineCompleted,
            TimelineEvent::StageStarted { .. } => EventKind::StageStarted,
            TimelineEvent::StageCompleted { .. } => EventKind::StageCompleted,
            TimelineEvent::StageFailed { .. } => EventKind::StageFailed,
            TimelineEvent::MilestoneReached { .. } => EventKind::MilestoneReached,
            TimelineEvent::MilestoneMissed { .. } => EventKind::MilestoneMissed,
            TimelineEvent::ItemStatusChanged { .. } => EventKind::ItemStatusChanged,
            TimelineEvent::DependencyReady { .. } => EventKind::DependencyReady,
        }
    }

    /// The item the event is about, if any
    pub fn item(&self) -> Option<&ItemId> {
        match self {
            TimelineEvent::StageAdded { item, .. }
            | TimelineEvent::MilestoneAdded { item, .. }
            | TimelineEvent::DependencyAdded { item, .. }
            | TimelineEvent::DependencyRemoved { item, .. }
            | TimelineEvent::StageStarted { item, .. }
            | TimelineEvent::StageCompleted { item, .. }
            | TimelineEvent::StageFailed { item, .. }
            | TimelineEvent::MilestoneReached { item, .. }
            | TimelineEvent::MilestoneMissed { item, .. }
            | TimelineEvent::ItemStatusChanged { item, .. }
            | TimelineEvent::DependencyReady { item, .. } => Some(item),
            TimelineEvent::TimelineStarted { .. } | TimelineEvent::TimelineCompleted { .. } => None,
        }
    }
}

/// Receives timeline events
pub trait TimelineObserver: Send + Sync {
    fn on_event(&self, event: &TimelineEvent);
}

impl<F> TimelineObserver for F
where
    F: Fn(&TimelineEvent) + Send + Sync,
{
    fn on_event(&self, event: &TimelineEvent) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    observer: Arc<dyn TimelineObserver>,
}

/// Ordered list of subscriptions owned by one timeline
#[derive(Default, Clone)]
pub struct EventBus {
    subscriptions: Vec<Arc<Subscription>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one kind (`Some`) or every event (`None`)
    pub fn subscribe(
        &mut self,
        kind: Option<EventKind>,
        observer: Arc<dyn TimelineObserver>,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Arc::new(Subscription { id, kind, observer }));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn emit(&self, event: &TimelineEvent) {
        let kind = event.kind();
        for sub in &self.subscriptions {
            if sub.kind.is_none_or(|k| k == kind) {
                sub.observer.on_event(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
