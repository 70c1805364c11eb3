//! Timeline aggregate root
//!
//! A timeline exclusively owns its stages and milestones (an arena keyed by
//! item id plus an ordered id list), their dependency edges, notification
//! configs and an event bus. Every item transition that goes through the
//! timeline is gated on the item's blocking dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{EventBus, EventKind, SubscriptionId, TimelineEvent, TimelineObserver};
use super::graph::{DependencyGraph, GraphError};
use super::id::{ItemId, TimelineId};
use super::item::{
    DateError, Dependency, DependencyType, ItemCore, ItemMeta, ItemStatus, TransitionError,
};
use super::milestone::Milestone;
use super::stage::{Stage, StageError};
use crate::notify::NotificationConfig;

/// Coarse classification of timeline errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request references something that does not exist or is malformed
    Structural,
    /// The request is well-formed but not allowed in the current state
    OperationRejected,
}

#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error("Duplicate item id: {0}")]
    DuplicateId(ItemId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(ItemId),

    #[error("Adding dependency would create a cycle: {0} -> {1}")]
    CycleDetected(ItemId, ItemId),

    #[error("'{0}' is not a {1}")]
    WrongKind(ItemId, &'static str),

    #[error(transparent)]
    InvalidDate(#[from] DateError),

    #[error(transparent)]
    Stage(StageError),

    #[error(transparent)]
    Graph(GraphError),

    #[error(transparent)]
    Rejected(#[from] TransitionError),

    #[error("Cannot {action} '{item}': waiting on {}", join_ids(.blockers))]
    DependenciesUnmet {
        item: ItemId,
        action: &'static str,
        blockers: Vec<ItemId>,
    },

    #[error("Cannot {action} timeline while it is {from}")]
    InvalidTimelineTransition {
        action: &'static str,
        from: ItemStatus,
    },
}

fn join_ids(ids: &[ItemId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl TimelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimelineError::Rejected(_)
            | TimelineError::DependenciesUnmet { .. }
            | TimelineError::InvalidTimelineTransition { .. } => ErrorKind::OperationRejected,
            _ => ErrorKind::Structural,
        }
    }
}

impl From<StageError> for TimelineError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Transition(t) => TimelineError::Rejected(t),
            other => TimelineError::Stage(other),
        }
    }
}

impl From<GraphError> for TimelineError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected(a, b) => TimelineError::CycleDetected(a, b),
            GraphError::ItemNotFound(id) => TimelineError::ItemNotFound(id),
            GraphError::SelfDependency(id) => TimelineError::SelfDependency(id),
            other => TimelineError::Graph(other),
        }
    }
}

/// Which lifecycle edge of an item a check is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    /// Starting a stage: FS and SS dependencies
    Start,
    /// Completing a stage: FF and SF dependencies
    Finish,
    /// Reaching a milestone: every blocking dependency
    Reach,
}

/// Blocking dependencies of `core` that are not satisfied under `statuses`
///
/// A target missing from `statuses` counts as unsatisfied.
pub(crate) fn unmet_dependencies(
    core: &ItemCore,
    statuses: &HashMap<ItemId, ItemStatus>,
    gate: Gate,
) -> Vec<ItemId> {
    core.dependencies
        .blocking()
        .filter(|dep| match gate {
            Gate::Start => dep.gates_start(),
            Gate::Finish => dep.gates_finish(),
            Gate::Reach => true,
        })
        .filter(|dep| {
            statuses
                .get(&dep.depends_on_id)
                .map(|s| !dep.is_satisfied_by(*s))
                .unwrap_or(true)
        })
        .map(|dep| dep.depends_on_id.clone())
        .collect()
}

/// An item owned by a timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    Stage(Stage),
    Milestone(Milestone),
}

impl TimelineItem {
    pub fn core(&self) -> &ItemCore {
        match self {
            TimelineItem::Stage(s) => &s.core,
            TimelineItem::Milestone(m) => &m.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut ItemCore {
        match self {
            TimelineItem::Stage(s) => &mut s.core,
            TimelineItem::Milestone(m) => &mut m.core,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.core().id
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn status(&self) -> ItemStatus {
        self.core().status
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            TimelineItem::Stage(_) => "stage",
            TimelineItem::Milestone(_) => "milestone",
        }
    }

    pub fn as_stage(&self) -> Option<&Stage> {
        match self {
            TimelineItem::Stage(s) => Some(s),
            TimelineItem::Milestone(_) => None,
        }
    }

    pub fn as_milestone(&self) -> Option<&Milestone> {
        match self {
            TimelineItem::Milestone(m) => Some(m),
            TimelineItem::Stage(_) => None,
        }
    }

    /// The gate that applies when this item finishes
    pub(crate) fn finish_gate(&self) -> Gate {
        match self {
            TimelineItem::Stage(_) => Gate::Finish,
            TimelineItem::Milestone(_) => Gate::Reach,
        }
    }

    /// The gate that decides whether a pending item is ready to go
    pub(crate) fn ready_gate(&self) -> Gate {
        match self {
            TimelineItem::Stage(_) => Gate::Start,
            TimelineItem::Milestone(_) => Gate::Reach,
        }
    }

    fn set_waiting(&mut self, waiting: bool) {
        match self {
            TimelineItem::Stage(s) => s.set_waiting(waiting),
            TimelineItem::Milestone(m) => m.set_waiting(waiting),
        }
    }
}

/// One deployment/rollout plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TimelineDocument", into = "TimelineDocument")]
pub struct Timeline {
    pub id: TimelineId,
    pub name: String,
    pub version: String,
    pub created_by: Option<String>,
    pub notifications: Vec<NotificationConfig>,
    pub metadata: ItemMeta,
    status: ItemStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    items: HashMap<ItemId, TimelineItem>,
    order: Vec<ItemId>,
    bus: EventBus,
}

impl Timeline {
    /// Creates a timeline with a generated id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = TimelineId::new(&name, Utc::now());
        Self::with_id(id, name)
    }

    pub fn with_id(id: TimelineId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            version: "1.0.0".to_string(),
            created_by: None,
            notifications: Vec::new(),
            metadata: ItemMeta::new(),
            status: ItemStatus::Pending,
            created_at: now,
            updated_at: now,
            items: HashMap::new(),
            order: Vec::new(),
            bus: EventBus::new(),
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn emit(&self, event: TimelineEvent) {
        debug!(timeline = %self.id, event = %event.kind(), "timeline event");
        self.bus.emit(&event);
    }

    // --- events ---

    /// Subscribes to one kind of event
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        observer: Arc<dyn TimelineObserver>,
    ) -> SubscriptionId {
        self.bus.subscribe(Some(kind), observer)
    }

    /// Subscribes to every event
    pub fn subscribe_all(&mut self, observer: Arc<dyn TimelineObserver>) -> SubscriptionId {
        self.bus.subscribe(None, observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // --- items ---

    fn insert(&mut self, item: TimelineItem) -> Result<ItemId, TimelineError> {
        let id = item.id().clone();
        if self.items.contains_key(&id) {
            return Err(TimelineError::DuplicateId(id));
        }
        self.items.insert(id.clone(), item);
        self.order.push(id.clone());
        self.touch();
        Ok(id)
    }

    pub fn add_stage(&mut self, stage: Stage) -> Result<(), TimelineError> {
        let item = self.insert(TimelineItem::Stage(stage))?;
        info!(timeline = %self.id, stage = %item, "stage added");
        self.emit(TimelineEvent::StageAdded {
            timeline: self.id.clone(),
            item,
        });
        Ok(())
    }

    pub fn add_milestone(&mut self, milestone: Milestone) -> Result<(), TimelineError> {
        let item = self.insert(TimelineItem::Milestone(milestone))?;
        info!(timeline = %self.id, milestone = %item, "milestone added");
        self.emit(TimelineEvent::MilestoneAdded {
            timeline: self.id.clone(),
            item,
        });
        Ok(())
    }

    pub fn get(&self, id: &ItemId) -> Option<&TimelineItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    fn require(&self, id: &ItemId) -> Result<&TimelineItem, TimelineError> {
        self.items
            .get(id)
            .ok_or_else(|| TimelineError::ItemNotFound(id.clone()))
    }

    fn require_mut(&mut self, id: &ItemId) -> Result<&mut TimelineItem, TimelineError> {
        self.items
            .get_mut(id)
            .ok_or_else(|| TimelineError::ItemNotFound(id.clone()))
    }

    pub fn stage(&self, id: &ItemId) -> Option<&Stage> {
        self.items.get(id).and_then(TimelineItem::as_stage)
    }

    pub fn milestone(&self, id: &ItemId) -> Option<&Milestone> {
        self.items.get(id).and_then(TimelineItem::as_milestone)
    }

    /// Mutable access to a stage's tasks, resources, metrics and flags
    ///
    /// Status changes made through this handle bypass dependency gating.
    pub fn stage_mut(&mut self, id: &ItemId) -> Result<&mut Stage, TimelineError> {
        self.touch();
        match self.require_mut(id)? {
            TimelineItem::Stage(s) => Ok(s),
            TimelineItem::Milestone(_) => Err(TimelineError::WrongKind(id.clone(), "stage")),
        }
    }

    pub fn milestone_mut(&mut self, id: &ItemId) -> Result<&mut Milestone, TimelineError> {
        self.touch();
        match self.require_mut(id)? {
            TimelineItem::Milestone(m) => Ok(m),
            TimelineItem::Stage(_) => Err(TimelineError::WrongKind(id.clone(), "milestone")),
        }
    }

    /// All items in insertion order
    pub fn items(&self) -> impl Iterator<Item = &TimelineItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.items().filter_map(TimelineItem::as_stage)
    }

    pub fn milestones(&self) -> impl Iterator<Item = &Milestone> {
        self.items().filter_map(TimelineItem::as_milestone)
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Current status of every item
    pub fn status_snapshot(&self) -> HashMap<ItemId, ItemStatus> {
        self.items
            .iter()
            .map(|(id, item)| (id.clone(), item.status()))
            .collect()
    }

    /// Builds the blocking dependency graph of the current state
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_items(self.items().map(TimelineItem::core))
    }

    // --- dependencies ---

    /// Adds a dependency: `item_id` depends on `depends_on_id`
    ///
    /// Cycles are not checked here; see [`Timeline::add_dependency_strict`].
    pub fn add_dependency(
        &mut self,
        item_id: &ItemId,
        depends_on_id: &ItemId,
        dep_type: DependencyType,
        is_blocker: bool,
    ) -> Result<(), TimelineError> {
        let mut dep = Dependency::new(depends_on_id.clone(), dep_type);
        dep.is_blocker = is_blocker;
        self.add_dependency_with(item_id, dep)
    }

    /// Adds a fully specified dependency (including lag)
    pub fn add_dependency_with(
        &mut self,
        item_id: &ItemId,
        dep: Dependency,
    ) -> Result<(), TimelineError> {
        self.check_edge(item_id, &dep)?;
        self.attach(item_id, dep)
    }

    /// Like [`Timeline::add_dependency_with`], but refuses blocking edges that close a cycle
    pub fn add_dependency_strict(
        &mut self,
        item_id: &ItemId,
        dep: Dependency,
    ) -> Result<(), TimelineError> {
        self.check_edge(item_id, &dep)?;
        if dep.is_blocker {
            let mut graph = self.dependency_graph();
            graph.add_dependency_checked(item_id, dep.clone())?;
        }
        self.attach(item_id, dep)
    }

    fn check_edge(&self, item_id: &ItemId, dep: &Dependency) -> Result<(), TimelineError> {
        self.require(item_id)?;
        self.require(&dep.depends_on_id)?;
        if item_id == &dep.depends_on_id {
            return Err(TimelineError::SelfDependency(item_id.clone()));
        }
        Ok(())
    }

    fn attach(&mut self, item_id: &ItemId, dep: Dependency) -> Result<(), TimelineError> {
        let depends_on = dep.depends_on_id.clone();
        let dep_type = dep.dep_type;
        let blocker = dep.is_blocker;
        self.require_mut(item_id)?.core_mut().dependencies.add(dep);
        self.touch();

        if blocker && self.dependency_graph().is_cyclic() {
            warn!(
                timeline = %self.id,
                item = %item_id,
                depends_on = %depends_on,
                "dependency introduces a cycle"
            );
        }

        self.emit(TimelineEvent::DependencyAdded {
            timeline: self.id.clone(),
            item: item_id.clone(),
            depends_on,
            dep_type,
        });
        Ok(())
    }

    /// Removes the dependency of `item_id` on `depends_on_id`
    pub fn remove_dependency(
        &mut self,
        item_id: &ItemId,
        depends_on_id: &ItemId,
    ) -> Result<bool, TimelineError> {
        let removed = self
            .require_mut(item_id)?
            .core_mut()
            .dependencies
            .remove(depends_on_id);
        if removed {
            self.touch();
            self.emit(TimelineEvent::DependencyRemoved {
                timeline: self.id.clone(),
                item: item_id.clone(),
                depends_on: depends_on_id.clone(),
            });
        }
        Ok(removed)
    }

    // --- gating ---

    fn unmet(&self, id: &ItemId, gate: Gate) -> Vec<ItemId> {
        match self.items.get(id) {
            Some(item) => unmet_dependencies(item.core(), &self.status_snapshot(), gate),
            None => Vec::new(),
        }
    }

    /// True if every blocking start gate (FS, SS) of the item is satisfied
    pub fn can_item_start(&self, id: &ItemId) -> bool {
        self.contains(id) && self.unmet(id, Gate::Start).is_empty()
    }

    /// True if the item's completion gates are satisfied
    ///
    /// Stages check FF and SF dependencies; milestones, which never start,
    /// check every blocking dependency.
    pub fn can_item_complete(&self, id: &ItemId) -> bool {
        match self.items.get(id) {
            Some(item) => self.unmet(id, item.finish_gate()).is_empty(),
            None => false,
        }
    }

    /// Pending items (in insertion order) that are ready under the given statuses
    pub(crate) fn ready_under(&self, statuses: &HashMap<ItemId, ItemStatus>) -> Vec<ItemId> {
        self.items()
            .filter(|item| {
                statuses
                    .get(item.id())
                    .copied()
                    .unwrap_or_else(|| item.status())
                    .is_pending()
            })
            .filter(|item| unmet_dependencies(item.core(), statuses, item.ready_gate()).is_empty())
            .map(|item| item.id().clone())
            .collect()
    }

    fn ready_set(&self) -> HashSet<ItemId> {
        self.ready_under(&self.status_snapshot()).into_iter().collect()
    }

    /// Runs an item transition, then emits status and readiness events
    fn transition<F>(&mut self, id: &ItemId, apply: F) -> Result<(), TimelineError>
    where
        F: FnOnce(&mut TimelineItem) -> Result<Option<TimelineEvent>, TimelineError>,
    {
        let ready_before = self.ready_set();
        let item = self.require_mut(id)?;
        let from = item.status();
        let event = apply(item)?;
        let to = item.status();
        self.touch();

        info!(timeline = %self.id, item = %id, %from, %to, "item status changed");
        if let Some(event) = event {
            self.emit(event);
        }
        self.emit(TimelineEvent::ItemStatusChanged {
            timeline: self.id.clone(),
            item: id.clone(),
            from,
            to,
        });

        let ready_after = self.ready_set();
        for ready in self.order.iter().filter(|i| {
            ready_after.contains(*i) && !ready_before.contains(*i) && *i != id
        }) {
            self.emit(TimelineEvent::DependencyReady {
                timeline: self.id.clone(),
                item: ready.clone(),
            });
        }
        Ok(())
    }

    fn stage_of<'a>(
        item: &'a mut TimelineItem,
        id: &ItemId,
    ) -> Result<&'a mut Stage, TimelineError> {
        match item {
            TimelineItem::Stage(s) => Ok(s),
            TimelineItem::Milestone(_) => Err(TimelineError::WrongKind(id.clone(), "stage")),
        }
    }

    fn milestone_of<'a>(
        item: &'a mut TimelineItem,
        id: &ItemId,
    ) -> Result<&'a mut Milestone, TimelineError> {
        match item {
            TimelineItem::Milestone(m) => Ok(m),
            TimelineItem::Stage(_) => Err(TimelineError::WrongKind(id.clone(), "milestone")),
        }
    }

    /// Starts a stage once its FS/SS dependencies allow it
    pub fn start_item(&mut self, id: &ItemId) -> Result<(), TimelineError> {
        self.start_item_at(id, Utc::now())
    }

    pub fn start_item_at(&mut self, id: &ItemId, at: DateTime<Utc>) -> Result<(), TimelineError> {
        if let TimelineItem::Milestone(_) = self.require(id)? {
            return Err(TimelineError::WrongKind(id.clone(), "stage"));
        }
        let blockers = self.unmet(id, Gate::Start);
        if !blockers.is_empty() {
            return Err(TimelineError::DependenciesUnmet {
                item: id.clone(),
                action: "start",
                blockers,
            });
        }
        let timeline = self.id.clone();
        self.transition(id, |item| {
            Self::stage_of(item, id)?.start_at(at)?;
            Ok(Some(TimelineEvent::StageStarted {
                timeline,
                item: id.clone(),
            }))
        })
    }

    /// Completes a stage, or reaches a milestone
    pub fn complete_item(&mut self, id: &ItemId) -> Result<(), TimelineError> {
        self.complete_item_at(id, Utc::now())
    }

    pub fn complete_item_at(
        &mut self,
        id: &ItemId,
        at: DateTime<Utc>,
    ) -> Result<(), TimelineError> {
        if let TimelineItem::Milestone(_) = self.require(id)? {
            return self.reach_milestone_at(id, at);
        }
        let blockers = self.unmet(id, Gate::Finish);
        if !blockers.is_empty() {
            return Err(TimelineError::DependenciesUnmet {
                item: id.clone(),
                action: "complete",
                blockers,
            });
        }
        let timeline = self.id.clone();
        self.transition(id, |item| {
            Self::stage_of(item, id)?.complete_at(at)?;
            Ok(Some(TimelineEvent::StageCompleted {
                timeline,
                item: id.clone(),
            }))
        })
    }

    pub fn fail_item(&mut self, id: &ItemId, reason: Option<&str>) -> Result<(), TimelineError> {
        let timeline = self.id.clone();
        self.transition(id, |item| match item {
            TimelineItem::Stage(s) => {
                s.fail(reason)?;
                Ok(Some(TimelineEvent::StageFailed {
                    timeline,
                    item: id.clone(),
                }))
            }
            TimelineItem::Milestone(m) => {
                m.miss(reason)?;
                Ok(Some(TimelineEvent::MilestoneMissed {
                    timeline,
                    item: id.clone(),
                }))
            }
        })
    }

    pub fn pause_item(&mut self, id: &ItemId, reason: Option<&str>) -> Result<(), TimelineError> {
        self.transition(id, |item| {
            Self::stage_of(item, id)?.pause(reason)?;
            Ok(None)
        })
    }

    pub fn resume_item(&mut self, id: &ItemId) -> Result<(), TimelineError> {
        self.transition(id, |item| {
            Self::stage_of(item, id)?.resume()?;
            Ok(None)
        })
    }

    pub fn cancel_item(&mut self, id: &ItemId, reason: Option<&str>) -> Result<(), TimelineError> {
        self.transition(id, |item| {
            match item {
                TimelineItem::Stage(s) => s.cancel(reason)?,
                TimelineItem::Milestone(m) => m.cancel(reason)?,
            }
            Ok(None)
        })
    }

    /// Marks an item Delayed and re-plans its end (or target) date
    pub fn delay_item(
        &mut self,
        id: &ItemId,
        new_end: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), TimelineError> {
        self.transition(id, |item| {
            match item {
                TimelineItem::Stage(s) => s.delay(new_end, reason)?,
                TimelineItem::Milestone(m) => m.delay(new_end, reason)?,
            }
            Ok(None)
        })
    }

    /// Reaches a milestone once every blocking dependency is satisfied
    pub fn reach_milestone(&mut self, id: &ItemId) -> Result<(), TimelineError> {
        self.reach_milestone_at(id, Utc::now())
    }

    pub fn reach_milestone_at(
        &mut self,
        id: &ItemId,
        at: DateTime<Utc>,
    ) -> Result<(), TimelineError> {
        if let TimelineItem::Stage(_) = self.require(id)? {
            return Err(TimelineError::WrongKind(id.clone(), "milestone"));
        }
        let blockers = self.unmet(id, Gate::Reach);
        if !blockers.is_empty() {
            return Err(TimelineError::DependenciesUnmet {
                item: id.clone(),
                action: "reach",
                blockers,
            });
        }
        let timeline = self.id.clone();
        self.transition(id, |item| {
            Self::milestone_of(item, id)?.reach_at(at)?;
            Ok(Some(TimelineEvent::MilestoneReached {
                timeline,
                item: id.clone(),
            }))
        })
    }

    pub fn miss_milestone(
        &mut self,
        id: &ItemId,
        reason: Option<&str>,
    ) -> Result<(), TimelineError> {
        if let TimelineItem::Stage(_) = self.require(id)? {
            return Err(TimelineError::WrongKind(id.clone(), "milestone"));
        }
        self.fail_item(id, reason)
    }

    /// Moves blocked Pending items to Waiting and unblocked Waiting items back
    ///
    /// Returns the ids whose status changed.
    pub fn refresh_waiting(&mut self) -> Vec<ItemId> {
        let statuses = self.status_snapshot();
        let mut changed = Vec::new();

        for id in &self.order {
            let Some(item) = self.items.get_mut(id) else {
                continue;
            };
            let gate = item.ready_gate();
            let blocked = !unmet_dependencies(item.core(), &statuses, gate).is_empty();
            let before = item.status();
            item.set_waiting(blocked);
            if item.status() != before {
                changed.push(id.clone());
            }
        }

        if !changed.is_empty() {
            self.touch();
        }
        changed
    }

    // --- timeline lifecycle ---

    /// Naive progress: completed stages over all stages (0 with no stages)
    pub fn calculate_progress(&self) -> f64 {
        let total = self.stages().count();
        if total == 0 {
            return 0.0;
        }
        let done = self.stages().filter(|s| s.status().is_complete()).count();
        done as f64 / total as f64 * 100.0
    }

    /// Pending -> InProgress
    pub fn start(&mut self) -> Result<(), TimelineError> {
        if self.status != ItemStatus::Pending {
            return Err(TimelineError::InvalidTimelineTransition {
                action: "start",
                from: self.status,
            });
        }
        self.status = ItemStatus::InProgress;
        self.touch();
        info!(timeline = %self.id, "timeline started");
        self.emit(TimelineEvent::TimelineStarted {
            timeline: self.id.clone(),
        });
        Ok(())
    }

    /// InProgress -> Completed
    pub fn complete(&mut self) -> Result<(), TimelineError> {
        if self.status != ItemStatus::InProgress {
            return Err(TimelineError::InvalidTimelineTransition {
                action: "complete",
                from: self.status,
            });
        }
        self.status = ItemStatus::Completed;
        self.touch();
        info!(timeline = %self.id, "timeline completed");
        self.emit(TimelineEvent::TimelineCompleted {
            timeline: self.id.clone(),
        });
        Ok(())
    }
}

/// Persisted shape of a timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDocument {
    pub id: TimelineId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
    #[serde(default)]
    pub metadata: ItemMeta,
    /// Insertion order across stages and milestones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_order: Vec<ItemId>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl From<Timeline> for TimelineDocument {
    fn from(mut timeline: Timeline) -> Self {
        let mut stages = Vec::new();
        let mut milestones = Vec::new();
        for id in &timeline.order {
            match timeline.items.remove(id) {
                Some(TimelineItem::Stage(s)) => stages.push(s),
                Some(TimelineItem::Milestone(m)) => milestones.push(m),
                None => {}
            }
        }
        Self {
            id: timeline.id,
            name: timeline.name,
            version: timeline.version,
            status: timeline.status,
            created_at: timeline.created_at,
            updated_at: timeline.updated_at,
            created_by: timeline.created_by,
            stages,
            milestones,
            notifications: timeline.notifications,
            metadata: timeline.metadata,
            item_order: timeline.order,
        }
    }
}

impl TryFrom<TimelineDocument> for Timeline {
    type Error = TimelineError;

    fn try_from(doc: TimelineDocument) -> Result<Self, Self::Error> {
        let mut items = HashMap::new();
        let mut order = Vec::new();

        let all = doc
            .stages
            .into_iter()
            .map(TimelineItem::Stage)
            .chain(doc.milestones.into_iter().map(TimelineItem::Milestone));
        for item in all {
            let id = item.id().clone();
            if items.insert(id.clone(), item).is_some() {
                return Err(TimelineError::DuplicateId(id));
            }
            order.push(id);
        }

        // Honour the recorded order when it names exactly the same items
        if doc.item_order.len() == order.len()
            && doc.item_order.iter().all(|id| items.contains_key(id))
            && doc.item_order.iter().collect::<HashSet<_>>().len() == order.len()
        {
            order = doc.item_order;
        }

        Ok(Self {
            id: doc.id,
            name: doc.name,
            version: doc.version,
            created_by: doc.created_by,
            notifications: doc.notifications,
            metadata: doc.metadata,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            items,
            order,
            bus: EventBus::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage::StageTask;
    use std::sync::Mutex;

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn release() -> Timeline {
        let mut tl = Timeline::with_id("release-v1".parse().unwrap(), "Release v1");
        tl.add_stage(Stage::new(id("build"), "Build")).unwrap();
        tl.add_stage(Stage::new(id("test"), "Test")).unwrap();
        tl.add_milestone(Milestone::new(id("ready"), "Ready")).unwrap();
        tl.add_dependency(&id("test"), &id("build"), DependencyType::FinishToStart, true)
            .unwrap();
        tl.add_dependency(&id("ready"), &id("test"), DependencyType::FinishToStart, true)
            .unwrap();
        tl
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut tl = release();
        let err = tl.add_stage(Stage::new(id("build"), "Again")).unwrap_err();
        assert_eq!(err, TimelineError::DuplicateId(id("build")));
        assert_eq!(err.kind(), ErrorKind::Structural);

        // ids are shared across stages and milestones
        assert!(tl.add_milestone(Milestone::new(id("test"), "Test")).is_err());
        assert_eq!(tl.len(), 3);
    }

    #[test]
    fn dependency_on_unknown_item_rejected() {
        let mut tl = release();
        let err = tl
            .add_dependency(&id("build"), &id("ghost"), DependencyType::FinishToStart, true)
            .unwrap_err();
        assert_eq!(err, TimelineError::ItemNotFound(id("ghost")));

        let err = tl
            .add_dependency(&id("build"), &id("build"), DependencyType::FinishToStart, true)
            .unwrap_err();
        assert_eq!(err, TimelineError::SelfDependency(id("build")));
    }

    #[test]
    fn finish_to_start_gates_start() {
        let mut tl = release();
        assert!(tl.can_item_start(&id("build")));
        assert!(!tl.can_item_start(&id("test")));

        let err = tl.start_item(&id("test")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationRejected);
        assert!(matches!(err, TimelineError::DependenciesUnmet { ref blockers, .. } if blockers == &vec![id("build")]));

        tl.start_item(&id("build")).unwrap();
        assert!(!tl.can_item_start(&id("test")));
        tl.complete_item(&id("build")).unwrap();
        assert!(tl.can_item_start(&id("test")));
    }

    #[test]
    fn start_to_start_needs_target_running() {
        let mut tl = Timeline::new("SS");
        tl.add_stage(Stage::new(id("a"), "A")).unwrap();
        tl.add_stage(Stage::new(id("b"), "B")).unwrap();
        tl.add_dependency(&id("b"), &id("a"), DependencyType::StartToStart, true)
            .unwrap();

        assert!(!tl.can_item_start(&id("b")));
        tl.start_item(&id("a")).unwrap();
        assert!(tl.can_item_start(&id("b")));
    }

    #[test]
    fn finish_to_finish_gates_completion_only() {
        let mut tl = Timeline::new("FF");
        tl.add_stage(Stage::new(id("a"), "A")).unwrap();
        tl.add_stage(Stage::new(id("b"), "B")).unwrap();
        tl.add_dependency(&id("b"), &id("a"), DependencyType::FinishToFinish, true)
            .unwrap();

        assert!(tl.can_item_start(&id("b")));
        tl.start_item(&id("b")).unwrap();
        assert!(!tl.can_item_complete(&id("b")));
        assert!(tl.complete_item(&id("b")).is_err());

        tl.start_item(&id("a")).unwrap();
        tl.complete_item(&id("a")).unwrap();
        tl.complete_item(&id("b")).unwrap();
    }

    #[test]
    fn start_to_finish_needs_target_started() {
        let mut tl = Timeline::new("SF");
        tl.add_stage(Stage::new(id("a"), "A")).unwrap();
        tl.add_stage(Stage::new(id("b"), "B")).unwrap();
        tl.add_dependency(&id("b"), &id("a"), DependencyType::StartToFinish, true)
            .unwrap();

        tl.start_item(&id("b")).unwrap();
        assert!(!tl.can_item_complete(&id("b")));
        tl.start_item(&id("a")).unwrap();
        assert!(tl.can_item_complete(&id("b")));
    }

    #[test]
    fn advisory_dependency_does_not_gate() {
        let mut tl = Timeline::new("Advisory");
        tl.add_stage(Stage::new(id("a"), "A")).unwrap();
        tl.add_stage(Stage::new(id("b"), "B")).unwrap();
        tl.add_dependency(&id("b"), &id("a"), DependencyType::FinishToStart, false)
            .unwrap();
        assert!(tl.can_item_start(&id("b")));
    }

    #[test]
    fn milestone_reach_waits_for_dependencies() {
        let mut tl = release();
        let err = tl.reach_milestone(&id("ready")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationRejected);
        assert!(!tl.can_item_complete(&id("ready")));

        tl.start_item(&id("build")).unwrap();
        tl.complete_item(&id("build")).unwrap();
        tl.start_item(&id("test")).unwrap();
        tl.complete_item(&id("test")).unwrap();

        assert!(tl.can_item_complete(&id("ready")));
        tl.reach_milestone(&id("ready")).unwrap();
        assert_eq!(tl.get(&id("ready")).unwrap().status(), ItemStatus::Completed);
    }

    #[test]
    fn wrong_kind_operations_rejected() {
        let mut tl = release();
        assert_eq!(
            tl.start_item(&id("ready")),
            Err(TimelineError::WrongKind(id("ready"), "stage"))
        );
        assert_eq!(
            tl.reach_milestone(&id("build")),
            Err(TimelineError::WrongKind(id("build"), "milestone"))
        );
    }

    #[test]
    fn illegal_item_transition_is_reported() {
        let mut tl = release();
        let err = tl.complete_item(&id("build")).unwrap_err();
        assert!(matches!(err, TimelineError::Rejected(_)));
        assert_eq!(tl.get(&id("build")).unwrap().status(), ItemStatus::Pending);
    }

    #[test]
    fn timeline_start_and_complete_are_strict() {
        let mut tl = release();
        assert!(tl.complete().is_err());
        tl.start().unwrap();
        assert!(matches!(
            tl.start(),
            Err(TimelineError::InvalidTimelineTransition { action: "start", .. })
        ));
        tl.complete().unwrap();
        assert_eq!(tl.status(), ItemStatus::Completed);
    }

    #[test]
    fn events_are_delivered_synchronously() {
        let mut tl = release();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tl.subscribe_all(Arc::new(move |e: &TimelineEvent| {
            sink.lock().unwrap().push(e.kind())
        }));

        tl.start_item(&id("build")).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::StageStarted, EventKind::ItemStatusChanged]
        );

        tl.complete_item(&id("build")).unwrap();
        let kinds = seen.lock().unwrap().clone();
        assert_eq!(
            &kinds[2..],
            &[
                EventKind::StageCompleted,
                EventKind::ItemStatusChanged,
                EventKind::DependencyReady
            ]
        );
    }

    #[test]
    fn dependency_ready_names_unblocked_item() {
        let mut tl = release();
        let ready = Arc::new(Mutex::new(Vec::new()));
        let sink = ready.clone();
        tl.subscribe(
            EventKind::DependencyReady,
            Arc::new(move |e: &TimelineEvent| {
                sink.lock().unwrap().push(e.item().cloned().unwrap())
            }),
        );

        tl.start_item(&id("build")).unwrap();
        tl.complete_item(&id("build")).unwrap();
        assert_eq!(*ready.lock().unwrap(), vec![id("test")]);
    }

    #[test]
    fn refresh_waiting_round_trip() {
        let mut tl = release();
        let changed = tl.refresh_waiting();
        assert_eq!(changed, vec![id("test"), id("ready")]);
        assert_eq!(tl.get(&id("test")).unwrap().status(), ItemStatus::Waiting);

        tl.start_item(&id("build")).unwrap();
        tl.complete_item(&id("build")).unwrap();
        assert_eq!(tl.refresh_waiting(), vec![id("test")]);
        assert_eq!(tl.get(&id("test")).unwrap().status(), ItemStatus::Pending);

        // waiting items can start directly once unblocked
        tl.refresh_waiting();
        tl.start_item(&id("test")).unwrap();
    }

    #[test]
    fn strict_dependency_rejects_cycle() {
        let mut tl = release();
        let err = tl
            .add_dependency_strict(&id("build"), Dependency::finish_to_start(id("ready")))
            .unwrap_err();
        assert_eq!(err, TimelineError::CycleDetected(id("build"), id("ready")));
        assert!(!tl.get(&id("build")).unwrap().core().dependencies.contains(&id("ready")));

        // lazy insertion accepts it
        tl.add_dependency_with(&id("build"), Dependency::finish_to_start(id("ready")))
            .unwrap();
        assert!(tl.dependency_graph().is_cyclic());
    }

    #[test]
    fn remove_dependency_unblocks() {
        let mut tl = release();
        assert!(tl.remove_dependency(&id("test"), &id("build")).unwrap());
        assert!(!tl.remove_dependency(&id("test"), &id("build")).unwrap());
        assert!(tl.can_item_start(&id("test")));
    }

    #[test]
    fn naive_progress() {
        let mut tl = release();
        assert_eq!(tl.calculate_progress(), 0.0);
        tl.start_item(&id("build")).unwrap();
        tl.complete_item(&id("build")).unwrap();
        assert_eq!(tl.calculate_progress(), 50.0);
        assert_eq!(Timeline::new("Empty").calculate_progress(), 0.0);
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let mut tl = release();
        tl.created_by = Some("ci".into());
        tl.stage_mut(&id("build"))
            .unwrap()
            .add_task(StageTask::new("t1", "compile").with_estimate(3.0))
            .unwrap();
        tl.start_item(&id("build")).unwrap();

        let json = serde_json::to_string(&tl).unwrap();
        let parsed: Timeline = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, tl.id);
        assert_eq!(parsed.item_ids(), tl.item_ids());
        assert_eq!(parsed.stages().count(), 2);
        assert_eq!(parsed.milestones().count(), 1);
        for item in tl.items() {
            assert_eq!(parsed.get(item.id()), Some(item));
        }
        assert_eq!(parsed.created_at(), tl.created_at());
        assert_eq!(parsed.created_by.as_deref(), Some("ci"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["createdAt"].is_string());
        assert_eq!(value["stages"][1]["dependencies"][0]["dependsOnId"], "build");
    }

    #[test]
    fn deserializing_duplicate_ids_fails() {
        let json = r#"{
            "id": "tl-dup", "name": "Dup",
            "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z",
            "stages": [{"id": "a", "name": "A"}],
            "milestones": [{"id": "a", "name": "A again"}]
        }"#;
        assert!(serde_json::from_str::<Timeline>(json).is_err());
    }
}
