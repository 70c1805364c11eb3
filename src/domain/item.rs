//! Shared timeline item model
//!
//! Stages and milestones share the same core: identity, status, priority,
//! planned/actual dates, ownership, typed dependencies and metadata.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::id::ItemId;

/// Lifecycle status shared by stages, milestones and timelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Waiting,
    Delayed,
    Paused,
    Cancelled,
}

impl ItemStatus {
    /// Returns true if this status represents successful completion
    pub fn is_complete(&self) -> bool {
        matches!(self, ItemStatus::Completed)
    }

    /// Returns true for Completed, Failed and Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    /// Returns true if the item has not been started yet
    pub fn is_pending(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Waiting)
    }

    /// Returns true if the item is currently being worked on
    pub fn is_active(&self) -> bool {
        matches!(self, ItemStatus::InProgress)
    }

    /// Returns true if the item is running or finished successfully
    pub fn has_started(&self) -> bool {
        matches!(self, ItemStatus::InProgress | ItemStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Waiting => "waiting",
            ItemStatus::Delayed => "delayed",
            ItemStatus::Paused => "paused",
            ItemStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "in_progress" | "in-progress" | "inprogress" => Ok(ItemStatus::InProgress),
            "completed" | "complete" | "done" => Ok(ItemStatus::Completed),
            "failed" => Ok(ItemStatus::Failed),
            "waiting" => Ok(ItemStatus::Waiting),
            "delayed" => Ok(ItemStatus::Delayed),
            "paused" => Ok(ItemStatus::Paused),
            "cancelled" | "canceled" => Ok(ItemStatus::Cancelled),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Priority of an item; ordering follows urgency (Low < Critical)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Numeric rank used for weighting (Low=1 .. Critical=4)
    pub fn rank(&self) -> u32 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Scheduling relationship between an item and the item it depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Target must complete before this item can start
    #[default]
    FinishToStart,
    /// Target must have started before this item can start
    StartToStart,
    /// Target must complete before this item can complete
    FinishToFinish,
    /// Target must have started before this item can complete
    StartToFinish,
}

impl DependencyType {
    /// Returns true if this dependency gates starting the dependent item
    pub fn gates_start(&self) -> bool {
        matches!(self, DependencyType::FinishToStart | DependencyType::StartToStart)
    }

    /// Returns true if this dependency gates completing the dependent item
    pub fn gates_finish(&self) -> bool {
        !self.gates_start()
    }

    /// Returns true if the target needs to be finished (rather than started)
    pub fn requires_target_finish(&self) -> bool {
        matches!(
            self,
            DependencyType::FinishToStart | DependencyType::FinishToFinish
        )
    }

    /// Returns a short label for the dependency type
    pub fn label(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "FS",
            DependencyType::StartToStart => "SS",
            DependencyType::FinishToFinish => "FF",
            DependencyType::StartToFinish => "SF",
        }
    }
}

impl std::str::FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fs" | "finish_to_start" => Ok(DependencyType::FinishToStart),
            "ss" | "start_to_start" => Ok(DependencyType::StartToStart),
            "ff" | "finish_to_finish" => Ok(DependencyType::FinishToFinish),
            "sf" | "start_to_finish" => Ok(DependencyType::StartToFinish),
            _ => Err(format!("Unknown dependency type: {}", s)),
        }
    }
}

/// A typed dependency on another item in the same timeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// The item this depends on
    pub depends_on_id: ItemId,

    #[serde(rename = "type", default)]
    pub dep_type: DependencyType,

    /// Lag in hours (negative for lead). Only schedule estimation uses it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_hours: Option<i64>,

    /// Non-blocking dependencies are informational only
    #[serde(default = "default_blocker")]
    pub is_blocker: bool,
}

fn default_blocker() -> bool {
    true
}

impl Dependency {
    /// Creates a blocking dependency of the given type
    pub fn new(depends_on_id: ItemId, dep_type: DependencyType) -> Self {
        Self {
            depends_on_id,
            dep_type,
            delay_hours: None,
            is_blocker: true,
        }
    }

    /// Creates a blocking finish-to-start dependency
    pub fn finish_to_start(depends_on_id: ItemId) -> Self {
        Self::new(depends_on_id, DependencyType::FinishToStart)
    }

    /// Marks the dependency as informational
    pub fn advisory(mut self) -> Self {
        self.is_blocker = false;
        self
    }

    pub fn with_delay_hours(mut self, hours: i64) -> Self {
        self.delay_hours = Some(hours);
        self
    }

    /// Returns the lag as a duration (zero when unset)
    pub fn lag(&self) -> Duration {
        Duration::hours(self.delay_hours.unwrap_or(0))
    }

    /// Returns true if this blocking dependency gates starting the dependent
    pub fn gates_start(&self) -> bool {
        self.is_blocker && self.dep_type.gates_start()
    }

    /// Returns true if this blocking dependency gates completing the dependent
    pub fn gates_finish(&self) -> bool {
        self.is_blocker && self.dep_type.gates_finish()
    }

    /// Returns true if the target's status satisfies this dependency
    pub fn is_satisfied_by(&self, target: ItemStatus) -> bool {
        if self.dep_type.requires_target_finish() {
            target.is_complete()
        } else {
            target.has_started()
        }
    }
}

/// Ordered collection of dependencies for one item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dependencies(Vec<Dependency>);

impl Dependencies {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds a dependency; an existing edge to the same target is replaced
    pub fn add(&mut self, dep: Dependency) -> bool {
        if let Some(existing) = self
            .0
            .iter_mut()
            .find(|d| d.depends_on_id == dep.depends_on_id)
        {
            if *existing == dep {
                return false;
            }
            *existing = dep;
            return true;
        }
        self.0.push(dep);
        true
    }

    /// Removes the dependency on the given item
    pub fn remove(&mut self, item_id: &ItemId) -> bool {
        let len_before = self.0.len();
        self.0.retain(|d| &d.depends_on_id != item_id);
        self.0.len() != len_before
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.0.iter()
    }

    /// Returns only blocking dependencies
    pub fn blocking(&self) -> impl Iterator<Item = &Dependency> {
        self.0.iter().filter(|d| d.is_blocker)
    }

    /// Checks if a specific item ID exists as a dependency
    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.0.iter().any(|d| &d.depends_on_id == item_id)
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&Dependency> {
        self.0.iter().find(|d| &d.depends_on_id == item_id)
    }
}

impl<'a> IntoIterator for &'a Dependencies {
    type Item = &'a Dependency;
    type IntoIter = std::slice::Iter<'a, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Metadata for an item - extensible key-value pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemMeta(HashMap<String, serde_json::Value>);

impl ItemMeta {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// A refused lifecycle transition
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Cannot {action} '{item}' while it is {from}")]
pub struct TransitionError {
    pub item: ItemId,
    pub action: &'static str,
    pub from: ItemStatus,
}

impl TransitionError {
    pub fn new(item: &ItemId, action: &'static str, from: ItemStatus) -> Self {
        Self {
            item: item.clone(),
            action,
            from,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid date '{0}': expected RFC 3339 (2025-01-31T12:00:00Z) or YYYY-MM-DD")]
pub struct DateError(pub String);

/// Parses an RFC 3339 timestamp or a plain date (midnight UTC)
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, DateError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DateError(input.to_string()))
}

/// Fields shared by every timeline item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCore {
    pub id: ItemId,

    pub name: String,

    #[serde(default)]
    pub status: ItemStatus,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default)]
    pub dependencies: Dependencies,

    #[serde(default)]
    pub metadata: ItemMeta,
}

impl ItemCore {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ItemStatus::Pending,
            priority: Priority::Medium,
            planned_start_date: None,
            planned_end_date: None,
            actual_start_date: None,
            actual_end_date: None,
            owner: None,
            dependencies: Dependencies::new(),
            metadata: ItemMeta::new(),
        }
    }

    /// Planned duration, when both planned dates are known
    pub fn planned_duration(&self) -> Option<Duration> {
        match (self.planned_start_date, self.planned_end_date) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }

    /// Records a status change, stamping `actual_end_date` on terminal statuses
    pub(crate) fn transition(&mut self, to: ItemStatus, at: DateTime<Utc>) {
        self.status = to;
        if to.is_terminal() {
            self.actual_end_date = Some(at);
        }
    }

    /// Stores a human-readable reason under `{key}_reason`
    pub(crate) fn record_reason(&mut self, key: &str, reason: Option<&str>) {
        if let Some(reason) = reason {
            self.metadata.set(format!("{}_reason", key), reason);
        }
    }
}
