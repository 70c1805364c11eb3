//! Stage domain model
//!
//! A stage is a bounded phase of a rollout (build, canary, regional deploy).
//! It owns its tasks, resource allocations, metrics and the feature-flag and
//! A/B-test identifiers it carries for downstream services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use super::id::ItemId;
use super::item::{ItemCore, ItemStatus, TransitionError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    #[error("Duplicate {kind} id in stage: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("No {kind} with id '{id}' in stage")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A unit of work inside a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,
}

impl StageTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            completed: false,
            assignee: None,
            estimated_hours: None,
            actual_hours: None,
        }
    }

    pub fn with_estimate(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }
}

/// A person or team allocated to a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub role: String,
    pub allocation_percentage: f64,
}

/// A measurable signal tracked during a stage (error rate, latency, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Value bound to a feature flag for the duration of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Variant(String),
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Variant(value.to_string())
    }
}

/// A deployment phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(flatten)]
    pub core: ItemCore,

    #[serde(default)]
    pub tasks: Vec<StageTask>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub metrics: Vec<Metric>,

    #[serde(default)]
    pub feature_flags: BTreeMap<String, FlagValue>,

    #[serde(default)]
    pub ab_tests: Vec<String>,
}

impl Stage {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            core: ItemCore::new(id, name),
            tasks: Vec::new(),
            resources: Vec::new(),
            metrics: Vec::new(),
            feature_flags: BTreeMap::new(),
            ab_tests: Vec::new(),
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.core.id
    }

    pub fn status(&self) -> ItemStatus {
        self.core.status
    }

    fn is_started(&self) -> bool {
        self.core.actual_start_date.is_some()
    }

    /// Running, or delayed after having started
    fn is_running(&self) -> bool {
        match self.core.status {
            ItemStatus::InProgress => true,
            ItemStatus::Delayed => self.is_started(),
            _ => false,
        }
    }

    fn reject(&self, action: &'static str) -> TransitionError {
        TransitionError::new(&self.core.id, action, self.core.status)
    }

    // --- lifecycle ---

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.start_at(Utc::now())
    }

    /// Pending/Waiting (or Delayed before start) -> InProgress
    pub fn start_at(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        let startable = match self.core.status {
            ItemStatus::Pending | ItemStatus::Waiting => true,
            ItemStatus::Delayed => !self.is_started(),
            _ => false,
        };
        if !startable {
            return Err(self.reject("start"));
        }
        self.core.transition(ItemStatus::InProgress, at);
        self.core.actual_start_date = Some(at);
        debug!(stage = %self.core.id, "stage started");
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.complete_at(Utc::now())
    }

    pub fn complete_at(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.is_running() {
            return Err(self.reject("complete"));
        }
        self.core.transition(ItemStatus::Completed, at);
        debug!(stage = %self.core.id, "stage completed");
        Ok(())
    }

    pub fn fail(&mut self, reason: Option<&str>) -> Result<(), TransitionError> {
        if !self.is_running() {
            return Err(self.reject("fail"));
        }
        self.core.record_reason("failure", reason);
        self.core.transition(ItemStatus::Failed, Utc::now());
        Ok(())
    }

    pub fn pause(&mut self, reason: Option<&str>) -> Result<(), TransitionError> {
        if !self.is_running() {
            return Err(self.reject("pause"));
        }
        self.core.record_reason("pause", reason);
        self.core.transition(ItemStatus::Paused, Utc::now());
        Ok(())
    }

    /// Paused -> InProgress
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        if self.core.status != ItemStatus::Paused {
            return Err(self.reject("resume"));
        }
        self.core.transition(ItemStatus::InProgress, Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<&str>) -> Result<(), TransitionError> {
        if self.core.status.is_terminal() {
            return Err(self.reject("cancel"));
        }
        self.core.record_reason("cancellation", reason);
        self.core.transition(ItemStatus::Cancelled, Utc::now());
        Ok(())
    }

    /// Marks the stage Delayed and re-plans its end date
    pub fn delay(
        &mut self,
        new_end: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), TransitionError> {
        if self.core.status.is_terminal() {
            return Err(self.reject("delay"));
        }
        self.core.record_reason("delay", reason);
        self.core.planned_end_date = Some(new_end);
        self.core.transition(ItemStatus::Delayed, Utc::now());
        Ok(())
    }

    /// Pending <-> Waiting bookkeeping used by the timeline
    pub(crate) fn set_waiting(&mut self, waiting: bool) {
        match (self.core.status, waiting) {
            (ItemStatus::Pending, true) => self.core.status = ItemStatus::Waiting,
            (ItemStatus::Waiting, false) => self.core.status = ItemStatus::Pending,
            _ => {}
        }
    }

    // --- tasks ---

    pub fn add_task(&mut self, task: StageTask) -> Result<(), StageError> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(StageError::Duplicate {
                kind: "task",
                id: task.id,
            });
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn remove_task(&mut self, task_id: &str) -> Option<StageTask> {
        let idx = self.tasks.iter().position(|t| t.id == task_id)?;
        Some(self.tasks.remove(idx))
    }

    pub fn complete_task(
        &mut self,
        task_id: &str,
        actual_hours: Option<f64>,
    ) -> Result<(), StageError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StageError::NotFound {
                kind: "task",
                id: task_id.to_string(),
            })?;
        task.completed = true;
        if actual_hours.is_some() {
            task.actual_hours = actual_hours;
        }
        Ok(())
    }

    /// Completed tasks as a percentage; a stage with no tasks reports 100
    pub fn task_completion_percentage(&self) -> f64 {
        if self.tasks.is_empty() {
            return 100.0;
        }
        let done = self.tasks.iter().filter(|t| t.completed).count();
        done as f64 / self.tasks.len() as f64 * 100.0
    }

    /// Sum of task estimates (tasks without an estimate count as zero)
    pub fn estimated_hours(&self) -> f64 {
        self.tasks.iter().filter_map(|t| t.estimated_hours).sum()
    }

    /// Sum of estimates over completed tasks
    pub fn completed_estimated_hours(&self) -> f64 {
        self.tasks
            .iter()
            .filter(|t| t.completed)
            .filter_map(|t| t.estimated_hours)
            .sum()
    }

    pub fn actual_hours(&self) -> f64 {
        self.tasks.iter().filter_map(|t| t.actual_hours).sum()
    }

    // --- data containers ---

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), StageError> {
        if self.resources.iter().any(|r| r.id == resource.id) {
            return Err(StageError::Duplicate {
                kind: "resource",
                id: resource.id,
            });
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn remove_resource(&mut self, resource_id: &str) -> bool {
        let before = self.resources.len();
        self.resources.retain(|r| r.id != resource_id);
        self.resources.len() != before
    }

    pub fn add_metric(&mut self, metric: Metric) -> Result<(), StageError> {
        if self.metrics.iter().any(|m| m.id == metric.id) {
            return Err(StageError::Duplicate {
                kind: "metric",
                id: metric.id,
            });
        }
        self.metrics.push(metric);
        Ok(())
    }

    pub fn remove_metric(&mut self, metric_id: &str) -> bool {
        let before = self.metrics.len();
        self.metrics.retain(|m| m.id != metric_id);
        self.metrics.len() != before
    }

    /// Records an observed value for a metric
    pub fn record_metric(&mut self, metric_id: &str, value: f64) -> Result<(), StageError> {
        let metric = self
            .metrics
            .iter_mut()
            .find(|m| m.id == metric_id)
            .ok_or_else(|| StageError::NotFound {
                kind: "metric",
                id: metric_id.to_string(),
            })?;
        metric.value = Some(value);
        Ok(())
    }

    pub fn set_feature_flag(&mut self, key: impl Into<String>, value: impl Into<FlagValue>) {
        self.feature_flags.insert(key.into(), value.into());
    }

    pub fn remove_feature_flag(&mut self, key: &str) -> Option<FlagValue> {
        self.feature_flags.remove(key)
    }

    pub fn add_ab_test(&mut self, test_id: impl Into<String>) -> Result<(), StageError> {
        let test_id = test_id.into();
        if self.ab_tests.contains(&test_id) {
            return Err(StageError::Duplicate {
                kind: "A/B test",
                id: test_id,
            });
        }
        self.ab_tests.push(test_id);
        Ok(())
    }

    pub fn remove_ab_test(&mut self, test_id: &str) -> bool {
        let before = self.ab_tests.len();
        self.ab_tests.retain(|t| t != test_id);
        self.ab_tests.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_stage() -> Stage {
        Stage::new("build".parse().unwrap(), "Build")
    }

    #[test]
    fn new_stage_is_pending() {
        let stage = make_stage();
        assert_eq!(stage.status(), ItemStatus::Pending);
        assert!(stage.core.actual_start_date.is_none());
    }

    #[test]
    fn start_then_complete() {
        let mut stage = make_stage();
        stage.start().unwrap();
        assert_eq!(stage.status(), ItemStatus::InProgress);
        assert!(stage.core.actual_start_date.is_some());
        assert!(stage.core.actual_end_date.is_none());

        stage.complete().unwrap();
        assert_eq!(stage.status(), ItemStatus::Completed);
        assert!(stage.core.actual_end_date.is_some());
    }

    #[test]
    fn completing_pending_stage_is_rejected() {
        let mut stage = make_stage();
        let err = stage.complete().unwrap_err();
        assert_eq!(err.action, "complete");
        assert_eq!(err.from, ItemStatus::Pending);
        assert_eq!(stage.status(), ItemStatus::Pending);
    }

    #[test]
    fn pause_and_resume() {
        let mut stage = make_stage();
        stage.start().unwrap();
        stage.pause(Some("waiting on approval")).unwrap();
        assert_eq!(stage.status(), ItemStatus::Paused);
        assert_eq!(
            stage.core.metadata.get("pause_reason"),
            Some(&serde_json::json!("waiting on approval"))
        );

        assert!(stage.complete().is_err());
        stage.resume().unwrap();
        stage.complete().unwrap();
    }

    #[test]
    fn paused_stage_can_be_cancelled() {
        let mut stage = make_stage();
        stage.start().unwrap();
        stage.pause(None).unwrap();
        stage.cancel(Some("rolled back")).unwrap();
        assert_eq!(stage.status(), ItemStatus::Cancelled);
        assert!(stage.core.actual_end_date.is_some());
        assert!(stage.resume().is_err());
    }

    #[test]
    fn terminal_stage_rejects_everything() {
        let mut stage = make_stage();
        stage.start().unwrap();
        stage.fail(Some("health check failed")).unwrap();

        assert!(stage.start().is_err());
        assert!(stage.cancel(None).is_err());
        assert!(stage.delay(Utc::now(), None).is_err());
        assert_eq!(
            stage.core.metadata.get("failure_reason"),
            Some(&serde_json::json!("health check failed"))
        );
    }

    #[test]
    fn delay_replans_end_date() {
        let mut stage = make_stage();
        let new_end = Utc::now() + Duration::days(3);
        stage.delay(new_end, Some("vendor outage")).unwrap();
        assert_eq!(stage.status(), ItemStatus::Delayed);
        assert_eq!(stage.core.planned_end_date, Some(new_end));

        // delayed before starting: can still start, but not complete
        assert!(stage.complete().is_err());
        stage.start().unwrap();
        stage.delay(new_end + Duration::days(1), None).unwrap();
        // delayed while running: can complete
        stage.complete().unwrap();
    }

    #[test]
    fn task_completion_percentage() {
        let mut stage = make_stage();
        assert_eq!(stage.task_completion_percentage(), 100.0);

        stage.add_task(StageTask::new("t1", "compile")).unwrap();
        stage.add_task(StageTask::new("t2", "package")).unwrap();
        assert_eq!(stage.task_completion_percentage(), 0.0);

        stage.complete_task("t1", Some(1.5)).unwrap();
        assert_eq!(stage.task_completion_percentage(), 50.0);
        assert_eq!(stage.actual_hours(), 1.5);
    }

    #[test]
    fn duplicate_task_rejected() {
        let mut stage = make_stage();
        stage.add_task(StageTask::new("t1", "compile")).unwrap();
        let err = stage.add_task(StageTask::new("t1", "again")).unwrap_err();
        assert!(matches!(err, StageError::Duplicate { kind: "task", .. }));
    }

    #[test]
    fn complete_unknown_task() {
        let mut stage = make_stage();
        assert!(matches!(
            stage.complete_task("nope", None),
            Err(StageError::NotFound { .. })
        ));
    }

    #[test]
    fn remove_task_returns_it() {
        let mut stage = make_stage();
        stage.add_task(StageTask::new("t1", "compile")).unwrap();
        assert_eq!(stage.remove_task("t1").unwrap().description, "compile");
        assert!(stage.remove_task("t1").is_none());
    }

    #[test]
    fn estimated_hours() {
        let mut stage = make_stage();
        stage
            .add_task(StageTask::new("t1", "a").with_estimate(4.0))
            .unwrap();
        stage
            .add_task(StageTask::new("t2", "b").with_estimate(6.0))
            .unwrap();
        stage.add_task(StageTask::new("t3", "c")).unwrap();
        stage.complete_task("t2", None).unwrap();

        assert_eq!(stage.estimated_hours(), 10.0);
        assert_eq!(stage.completed_estimated_hours(), 6.0);
    }

    #[test]
    fn data_containers() {
        let mut stage = make_stage();
        stage
            .add_resource(Resource {
                id: "r1".into(),
                name: "Ana".into(),
                role: "sre".into(),
                allocation_percentage: 50.0,
            })
            .unwrap();
        stage
            .add_metric(Metric {
                id: "err".into(),
                name: "Error rate".into(),
                target: Some(0.1),
                value: None,
                unit: Some("%".into()),
            })
            .unwrap();
        stage.record_metric("err", 0.05).unwrap();
        stage.set_feature_flag("new-checkout", true);
        stage.set_feature_flag("pricing", "variant-b");
        stage.add_ab_test("exp-42").unwrap();

        assert!(stage.add_ab_test("exp-42").is_err());
        assert_eq!(stage.metrics[0].value, Some(0.05));
        assert_eq!(
            stage.feature_flags.get("pricing"),
            Some(&FlagValue::Variant("variant-b".into()))
        );

        assert!(stage.remove_resource("r1"));
        assert!(stage.remove_metric("err"));
        assert!(stage.remove_ab_test("exp-42"));
        assert_eq!(stage.remove_feature_flag("new-checkout"), Some(FlagValue::Bool(true)));
    }

    #[test]
    fn serde_roundtrip() {
        let mut stage = make_stage();
        stage.start().unwrap();
        stage
            .add_task(StageTask::new("t1", "compile").with_estimate(2.0))
            .unwrap();
        stage.set_feature_flag("dark-launch", false);

        let json = serde_json::to_string(&stage).unwrap();
        let parsed: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stage);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "build");
        assert_eq!(value["status"], "in_progress");
        assert!(value["actualStartDate"].is_string());
        assert_eq!(value["featureFlags"]["dark-launch"], false);
    }
}
