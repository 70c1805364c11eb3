//! Progress tracking with pluggable weighting strategies

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::id::ItemId;
use super::stage::Stage;
use super::timeline::Timeline;

/// Computes stage and timeline progress as percentages in `0..=100`
pub trait ProgressStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage_progress(&self, stage: &Stage) -> f64 {
        if stage.status().is_complete() {
            100.0
        } else {
            stage.task_completion_percentage()
        }
    }

    /// Relative weight of a stage in the timeline total
    fn stage_weight(&self, stage: &Stage) -> f64;

    fn timeline_progress(&self, timeline: &Timeline) -> f64 {
        weighted_average(timeline, |s| self.stage_weight(s), |s| self.stage_progress(s))
    }
}

fn weighted_average(
    timeline: &Timeline,
    weight: impl Fn(&Stage) -> f64,
    progress: impl Fn(&Stage) -> f64,
) -> f64 {
    let mut total_weight = 0.0;
    let mut sum = 0.0;
    for stage in timeline.stages() {
        let w = weight(stage);
        total_weight += w;
        sum += w * progress(stage);
    }
    if total_weight <= 0.0 {
        return 0.0;
    }
    (sum / total_weight).clamp(0.0, 100.0)
}

/// Every stage counts the same
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl ProgressStrategy for EqualWeight {
    fn name(&self) -> &'static str {
        "equal"
    }

    fn stage_weight(&self, _stage: &Stage) -> f64 {
        1.0
    }
}

/// Stages weighted by priority rank (Critical=4 ... Low=1)
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityBased;

impl ProgressStrategy for PriorityBased {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn stage_weight(&self, stage: &Stage) -> f64 {
        stage.core.priority.rank() as f64
    }
}

/// Stages weighted by estimated task hours
///
/// Stage progress is completed hours over estimated hours, or the plain task
/// ratio when no task carries an estimate. When no stage has any estimate
/// the timeline falls back to equal weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeBased;

impl ProgressStrategy for TimeBased {
    fn name(&self) -> &'static str {
        "time"
    }

    fn stage_progress(&self, stage: &Stage) -> f64 {
        if stage.status().is_complete() {
            return 100.0;
        }
        let estimated = stage.estimated_hours();
        if estimated > 0.0 {
            (stage.completed_estimated_hours() / estimated * 100.0).clamp(0.0, 100.0)
        } else {
            stage.task_completion_percentage()
        }
    }

    fn stage_weight(&self, stage: &Stage) -> f64 {
        stage.estimated_hours()
    }

    fn timeline_progress(&self, timeline: &Timeline) -> f64 {
        let any_estimate = timeline.stages().any(|s| s.estimated_hours() > 0.0);
        if any_estimate {
            weighted_average(timeline, |s| self.stage_weight(s), |s| self.stage_progress(s))
        } else {
            weighted_average(timeline, |_| 1.0, |s| self.stage_progress(s))
        }
    }
}

/// Selects a built-in strategy by name (config files and CLI flags)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Equal,
    Priority,
    Time,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Equal => "equal",
            StrategyKind::Priority => "priority",
            StrategyKind::Time => "time",
        }
    }

    pub fn strategy(&self) -> Box<dyn ProgressStrategy> {
        match self {
            StrategyKind::Equal => Box::new(EqualWeight),
            StrategyKind::Priority => Box::new(PriorityBased),
            StrategyKind::Time => Box::new(TimeBased),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equal" | "equal_weight" | "equal-weight" => Ok(StrategyKind::Equal),
            "priority" | "priority_based" | "priority-based" => Ok(StrategyKind::Priority),
            "time" | "time_based" | "time-based" => Ok(StrategyKind::Time),
            _ => Err(format!(
                "Unknown progress strategy '{}' (expected equal, priority or time)",
                s
            )),
        }
    }
}

/// Per-item breakdown of a timeline's progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedProgress {
    pub strategy: &'static str,
    pub overall: f64,
    pub stages: BTreeMap<ItemId, f64>,
    /// Milestone id to whether it has been reached
    pub milestones: BTreeMap<ItemId, bool>,
}

/// Progress calculator over a swappable strategy
pub struct ProgressTracker {
    strategy: Box<dyn ProgressStrategy>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(StrategyKind::default())
    }
}

impl ProgressTracker {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            strategy: kind.strategy(),
        }
    }

    pub fn with_strategy(strategy: Box<dyn ProgressStrategy>) -> Self {
        Self { strategy }
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn ProgressStrategy>) {
        self.strategy = strategy;
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn timeline_progress(&self, timeline: &Timeline) -> f64 {
        self.strategy.timeline_progress(timeline)
    }

    pub fn stage_progress(&self, stage: &Stage) -> f64 {
        self.strategy.stage_progress(stage)
    }

    pub fn detailed_progress(&self, timeline: &Timeline) -> DetailedProgress {
        DetailedProgress {
            strategy: self.strategy.name(),
            overall: self.timeline_progress(timeline),
            stages: timeline
                .stages()
                .map(|s| (s.id().clone(), self.stage_progress(s)))
                .collect(),
            milestones: timeline
                .milestones()
                .map(|m| (m.id().clone(), m.status().is_complete()))
                .collect(),
        }
    }
}
