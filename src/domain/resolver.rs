//! Dependency analysis over a timeline snapshot
//!
//! The resolver never mutates the timeline. It works on the blocking
//! dependency subgraph: advisory edges are ignored by every computation
//! except the dangling-reference check.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use super::graph::DependencyGraph;
use super::id::ItemId;
use super::item::{DependencyType, ItemStatus};
use super::timeline::{Timeline, TimelineItem};
use super::validation::{ValidationIssue, ValidationReport, ValidationWarning};

#[derive(Debug, Error, PartialEq)]
pub enum ResolverError {
    #[error("Dependency graph contains {} cycle(s); first: {}", .0.len(), describe_cycle(.0))]
    Cyclic(Vec<Vec<ItemId>>),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),
}

fn describe_cycle(cycles: &[Vec<ItemId>]) -> String {
    cycles
        .first()
        .map(|c| {
            c.iter()
                .map(|i| i.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        })
        .unwrap_or_default()
}

/// Longest duration-weighted chain of blocking dependencies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalPath {
    /// Earliest unblocked item first, terminal item last
    pub item_ids: Vec<ItemId>,
    pub total_seconds: i64,
}

impl CriticalPath {
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.total_seconds)
    }

    pub fn total_hours(&self) -> f64 {
        self.total_seconds as f64 / 3600.0
    }

    pub fn total_days(&self) -> f64 {
        self.total_seconds as f64 / 86_400.0
    }
}

/// Estimated duration of an item
///
/// Planned window if both dates are set, else the sum of task estimates for
/// stages, else zero.
pub fn item_duration(item: &TimelineItem) -> Duration {
    if let Some(planned) = item.core().planned_duration() {
        return planned;
    }
    match item {
        TimelineItem::Stage(stage) => {
            let hours = stage.estimated_hours();
            if hours > 0.0 {
                Duration::seconds((hours * 3600.0).round() as i64)
            } else {
                Duration::zero()
            }
        }
        TimelineItem::Milestone(_) => Duration::zero(),
    }
}

/// Graph analysis over one timeline
pub struct DependencyResolver<'a> {
    timeline: &'a Timeline,
    graph: DependencyGraph,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(timeline: &'a Timeline) -> Self {
        Self {
            timeline,
            graph: timeline.dependency_graph(),
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Every distinct cycle among blocking dependencies
    pub fn find_circular_dependencies(&self) -> Vec<Vec<ItemId>> {
        self.graph.find_cycles()
    }

    /// Dependencies (blocking or not) whose target is not in the timeline
    pub fn unresolved_dependencies(&self) -> Vec<(ItemId, ItemId)> {
        self.timeline
            .items()
            .flat_map(|item| {
                item.core()
                    .dependencies
                    .iter()
                    .filter(|dep| !self.timeline.contains(&dep.depends_on_id))
                    .map(move |dep| (item.id().clone(), dep.depends_on_id.clone()))
            })
            .collect()
    }

    /// True iff there are no dangling references and no cycles
    pub fn validate_dependencies(&self) -> bool {
        self.unresolved_dependencies().is_empty() && !self.graph.is_cyclic()
    }

    fn priority_of(&self, id: &ItemId) -> u32 {
        self.timeline
            .get(id)
            .map(|i| i.core().priority.rank())
            .unwrap_or(0)
    }

    fn position_of(&self, id: &ItemId) -> usize {
        self.graph.position(id).unwrap_or(usize::MAX)
    }

    /// Is `a` preferred over `b` when their lengths tie?
    fn wins_tie(&self, a: &ItemId, b: &ItemId) -> bool {
        let (pa, pb) = (self.priority_of(a), self.priority_of(b));
        pa > pb || (pa == pb && self.position_of(a) < self.position_of(b))
    }

    fn topological_order(&self) -> Result<Vec<ItemId>, ResolverError> {
        self.graph
            .topological_order()
            .map_err(|_| ResolverError::Cyclic(self.find_circular_dependencies()))
    }

    /// Longest chain of blocking dependencies weighted by duration plus lag
    ///
    /// Ties prefer higher priority, then earlier insertion.
    pub fn critical_path(&self) -> Result<CriticalPath, ResolverError> {
        let order = self.topological_order()?;

        let mut length: HashMap<&ItemId, Duration> = HashMap::new();
        let mut predecessor: HashMap<&ItemId, &ItemId> = HashMap::new();

        for id in &order {
            let Some(item) = self.timeline.get(id) else {
                continue;
            };

            let mut best: Option<(Duration, &ItemId)> = None;
            for (src, dep) in self.graph.incoming(id) {
                let candidate = length.get(src).copied().unwrap_or_else(Duration::zero) + dep.lag();
                let better = match best {
                    None => true,
                    Some((len, current)) => {
                        candidate > len || (candidate == len && self.wins_tie(src, current))
                    }
                };
                if better {
                    best = Some((candidate, src));
                }
            }

            let start = best.map(|(len, _)| len).unwrap_or_else(Duration::zero);
            if let Some((_, src)) = best {
                predecessor.insert(id, src);
            }
            length.insert(id, start + item_duration(item));
        }

        let mut terminal: Option<(&ItemId, Duration)> = None;
        for id in &order {
            let len = length[id];
            let better = match terminal {
                None => true,
                Some((current, best)) => len > best || (len == best && self.wins_tie(id, current)),
            };
            if better {
                terminal = Some((id, len));
            }
        }

        let Some((end, total)) = terminal else {
            return Ok(CriticalPath {
                item_ids: Vec::new(),
                total_seconds: 0,
            });
        };

        let mut path = vec![end.clone()];
        let mut cursor = end;
        while let Some(prev) = predecessor.get(cursor) {
            path.push((*prev).clone());
            cursor = *prev;
        }
        path.reverse();

        debug!(timeline = %self.timeline.id, items = path.len(), seconds = total.num_seconds(), "critical path computed");
        Ok(CriticalPath {
            item_ids: path,
            total_seconds: total.num_seconds(),
        })
    }

    /// Pending items whose dependencies allow them to go ahead
    ///
    /// Stages need their start gates satisfied; milestones need every
    /// blocking dependency satisfied.
    pub fn ready_to_start(&self) -> Vec<ItemId> {
        self.timeline.ready_under(&self.timeline.status_snapshot())
    }

    /// Number of items transitively depending on `id`
    fn total_dependents(&self, id: &ItemId) -> usize {
        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut stack = self.graph.dependents(id);
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.graph.dependents(&next));
            }
        }
        seen.len()
    }

    /// Ready items ranked by priority, then fewest total dependents, then insertion order
    pub fn next_items(&self, limit: usize) -> Vec<ItemId> {
        let mut ranked: Vec<_> = self
            .ready_to_start()
            .into_iter()
            .map(|id| {
                let priority = self.priority_of(&id);
                let dependents = self.total_dependents(&id);
                let position = self.position_of(&id);
                (std::cmp::Reverse(priority), dependents, position, id)
            })
            .collect();
        ranked.sort();
        ranked.into_iter().take(limit).map(|(_, _, _, id)| id).collect()
    }

    /// Items that would become ready if `id` completed now
    pub fn items_unblocked_by(&self, id: &ItemId) -> Result<Vec<ItemId>, ResolverError> {
        if !self.timeline.contains(id) {
            return Err(ResolverError::ItemNotFound(id.clone()));
        }

        let statuses = self.timeline.status_snapshot();
        let before: HashSet<ItemId> = self.timeline.ready_under(&statuses).into_iter().collect();

        let mut simulated = statuses;
        simulated.insert(id.clone(), ItemStatus::Completed);

        Ok(self
            .timeline
            .ready_under(&simulated)
            .into_iter()
            .filter(|ready| ready != id && !before.contains(ready))
            .collect())
    }

    /// Forward-propagates planned durations to estimate when everything finishes
    ///
    /// Unstarted items start no earlier than `now`; running items keep their
    /// actual start. Returns `None` when the graph is invalid.
    pub fn estimated_completion_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.validate_dependencies() {
            return None;
        }
        let order = self.topological_order().ok()?;

        let mut starts: HashMap<&ItemId, DateTime<Utc>> = HashMap::new();
        let mut finishes: HashMap<&ItemId, DateTime<Utc>> = HashMap::new();

        for id in &order {
            let item = self.timeline.get(id)?;
            let core = item.core();
            let duration = item_duration(item);

            let (start, finish) = if core.status.is_terminal() {
                let end = core.actual_end_date.unwrap_or(now);
                (core.actual_start_date.unwrap_or(end), end)
            } else {
                let incoming = self.graph.incoming(id);
                let started = core.actual_start_date;

                let mut start = started.unwrap_or(now);
                if started.is_none() {
                    for (src, dep) in &incoming {
                        let bound = match dep.dep_type {
                            DependencyType::FinishToStart => finishes.get(src).copied(),
                            DependencyType::StartToStart => starts.get(src).copied(),
                            _ => None,
                        };
                        if let Some(bound) = bound {
                            start = start.max(bound + dep.lag());
                        }
                    }
                }

                let mut finish = (start + duration).max(now);
                for (src, dep) in &incoming {
                    let bound = match dep.dep_type {
                        DependencyType::FinishToFinish => finishes.get(src).copied(),
                        DependencyType::StartToFinish => starts.get(src).copied(),
                        _ => None,
                    };
                    if let Some(bound) = bound {
                        finish = finish.max(bound + dep.lag());
                    }
                }
                (start, finish)
            };

            starts.insert(id, start);
            finishes.insert(id, finish);
        }

        Some(finishes.values().copied().max().unwrap_or(now))
    }

    /// Validates everything in one pass
    pub fn validate(&self) -> ValidationReport {
        let mut errors: Vec<ValidationIssue> = self
            .unresolved_dependencies()
            .into_iter()
            .map(|(item, missing)| ValidationIssue::UnresolvedDependency { item, missing })
            .collect();
        errors.extend(
            self.find_circular_dependencies()
                .into_iter()
                .map(|items| ValidationIssue::Cycle { items }),
        );

        let mut warnings = Vec::new();
        let depended_on: HashSet<&ItemId> = self
            .timeline
            .items()
            .flat_map(|i| i.core().dependencies.iter().map(|d| &d.depends_on_id))
            .collect();
        let multi_item = self.timeline.len() > 1;

        for item in self.timeline.items() {
            let core = item.core();
            match item {
                TimelineItem::Stage(stage) if stage.tasks.is_empty() => {
                    warnings.push(ValidationWarning::StageWithoutTasks {
                        item: core.id.clone(),
                    });
                }
                TimelineItem::Milestone(milestone) => match milestone.target_date() {
                    None => warnings.push(ValidationWarning::MilestoneWithoutTarget {
                        item: core.id.clone(),
                    }),
                    Some(target) => {
                        let work_before = self.timeline.stages().any(|s| {
                            s.core.planned_end_date.is_some_and(|end| end <= target)
                        });
                        if !work_before && core.dependencies.is_empty() {
                            warnings.push(ValidationWarning::NoWorkBeforeMilestone {
                                item: core.id.clone(),
                            });
                        }
                    }
                },
                _ => {}
            }

            if multi_item && core.dependencies.is_empty() && !depended_on.contains(&core.id) {
                warnings.push(ValidationWarning::OrphanedItem {
                    item: core.id.clone(),
                });
            }
        }

        ValidationReport::new(errors, warnings)
    }
}
