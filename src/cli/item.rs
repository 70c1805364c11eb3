//! Stage, milestone, task and dependency commands, plus item transitions

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Subcommand;

use super::session::Session;
use crate::domain::{
    parse_date, Dependency, DependencyResolver, DependencyType, ItemId, Milestone, Priority,
    Stage, StageTask,
};

#[derive(Subcommand)]
pub enum StageCommands {
    /// Add a stage
    ///
    /// Examples:
    ///   timeline stage add "Canary" --id canary --priority high
    ///   timeline stage add "EU rollout" --start 2025-03-01 --end 2025-03-05
    Add {
        /// Stage name
        name: String,

        /// Explicit stage id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        #[arg(long, short = 'p', default_value = "medium")]
        priority: Priority,

        /// Planned start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// Planned end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        owner: Option<String>,
    },

    /// Set a feature flag on a stage
    Flag {
        /// Stage ID
        stage: String,

        /// Flag name
        key: String,

        /// Flag value (true/false, anything else is stored as a string)
        value: String,
    },
}

#[derive(Subcommand)]
pub enum MilestoneCommands {
    /// Add a milestone
    Add {
        /// Milestone name
        name: String,

        /// Explicit milestone id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Target date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        target: Option<String>,

        #[arg(long, short = 'p', default_value = "medium")]
        priority: Priority,

        #[arg(long)]
        owner: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task to a stage
    Add {
        /// Stage ID
        stage: String,

        /// Task description
        description: String,

        /// Task id within the stage (defaults to task-N)
        #[arg(long)]
        id: Option<String>,

        /// Estimated hours
        #[arg(long, short = 'e')]
        estimate: Option<f64>,

        #[arg(long)]
        assignee: Option<String>,
    },

    /// Mark a stage task done
    Done {
        /// Stage ID
        stage: String,

        /// Task ID
        task: String,

        /// Actual hours spent
        #[arg(long)]
        hours: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum DepCommands {
    /// Make an item depend on another
    ///
    /// Examples:
    ///   timeline dep add deploy build                # deploy starts after build finishes
    ///   timeline dep add docs build --type ss        # docs starts once build has started
    ///   timeline dep add ga deploy --delay 24        # one day of lag before ga
    Add {
        /// Item that waits
        item: String,

        /// Item it depends on
        depends_on: String,

        /// Dependency type: fs, ss, ff or sf
        #[arg(long = "type", default_value = "fs")]
        dep_type: DependencyType,

        /// Lag in hours (negative for lead)
        #[arg(long, allow_hyphen_values = true)]
        delay: Option<i64>,

        /// Informational only; never blocks the item
        #[arg(long)]
        advisory: bool,
    },

    /// Remove a dependency
    Remove {
        /// Item that waits
        item: String,

        /// Item it depends on
        depends_on: String,
    },
}

/// An item state change requested from the command line
pub enum Transition {
    Start,
    Complete,
    Fail(Option<String>),
    Pause(Option<String>),
    Resume,
    Cancel(Option<String>),
    Delay(String, Option<String>),
    Reach,
    Miss(Option<String>),
}

impl Transition {
    fn past_tense(&self) -> &'static str {
        match self {
            Transition::Start => "Started",
            Transition::Complete => "Completed",
            Transition::Fail(_) => "Failed",
            Transition::Pause(_) => "Paused",
            Transition::Resume => "Resumed",
            Transition::Cancel(_) => "Cancelled",
            Transition::Delay(..) => "Delayed",
            Transition::Reach => "Reached",
            Transition::Miss(_) => "Missed",
        }
    }
}

pub fn run_stage(cmd: StageCommands, session: &Session) -> Result<()> {
    match cmd {
        StageCommands::Add {
            name,
            id,
            priority,
            start,
            end,
            owner,
        } => {
            let id = match id {
                Some(raw) => Session::parse_item(&raw)?,
                None => ItemId::new_stage(&name, Utc::now()),
            };
            let mut stage = Stage::new(id.clone(), name);
            stage.core.priority = priority;
            stage.core.planned_start_date = start.as_deref().map(parse_date).transpose()?;
            stage.core.planned_end_date = end.as_deref().map(parse_date).transpose()?;
            stage.core.owner = owner;

            session.mutate(|timeline| timeline.add_stage(stage))?;
            report_created(session, "stage", &id);
        }
        StageCommands::Flag { stage, key, value } => {
            let id = Session::parse_item(&stage)?;
            session.mutate(|timeline| {
                let stage = timeline.stage_mut(&id)?;
                match value.as_str() {
                    "true" => stage.set_feature_flag(key.as_str(), true),
                    "false" => stage.set_feature_flag(key.as_str(), false),
                    other => stage.set_feature_flag(key.as_str(), other),
                }
                Ok(())
            })?;
            session
                .output
                .success(&format!("Set flag {} = {} on {}", key, value, id));
        }
    }
    Ok(())
}

pub fn run_milestone(cmd: MilestoneCommands, session: &Session) -> Result<()> {
    match cmd {
        MilestoneCommands::Add {
            name,
            id,
            target,
            priority,
            owner,
        } => {
            let id = match id {
                Some(raw) => Session::parse_item(&raw)?,
                None => ItemId::new_milestone(&name, Utc::now()),
            };
            let mut milestone = Milestone::new(id.clone(), name);
            if let Some(target) = target.as_deref() {
                milestone = milestone.with_target_str(target)?;
            }
            milestone.core.priority = priority;
            milestone.core.owner = owner;

            session.mutate(|timeline| timeline.add_milestone(milestone))?;
            report_created(session, "milestone", &id);
        }
    }
    Ok(())
}

fn report_created(session: &Session, kind: &str, id: &ItemId) {
    let output = session.output;
    if output.is_json() {
        output.data(&serde_json::json!({ "id": id, "kind": kind }));
    } else {
        println!("Added {}: {}", kind, id);
    }
}

pub fn run_task(cmd: TaskCommands, session: &Session) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            stage,
            description,
            id,
            estimate,
            assignee,
        } => {
            let stage_id = Session::parse_item(&stage)?;
            let task_id = session.mutate(|timeline| {
                let stage = timeline.stage_mut(&stage_id)?;
                let task_id = id.unwrap_or_else(|| format!("task-{}", stage.tasks.len() + 1));
                let mut task = StageTask::new(task_id.as_str(), description);
                if let Some(hours) = estimate {
                    task = task.with_estimate(hours);
                }
                if let Some(assignee) = assignee {
                    task = task.with_assignee(assignee);
                }
                stage.add_task(task)?;
                Ok(task_id)
            })?;
            session
                .output
                .success(&format!("Added task {} to {}", task_id, stage_id));
        }
        TaskCommands::Done { stage, task, hours } => {
            let stage_id = Session::parse_item(&stage)?;
            let percent = session.mutate(|timeline| {
                let stage = timeline.stage_mut(&stage_id)?;
                stage.complete_task(&task, hours)?;
                Ok(stage.task_completion_percentage())
            })?;
            session.output.success(&format!(
                "Completed task {} ({}: {:.0}% of tasks done)",
                task, stage_id, percent
            ));
        }
    }
    Ok(())
}

pub fn run_dep(cmd: DepCommands, session: &Session) -> Result<()> {
    let output = session.output;

    match cmd {
        DepCommands::Add {
            item,
            depends_on,
            dep_type,
            delay,
            advisory,
        } => {
            let item_id = Session::parse_item(&item)?;
            let target = Session::parse_item(&depends_on)?;
            let mut dep = Dependency::new(target.clone(), dep_type);
            dep.delay_hours = delay;
            if advisory {
                dep = dep.advisory();
            }

            let eager = session.workspace.config().eager_cycle_check();
            output.verbose_ctx("dep", &format!("Eager cycle check: {}", eager));

            let cycles = session.mutate(|timeline| {
                if eager {
                    timeline.add_dependency_strict(&item_id, dep)?;
                } else {
                    timeline.add_dependency_with(&item_id, dep)?;
                }
                timeline.refresh_waiting();
                Ok(DependencyResolver::new(timeline).find_circular_dependencies())
            })?;

            output.success(&format!(
                "{} now depends on {} ({})",
                item_id,
                target,
                dep_type.label()
            ));
            for cycle in cycles {
                let path: Vec<&str> = cycle.iter().map(ItemId::as_str).collect();
                output.warn(&format!("Dependency cycle: {}", path.join(" -> ")));
            }
        }
        DepCommands::Remove { item, depends_on } => {
            let item_id = Session::parse_item(&item)?;
            let target = Session::parse_item(&depends_on)?;

            let removed = session.mutate(|timeline| {
                let removed = timeline.remove_dependency(&item_id, &target)?;
                timeline.refresh_waiting();
                Ok(removed)
            })?;
            if !removed {
                bail!("{} does not depend on {}", item_id, target);
            }
            output.success(&format!("Removed dependency: {} -> {}", item_id, target));
        }
    }
    Ok(())
}

/// Applies one item transition and refreshes waiting statuses
pub fn transition(session: &Session, raw: &str, change: Transition) -> Result<()> {
    let id = Session::parse_item(raw)?;
    let new_date = match &change {
        Transition::Delay(date, _) => Some(parse_date(date)?),
        _ => None,
    };

    let status = session.mutate(|timeline| {
        match &change {
            Transition::Start => timeline.start_item(&id)?,
            Transition::Complete => timeline.complete_item(&id)?,
            Transition::Fail(reason) => timeline.fail_item(&id, reason.as_deref())?,
            Transition::Pause(reason) => timeline.pause_item(&id, reason.as_deref())?,
            Transition::Resume => timeline.resume_item(&id)?,
            Transition::Cancel(reason) => timeline.cancel_item(&id, reason.as_deref())?,
            Transition::Delay(_, reason) => {
                if let Some(date) = new_date {
                    timeline.delay_item(&id, date, reason.as_deref())?;
                }
            }
            Transition::Reach => timeline.reach_milestone(&id)?,
            Transition::Miss(reason) => timeline.miss_milestone(&id, reason.as_deref())?,
        }
        timeline.refresh_waiting();
        Ok(timeline.get(&id).map(|item| item.status()))
    })?;

    let output = session.output;
    if output.is_json() {
        output.data(&serde_json::json!({ "id": id, "status": status }));
    } else {
        output.success(&format!("{} {}", change.past_tense(), id));
    }
    Ok(())
}
