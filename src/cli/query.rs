//! Analysis commands (ready, next, critical-path, estimate, validate, progress)
//!
//! These commands never modify the timeline.

use anyhow::{bail, Result};
use chrono::Utc;

use super::session::Session;
use crate::domain::{
    item_duration, DependencyResolver, ItemId, ProgressTracker, StrategyKind, Timeline,
};

fn item_rows(timeline: &Timeline, ids: &[ItemId]) -> Vec<serde_json::Value> {
    ids.iter()
        .filter_map(|id| timeline.get(id))
        .map(|item| {
            serde_json::json!({
                "id": item.id(),
                "kind": item.kind_label(),
                "name": item.name(),
                "status": item.status(),
                "priority": item.core().priority,
            })
        })
        .collect()
}

fn print_items(timeline: &Timeline, ids: &[ItemId]) {
    println!("{:<16} {:<10} {:<9} NAME", "ID", "KIND", "PRIORITY");
    println!("{}", "-".repeat(60));
    for item in ids.iter().filter_map(|id| timeline.get(id)) {
        println!(
            "{:<16} {:<10} {:<9} {}",
            item.id(),
            item.kind_label(),
            item.core().priority,
            item.name()
        );
    }
}

/// Show pending items whose dependencies allow them to go
pub fn ready(session: &Session) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;
    let ready = DependencyResolver::new(&timeline).ready_to_start();

    output.verbose_ctx("ready", &format!("Found {} ready items", ready.len()));

    if output.is_json() {
        output.data(&item_rows(&timeline, &ready));
    } else if ready.is_empty() {
        println!("No items ready to start.");
    } else {
        println!("Ready items ({}):", ready.len());
        print_items(&timeline, &ready);
    }

    Ok(())
}

/// Ready items ordered by priority, then by how much they unblock
pub fn next(session: &Session, limit: usize) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;
    let next = DependencyResolver::new(&timeline).next_items(limit);

    if output.is_json() {
        output.data(&item_rows(&timeline, &next));
    } else if next.is_empty() {
        println!("Nothing to work on next.");
    } else {
        print_items(&timeline, &next);
    }

    Ok(())
}

pub fn critical_path(session: &Session) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;
    let path = DependencyResolver::new(&timeline).critical_path()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "items": path.item_ids,
            "totalHours": path.total_hours(),
            "totalDays": path.total_days(),
        }));
        return Ok(());
    }

    if path.item_ids.is_empty() {
        println!("Timeline has no items.");
        return Ok(());
    }

    println!(
        "Critical path ({} items, {:.1} days):",
        path.item_ids.len(),
        path.total_days()
    );
    for (position, item) in path
        .item_ids
        .iter()
        .filter_map(|id| timeline.get(id))
        .enumerate()
    {
        let hours = item_duration(item).num_minutes() as f64 / 60.0;
        println!(
            "  {}. {:<16} {:>8.1}h  {}",
            position + 1,
            item.id(),
            hours,
            item.name()
        );
    }

    Ok(())
}

pub fn estimate(session: &Session) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;
    let resolver = DependencyResolver::new(&timeline);

    let Some(date) = resolver.estimated_completion_date(Utc::now()) else {
        let report = resolver.validate();
        let reasons: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("Cannot estimate completion: {}", reasons.join("; "));
    };

    if output.is_json() {
        output.data(&serde_json::json!({ "estimatedCompletion": date }));
    } else {
        println!("Estimated completion: {}", date.format("%Y-%m-%d %H:%M UTC"));
    }

    Ok(())
}

/// Prints the validation report; a timeline with errors fails the command
pub fn validate(session: &Session) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;
    let report = DependencyResolver::new(&timeline).validate();

    if output.is_json() {
        output.data(&report);
    } else {
        for error in &report.errors {
            println!("error: {}", error);
        }
        for warning in &report.warnings {
            println!("warning: {}", warning);
        }
        if report.valid {
            println!("Timeline {} is valid.", timeline.id);
        }
    }

    if !report.valid {
        bail!(
            "Timeline {} has {} error(s)",
            timeline.id,
            report.errors.len()
        );
    }
    Ok(())
}

pub fn progress(session: &Session, strategy: Option<StrategyKind>, save: bool) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;
    let config = session.workspace.config();
    let kind = strategy.unwrap_or_else(|| config.progress_strategy());

    if save {
        let mut updated = config.clone();
        updated.project.progress_strategy = Some(kind);
        updated.save_project()?;
        output.verbose_ctx("progress", &format!("Saved default strategy: {}", kind));
    }

    let detail = ProgressTracker::new(kind).detailed_progress(&timeline);

    if output.is_json() {
        output.data(&detail);
        return Ok(());
    }

    println!("Progress: {:.1}% ({})", detail.overall, detail.strategy);
    if !timeline.is_empty() {
        println!();
        for id in timeline.item_ids() {
            if let Some(percent) = detail.stages.get(id) {
                println!("  {:<16} {:>6.1}%", id, percent);
            } else if let Some(reached) = detail.milestones.get(id) {
                let mark = if *reached { "reached" } else { "open" };
                println!("  {:<16} {:>7}", id, mark);
            }
        }
    }

    Ok(())
}
