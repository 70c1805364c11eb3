//! Timeline lifecycle commands (new, list, show, delete, launch, finish)

use anyhow::{bail, Context, Result};

use super::session::Session;
use crate::domain::{DependencyResolver, ProgressTracker, Timeline, TimelineId, TimelineItem};
use crate::storage::TimelineRepository;

pub fn create(session: &Session, name: &str, id: Option<&str>, version: &str) -> Result<()> {
    let output = session.output;
    let repo = session.repository();

    let mut timeline = match id {
        Some(raw) => {
            let id: TimelineId = raw
                .parse()
                .with_context(|| format!("Invalid timeline id: {}", raw))?;
            if repo.get_timeline(&id)?.is_some() {
                bail!("Timeline already exists: {}", id);
            }
            Timeline::with_id(id, name)
        }
        None => Timeline::new(name),
    };
    timeline.version = version.to_string();
    timeline.created_by = session.workspace.config().author();

    repo.save_timeline(&timeline)?;
    output.verbose_ctx(
        "new",
        &format!("Wrote {}", repo.path_for(&timeline.id).display()),
    );

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": timeline.id,
            "name": timeline.name,
            "version": timeline.version,
        }));
    } else {
        println!("Created timeline: {} ({})", timeline.id, timeline.name);
    }

    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let output = session.output;
    let timelines = session.repository().list_timelines()?;
    let tracker = ProgressTracker::new(session.workspace.config().progress_strategy());

    if output.is_json() {
        let items: Vec<_> = timelines
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "name": t.name,
                    "version": t.version,
                    "status": t.status(),
                    "items": t.len(),
                    "progress": tracker.timeline_progress(t),
                })
            })
            .collect();
        output.data(&items);
    } else if timelines.is_empty() {
        println!("No timelines found.");
    } else {
        println!(
            "{:<16} {:<12} {:>6} {:>9}  NAME",
            "ID", "STATUS", "ITEMS", "PROGRESS"
        );
        println!("{}", "-".repeat(70));
        for t in &timelines {
            println!(
                "{:<16} {:<12} {:>6} {:>8.1}%  {}",
                t.id,
                t.status(),
                t.len(),
                tracker.timeline_progress(t),
                t.name
            );
        }
    }

    Ok(())
}

fn describe_dependencies(item: &TimelineItem) -> String {
    let deps: Vec<String> = item
        .core()
        .dependencies
        .iter()
        .map(|dep| {
            let mut label = format!("{}:{}", dep.dep_type.label(), dep.depends_on_id);
            if let Some(hours) = dep.delay_hours.filter(|h| *h != 0) {
                label.push_str(&format!("+{}h", hours));
            }
            if !dep.is_blocker {
                label.push('?');
            }
            label
        })
        .collect();

    if deps.is_empty() {
        "-".to_string()
    } else {
        deps.join(",")
    }
}

pub fn show(session: &Session) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;

    if output.is_json() {
        output.data(&timeline);
        return Ok(());
    }

    let tracker = ProgressTracker::new(session.workspace.config().progress_strategy());
    println!("Timeline: {}", timeline.id);
    println!("Name: {}", timeline.name);
    println!("Version: {}", timeline.version);
    println!("Status: {}", timeline.status());
    if let Some(author) = &timeline.created_by {
        println!("Created by: {}", author);
    }
    println!(
        "Progress: {:.1}% ({})",
        tracker.timeline_progress(&timeline),
        tracker.strategy_name()
    );

    if timeline.is_empty() {
        println!();
        println!("No stages or milestones yet.");
        return Ok(());
    }

    println!();
    println!(
        "{:<16} {:<10} {:<12} {:<9} {:<24} NAME",
        "ID", "KIND", "STATUS", "PRIORITY", "DEPENDS ON"
    );
    println!("{}", "-".repeat(90));
    for item in timeline.items() {
        println!(
            "{:<16} {:<10} {:<12} {:<9} {:<24} {}",
            item.id(),
            item.kind_label(),
            item.status(),
            item.core().priority,
            describe_dependencies(item),
            item.name()
        );
    }

    let unresolved = DependencyResolver::new(&timeline).unresolved_dependencies();
    if !unresolved.is_empty() {
        println!();
        for (item, missing) in unresolved {
            output.warn(&format!("{} depends on unknown item {}", item, missing));
        }
    }

    if !timeline.notifications.is_empty() {
        println!();
        println!("Notifications:");
        for (index, config) in timeline.notifications.iter().enumerate() {
            println!(
                "  [{}] {} via {}: {}",
                index, config.trigger, config.channel, config.template
            );
        }
    }

    Ok(())
}

pub fn delete(session: &Session, raw: &str) -> Result<()> {
    let id: TimelineId = raw
        .parse()
        .with_context(|| format!("Invalid timeline id: {}", raw))?;

    if !session.repository().delete_timeline(&id)? {
        bail!("Timeline not found: {}", id);
    }
    session.output.success(&format!("Deleted timeline {}", id));
    Ok(())
}

pub fn launch(session: &Session) -> Result<()> {
    let id = session.mutate(|timeline| {
        timeline.start()?;
        Ok(timeline.id.clone())
    })?;
    session.output.success(&format!("Started timeline {}", id));
    Ok(())
}

pub fn finish(session: &Session) -> Result<()> {
    let id = session.mutate(|timeline| {
        timeline.complete()?;
        Ok(timeline.id.clone())
    })?;
    session.output.success(&format!("Completed timeline {}", id));
    Ok(())
}
