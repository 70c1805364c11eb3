//! Notification rule commands

use anyhow::{anyhow, bail, Result};
use clap::Subcommand;

use super::session::{runtime, Session};
use crate::domain::{ItemId, ItemStatus, Priority};
use crate::notify::{Channel, Condition, NotificationConfig, Trigger};

#[derive(Subcommand)]
pub enum NotifyCommands {
    /// Attach a notification rule to the timeline
    ///
    /// Templates may reference ${timeline.name}, ${item.name}, ${item.status}, ...
    ///
    /// Examples:
    ///   timeline notify add --trigger stage_complete --template '${item.name} done'
    ///   timeline notify add --trigger custom:rollback --channel slack --template 'Rolling back'
    Add {
        /// stage_start, stage_complete, milestone_reached, milestone_missed,
        /// timeline_start, timeline_complete, dependency_ready or custom:NAME
        #[arg(long)]
        trigger: Trigger,

        /// Delivery channel (defaults to the configured channel)
        #[arg(long)]
        channel: Option<Channel>,

        /// Message template
        #[arg(long)]
        template: String,

        /// Recipient (repeatable)
        #[arg(long = "recipient")]
        recipients: Vec<String>,

        /// Only fire for items at or above this priority
        #[arg(long)]
        min_priority: Option<Priority>,

        /// Only fire for items in this status
        #[arg(long)]
        status: Option<ItemStatus>,

        /// Only fire for this item
        #[arg(long)]
        item: Option<String>,
    },

    /// List notification rules
    List,

    /// Remove a notification rule
    Remove {
        /// Rule index (see `notify list`)
        index: usize,
    },

    /// Send one rule now, ignoring its trigger and condition
    Test {
        /// Rule index (see `notify list`)
        index: usize,

        /// Item to render the template against
        #[arg(long)]
        item: Option<String>,
    },

    /// Fire the rules for a custom trigger
    Fire {
        /// Custom trigger name (without the `custom:` prefix)
        name: String,

        /// Item the trigger is about
        #[arg(long)]
        item: Option<String>,
    },
}

pub fn run(cmd: NotifyCommands, session: &Session) -> Result<()> {
    match cmd {
        NotifyCommands::Add {
            trigger,
            channel,
            template,
            recipients,
            min_priority,
            status,
            item,
        } => {
            let channel =
                channel.unwrap_or(session.workspace.config().notifications().default_channel);
            let item = item.as_deref().map(Session::parse_item).transpose()?;
            let mut config = NotificationConfig::new(trigger, channel, template);
            if !recipients.is_empty() {
                config = config.with_recipients(recipients);
            }
            if let Some(condition) = build_condition(min_priority, status, item) {
                config = config.with_condition(condition);
            }
            add_rule(session, config)
        }
        NotifyCommands::List => list_rules(session),
        NotifyCommands::Remove { index } => remove_rule(session, index),
        NotifyCommands::Test { index, item } => test_rule(session, index, item.as_deref()),
        NotifyCommands::Fire { name, item } => fire_custom(session, &name, item.as_deref()),
    }
}

/// Combines the filter flags; several flags must all hold
fn build_condition(
    min_priority: Option<Priority>,
    status: Option<ItemStatus>,
    item: Option<ItemId>,
) -> Option<Condition> {
    let mut conditions = Vec::new();
    if let Some(priority) = min_priority {
        conditions.push(Condition::PriorityAtLeast { priority });
    }
    if let Some(status) = status {
        conditions.push(Condition::StatusIs { status });
    }
    if let Some(id) = item {
        conditions.push(Condition::ItemIdIs { id });
    }

    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(Condition::All { conditions }),
    }
}

fn add_rule(session: &Session, config: NotificationConfig) -> Result<()> {
    let trigger = config.trigger.clone();
    let channel = config.channel;
    let index = session.mutate(|timeline| {
        timeline.notifications.push(config);
        Ok(timeline.notifications.len() - 1)
    })?;

    let output = session.output;
    if output.is_json() {
        output.data(&serde_json::json!({
            "index": index,
            "trigger": trigger,
            "channel": channel,
        }));
    } else {
        println!("Added notification [{}]: {} via {}", index, trigger, channel);
    }
    Ok(())
}

fn list_rules(session: &Session) -> Result<()> {
    let output = session.output;
    let timeline = session.load()?;

    if output.is_json() {
        output.data(&timeline.notifications);
    } else if timeline.notifications.is_empty() {
        println!("No notification rules.");
    } else {
        for (index, config) in timeline.notifications.iter().enumerate() {
            let recipients = config
                .recipients
                .as_ref()
                .map(|r| r.join(","))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] {:<20} {:<8} {:<20} {}",
                index,
                config.trigger.to_string(),
                config.channel.as_str(),
                recipients,
                config.template
            );
        }
    }
    Ok(())
}

fn remove_rule(session: &Session, index: usize) -> Result<()> {
    let removed = session.mutate(|timeline| {
        if index < timeline.notifications.len() {
            Ok(Some(timeline.notifications.remove(index)))
        } else {
            Ok(None)
        }
    })?;

    match removed {
        Some(config) => {
            session.output.success(&format!(
                "Removed notification [{}]: {} via {}",
                index, config.trigger, config.channel
            ));
            Ok(())
        }
        None => bail!("No notification rule at index {}", index),
    }
}

fn test_rule(session: &Session, index: usize, item: Option<&str>) -> Result<()> {
    let timeline = session.load()?;
    let config = timeline
        .notifications
        .get(index)
        .ok_or_else(|| anyhow!("No notification rule at index {}", index))?;
    let item = match item {
        Some(raw) => {
            let id = Session::parse_item(raw)?;
            Some(
                timeline
                    .get(&id)
                    .ok_or_else(|| anyhow!("Item not found: {}", id))?,
            )
        }
        None => None,
    };

    let service = session.notification_service();
    let delivered = runtime()?.block_on(service.send_notification(config, &timeline, item))?;

    let output = session.output;
    if output.is_json() {
        output.data(&serde_json::json!({ "index": index, "delivered": delivered }));
    } else if delivered {
        println!("Notification [{}] delivered via {}", index, config.channel);
    } else {
        bail!("Notification [{}] was not delivered", index);
    }
    Ok(())
}

fn fire_custom(session: &Session, name: &str, item: Option<&str>) -> Result<()> {
    let timeline = session.load()?;
    let item = item.map(Session::parse_item).transpose()?;

    let service = session.notification_service();
    let outcomes =
        runtime()?.block_on(service.dispatch_custom(&timeline, name, item.as_ref()));
    session.report(&outcomes);

    let delivered = outcomes.iter().filter(|o| o.delivered()).count();
    let output = session.output;
    if output.is_json() {
        output.data(&serde_json::json!({
            "trigger": Trigger::Custom(name.to_string()),
            "matched": outcomes.len(),
            "delivered": delivered,
        }));
    } else {
        println!(
            "custom:{}: {} of {} notification(s) delivered",
            name,
            delivered,
            outcomes.len()
        );
    }
    Ok(())
}
