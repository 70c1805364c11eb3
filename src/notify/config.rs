//! Notification configuration: triggers, channels and conditions
//!
//! Configs live on the timeline and are persisted with it, so everything
//! here is plain serializable data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::{ItemId, ItemStatus, Priority, TimelineEvent, TimelineItem};

/// Lifecycle point that fires a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Trigger {
    StageStart,
    StageComplete,
    MilestoneReached,
    MilestoneMissed,
    TimelineStart,
    TimelineComplete,
    DependencyReady,
    /// Host-defined trigger, fired explicitly by name
    Custom(String),
}

impl Trigger {
    /// Maps a timeline event to the trigger it fires, if any
    pub fn for_event(event: &TimelineEvent) -> Option<Trigger> {
        match event {
            TimelineEvent::StageStarted { .. } => Some(Trigger::StageStart),
            TimelineEvent::StageCompleted { .. } => Some(Trigger::StageComplete),
            TimelineEvent::MilestoneReached { .. } => Some(Trigger::MilestoneReached),
            TimelineEvent::MilestoneMissed { .. } => Some(Trigger::MilestoneMissed),
            TimelineEvent::TimelineStarted { .. } => Some(Trigger::TimelineStart),
            TimelineEvent::TimelineCompleted { .. } => Some(Trigger::TimelineComplete),
            TimelineEvent::DependencyReady { .. } => Some(Trigger::DependencyReady),
            _ => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::StageStart => f.write_str("stage_start"),
            Trigger::StageComplete => f.write_str("stage_complete"),
            Trigger::MilestoneReached => f.write_str("milestone_reached"),
            Trigger::MilestoneMissed => f.write_str("milestone_missed"),
            Trigger::TimelineStart => f.write_str("timeline_start"),
            Trigger::TimelineComplete => f.write_str("timeline_complete"),
            Trigger::DependencyReady => f.write_str("dependency_ready"),
            Trigger::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stage_start" => Ok(Trigger::StageStart),
            "stage_complete" => Ok(Trigger::StageComplete),
            "milestone_reached" => Ok(Trigger::MilestoneReached),
            "milestone_missed" => Ok(Trigger::MilestoneMissed),
            "timeline_start" => Ok(Trigger::TimelineStart),
            "timeline_complete" => Ok(Trigger::TimelineComplete),
            "dependency_ready" => Ok(Trigger::DependencyReady),
            other => match other.strip_prefix("custom:") {
                Some(name) if !name.trim().is_empty() => Ok(Trigger::Custom(name.to_string())),
                _ => Err(format!("Unknown trigger: {}", other)),
            },
        }
    }
}

impl TryFrom<String> for Trigger {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Trigger> for String {
    fn from(trigger: Trigger) -> Self {
        trigger.to_string()
    }
}

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Slack,
    Webhook,
    Sms,
    Console,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Slack => "slack",
            Channel::Webhook => "webhook",
            Channel::Sms => "sms",
            Channel::Console => "console",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "slack" => Ok(Channel::Slack),
            "webhook" => Ok(Channel::Webhook),
            "sms" => Ok(Channel::Sms),
            "console" => Ok(Channel::Console),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// Predicate over the item an event is about
///
/// Events without an item (timeline start/complete) only pass conditions
/// that do not look at the item: an empty `all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    StatusIs { status: ItemStatus },
    PriorityAtLeast { priority: Priority },
    ItemIdIs { id: ItemId },
    MetadataEquals { key: String, value: Value },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
}

impl Condition {
    pub fn evaluate(&self, item: Option<&TimelineItem>) -> bool {
        match self {
            Condition::All { conditions } => conditions.iter().all(|c| c.evaluate(item)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.evaluate(item)),
            Condition::StatusIs { status } => item.is_some_and(|i| i.status() == *status),
            Condition::PriorityAtLeast { priority } => {
                item.is_some_and(|i| i.core().priority >= *priority)
            }
            Condition::ItemIdIs { id } => item.is_some_and(|i| i.id() == id),
            Condition::MetadataEquals { key, value } => {
                item.is_some_and(|i| i.core().metadata.get(key) == Some(value))
            }
        }
    }
}

/// One notification rule attached to a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub trigger: Trigger,
    pub channel: Channel,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Channel-specific settings (webhook URL, slack channel, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_config: Option<Value>,
}

impl NotificationConfig {
    pub fn new(trigger: Trigger, channel: Channel, template: impl Into<String>) -> Self {
        Self {
            trigger,
            channel,
            template: template.into(),
            recipients: None,
            condition: None,
            channel_config: None,
        }
    }

    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = Some(recipients);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_channel_config(mut self, config: Value) -> Self {
        self.channel_config = Some(config);
        self
    }

    /// True if this config fires for `trigger` on `item`
    pub fn matches(&self, trigger: &Trigger, item: Option<&TimelineItem>) -> bool {
        &self.trigger == trigger
            && self
                .condition
                .as_ref()
                .is_none_or(|condition| condition.evaluate(item))
    }
}
