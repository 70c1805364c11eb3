//! Validation report for a timeline
//!
//! Errors make the dependency graph unusable for analysis; warnings are
//! informational and never change the verdict.

use serde::Serialize;
use std::fmt;

use super::id::ItemId;

/// A problem that makes the timeline invalid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// A dependency names an item that does not exist in the timeline
    UnresolvedDependency { item: ItemId, missing: ItemId },
    /// Blocking dependencies form a cycle
    Cycle { items: Vec<ItemId> },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::UnresolvedDependency { item, missing } => {
                write!(f, "{} depends on unknown item {}", item, missing)
            }
            ValidationIssue::Cycle { items } => {
                let chain: Vec<_> = items.iter().map(|i| i.as_str()).collect();
                write!(f, "cycle: {} -> {}", chain.join(" -> "), chain[0])
            }
        }
    }
}

/// Something worth a look that does not invalidate the timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationWarning {
    StageWithoutTasks { item: ItemId },
    MilestoneWithoutTarget { item: ItemId },
    /// No dependencies in either direction
    OrphanedItem { item: ItemId },
    /// Nothing is planned to finish before the milestone's target date
    NoWorkBeforeMilestone { item: ItemId },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::StageWithoutTasks { item } => {
                write!(f, "stage {} has no tasks", item)
            }
            ValidationWarning::MilestoneWithoutTarget { item } => {
                write!(f, "milestone {} has no target date", item)
            }
            ValidationWarning::OrphanedItem { item } => {
                write!(f, "{} is not part of any dependency chain", item)
            }
            ValidationWarning::NoWorkBeforeMilestone { item } => {
                write!(f, "no stage is planned to finish before milestone {}", item)
            }
        }
    }
}

/// Outcome of validating a timeline in one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn new(errors: Vec<ValidationIssue>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    #[test]
    fn verdict_follows_errors_only() {
        let report = ValidationReport::new(
            vec![],
            vec![ValidationWarning::StageWithoutTasks { item: id("a") }],
        );
        assert!(report.valid);

        let report = ValidationReport::new(
            vec![ValidationIssue::Cycle {
                items: vec![id("a"), id("b")],
            }],
            vec![],
        );
        assert!(!report.valid);
    }

    #[test]
    fn display_messages() {
        let cycle = ValidationIssue::Cycle {
            items: vec![id("a"), id("b")],
        };
        assert_eq!(cycle.to_string(), "cycle: a -> b -> a");

        let missing = ValidationIssue::UnresolvedDependency {
            item: id("a"),
            missing: id("ghost"),
        };
        assert_eq!(missing.to_string(), "a depends on unknown item ghost");
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(ValidationWarning::OrphanedItem { item: id("x") }).unwrap();
        assert_eq!(json["type"], "orphaned_item");
        assert_eq!(json["item"], "x");
    }
}
