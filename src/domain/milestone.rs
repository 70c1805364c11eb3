//! Milestone domain model
//!
//! A milestone is a point-in-time checkpoint with a single target date
//! (`planned_end_date`). It never "runs": it is either reached, missed,
//! delayed or cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::ItemId;
use super::item::{parse_date, DateError, ItemCore, ItemStatus, TransitionError};

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(flatten)]
    pub core: ItemCore,
}

impl Milestone {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            core: ItemCore::new(id, name),
        }
    }

    /// Sets the target date
    pub fn with_target(mut self, target: DateTime<Utc>) -> Self {
        self.core.planned_end_date = Some(target);
        self
    }

    /// Sets the target date from a string (RFC 3339 or YYYY-MM-DD)
    pub fn with_target_str(self, target: &str) -> Result<Self, DateError> {
        let target = parse_date(target)?;
        Ok(self.with_target(target))
    }

    pub fn id(&self) -> &ItemId {
        &self.core.id
    }

    pub fn status(&self) -> ItemStatus {
        self.core.status
    }

    pub fn target_date(&self) -> Option<DateTime<Utc>> {
        self.core.planned_end_date
    }

    fn is_open(&self) -> bool {
        matches!(
            self.core.status,
            ItemStatus::Pending | ItemStatus::Waiting | ItemStatus::Delayed
        )
    }

    fn reject(&self, action: &'static str) -> TransitionError {
        TransitionError::new(&self.core.id, action, self.core.status)
    }

    pub fn reach(&mut self) -> Result<(), TransitionError> {
        self.reach_at(Utc::now())
    }

    /// Marks the milestone Completed at the given instant
    pub fn reach_at(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.is_open() {
            return Err(self.reject("reach"));
        }
        self.core.transition(ItemStatus::Completed, at);
        debug!(milestone = %self.core.id, on_time = self.is_reached_on_time(), "milestone reached");
        Ok(())
    }

    pub fn miss(&mut self, reason: Option<&str>) -> Result<(), TransitionError> {
        if !self.is_open() {
            return Err(self.reject("miss"));
        }
        self.core.record_reason("miss", reason);
        self.core.transition(ItemStatus::Failed, Utc::now());
        Ok(())
    }

    /// Moves the target date and marks the milestone Delayed
    pub fn delay(
        &mut self,
        new_target: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), TransitionError> {
        if !self.is_open() {
            return Err(self.reject("delay"));
        }
        self.core.record_reason("delay", reason);
        self.core.planned_end_date = Some(new_target);
        self.core.transition(ItemStatus::Delayed, Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<&str>) -> Result<(), TransitionError> {
        if !self.is_open() {
            return Err(self.reject("cancel"));
        }
        self.core.record_reason("cancellation", reason);
        self.core.transition(ItemStatus::Cancelled, Utc::now());
        Ok(())
    }

    pub(crate) fn set_waiting(&mut self, waiting: bool) {
        match (self.core.status, waiting) {
            (ItemStatus::Pending, true) => self.core.status = ItemStatus::Waiting,
            (ItemStatus::Waiting, false) => self.core.status = ItemStatus::Pending,
            _ => {}
        }
    }

    /// True only when reached no later than the target date (equality is on time)
    pub fn is_reached_on_time(&self) -> bool {
        if self.core.status != ItemStatus::Completed {
            return false;
        }
        match (self.core.actual_end_date, self.core.planned_end_date) {
            (Some(actual), Some(planned)) => actual <= planned,
            _ => false,
        }
    }

    /// Whole days early (positive) or late (negative), rounded down
    pub fn days_early_or_late(&self) -> Option<i64> {
        if self.core.status != ItemStatus::Completed {
            return None;
        }
        let planned = self.core.planned_end_date?;
        let actual = self.core.actual_end_date?;
        let diff = (planned - actual).num_milliseconds();
        Some(diff.div_euclid(MILLIS_PER_DAY))
    }
}
