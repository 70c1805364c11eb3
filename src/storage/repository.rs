//! Timeline persistence contract and the in-memory implementation

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::domain::{Timeline, TimelineDocument, TimelineError, TimelineId};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Timeline not found: {0}")]
    NotFound(TimelineId),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize timeline {id}: {source}")]
    Serialize {
        id: TimelineId,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored timeline is inconsistent: {0}")]
    Corrupt(TimelineError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("Repository lock poisoned")]
    Poisoned,
}

/// Storage for whole timeline aggregates
pub trait TimelineRepository: Send + Sync {
    /// Inserts or replaces a timeline
    fn save_timeline(&self, timeline: &Timeline) -> Result<(), RepositoryError>;

    fn get_timeline(&self, id: &TimelineId) -> Result<Option<Timeline>, RepositoryError>;

    /// All timelines, oldest first
    fn list_timelines(&self) -> Result<Vec<Timeline>, RepositoryError>;

    /// Returns false if there was nothing to delete
    fn delete_timeline(&self, id: &TimelineId) -> Result<bool, RepositoryError>;

    /// Like `get_timeline`, but a missing timeline is an error
    fn require_timeline(&self, id: &TimelineId) -> Result<Timeline, RepositoryError> {
        self.get_timeline(id)?
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }
}

pub(crate) fn sort_timelines(timelines: &mut [Timeline]) {
    timelines.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Keeps timelines in a map keyed by id
///
/// Timelines are stored in their persisted shape, so event subscriptions
/// never leak between callers.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    timelines: RwLock<HashMap<TimelineId, TimelineDocument>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimelineRepository for InMemoryRepository {
    fn save_timeline(&self, timeline: &Timeline) -> Result<(), RepositoryError> {
        let doc = TimelineDocument::from(timeline.clone());
        self.timelines
            .write()
            .map_err(|_| RepositoryError::Poisoned)?
            .insert(timeline.id.clone(), doc);
        debug!(timeline = %timeline.id, "timeline saved in memory");
        Ok(())
    }

    fn get_timeline(&self, id: &TimelineId) -> Result<Option<Timeline>, RepositoryError> {
        let timelines = self.timelines.read().map_err(|_| RepositoryError::Poisoned)?;
        timelines
            .get(id)
            .map(|doc| Timeline::try_from(doc.clone()).map_err(RepositoryError::Corrupt))
            .transpose()
    }

    fn list_timelines(&self) -> Result<Vec<Timeline>, RepositoryError> {
        let timelines = self.timelines.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut all = timelines
            .values()
            .map(|doc| Timeline::try_from(doc.clone()).map_err(RepositoryError::Corrupt))
            .collect::<Result<Vec<_>, _>>()?;
        sort_timelines(&mut all);
        Ok(all)
    }

    fn delete_timeline(&self, id: &TimelineId) -> Result<bool, RepositoryError> {
        Ok(self
            .timelines
            .write()
            .map_err(|_| RepositoryError::Poisoned)?
            .remove(id)
            .is_some())
    }
}

/// Serializes read-modify-write cycles per timeline id over any repository
pub struct SharedTimelines<R> {
    repo: R,
    locks: Mutex<HashMap<TimelineId, Arc<Mutex<()>>>>,
}

impl<R: TimelineRepository> SharedTimelines<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    fn lock_for(&self, id: &TimelineId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        let mut locks = self.locks.lock().map_err(|_| RepositoryError::Poisoned)?;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    /// Loads, mutates and saves a timeline while holding its lock
    ///
    /// Nothing is saved when `apply` fails.
    pub fn update<T, F>(&self, id: &TimelineId, apply: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Timeline) -> Result<T, TimelineError>,
    {
        let lock = self.lock_for(id)?;
        let _guard = lock.lock().map_err(|_| RepositoryError::Poisoned)?;

        let mut timeline = self.repo.require_timeline(id)?;
        let result = apply(&mut timeline)?;
        self.repo.save_timeline(&timeline)?;
        Ok(result)
    }

    /// Reads a timeline without racing a concurrent `update`
    pub fn read(&self, id: &TimelineId) -> Result<Timeline, RepositoryError> {
        let lock = self.lock_for(id)?;
        let _guard = lock.lock().map_err(|_| RepositoryError::Poisoned)?;
        self.repo.require_timeline(id)
    }
}
