//! JSON file storage for timelines
//!
//! Each timeline lives in `{dir}/{id}.json` as one pretty-printed document.
//! Writes go to a locked temp file that is renamed over the target, so a
//! reader never sees a half-written timeline.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, warn};

use super::repository::{sort_timelines, RepositoryError, TimelineRepository};
use crate::domain::{Timeline, TimelineId};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RepositoryError + '_ {
    move |source| RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Store for timelines as one JSON file each
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Creates a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for a timeline id
    pub fn path_for(&self, id: &TimelineId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn read_file(&self, path: &Path) -> Result<Timeline, RepositoryError> {
        let file = File::open(path).map_err(io_error(path))?;

        // Acquire shared lock for reading
        file.lock_shared().map_err(io_error(path))?;

        serde_json::from_reader(BufReader::new(&file)).map_err(|source| RepositoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
        // Lock is released when file is dropped
    }
}

impl TimelineRepository for JsonFileRepository {
    fn save_timeline(&self, timeline: &Timeline) -> Result<(), RepositoryError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let path = self.path_for(&timeline.id);
        let temp_path = path.with_extension("json.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(io_error(&temp_path))?;

            // Acquire exclusive lock
            file.lock_exclusive().map_err(io_error(&temp_path))?;

            let mut writer = BufWriter::new(&file);
            serde_json::to_writer_pretty(&mut writer, timeline).map_err(|source| {
                RepositoryError::Serialize {
                    id: timeline.id.clone(),
                    source,
                }
            })?;
            writeln!(writer).map_err(io_error(&temp_path))?;
            writer.flush().map_err(io_error(&temp_path))?;
            drop(writer);
            file.sync_all().map_err(io_error(&temp_path))?;
        }

        // Atomic rename
        fs::rename(&temp_path, &path).map_err(io_error(&path))?;

        debug!(timeline = %timeline.id, path = %path.display(), "timeline written");
        Ok(())
    }

    fn get_timeline(&self, id: &TimelineId) -> Result<Option<Timeline>, RepositoryError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_file(&path).map(Some)
    }

    fn list_timelines(&self) -> Result<Vec<Timeline>, RepositoryError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.dir)(err)),
        };

        let mut timelines = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error(&self.dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                timelines.push(self.read_file(&path)?);
            } else if path.to_string_lossy().ends_with(".json.tmp") {
                warn!(path = %path.display(), "ignoring leftover temp file");
            }
        }

        sort_timelines(&mut timelines);
        Ok(timelines)
    }

    fn delete_timeline(&self, id: &TimelineId) -> Result<bool, RepositoryError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(timeline = %id, "timeline deleted");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(&path)(err)),
        }
    }
}
