//! Workspace management
//!
//! Handles workspace initialization and provides access to the timeline store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::WORKSPACE_DIR;
use super::{Config, JsonFileRepository};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not in a timeline workspace. Run 'timeline init' first.")]
    NotInWorkspace,
}

/// A directory holding `.timeline/`
pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    /// Opens an existing workspace at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(WORKSPACE_DIR).is_dir() {
            return Err(WorkspaceError::NotInWorkspace.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the workspace at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let root = Config::find_root_from(&cwd).ok_or(WorkspaceError::NotInWorkspace)?;

        Self::open(root)
    }

    /// Initializes a workspace at the given path (idempotent)
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);

        let timelines_dir = dir.join("timelines");
        fs::create_dir_all(&timelines_dir).with_context(|| {
            format!(
                "Failed to create timelines directory: {}",
                timelines_dir.display()
            )
        })?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# Rollout timeline configuration

# Progress strategy: equal, priority or time
progress_strategy = "equal"

[dependencies]
# Reject dependencies that would create a cycle
eager_cycle_check = true

[notifications]
timeout_ms = 5000
default_channel = "console"
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = "# Interrupted writes\ntimelines/*.json.tmp\n";
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .timeline directory path
    pub fn timeline_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the timeline store
    pub fn repository(&self) -> JsonFileRepository {
        JsonFileRepository::new(self.timeline_dir().join("timelines"))
    }
}
