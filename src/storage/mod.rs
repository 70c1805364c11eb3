//! # Storage Layer
//!
//! Persistence for timelines with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Timelines | Pretty JSON, one document each | `.timeline/timelines/{id}.json` |
//! | Config | TOML | `.timeline/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`JsonFileRepository`] uses file locking (`fs2`) and atomic writes (temp file + rename)
//! - [`SharedTimelines`] serializes read-modify-write cycles per timeline id
//!
//! ## Workspace Structure
//!
//! ```text
//! .timeline/
//! ├── timelines/
//! │   └── tl-1234567.json   # One document per timeline
//! ├── config.toml           # Workspace configuration
//! └── .gitignore            # Ignores interrupted writes
//! ```

mod config;
mod json_file;
mod repository;
mod workspace;

pub use config::{
    Config, ConfigError, DependencyConfig, GlobalConfig, LogConfig, LogFormat,
    NotificationSettings, OutputFormat, ProjectConfig, WORKSPACE_DIR,
};
pub use json_file::JsonFileRepository;
pub use repository::{InMemoryRepository, RepositoryError, SharedTimelines, TimelineRepository};
pub use workspace::{Workspace, WorkspaceError};
