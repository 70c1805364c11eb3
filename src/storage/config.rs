//! Configuration handling for rollout timelines
//!
//! Configuration is stored in `.timeline/config.toml` (workspace) and
//! `~/.config/rollout-timeline/config.toml` (global). Workspace settings win
//! where both files set the same key.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::StrategyKind;
use crate::notify::Channel;

/// Name of the per-workspace directory
pub const WORKSPACE_DIR: &str = ".timeline";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// How dependency edges are checked on insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Reject edges that would close a blocking cycle
    pub eager_cycle_check: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            eager_cycle_check: true,
        }
    }
}

/// Notification delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Per-handler timeout in milliseconds
    pub timeout_ms: u64,

    /// Channel used by `notify add` when none is given
    pub default_channel: Channel,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            default_channel: Channel::Console,
        }
    }
}

impl NotificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings (overridden by `RUST_LOG` and `--verbose`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Workspace-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    /// Strategy used by `timeline progress`
    pub progress_strategy: Option<StrategyKind>,

    pub dependencies: DependencyConfig,

    pub notifications: NotificationSettings,

    pub log: Option<LogConfig>,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Recorded as `createdBy` on new timelines
    pub author: Option<String>,

    pub progress_strategy: Option<StrategyKind>,

    pub log: Option<LogConfig>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + workspace)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project_root = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_root_from(&dir));
        let project = match &project_root {
            Some(root) => Self::load_project_config(root)?,
            None => ProjectConfig::default(),
        };

        Ok(Self {
            project,
            global,
            project_root,
        })
    }

    /// Loads configuration for a specific workspace
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "rollout", "rollout-timeline")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads workspace configuration from a specific root
    pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(WORKSPACE_DIR).join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read workspace config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse workspace config")?;
        config.validate()?;
        Ok(config)
    }

    /// Finds the workspace root by looking for `.timeline/` in `start` or a parent
    pub fn find_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns the workspace root, or an error if not in a workspace
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a timeline workspace. Run 'timeline init' first."))
    }

    pub fn progress_strategy(&self) -> StrategyKind {
        self.project
            .progress_strategy
            .or(self.global.progress_strategy)
            .unwrap_or_default()
    }

    pub fn log(&self) -> LogConfig {
        self.project
            .log
            .clone()
            .or_else(|| self.global.log.clone())
            .unwrap_or_default()
    }

    pub fn eager_cycle_check(&self) -> bool {
        self.project.dependencies.eager_cycle_check
    }

    pub fn notifications(&self) -> &NotificationSettings {
        &self.project.notifications
    }

    /// Author recorded on new timelines: config, then `$USER`
    pub fn author(&self) -> Option<String> {
        self.global
            .author
            .clone()
            .or_else(|| std::env::var("USER").ok())
    }

    /// Saves the workspace configuration
    pub fn save_project(&self) -> Result<()> {
        let root = self.require_project_root()?;
        let config_path = root.join(WORKSPACE_DIR).join("config.toml");

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize workspace config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write workspace config: {}", config_path.display()))
    }
}

impl ProjectConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.notifications.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "notifications.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();

        assert_eq!(config.progress_strategy(), StrategyKind::Equal);
        assert!(config.eager_cycle_check());
        assert_eq!(config.notifications().timeout(), Duration::from_secs(5));
        assert_eq!(config.notifications().default_channel, Channel::Console);
        assert_eq!(config.log().level, "warn");
        assert_eq!(config.global.default_format, OutputFormat::Text);
    }

    #[test]
    fn parse_project_config() {
        let toml = r#"
progress_strategy = "time"

[dependencies]
eager_cycle_check = false

[notifications]
timeout_ms = 250
default_channel = "slack"

[log]
level = "debug"
format = "json"
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.progress_strategy, Some(StrategyKind::Time));
        assert!(!config.dependencies.eager_cycle_check);
        assert_eq!(config.notifications.timeout_ms, 250);
        assert_eq!(config.notifications.default_channel, Channel::Slack);
        let log = config.log.unwrap();
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
    }

    #[test]
    fn parse_global_config() {
        let toml = r#"
default_format = "json"
author = "release-bot"
progress_strategy = "priority"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
        assert_eq!(config.author, Some("release-bot".to_string()));
    }

    #[test]
    fn project_overrides_global() {
        let mut config = Config::default();
        config.global.progress_strategy = Some(StrategyKind::Priority);
        assert_eq!(config.progress_strategy(), StrategyKind::Priority);

        config.project.progress_strategy = Some(StrategyKind::Time);
        assert_eq!(config.progress_strategy(), StrategyKind::Time);
    }

    #[test]
    fn rejects_zero_timeout() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(WORKSPACE_DIR)).unwrap();
        fs::write(
            dir.path().join(WORKSPACE_DIR).join("config.toml"),
            "[notifications]\ntimeout_ms = 0\n",
        )
        .unwrap();

        assert!(Config::load_project_config(dir.path()).is_err());
    }

    #[test]
    fn find_root_walks_parents() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(WORKSPACE_DIR)).unwrap();
        let sub_dir = dir.path().join("sub").join("dir");
        fs::create_dir_all(&sub_dir).unwrap();

        assert_eq!(Config::find_root_from(&sub_dir), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn config_not_in_project() {
        let config = Config::default();
        assert!(config.require_project_root().is_err());
    }
}
