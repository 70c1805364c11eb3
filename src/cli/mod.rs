//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Workspace | Timeline management | `init`, `new`, `list`, `show`, `delete` |
//! | Items | Stages, milestones and their tasks | `stage add`, `milestone add`, `task done` |
//! | Dependencies | Ordering between items | `dep add`, `dep remove` |
//! | Transitions | Item lifecycle | `start`, `complete`, `pause`, `delay`, `reach` |
//! | Analysis | Read-only queries | `ready`, `next`, `critical-path`, `estimate`, `validate`, `progress` |
//! | Notifications | Rules and delivery | `notify add`, `notify test`, `notify fire` |
//!
//! ## Selecting a Timeline
//!
//! Commands act on the workspace's only timeline, or on the one named by
//! `--timeline <id>` (or `TIMELINE_ID`) when there are several.
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output and debug-level logs:
//! ```bash
//! timeline --verbose ready
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod item;
mod logging;
mod notify_cmd;
mod output;
mod query;
mod session;
mod timeline_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
