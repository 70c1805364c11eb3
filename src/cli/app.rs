//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::session::Session;
use super::{item, logging, notify_cmd, query, timeline_cmd};
use crate::domain::StrategyKind;
use crate::storage::{Config, Workspace};

#[derive(Parser)]
#[command(name = "timeline")]
#[command(author, version, about = "Dependency-aware rollout timelines")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the configured format, else text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Timeline to operate on (optional when the workspace holds only one)
    #[arg(long, short = 't', global = true, env = "TIMELINE_ID")]
    pub timeline: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a timeline workspace
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Create a timeline
    New {
        /// Timeline name
        name: String,

        /// Explicit timeline id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Version label of the release
        #[arg(long, default_value = "1.0.0")]
        release: String,
    },

    /// List timelines in this workspace
    List,

    /// Show a timeline and its items
    Show,

    /// Delete a timeline
    Delete {
        /// Timeline ID
        id: String,
    },

    /// Start the timeline itself
    Launch,

    /// Complete the timeline itself
    Finish,

    /// Manage stages
    #[command(subcommand)]
    Stage(item::StageCommands),

    /// Manage milestones
    #[command(subcommand)]
    Milestone(item::MilestoneCommands),

    /// Manage stage tasks
    #[command(subcommand)]
    Task(item::TaskCommands),

    /// Manage dependencies between items
    #[command(subcommand)]
    Dep(item::DepCommands),

    /// Start a stage
    Start {
        /// Stage ID
        item: String,
    },

    /// Complete a stage (or reach a milestone)
    Complete {
        /// Item ID
        item: String,
    },

    /// Mark a stage failed (or a milestone missed)
    Fail {
        /// Item ID
        item: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Pause a running stage
    Pause {
        /// Stage ID
        item: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Resume a paused stage
    Resume {
        /// Stage ID
        item: String,
    },

    /// Cancel an item
    Cancel {
        /// Item ID
        item: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Delay an item to a new end (or target) date
    Delay {
        /// Item ID
        item: String,

        /// New date (YYYY-MM-DD or RFC 3339)
        date: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Reach a milestone
    Reach {
        /// Milestone ID
        item: String,
    },

    /// Mark a milestone missed
    Miss {
        /// Milestone ID
        item: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Show items ready to start
    Ready,

    /// Suggest what to work on next
    Next {
        /// Maximum number of suggestions
        #[arg(long, short = 'n', default_value = "5")]
        limit: usize,
    },

    /// Show the critical path
    CriticalPath,

    /// Estimate the completion date
    Estimate,

    /// Check the timeline for structural problems
    Validate,

    /// Show progress
    Progress {
        /// Progress strategy (defaults to the configured one)
        #[arg(long, short = 's')]
        strategy: Option<StrategyKind>,

        /// Store the strategy as the workspace default
        #[arg(long, requires = "strategy")]
        save: bool,
    },

    /// Manage notification rules
    #[command(subcommand)]
    Notify(notify_cmd::NotifyCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    logging::init(cli.verbose, &config.log());

    let format = cli
        .format
        .unwrap_or_else(|| config.global.default_format.into());
    let output = Output::new(format, cli.verbose);

    match cli.command {
        Commands::Init { path } => init(&output, &path),
        command => {
            let session = Session::open(&output, cli.timeline)?;
            dispatch(command, &session)
        }
    }
}

fn init(output: &Output, path: &str) -> Result<()> {
    output.verbose_ctx("init", &format!("Initializing workspace at: {}", path));
    let workspace = Workspace::init(path)?;
    output.verbose_ctx(
        "init",
        &format!(
            "Created .timeline directory at: {}",
            workspace.timeline_dir().display()
        ),
    );
    output.success(&format!(
        "Initialized timeline workspace at {}",
        workspace.root().display()
    ));
    Ok(())
}

fn dispatch(command: Commands, session: &Session) -> Result<()> {
    let output = session.output;

    match command {
        Commands::Init { path } => init(output, &path)?,

        Commands::New { name, id, release } => {
            timeline_cmd::create(session, &name, id.as_deref(), &release)?
        }
        Commands::List => timeline_cmd::list(session)?,
        Commands::Show => timeline_cmd::show(session)?,
        Commands::Delete { id } => timeline_cmd::delete(session, &id)?,
        Commands::Launch => timeline_cmd::launch(session)?,
        Commands::Finish => timeline_cmd::finish(session)?,

        Commands::Stage(cmd) => item::run_stage(cmd, session)?,
        Commands::Milestone(cmd) => item::run_milestone(cmd, session)?,
        Commands::Task(cmd) => item::run_task(cmd, session)?,
        Commands::Dep(cmd) => item::run_dep(cmd, session)?,

        Commands::Start { item: id } => item::transition(session, &id, item::Transition::Start)?,
        Commands::Complete { item: id } => {
            item::transition(session, &id, item::Transition::Complete)?
        }
        Commands::Fail { item: id, reason } => {
            item::transition(session, &id, item::Transition::Fail(reason))?
        }
        Commands::Pause { item: id, reason } => {
            item::transition(session, &id, item::Transition::Pause(reason))?
        }
        Commands::Resume { item: id } => {
            item::transition(session, &id, item::Transition::Resume)?
        }
        Commands::Cancel { item: id, reason } => {
            item::transition(session, &id, item::Transition::Cancel(reason))?
        }
        Commands::Delay {
            item: id,
            date,
            reason,
        } => item::transition(session, &id, item::Transition::Delay(date, reason))?,
        Commands::Reach { item: id } => item::transition(session, &id, item::Transition::Reach)?,
        Commands::Miss { item: id, reason } => {
            item::transition(session, &id, item::Transition::Miss(reason))?
        }

        Commands::Ready => query::ready(session)?,
        Commands::Next { limit } => {
            output.verbose_ctx("next", &format!("Limit: {}", limit));
            query::next(session, limit)?
        }
        Commands::CriticalPath => query::critical_path(session)?,
        Commands::Estimate => query::estimate(session)?,
        Commands::Validate => query::validate(session)?,
        Commands::Progress { strategy, save } => query::progress(session, strategy, save)?,

        Commands::Notify(cmd) => notify_cmd::run(cmd, session)?,
    }

    Ok(())
}
