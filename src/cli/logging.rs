//! Diagnostic logging setup
//!
//! Logs go to stderr so they never mix with command output on stdout.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::storage::{LogConfig, LogFormat};

static INIT: Once = Once::new();

/// Picks the filter directive: `RUST_LOG`, then `--verbose`, then config
fn filter(verbose: bool, config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { config.level.as_str() };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    })
}

/// Installs the global subscriber; later calls are no-ops
pub fn init(verbose: bool, config: &LogConfig) {
    INIT.call_once(|| {
        let env_filter = filter(verbose, config);

        match config.format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .try_init();
            }
            LogFormat::Text => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .with_writer(std::io::stderr),
                    )
                    .try_init();
            }
        }
    });
}
