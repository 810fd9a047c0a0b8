//! Tracing setup for the client.
//!
//! Output goes to the terminal when attached to one, otherwise to daily
//! `pgmanage.<date>.log` files under `<data_dir>/logs` with warnings echoed to
//! stderr. `PGMANAGE_LOG` (or `RUST_LOG`) overrides the built-in filter unless
//! the configuration names one.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Log file name prefix inside the log directory.
pub const LOG_FILE_PREFIX: &str = "pgmanage";

/// Where and how much the client logs. Built by
/// [`ClientConfig::log_config`](crate::config::ClientConfig::log_config).
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    /// Write rolling log files
    pub file: bool,
    /// Stdout is an interactive terminal
    pub terminal: bool,
    /// Filter directive overriding the environment
    pub filter: Option<String>,
}

impl LogConfig {
    /// Sinks actually used: a terminal always wins, and with no file sink the
    /// terminal output is the fallback.
    fn sinks(&self) -> (bool, bool) {
        let file = self.file && !self.terminal;
        (self.terminal || !file, file)
    }
}

/// Keeps the file writer flushing. Hold it until shutdown.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// A host that already installed one keeps it. When the log directory cannot
/// be used, logging continues on the terminal only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    let (terminal, file) = config.sinks();

    let (file_layer, guard) = match file.then(|| file_writer(&config)) {
        Some(Ok((writer, guard))) => {
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("pgmanage: file logging unavailable ({e}), logging to the terminal");
            (None, None)
        }
        None => (None, None),
    };

    let terminal_layer = (terminal || file_layer.is_none())
        .then(|| fmt::layer().with_ansi(config.terminal).with_target(false));
    // Files get everything; stderr only warnings when files are active
    let stderr_layer = (file_layer.is_some() && !terminal).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_filter(tracing::level_filters::LevelFilter::WARN)
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter(config.filter.as_deref()))
        .with(file_layer)
        .with(terminal_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(log_dir = %config.log_dir.display(), file = guard.is_some(), "Logging initialized");
    }
    LoggingGuard { _file: guard }
}

fn file_writer(
    config: &LogConfig,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(&config.log_dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Configured directive, then `PGMANAGE_LOG`, then `RUST_LOG`, then the
/// build default. An unparsable configured directive falls back to the default.
fn env_filter(configured: Option<&str>) -> EnvFilter {
    let filter = match configured {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_env("PGMANAGE_LOG")
            .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
            .ok(),
    };
    filter.unwrap_or_else(|| EnvFilter::new(default_filter()))
}

/// Built-in filter: chatty in debug builds, quiet HTTP internals always.
pub fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug,pgmanage=trace,pgmanage_core=trace,hyper=warn,reqwest=warn"
    } else {
        "info,hyper=warn,reqwest=warn"
    }
}
