//! Tracing subscriber setup for host applications.
//!
//! The library itself only emits `tracing` events; hosts that have no
//! subscriber of their own can install one with [`init_logging`]:
//!
//! ```no_run
//! use panotile::config::LoggingConfig;
//! use panotile::logging::init_logging;
//!
//! let config = LoggingConfig::default().with_filter("panotile=debug");
//! // Keep the guard alive for the life of the process
//! let _guard = init_logging(&config).expect("logging");
//! ```

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// File name prefix of the daily log files.
pub const LOG_FILE_PREFIX: &str = "panotile.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("cannot create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Filter from `RUST_LOG` when set and non-empty, else from `directive`.
pub fn build_filter(directive: &str, env: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let filter = match env {
        Some(value) if !value.trim().is_empty() => value,
        _ => directive,
    };
    EnvFilter::try_new(filter).map_err(|e| LoggingError::InvalidFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })
}

/// Install a console subscriber, plus a daily-rotated file when
/// `config.log_dir` is set.
///
/// Returns the file writer's guard; dropping it flushes and stops the
/// background writer.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&config.filter, env.as_deref())?;

    let console = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(true);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::debug!(
        filter = %config.filter,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );
    Ok(guard)
}
