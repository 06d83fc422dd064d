//! Logging setup for swarmrunner using tracing.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::default_log_dir;

/// Initialize logging with a daily file appender and console output.
///
/// `file_stem` distinguishes server and client logs; the returned guard
/// must be held for as long as logs should be flushed.
pub fn init(log_dir: Option<&Path>, file_stem: &str) -> Result<(WorkerGuard, PathBuf)> {
    // Explicit directory wins over the platform data dir
    let log_dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&log_dir)?;

    // One rolling file per role, e.g. server.log.2026-10-19
    let file_appender = tracing_appender::rolling::daily(&log_dir, format!("{}.log", file_stem));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,swarmrunner=debug"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true);

    // Fails if a subscriber is already set
    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(role = file_stem, "swarmrunner logging initialized");
    tracing::info!("Log directory: {}", log_dir.display());

    Ok((guard, log_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_directory() {
        let temp_dir = TempDir::new().unwrap();
        let wanted = temp_dir.path().join("nested").join("logs");

        let (guard, log_dir) = init(Some(&wanted), "server").unwrap();
        assert_eq!(log_dir, wanted);
        assert!(wanted.is_dir());

        // A second subscriber cannot be installed in the same process.
        assert!(init(Some(&wanted), "server").is_err());
        drop(guard);
    }
}
