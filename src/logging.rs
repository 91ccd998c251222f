use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how a run logs.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for the daily rotating log files
    pub log_dir: Utf8PathBuf,

    /// Prefix for log file names (e.g., "projzip")
    pub log_prefix: String,

    /// Debug level instead of info, unless `RUST_LOG` is set
    pub debug_mode: bool,

    /// Mirror events to stderr
    pub console_output: bool,

    /// Write the file log as JSON lines
    pub json: bool,
}

impl LogOptions {
    pub fn new(log_dir: impl Into<Utf8PathBuf>, log_prefix: &str) -> Self {
        Self {
            log_dir: log_dir.into(),
            log_prefix: log_prefix.to_string(),
            debug_mode: false,
            console_output: true,
            json: false,
        }
    }

    fn filter(&self) -> EnvFilter {
        let default_level = if self.debug_mode { "debug" } else { "info" };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    }
}

/// Create the log directory if it doesn't exist
pub fn ensure_log_dir(options: &LogOptions) -> Result<()> {
    if !options.log_dir.exists() {
        fs::create_dir_all(&options.log_dir)
            .with_context(|| format!("Failed to create log directory: {}", options.log_dir))?;
    }
    Ok(())
}

/// Setup logging with a rotating file appender and optional console output.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
///
/// # Errors
/// Fails when the log directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging(options: &LogOptions) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    ensure_log_dir(options)?;

    let file_appender = rolling::daily(&options.log_dir, &options.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let text_layer = (!options.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking.clone())
            .with_ansi(false) // No ANSI codes in log files
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let json_layer = options.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let console_layer = options.console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(options.filter())
        .with(text_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the global log subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        options.log_dir,
        options.log_prefix,
        options.debug_mode,
        options.console_output,
        options.json
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_setup_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();
        let mut options = LogOptions::new(&log_dir, "test");
        options.console_output = false;

        // May fail if another test installed a subscriber first; the directory
        // is created either way
        let _guard = setup_logging(&options);

        assert!(log_dir.exists());
    }

    #[test]
    fn test_log_directory_created() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("a/b")).unwrap();

        ensure_log_dir(&LogOptions::new(&log_dir, "test")).unwrap();

        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_defaults() {
        let options = LogOptions::new("logs", "projzip");
        assert!(options.console_output);
        assert!(!options.json);
        assert!(!options.debug_mode);
    }
}
