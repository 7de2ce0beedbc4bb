use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, registry::LookupSpan, EnvFilter, Layer};

use crate::config::Settings;

const LOG_FILE: &str = "mcp.log";
const ERROR_LOG_FILE: &str = "error.log";

/// Maps a `logging.level` value to a filter. `NONE` turns logging off.
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some(LevelFilter::DEBUG),
        "INFO" => Some(LevelFilter::INFO),
        "WARNING" | "WARN" => Some(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Some(LevelFilter::ERROR),
        "NONE" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Installs the global subscriber: stderr, plus `<directory>/mcp.log` and
/// `<directory>/error.log` when `logging.file_enabled` is set. `RUST_LOG`
/// overrides the configured level.
pub fn init(settings: &Settings) -> Result<()> {
    let raw_level = settings.get_string_or("logging.level", "INFO");
    let level = parse_level(&raw_level);

    let filter = EnvFilter::builder()
        .with_default_directive(level.unwrap_or(LevelFilter::INFO).into())
        .from_env_lossy();

    let file_layer = if settings.get_bool("logging.file_enabled").unwrap_or(false) {
        let directory = settings.get_string_or("logging.directory", "logs");
        Some(file_layers(Path::new(&directory))?)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    match level {
        Some(level) => tracing::info!("Logging level set to {}", level),
        None => tracing::warn!(
            "Invalid logging level '{}' in config, defaulting to INFO",
            raw_level
        ),
    }
    Ok(())
}

/// Everything that passes the global filter goes to `mcp.log`; errors are
/// also kept apart in `error.log`.
fn file_layers<S>(directory: &Path) -> Result<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    let all = open_append(&directory.join(LOG_FILE))?;
    let errors = open_append(&directory.join(ERROR_LOG_FILE))?;

    Ok(fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(all))
        .and_then(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(errors))
                .with_filter(LevelFilter::ERROR),
        )
        .boxed())
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("info"), Some(LevelFilter::INFO));
        assert_eq!(parse_level("WARNING"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("ERROR"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("NONE"), Some(LevelFilter::OFF));
        assert_eq!(parse_level("LOUD"), None);
    }

    #[test]
    fn test_error_log_only_gets_errors() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let subscriber = tracing_subscriber::registry().with(file_layers(&logs).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("upload skipped");
            tracing::error!("upload failed");
        });

        let all = std::fs::read_to_string(logs.join(LOG_FILE)).unwrap();
        assert!(all.contains("upload skipped"));
        assert!(all.contains("upload failed"));

        let errors = std::fs::read_to_string(logs.join(ERROR_LOG_FILE)).unwrap();
        assert!(errors.contains("upload failed"));
        assert!(!errors.contains("upload skipped"));
    }
}
