//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! The terminal belongs to the UI while the program runs, so log output goes
//! to a file instead of stderr. Levels are used as follows:
//!
//! - `warn`: dropped CSV rows, rolled-back mutations, unreadable settings
//! - `info`: files loaded, saved, opened and closed, exports written
//! - `debug`: individual record mutations, chart rendering
//!
//! `RUST_LOG` takes precedence over the configured level when set.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is not set.
    pub level: Level,
    /// File to append to. Without one, logging stays off.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Level from a `-v` count added on top of the configured base level.
    ///
    /// - 0: `base`
    /// - 1: debug
    /// - 2+: trace
    #[must_use]
    pub fn from_verbosity(base: Level, verbosity: u8) -> Self {
        let level = match verbosity {
            0 => base,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }
}

/// Parse a level name from settings, falling back to `info`.
pub fn parse_level(name: &str) -> Level {
    name.trim().parse().unwrap_or(Level::INFO)
}

/// Install the global subscriber. Call once, before the UI takes over the
/// terminal.
pub fn init(config: &LogConfig) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    let file = open_log_file(path)?;

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(build_env_filter(config.level))
        .with(layer)
        .try_init()
        .context("failed to install log subscriber")?;

    tracing::info!(path = %path.display(), level = %config.level, "logging initialised");
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_overrides_base_level() {
        assert_eq!(LogConfig::from_verbosity(Level::WARN, 0).level, Level::WARN);
        assert_eq!(LogConfig::from_verbosity(Level::WARN, 1).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(Level::WARN, 3).level, Level::TRACE);
    }

    #[test]
    fn level_names_parse_leniently() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("chatty"), Level::INFO);
    }

    #[test]
    fn no_log_file_means_no_subscriber() {
        assert!(init(&LogConfig::default()).is_ok());
    }
}
