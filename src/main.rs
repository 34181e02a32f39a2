//! Binary entry point: read settings, set up logging, open the files named on
//! the command line and hand control to the TUI until the user quits.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use manufacturers_db::config::Settings;
use manufacturers_db::logging::{self, LogConfig};
use manufacturers_db::{run_app, App, DocumentManager, IdPolicy};

/// Manage construction-material manufacturers stored in CSV files.
#[derive(Debug, Parser)]
#[command(name = "manufacturers-db", version, about)]
struct Cli {
    /// CSV files to open, one tab each. Missing files are created.
    files: Vec<PathBuf>,

    /// Accept records without checking name, year, revenue and e-mail.
    #[arg(long)]
    no_validation: bool,

    /// Id assignment on delete: dense renumbers, monotonic leaves gaps.
    #[arg(long, value_name = "POLICY")]
    id_policy: Option<IdPolicy>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level when not set via RUST_LOG (overrides the settings file).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Write the log here instead of the default data directory.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut settings, settings_error) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(err) => (Settings::default(), Some(err)),
    };

    let base_level = logging::parse_level(cli.log_level.as_deref().unwrap_or(&settings.log_level));
    let log_config = LogConfig::from_verbosity(base_level, cli.verbose)
        .with_log_file(cli.log_file.clone().or_else(Settings::log_path));
    logging::init(&log_config)?;
    if let Some(err) = settings_error {
        tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable settings, using defaults");
    }

    // Command line switches apply to this run only; they are not saved.
    let mut options = settings.controller_options();
    if cli.no_validation {
        options.validate = false;
    }
    if let Some(policy) = cli.id_policy {
        options.id_policy = policy;
    }

    let mut manager = DocumentManager::new(options);
    for path in &cli.files {
        manager
            .open_document(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        settings.push_recent(path);
    }
    if manager.is_empty() {
        manager.new_document();
    }

    let mut app = App::new(manager, settings);
    let result = run_app(&mut app);
    app.shutdown();

    if let Err(err) = app.settings().save() {
        tracing::warn!(error = %format!("{err:#}"), "failed to save settings");
    }
    result
}
