//! User settings persisted between runs. The settings object is created once
//! in `main`, handed to the session manager as [`ControllerOptions`], and
//! written back on exit; nothing reads it from a global.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::chart::ChartConfig;
use crate::controller::{ControllerOptions, IdPolicy};
use crate::store;

const SETTINGS_FILE_NAME: &str = "settings.json";
const LOG_FILE_NAME: &str = "manufacturers-db.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Check records on create/update.
    pub validation: bool,
    pub id_policy: IdPolicy,
    /// Most recently opened files, newest first.
    pub recent_files: Vec<PathBuf>,
    pub max_recent_files: usize,
    /// Hand exported reports and charts to the OS viewer once written.
    pub open_exports: bool,
    /// Last chart options picked in the chart dialog.
    pub chart: ChartConfig,
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validation: true,
            id_policy: IdPolicy::Dense,
            recent_files: Vec::new(),
            max_recent_files: 10,
            open_exports: true,
            chart: ChartConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load from the default location. A missing file yields defaults; an
    /// unreadable one is an error the caller reports once logging is up
    /// before carrying on with defaults.
    pub fn load() -> Result<Self> {
        Self::load_or_default(Self::config_path().as_deref())
    }

    /// Defaults when there is no location or nothing stored there yet.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load_from(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        serde_json::from_str(&text).context("failed to parse settings")
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("could not locate config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let text = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        store::write_atomic(path, text.as_bytes()).context("failed to write settings")
    }

    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    /// Default log file, inside the platform data directory.
    pub fn log_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.data_dir().join(LOG_FILE_NAME))
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            validate: self.validation,
            id_policy: self.id_policy,
        }
    }

    /// Move `path` to the front of the recent list, dropping duplicates and
    /// anything past the cap.
    pub fn push_recent(&mut self, path: &Path) {
        self.recent_files.retain(|existing| existing != path);
        self.recent_files.insert(0, path.to_path_buf());
        self.recent_files.truncate(self.max_recent_files);
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "manufacturers-db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartType;
    use tempfile::tempdir;

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);

        let mut settings = Settings {
            validation: false,
            id_policy: IdPolicy::Monotonic,
            ..Settings::default()
        };
        settings.chart.chart_type = ChartType::ProductPie;
        settings.push_recent(Path::new("/tmp/a.csv"));
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{ "validation": false }"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(!settings.validation);
        assert_eq!(settings.max_recent_files, 10);
        assert_eq!(settings.id_policy, IdPolicy::Dense);
    }

    #[test]
    fn unreadable_settings_are_reported_not_swallowed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        assert_eq!(Settings::load_or_default(Some(&path)).unwrap(), Settings::default());
        assert_eq!(Settings::load_or_default(None).unwrap(), Settings::default());

        fs::write(&path, "{ not json").unwrap();
        let err = Settings::load_or_default(Some(&path)).unwrap_err();
        assert_eq!(err.to_string(), "failed to parse settings");
    }

    #[test]
    fn recent_files_are_deduplicated_and_capped() {
        let mut settings = Settings {
            max_recent_files: 2,
            ..Settings::default()
        };
        settings.push_recent(Path::new("a.csv"));
        settings.push_recent(Path::new("b.csv"));
        settings.push_recent(Path::new("a.csv"));
        settings.push_recent(Path::new("c.csv"));
        assert_eq!(
            settings.recent_files,
            vec![PathBuf::from("c.csv"), PathBuf::from("a.csv")]
        );
    }

    #[test]
    fn controller_options_follow_settings() {
        let settings = Settings {
            validation: false,
            id_policy: IdPolicy::Monotonic,
            ..Settings::default()
        };
        let options = settings.controller_options();
        assert!(!options.validate);
        assert_eq!(options.id_policy, IdPolicy::Monotonic);
    }
}
