//! Configuration management
//!
//! Load and save user preferences to a TOML config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::milestone::MilestoneTable;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub job: JobPreferences,
    pub styles: StylePreferences,
    pub export: ExportPreferences,
    pub share: SharePreferences,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a file, falling back to defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {:?}", path))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("com", "portraitgen", "portraitgen") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            // Fallback to current directory
            Ok(PathBuf::from("portraitgen.toml"))
        }
    }
}

/// Slack added on top of the milestone delays when a timeout is too short
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Job timing preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPreferences {
    /// Minimum delay before each progress milestone
    pub milestone_delay_ms: u64,
    /// A job still running after this long fails with a timeout
    pub timeout_secs: u64,
}

impl Default for JobPreferences {
    fn default() -> Self {
        Self {
            milestone_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl JobPreferences {
    pub fn milestones(&self) -> MilestoneTable {
        MilestoneTable::uniform(Duration::from_millis(self.milestone_delay_ms))
    }

    /// Configured timeout, raised when it could never be met
    ///
    /// A timeout at or below the milestone table's minimum duration would fail
    /// every job, so it becomes that duration plus [`TIMEOUT_GRACE`].
    pub fn timeout(&self) -> Duration {
        let configured = Duration::from_secs(self.timeout_secs);
        let minimum = self.milestones().minimum_duration();
        if configured > minimum {
            return configured;
        }

        let adjusted = minimum + TIMEOUT_GRACE;
        tracing::warn!(
            timeout_secs = self.timeout_secs,
            minimum_ms = minimum.as_millis() as u64,
            adjusted_ms = adjusted.as_millis() as u64,
            "job timeout shorter than the milestone delays, raising it"
        );
        adjusted
    }
}

/// What to do when a job names a style the catalog does not know
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownStylePolicy {
    /// Use the catalog's default style and log a warning
    #[default]
    Substitute,
    /// Refuse to start the job
    Reject,
}

/// Style selection preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylePreferences {
    pub default_style: String,
    pub unknown_style: UnknownStylePolicy,
}

impl Default for StylePreferences {
    fn default() -> Self {
        Self {
            default_style: "pharaoh".to_string(),
            unknown_style: UnknownStylePolicy::default(),
        }
    }
}

/// Download preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportPreferences {
    /// Leading part of `<subject>-portrait.<ext>`
    pub subject: String,
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportPreferences {
    fn default() -> Self {
        Self {
            subject: "pharaonic".to_string(),
            output_dir: None,
        }
    }
}

/// Share sheet text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharePreferences {
    pub title: String,
    pub text: String,
}

impl Default for SharePreferences {
    fn default() -> Self {
        Self {
            title: "My Pharaonic Portrait".to_string(),
            text: "Look at my photo transformed into pharaonic style!".to_string(),
        }
    }
}
