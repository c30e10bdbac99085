use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::tagging::{DEFAULT_POST_PRANDIAL_MINUTES, MAX_POST_PRANDIAL_MINUTES};
use crate::time_parser::RecordFormat;
use crate::{Error, Result};

/// Align CGM readings with logged events and summarise them per user
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pipeline configuration (JSON) listing users and their raw files
    #[arg(help = "Pipeline configuration (JSON) listing users and their raw files")]
    pub config: PathBuf,

    /// Only process this user
    #[arg(long)]
    pub user: Option<String>,

    /// Override the cache directory from the configuration
    #[arg(long, env = "GLUCOSE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Post-prandial window in minutes, overrides every user's setting
    #[arg(long)]
    pub post_prandial_window: Option<i64>,

    /// CSV output file prefix (e.g. /path/to/output/prefix)
    #[arg(long)]
    pub csv_output: Option<String>,

    /// Day of month to leave out of the weekday/weekend comparison (repeatable)
    #[arg(long = "exclude-day")]
    pub exclude_days: Vec<u32>,
}

/// Where one person's data lives and how to read it. Scoped to a single
/// pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub glucose_path: PathBuf,
    pub records_path: PathBuf,
    pub record_format: RecordFormat,

    /// Readings at or before this time are dropped
    #[serde(default)]
    pub start_date: Option<NaiveDateTime>,

    /// Readings after this time are dropped
    #[serde(default)]
    pub end_date: Option<NaiveDateTime>,

    #[serde(default = "default_post_prandial_minutes")]
    pub post_prandial_window_minutes: i64,
}

fn default_post_prandial_minutes() -> i64 {
    DEFAULT_POST_PRANDIAL_MINUTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    pub users: Vec<UserConfig>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

impl PipelineConfig {
    /// Reads the configuration and resolves relative data paths against the
    /// directory holding the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.cache_dir = base.join(&config.cache_dir);
        for user in &mut config.users {
            user.glucose_path = base.join(&user.glucose_path);
            user.records_path = base.join(&user.records_path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (i, user) in self.users.iter().enumerate() {
            if user.name.is_empty() || user.name.contains(['/', '\\']) || user.name.starts_with('.') {
                return Err(Error::Config(format!("invalid user name {:?}", user.name)));
            }
            if self.users[..i].iter().any(|u| u.name == user.name) {
                return Err(Error::Config(format!("user {:?} listed twice", user.name)));
            }
            if !(1..=MAX_POST_PRANDIAL_MINUTES).contains(&user.post_prandial_window_minutes) {
                return Err(Error::Config(format!(
                    "post-prandial window for {:?} must be between 1 and {} minutes, got {}",
                    user.name, MAX_POST_PRANDIAL_MINUTES, user.post_prandial_window_minutes
                )));
            }
            if let (Some(start), Some(end)) = (user.start_date, user.end_date) {
                if end <= start {
                    return Err(Error::Config(format!(
                        "date window for {:?} ends before it starts",
                        user.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn user(&self, name: &str) -> Result<&UserConfig> {
        self.users
            .iter()
            .find(|u| u.name == name)
            .ok_or_else(|| Error::UnknownUser(name.to_string()))
    }
}
