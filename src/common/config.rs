use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::scanner::matcher::PathMatcher;

pub const DEFAULT_SCHEDULE: &str = "0/15 * * * *";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_TEMP_PATH: &str = "/tmp";

/// Recursion budget for a directory target.
///
/// `Levels(0)` stages only the files directly inside the target,
/// `Levels(-1)` stages nothing from a directory target. An absent value
/// in the YAML file means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum Depth {
    #[default]
    Unbounded,
    Levels(i64),
}

impl From<Option<i64>> for Depth {
    fn from(v: Option<i64>) -> Self {
        match v {
            Some(n) => Depth::Levels(n),
            None => Depth::Unbounded,
        }
    }
}

impl From<Depth> for Option<i64> {
    fn from(d: Depth) -> Self {
        match d {
            Depth::Unbounded => None,
            Depth::Levels(n) => Some(n),
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Depth::Unbounded => write!(f, "unbounded"),
            Depth::Levels(n) => write!(f, "{}", n),
        }
    }
}

/// One configured source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupTarget {
    pub path: PathBuf,

    #[serde(default, rename = "recursive_levels")]
    pub recursion_depth: Depth,

    /// Regex patterns matched against file base names; empty matches all
    #[serde(default, deserialize_with = "nullable_list")]
    pub filters: Vec<String>,
}

impl BackupTarget {
    pub fn matcher(&self) -> crate::common::errors::BackupResult<PathMatcher> {
        PathMatcher::new(&self.filters)
    }
}

fn nullable_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The YAML file as written by the user; every key is optional
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    schedule: Option<String>,
    root_path: Option<PathBuf>,
    destination_path: Option<PathBuf>,
    password: Option<String>,
    retention_days: Option<u32>,
    temp_path: Option<PathBuf>,
    paths: Option<Vec<BackupTarget>>,
}

/// Resolved, validated backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Cron expression consumed by the scheduler only
    pub schedule: String,

    /// Common ancestor used to compute archive entry names
    pub root_path: PathBuf,

    /// Durable directory holding promoted archives
    pub destination_path: PathBuf,

    /// Archive password; `None` writes an unencrypted archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Archives older than this many whole days are pruned
    pub retention_days: u32,

    /// Parent of the working area
    pub temp_path: PathBuf,

    pub paths: Vec<BackupTarget>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn non_empty_path(p: Option<PathBuf>) -> Option<PathBuf> {
    p.filter(|p| !p.as_os_str().is_empty())
}

impl BackupConfig {
    /// Get the backsnap data directory (~/.backsnap)
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_PATH))
            .join(".backsnap")
    }

    /// Get the default logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Load and validate the YAML config at `path`.
    ///
    /// `temp_override` (from `--temp-path` / `TEMP_PATH`) wins over the
    /// `temp_path` key.
    pub fn load(path: &Path, temp_override: Option<&Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config = Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        if let Some(temp) = temp_override {
            config.temp_path = temp.to_path_buf();
        }
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Parse YAML and fill in defaults. Does not validate.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml).context("Malformed YAML")?;

        let root_path = non_empty_path(raw.root_path).unwrap_or_else(|| PathBuf::from("/"));
        let destination_path =
            non_empty_path(raw.destination_path).unwrap_or_else(|| root_path.join("backups"));
        let paths = raw
            .paths
            .context("Missing required key 'paths'")?;

        Ok(Self {
            schedule: non_empty(raw.schedule).unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            root_path,
            destination_path,
            // Only the empty string means "no password"; whitespace is a valid secret
            password: raw.password.filter(|p| !p.is_empty()),
            retention_days: raw.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            temp_path: non_empty_path(raw.temp_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_PATH)),
            paths,
        })
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        let work_area = self.work_area();

        for target in &self.paths {
            if let Depth::Levels(n) = target.recursion_depth {
                if n < -1 {
                    anyhow::bail!(
                        "recursive_levels for '{}' must be -1 or greater, got {}",
                        target.path.display(),
                        n
                    );
                }
            }

            target
                .matcher()
                .with_context(|| format!("Bad filters for '{}'", target.path.display()))?;

            if !target.path.starts_with(&self.root_path) {
                anyhow::bail!(
                    "Target '{}' is not under root_path '{}'",
                    target.path.display(),
                    self.root_path.display()
                );
            }

            for (label, written) in [
                ("destination_path", &self.destination_path),
                ("working area", &work_area),
            ] {
                if written.starts_with(&target.path) {
                    anyhow::bail!(
                        "{} '{}' is inside backup target '{}'",
                        label,
                        written.display(),
                        target.path.display()
                    );
                }
            }
        }

        Ok(())
    }

    /// Scratch area for run directories, the run lock and the history log
    pub fn work_area(&self) -> PathBuf {
        self.temp_path.join("backsnap")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.work_area().join("run.lock")
    }

    pub fn history_path(&self) -> PathBuf {
        self.work_area().join("history.jsonl")
    }

    /// Copy with the password masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.password.is_some() {
            copy.password = Some("********".to_string());
        }
        copy
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}
