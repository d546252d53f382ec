//! Run configuration for ec2flow
//!
//! Resolves the explicit configuration value handed to the orchestrator.
//! Sources, highest priority first:
//! 1. command-line overrides
//! 2. environment (`AWS_PROFILE`, `AWS_REGION`, `AWS_DEFAULT_REGION`)
//! 3. the settings file (`EC2FLOW_CONFIG_PATH`, else `~/.config/ec2flow/config.yaml`)
//! 4. built-in defaults

pub mod error;

pub use error::*;

use ec2flow_cloud::{DEFAULT_SNAPSHOT_DESCRIPTION, KNOWN_REGIONS, SnapshotPolicy, is_known_region};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;
pub const CONFIG_PATH_ENV: &str = "EC2FLOW_CONFIG_PATH";

/// Fully resolved configuration for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub profile: String,
    pub region: Option<String>,
    pub wait_timeout: Duration,
    pub snapshot_description: String,
    pub snapshot_policy: SnapshotPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            region: None,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            snapshot_description: DEFAULT_SNAPSHOT_DESCRIPTION.to_string(),
            snapshot_policy: SnapshotPolicy::default(),
        }
    }
}

impl Settings {
    /// Region for region-scoped commands
    pub fn require_region(&self) -> Result<&str> {
        self.region
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRegion {
                profile: self.profile.clone(),
            })
    }
}

/// Settings file contents; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FileSettings {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub wait_timeout_secs: Option<u64>,
    pub snapshot_description: Option<String>,
    pub snapshot_policy: Option<SnapshotPolicy>,
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub wait_timeout_secs: Option<u64>,
    pub snapshot_policy: Option<SnapshotPolicy>,
}

/// Settings file location
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("ec2flow").join("config.yaml"))
}

/// Read a settings file. A missing file yields empty settings.
pub fn load_file(path: &Path) -> Result<FileSettings> {
    if !path.exists() {
        return Ok(FileSettings::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(FileSettings::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve settings from the process environment and the settings file.
pub fn resolve(overrides: Overrides) -> Result<Settings> {
    let file = match config_path() {
        Some(path) => {
            debug!(path = %path.display(), "Loading settings file");
            load_file(&path)?
        }
        None => FileSettings::default(),
    };
    resolve_with(overrides, |key| std::env::var(key).ok(), file)
}

/// Resolution without touching the process: `env` looks up variables.
pub fn resolve_with<E>(overrides: Overrides, env: E, file: FileSettings) -> Result<Settings>
where
    E: Fn(&str) -> Option<String>,
{
    let defaults = Settings::default();
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let profile = overrides
        .profile
        .or_else(|| non_empty("AWS_PROFILE"))
        .or(file.profile)
        .unwrap_or(defaults.profile);

    // Only a region given on the command line is checked against the table;
    // ambient and file regions are passed through to the provider.
    let region = match overrides.region {
        Some(r) => Some(validate_region(r.trim())?),
        None => non_empty("AWS_REGION")
            .or_else(|| non_empty("AWS_DEFAULT_REGION"))
            .or(file.region)
            .map(|r| r.trim().to_string())
            .inspect(|r| {
                if !is_known_region(r) {
                    warn!(region = %r, "Region is not in the known region table");
                }
            }),
    };

    let wait_secs = overrides
        .wait_timeout_secs
        .or(file.wait_timeout_secs)
        .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
    if wait_secs == 0 {
        return Err(ConfigError::InvalidTimeout);
    }

    Ok(Settings {
        profile,
        region,
        wait_timeout: Duration::from_secs(wait_secs),
        snapshot_description: file
            .snapshot_description
            .unwrap_or(defaults.snapshot_description),
        snapshot_policy: overrides
            .snapshot_policy
            .or(file.snapshot_policy)
            .unwrap_or(defaults.snapshot_policy),
    })
}

/// Accept a region code from the known region table
pub fn validate_region(region: &str) -> Result<String> {
    if is_known_region(region) {
        Ok(region.to_string())
    } else {
        Err(ConfigError::InvalidRegion {
            region: region.to_string(),
            choices: region_choices(),
        })
    }
}

/// The known region table, one "code  name" line per region
pub fn region_choices() -> String {
    KNOWN_REGIONS
        .iter()
        .map(|(code, name)| format!("  {:<16}{}", code, name))
        .collect::<Vec<_>>()
        .join("\n")
}
