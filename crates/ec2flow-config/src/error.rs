use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("[{region}] is not a valid AWS region. Valid regions are:\n{choices}")]
    InvalidRegion { region: String, choices: String },

    #[error(
        "no region configured for profile '{profile}'.\n\
        Pass --region, set AWS_REGION, or add `region:` to the settings file"
    )]
    MissingRegion { profile: String },

    #[error("wait timeout must be at least one second")]
    InvalidTimeout,

    #[error("failed to parse settings file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
