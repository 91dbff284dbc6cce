//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

use vipgrid_planner::PoolError;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("address pool: {0}")]
    Pool(#[from] PoolError),

    #[error("no virtual addresses configured")]
    EmptyPool,

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },
}
