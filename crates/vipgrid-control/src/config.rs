//! Manager configuration.
//!
//! Read from an optional TOML file, then overridden by command-line flags:
//!
//! ```toml
//! vips = ["10.0.0.10", "10.0.1.0/28"]
//! workers = 10
//! sleep = "10s"
//! wait = "60s"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vipgrid_planner::AddressPool;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Validated settings for one control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Addresses under management.
    pub pool: AddressPool,
    /// Number of concurrent executor workers.
    pub workers: usize,
    /// Inactivity interval between cycles with no changes.
    pub sleep: Duration,
    /// Upper bound on waiting for one node to reflect a write.
    pub max_wait: Duration,
}

impl ManagerConfig {
    pub fn new(pool: AddressPool) -> Self {
        Self {
            pool,
            workers: DEFAULT_WORKERS,
            sleep: DEFAULT_SLEEP,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        FileConfig::from_file(path)?.into_config()
    }

    /// Reject an empty pool and clamp a zero worker count to one.
    pub fn validate(mut self) -> ConfigResult<Self> {
        if self.pool.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        if self.workers == 0 {
            warn!("workers set to 0, using 1");
            self.workers = 1;
        }
        Ok(self)
    }

    pub fn log_summary(&self) {
        info!(
            addresses = self.pool.len(),
            workers = self.workers,
            sleep_secs = self.sleep.as_secs(),
            max_wait_secs = self.max_wait.as_secs(),
            "manager configuration"
        );
    }
}

/// On-disk form of [`ManagerConfig`]. Every field is optional so that the
/// same struct can carry command-line overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Addresses and prefixes, e.g. `"10.0.0.1"` or `"10.0.1.0/28"`.
    #[serde(default)]
    pub vips: Vec<String>,
    pub workers: Option<usize>,
    pub sleep: Option<String>,
    pub wait: Option<String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `overrides` on top of `self`. A non-empty override address
    /// list replaces the file's list entirely.
    pub fn merge(self, overrides: FileConfig) -> FileConfig {
        FileConfig {
            vips: if overrides.vips.is_empty() {
                self.vips
            } else {
                overrides.vips
            },
            workers: overrides.workers.or(self.workers),
            sleep: overrides.sleep.or(self.sleep),
            wait: overrides.wait.or(self.wait),
        }
    }

    pub fn into_config(self) -> ConfigResult<ManagerConfig> {
        let pool = AddressPool::parse_entries(self.vips.iter().flat_map(|entry| {
            entry.split(|c: char| c == ',' || c.is_whitespace())
        }))?;

        let mut config = ManagerConfig::new(pool);
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(sleep) = self.sleep {
            config.sleep = duration_field("sleep", sleep)?;
        }
        if let Some(wait) = self.wait {
            config.max_wait = duration_field("wait", wait)?;
        }
        config.validate()
    }
}

fn duration_field(field: &'static str, value: String) -> ConfigResult<Duration> {
    parse_duration(&value).ok_or(ConfigError::InvalidDuration { field, value })
}

/// Parse `"500ms"`, `"10s"`, `"2m"` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
