use flowmerge_core::{
    Delay, Tolerances,
    defaults::{DEFAULT_MAX_HOPS, DEFAULT_SEARCH_MARGIN},
    loader::LoaderFilters,
};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid configuration")]
    Parse(#[from] serde_json::Error),
    #[error("`workers` must be at least 1")]
    NoWorkers,
    #[error("`maxHops` must be at least 1")]
    NoHops,
}

/// The run configuration (`config.json`).
///
/// Only `maxPacketLoss` and `maxTimeDifference` are required; unknown
/// keys are ignored so the same file can be shared with the other tools
/// of the pipeline.
///
/// ```
/// # use flowmerge::RunConfig;
/// let config: RunConfig = r#"{ "maxPacketLoss": 5, "maxTimeDifference": 10 }"#
///     .parse()
///     .unwrap();
/// assert_eq!(config.max_hops, 25);
/// assert_eq!(config.search_margin.to_string(), "20ms");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// maximum difference of packet counts between two observations
    pub max_packet_loss: u64,
    /// maximum timestamp skew, in milliseconds, once the propagation
    /// delay is compensated
    pub max_time_difference: u64,
    /// directory of the collector exports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_dir: Option<PathBuf>,
    #[serde(default = "default_search_margin")]
    pub search_margin: Delay,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(flatten)]
    pub filters: LoaderFilters,
}

fn default_search_margin() -> Delay {
    DEFAULT_SEARCH_MARGIN
}

fn default_max_hops() -> usize {
    DEFAULT_MAX_HOPS
}

impl RunConfig {
    pub fn new(max_packet_loss: u64, max_time_difference: u64) -> Self {
        Self {
            max_packet_loss,
            max_time_difference,
            flow_dir: None,
            search_margin: DEFAULT_SEARCH_MARGIN,
            max_hops: DEFAULT_MAX_HOPS,
            workers: None,
            filters: LoaderFilters::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        content.parse()
    }

    pub fn tolerances(&self) -> Tolerances {
        Tolerances::new(self.max_packet_loss, self.max_time_difference)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_hops == 0 {
            return Err(ConfigError::NoHops);
        }
        Ok(self)
    }
}

impl FromStr for RunConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<Self>(s)?.validate()
    }
}
