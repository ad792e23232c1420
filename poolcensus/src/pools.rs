//! Pool definitions.
//!
//! A default list ships inside the binary. Operators can point the scanner at
//! their own file with the same shape:
//!
//! ```json
//! {"pools": [{"pool_id": "ocean", "name": "OCEAN", "website": "https://ocean.xyz",
//!             "type": "tides", "endpoints": [{"host": "mine.ocean.xyz", "port": 3334, "tls": false}]}]}
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUNDLED_POOLS: &str = include_str!("../pools.json");

#[derive(Error, Debug)]
pub enum PoolsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pool list: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolsData {
    #[serde(default)]
    pub pools: Vec<PoolDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDefinition {
    #[serde(default)]
    pub pool_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website: String,
    /// Payout scheme as the pool advertises it (pps, fpps, solo...)
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub endpoints: Vec<PoolEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEndpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
}

impl PoolsData {
    /// Load pools from `path`, or the bundled list when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, PoolsError> {
        match path {
            Some(path) => {
                let data = std::fs::read_to_string(path).map_err(|source| PoolsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse(&data)
            }
            None => Self::bundled(),
        }
    }

    pub fn bundled() -> Result<Self, PoolsError> {
        Self::parse(BUNDLED_POOLS)
    }

    pub fn parse(data: &str) -> Result<Self, PoolsError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Pools whose id or name contains `filter`, ignoring case.
    ///
    /// A blank filter selects every pool.
    pub fn filter(&self, filter: &str) -> Vec<&PoolDefinition> {
        let filter = filter.trim().to_lowercase();
        if filter.is_empty() {
            return self.pools.iter().collect();
        }

        self.pools
            .iter()
            .filter(|pool| {
                pool.pool_id.to_lowercase().contains(&filter)
                    || pool.name.to_lowercase().contains(&filter)
            })
            .collect()
    }
}
