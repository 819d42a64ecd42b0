//! Configuration binding for the redis and metrics components.
//!
//! The hosting process hands every component the same [`ConfigTree`]; each
//! component reads the section keyed by its own name.

use std::fmt;
use std::num::NonZeroUsize;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connections per CPU used when `poolSize` is left at zero.
const POOL_SIZE_PER_CPU: u32 = 10;

/// Redis component configuration.
///
/// The store flavour follows from the fields: a non-empty `master_name`
/// selects sentinel mode, more than one address selects cluster mode and a
/// single address is a plain node.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisConfig {
    /// Record command metrics. Default is false.
    pub metrics: bool,
    /// The sentinel master name. Only failover clients.
    pub master_name: String,
    /// Either a single address or a seed list of host:port addresses of
    /// cluster/sentinel nodes.
    pub address: Vec<String>,
    /// Redis password.
    pub password: String,
    /// Database to be selected after connecting to the server. Only
    /// single-node and failover clients.
    pub db: i64,
    /// Connection pool size, zero picks a default from the CPU count.
    pub pool_size: u32,
    /// Minimum number of idle connections kept by the pool.
    pub min_idle_conns: u32,
}

impl RedisConfig {
    /// Checks the invariants that must hold before a client is built.
    ///
    /// Only a missing address list or name is rejected. Pool sizing is
    /// reconciled when the pool is built and anything else is left to the
    /// client to report.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.address.is_empty() || name.is_empty() {
            return Err(Error::InvalidConfig(
                "address and name is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Pool size handed to the connection pool.
    pub fn effective_pool_size(&self) -> u32 {
        if self.pool_size > 0 {
            return self.pool_size;
        }

        let cpus = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        u32::try_from(cpus)
            .unwrap_or(u32::MAX / POOL_SIZE_PER_CPU)
            .saturating_mul(POOL_SIZE_PER_CPU)
    }

    pub fn is_sentinel(&self) -> bool {
        !self.master_name.is_empty()
    }

    pub fn is_cluster(&self) -> bool {
        !self.is_sentinel() && self.address.len() > 1
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("RedisConfig")
            .field("metrics", &self.metrics)
            .field("master_name", &self.master_name)
            .field("address", &self.address)
            .field("password", &password)
            .field("db", &self.db)
            .field("pool_size", &self.pool_size)
            .field("min_idle_conns", &self.min_idle_conns)
            .finish()
    }
}

/// Metrics component configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub namespace: String,
    pub subsystem: String,
}

/// The configuration source of the hosting process.
///
/// Holds the whole document; components pull their section by name.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    root: serde_json::Value,
}

impl ConfigTree {
    pub fn new(root: serde_json::Value) -> Self {
        Self { root }
    }

    /// Parses a JSON document into a config tree.
    pub fn from_json(text: &str) -> Result<Self> {
        let root = serde_json::from_str(text).map_err(|source| Error::Config {
            section: String::new(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Deserializes the section stored under `name`.
    ///
    /// A missing section yields `T::default()`, so every key is optional at
    /// this level; required keys are enforced by the component's validation.
    pub fn section<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.root.get(name) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => T::deserialize(value).map_err(|source| Error::Config {
                section: name.to_string(),
                source,
            }),
        }
    }
}
