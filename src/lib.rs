//! Lifecycle-managed Redis component with Prometheus command metrics
//!
//! This crate wraps a redis-rs client in a component that a hosting process
//! configures, starts and stops. Every command and pipeline sent through the
//! component is traced, and when metrics are enabled two collectors record
//! it:
//!
//! - `<namespace>_<subsystem>_redis_command`: histogram of elapsed seconds
//! - `<namespace>_<subsystem>_redis_command_total`: one increment per unit
//!
//! Both carry the labels `address`, `db`, `masterName`, `pipe`, `cmd` and
//! `error`. For a pipeline `cmd` joins the command names with `;` and
//! `error` joins the messages of the failed commands. A missing key is a
//! `Nil` reply, never an error.
//!
//! # Examples
//!
//! ```rust,no_run
//! use redis_component::{Component, ConfigTree, Metrics, Redis};
//!
//! let config = ConfigTree::from_json(r#"{
//!     "metrics": { "namespace": "shop", "subsystem": "orders" },
//!     "redis": {
//!         "metrics": true,
//!         "address": ["127.0.0.1:6379"],
//!         "db": 0,
//!         "poolSize": 16,
//!         "minIdleConns": 2
//!     }
//! }"#)?;
//!
//! let mut cache = Redis::new("redis", Metrics::new("metrics"));
//! for ext in cache.exts() {
//!     ext.config_did_load(&config);
//! }
//! cache.config_did_load(&config);
//! cache.serve()?;
//!
//! cache.set("user:1", "alice")?;
//! let name: Option<String> = cache.get("user:1")?;
//!
//! let mut incr = redis::cmd("INCR");
//! incr.arg("hits");
//! let results = cache.pipeline(&[incr, redis::cmd("DBSIZE")])?;
//!
//! cache.shutdown()?;
//! # let _ = (name, results);
//! # Ok::<(), redis_component::Error>(())
//! ```
//!
//! # Store modes
//!
//! - `masterName` set: sentinel, connecting to the current master
//! - several addresses: cluster
//! - one address: single node
//!
//! Each mode is backed by an r2d2 pool sized by `poolSize` and
//! `minIdleConns`.

pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod instrument;
pub mod lifecycle;
pub mod metrics;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Redis;
pub use config::{ConfigTree, MetricsConfig, RedisConfig};
pub use error::{Error, Result};
pub use lifecycle::{App, Component};
pub use metrics::{CommandMetrics, Metrics};
pub use store::{PipelineResult, Store, UniversalStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::Redis;
    pub use crate::config::{ConfigTree, RedisConfig};
    pub use crate::lifecycle::{App, Component};
    pub use crate::metrics::Metrics;
    pub use crate::store::Store;
}
