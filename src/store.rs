//! The external client seen through a narrow capability interface.
//!
//! [`Store`] is everything the component needs from a Redis client: run one
//! command, run a pipeline, close. [`UniversalStore`] implements it on top of
//! redis-rs with r2d2 connection pools and picks single-node, cluster or
//! sentinel mode from the configuration.

use std::fmt;

use r2d2::{ManageConnection, Pool};
use redis::cluster::ClusterClient;
use redis::sentinel::{
    LockedSentinelClient, SentinelClient, SentinelNodeConnectionInfo, SentinelServerType,
};
use redis::{
    Client, Cmd, ConnectionInfo, ConnectionLike, IntoConnectionInfo, RedisError, RedisResult,
    Value,
};

use crate::config::RedisConfig;

/// Outcome of a pipeline: either a unit-level failure, or one result per
/// command in submission order.
pub type PipelineResult = RedisResult<Vec<RedisResult<Value>>>;

/// A Redis client that can execute commands and pipelines.
///
/// Implementations are shared by reference across threads for the lifetime
/// of the component.
pub trait Store: Send + Sync {
    /// Executes a single command.
    fn req_command(&self, cmd: &Cmd) -> RedisResult<Value>;

    /// Executes `cmds` as one pipeline.
    fn req_pipeline(&self, cmds: &[Cmd]) -> PipelineResult;

    /// Marks the store as closed.
    ///
    /// Connections are released when the store is dropped; callers drop it
    /// right after `close`.
    fn close(&self) -> RedisResult<()> {
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn req_command(&self, cmd: &Cmd) -> RedisResult<Value> {
        (**self).req_command(cmd)
    }

    fn req_pipeline(&self, cmds: &[Cmd]) -> PipelineResult {
        (**self).req_pipeline(cmds)
    }

    fn close(&self) -> RedisResult<()> {
        (**self).close()
    }
}

/// A pooled redis-rs client in single-node, cluster or sentinel mode.
pub enum UniversalStore {
    Single(Pool<Client>),
    Cluster(Pool<ClusterClient>),
    Sentinel(Pool<LockedSentinelClient>),
}

impl UniversalStore {
    /// Builds the client and its pool from `config`.
    ///
    /// No connection is made here; the pool connects lazily and keeps
    /// `minIdleConns` connections warm in the background.
    pub fn open(config: &RedisConfig) -> RedisResult<Self> {
        let first = config.address.first().ok_or_else(|| {
            RedisError::from((redis::ErrorKind::InvalidClientConfig, "no address configured"))
        })?;

        let store = if config.is_sentinel() {
            let master = node_info(first, config, config.db)?;
            let master_info = SentinelNodeConnectionInfo {
                redis_connection_info: Some(master.redis),
                ..Default::default()
            };
            let sentinels: Vec<String> = config.address.iter().map(|addr| node_url(addr)).collect();
            let client = SentinelClient::build(
                sentinels,
                config.master_name.clone(),
                Some(master_info),
                SentinelServerType::Master,
            )?;
            Self::Sentinel(build_pool(LockedSentinelClient::new(client), config))
        } else if config.is_cluster() {
            let nodes = config
                .address
                .iter()
                .map(|addr| node_info(addr, config, 0))
                .collect::<RedisResult<Vec<_>>>()?;
            Self::Cluster(build_pool(ClusterClient::new(nodes)?, config))
        } else {
            let client = Client::open(node_info(first, config, config.db)?)?;
            Self::Single(build_pool(client, config))
        };

        tracing::debug!(mode = store.mode(), "redis store created");
        Ok(store)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Cluster(_) => "cluster",
            Self::Sentinel(_) => "sentinel",
        }
    }
}

impl fmt::Debug for UniversalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniversalStore")
            .field("mode", &self.mode())
            .finish()
    }
}

impl Store for UniversalStore {
    fn req_command(&self, cmd: &Cmd) -> RedisResult<Value> {
        match self {
            Self::Single(pool) => query_command(pool, cmd),
            Self::Cluster(pool) => query_command(pool, cmd),
            Self::Sentinel(pool) => query_command(pool, cmd),
        }
    }

    fn req_pipeline(&self, cmds: &[Cmd]) -> PipelineResult {
        match self {
            Self::Single(pool) => query_pipeline(pool, cmds),
            Self::Cluster(pool) => query_pipeline(pool, cmds),
            Self::Sentinel(pool) => query_pipeline(pool, cmds),
        }
    }
}

/// Connection info for one node with the configured password. Cluster
/// nodes only serve db 0.
fn node_info(addr: &str, config: &RedisConfig, db: i64) -> RedisResult<ConnectionInfo> {
    let mut info = node_url(addr).into_connection_info()?;
    info.redis.db = db;
    if !config.password.is_empty() {
        info.redis.password = Some(config.password.clone());
    }
    Ok(info)
}

/// Addresses are configured as `host:port`; full URLs pass through.
fn node_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

/// The pool never keeps more idle connections than it may open.
fn build_pool<M: ManageConnection>(manager: M, config: &RedisConfig) -> Pool<M> {
    let max_size = config.effective_pool_size();
    let min_idle = if config.min_idle_conns > max_size {
        tracing::warn!(
            min_idle_conns = config.min_idle_conns,
            pool_size = max_size,
            "minIdleConns exceeds poolSize, keeping at most poolSize idle connections"
        );
        max_size
    } else {
        config.min_idle_conns
    };

    Pool::builder()
        .max_size(max_size)
        .min_idle(Some(min_idle))
        .build_unchecked(manager)
}

fn checkout<M: ManageConnection>(pool: &Pool<M>) -> RedisResult<r2d2::PooledConnection<M>> {
    pool.get().map_err(|err| {
        RedisError::from((
            redis::ErrorKind::IoError,
            "failed to get connection from pool",
            err.to_string(),
        ))
    })
}

fn query_command<M>(pool: &Pool<M>, cmd: &Cmd) -> RedisResult<Value>
where
    M: ManageConnection,
    M::Connection: ConnectionLike,
{
    let mut conn = checkout(pool)?;
    conn.req_command(cmd)?.extract_error()
}

/// Sends `cmds` in one round trip. A server error fails only the slot of
/// the command that caused it; transport failures fail the whole unit.
fn query_pipeline<M>(pool: &Pool<M>, cmds: &[Cmd]) -> PipelineResult
where
    M: ManageConnection,
    M::Connection: ConnectionLike,
{
    let mut pipe = redis::pipe();
    for cmd in cmds {
        pipe.add_command(cmd.clone());
    }

    let mut conn = checkout(pool)?;
    let replies = conn.req_packed_commands(&pipe.get_packed_pipeline(), 0, cmds.len())?;
    Ok(replies.into_iter().map(Value::extract_error).collect())
}
