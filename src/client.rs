//! The Redis component: configuration, client construction, instrumentation
//! and lifecycle in one place.

use redis::{Cmd, FromRedisValue, RedisResult, ToRedisArgs, Value};
use tracing::instrument;

use crate::common::client_closed;
use crate::config::{ConfigTree, RedisConfig};
use crate::error::{Error, Result};
use crate::instrument::{InstrumentedStore, StaticLabels};
use crate::lifecycle::Component;
use crate::metrics::{CommandMetrics, Metrics};
use crate::store::{PipelineResult, Store, UniversalStore};

/// Builds the store for a validated configuration.
pub type Connector = Box<dyn Fn(&RedisConfig) -> RedisResult<Box<dyn Store>> + Send + Sync>;

/// A lifecycle-managed Redis client.
///
/// The client handle is built once in [`Component::config_did_load`] and
/// released in [`Component::shutdown`]. In between, every command goes
/// through an [`InstrumentedStore`] that traces it and, if `metrics` is
/// enabled, records `<namespace>_<subsystem>_redis_command` and
/// `<namespace>_<subsystem>_redis_command_total`.
///
/// # Example
///
/// ```rust,no_run
/// use redis_component::{App, ConfigTree, Metrics, Redis};
///
/// let config = ConfigTree::from_json(r#"{
///     "metrics": { "namespace": "shop", "subsystem": "orders" },
///     "redis": { "address": ["127.0.0.1:6379"], "metrics": true }
/// }"#)?;
///
/// let redis = Redis::new("redis", Metrics::new("metrics"));
/// let mut app = App::new().with(redis);
/// app.load(&config);
/// app.serve()?;
/// app.shutdown()?;
/// # Ok::<(), redis_component::Error>(())
/// ```
pub struct Redis {
    name: String,
    config: RedisConfig,
    metrics: Metrics,
    connector: Connector,
    store: Option<Box<dyn Store>>,
}

impl Redis {
    /// A component that connects with [`UniversalStore`].
    pub fn new(name: impl Into<String>, metrics: Metrics) -> Self {
        Self::with_connector(name, metrics, |config| {
            UniversalStore::open(config).map(|store| Box::new(store) as Box<dyn Store>)
        })
    }

    /// A component that builds its store with `connector`.
    pub fn with_connector<F>(name: impl Into<String>, metrics: Metrics, connector: F) -> Self
    where
        F: Fn(&RedisConfig) -> RedisResult<Box<dyn Store>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            config: RedisConfig::default(),
            metrics,
            connector: Box::new(connector),
            store: None,
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validates `config`, builds the client and wires instrumentation.
    ///
    /// The fallible form of [`Component::config_did_load`].
    #[instrument(skip_all, fields(component = %self.name))]
    pub fn configure(&mut self, config: RedisConfig) -> Result<()> {
        config.validate(&self.name)?;
        if self.store.is_some() {
            return Err(Error::InvalidConfig(format!(
                "redis client `{}` is already constructed",
                self.name
            )));
        }

        let store = (self.connector)(&config)?;
        let command_metrics = if config.metrics {
            Some(CommandMetrics::register(&self.metrics)?)
        } else {
            None
        };
        let labels = StaticLabels::from_config(&config);

        tracing::info!(
            address = %labels.address,
            db = config.db,
            master_name = %config.master_name,
            metrics = config.metrics,
            "redis client constructed"
        );

        self.store = Some(Box::new(InstrumentedStore::new(store, command_metrics, labels)));
        self.config = config;
        Ok(())
    }

    /// The client handle, or a client-closed error when there is none.
    pub fn store(&self) -> RedisResult<&dyn Store> {
        self.store.as_deref().ok_or_else(client_closed)
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Executes one command.
    pub fn query(&self, cmd: &Cmd) -> RedisResult<Value> {
        self.store()?.req_command(cmd)
    }

    /// Executes `cmds` as one pipeline.
    pub fn pipeline(&self, cmds: &[Cmd]) -> PipelineResult {
        self.store()?.req_pipeline(cmds)
    }

    pub fn ping(&self) -> RedisResult<()> {
        self.query(&redis::cmd("PING")).map(|_| ())
    }

    /// Convenience method: GET a key
    pub fn get<K: ToRedisArgs, RV: FromRedisValue>(&self, key: K) -> RedisResult<RV> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: SET a key
    pub fn set<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: DEL keys
    pub fn del<K: ToRedisArgs>(&self, keys: K) -> RedisResult<i64> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: EXISTS check
    pub fn exists<K: ToRedisArgs>(&self, keys: K) -> RedisResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(keys);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: EXPIRE key
    pub fn expire<K: ToRedisArgs>(&self, key: K, seconds: i64) -> RedisResult<bool> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(seconds);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: HGET hash field
    pub fn hget<K: ToRedisArgs, F: ToRedisArgs, RV: FromRedisValue>(
        &self,
        key: K,
        field: F,
    ) -> RedisResult<RV> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: HSET hash field
    pub fn hset<K: ToRedisArgs, F: ToRedisArgs, V: ToRedisArgs>(
        &self,
        key: K,
        field: F,
        value: V,
    ) -> RedisResult<bool> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: SADD to set
    pub fn sadd<K: ToRedisArgs, M: ToRedisArgs>(&self, key: K, members: M) -> RedisResult<i64> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(members);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: SISMEMBER check
    pub fn sismember<K: ToRedisArgs, M: ToRedisArgs>(&self, key: K, member: M) -> RedisResult<bool> {
        let mut cmd = redis::cmd("SISMEMBER");
        cmd.arg(key).arg(member);
        let result = self.query(&cmd)?;
        FromRedisValue::from_redis_value(&result)
    }
}

impl std::fmt::Debug for Redis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redis")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Component for Redis {
    fn name(&self) -> &str {
        &self.name
    }

    fn exts(&mut self) -> Vec<&mut dyn Component> {
        vec![&mut self.metrics as &mut dyn Component]
    }

    fn config_did_load(&mut self, config: &ConfigTree) {
        let result = config
            .section::<RedisConfig>(&self.name)
            .and_then(|section| self.configure(section));

        if let Err(err) = result {
            panic!("{err}");
        }
    }

    /// Checks that the server answers a PING.
    fn serve(&self) -> Result<()> {
        self.ping().map_err(Error::from)
    }

    /// Closes the client if one was built; a no-op otherwise.
    fn shutdown(&mut self) -> Result<()> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };

        store.close()?;
        tracing::info!(component = %self.name, "redis client closed");
        Ok(())
    }
}
