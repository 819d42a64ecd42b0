//! Prometheus collectors for Redis commands and the metrics sub-component
//! that owns their registry.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::config::{ConfigTree, MetricsConfig};
use crate::error::{Error, Result};
use crate::lifecycle::Component;

/// Label keys shared by both collectors, in emission order.
pub const LABEL_NAMES: [&str; 6] = ["address", "db", "masterName", "pipe", "cmd", "error"];

/// Metric name of the duration histogram, before namespace and subsystem.
pub const DURATION_METRIC: &str = "redis_command";

/// Metric name of the call counter, before namespace and subsystem.
pub const COUNTER_METRIC: &str = "redis_command_total";

/// The metrics sub-component.
///
/// Holds the namespace and subsystem every collector is registered under and
/// the registry they land in. Clones share the registry.
#[derive(Clone)]
pub struct Metrics {
    name: String,
    config: MetricsConfig,
    registry: Registry,
}

impl Metrics {
    /// Metrics backed by the process-wide default registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, prometheus::default_registry().clone())
    }

    pub fn with_registry(name: impl Into<String>, registry: Registry) -> Self {
        Self {
            name: name.into(),
            config: MetricsConfig::default(),
            registry,
        }
    }

    /// Sets namespace and subsystem directly, bypassing the config source.
    pub fn with_config(mut self, config: MetricsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn subsystem(&self) -> &str {
        &self.config.subsystem
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Renders every registered collector in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        encode_text(&self.gather())
    }
}

fn encode_text(families: &[prometheus::proto::MetricFamily]) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(families, &mut buffer)
        .map_err(Error::Encode)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl Component for Metrics {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_did_load(&mut self, config: &ConfigTree) {
        match config.section::<MetricsConfig>(&self.name) {
            Ok(section) => self.config = section,
            Err(err) => panic!("{err}"),
        }
    }

    fn serve(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The label tuple of one unit of work.
#[derive(Debug, Clone, Copy)]
pub struct CommandLabels<'a> {
    pub address: &'a str,
    pub db: &'a str,
    pub master_name: &'a str,
    pub pipe: bool,
    pub cmd: &'a str,
    pub error: &'a str,
}

impl<'a> CommandLabels<'a> {
    fn values(&self) -> [&'a str; 6] {
        let pipe = if self.pipe { "true" } else { "false" };
        [
            self.address,
            self.db,
            self.master_name,
            pipe,
            self.cmd,
            self.error,
        ]
    }
}

/// Duration histogram and call counter for Redis units of work.
#[derive(Clone)]
pub struct CommandMetrics {
    duration: HistogramVec,
    calls: IntCounterVec,
}

impl CommandMetrics {
    /// Creates both collectors and registers them with `metrics`.
    ///
    /// Fails when a collector with the same name is already registered.
    pub fn register(metrics: &Metrics) -> Result<Self> {
        let duration = HistogramVec::new(
            HistogramOpts::new(DURATION_METRIC, "redis command duration in seconds")
                .namespace(metrics.namespace())
                .subsystem(metrics.subsystem())
                .buckets(prometheus::exponential_buckets(0.0001, 2.0, 16)?),
            &LABEL_NAMES,
        )?;

        let calls = IntCounterVec::new(
            Opts::new(COUNTER_METRIC, "redis command counter")
                .namespace(metrics.namespace())
                .subsystem(metrics.subsystem()),
            &LABEL_NAMES,
        )?;

        metrics.registry().register(Box::new(duration.clone()))?;
        metrics.registry().register(Box::new(calls.clone()))?;

        tracing::debug!(
            namespace = metrics.namespace(),
            subsystem = metrics.subsystem(),
            "redis command metrics registered"
        );

        Ok(Self { duration, calls })
    }

    /// Emits one observation and one increment for a finished unit.
    pub fn observe(&self, labels: &CommandLabels<'_>, elapsed: Duration) {
        let values = labels.values();
        self.duration
            .with_label_values(&values)
            .observe(elapsed.as_secs_f64());
        self.calls.with_label_values(&values).inc();
    }

    pub fn duration(&self) -> &HistogramVec {
        &self.duration
    }

    pub fn calls(&self) -> &IntCounterVec {
        &self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metrics() -> Metrics {
        Metrics::with_registry("metrics", Registry::new()).with_config(MetricsConfig {
            namespace: "app".to_string(),
            subsystem: "cache".to_string(),
        })
    }

    fn labels<'a>(cmd: &'a str, error: &'a str) -> CommandLabels<'a> {
        CommandLabels {
            address: "127.0.0.1:6379",
            db: "0",
            master_name: "",
            pipe: false,
            cmd,
            error,
        }
    }

    #[test]
    fn test_metric_names_use_namespace_and_subsystem() {
        let metrics = metrics();
        let command_metrics = CommandMetrics::register(&metrics).unwrap();
        command_metrics.observe(&labels("get", ""), Duration::from_millis(1));

        let names: Vec<String> = metrics
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"app_cache_redis_command".to_string()));
        assert!(names.contains(&"app_cache_redis_command_total".to_string()));
    }

    #[test]
    fn test_every_label_key_is_present() {
        let metrics = metrics();
        let command_metrics = CommandMetrics::register(&metrics).unwrap();
        command_metrics.observe(&labels("get", ""), Duration::from_millis(1));

        let families = metrics.gather();
        let family = families
            .iter()
            .find(|family| family.get_name() == "app_cache_redis_command_total")
            .unwrap();
        let metric = &family.get_metric()[0];
        let mut label_names: Vec<&str> = metric.get_label().iter().map(|l| l.get_name()).collect();
        let mut expected = LABEL_NAMES.to_vec();
        label_names.sort_unstable();
        expected.sort_unstable();

        assert_eq!(label_names, expected);
    }

    #[test]
    fn test_observe_counts_once_per_unit() {
        let metrics = metrics();
        let command_metrics = CommandMetrics::register(&metrics).unwrap();

        command_metrics.observe(&labels("get", ""), Duration::from_millis(2));
        command_metrics.observe(&labels("get", ""), Duration::from_millis(3));

        let values = labels("get", "").values();
        assert_eq!(command_metrics.calls().with_label_values(&values).get(), 2);
        let histogram = command_metrics.duration().with_label_values(&values);
        assert_eq!(histogram.get_sample_count(), 2);
        assert!(histogram.get_sample_sum() >= 0.005);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let metrics = metrics();
        CommandMetrics::register(&metrics).unwrap();

        assert!(CommandMetrics::register(&metrics).is_err());
    }

    #[test]
    fn test_render_text_format() {
        let metrics = metrics();
        let command_metrics = CommandMetrics::register(&metrics).unwrap();
        command_metrics.observe(&labels("set", ""), Duration::from_millis(1));

        let text = metrics.render().unwrap();

        assert!(text.contains("app_cache_redis_command_total"));
        assert!(text.contains("cmd=\"set\""));
        assert!(text.contains("pipe=\"false\""));
    }

    #[test]
    fn test_encoding_failure_is_not_a_registration_error() {
        let mut family = prometheus::proto::MetricFamily::new();
        family.set_name("app_cache_empty".to_string());

        let err = encode_text(&[family]).unwrap_err();

        assert!(matches!(err, Error::Encode(_)));
        assert!(err.to_string().starts_with("failed to encode metrics"));
    }

    #[test]
    fn test_config_did_load_reads_section() {
        let mut metrics = Metrics::with_registry("metrics", Registry::new());
        let tree = ConfigTree::new(json!({
            "metrics": { "namespace": "shop", "subsystem": "orders" }
        }));

        metrics.config_did_load(&tree);

        assert_eq!(metrics.namespace(), "shop");
        assert_eq!(metrics.subsystem(), "orders");
    }
}
