//! Interception of every unit of work sent to a [`Store`].
//!
//! [`InstrumentedStore`] wraps another store. Around each command or
//! pipeline it opens a tracing span, takes the start time in the call's own
//! frame, runs the unit and then reports elapsed time, command names and
//! error messages. Concurrent units never share timing state.

use std::time::{Duration, Instant};

use redis::{Cmd, RedisResult, Value};

use crate::common::{
    apply_span_attributes, command_label, create_command_span, create_pipeline_span,
    is_not_found, join_command_labels, outcome_error, record_command_result,
    record_error_on_span, ADDRESS_SEPARATOR, UNIT_SEPARATOR,
};
use crate::config::RedisConfig;
use crate::metrics::{CommandLabels, CommandMetrics};
use crate::store::{PipelineResult, Store};

/// Labels fixed by the configuration for the lifetime of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLabels {
    pub address: String,
    pub db: String,
    pub master_name: String,
}

impl StaticLabels {
    pub fn from_config(config: &RedisConfig) -> Self {
        Self {
            address: config.address.join(ADDRESS_SEPARATOR),
            db: config.db.to_string(),
            master_name: config.master_name.clone(),
        }
    }
}

/// A store decorator that traces every unit and, when given collectors,
/// records its duration and count.
pub struct InstrumentedStore<S> {
    inner: S,
    metrics: Option<CommandMetrics>,
    labels: StaticLabels,
}

impl<S: Store> InstrumentedStore<S> {
    pub fn new(inner: S, metrics: Option<CommandMetrics>, labels: StaticLabels) -> Self {
        Self {
            inner,
            metrics,
            labels,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn metrics(&self) -> Option<&CommandMetrics> {
        self.metrics.as_ref()
    }

    fn record(&self, pipe: bool, cmd: &str, error: &str, elapsed: Duration) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        let labels = CommandLabels {
            address: &self.labels.address,
            db: &self.labels.db,
            master_name: &self.labels.master_name,
            pipe,
            cmd,
            error,
        };
        metrics.observe(&labels, elapsed);
    }
}

impl<S: Store> Store for InstrumentedStore<S> {
    fn req_command(&self, cmd: &Cmd) -> RedisResult<Value> {
        let (span, attributes) = create_command_span(cmd);
        let _enter = span.enter();
        apply_span_attributes(&span, &attributes);

        let start = Instant::now();
        let result = self.inner.req_command(cmd);
        let elapsed = start.elapsed();

        record_command_result(&span, &result);
        if is_not_found(&result) {
            tracing::trace!("redis key not found");
        }

        let error = outcome_error(&result).unwrap_or_default();
        self.record(false, &command_label(cmd), &error, elapsed);

        result
    }

    fn req_pipeline(&self, cmds: &[Cmd]) -> PipelineResult {
        let span = create_pipeline_span(cmds);
        let _enter = span.enter();

        let start = Instant::now();
        let result = self.inner.req_pipeline(cmds);
        let elapsed = start.elapsed();

        record_command_result(&span, &result);
        if let Ok(results) = &result {
            if let Some(Err(err)) = results.iter().find(|result| result.is_err()) {
                record_error_on_span(&span, err);
            }
        }

        self.record(true, &join_command_labels(cmds), &pipeline_error(&result), elapsed);

        result
    }

    fn close(&self) -> RedisResult<()> {
        self.inner.close()
    }
}

/// The `error` label of a pipeline: the unit-level failure, or the messages
/// of the failed commands in submission order.
fn pipeline_error(result: &PipelineResult) -> String {
    match result {
        Err(err) => err.to_string(),
        Ok(results) => results
            .iter()
            .filter_map(outcome_error)
            .collect::<Vec<_>>()
            .join(UNIT_SEPARATOR),
    }
}
