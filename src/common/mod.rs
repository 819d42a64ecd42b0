//! Helpers shared by the store, the interception layer and the component:
//! command naming, label joining and tracing spans.

use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions as semconv;
use redis::{Cmd, RedisError, RedisResult, Value};

/// Separator between command names (and error messages) of one unit.
pub const UNIT_SEPARATOR: &str = ";";

/// Separator between configured addresses in the `address` label.
pub const ADDRESS_SEPARATOR: &str = ",";

/// Extracts OpenTelemetry attributes from a Redis command.
///
/// Always yields `db.system.name = "redis"`; adds `db.operation.name` when the
/// command name can be read.
pub fn extract_command_attributes(cmd: &Cmd) -> Vec<KeyValue> {
    let mut attributes = vec![KeyValue::new(semconv::attribute::DB_SYSTEM_NAME, "redis")];

    if let Some(cmd_name) = get_command_name(cmd) {
        attributes.push(KeyValue::new(semconv::attribute::DB_OPERATION_NAME, cmd_name));
    }

    attributes
}

/// Reads the command name from the first argument of `cmd`, uppercased.
///
/// Cursor arguments belong to the SCAN family. Returns `None` for an empty
/// command or a name that is not UTF-8.
pub fn get_command_name(cmd: &Cmd) -> Option<String> {
    let first_arg = cmd.args_iter().next()?;

    let arg_bytes = match first_arg {
        redis::Arg::Simple(bytes) => bytes,
        redis::Arg::Cursor => return Some("SCAN".to_string()),
    };

    match std::str::from_utf8(arg_bytes) {
        Ok(cmd_name) => Some(cmd_name.to_uppercase()),
        Err(_) => {
            tracing::warn!("Failed to parse Redis command name as UTF-8");
            None
        }
    }
}

/// Command name as it appears in the `cmd` metric label: lowercase, with
/// an empty string for unreadable commands.
pub fn command_label(cmd: &Cmd) -> String {
    get_command_name(cmd)
        .map(|name| name.to_lowercase())
        .unwrap_or_default()
}

/// Joins the command names of a unit with [`UNIT_SEPARATOR`].
pub fn join_command_labels<'a, I>(cmds: I) -> String
where
    I: IntoIterator<Item = &'a Cmd>,
{
    cmds.into_iter()
        .map(command_label)
        .collect::<Vec<_>>()
        .join(UNIT_SEPARATOR)
}

/// Error message of one command outcome, if it counts as an error.
///
/// A missing key comes back from redis-rs as a `Nil` reply, which is a
/// normal outcome and never produces a message.
pub fn outcome_error(result: &RedisResult<Value>) -> Option<String> {
    match result {
        Ok(_) => None,
        Err(err) => Some(err.to_string()),
    }
}

/// True when the reply means "no such key".
pub fn is_not_found(result: &RedisResult<Value>) -> bool {
    matches!(result, Ok(Value::Nil))
}

pub fn generate_span_name(operation: &str) -> String {
    format!("redis {}", operation.to_lowercase())
}

/// Creates a span for a single command along with its attributes.
///
/// Result fields are declared empty up front so [`record_command_result`]
/// can fill them later.
pub fn create_command_span(cmd: &Cmd) -> (tracing::Span, Vec<KeyValue>) {
    let attributes = extract_command_attributes(cmd);

    let operation = get_command_name(cmd).unwrap_or_else(|| "command".to_string());
    let span_name = generate_span_name(&operation);

    let span = tracing::info_span!(
        "redis_command",
        otel.name = %span_name,
        db.system = "redis",
        db.operation = %operation,
        db.system.name = tracing::field::Empty,
        db.operation.name = tracing::field::Empty,
        error = tracing::field::Empty,
        error.message = tracing::field::Empty,
        "error.type" = tracing::field::Empty,
        otel.status_code = tracing::field::Empty,
        otel.status_description = tracing::field::Empty,
    );

    (span, attributes)
}

/// Creates a span for a pipeline of commands.
pub fn create_pipeline_span(cmds: &[Cmd]) -> tracing::Span {
    let operation = cmds
        .iter()
        .map(|cmd| get_command_name(cmd).unwrap_or_else(|| "command".to_string()))
        .collect::<Vec<_>>()
        .join(UNIT_SEPARATOR);

    tracing::info_span!(
        "redis_pipeline",
        otel.name = "redis pipeline",
        db.system = "redis",
        db.operation = "pipeline",
        redis.pipeline.commands = %operation,
        redis.pipeline.count = cmds.len(),
        error = tracing::field::Empty,
        error.message = tracing::field::Empty,
        "error.type" = tracing::field::Empty,
        otel.status_code = tracing::field::Empty,
        otel.status_description = tracing::field::Empty,
    )
}

/// Records attributes with basic value types as span fields; other value
/// types are skipped.
pub fn apply_span_attributes(span: &tracing::Span, attributes: &[KeyValue]) {
    for attr in attributes {
        match &attr.value {
            opentelemetry::Value::String(s) => {
                span.record(attr.key.as_str(), s.as_str());
            }
            opentelemetry::Value::I64(i) => {
                span.record(attr.key.as_str(), *i);
            }
            opentelemetry::Value::F64(f) => {
                span.record(attr.key.as_str(), *f);
            }
            opentelemetry::Value::Bool(b) => {
                span.record(attr.key.as_str(), *b);
            }
            _ => {}
        }
    }
}

/// Records success or failure of a unit on its span.
pub fn record_command_result<T>(span: &tracing::Span, result: &Result<T, RedisError>) {
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            record_error_on_span(span, err);
        }
    }
}

/// Records error details on a span, with the error kind mapped to a stable
/// `error.type` value.
pub fn record_error_on_span(span: &tracing::Span, err: &RedisError) {
    span.record("error", true);
    span.record("error.message", tracing::field::display(err));
    span.record("otel.status_code", "ERROR");
    span.record("otel.status_description", tracing::field::display(err));
    span.record("error.type", error_type(err));
}

fn error_type(err: &RedisError) -> &'static str {
    match err.kind() {
        redis::ErrorKind::ResponseError => "response_error",
        redis::ErrorKind::AuthenticationFailed => "authentication_failed",
        redis::ErrorKind::TypeError => "type_error",
        redis::ErrorKind::ExecAbortError => "exec_abort_error",
        redis::ErrorKind::BusyLoadingError => "busy_loading_error",
        redis::ErrorKind::NoScriptError => "no_script_error",
        redis::ErrorKind::InvalidClientConfig => "invalid_client_config",
        redis::ErrorKind::Moved => "moved",
        redis::ErrorKind::Ask => "ask",
        redis::ErrorKind::TryAgain => "try_again",
        redis::ErrorKind::ClusterDown => "cluster_down",
        redis::ErrorKind::CrossSlot => "cross_slot",
        redis::ErrorKind::MasterDown => "master_down",
        redis::ErrorKind::IoError => "io_error",
        redis::ErrorKind::ClientError => "client_error",
        redis::ErrorKind::ExtensionError => "extension_error",
        _ => "unknown",
    }
}

/// The error every operation returns once the client is gone.
pub fn client_closed() -> RedisError {
    RedisError::from((redis::ErrorKind::ClientError, "redis: client is closed"))
}
