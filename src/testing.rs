//! A scripted [`Store`] for unit tests; no Redis server needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::{Cmd, ErrorKind, RedisError, RedisResult, Value};

use crate::common::{client_closed, command_label};
use crate::store::{PipelineResult, Store};

/// What the store answers for one command name.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Value(Value),
    Error(ErrorKind, &'static str),
}

impl Reply {
    fn to_result(&self) -> RedisResult<Value> {
        match self {
            Reply::Value(value) => Ok(value.clone()),
            Reply::Error(kind, desc) => Err(RedisError::from((*kind, *desc))),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedStore {
    replies: HashMap<String, Reply>,
    pipeline_failure: Option<(ErrorKind, &'static str)>,
    delay: Option<Duration>,
    closed: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Self {
        Self::default().reply("ping", Reply::Value(Value::SimpleString("PONG".to_string())))
    }

    /// Answers commands named `name` (lowercase) with `reply`; others get `OK`.
    pub(crate) fn reply(mut self, name: &str, reply: Reply) -> Self {
        self.replies.insert(name.to_string(), reply);
        self
    }

    pub(crate) fn fail_pipelines(mut self, kind: ErrorKind, desc: &'static str) -> Self {
        self.pipeline_failure = Some((kind, desc));
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub(crate) fn request_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.requests)
    }

    fn answer(&self, cmd: &Cmd) -> RedisResult<Value> {
        self.replies
            .get(&command_label(cmd))
            .map_or(Ok(Value::Okay), Reply::to_result)
    }

    fn begin(&self) -> RedisResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(client_closed());
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }
}

impl Store for ScriptedStore {
    fn req_command(&self, cmd: &Cmd) -> RedisResult<Value> {
        self.begin()?;
        self.answer(cmd)
    }

    fn req_pipeline(&self, cmds: &[Cmd]) -> PipelineResult {
        self.begin()?;
        if let Some((kind, desc)) = self.pipeline_failure {
            return Err(RedisError::from((kind, desc)));
        }
        Ok(cmds.iter().map(|cmd| self.answer(cmd)).collect())
    }

    fn close(&self) -> RedisResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
