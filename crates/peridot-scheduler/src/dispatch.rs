//! Handing jobs to agents.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use peridot_core::Job;

use crate::{SchedulerError, SchedulerResult};

/// Delivers a ready job to whatever runs it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Name of this dispatcher.
    fn name(&self) -> &'static str;

    /// Hand off one job. `Ok` means the receiver has accepted it.
    async fn dispatch(&self, job: &Job) -> SchedulerResult<()>;
}

/// Writes each job as one JSON line, for a downstream process that starts
/// agents from a pipe.
pub struct JsonLinesDispatcher<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesDispatcher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl<W: Write + Send> Dispatcher for JsonLinesDispatcher<W> {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    async fn dispatch(&self, job: &Job) -> SchedulerResult<()> {
        let line = serde_json::to_string(job).map_err(|e| SchedulerError::Dispatch(e.to_string()))?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| SchedulerError::Dispatch("output lock poisoned".to_string()))?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| SchedulerError::Dispatch(e.to_string()))
    }
}
