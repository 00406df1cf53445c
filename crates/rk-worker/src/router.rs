//! Worker-side call handling
//!
//! Every [`CallEnvelope`] that reaches the router produces exactly one
//! [`ResponseEnvelope`]. Failures, including a panicking kernel, become error
//! envelopes; the worker itself keeps running.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{trace, warn};

use crate::cache::CacheStats;
use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::envelope::{CallEnvelope, ResponseEnvelope, WorkerMessage};
use crate::ops::OperationError;

/// Reserved path marking the start of a caller run
pub const RUN_BOUNDARY_PATH: &str = "startedTheRun";

/// Reserved path that empties the result cache
pub const CLEAR_CACHE_PATH: &str = "cleanAllCache";

/// Routes calls to the worker context and builds their responses
pub struct Router {
    context: WorkerContext,
    emit_busy: bool,
}

impl Router {
    pub fn new(context: WorkerContext, config: &WorkerConfig) -> Self {
        Self {
            context,
            emit_busy: config.emit_busy,
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Handle one call, pushing everything the worker has to say into `outbox`
    ///
    /// # Arguments
    /// * `call` - The inbound call
    /// * `outbox` - Receives an optional busy signal, then the response
    pub fn handle(&mut self, call: CallEnvelope, outbox: &mut dyn FnMut(WorkerMessage)) {
        if self.emit_busy {
            trace!("Worker busy with {} ({})", call.correlation_id, call.operation_path());
            outbox(WorkerMessage::Busy);
        }
        let response = self.respond(&call);
        outbox(WorkerMessage::Response(response));
    }

    /// Build the response for `call`
    pub fn respond(&mut self, call: &CallEnvelope) -> ResponseEnvelope {
        let id = call.correlation_id;
        match call.operation_path() {
            RUN_BOUNDARY_PATH => {
                self.context.start_run();
                ResponseEnvelope::success(id, Value::Null)
            }
            CLEAR_CACHE_PATH => {
                self.context.clear_cache();
                ResponseEnvelope::success(id, Value::Null)
            }
            path => match self.execute(path, call.inputs()) {
                Ok(result) => ResponseEnvelope::success(id, result),
                Err(err) => {
                    let message = self.failure_message(path, call.inputs(), &err);
                    if err.is_resolution() {
                        warn!("Call {} rejected, no operation at '{}': {}", id, path, err);
                    } else {
                        warn!("Call {} failed: {}", id, message);
                    }
                    ResponseEnvelope::failure(id, message)
                }
            },
        }
    }

    fn execute(&mut self, path: &str, inputs: &Value) -> Result<Value, OperationError> {
        let context = &mut self.context;
        panic::catch_unwind(AssertUnwindSafe(|| context.run_operation(path, inputs)))
            .unwrap_or_else(|payload| Err(OperationError::Panicked(panic_text(payload.as_ref()))))
    }

    fn failure_message(&self, path: &str, inputs: &Value, err: &OperationError) -> String {
        format!(
            "{} computation failed while executing {}. Arguments were: {}. Original message: {}",
            self.context.kernel_name(),
            path,
            render_arguments(inputs),
            err
        )
    }

    /// Stop routing and tear the context down
    pub fn shutdown(self) -> CacheStats {
        self.context.teardown()
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Render arguments as `key:value` pairs for error messages
fn render_arguments(inputs: &Value) -> String {
    match inputs {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                Value::String(text) => format!("{key}:{text}"),
                other => format!("{key}:{other}"),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
