//! Messages exchanged between the dispatcher and the worker
//!
//! Wire shape, outbound: `{correlationId, action: {functionName, inputs}}`.
//! Inbound: `{correlationId, result?, error?}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token pairing one call with its single response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The operation a call addresses and its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Dotted operation path, e.g. `shapes.solid.createCube`
    pub function_name: String,
    /// Structured arguments
    pub inputs: Value,
}

/// A call travelling from the dispatcher to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope {
    pub correlation_id: CorrelationId,
    pub action: Action,
}

impl CallEnvelope {
    pub fn new(correlation_id: CorrelationId, operation_path: impl Into<String>, inputs: Value) -> Self {
        Self {
            correlation_id,
            action: Action {
                function_name: operation_path.into(),
                inputs,
            },
        }
    }

    pub fn operation_path(&self) -> &str {
        &self.action.function_name
    }

    pub fn inputs(&self) -> &Value {
        &self.action.inputs
    }
}

/// The single reply to a [`CallEnvelope`]
///
/// Built through [`ResponseEnvelope::success`] or [`ResponseEnvelope::failure`]
/// so exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(correlation_id: CorrelationId, result: Value) -> Self {
        Self {
            correlation_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(correlation_id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Consume the envelope. A missing result (e.g. a decoded `null`) is a
    /// `null` success; an error always wins.
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Everything the worker can send back
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Advisory "work started" signal, not tied to any request
    Busy,
    Response(ResponseEnvelope),
}
