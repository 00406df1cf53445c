//! Call scripts for the `rkw` driver
//!
//! A script is a list of runs, each a list of steps:
//!
//! ```json
//! { "runs": [[
//!     { "op": "shapes.solid.createCube", "inputs": { "size": 3 } },
//!     { "op": "shapeToMesh", "inputs": { "shape": "$0" } }
//! ]] }
//! ```
//!
//! A string of the form `"$N"` anywhere in a step's inputs is replaced by the
//! result of step `N` of the same run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::error::RpcError;

/// One call in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub op: String,
    #[serde(default)]
    pub inputs: Value,
}

/// A complete script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub runs: Vec<Vec<Step>>,
}

/// Script loading and reference errors
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid script: {0}")]
    Parse(String),

    #[error("Step {step} refers to {reference}, which has no result")]
    BadReference { step: usize, reference: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Outcome of one executed step, printed as a JSON line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub run: usize,
    pub step: usize,
    pub op: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Script {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ScriptError::Io(e.to_string()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(content).map_err(|e| ScriptError::Parse(e.to_string()))
    }

    pub fn step_count(&self) -> usize {
        self.runs.iter().map(Vec::len).sum()
    }

    /// Execute every run through `dispatcher`, handing each report to `sink`
    /// as soon as its step settles
    ///
    /// Step failures are reported and do not stop the script. A failed run
    /// boundary does.
    pub async fn execute(
        &self,
        dispatcher: &Dispatcher,
        mut sink: impl FnMut(StepReport),
    ) -> Result<(), ScriptError> {
        for (run, steps) in self.runs.iter().enumerate() {
            dispatcher.start_run().await?;
            info!("Run {} started ({} steps)", run, steps.len());

            let mut results: Vec<Option<Value>> = Vec::with_capacity(steps.len());
            for (index, step) in steps.iter().enumerate() {
                let outcome = match resolve_references(&step.inputs, &results, index) {
                    Ok(inputs) => dispatcher
                        .invoke(step.op.as_str(), inputs)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                debug!("Run {} step {} ({}) ok={}", run, index, step.op, outcome.is_ok());

                let (result, error) = match outcome {
                    Ok(value) => (Some(value), None),
                    Err(message) => (None, Some(message)),
                };
                results.push(result.clone());
                sink(StepReport {
                    run,
                    step: index,
                    op: step.op.clone(),
                    ok: error.is_none(),
                    result,
                    error,
                });
            }
        }
        Ok(())
    }
}

/// Substitute `"$N"` references in `inputs` with earlier step results
fn resolve_references(
    inputs: &Value,
    results: &[Option<Value>],
    step: usize,
) -> Result<Value, ScriptError> {
    match inputs {
        Value::String(text) => match text.strip_prefix('$').and_then(|n| n.parse::<usize>().ok()) {
            Some(index) => results
                .get(index)
                .cloned()
                .flatten()
                .ok_or_else(|| ScriptError::BadReference {
                    step,
                    reference: text.clone(),
                }),
            None => Ok(inputs.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_references(item, results, step))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                resolve_references(value, results, step).map(|resolved| (key.clone(), resolved))
            })
            .collect::<Result<serde_json::Map<String, Value>, _>>()
            .map(Value::Object),
        _ => Ok(inputs.clone()),
    }
}
