//! Channels between the dispatcher and a worker
//!
//! - [`ThreadWorker`]: a dedicated OS thread fed by an ordered channel
//! - [`DirectWorker`]: runs the router synchronously on the caller's thread

mod direct;
mod thread;

use std::sync::Arc;

pub use direct::DirectWorker;
pub use thread::ThreadWorker;

use crate::envelope::{CallEnvelope, WorkerMessage};
use crate::error::TransportError;

/// Callback through which a worker hands messages back to the dispatcher
pub type Inbox = Arc<dyn Fn(WorkerMessage) + Send + Sync>;

/// The sending half of a worker as seen by the dispatcher
pub trait WorkerEndpoint: Send + Sync {
    /// Queue a call for the worker. Calls are processed in posting order.
    fn post(&self, call: CallEnvelope) -> Result<(), TransportError>;

    /// Short transport name for logging
    fn kind(&self) -> &str;
}
