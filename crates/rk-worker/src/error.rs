//! Caller-facing error types

use thiserror::Error;

use crate::envelope::CorrelationId;

/// Errors raised while moving envelopes between dispatcher and worker
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Worker channel closed: {0}")]
    Disconnected(String),

    #[error("Failed to start worker: {0}")]
    Spawn(String),
}

/// Errors a caller of [`Dispatcher::invoke`](crate::Dispatcher::invoke) can observe
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("No worker attached")]
    NotReady,

    #[error("Request {0} was dropped without a reply")]
    WorkerGone(CorrelationId),

    /// The worker replied with an error envelope
    #[error("{0}")]
    Remote(String),

    #[error("Call to {path} timed out after {after_ms} ms")]
    Timeout { path: String, after_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for dispatcher calls
pub type RpcResult<T> = Result<T, RpcError>;
