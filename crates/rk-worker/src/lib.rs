//! Background Geometry Kernel Worker
//!
//! This crate provides:
//! - A main-thread [`Dispatcher`] that correlates calls with responses
//! - A worker-side [`Router`] resolving dotted operation paths to typed calls
//! - Result memoization keyed by call signature, cleared at run boundaries
//! - Thread and synchronous in-process transports

pub mod cache;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod ops;
pub mod router;
pub mod script;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use cache::{CacheHelper, CacheKey, CacheStats, CacheStore};
pub use config::{ConfigError, DispatcherConfig, RpcConfig, WorkerConfig};
pub use context::WorkerContext;
pub use dispatcher::{Dispatcher, PendingCall};
pub use envelope::{Action, CallEnvelope, CorrelationId, ResponseEnvelope, WorkerMessage};
pub use error::{RpcError, RpcResult, TransportError};
pub use ops::{KernelCall, OperationError, OperationId, OperationRegistry};
pub use router::{CLEAR_CACHE_PATH, RUN_BOUNDARY_PATH, Router};
pub use transport::{DirectWorker, Inbox, ThreadWorker, WorkerEndpoint};
