//! Synchronous in-process worker

use parking_lot::Mutex;
use rk_kernel::GeometryKernel;

use super::{Inbox, WorkerEndpoint};
use crate::cache::CacheStats;
use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::envelope::CallEnvelope;
use crate::error::TransportError;
use crate::router::Router;

/// Worker that routes each call on the posting thread and delivers the
/// response before `post` returns
///
/// Used by tests and by the `--direct` mode of the driver. The inbox must not
/// post back into the same worker.
pub struct DirectWorker {
    router: Mutex<Option<Router>>,
    inbox: Inbox,
}

impl DirectWorker {
    pub fn new(kernel: Box<dyn GeometryKernel>, config: &WorkerConfig, inbox: Inbox) -> Self {
        let context = WorkerContext::init(kernel, config);
        Self {
            router: Mutex::new(Some(Router::new(context, config))),
            inbox,
        }
    }

    /// Inspect the worker context, if the worker is still running
    pub fn with_context<R>(&self, f: impl FnOnce(&WorkerContext) -> R) -> Option<R> {
        self.router.lock().as_ref().map(|router| f(router.context()))
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.with_context(|context| context.cache().stats())
    }

    /// Tear the context down. Later posts fail with `Disconnected`.
    pub fn shutdown(&self) -> Option<CacheStats> {
        self.router.lock().take().map(Router::shutdown)
    }
}

impl WorkerEndpoint for DirectWorker {
    fn post(&self, call: CallEnvelope) -> Result<(), TransportError> {
        let mut guard = self.router.lock();
        let router = guard
            .as_mut()
            .ok_or_else(|| TransportError::Disconnected("direct worker was shut down".into()))?;
        router.handle(call, &mut |message| (*self.inbox)(message));
        Ok(())
    }

    fn kind(&self) -> &str {
        "direct"
    }
}
