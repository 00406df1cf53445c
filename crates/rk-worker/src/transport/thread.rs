//! Worker running on its own OS thread

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use rk_kernel::GeometryKernel;
use tracing::{info, warn};

use super::{Inbox, WorkerEndpoint};
use crate::cache::CacheStats;
use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::envelope::CallEnvelope;
use crate::error::TransportError;
use crate::router::Router;

/// Background worker thread owning a [`WorkerContext`]
///
/// The context is built on the worker thread, so the kernel never crosses
/// threads after construction. Dropping the worker closes its channel and
/// waits for the thread to finish the calls already queued.
pub struct ThreadWorker {
    sender: Mutex<Option<Sender<CallEnvelope>>>,
    handle: Mutex<Option<JoinHandle<CacheStats>>>,
    thread_name: String,
}

impl ThreadWorker {
    /// Start the worker thread
    ///
    /// # Arguments
    /// * `config` - Worker settings (thread name, cache threshold, busy signal)
    /// * `make_kernel` - Builds the kernel on the worker thread
    /// * `inbox` - Receives busy signals and responses
    pub fn spawn<F>(config: WorkerConfig, make_kernel: F, inbox: Inbox) -> Result<Self, TransportError>
    where
        F: FnOnce() -> Box<dyn GeometryKernel> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<CallEnvelope>();
        let thread_name = config.thread_name.clone();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let context = WorkerContext::init(make_kernel(), &config);
                let mut router = Router::new(context, &config);
                info!("Worker thread '{}' started", config.thread_name);

                while let Ok(call) = receiver.recv() {
                    router.handle(call, &mut |message| (*inbox)(message));
                }

                info!("Worker thread '{}' stopping", config.thread_name);
                router.shutdown()
            })
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            thread_name,
        })
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Close the channel and wait for the worker to drain it
    ///
    /// Returns the final cache statistics, or `None` if the worker was
    /// already stopped or its thread panicked.
    pub fn shutdown(&self) -> Option<CacheStats> {
        self.sender.lock().take();
        let handle = self.handle.lock().take()?;
        if handle.thread().id() == thread::current().id() {
            // Joining ourselves would never return
            return None;
        }
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("Worker thread '{}' panicked", self.thread_name);
                None
            }
        }
    }
}

impl WorkerEndpoint for ThreadWorker {
    fn post(&self, call: CallEnvelope) -> Result<(), TransportError> {
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| TransportError::Disconnected(format!("{} was shut down", self.thread_name)))?;
        sender
            .send(call)
            .map_err(|_| TransportError::Disconnected(format!("{} is no longer running", self.thread_name)))
    }

    fn kind(&self) -> &str {
        "thread"
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
