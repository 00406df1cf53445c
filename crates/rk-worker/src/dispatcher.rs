//! Main-thread side of the worker RPC
//!
//! [`Dispatcher::invoke`] never blocks: it registers a pending request, sends
//! the call envelope (or queues it until a worker is attached) and returns a
//! [`PendingCall`] future that settles when the matching response arrives.
//!
//! Responses are matched to requests only by correlation id. The worker may
//! answer in any order; advisory busy signals never settle a call.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rk_kernel::GeometryKernel;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info, trace, warn};

use crate::config::{DispatcherConfig, WorkerConfig};
use crate::envelope::{CallEnvelope, CorrelationId, WorkerMessage};
use crate::error::{RpcError, RpcResult, TransportError};
use crate::router::{CLEAR_CACHE_PATH, RUN_BOUNDARY_PATH};
use crate::transport::{DirectWorker, Inbox, ThreadWorker, WorkerEndpoint};

type BusyListener = Box<dyn Fn() + Send + Sync>;

/// When a call stops waiting, fixed at send time
#[derive(Debug, Clone, Copy)]
struct CallDeadline {
    at: Instant,
    after: Duration,
}

impl CallDeadline {
    fn starting_now(after: Duration) -> Self {
        Self {
            at: Instant::now() + after,
            after,
        }
    }

    fn timeout_error(&self, path: &str) -> RpcError {
        RpcError::Timeout {
            path: path.to_string(),
            after_ms: self.after.as_millis() as u64,
        }
    }
}

/// A call waiting for its response
struct PendingRequest {
    path: String,
    reply: oneshot::Sender<RpcResult<Value>>,
    deadline: Option<CallDeadline>,
}

#[derive(Default)]
struct DispatchState {
    pending: HashMap<CorrelationId, PendingRequest>,
    worker: Option<Arc<dyn WorkerEndpoint>>,
    queued: VecDeque<CallEnvelope>,
    next_id: u64,
}

impl DispatchState {
    /// Next id not held by a pending request
    fn allocate_id(&mut self) -> CorrelationId {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            let id = CorrelationId(self.next_id);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Fail every request whose deadline has passed, even if its caller never
    /// polls again
    fn expire_overdue(&mut self, now: Instant) {
        let overdue: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, request)| request.deadline.is_some_and(|d| d.at <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in overdue {
            if let Some(request) = self.pending.remove(&id) {
                if let Some(deadline) = request.deadline {
                    warn!("Request {} ({}) timed out", id, request.path);
                    let _ = request.reply.send(Err(deadline.timeout_error(&request.path)));
                }
            }
        }
    }
}

struct DispatcherInner {
    config: DispatcherConfig,
    /// Held across sends so envelopes reach the worker in invocation order
    send_lock: Mutex<()>,
    state: Mutex<DispatchState>,
    busy_listener: RwLock<Option<BusyListener>>,
    protocol_violations: AtomicU64,
    busy_notifications: AtomicU64,
}

impl DispatcherInner {
    fn deliver(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Busy => {
                self.busy_notifications.fetch_add(1, Ordering::Relaxed);
                trace!("Worker reported busy");
                if let Some(listener) = self.busy_listener.read().as_ref() {
                    listener();
                }
            }
            WorkerMessage::Response(response) => {
                let id = response.correlation_id();
                let Some(request) = self.state.lock().pending.remove(&id) else {
                    self.protocol_violations.fetch_add(1, Ordering::Relaxed);
                    warn!("Discarding response for unknown request {}", id);
                    return;
                };
                let outcome = response.into_outcome().map_err(RpcError::Remote);
                if request.reply.send(outcome).is_err() {
                    debug!("Caller of {} ({}) went away before the reply", id, request.path);
                }
            }
        }
    }

    /// Settle a pending request with an error raised on this side
    fn fail(&self, id: CorrelationId, error: RpcError) {
        if let Some(request) = self.state.lock().pending.remove(&id) {
            warn!("Request {} ({}) failed: {}", id, request.path, error);
            let _ = request.reply.send(Err(error));
        }
    }

    /// Forget a request whose caller stopped waiting
    fn abandon(&self, id: CorrelationId) {
        self.state.lock().pending.remove(&id);
    }
}

/// Correlates calls to a worker with their responses
///
/// Cheap to clone; all clones share one pending table and worker binding.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                send_lock: Mutex::new(()),
                state: Mutex::new(DispatchState::default()),
                busy_listener: RwLock::new(None),
                protocol_violations: AtomicU64::new(0),
                busy_notifications: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Call an operation on the worker
    ///
    /// The envelope is sent (or queued) before this returns; awaiting the
    /// returned future only waits for the response.
    ///
    /// # Arguments
    /// * `operation_path` - Dotted operation path, e.g. `shapes.solid.createCube`
    /// * `inputs` - Structured arguments
    pub fn invoke(&self, operation_path: impl Into<String>, inputs: Value) -> PendingCall {
        let path = operation_path.into();
        let deadline = self.inner.config.call_timeout().map(CallDeadline::starting_now);
        let _send = self.inner.send_lock.lock();

        let (id, reply, worker, envelope) = {
            let mut state = self.inner.state.lock();
            if state.worker.is_none() && !self.inner.config.queue_until_attached {
                debug!("Rejecting {}: no worker attached", path);
                return PendingCall::failed(RpcError::NotReady);
            }

            state.expire_overdue(Instant::now());
            let id = state.allocate_id();
            let (tx, rx) = oneshot::channel();
            state.pending.insert(
                id,
                PendingRequest {
                    path: path.clone(),
                    reply: tx,
                    deadline,
                },
            );
            let envelope = CallEnvelope::new(id, path.clone(), inputs);
            match state.worker.clone() {
                Some(worker) => (id, rx, Some(worker), Some(envelope)),
                None => {
                    trace!("Queued {} ({}) until a worker is attached", id, path);
                    state.queued.push_back(envelope);
                    (id, rx, None, None)
                }
            }
        };

        if let (Some(worker), Some(envelope)) = (worker, envelope) {
            trace!("Sending {} ({}) to {} worker", id, path, worker.kind());
            if let Err(err) = worker.post(envelope) {
                self.inner.fail(id, err.into());
            }
        }

        PendingCall::waiting(id, path, reply, deadline, &self.inner)
    }

    /// Send the run-boundary marker
    pub fn start_run(&self) -> PendingCall {
        self.invoke(RUN_BOUNDARY_PATH, Value::Null)
    }

    /// Ask the worker to drop every cached result
    pub fn clear_cache(&self) -> PendingCall {
        self.invoke(CLEAR_CACHE_PATH, Value::Null)
    }

    /// Bind (or replace) the worker and flush queued calls to it in order
    ///
    /// The replaced worker is released only after both locks are dropped: a
    /// thread worker joins its thread on drop, and that thread may still be
    /// delivering replies.
    pub fn attach_worker(&self, worker: Arc<dyn WorkerEndpoint>) {
        let previous = {
            let _send = self.inner.send_lock.lock();
            let (previous, queued) = {
                let mut state = self.inner.state.lock();
                let previous = state.worker.replace(worker.clone());
                (previous, std::mem::take(&mut state.queued))
            };
            info!(
                "Attached {} worker ({} queued calls flushed)",
                worker.kind(),
                queued.len()
            );
            for envelope in queued {
                let id = envelope.correlation_id;
                if let Err(err) = worker.post(envelope) {
                    self.inner.fail(id, err.into());
                }
            }
            previous
        };
        if let Some(previous) = previous {
            debug!("Released previous {} worker", previous.kind());
        }
    }

    /// Unbind the current worker. Responses to calls it already received are
    /// still delivered through the inbox.
    pub fn detach_worker(&self) -> Option<Arc<dyn WorkerEndpoint>> {
        let _send = self.inner.send_lock.lock();
        let worker = self.inner.state.lock().worker.take();
        if let Some(worker) = &worker {
            info!("Detached {} worker", worker.kind());
        }
        worker
    }

    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().worker.is_some()
    }

    /// Callback a worker uses to hand messages back to this dispatcher
    ///
    /// Holds only a weak reference, so a worker never keeps its dispatcher
    /// alive.
    pub fn inbox(&self) -> Inbox {
        let inner: Weak<DispatcherInner> = Arc::downgrade(&self.inner);
        Arc::new(move |message| {
            if let Some(inner) = inner.upgrade() {
                inner.deliver(message);
            }
        })
    }

    /// Accept a message from the worker
    pub fn deliver(&self, message: WorkerMessage) {
        self.inner.deliver(message);
    }

    /// Register the listener called on every busy signal
    ///
    /// The listener runs on the delivering thread and must not call back into
    /// the dispatcher.
    pub fn on_busy(&self, listener: impl Fn() + Send + Sync + 'static) {
        *self.inner.busy_listener.write() = Some(Box::new(listener));
    }

    /// Start a worker thread and attach it
    ///
    /// # Arguments
    /// * `config` - Worker settings
    /// * `make_kernel` - Builds the kernel on the worker thread
    pub fn spawn_thread_worker<F>(
        &self,
        config: &WorkerConfig,
        make_kernel: F,
    ) -> Result<Arc<ThreadWorker>, TransportError>
    where
        F: FnOnce() -> Box<dyn GeometryKernel> + Send + 'static,
    {
        let worker = Arc::new(ThreadWorker::spawn(config.clone(), make_kernel, self.inbox())?);
        self.attach_worker(worker.clone());
        Ok(worker)
    }

    /// Attach a synchronous in-process worker
    pub fn attach_direct_worker(
        &self,
        kernel: Box<dyn GeometryKernel>,
        config: &WorkerConfig,
    ) -> Arc<DirectWorker> {
        let worker = Arc::new(DirectWorker::new(kernel, config, self.inbox()));
        self.attach_worker(worker.clone());
        worker
    }

    /// Requests still waiting for a response (including queued ones).
    /// Requests past their deadline are failed first.
    pub fn pending_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.expire_overdue(Instant::now());
        state.pending.len()
    }

    /// Responses discarded because no request carried their id
    pub fn protocol_violations(&self) -> u64 {
        self.inner.protocol_violations.load(Ordering::Relaxed)
    }

    pub fn busy_notifications(&self) -> u64 {
        self.inner.busy_notifications.load(Ordering::Relaxed)
    }
}

enum CallState {
    Failed(Option<RpcError>),
    Waiting {
        id: CorrelationId,
        path: String,
        reply: oneshot::Receiver<RpcResult<Value>>,
        deadline: Option<CallDeadline>,
        sleep: Option<Pin<Box<Sleep>>>,
        dispatcher: Weak<DispatcherInner>,
    },
    Done,
}

/// Future returned by [`Dispatcher::invoke`]
///
/// Resolves with the operation result, or with the remote error message as
/// [`RpcError::Remote`]. A configured call timeout counts from the moment the
/// call was sent; with one configured the future must be polled inside a
/// tokio runtime.
#[must_use = "the call is already sent; drop the future to ignore its result"]
pub struct PendingCall {
    correlation_id: Option<CorrelationId>,
    state: CallState,
}

impl PendingCall {
    fn failed(error: RpcError) -> Self {
        Self {
            correlation_id: None,
            state: CallState::Failed(Some(error)),
        }
    }

    fn waiting(
        id: CorrelationId,
        path: String,
        reply: oneshot::Receiver<RpcResult<Value>>,
        deadline: Option<CallDeadline>,
        dispatcher: &Arc<DispatcherInner>,
    ) -> Self {
        Self {
            correlation_id: Some(id),
            state: CallState::Waiting {
                id,
                path,
                reply,
                deadline,
                sleep: None,
                dispatcher: Arc::downgrade(dispatcher),
            },
        }
    }

    /// Id the call was sent with, if it was sent at all
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }
}

impl Future for PendingCall {
    type Output = RpcResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let poll = match &mut this.state {
            CallState::Done => panic!("PendingCall polled after completion"),
            CallState::Failed(error) => match error.take() {
                Some(error) => Poll::Ready(Err(error)),
                None => panic!("PendingCall polled after completion"),
            },
            CallState::Waiting {
                id,
                path,
                reply,
                deadline,
                sleep,
                dispatcher,
            } => match Pin::new(&mut *reply).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::WorkerGone(*id))),
                Poll::Pending => match deadline {
                    Some(deadline) => {
                        let sleep = sleep
                            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline.at)));
                        if sleep.as_mut().poll(cx).is_ready() {
                            if let Some(inner) = dispatcher.upgrade() {
                                inner.abandon(*id);
                            }
                            // The reply may have landed between the two polls
                            match reply.try_recv() {
                                Ok(outcome) => Poll::Ready(outcome),
                                Err(_) => {
                                    warn!("Request {} ({}) timed out", id, path);
                                    Poll::Ready(Err(deadline.timeout_error(path)))
                                }
                            }
                        } else {
                            Poll::Pending
                        }
                    }
                    None => Poll::Pending,
                },
            },
        };
        if poll.is_ready() {
            this.state = CallState::Done;
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ResponseEnvelope;
    use crate::testing::{RecordingWorker, StubKernel, StubTally};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn direct_dispatcher() -> (Dispatcher, Arc<DirectWorker>, Arc<StubTally>) {
        let dispatcher = Dispatcher::default();
        let (kernel, tally) = StubKernel::new();
        let worker = dispatcher.attach_direct_worker(Box::new(kernel), &WorkerConfig::default());
        (dispatcher, worker, tally)
    }

    #[tokio::test]
    async fn test_create_cube_twice_computes_once() {
        let (dispatcher, worker, tally) = direct_dispatcher();

        let first = dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 3}))
            .await
            .unwrap();
        let second = dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 3}))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(tally.calls(), 1);
        let stats = worker.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_different_arguments_recompute() {
        let (dispatcher, _worker, tally) = direct_dispatcher();
        let a = dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 3}))
            .await
            .unwrap();
        let b = dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 4}))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(tally.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_path_rejects_with_path() {
        let (dispatcher, _worker, _tally) = direct_dispatcher();
        let err = dispatcher.invoke("unknown.path", json!({})).await.unwrap_err();
        let RpcError::Remote(message) = err else {
            panic!("expected a remote error, got {err:?}");
        };
        assert!(message.contains("unknown.path"), "{message}");
    }

    #[tokio::test]
    async fn test_clear_cache_forces_recompute() {
        let (dispatcher, _worker, tally) = direct_dispatcher();
        let inputs = json!({"radius": 1.5});
        dispatcher
            .invoke("shapes.solid.createSphere", inputs.clone())
            .await
            .unwrap();
        assert_eq!(dispatcher.clear_cache().await.unwrap(), Value::Null);
        dispatcher
            .invoke("shapes.solid.createSphere", inputs)
            .await
            .unwrap();
        assert_eq!(tally.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let (dispatcher, _worker, tally) = direct_dispatcher();
        tally.fail_next(1);

        let err = dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 2}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"));

        dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 2}))
            .await
            .unwrap();
        assert_eq!(tally.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_boundary_keeps_small_cache() {
        let (dispatcher, worker, tally) = direct_dispatcher();
        dispatcher.start_run().await.unwrap();
        dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 1}))
            .await
            .unwrap();
        dispatcher.start_run().await.unwrap();
        dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 1}))
            .await
            .unwrap();
        assert_eq!(tally.calls(), 1);
        assert_eq!(worker.cache_stats().unwrap().evictions, 0);
    }

    #[tokio::test]
    async fn test_concurrent_ids_resolve_out_of_order() {
        let dispatcher = Dispatcher::default();
        let worker = Arc::new(RecordingWorker::default());
        dispatcher.attach_worker(worker.clone());

        let calls: Vec<PendingCall> = (0..32)
            .map(|i| dispatcher.invoke("shapeToMesh", json!({ "n": i })))
            .collect();
        let sent = worker.take();
        assert_eq!(sent.len(), 32);

        let mut ids: Vec<CorrelationId> = sent.iter().map(|c| c.correlation_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert_eq!(dispatcher.pending_count(), 32);

        // Answer in reverse, echoing each call's own inputs
        for call in sent.iter().rev() {
            dispatcher.deliver(WorkerMessage::Response(ResponseEnvelope::success(
                call.correlation_id,
                call.inputs().clone(),
            )));
        }

        for (i, call) in calls.into_iter().enumerate() {
            assert_eq!(call.await.unwrap(), json!({ "n": i }));
        }
        assert_eq!(dispatcher.pending_count(), 0);

        // A duplicate reply finds nothing to settle
        dispatcher.deliver(WorkerMessage::Response(ResponseEnvelope::success(
            sent[0].correlation_id,
            Value::Null,
        )));
        assert_eq!(dispatcher.protocol_violations(), 1);
    }

    #[tokio::test]
    async fn test_unknown_response_is_tolerated() {
        let dispatcher = Dispatcher::default();
        let worker = Arc::new(RecordingWorker::default());
        dispatcher.attach_worker(worker.clone());

        let call = dispatcher.invoke("shapeToMesh", json!({}));
        let id = call.correlation_id().unwrap();
        dispatcher.deliver(WorkerMessage::Response(ResponseEnvelope::success(
            CorrelationId(id.0 + 1000),
            json!("stray"),
        )));

        assert_eq!(dispatcher.protocol_violations(), 1);
        assert_eq!(dispatcher.pending_count(), 1);

        dispatcher.deliver(WorkerMessage::Response(ResponseEnvelope::success(id, json!(1))));
        assert_eq!(call.await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_busy_does_not_settle() {
        let dispatcher = Dispatcher::default();
        let worker = Arc::new(RecordingWorker::default());
        dispatcher.attach_worker(worker.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        dispatcher.on_busy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let call = dispatcher.invoke("shapeToMesh", json!({}));
        dispatcher.deliver(WorkerMessage::Busy);
        dispatcher.deliver(WorkerMessage::Busy);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.busy_notifications(), 2);
        assert_eq!(dispatcher.pending_count(), 1);

        let id = call.correlation_id().unwrap();
        dispatcher.deliver(WorkerMessage::Response(ResponseEnvelope::failure(id, "nope")));
        assert!(matches!(call.await, Err(RpcError::Remote(m)) if m == "nope"));
    }

    #[tokio::test]
    async fn test_queues_until_attached() {
        let dispatcher = Dispatcher::default();
        let first = dispatcher.invoke("shapes.solid.createCube", json!({"size": 1}));
        let second = dispatcher.invoke("shapes.solid.createCube", json!({"size": 2}));
        assert_eq!(dispatcher.pending_count(), 2);

        let worker = Arc::new(RecordingWorker::default());
        dispatcher.attach_worker(worker.clone());
        let sent = worker.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(Some(sent[0].correlation_id), first.correlation_id());
        assert_eq!(Some(sent[1].correlation_id), second.correlation_id());
    }

    #[tokio::test]
    async fn test_not_ready_without_queueing() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            queue_until_attached: false,
            ..DispatcherConfig::default()
        });
        let call = dispatcher.invoke("shapes.solid.createCube", json!({"size": 1}));
        assert_eq!(call.correlation_id(), None);
        assert!(matches!(call.await, Err(RpcError::NotReady)));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_post_failure_settles_call() {
        let (dispatcher, worker, _tally) = direct_dispatcher();
        worker.shutdown();
        let err = dispatcher
            .invoke("shapes.solid.createCube", json!({"size": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Transport(TransportError::Disconnected(_))));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_abandons_request() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            call_timeout_ms: Some(20),
            ..DispatcherConfig::default()
        });
        let worker = Arc::new(RecordingWorker::default());
        dispatcher.attach_worker(worker.clone());

        let call = dispatcher.invoke("booleans.union", json!({"shapes": []}));
        let id = call.correlation_id().unwrap();
        let err = call.await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { ref path, after_ms: 20 } if path == "booleans.union"));
        assert_eq!(dispatcher.pending_count(), 0);

        // A late reply is an unknown id
        dispatcher.deliver(WorkerMessage::Response(ResponseEnvelope::success(id, Value::Null)));
        assert_eq!(dispatcher.protocol_violations(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_from_send() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            call_timeout_ms: Some(50),
            ..DispatcherConfig::default()
        });
        dispatcher.attach_worker(Arc::new(RecordingWorker::default()));

        let call = dispatcher.invoke("shapeToMesh", json!({}));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let awaited = std::time::Instant::now();
        let err = call.await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { after_ms: 50, .. }));
        assert!(awaited.elapsed() < Duration::from_millis(40), "{:?}", awaited.elapsed());
    }

    #[tokio::test]
    async fn test_overdue_requests_reclaimed_without_polling() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            call_timeout_ms: Some(20),
            ..DispatcherConfig::default()
        });
        dispatcher.attach_worker(Arc::new(RecordingWorker::default()));

        let stale = dispatcher.invoke("shapeToMesh", json!({"n": 1}));
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _fresh = dispatcher.invoke("shapeToMesh", json!({"n": 2}));

        assert_eq!(dispatcher.pending_count(), 1);
        assert!(matches!(stale.await, Err(RpcError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_replacing_busy_thread_worker() {
        let dispatcher = Dispatcher::default();
        let (kernel, tally) = StubKernel::new();
        let spawned = dispatcher
            .spawn_thread_worker(&WorkerConfig::default(), move || {
                Box::new(kernel) as Box<dyn GeometryKernel>
            })
            .unwrap();
        // The dispatcher now holds the only handle to the thread worker
        drop(spawned);

        let calls: Vec<PendingCall> = (1..=200)
            .map(|radius| dispatcher.invoke("shapes.solid.createSphere", json!({ "radius": radius })))
            .collect();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let replacing = dispatcher.clone();
        std::thread::spawn(move || {
            let (kernel, _) = StubKernel::new();
            replacing.attach_direct_worker(Box::new(kernel), &WorkerConfig::default());
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("replacing the thread worker did not return");

        for call in calls {
            assert!(call.await.is_ok());
        }
        assert_eq!(tally.calls(), 200);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_thread_worker_end_to_end() {
        let dispatcher = Dispatcher::default();
        let (kernel, tally) = StubKernel::new();
        let worker = dispatcher
            .spawn_thread_worker(&WorkerConfig::default(), move || {
                Box::new(kernel) as Box<dyn GeometryKernel>
            })
            .unwrap();

        dispatcher.start_run().await.unwrap();
        let a = dispatcher.invoke("shapes.solid.createBox", json!({"width": 1, "length": 2, "height": 3}));
        let b = dispatcher.invoke("shapes.solid.createSphere", json!({"radius": 1}));
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let union = dispatcher
            .invoke("booleans.union", json!({ "shapes": [a, b] }))
            .await
            .unwrap();
        let mesh = dispatcher
            .invoke("shapeToMesh", json!({ "shape": union, "precision": 0.1 }))
            .await
            .unwrap();
        assert!(mesh["indices"].as_array().is_some_and(|i| !i.is_empty()));
        assert!(dispatcher.busy_notifications() >= 5);
        assert_eq!(tally.calls(), 4);

        let stats = worker.shutdown().unwrap();
        assert_eq!(stats.entries, 4);
    }

    #[tokio::test]
    async fn test_dropped_worker_fails_pending() {
        let dispatcher = Dispatcher::default();
        let worker = Arc::new(RecordingWorker::default());
        dispatcher.attach_worker(worker.clone());
        let call = dispatcher.invoke("shapeToMesh", json!({}));
        let id = call.correlation_id().unwrap();

        // Tearing down the dispatcher drops every pending reply sender
        drop(dispatcher);
        assert!(matches!(call.await, Err(RpcError::WorkerGone(gone)) if gone == id));
    }
}
