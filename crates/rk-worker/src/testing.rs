//! Test doubles shared by unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use glam::Vec3;
use parking_lot::Mutex;
use rk_kernel::{
    BooleanType, GeometryKernel, KernelError, KernelResult, PrimitiveKernel, Solid,
    TessellatedMesh,
};

use crate::envelope::CallEnvelope;
use crate::error::TransportError;
use crate::transport::WorkerEndpoint;

/// Observation and fault-injection handle for a [`StubKernel`]
#[derive(Debug, Default)]
pub(crate) struct StubTally {
    calls: AtomicUsize,
    failures: AtomicUsize,
    panic_next: AtomicBool,
}

impl StubTally {
    /// Number of kernel operations invoked so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` operations fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Make the next operation panic
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }
}

/// Primitive kernel that counts calls and can be told to fail
pub(crate) struct StubKernel {
    inner: PrimitiveKernel,
    tally: Arc<StubTally>,
}

impl StubKernel {
    pub fn new() -> (Self, Arc<StubTally>) {
        let tally = Arc::new(StubTally::default());
        let kernel = Self {
            inner: PrimitiveKernel::new(),
            tally: tally.clone(),
        };
        (kernel, tally)
    }

    fn record(&self) -> KernelResult<()> {
        self.tally.calls.fetch_add(1, Ordering::SeqCst);
        if self.tally.panic_next.swap(false, Ordering::SeqCst) {
            panic!("stub kernel panicked on purpose");
        }
        let failing = self
            .tally
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(KernelError::InvalidInput("injected failure".into()));
        }
        Ok(())
    }
}

impl GeometryKernel for StubKernel {
    fn name(&self) -> &str {
        "stub"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_box(&mut self, center: Vec3, size: Vec3) -> KernelResult<Solid> {
        self.record()?;
        self.inner.create_box(center, size)
    }

    fn create_cylinder(
        &mut self,
        center: Vec3,
        radius: f32,
        height: f32,
        axis: Vec3,
    ) -> KernelResult<Solid> {
        self.record()?;
        self.inner.create_cylinder(center, radius, height, axis)
    }

    fn create_sphere(&mut self, center: Vec3, radius: f32) -> KernelResult<Solid> {
        self.record()?;
        self.inner.create_sphere(center, radius)
    }

    fn boolean(&mut self, shapes: &[Solid], op: BooleanType) -> KernelResult<Solid> {
        self.record()?;
        self.inner.boolean(shapes, op)
    }

    fn tessellate(&self, solid: &Solid, tolerance: f32) -> KernelResult<TessellatedMesh> {
        self.record()?;
        self.inner.tessellate(solid, tolerance)
    }

    fn solid_count(&self) -> usize {
        self.inner.solid_count()
    }

    fn release_all(&mut self) -> usize {
        self.inner.release_all()
    }
}

/// Endpoint that records calls and never answers
#[derive(Default)]
pub(crate) struct RecordingWorker {
    posted: Mutex<Vec<CallEnvelope>>,
}

impl RecordingWorker {
    /// Drain the calls posted so far
    pub fn take(&self) -> Vec<CallEnvelope> {
        std::mem::take(&mut *self.posted.lock())
    }
}

impl WorkerEndpoint for RecordingWorker {
    fn post(&self, call: CallEnvelope) -> Result<(), TransportError> {
        self.posted.lock().push(call);
        Ok(())
    }

    fn kind(&self) -> &str {
        "recording"
    }
}
