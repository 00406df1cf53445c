//! State owned by one worker for its whole lifetime

use rk_kernel::GeometryKernel;
use serde_json::Value;
use tracing::info;

use crate::cache::{CacheHelper, CacheStats};
use crate::config::WorkerConfig;
use crate::ops::{KernelCall, OperationError, OperationRegistry};

/// Kernel, result cache and operation registry of a single worker
///
/// Cached results are kernel handles, so whenever the cache is cleared the
/// kernel's solids are released with it.
pub struct WorkerContext {
    kernel: Box<dyn GeometryKernel>,
    cache: CacheHelper,
    registry: OperationRegistry,
}

impl WorkerContext {
    /// Set up the context when a worker starts
    pub fn init(kernel: Box<dyn GeometryKernel>, config: &WorkerConfig) -> Self {
        info!(
            "Worker context ready (kernel '{}', eviction threshold {})",
            kernel.name(),
            config.eviction_threshold
        );
        Self {
            kernel,
            cache: CacheHelper::new(config.eviction_threshold),
            registry: OperationRegistry::new(),
        }
    }

    pub fn kernel(&self) -> &dyn GeometryKernel {
        self.kernel.as_ref()
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    pub fn cache(&self) -> &CacheHelper {
        &self.cache
    }

    /// Resolve `path` and run it through the cache
    pub fn run_operation(&mut self, path: &str, inputs: &Value) -> Result<Value, OperationError> {
        let id = self.registry.resolve(path)?;
        let Self { kernel, cache, .. } = self;
        cache.cache_op(path, inputs, || {
            KernelCall::decode(id, inputs)?.execute(kernel.as_mut())
        })
    }

    /// Run-boundary eviction check. Returns `true` if the cache was cleared.
    pub fn start_run(&mut self) -> bool {
        let evicted = self.cache.on_run_boundary();
        if evicted {
            self.release_solids();
        }
        evicted
    }

    /// Clear the cache unconditionally, returning how many entries were dropped
    pub fn clear_cache(&mut self) -> usize {
        let dropped = self.cache.clear();
        self.release_solids();
        dropped
    }

    fn release_solids(&mut self) {
        let released = self.kernel.release_all();
        if released > 0 {
            info!("Released {} kernel solids", released);
        }
    }

    /// Shut the context down, releasing kernel resources
    pub fn teardown(mut self) -> CacheStats {
        let stats = self.cache.stats();
        let released = self.kernel.release_all();
        info!(
            "Worker context torn down ({} cache entries, {} hits, {} misses, {} solids released)",
            stats.entries, stats.hits, stats.misses, released
        );
        stats
    }
}
