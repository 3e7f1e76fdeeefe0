//! Process-wide cache of compiled kernels.
//!
//! Maps (structural signature, device) pairs to compiled programs. Trees with
//! the same signature render byte-identical source, so one compilation serves
//! every later statement of the same shape. The device part of the key keeps
//! artifacts for different devices apart.
//!
//! Backed by papaya's lock-free HashMap; lookups and inserts are safe from any
//! thread.

use std::sync::{Arc, OnceLock};

use linacc_device::Program;
use papaya::HashMap;

/// Compiled kernel shared by every statement with the same signature.
pub struct CachedKernel {
    pub program: Box<dyn Program>,
    /// Device key (e.g. "CL:0").
    pub device: String,
    /// Source the program was compiled from.
    pub code: String,
    pub entry_point: String,
    pub global_size: [usize; 3],
    pub local_size: Option<[usize; 3]>,
}

impl std::fmt::Debug for CachedKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedKernel")
            .field("program", &self.program.name())
            .field("device", &self.device)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

/// Cache key: (signature, device).
type KernelKey = (String, String);

static KERNELS: OnceLock<HashMap<KernelKey, Arc<CachedKernel>>> = OnceLock::new();

fn kernels() -> &'static HashMap<KernelKey, Arc<CachedKernel>> {
    KERNELS.get_or_init(HashMap::new)
}

/// Get or compile a kernel by signature and device.
///
/// If several threads miss on the same key concurrently, each compiles, the
/// first insert wins and every caller gets the winner.
pub fn get_or_compile_kernel<F, E>(signature: &str, device: &str, compile_fn: F) -> Result<Arc<CachedKernel>, E>
where
    F: FnOnce() -> Result<CachedKernel, E>,
{
    let key = (signature.to_string(), device.to_string());
    let map = kernels();
    let guard = map.guard();

    if let Some(cached) = map.get(&key, &guard) {
        tracing::trace!(signature, device, "kernel cache hit");
        return Ok(Arc::clone(cached));
    }

    tracing::trace!(signature, device, "kernel cache miss");
    let cached = Arc::new(compile_fn()?);

    use papaya::{Compute, Operation};
    match map.compute(
        key,
        |entry| match entry {
            Some((_, existing)) => Operation::Abort(Arc::clone(existing)),
            None => Operation::Insert(Arc::clone(&cached)),
        },
        &guard,
    ) {
        Compute::Inserted(_, kernel) => Ok(Arc::clone(kernel)),
        Compute::Aborted(kernel) => Ok(kernel),
        _ => Ok(cached),
    }
}

pub fn get(signature: &str, device: &str) -> Option<Arc<CachedKernel>> {
    let map = kernels();
    let guard = map.guard();
    map.get(&(signature.to_string(), device.to_string()), &guard).cloned()
}

/// Number of cached kernels.
pub fn len() -> usize {
    kernels().len()
}

/// Clear all cached kernels.
pub fn clear_all() {
    let guard = kernels().guard();
    kernels().clear(&guard);
}
