//! Compilation and launch seam.
//!
//! linacc only produces kernel source and argument lists. Turning source into
//! something executable and queueing it on hardware belongs to the caller,
//! who plugs in through these two traits.

use crate::error::Result;
use crate::kernel::LaunchArgs;

/// A compiled, launchable kernel.
pub trait Program: Send + Sync {
    /// Enqueue one launch. Completion is asynchronous from the caller's point of view.
    fn launch(&self, args: &LaunchArgs, global_size: [usize; 3], local_size: Option<[usize; 3]>) -> Result<()>;

    /// Get the kernel name (for debugging/profiling).
    fn name(&self) -> &str;
}

/// Turns kernel source into a [`Program`] for one device.
pub trait Compiler {
    fn compile(&self, source: &str, entry_point: &str) -> Result<Box<dyn Program>>;

    /// Device key that separates compiled artifacts of identical source
    /// (e.g. "CL:0" vs "CL:1").
    fn device(&self) -> &str;
}
