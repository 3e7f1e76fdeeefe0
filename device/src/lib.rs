//! Device-side boundary types for linacc.
//!
//! The accelerator itself (memory management beyond plain allocation,
//! compilation, queues) is an external collaborator. This crate holds the
//! pieces the code generator and the statement executor need to talk about it:
//!
//! - [`Buffer`] / [`BufferId`] - shared allocation handles with stable identity
//! - [`Scalar`] / [`Vector`] / [`Matrix`] - containers over a buffer
//! - [`KernelArg`] / [`ArgSink`] / [`LaunchArgs`] - runtime kernel arguments
//! - [`Program`] / [`Compiler`] - the compile-and-launch seam

use std::sync::Arc;

pub mod allocator;
pub mod buffer;
pub mod container;
pub mod device;
pub mod error;
pub mod kernel;


pub use allocator::{Allocator, BufferOptions, CpuAllocator, RawBuffer};
pub use buffer::{Buffer, BufferId};
pub use container::{Matrix, PADDING, Scalar, Vector, padded};
pub use device::{Compiler, Program};
pub use error::{Error, Result};
pub use kernel::{ArgSink, HostValue, KernelArg, LaunchArgs};

/// Host-memory allocator shared by every caller.
pub fn cpu() -> Arc<dyn Allocator> {
    Arc::new(CpuAllocator)
}
