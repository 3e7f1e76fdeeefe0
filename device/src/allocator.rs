use std::cell::RefCell;

use crate::error::Result;

/// Opaque handle to device memory.
///
/// Uses `RefCell` for interior mutability with runtime borrow checking.
/// Safe for single-threaded use (Buffer is !Send + !Sync).
#[derive(Debug)]
pub enum RawBuffer {
    Cpu { data: RefCell<Box<[u8]>> },
}

impl RawBuffer {
    /// Get the size of the buffer in bytes.
    pub fn size(&self) -> usize {
        match self {
            RawBuffer::Cpu { data } => data.borrow().len(),
        }
    }
}

/// Options for buffer allocation.
#[derive(Debug, Clone, Default)]
pub struct BufferOptions {
    /// Whether to zero-initialize the buffer.
    pub zero_init: bool,
}

pub trait Allocator: Send + Sync + std::fmt::Debug {
    fn alloc(&self, size: usize, options: &BufferOptions) -> Result<RawBuffer>;
    fn free(&self, _buffer: RawBuffer) {}
    fn name(&self) -> &str;
}

/// Host-memory allocator. Stands in for device memory when no accelerator is attached.
#[derive(Debug, Clone)]
pub struct CpuAllocator;

impl Allocator for CpuAllocator {
    fn alloc(&self, size: usize, _options: &BufferOptions) -> Result<RawBuffer> {
        let data = vec![0u8; size].into_boxed_slice();
        Ok(RawBuffer::Cpu { data: RefCell::new(data) })
    }

    fn name(&self) -> &str {
        "CPU"
    }
}
