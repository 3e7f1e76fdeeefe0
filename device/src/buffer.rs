use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use linacc_dtype::ScalarType;

use crate::allocator::{Allocator, BufferOptions, RawBuffer};
use crate::error::{Result, SizeMismatchSnafu};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of one device allocation.
///
/// Every clone of a [`Buffer`] reports the same id, so the id is what kernel
/// argument deduplication keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

#[derive(Debug)]
struct BufferData {
    id: BufferId,
    raw: Option<RawBuffer>,
    allocator: Arc<dyn Allocator>,
    options: BufferOptions,
}

impl Drop for BufferData {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.allocator.free(raw);
        }
    }
}

/// Shared handle to a typed device allocation.
///
/// This type is `!Send + !Sync`: an expression tree and the buffers it
/// references live on one thread.
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Rc<BufferData>,
    scalar: ScalarType,
    len: usize,
    _not_send_sync: PhantomData<Rc<()>>,
}

impl Buffer {
    /// Allocate `len` zeroed elements of `scalar`.
    pub fn allocate(allocator: Arc<dyn Allocator>, scalar: ScalarType, len: usize) -> Result<Self> {
        let options = BufferOptions { zero_init: true };
        let raw = allocator.alloc(len * scalar.bytes(), &options)?;
        let id = BufferId::next();
        tracing::trace!(buffer.id = %id, scalar = %scalar, len, allocator = allocator.name(), "buffer allocated");
        Ok(Self {
            data: Rc::new(BufferData { id, raw: Some(raw), allocator, options }),
            scalar,
            len,
            _not_send_sync: PhantomData,
        })
    }

    pub fn id(&self) -> BufferId {
        self.data.id
    }

    pub fn scalar(&self) -> ScalarType {
        self.scalar
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.len * self.scalar.bytes()
    }

    pub fn is_zero_initialized(&self) -> bool {
        self.data.options.zero_init
    }

    fn raw(&self) -> &RawBuffer {
        // Only `Drop` takes the raw buffer out.
        self.data.raw.as_ref().unwrap_or_else(|| unreachable!("buffer {} used after free", self.data.id))
    }

    /// Copy host bytes into this buffer.
    pub fn copyin(&self, src: &[u8]) -> Result<()> {
        let expected = self.size();
        let actual = src.len();
        snafu::ensure!(expected == actual, SizeMismatchSnafu { expected, actual });

        match self.raw() {
            RawBuffer::Cpu { data } => data.borrow_mut().copy_from_slice(src),
        }
        Ok(())
    }

    /// Copy this buffer's contents into host memory.
    pub fn copyout(&self, dst: &mut [u8]) -> Result<()> {
        let expected = self.size();
        let actual = dst.len();
        snafu::ensure!(expected == actual, SizeMismatchSnafu { expected, actual });

        match self.raw() {
            RawBuffer::Cpu { data } => dst.copy_from_slice(&data.borrow()),
        }
        Ok(())
    }

    /// True when both handles refer to the same allocation.
    pub fn same_allocation(&self, other: &Buffer) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}
