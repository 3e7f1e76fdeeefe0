//! Dense containers backed by a [`Buffer`].
//!
//! Containers are thin descriptions of how a buffer is interpreted. Their
//! internal (padded) sizes are what generated kernels iterate over, so every
//! container rounds its logical extent up to [`PADDING`] elements.

use std::sync::Arc;

use linacc_dtype::{Layout, ScalarType};

use crate::allocator::Allocator;
use crate::buffer::{Buffer, BufferId};
use crate::error::{InvalidViewSnafu, Result};

/// Internal sizes are multiples of this many elements.
pub const PADDING: usize = 128;

/// Round `size` up to the next multiple of [`PADDING`].
pub const fn padded(size: usize) -> usize {
    size.div_ceil(PADDING) * PADDING
}

/// A single value resident on the device.
#[derive(Debug, Clone)]
pub struct Scalar {
    buffer: Buffer,
}

impl Scalar {
    pub fn new(allocator: Arc<dyn Allocator>, scalar: ScalarType) -> Result<Self> {
        Ok(Self { buffer: Buffer::allocate(allocator, scalar, 1)? })
    }

    pub fn handle(&self) -> &Buffer {
        &self.buffer
    }

    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn scalar(&self) -> ScalarType {
        self.buffer.scalar()
    }
}

#[derive(Debug, Clone)]
pub struct Vector {
    buffer: Buffer,
    size: usize,
    internal_size: usize,
}

impl Vector {
    pub fn new(allocator: Arc<dyn Allocator>, scalar: ScalarType, size: usize) -> Result<Self> {
        let internal_size = padded(size);
        Ok(Self { buffer: Buffer::allocate(allocator, scalar, internal_size)?, size, internal_size })
    }

    /// Interpret an existing buffer as a vector of `size` elements.
    pub fn from_buffer(buffer: Buffer, size: usize) -> Result<Self> {
        let internal_size = padded(size);
        snafu::ensure!(
            internal_size <= buffer.len(),
            InvalidViewSnafu { required: internal_size, available: buffer.len() }
        );
        Ok(Self { buffer, size, internal_size })
    }

    pub fn handle(&self) -> &Buffer {
        &self.buffer
    }

    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn scalar(&self) -> ScalarType {
        self.buffer.scalar()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn internal_size(&self) -> usize {
        self.internal_size
    }
}

/// Dense matrix with a storage layout and an optional sub-range view.
#[derive(Debug, Clone)]
pub struct Matrix {
    buffer: Buffer,
    layout: Layout,
    size1: usize,
    size2: usize,
    internal_size1: usize,
    internal_size2: usize,
    start1: usize,
    stride1: usize,
    start2: usize,
    stride2: usize,
}

impl Matrix {
    pub fn new(
        allocator: Arc<dyn Allocator>,
        scalar: ScalarType,
        layout: Layout,
        size1: usize,
        size2: usize,
    ) -> Result<Self> {
        let (internal_size1, internal_size2) = (padded(size1), padded(size2));
        let buffer = Buffer::allocate(allocator, scalar, internal_size1 * internal_size2)?;
        Ok(Self {
            buffer,
            layout,
            size1,
            size2,
            internal_size1,
            internal_size2,
            start1: 0,
            stride1: 1,
            start2: 0,
            stride2: 1,
        })
    }

    /// Restrict this matrix to the rows `start1 + i*stride1` and columns `start2 + j*stride2`.
    pub fn slice(
        &self,
        (start1, stride1, size1): (usize, usize, usize),
        (start2, stride2, size2): (usize, usize, usize),
    ) -> Result<Self> {
        let last1 = start1 + size1.saturating_sub(1) * stride1;
        let last2 = start2 + size2.saturating_sub(1) * stride2;
        snafu::ensure!(
            last1 < self.internal_size1 && last2 < self.internal_size2,
            InvalidViewSnafu { required: (last1 + 1) * (last2 + 1), available: self.buffer.len() }
        );
        Ok(Self { size1, size2, start1, stride1, start2, stride2, ..self.clone() })
    }

    pub fn handle(&self) -> &Buffer {
        &self.buffer
    }

    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn scalar(&self) -> ScalarType {
        self.buffer.scalar()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn size1(&self) -> usize {
        self.size1
    }

    pub fn size2(&self) -> usize {
        self.size2
    }

    pub fn internal_size1(&self) -> usize {
        self.internal_size1
    }

    pub fn internal_size2(&self) -> usize {
        self.internal_size2
    }

    pub fn start1(&self) -> usize {
        self.start1
    }

    pub fn stride1(&self) -> usize {
        self.stride1
    }

    pub fn start2(&self) -> usize {
        self.start2
    }

    pub fn stride2(&self) -> usize {
        self.stride2
    }
}
