//! Kernel arguments as seen by the launch collaborator.

use std::collections::BTreeMap;

use linacc_dtype::ScalarType;

use crate::buffer::BufferId;

/// A scalar passed to a kernel by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    Float32(f32),
    Float64(f64),
    Int32(i32),
    UInt32(u32),
}

impl HostValue {
    pub const fn scalar(&self) -> ScalarType {
        match self {
            Self::Float32(_) => ScalarType::Float32,
            Self::Float64(_) => ScalarType::Float64,
            Self::Int32(_) => ScalarType::Int32,
            Self::UInt32(_) => ScalarType::UInt32,
        }
    }
}

macro_rules! impl_host_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for HostValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

impl_host_value_from! { f32 => Float32, f64 => Float64, i32 => Int32, u32 => UInt32 }

/// One runtime kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    /// Device memory, identified by allocation.
    Buffer(BufferId),
    /// Size, stride or offset.
    UInt(u32),
    /// Scalar passed by value.
    Value(HostValue),
}

impl KernelArg {
    pub fn buffer(&self) -> Option<BufferId> {
        match self {
            Self::Buffer(id) => Some(*id),
            _ => None,
        }
    }
}

/// Receiver of kernel arguments, indexed by parameter position.
pub trait ArgSink {
    fn set_arg(&mut self, index: u32, arg: KernelArg);
}

/// Ordered argument list collected for one launch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchArgs {
    args: BTreeMap<u32, KernelArg>,
}

impl LaunchArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&KernelArg> {
        self.args.get(&index)
    }

    /// Arguments in parameter order.
    pub fn iter(&self) -> impl Iterator<Item = &KernelArg> {
        self.args.values()
    }

    /// Buffer arguments in parameter order.
    pub fn buffers(&self) -> Vec<BufferId> {
        self.iter().filter_map(KernelArg::buffer).collect()
    }

    /// True when indices form the contiguous range `0..len`.
    pub fn is_dense(&self) -> bool {
        self.args.keys().copied().eq(0..self.args.len() as u32)
    }
}

impl ArgSink for LaunchArgs {
    fn set_arg(&mut self, index: u32, arg: KernelArg) {
        self.args.insert(index, arg);
    }
}
