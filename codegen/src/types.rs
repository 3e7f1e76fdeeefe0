//! Types for code generation.

/// A rendered kernel ready for compilation and launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedKernel {
    /// OpenCL C source.
    pub code: String,

    /// Entry point function name.
    pub entry_point: String,

    /// Structural signature of the statements, the cache key of this source.
    pub signature: String,

    /// Parameter declarations in argument order.
    pub params: Vec<String>,

    pub global_size: [usize; 3],

    pub local_size: Option<[usize; 3]>,
}

impl RenderedKernel {
    pub fn new(code: String, entry_point: String, signature: String) -> Self {
        Self { code, entry_point, signature, params: Vec::new(), global_size: [1, 1, 1], local_size: None }
    }

    /// Set work sizes for the launch.
    pub fn set_work_sizes(&mut self, global: [usize; 3], local: Option<[usize; 3]>) {
        self.global_size = global;
        self.local_size = local;
    }
}
