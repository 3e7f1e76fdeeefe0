//! Kernel generation configuration.
//!
//! Built explicitly through the bon builder, or read from the environment.

use bon::bon;
use snafu::ensure;

use crate::error::{InvalidConfigSnafu, Result};

/// Vector widths OpenCL has packed types for.
pub const VECTOR_WIDTHS: [usize; 5] = [1, 2, 4, 8, 16];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Elements per packed access (`float4` for 4). Vector and matrix
    /// arguments are declared with this width.
    pub vector_width: usize,
    /// Element capacity of the scratch buffer owned by each inner product.
    pub scratch_capacity: usize,
    /// Entry point of generated kernels.
    pub kernel_name: String,
    /// Work-group size of 1-D launches.
    pub local_size: usize,
    /// Number of work groups of 1-D launches.
    pub work_groups: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            vector_width: 1,
            scratch_capacity: 1024,
            kernel_name: "kernel".to_string(),
            local_size: 128,
            work_groups: 128,
        }
    }
}

#[bon]
impl GeneratorConfig {
    #[builder]
    pub fn builder(
        #[builder(default = 1)] vector_width: usize,
        #[builder(default = 1024)] scratch_capacity: usize,
        #[builder(into, default = "kernel".to_string())] kernel_name: String,
        #[builder(default = 128)] local_size: usize,
        #[builder(default = 128)] work_groups: usize,
    ) -> Self {
        Self { vector_width, scratch_capacity, kernel_name, local_size, work_groups }
    }
}

impl GeneratorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `LINACC_VECTOR_WIDTH` - Packed access width, one of 1/2/4/8/16 (default: 1)
    /// * `LINACC_SCRATCH_CAPACITY` - Inner-product scratch elements (default: 1024)
    /// * `LINACC_KERNEL_NAME` - Kernel entry point (default: `kernel`)
    pub fn from_env() -> Self {
        let vector_width = std::env::var("LINACC_VECTOR_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|w| VECTOR_WIDTHS.contains(w))
            .unwrap_or(1);
        let scratch_capacity =
            std::env::var("LINACC_SCRATCH_CAPACITY").ok().and_then(|s| s.parse().ok()).filter(|&c| c > 0).unwrap_or(1024);
        let kernel_name = std::env::var("LINACC_KERNEL_NAME").unwrap_or_else(|_| "kernel".to_string());

        Self { vector_width, scratch_capacity, kernel_name, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            VECTOR_WIDTHS.contains(&self.vector_width),
            InvalidConfigSnafu { reason: format!("unsupported vector width {}", self.vector_width) }
        );
        ensure!(self.scratch_capacity > 0, InvalidConfigSnafu { reason: "scratch capacity must be positive" });
        ensure!(self.local_size > 0 && self.work_groups > 0, InvalidConfigSnafu { reason: "empty launch grid" });
        ensure!(
            !self.kernel_name.is_empty() && self.kernel_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            InvalidConfigSnafu { reason: format!("invalid kernel name '{}'", self.kernel_name) }
        );
        Ok(())
    }
}
