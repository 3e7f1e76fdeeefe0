//! Runtime kernel generation for linacc.
//!
//! Expressions over device containers are built as [`Expr`] trees, grouped
//! into [`Assignment`]s and turned into OpenCL C kernels by [`KernelGenerator`].
//!
//! # Architecture
//!
//! - **Expressions**: closed sum type over leaves and composites (`expr`)
//! - **Contexts**: pass-scoped bind/enqueue/generate state (`context`)
//! - **Kernels**: assembly around a grid-stride skeleton (`kernel`)
//! - **Cache**: compiled programs keyed by structural signature and device (`kernel_cache`)
//!
//! # Usage
//!
//! ```ignore
//! let rhs = Expr::binary(Expr::vector(y.clone()), BinaryOp::Add, Expr::vector(z.clone()))?;
//! let mut statements = [Assignment::new(Expr::vector(x.clone()), AssignOp::Assign, rhs)?];
//! KernelGenerator::from_env()?.execute(&mut statements, &compiler)?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod kernel;
pub mod kernel_cache;
pub mod op;
pub mod types;

#[cfg(test)]
pub mod test;

pub use config::GeneratorConfig;
pub use context::{BindContext, EnqueueContext, GenContext, Handle, SharedInfo};
pub use error::*;
pub use expr::{Expr, NodeId, Shape};
pub use kernel::{Assignment, KernelGenerator};
pub use op::{AssignOp, BinaryOp, ReduceOp, ReductionKind, UnaryOp};
pub use types::*;
