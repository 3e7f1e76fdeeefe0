//! Kernel assembly.
//!
//! [`KernelGenerator`] binds a list of top-level assignments in one pass and
//! wraps their generated fragments into an OpenCL C kernel with a grid-stride
//! loop: 1-D over vector elements, 2-D over matrix entries, or a single work
//! item for scalar destinations.
//!
//! ```c
//! __kernel void kernel(__global float* arg0, unsigned int arg0_size, ...)
//! {
//!   for (unsigned int i = get_global_id(0); i < arg0_size; i += get_global_size(0))
//!   {
//!     arg0[i] = (arg1[i] + arg2[i]);
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use linacc_device::{Allocator, ArgSink, Compiler, LaunchArgs};
use snafu::{ResultExt, ensure};

use crate::config::GeneratorConfig;
use crate::context::{BindContext, EnqueueContext, GenContext, Handle};
use crate::error::{DeviceSnafu, InvalidOperandSnafu, Result, ScalarMismatchSnafu};
use crate::expr::{Expr, REDUCTION_INDEX, Shape};
use crate::kernel_cache::{self, CachedKernel};
use crate::op::{AssignOp, ReduceOp, ReductionKind};
use crate::types::RenderedKernel;

/// Work-item slot the generator evaluates statements at.
const SLOT: u32 = 0;

const MATRIX_LOCAL: [usize; 3] = [16, 16, 1];

/// One top-level statement `lhs op rhs` of a kernel.
#[derive(Debug)]
pub struct Assignment {
    lhs: Expr,
    op: AssignOp,
    rhs: Expr,
}

impl Assignment {
    /// `lhs` must be a device container; `rhs` must fit its shape and scalar type.
    pub fn new(lhs: Expr, op: AssignOp, rhs: Expr) -> Result<Self> {
        ensure!(
            matches!(lhs, Expr::DeviceScalar(_) | Expr::Vector(_) | Expr::Matrix(_)),
            InvalidOperandSnafu { reason: format!("cannot assign to {}", lhs.repr()) }
        );
        ensure!(
            rhs.shape() == lhs.shape() || rhs.shape() == Shape::Scalar,
            InvalidOperandSnafu { reason: format!("cannot assign {:?} to {:?}", rhs.shape(), lhs.shape()) }
        );
        if let (Some(l), Some(r)) = (lhs.scalar(), rhs.scalar()) {
            ensure!(l == r, ScalarMismatchSnafu { lhs: l, rhs: r });
        }
        Ok(Self { lhs, op, rhs })
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn op(&self) -> AssignOp {
        self.op
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }

    pub fn repr(&self) -> String {
        format!("{}{}{}", self.lhs.repr(), self.op.tag(), self.rhs.wrapped_repr())
    }

    /// [`Assignment::repr`] with leaves numbered by handle, see [`Expr::keyed_repr`].
    pub fn keyed_repr(&self, seen: &mut Vec<Handle>) -> String {
        let lhs = self.lhs.keyed_repr(seen);
        format!("{lhs}{}{}", self.op.tag(), self.rhs.keyed_wrapped_repr(seen))
    }

    pub fn bind(&mut self, ctx: &mut BindContext) {
        self.lhs.bind(ctx);
        self.rhs.bind(ctx);
    }

    pub fn enqueue(&self, ctx: &mut EnqueueContext<'_>) -> Result<()> {
        self.lhs.enqueue(ctx)?;
        self.rhs.enqueue(ctx)
    }
}

/// Renders, caches and launches kernels for lists of assignments.
#[derive(Debug, Clone)]
pub struct KernelGenerator {
    config: GeneratorConfig,
}

impl KernelGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Generator for [`GeneratorConfig::from_env`], validated like [`KernelGenerator::new`].
    pub fn from_env() -> Result<Self> {
        Self::new(GeneratorConfig::from_env())
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Cache key of the kernel rendered for `statements`.
    ///
    /// Leaves carry their handle position, so statements that alias buffers
    /// differently (and therefore get different parameter lists) never share a key.
    pub fn signature(&self, statements: &[Assignment]) -> String {
        let mut seen = Vec::new();
        let body: Vec<String> = statements.iter().map(|s| s.keyed_repr(&mut seen)).collect();
        format!("{}_w{}_{}", self.config.kernel_name, self.config.vector_width, body.join(";"))
    }

    /// [`Expr::inner_product`] with the configured scratch capacity.
    pub fn inner_product(&self, allocator: Arc<dyn Allocator>, lhs: Expr, op: ReduceOp, rhs: Expr) -> Result<Expr> {
        Expr::inner_product(allocator, lhs, op, rhs, self.config.scratch_capacity)
    }

    /// Fresh binding pass over all statements, in order.
    pub fn bind(&self, statements: &mut [Assignment]) -> BindContext {
        let mut ctx = BindContext::new(self.config.vector_width);
        for statement in statements.iter_mut() {
            statement.bind(&mut ctx);
        }
        tracing::trace!(handles = ctx.len(), "statements bound");
        ctx
    }

    /// Emit the runtime arguments of bound statements into `sink`. Returns the argument count.
    pub fn enqueue(&self, statements: &[Assignment], sink: &mut dyn ArgSink) -> Result<u32> {
        let mut ctx = EnqueueContext::new(sink);
        for statement in statements {
            statement.enqueue(&mut ctx)?;
        }
        Ok(ctx.count())
    }

    /// Bind `statements` and render their kernel.
    pub fn render(&self, statements: &mut [Assignment]) -> Result<RenderedKernel> {
        let Some(first) = statements.first() else {
            return InvalidOperandSnafu { reason: "empty statement list" }.fail();
        };
        let shape = first.lhs.shape();
        ensure!(
            statements.iter().all(|s| s.lhs.shape() == shape),
            InvalidOperandSnafu { reason: "statements of one kernel must share a destination shape" }
        );

        self.bind(statements);

        let (ind0, ind1) = match shape {
            Shape::Scalar => ("0", "0"),
            Shape::Vector => ("i", "0"),
            Shape::Matrix => ("i", "j"),
        };
        for statement in statements.iter_mut() {
            statement.lhs.access_index(SLOT, ind0, ind1)?;
            statement.rhs.access_index(SLOT, ind0, ind1)?;
        }

        let mut params = Vec::new();
        let mut seen = HashSet::new();
        for statement in statements.iter() {
            statement.lhs.kernel_arguments(&mut seen, &mut params)?;
            statement.rhs.kernel_arguments(&mut seen, &mut params)?;
        }

        let mut ctx = GenContext::new();
        let mut body = Vec::new();
        for statement in statements.iter() {
            statement.rhs.fetch(&mut ctx, SLOT, &mut body)?;
            body.extend(self.render_statement(statement, &ctx)?);
            statement.rhs.write_back(&mut ctx, SLOT);
        }

        let dest = statements[0].lhs.info().map(|info| info.name.clone()).unwrap_or_default();
        let name = &self.config.kernel_name;
        let mut code_lines: Vec<String> = Vec::new();
        code_lines.push(format!("__kernel void {name}("));
        let last = params.len().saturating_sub(1);
        for (i, param) in params.iter().enumerate() {
            let sep = if i == last { ")" } else { "," };
            code_lines.push(format!("    {param}{sep}"));
        }
        code_lines.push("{".to_string());

        let (global, local) = match shape {
            Shape::Scalar => {
                code_lines.push("  if (get_global_id(0) == 0)".to_string());
                code_lines.push("  {".to_string());
                code_lines.extend(body.iter().map(|line| format!("    {line}")));
                code_lines.push("  }".to_string());
                ([1, 1, 1], None)
            }
            Shape::Vector => {
                code_lines.push(format!(
                    "  for (unsigned int i = get_global_id(0); i < {dest}_size; i += get_global_size(0))"
                ));
                code_lines.push("  {".to_string());
                code_lines.extend(body.iter().map(|line| format!("    {line}")));
                code_lines.push("  }".to_string());
                let local = self.config.local_size;
                ([local * self.config.work_groups, 1, 1], Some([local, 1, 1]))
            }
            Shape::Matrix => {
                code_lines.push(format!(
                    "  for (unsigned int i = get_global_id(0); i < {dest}_size1; i += get_global_size(0))"
                ));
                code_lines.push(format!(
                    "    for (unsigned int j = get_global_id(1); j < {dest}_size2; j += get_global_size(1))"
                ));
                code_lines.push("    {".to_string());
                code_lines.extend(body.iter().map(|line| format!("      {line}")));
                code_lines.push("    }".to_string());
                let side = MATRIX_LOCAL[0] * MATRIX_LOCAL[0];
                ([side, side, 1], Some(MATRIX_LOCAL))
            }
        };
        code_lines.push("}".to_string());

        let signature = self.signature(statements);
        let mut kernel = RenderedKernel::new(code_lines.join("\n"), name.clone(), signature);
        kernel.params = params;
        kernel.set_work_sizes(global, local);

        tracing::debug!(signature = %kernel.signature, code = %kernel.code, "kernel rendered");
        Ok(kernel)
    }

    fn render_statement(&self, statement: &Assignment, ctx: &GenContext) -> Result<Vec<String>> {
        let lhs = statement.lhs.generate(ctx, SLOT, None)?;
        let Some(reduction) = statement.rhs.as_reduction().filter(|r| r.kind() != ReductionKind::InnerProduct)
        else {
            let rhs = statement.rhs.generate(ctx, SLOT, None)?;
            return Ok(vec![statement.op.render(&lhs, &rhs)]);
        };

        ensure!(
            self.config.vector_width == 1,
            InvalidOperandSnafu { reason: "matrix products require vector width 1" }
        );
        let scalar = reduction.scalar();
        let term = statement.rhs.generate(ctx, SLOT, None)?;
        let extent = reduction.inner_extent()?;
        Ok(vec![
            "{".to_string(),
            format!("  {} acc = {};", scalar.c_style(), reduction.op().identity(scalar)),
            format!("  for (unsigned int {REDUCTION_INDEX} = 0; {REDUCTION_INDEX} < {extent}; ++{REDUCTION_INDEX})"),
            format!("    {}", reduction.op().accumulate("acc", &term, scalar)),
            format!("  {}", statement.op.render(&lhs, "acc")),
            "}".to_string(),
        ])
    }

    /// Bind, look up or compile, enqueue and launch.
    ///
    /// Source is rendered only on a cache miss for `(signature, compiler.device())`.
    pub fn execute(&self, statements: &mut [Assignment], compiler: &dyn Compiler) -> Result<LaunchArgs> {
        self.bind(statements);
        let signature = self.signature(statements);
        let device = compiler.device();

        let cached = kernel_cache::get_or_compile_kernel(&signature, device, || -> Result<CachedKernel> {
            let kernel = self.render(statements)?;
            let program = compiler.compile(&kernel.code, &kernel.entry_point).context(DeviceSnafu)?;
            Ok(CachedKernel {
                program,
                device: device.to_string(),
                code: kernel.code,
                entry_point: kernel.entry_point,
                global_size: kernel.global_size,
                local_size: kernel.local_size,
            })
        })?;

        let mut args = LaunchArgs::new();
        let count = self.enqueue(statements, &mut args)?;
        tracing::debug!(signature = %signature, device, args = count, "launching kernel");
        cached.program.launch(&args, cached.global_size, cached.local_size).context(DeviceSnafu)?;
        Ok(args)
    }
}
