//! Dispatch of flattened statements to numeric routines.
//!
//! Supported shapes, for vector and matrix destinations of `float` or `double`:
//!
//! | statement        | routine                          |
//! |------------------|----------------------------------|
//! | `x = y`          | `av(x, y, 1)` / `am`             |
//! | `x = y + z`      | `avbv(x, y, 1, z, 1)` / `ambm`   |
//! | `x = y - z`      | `avbv(x, y, 1, z, -1)` / `ambm`  |
//! | `x += y`         | `avbv(x, x, 1, y, 1)` / `ambm`   |
//! | `x -= y`         | `avbv(x, x, 1, y, -1)` / `ambm`  |
//!
//! Every operand must share the destination's family (including matrix
//! layout) and scalar type. Anything else fails before the backend is touched.

use linacc_dtype::ScalarType;
use snafu::{OptionExt, ResultExt, ensure};

use crate::backend::{Coefficient, LinalgBackend, Routine, Sign};
use crate::error::{BackendSnafu, InvalidStatementSnafu, Result, UnsupportedStatementShapeSnafu};
use crate::statement::{OperationType, Operand, Statement, TypeFamily};

/// Pick the routine for `statement` without running it.
pub fn plan(statement: &Statement) -> Result<Routine<'_>> {
    let root = statement.root_node();
    let dest = &root.lhs;
    let family = dest.family();
    ensure!(
        family.is_container(),
        UnsupportedStatementShapeSnafu { family, reason: format!("Invalid lvalue {}", dest.describe()) }
    );
    ensure!(
        matches!(dest.scalar(), Some(ScalarType::Float32 | ScalarType::Float64)),
        UnsupportedStatementShapeSnafu { family, reason: format!("Unsupported scalar type of {}", dest.describe()) }
    );

    match (root.op, &root.rhs) {
        (OperationType::Assign, Operand::Composite(index)) => {
            let node = statement
                .node(*index)
                .context(InvalidStatementSnafu { reason: format!("missing node {index}") })?;
            let sign = Sign::of(node.op).filter(|_| !node.op.is_assignment()).context(
                UnsupportedStatementShapeSnafu { family, reason: format!("Unsupported binary operator {:?}", node.op) },
            )?;
            check_operand(dest, &node.lhs, "addition")?;
            check_operand(dest, &node.rhs, "addition")?;
            combine(dest, &node.lhs, &node.rhs, Coefficient::signed(sign))
        }
        (OperationType::Assign, src) => {
            check_operand(dest, src, "assignment")?;
            copy(dest, src)
        }
        (op @ (OperationType::InplaceAdd | OperationType::InplaceSub), src)
            if !matches!(src, Operand::Composite(_)) =>
        {
            check_operand(dest, src, "inplace update")?;
            let sign = Sign::of(op).unwrap_or(Sign::Plus);
            combine(dest, dest, src, Coefficient::signed(sign))
        }
        (op, src) => {
            UnsupportedStatementShapeSnafu { family, reason: format!("Cannot deal with {op:?} of {}", src.describe()) }
                .fail()
        }
    }
}

/// Plan `statement` and hand the routine to `backend`.
pub fn execute(statement: &Statement, backend: &mut dyn LinalgBackend) -> Result<()> {
    let routine = match plan(statement) {
        Ok(routine) => routine,
        Err(err) => {
            tracing::debug!(error = %err, "statement rejected");
            return Err(err);
        }
    };
    tracing::debug!(routine = routine.name(), coefficients = ?routine.coefficients(), "executing statement");
    routine.run(backend).context(BackendSnafu)
}

fn check_operand(dest: &Operand, operand: &Operand, what: &str) -> Result<()> {
    let family = dest.family();
    ensure!(
        operand.family() == family && operand.scalar() == dest.scalar(),
        UnsupportedStatementShapeSnafu {
            family,
            reason: format!("Cannot deal with {what} of {} into {}", operand.describe(), dest.describe()),
        }
    );
    Ok(())
}

fn copy<'a>(dest: &'a Operand, src: &'a Operand) -> Result<Routine<'a>> {
    match (dest, src) {
        (Operand::Vector(dest), Operand::Vector(src)) => Ok(Routine::Av { dest, src, alpha: Coefficient::ONE }),
        (Operand::Matrix(dest), Operand::Matrix(src)) => Ok(Routine::Am { dest, src, alpha: Coefficient::ONE }),
        _ => invalid_rvalue(dest.family(), src),
    }
}

/// `dest = a * 1 + b * beta`
fn combine<'a>(dest: &'a Operand, a: &'a Operand, b: &'a Operand, beta: Coefficient) -> Result<Routine<'a>> {
    let alpha = Coefficient::ONE;
    match (dest, a, b) {
        (Operand::Vector(dest), Operand::Vector(a), Operand::Vector(b)) => {
            Ok(Routine::Avbv { dest, a, alpha, b, beta })
        }
        (Operand::Matrix(dest), Operand::Matrix(a), Operand::Matrix(b)) => {
            Ok(Routine::Ambm { dest, a, alpha, b, beta })
        }
        _ => invalid_rvalue(dest.family(), b),
    }
}

fn invalid_rvalue<T>(family: TypeFamily, src: &Operand) -> Result<T> {
    UnsupportedStatementShapeSnafu { family, reason: format!("Invalid rvalue {}", src.describe()) }.fail()
}
