//! Direct execution of flattened linear-algebra statements.
//!
//! A front-end hands over a [`Statement`]: an array of `lhs op rhs` nodes with
//! type-tagged operands. [`execute`] matches the statement against the shapes
//! a numeric library can run in one call and forwards it to a
//! [`LinalgBackend`]. Unsupported shapes are rejected with
//! [`Error::UnsupportedStatementShape`] before anything runs.
//!
//! ```ignore
//! let statement = Statement::assign_binary(
//!     Operand::Matrix(a), OperationType::Assign,
//!     Operand::Matrix(b), OperationType::BinarySub, Operand::Matrix(c),
//! );
//! linacc_scheduler::execute(&statement, &mut backend)?; // ambm(a, b, 1, c, -1)
//! ```

pub mod backend;
pub mod error;
pub mod executor;
pub mod statement;


pub use backend::{Coefficient, LinalgBackend, Routine, Sign};
pub use error::*;
pub use executor::{execute, plan};
pub use statement::{OperationType, Operand, Statement, StatementNode, TypeFamily};
