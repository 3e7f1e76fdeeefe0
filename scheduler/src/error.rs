//! Error types for statement execution.

use snafu::Snafu;

use crate::statement::TypeFamily;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No numeric routine matches the statement. Nothing was executed.
    #[snafu(display("Unsupported statement shape for {family} destination: {reason}"))]
    UnsupportedStatementShape { family: TypeFamily, reason: String },

    /// Node indices of the statement do not form a tree.
    #[snafu(display("Invalid statement: {reason}"))]
    InvalidStatement { reason: String },

    /// The numeric routine itself failed.
    #[snafu(display("Backend error: {source}"))]
    Backend {
        #[snafu(source)]
        source: linacc_device::Error,
    },
}
