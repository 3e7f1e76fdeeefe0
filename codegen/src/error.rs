//! Error types for expression binding and kernel generation.

use linacc_dtype::ScalarType;
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Code generation or argument emission reached a node that was never bound.
    #[snafu(display("{what} used before bind"))]
    UnboundNode { what: String },

    /// `generate` asked for a work-item slot that `access_index` never set up.
    #[snafu(display("{what} has no access index for slot {slot}"))]
    MissingAccess { what: String, slot: u32 },

    /// Operand kinds that an operator cannot combine.
    #[snafu(display("Invalid operand: {reason}"))]
    InvalidOperand { reason: String },

    /// Operands of one composite disagree on their scalar type.
    #[snafu(display("Scalar type mismatch: {lhs} vs {rhs}"))]
    ScalarMismatch { lhs: ScalarType, rhs: ScalarType },

    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfig { reason: String },

    /// Error from the device layer (allocation, compilation, launch).
    #[snafu(display("Device error: {source}"))]
    Device {
        #[snafu(source)]
        source: linacc_device::Error,
    },
}
