use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("size mismatch: expected {expected} bytes, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Allocator could not provide memory.
    #[snafu(display("allocation of {size} bytes failed: {reason}"))]
    Allocation { size: usize, reason: String },

    /// Container dimensions do not fit the backing buffer.
    #[snafu(display("invalid view: needs {required} elements but buffer holds {available}"))]
    InvalidView { required: usize, available: usize },

    /// Device compiler rejected a kernel source.
    #[snafu(display("compilation of '{entry_point}' failed: {reason}"))]
    Compilation { entry_point: String, reason: String },

    /// Kernel launch failed.
    #[snafu(display("launch of '{name}' failed: {reason}"))]
    Launch { name: String, reason: String },
}
