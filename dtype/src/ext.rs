use super::*;

/// Maps a host Rust type to the scalar tag it is stored as on the device.
pub trait HasScalarType: Copy + 'static {
    const SCALAR: ScalarType;
}

macro_rules! impl_scalar_ext {
    ($($ty:ty => $scalar:expr),* $(,)?) => {
        $(impl HasScalarType for $ty { const SCALAR: ScalarType = $scalar; })*
    };
}

impl_scalar_ext! {
    f32 => ScalarType::Float32, f64 => ScalarType::Float64,
    i32 => ScalarType::Int32, u32 => ScalarType::UInt32,
}
