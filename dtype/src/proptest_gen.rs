use crate::*;
use proptest::prelude::*;

#[rustfmt::skip]
impl ScalarType {
    pub fn float_generator() -> impl Strategy<Value = Self> {
        prop_oneof![Just(Self::Float32), Just(Self::Float64)]
    }

    pub fn int_generator() -> impl Strategy<Value = Self> {
        prop_oneof![Just(Self::Int32), Just(Self::UInt32)]
    }

    pub fn generator() -> impl Strategy<Value = Self> {
        prop_oneof![Self::float_generator(), Self::int_generator()]
    }
}

impl Layout {
    pub fn generator() -> impl Strategy<Value = Self> {
        prop_oneof![Just(Self::RowMajor), Just(Self::ColumnMajor)]
    }
}
