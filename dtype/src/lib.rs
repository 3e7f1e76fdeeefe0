pub mod ext;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_gen;


pub use ext::HasScalarType;

/// Scalar element types a generated kernel can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarType {
    Float32,
    Float64,
    Int32,
    UInt32,
}

impl ScalarType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 => 8,
            Self::Int32 => 4,
            Self::UInt32 => 4,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_signed(&self) -> bool {
        !matches!(self, Self::UInt32)
    }

    /// Abbreviation used inside structural signatures.
    pub const fn repr(&self) -> &'static str {
        match self {
            Self::Float32 => "f",
            Self::Float64 => "d",
            Self::Int32 => "i",
            Self::UInt32 => "ui",
        }
    }

    /// Spelling of the type in generated device source.
    pub const fn c_style(&self) -> &'static str {
        match self {
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Int32 => "int",
            Self::UInt32 => "unsigned int",
        }
    }

    /// Spelling of the packed type for a vector width (`float4`, `uint2`, ...).
    ///
    /// OpenCL spells packed unsigned ints as `uintN`, so the `unsigned int`
    /// scalar spelling cannot be reused directly.
    pub fn c_vector(&self, width: usize) -> String {
        if width <= 1 {
            return self.c_style().to_string();
        }
        match self {
            Self::UInt32 => format!("uint{width}"),
            other => format!("{}{width}", other.c_style()),
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.c_style())
    }
}

/// Storage order of a dense matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl Layout {
    /// Single-character flag appended to matrix signatures.
    pub const fn flag(&self) -> char {
        match self {
            Self::RowMajor => 'R',
            Self::ColumnMajor => 'C',
        }
    }

    pub const fn is_row_major(&self) -> bool {
        matches!(self, Self::RowMajor)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::RowMajor => "row-major",
            Self::ColumnMajor => "column-major",
        }
    }
}
