//! Operator tags and their OpenCL C spellings.
//!
//! Every operator has a short signature tag (part of the structural signature
//! of the composite that uses it) and a renderer producing source text from
//! already-generated operand fragments.

use linacc_dtype::ScalarType;

/// Elementwise unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp,
    Log,
    Abs,
}

impl UnaryOp {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Abs => "abs",
        }
    }

    pub fn render(&self, operand: &str, scalar: ScalarType) -> String {
        match self {
            Self::Neg => format!("(-{operand})"),
            Self::Sqrt => format!("sqrt({operand})"),
            Self::Exp => format!("exp({operand})"),
            Self::Log => format!("log({operand})"),
            Self::Abs if scalar.is_float() => format!("fabs({operand})"),
            Self::Abs => format!("abs({operand})"),
        }
    }
}

/// Elementwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum BinaryOp {
    Add,
    Sub,
    /// Elementwise product.
    Mul,
    Div,
}

impl BinaryOp {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }

    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    pub fn render(&self, lhs: &str, rhs: &str) -> String {
        format!("({lhs} {} {rhs})", self.symbol())
    }
}

/// Top-level assignment forms of a kernel statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum AssignOp {
    Assign,
    InplaceAdd,
    InplaceSub,
}

impl AssignOp {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Assign => "eq",
            Self::InplaceAdd => "peq",
            Self::InplaceSub => "meq",
        }
    }

    pub fn render(&self, lhs: &str, rhs: &str) -> String {
        match self {
            Self::Assign => format!("{lhs} = {rhs};"),
            Self::InplaceAdd => format!("{lhs} += {rhs};"),
            Self::InplaceSub => format!("{lhs} -= {rhs};"),
        }
    }
}

/// Combining operator of a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum ReduceOp {
    Add,
    Max,
    Min,
}

impl ReduceOp {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    /// Identity element as a source literal.
    pub fn identity(&self, scalar: ScalarType) -> String {
        match (self, scalar) {
            (Self::Add, ScalarType::Float32) => "0.0f".to_string(),
            (Self::Add, ScalarType::Float64) => "0.0".to_string(),
            (Self::Add, _) => "0".to_string(),
            (Self::Max, s) if s.is_float() => "-INFINITY".to_string(),
            (Self::Max, ScalarType::Int32) => i32::MIN.to_string(),
            (Self::Max, _) => "0".to_string(),
            (Self::Min, s) if s.is_float() => "INFINITY".to_string(),
            (Self::Min, ScalarType::Int32) => i32::MAX.to_string(),
            (Self::Min, _) => format!("{}u", u32::MAX),
        }
    }

    /// Accumulation statement folding `value` into `acc`.
    pub fn accumulate(&self, acc: &str, value: &str, scalar: ScalarType) -> String {
        match self {
            Self::Add => format!("{acc} += {value};"),
            Self::Max if scalar.is_float() => format!("{acc} = fmax({acc}, {value});"),
            Self::Max => format!("{acc} = max({acc}, {value});"),
            Self::Min if scalar.is_float() => format!("{acc} = fmin({acc}, {value});"),
            Self::Min => format!("{acc} = min({acc}, {value});"),
        }
    }
}

/// Shape of a reduction composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum ReductionKind {
    /// vector x vector -> scalar, partial results go through a scratch buffer.
    InnerProduct,
    /// matrix x vector -> vector.
    MatVec,
    /// matrix x matrix -> matrix.
    MatMat,
}

impl ReductionKind {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::InnerProduct => "ip",
            Self::MatVec => "mv",
            Self::MatMat => "mm",
        }
    }
}
