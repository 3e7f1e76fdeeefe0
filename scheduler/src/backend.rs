//! Numeric routine interface and the routines a statement can plan into.
//!
//! The routines follow the BLAS-1 style `x = a*alpha (+ b*beta)` shape of the
//! external numeric library. Every scaled operand carries a [`Coefficient`]
//! spelled the way that library expects it.

use linacc_device::{Matrix, Vector};

use crate::statement::OperationType;

/// Sign an operand enters a linear combination with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    /// Sign of the second operand under `op`. `None` for non-additive operators.
    pub const fn of(op: OperationType) -> Option<Self> {
        match op {
            OperationType::BinaryAdd | OperationType::InplaceAdd => Some(Self::Plus),
            OperationType::BinarySub | OperationType::InplaceSub => Some(Self::Minus),
            _ => None,
        }
    }

    pub const fn value(&self) -> f64 {
        match self {
            Self::Plus => 1.0,
            Self::Minus => -1.0,
        }
    }
}

/// Scaling of one operand: `alpha`, optionally inverted and/or negated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficient {
    pub alpha: f64,
    /// Number of elements of `alpha` (1 for a host value).
    pub len_alpha: u32,
    /// Divide by `alpha` instead of multiplying.
    pub reciprocal: bool,
    pub flip_sign: bool,
}

impl Coefficient {
    pub const ONE: Self = Self::signed(Sign::Plus);

    /// Unit coefficient with `sign` carried in `alpha`.
    pub const fn signed(sign: Sign) -> Self {
        Self { alpha: sign.value(), len_alpha: 1, reciprocal: false, flip_sign: false }
    }
}

/// A planned call into the numeric library.
#[derive(Debug, Clone, Copy)]
pub enum Routine<'a> {
    /// `dest = src * alpha`
    Av { dest: &'a Vector, src: &'a Vector, alpha: Coefficient },
    /// `dest = a * alpha + b * beta`
    Avbv { dest: &'a Vector, a: &'a Vector, alpha: Coefficient, b: &'a Vector, beta: Coefficient },
    /// `dest = src * alpha`
    Am { dest: &'a Matrix, src: &'a Matrix, alpha: Coefficient },
    /// `dest = a * alpha + b * beta`
    Ambm { dest: &'a Matrix, a: &'a Matrix, alpha: Coefficient, b: &'a Matrix, beta: Coefficient },
}

impl Routine<'_> {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Av { .. } => "av",
            Self::Avbv { .. } => "avbv",
            Self::Am { .. } => "am",
            Self::Ambm { .. } => "ambm",
        }
    }

    /// Coefficients in argument order.
    pub fn coefficients(&self) -> Vec<Coefficient> {
        match self {
            Self::Av { alpha, .. } | Self::Am { alpha, .. } => vec![*alpha],
            Self::Avbv { alpha, beta, .. } | Self::Ambm { alpha, beta, .. } => vec![*alpha, *beta],
        }
    }

    /// Hand the call to `backend`.
    pub fn run(&self, backend: &mut dyn LinalgBackend) -> linacc_device::Result<()> {
        match *self {
            Self::Av { dest, src, alpha } => backend.av(dest, src, alpha),
            Self::Avbv { dest, a, alpha, b, beta } => backend.avbv(dest, a, alpha, b, beta),
            Self::Am { dest, src, alpha } => backend.am(dest, src, alpha),
            Self::Ambm { dest, a, alpha, b, beta } => backend.ambm(dest, a, alpha, b, beta),
        }
    }
}

/// The numeric library. Implementations mutate `dest` in place.
pub trait LinalgBackend {
    fn av(&mut self, dest: &Vector, src: &Vector, alpha: Coefficient) -> linacc_device::Result<()>;

    fn avbv(
        &mut self,
        dest: &Vector,
        a: &Vector,
        alpha: Coefficient,
        b: &Vector,
        beta: Coefficient,
    ) -> linacc_device::Result<()>;

    fn am(&mut self, dest: &Matrix, src: &Matrix, alpha: Coefficient) -> linacc_device::Result<()>;

    fn ambm(
        &mut self,
        dest: &Matrix,
        a: &Matrix,
        alpha: Coefficient,
        b: &Matrix,
        beta: Coefficient,
    ) -> linacc_device::Result<()>;
}
