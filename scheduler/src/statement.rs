//! Flattened, type-tagged statements.
//!
//! A [`Statement`] is an array of [`StatementNode`]s with one designated root.
//! Each node is `lhs op rhs`; an operand is either a typed container or the
//! index of another node in the same array. Statements come from a front-end
//! and are read-only here.

use linacc_device::{HostValue, Matrix, Scalar, Vector};
use linacc_dtype::{Layout, ScalarType};
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{InvalidStatementSnafu, Result};

/// Container classification of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum TypeFamily {
    Invalid,
    /// Reference to a nested node.
    Composite,
    HostScalar,
    Scalar,
    Vector,
    MatrixRow,
    MatrixCol,
}

impl TypeFamily {
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Vector | Self::MatrixRow | Self::MatrixCol)
    }
}

impl std::fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Invalid => "invalid",
            Self::Composite => "composite",
            Self::HostScalar => "host scalar",
            Self::Scalar => "scalar",
            Self::Vector => "vector",
            Self::MatrixRow => "row-major matrix",
            Self::MatrixCol => "column-major matrix",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::AsRefStr)]
pub enum OperationType {
    Assign,
    InplaceAdd,
    InplaceSub,
    BinaryAdd,
    BinarySub,
    /// Elementwise product.
    BinaryMul,
    /// Matrix-vector or matrix-matrix product.
    BinaryProd,
}

impl OperationType {
    pub const fn is_assignment(&self) -> bool {
        matches!(self, Self::Assign | Self::InplaceAdd | Self::InplaceSub)
    }
}

/// One side of a statement node.
#[derive(Debug, Clone, Default)]
pub enum Operand {
    #[default]
    Invalid,
    /// Index of a nested node.
    Composite(usize),
    HostScalar(HostValue),
    Scalar(Scalar),
    Vector(Vector),
    Matrix(Matrix),
}

impl Operand {
    pub fn family(&self) -> TypeFamily {
        match self {
            Self::Invalid => TypeFamily::Invalid,
            Self::Composite(_) => TypeFamily::Composite,
            Self::HostScalar(_) => TypeFamily::HostScalar,
            Self::Scalar(_) => TypeFamily::Scalar,
            Self::Vector(_) => TypeFamily::Vector,
            Self::Matrix(m) => match m.layout() {
                Layout::RowMajor => TypeFamily::MatrixRow,
                Layout::ColumnMajor => TypeFamily::MatrixCol,
            },
        }
    }

    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Self::Invalid | Self::Composite(_) => None,
            Self::HostScalar(v) => Some(v.scalar()),
            Self::Scalar(s) => Some(s.scalar()),
            Self::Vector(v) => Some(v.scalar()),
            Self::Matrix(m) => Some(m.scalar()),
        }
    }

    /// Human-readable type, e.g. "column-major float matrix".
    pub fn describe(&self) -> String {
        match (self.scalar(), self.family()) {
            (Some(scalar), TypeFamily::MatrixRow) => format!("row-major {scalar} matrix"),
            (Some(scalar), TypeFamily::MatrixCol) => format!("column-major {scalar} matrix"),
            (Some(scalar), family) => format!("{scalar} {family}"),
            (None, family) => family.to_string(),
        }
    }
}

/// `lhs op rhs`.
#[derive(Debug, Clone)]
pub struct StatementNode {
    pub lhs: Operand,
    pub op: OperationType,
    pub rhs: Operand,
}

impl StatementNode {
    pub fn new(lhs: Operand, op: OperationType, rhs: Operand) -> Self {
        Self { lhs, op, rhs }
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    nodes: SmallVec<[StatementNode; 4]>,
    root: usize,
}

impl Statement {
    /// Checks that the root exists and composite operands point forward to existing nodes.
    pub fn new(nodes: impl IntoIterator<Item = StatementNode>, root: usize) -> Result<Self> {
        let nodes: SmallVec<[StatementNode; 4]> = nodes.into_iter().collect();
        ensure!(
            root < nodes.len(),
            InvalidStatementSnafu { reason: format!("root {root} out of {} nodes", nodes.len()) }
        );
        for (i, node) in nodes.iter().enumerate() {
            for operand in [&node.lhs, &node.rhs] {
                if let Operand::Composite(child) = operand {
                    ensure!(
                        *child > i && *child < nodes.len(),
                        InvalidStatementSnafu { reason: format!("node {i} references node {child}") }
                    );
                }
            }
        }
        Ok(Self { nodes, root })
    }

    /// Single-node statement `lhs op rhs`.
    pub fn assign(lhs: Operand, op: OperationType, rhs: Operand) -> Self {
        let mut nodes = SmallVec::new();
        nodes.push(StatementNode::new(lhs, op, rhs));
        Self { nodes, root: 0 }
    }

    /// `lhs op (a inner b)`, the two-node shape produced for `A = B + C`.
    pub fn assign_binary(lhs: Operand, op: OperationType, a: Operand, inner: OperationType, b: Operand) -> Self {
        let mut nodes = SmallVec::new();
        nodes.push(StatementNode::new(lhs, op, Operand::Composite(1)));
        nodes.push(StatementNode::new(a, inner, b));
        Self { nodes, root: 0 }
    }

    pub fn nodes(&self) -> &[StatementNode] {
        &self.nodes
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn root_node(&self) -> &StatementNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, index: usize) -> Option<&StatementNode> {
        self.nodes.get(index)
    }
}
