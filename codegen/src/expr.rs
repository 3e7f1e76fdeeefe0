//! Symbolic expression trees.
//!
//! An [`Expr`] describes a computation over device containers without
//! evaluating it. A tree goes through the same passes for every kernel:
//!
//! 1. [`Expr::bind`] assigns every distinct handle a [`SharedInfo`] in depth-first order
//! 2. [`Expr::access_index`] pushes the work-item index expressions down to the leaves
//! 3. [`Expr::fetch`] / [`Expr::generate`] / [`Expr::write_back`] produce source fragments
//! 4. [`Expr::enqueue`] emits runtime arguments in the same order `bind` saw the handles
//!
//! Composite nodes own their children. Leaves hold a shared handle to a device
//! container, or an owned copy of a host value.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use linacc_device::{Allocator, HostValue, KernelArg, Matrix, Scalar, Vector};
use linacc_dtype::{Layout, ScalarType};
use smallvec::{SmallVec, smallvec};
use snafu::{OptionExt, ResultExt, ensure};

use crate::context::{BindContext, EnqueueContext, GenContext, Handle, SharedInfo};
use crate::error::{
    DeviceSnafu, InvalidOperandSnafu, MissingAccessSnafu, Result, ScalarMismatchSnafu, UnboundNodeSnafu,
};
use crate::op::{BinaryOp, ReduceOp, ReductionKind, UnaryOp};

/// Loop variable of the inner dimension of matrix products.
pub const REDUCTION_INDEX: &str = "k";

/// Scalar parameters following a matrix buffer, in argument order.
const MATRIX_FIELDS: [&str; 8] =
    ["start1", "stride1", "start2", "stride2", "internal_size1", "internal_size2", "size1", "size2"];

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one expression node, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Result shape of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Shape {
    Scalar,
    Vector,
    Matrix,
}

#[derive(Debug)]
pub struct Leaf<T> {
    id: NodeId,
    value: T,
    info: Option<Rc<SharedInfo>>,
    indices: BTreeMap<u32, (String, String)>,
}

impl<T> Leaf<T> {
    fn new(value: T) -> Self {
        Self { id: NodeId::next(), value, info: None, indices: BTreeMap::new() }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Shared descriptor, once bound.
    pub fn info(&self) -> Option<&SharedInfo> {
        self.info.as_deref()
    }

    fn bound(&self, what: &str) -> Result<&SharedInfo> {
        self.info.as_deref().context(UnboundNodeSnafu { what })
    }

    fn index(&self, slot: u32, what: &str) -> Result<&(String, String)> {
        self.indices.get(&slot).context(MissingAccessSnafu { what, slot })
    }

    fn set_index(&mut self, slot: u32, ind0: String, ind1: String) {
        self.indices.insert(slot, (ind0, ind1));
    }
}

#[derive(Debug)]
pub struct Unary {
    pub op: UnaryOp,
    pub sub: Box<Expr>,
}

#[derive(Debug)]
pub struct Binary {
    pub lhs: Box<Expr>,
    pub op: BinaryOp,
    pub rhs: Box<Expr>,
}

/// Reduction composite. Inner products own a scratch vector that receives the
/// per-work-group partial results; the reduction itself runs elsewhere.
#[derive(Debug)]
pub struct Reduction {
    id: NodeId,
    kind: ReductionKind,
    op: ReduceOp,
    scalar: ScalarType,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
    scratch: Option<Vector>,
    info: Option<Rc<SharedInfo>>,
}

impl Reduction {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> ReductionKind {
        self.kind
    }

    pub fn op(&self) -> ReduceOp {
        self.op
    }

    pub fn scalar(&self) -> ScalarType {
        self.scalar
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }

    pub fn scratch(&self) -> Option<&Vector> {
        self.scratch.as_ref()
    }

    /// Source expression for the extent of the inner dimension of a matrix product:
    /// the column count of the left operand's view, never its padded extent.
    pub fn inner_extent(&self) -> Result<String> {
        match self.lhs.as_ref() {
            Expr::Matrix(m) => {
                let info = m.bound("matrix product operand")?;
                Ok(format!("{}_size2", info.name))
            }
            other => InvalidOperandSnafu { reason: format!("no inner extent for {}", other.repr()) }.fail(),
        }
    }
}

/// Tiles a vector or matrix `m` times along rows and `k` times along columns.
#[derive(Debug)]
pub struct Replicate {
    sub: Box<Expr>,
    m: u32,
    k: u32,
}

/// Vector read at `i + k`, clamped to the vector bounds.
#[derive(Debug)]
pub struct Shift {
    id: NodeId,
    sub: Box<Expr>,
    k: Box<Expr>,
}

#[derive(Debug)]
pub enum Expr {
    /// Host value, passed to the kernel by value.
    HostScalar(Leaf<HostValue>),
    DeviceScalar(Leaf<Scalar>),
    Vector(Leaf<Vector>),
    Matrix(Leaf<Matrix>),
    /// Integer literal baked into the source.
    Constant(i64),
    Unary(Unary),
    Binary(Binary),
    Reduction(Reduction),
    Replicate(Replicate),
    Shift(Shift),
}

/// A bound operand that contributes kernel arguments.
enum Operand<'a> {
    Host(&'a Leaf<HostValue>),
    DeviceScalar(&'a Leaf<Scalar>),
    Vector(&'a Leaf<Vector>),
    Matrix(&'a Leaf<Matrix>),
    Scratch(&'a Vector, Option<&'a SharedInfo>),
}

impl Operand<'_> {
    fn handle(&self) -> Handle {
        match self {
            Self::Host(l) => Handle::Host(l.id),
            Self::DeviceScalar(l) => Handle::Buffer(l.value.id()),
            Self::Vector(l) => Handle::Buffer(l.value.id()),
            Self::Matrix(l) => Handle::Buffer(l.value.id()),
            Self::Scratch(v, _) => Handle::Buffer(v.id()),
        }
    }

    fn info(&self) -> Result<&SharedInfo> {
        match self {
            Self::Host(l) => l.bound("host scalar"),
            Self::DeviceScalar(l) => l.bound("device scalar"),
            Self::Vector(l) => l.bound("vector"),
            Self::Matrix(l) => l.bound("matrix"),
            Self::Scratch(_, info) => (*info).context(UnboundNodeSnafu { what: "inner product scratch" }),
        }
    }

    fn declarations(&self) -> Result<SmallVec<[String; 9]>> {
        let info = self.info()?;
        let name = &info.name;
        Ok(match self {
            Self::Host(_) => smallvec![format!("{} {name}", info.scalar.c_style())],
            Self::DeviceScalar(_) | Self::Scratch(..) => smallvec![format!("__global {}* {name}", info.scalar.c_style())],
            Self::Vector(_) => {
                smallvec![format!("__global {}* {name}", info.c_type()), format!("unsigned int {name}_size")]
            }
            Self::Matrix(l) => {
                packed_extents(&l.value, info.alignment)?;
                let mut decls: SmallVec<[String; 9]> = smallvec![format!("__global {}* {name}", info.c_type())];
                for field in MATRIX_FIELDS {
                    decls.push(format!("unsigned int {name}_{field}"));
                }
                decls
            }
        })
    }

    fn args(&self) -> Result<SmallVec<[KernelArg; 9]>> {
        let info = self.info()?;
        Ok(match self {
            Self::Host(l) => smallvec![KernelArg::Value(l.value)],
            Self::DeviceScalar(l) => smallvec![KernelArg::Buffer(l.value.id())],
            Self::Scratch(v, _) => smallvec![KernelArg::Buffer(v.id())],
            Self::Vector(l) => smallvec![
                KernelArg::Buffer(l.value.id()),
                KernelArg::UInt((l.value.internal_size() / info.alignment) as u32),
            ],
            Self::Matrix(l) => {
                let m = &l.value;
                let [internal1, internal2, size1, size2] = packed_extents(m, info.alignment)?;
                smallvec![
                    KernelArg::Buffer(m.id()),
                    KernelArg::UInt(m.start1() as u32),
                    KernelArg::UInt(m.stride1() as u32),
                    KernelArg::UInt(m.start2() as u32),
                    KernelArg::UInt(m.stride2() as u32),
                    KernelArg::UInt(internal1 as u32),
                    KernelArg::UInt(internal2 as u32),
                    KernelArg::UInt(size1 as u32),
                    KernelArg::UInt(size2 as u32),
                ]
            }
        })
    }
}

impl Expr {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn host_scalar(value: impl Into<HostValue>) -> Self {
        Self::HostScalar(Leaf::new(value.into()))
    }

    pub fn device_scalar(scalar: Scalar) -> Self {
        Self::DeviceScalar(Leaf::new(scalar))
    }

    pub fn vector(vector: Vector) -> Self {
        Self::Vector(Leaf::new(vector))
    }

    pub fn matrix(matrix: Matrix) -> Self {
        Self::Matrix(Leaf::new(matrix))
    }

    pub fn constant(value: i64) -> Self {
        Self::Constant(value)
    }

    pub fn unary(op: UnaryOp, sub: Expr) -> Self {
        Self::Unary(Unary { op, sub: Box::new(sub) })
    }

    /// Elementwise combination. Scalars broadcast; vectors and matrices do not mix.
    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Result<Self> {
        check_scalars(&lhs, &rhs)?;
        let (l, r) = (lhs.shape(), rhs.shape());
        ensure!(
            l == r || l == Shape::Scalar || r == Shape::Scalar,
            InvalidOperandSnafu { reason: format!("cannot {} {l:?} and {r:?}", op.tag()) }
        );
        Ok(Self::Binary(Binary { lhs: Box::new(lhs), op, rhs: Box::new(rhs) }))
    }

    /// Inner product of two vector expressions. Allocates the scratch buffer
    /// of `capacity` elements that this node keeps for its whole lifetime.
    pub fn inner_product(
        allocator: Arc<dyn Allocator>,
        lhs: Expr,
        op: ReduceOp,
        rhs: Expr,
        capacity: usize,
    ) -> Result<Self> {
        let scalar = check_scalars(&lhs, &rhs)?;
        ensure!(
            lhs.shape() == Shape::Vector && rhs.shape() == Shape::Vector,
            InvalidOperandSnafu { reason: "inner product operands must be vectors" }
        );
        ensure!(capacity > 0, InvalidOperandSnafu { reason: "inner product scratch capacity must be positive" });
        let scratch = Vector::new(allocator, scalar, capacity).context(DeviceSnafu)?;
        tracing::trace!(scratch = %scratch.id(), capacity, "inner product scratch allocated");
        Ok(Self::reduction(ReductionKind::InnerProduct, op, scalar, lhs, rhs, Some(scratch)))
    }

    /// Matrix-vector product. `lhs` must be a matrix leaf.
    pub fn mat_vec(lhs: Expr, op: ReduceOp, rhs: Expr) -> Result<Self> {
        let scalar = check_scalars(&lhs, &rhs)?;
        ensure!(
            matches!(lhs, Self::Matrix(_)) && rhs.shape() == Shape::Vector,
            InvalidOperandSnafu { reason: "matrix-vector product needs a matrix leaf and a vector" }
        );
        Ok(Self::reduction(ReductionKind::MatVec, op, scalar, lhs, rhs, None))
    }

    /// Matrix-matrix product. `lhs` must be a matrix leaf.
    pub fn mat_mat(lhs: Expr, op: ReduceOp, rhs: Expr) -> Result<Self> {
        let scalar = check_scalars(&lhs, &rhs)?;
        ensure!(
            matches!(lhs, Self::Matrix(_)) && rhs.shape() == Shape::Matrix,
            InvalidOperandSnafu { reason: "matrix-matrix product needs a matrix leaf and a matrix" }
        );
        Ok(Self::reduction(ReductionKind::MatMat, op, scalar, lhs, rhs, None))
    }

    fn reduction(
        kind: ReductionKind,
        op: ReduceOp,
        scalar: ScalarType,
        lhs: Expr,
        rhs: Expr,
        scratch: Option<Vector>,
    ) -> Self {
        Self::Reduction(Reduction {
            id: NodeId::next(),
            kind,
            op,
            scalar,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            scratch,
            info: None,
        })
    }

    /// Tile a vector or matrix leaf `m` x `k` times.
    pub fn replicate(sub: Expr, m: u32, k: u32) -> Result<Self> {
        ensure!(
            matches!(sub, Self::Vector(_) | Self::Matrix(_)),
            InvalidOperandSnafu { reason: format!("cannot replicate {}", sub.repr()) }
        );
        ensure!(m > 0 && k > 0, InvalidOperandSnafu { reason: format!("replication factors {m}x{k}") });
        Ok(Self::Replicate(Replicate { sub: Box::new(sub), m, k }))
    }

    /// Read a vector leaf at `i + k`, clamped to `[0, size)`. The offset is a
    /// runtime argument, so every `k` shares one kernel.
    pub fn shift(sub: Expr, k: i32) -> Result<Self> {
        ensure!(
            matches!(sub, Self::Vector(_)),
            InvalidOperandSnafu { reason: format!("cannot shift {}", sub.repr()) }
        );
        Ok(Self::Shift(Shift { id: NodeId::next(), sub: Box::new(sub), k: Box::new(Self::host_scalar(k)) }))
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Scalar type of the result. Integer constants have none of their own.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Self::HostScalar(l) => Some(l.value.scalar()),
            Self::DeviceScalar(l) => Some(l.value.scalar()),
            Self::Vector(l) => Some(l.value.scalar()),
            Self::Matrix(l) => Some(l.value.scalar()),
            Self::Constant(_) => None,
            Self::Unary(u) => u.sub.scalar(),
            Self::Binary(b) => b.lhs.scalar().or(b.rhs.scalar()),
            Self::Reduction(r) => Some(r.scalar),
            Self::Replicate(r) => r.sub.scalar(),
            Self::Shift(s) => s.sub.scalar(),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::HostScalar(_) | Self::DeviceScalar(_) | Self::Constant(_) => Shape::Scalar,
            Self::Vector(_) | Self::Shift(_) => Shape::Vector,
            Self::Matrix(_) | Self::Replicate(_) => Shape::Matrix,
            Self::Unary(u) => u.sub.shape(),
            Self::Binary(b) => b.lhs.shape().max(b.rhs.shape()),
            Self::Reduction(r) => match r.kind {
                ReductionKind::InnerProduct => Shape::Scalar,
                ReductionKind::MatVec => Shape::Vector,
                ReductionKind::MatMat => Shape::Matrix,
            },
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Unary(_) | Self::Binary(_) | Self::Reduction(_) | Self::Replicate(_) | Self::Shift(_))
    }

    /// Node identity for nodes that carry one (leaves, reductions, shifts).
    pub fn id(&self) -> Option<NodeId> {
        match self {
            Self::HostScalar(l) => Some(l.id),
            Self::DeviceScalar(l) => Some(l.id),
            Self::Vector(l) => Some(l.id),
            Self::Matrix(l) => Some(l.id),
            Self::Reduction(r) => Some(r.id),
            Self::Shift(s) => Some(s.id),
            Self::Constant(_) | Self::Unary(_) | Self::Binary(_) | Self::Replicate(_) => None,
        }
    }

    pub fn as_reduction(&self) -> Option<&Reduction> {
        match self {
            Self::Reduction(r) => Some(r),
            _ => None,
        }
    }

    /// Shared descriptor of a bound leaf.
    pub fn info(&self) -> Option<&SharedInfo> {
        match self {
            Self::HostScalar(l) => l.info(),
            Self::DeviceScalar(l) => l.info(),
            Self::Vector(l) => l.info(),
            Self::Matrix(l) => l.info(),
            Self::Reduction(r) => r.info.as_deref(),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Structural signature
    // ------------------------------------------------------------------

    /// Canonical signature of the tree shape.
    ///
    /// Encodes kinds, scalar types, layouts and operators but never buffer
    /// identities or host values, so one generated kernel serves every tree
    /// with the same signature.
    pub fn repr(&self) -> String {
        match self {
            Self::HostScalar(l) => format!("vscal{}", l.value.scalar().repr()),
            Self::DeviceScalar(l) => format!("pscal{}", l.value.scalar().repr()),
            Self::Vector(l) => format!("vec{}", l.value.scalar().repr()),
            Self::Matrix(l) => format!("mat{}{}", l.value.scalar().repr(), l.value.layout().flag()),
            Self::Constant(n) => format!("cst{n}"),
            Self::Unary(u) => format!("{}({})", u.op.tag(), u.sub.repr()),
            Self::Binary(b) => format!("{}{}{}", b.lhs.wrapped_repr(), b.op.tag(), b.rhs.wrapped_repr()),
            Self::Reduction(r) => {
                format!("{}{}{}{}", r.lhs.wrapped_repr(), r.kind.tag(), r.op.tag(), r.rhs.wrapped_repr())
            }
            Self::Replicate(r) => format!("rep{}{}({})", u8::from(r.m > 1), u8::from(r.k > 1), r.sub.repr()),
            Self::Shift(s) => format!("shift({},{})", s.sub.repr(), s.k.repr()),
        }
    }

    /// Signature with parentheses around composites.
    pub fn wrapped_repr(&self) -> String {
        if self.is_composite() { format!("({})", self.repr()) } else { self.repr() }
    }

    /// [`Expr::repr`] with every argument-carrying leaf tagged `#n`, its position
    /// among the distinct handles of `seen`.
    ///
    /// Handles are numbered in the order `bind` registers them, so two trees share
    /// a keyed signature exactly when they also share a parameter list. `x = y + z`
    /// and `x = x + z` have the same `repr` but different keyed signatures.
    pub fn keyed_repr(&self, seen: &mut Vec<Handle>) -> String {
        match self {
            Self::HostScalar(l) => format!("{}#{}", self.repr(), position(seen, Handle::Host(l.id))),
            Self::DeviceScalar(l) => format!("{}#{}", self.repr(), position(seen, Handle::Buffer(l.value.id()))),
            Self::Vector(l) => format!("{}#{}", self.repr(), position(seen, Handle::Buffer(l.value.id()))),
            Self::Matrix(l) => format!("{}#{}", self.repr(), position(seen, Handle::Buffer(l.value.id()))),
            Self::Constant(_) => self.repr(),
            Self::Unary(u) => format!("{}({})", u.op.tag(), u.sub.keyed_repr(seen)),
            Self::Binary(b) => {
                let lhs = b.lhs.keyed_wrapped_repr(seen);
                let rhs = b.rhs.keyed_wrapped_repr(seen);
                format!("{lhs}{}{rhs}", b.op.tag())
            }
            Self::Reduction(r) => {
                let scratch = match &r.scratch {
                    Some(scratch) => format!("#{}", position(seen, Handle::Buffer(scratch.id()))),
                    None => String::new(),
                };
                let lhs = r.lhs.keyed_wrapped_repr(seen);
                let rhs = r.rhs.keyed_wrapped_repr(seen);
                format!("{lhs}{}{}{scratch}{rhs}", r.kind.tag(), r.op.tag())
            }
            Self::Replicate(r) => {
                format!("rep{}{}({})", u8::from(r.m > 1), u8::from(r.k > 1), r.sub.keyed_repr(seen))
            }
            Self::Shift(s) => {
                let sub = s.sub.keyed_repr(seen);
                format!("shift({sub},{})", s.k.keyed_repr(seen))
            }
        }
    }

    /// Keyed signature with parentheses around composites.
    pub fn keyed_wrapped_repr(&self, seen: &mut Vec<Handle>) -> String {
        if self.is_composite() { format!("({})", self.keyed_repr(seen)) } else { self.keyed_repr(seen) }
    }

    // ------------------------------------------------------------------
    // Binding and arguments
    // ------------------------------------------------------------------

    /// Depth-first binding pass.
    pub fn bind(&mut self, ctx: &mut BindContext) {
        let alignment = ctx.alignment();
        match self {
            Self::HostScalar(l) => l.info = Some(ctx.register(Handle::Host(l.id), l.value.scalar(), 1)),
            Self::DeviceScalar(l) => {
                l.info = Some(ctx.register(Handle::Buffer(l.value.id()), l.value.scalar(), 1));
            }
            Self::Vector(l) => {
                l.info = Some(ctx.register(Handle::Buffer(l.value.id()), l.value.scalar(), alignment));
            }
            Self::Matrix(l) => {
                l.info = Some(ctx.register(Handle::Buffer(l.value.id()), l.value.scalar(), alignment));
            }
            Self::Constant(_) => {}
            Self::Unary(u) => u.sub.bind(ctx),
            Self::Binary(b) => {
                b.lhs.bind(ctx);
                b.rhs.bind(ctx);
            }
            Self::Reduction(r) => {
                if let Some(scratch) = &r.scratch {
                    let handle = ctx.register_temporary(r.id, Handle::Buffer(scratch.id()));
                    r.info = Some(ctx.register(handle, r.scalar, 1));
                }
                r.lhs.bind(ctx);
                r.rhs.bind(ctx);
            }
            Self::Replicate(r) => r.sub.bind(ctx),
            Self::Shift(s) => {
                s.sub.bind(ctx);
                s.k.bind(ctx);
            }
        }
    }

    /// Argument-contributing operands in binding order, duplicates included.
    fn operands<'a>(&'a self, out: &mut Vec<Operand<'a>>) {
        match self {
            Self::HostScalar(l) => out.push(Operand::Host(l)),
            Self::DeviceScalar(l) => out.push(Operand::DeviceScalar(l)),
            Self::Vector(l) => out.push(Operand::Vector(l)),
            Self::Matrix(l) => out.push(Operand::Matrix(l)),
            Self::Constant(_) => {}
            Self::Unary(u) => u.sub.operands(out),
            Self::Binary(b) => {
                b.lhs.operands(out);
                b.rhs.operands(out);
            }
            Self::Reduction(r) => {
                if let Some(scratch) = &r.scratch {
                    out.push(Operand::Scratch(scratch, r.info.as_deref()));
                }
                r.lhs.operands(out);
                r.rhs.operands(out);
            }
            Self::Replicate(r) => r.sub.operands(out),
            Self::Shift(s) => {
                s.sub.operands(out);
                s.k.operands(out);
            }
        }
    }

    /// Emit runtime arguments for every handle not yet emitted in this pass.
    pub fn enqueue(&self, ctx: &mut EnqueueContext<'_>) -> Result<()> {
        let mut operands = Vec::new();
        self.operands(&mut operands);
        for operand in operands {
            // Unbound operands fail even when their handle was already emitted.
            let args = operand.args()?;
            if ctx.claim(operand.handle()) {
                args.into_iter().for_each(|arg| ctx.push(arg));
            }
        }
        Ok(())
    }

    /// Kernel parameter declarations, in the order `enqueue` emits arguments.
    pub fn kernel_arguments(&self, seen: &mut HashSet<Handle>, out: &mut Vec<String>) -> Result<()> {
        let mut operands = Vec::new();
        self.operands(&mut operands);
        for operand in operands {
            let decls = operand.declarations()?;
            if seen.insert(operand.handle()) {
                out.extend(decls);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Code generation
    // ------------------------------------------------------------------

    /// Set the index expressions the leaves read at for work-item `slot`.
    ///
    /// `ind0` indexes rows (or vector elements), `ind1` columns.
    pub fn access_index(&mut self, slot: u32, ind0: &str, ind1: &str) -> Result<()> {
        match self {
            Self::HostScalar(_) | Self::DeviceScalar(_) | Self::Constant(_) => Ok(()),
            Self::Vector(l) => {
                l.set_index(slot, ind0.to_string(), ind1.to_string());
                Ok(())
            }
            Self::Matrix(l) => {
                l.set_index(slot, ind0.to_string(), ind1.to_string());
                Ok(())
            }
            Self::Unary(u) => u.sub.access_index(slot, ind0, ind1),
            Self::Binary(b) => {
                b.lhs.access_index(slot, ind0, ind1)?;
                b.rhs.access_index(slot, ind0, ind1)
            }
            Self::Reduction(r) => match r.kind {
                // Operands are consumed by the reduction routine, not by this kernel.
                ReductionKind::InnerProduct => Ok(()),
                ReductionKind::MatVec => {
                    r.lhs.access_index(slot, ind0, REDUCTION_INDEX)?;
                    r.rhs.access_index(slot, REDUCTION_INDEX, "0")
                }
                ReductionKind::MatMat => {
                    r.lhs.access_index(slot, ind0, REDUCTION_INDEX)?;
                    r.rhs.access_index(slot, REDUCTION_INDEX, ind1)
                }
            },
            Self::Replicate(rep) => {
                let (m, k) = (rep.m, rep.k);
                match rep.sub.as_mut() {
                    Self::Vector(v) => {
                        let name = &v.bound("replicated vector")?.name;
                        let ind0 = if m > 1 { format!("({ind0}) % {name}_size") } else { ind0.to_string() };
                        v.set_index(slot, ind0, "0".to_string());
                        Ok(())
                    }
                    Self::Matrix(mat) => {
                        let name = &mat.bound("replicated matrix")?.name;
                        let ind0 = if m > 1 { format!("({ind0}) % {name}_size1") } else { ind0.to_string() };
                        let ind1 = if k > 1 { format!("({ind1}) % {name}_size2") } else { ind1.to_string() };
                        mat.set_index(slot, ind0, ind1);
                        Ok(())
                    }
                    other => InvalidOperandSnafu { reason: format!("cannot replicate {}", other.repr()) }.fail(),
                }
            }
            Self::Shift(s) => s.sub.access_index(slot, ind0, ind1),
        }
    }

    /// Materialize per-slot values into private variables ahead of the body.
    pub fn fetch(&self, ctx: &mut GenContext, slot: u32, out: &mut Vec<String>) -> Result<()> {
        match self {
            Self::HostScalar(_) | Self::DeviceScalar(_) | Self::Vector(_) | Self::Matrix(_) | Self::Constant(_) => {
                Ok(())
            }
            Self::Unary(u) => u.sub.fetch(ctx, slot, out),
            Self::Binary(b) => {
                b.lhs.fetch(ctx, slot, out)?;
                b.rhs.fetch(ctx, slot, out)
            }
            Self::Reduction(r) => {
                r.lhs.fetch(ctx, slot, out)?;
                r.rhs.fetch(ctx, slot, out)
            }
            Self::Replicate(r) => r.sub.fetch(ctx, slot, out),
            Self::Shift(s) => {
                if ctx.private(s.id, slot).is_some() {
                    return Ok(());
                }
                let Self::Vector(v) = s.sub.as_ref() else {
                    return InvalidOperandSnafu { reason: "shift of a non-vector" }.fail();
                };
                let k = s.k.info().context(UnboundNodeSnafu { what: "shift offset" })?;
                let info = v.bound("shifted vector")?;
                let name = format!("{}_shift_{}_{slot}", info.name, k.name);
                out.push(format!("{} {name} = {};", info.c_type(), s.access_buffer(slot)?));
                ctx.set_private(s.id, slot, name);
                Ok(())
            }
        }
    }

    /// Drop the private values `fetch` created for `slot`.
    pub fn write_back(&self, ctx: &mut GenContext, slot: u32) {
        match self {
            Self::HostScalar(_) | Self::DeviceScalar(_) | Self::Vector(_) | Self::Matrix(_) | Self::Constant(_) => {}
            Self::Unary(u) => u.sub.write_back(ctx, slot),
            Self::Binary(b) => {
                b.lhs.write_back(ctx, slot);
                b.rhs.write_back(ctx, slot);
            }
            Self::Reduction(r) => {
                r.lhs.write_back(ctx, slot);
                r.rhs.write_back(ctx, slot);
            }
            Self::Replicate(r) => r.sub.write_back(ctx, slot),
            Self::Shift(s) => ctx.clear_private(s.id, slot),
        }
    }

    /// Source fragment evaluating this node at work-item `slot`, optionally
    /// restricted to one lane of a packed access.
    pub fn generate(&self, ctx: &GenContext, slot: u32, lane: Option<usize>) -> Result<String> {
        match self {
            Self::HostScalar(l) => Ok(l.bound("host scalar")?.name.clone()),
            Self::DeviceScalar(l) => Ok(format!("{}[0]", l.bound("device scalar")?.name)),
            Self::Constant(n) => Ok(n.to_string()),
            Self::Vector(l) => {
                let info = l.bound("vector")?;
                let (ind0, _) = l.index(slot, "vector")?;
                Ok(with_lane(format!("{}[{ind0}]", info.name), info, lane))
            }
            Self::Matrix(l) => {
                let info = l.bound("matrix")?;
                let (ind0, ind1) = l.index(slot, "matrix")?;
                let offset = matrix_offset(&info.name, l.value.layout(), ind0, ind1);
                Ok(with_lane(format!("{}[{offset}]", info.name), info, lane))
            }
            Self::Unary(u) => {
                let sub = u.sub.generate(ctx, slot, lane)?;
                Ok(u.op.render(&sub, self.scalar().unwrap_or(ScalarType::Int32)))
            }
            Self::Binary(b) => {
                let lhs = b.lhs.generate(ctx, slot, lane)?;
                let rhs = b.rhs.generate(ctx, slot, lane)?;
                Ok(b.op.render(&lhs, &rhs))
            }
            Self::Reduction(r) => match r.kind {
                ReductionKind::InnerProduct => {
                    let info = r.info.as_deref().context(UnboundNodeSnafu { what: "inner product" })?;
                    Ok(format!("{}[0]", info.name))
                }
                ReductionKind::MatVec | ReductionKind::MatMat => {
                    let lhs = r.lhs.generate(ctx, slot, lane)?;
                    let rhs = r.rhs.generate(ctx, slot, lane)?;
                    Ok(format!("({lhs} * {rhs})"))
                }
            },
            Self::Replicate(r) => r.sub.generate(ctx, slot, lane),
            Self::Shift(s) => {
                let value = match ctx.private(s.id, slot) {
                    Some(name) => name.to_string(),
                    None => s.access_buffer(slot)?,
                };
                let Self::Vector(v) = s.sub.as_ref() else {
                    return InvalidOperandSnafu { reason: "shift of a non-vector" }.fail();
                };
                Ok(with_lane(value, v.bound("shifted vector")?, lane))
            }
        }
    }
}

impl Shift {
    /// Clamped read of the shifted vector at `slot`.
    fn access_buffer(&self, slot: u32) -> Result<String> {
        let Expr::Vector(v) = self.sub.as_ref() else {
            return InvalidOperandSnafu { reason: "shift of a non-vector" }.fail();
        };
        let info = v.bound("shifted vector")?;
        let (ind0, _) = v.index(slot, "shifted vector")?;
        let k = self.k.info().context(UnboundNodeSnafu { what: "shift offset" })?;
        let name = &info.name;
        Ok(format!("{name}[min(max((int)({ind0}) + {}, 0), (int){name}_size - 1)]", k.name))
    }
}

fn check_scalars(lhs: &Expr, rhs: &Expr) -> Result<ScalarType> {
    match (lhs.scalar(), rhs.scalar()) {
        (Some(l), Some(r)) => {
            ensure!(l == r, ScalarMismatchSnafu { lhs: l, rhs: r });
            Ok(l)
        }
        (Some(s), None) | (None, Some(s)) => Ok(s),
        (None, None) => Ok(ScalarType::Int32),
    }
}

fn position(seen: &mut Vec<Handle>, handle: Handle) -> usize {
    match seen.iter().position(|h| *h == handle) {
        Some(index) => index,
        None => {
            seen.push(handle);
            seen.len() - 1
        }
    }
}

/// `[internal_size1, internal_size2, size1, size2]` of `m` in units of packed
/// accesses. Only the contiguous axis is packed, so a packed view must start at
/// 0 with stride 1 along it.
fn packed_extents(m: &Matrix, alignment: usize) -> Result<[usize; 4]> {
    let (internal1, internal2, size1, size2) = (m.internal_size1(), m.internal_size2(), m.size1(), m.size2());
    if alignment == 1 {
        return Ok([internal1, internal2, size1, size2]);
    }
    let row_major = m.layout().is_row_major();
    let (start, stride) = if row_major { (m.start2(), m.stride2()) } else { (m.start1(), m.stride1()) };
    ensure!(
        start == 0 && stride == 1,
        InvalidOperandSnafu {
            reason: format!("{} view at start {start}, stride {stride} cannot be packed", m.layout().name())
        }
    );
    Ok(if row_major {
        [internal1, internal2 / alignment, size1, size2.div_ceil(alignment)]
    } else {
        [internal1 / alignment, internal2, size1.div_ceil(alignment), size2]
    })
}

fn with_lane(access: String, info: &SharedInfo, lane: Option<usize>) -> String {
    match lane {
        Some(lane) if info.alignment > 1 => format!("{access}.s{lane:x}"),
        _ => access,
    }
}

/// Linear element offset of `(ind0, ind1)` inside a strided matrix view.
fn matrix_offset(name: &str, layout: Layout, ind0: &str, ind1: &str) -> String {
    let row = format!("{name}_start1 + ({ind0}) * {name}_stride1");
    let col = format!("{name}_start2 + ({ind1}) * {name}_stride2");
    match layout {
        Layout::RowMajor => format!("({row}) * {name}_internal_size2 + {col}"),
        Layout::ColumnMajor => format!("{row} + ({col}) * {name}_internal_size1"),
    }
}
