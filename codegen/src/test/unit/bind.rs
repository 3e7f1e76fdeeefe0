use linacc_device::{KernelArg, LaunchArgs, cpu};
use linacc_dtype::{Layout, ScalarType};
use proptest::prelude::*;

use crate::test::{matrix, vector};
use crate::{
    AssignOp, Assignment, BindContext, BinaryOp, EnqueueContext, Error, Expr, GenContext, GeneratorConfig, Handle,
    KernelGenerator, ReduceOp,
};

fn enqueue(expr: &Expr) -> LaunchArgs {
    let mut args = LaunchArgs::new();
    expr.enqueue(&mut EnqueueContext::new(&mut args)).unwrap();
    args
}

#[test]
fn test_repeated_buffer_binds_once() {
    let v = vector(ScalarType::Float32, 10);
    let mut expr = Expr::binary(Expr::vector(v.clone()), BinaryOp::Add, Expr::vector(v.clone())).unwrap();

    let mut ctx = BindContext::new(1);
    expr.bind(&mut ctx);
    assert_eq!(ctx.len(), 1);
    assert_eq!(ctx.order(), &[Handle::Buffer(v.id())]);

    let args = enqueue(&expr);
    assert_eq!(args.len(), 2);
    assert_eq!(args.get(0), Some(&KernelArg::Buffer(v.id())));
    assert_eq!(args.get(1), Some(&KernelArg::UInt(v.internal_size() as u32)));
}

#[test]
fn test_descriptor_indices_follow_depth_first_order() {
    let (a, b, c) = (vector(ScalarType::Float32, 4), vector(ScalarType::Float32, 4), vector(ScalarType::Float32, 4));
    let inner = Expr::binary(Expr::vector(b.clone()), BinaryOp::Mul, Expr::vector(c.clone())).unwrap();
    let mut expr = Expr::binary(inner, BinaryOp::Sub, Expr::vector(a.clone())).unwrap();

    let mut ctx = BindContext::new(1);
    expr.bind(&mut ctx);
    assert_eq!(ctx.buffers(), vec![b.id(), c.id(), a.id()]);
    assert_eq!(ctx.get(&Handle::Buffer(a.id())).unwrap().name, "arg2");
}

#[test]
fn test_binding_is_idempotent() {
    let v = vector(ScalarType::Float64, 4);
    let w = vector(ScalarType::Float64, 4);
    let mut expr = Expr::binary(Expr::vector(v.clone()), BinaryOp::Div, Expr::vector(w)).unwrap();

    let render = |expr: &mut Expr| {
        let mut ctx = BindContext::new(1);
        expr.bind(&mut ctx);
        expr.access_index(0, "i", "0").unwrap();
        let source = expr.generate(&GenContext::new(), 0, None).unwrap();
        let index = ctx.get(&Handle::Buffer(v.id())).unwrap().index;
        (index, source, ctx.order().to_vec())
    };

    let first = render(&mut expr);
    let second = render(&mut expr);
    assert_eq!(first, second);
    assert_eq!(first.1, "(arg0[i] / arg1[i])");
}

#[test]
fn test_rebinding_into_same_context_reuses_descriptors() {
    let v = vector(ScalarType::Float32, 4);
    let mut expr = Expr::vector(v.clone());
    let mut ctx = BindContext::new(1);
    expr.bind(&mut ctx);
    expr.bind(&mut ctx);
    assert_eq!(ctx.len(), 1);
    assert_eq!(expr.info().unwrap().index, 0);
}

#[test]
fn test_inner_product_reuses_scratch() {
    let f = ScalarType::Float32;
    let mut expr =
        Expr::inner_product(cpu(), Expr::vector(vector(f, 8)), ReduceOp::Add, Expr::vector(vector(f, 8)), 1024).unwrap();
    let reduction = expr.as_reduction().unwrap();
    let (node, scratch) = (reduction.id(), reduction.scratch().unwrap().id());
    assert_eq!(reduction.scratch().unwrap().size(), 1024);

    let mut first = BindContext::new(1);
    expr.bind(&mut first);
    let mut second = BindContext::new(1);
    expr.bind(&mut second);

    assert_eq!(first.temporary(node), Some(Handle::Buffer(scratch)));
    assert_eq!(second.temporary(node), Some(Handle::Buffer(scratch)));
    // Scratch registers before the operands.
    assert_eq!(first.order()[0], Handle::Buffer(scratch));
    assert_eq!(first.order(), second.order());

    let args = enqueue(&expr);
    assert_eq!(args.get(0), Some(&KernelArg::Buffer(scratch)));
    assert_eq!(args.len(), 5);
}

#[test]
fn test_host_scalars_are_distinct_arguments() {
    let f = ScalarType::Float32;
    let scaled = Expr::binary(Expr::host_scalar(2.0f32), BinaryOp::Mul, Expr::vector(vector(f, 4))).unwrap();
    let mut expr = Expr::binary(scaled, BinaryOp::Add, Expr::host_scalar(3.0f32)).unwrap();

    let mut ctx = BindContext::new(1);
    expr.bind(&mut ctx);
    assert_eq!(ctx.len(), 3);
    assert!(ctx.buffers().len() == 1);

    let args = enqueue(&expr);
    assert_eq!(args.get(0), Some(&KernelArg::Value(2.0f32.into())));
    assert_eq!(args.get(3), Some(&KernelArg::Value(3.0f32.into())));
}

#[test]
fn test_matrix_arguments() {
    let m = matrix(ScalarType::Float32, Layout::RowMajor, 8, 8).slice((1, 2, 3), (0, 1, 8)).unwrap();
    let mut expr = Expr::matrix(m.clone());
    expr.bind(&mut BindContext::new(4));

    let args: Vec<_> = enqueue(&expr).iter().copied().collect();
    assert_eq!(
        args,
        vec![
            KernelArg::Buffer(m.id()),
            KernelArg::UInt(1),
            KernelArg::UInt(2),
            KernelArg::UInt(0),
            KernelArg::UInt(1),
            KernelArg::UInt(128),
            KernelArg::UInt(32),
            KernelArg::UInt(3),
            KernelArg::UInt(2),
        ]
    );
}

#[test]
fn test_column_major_divides_first_axis() {
    let m = matrix(ScalarType::Float32, Layout::ColumnMajor, 8, 8);
    let mut expr = Expr::matrix(m);
    expr.bind(&mut BindContext::new(4));
    let args = enqueue(&expr);
    assert_eq!(args.get(5), Some(&KernelArg::UInt(32)));
    assert_eq!(args.get(6), Some(&KernelArg::UInt(128)));
    assert_eq!(args.get(7), Some(&KernelArg::UInt(2)));
    assert_eq!(args.get(8), Some(&KernelArg::UInt(8)));
}

#[test]
fn test_shift_offset_binds_after_vector() {
    let v = vector(ScalarType::Float32, 4);
    let mut expr = Expr::shift(Expr::vector(v.clone()), -1).unwrap();
    let mut ctx = BindContext::new(1);
    expr.bind(&mut ctx);

    assert_eq!(ctx.len(), 2);
    assert_eq!(ctx.order()[0], Handle::Buffer(v.id()));
    let args = enqueue(&expr);
    assert_eq!(args.get(2), Some(&KernelArg::Value((-1i32).into())));
}

#[test]
fn test_use_before_bind() {
    let expr = Expr::vector(vector(ScalarType::Float32, 4));
    let mut args = LaunchArgs::new();
    let err = expr.enqueue(&mut EnqueueContext::new(&mut args)).unwrap_err();
    assert!(matches!(err, Error::UnboundNode { .. }));

    let err = expr.generate(&GenContext::new(), 0, None).unwrap_err();
    assert!(matches!(err, Error::UnboundNode { .. }));
}

#[test]
fn test_generate_without_access_index() {
    let mut expr = Expr::vector(vector(ScalarType::Float32, 4));
    expr.bind(&mut BindContext::new(1));
    let err = expr.generate(&GenContext::new(), 3, None).unwrap_err();
    assert!(matches!(err, Error::MissingAccess { slot: 3, .. }));
}

/// Tree over a small pool of vectors; leaves name the pool slot they read.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tree {
    Leaf(usize),
    Binary(Box<Tree>, Box<Tree>),
}

fn tree() -> impl Strategy<Value = Tree> {
    (0usize..4)
        .prop_map(Tree::Leaf)
        .prop_recursive(4, 16, 2, |inner| (inner.clone(), inner).prop_map(|(l, r)| Tree::Binary(Box::new(l), Box::new(r))))
}

fn build(tree: &Tree, pool: &[linacc_device::Vector]) -> Expr {
    match tree {
        Tree::Leaf(i) => Expr::vector(pool[*i].clone()),
        Tree::Binary(l, r) => Expr::binary(build(l, pool), BinaryOp::Add, build(r, pool)).unwrap(),
    }
}

/// Relabel leaves by first appearance, with slot 0 (the destination) seen first.
fn canonical(tree: &Tree, seen: &mut Vec<usize>) -> Tree {
    match tree {
        Tree::Leaf(i) => {
            if !seen.contains(i) {
                seen.push(*i);
            }
            Tree::Leaf(seen.iter().position(|s| s == i).unwrap_or_default())
        }
        Tree::Binary(l, r) => {
            let l = canonical(l, seen);
            Tree::Binary(Box::new(l), Box::new(canonical(r, seen)))
        }
    }
}

fn first_seen(tree: &Tree, out: &mut Vec<usize>) {
    match tree {
        Tree::Leaf(i) if !out.contains(i) => out.push(*i),
        Tree::Leaf(_) => {}
        Tree::Binary(l, r) => {
            first_seen(l, out);
            first_seen(r, out);
        }
    }
}

proptest! {
    #[test]
    fn enqueue_order_matches_bind_order(t in tree()) {
        let pool: Vec<_> = (0..4).map(|_| vector(ScalarType::Float32, 4)).collect();
        let mut expr = build(&t, &pool);
        let mut ctx = BindContext::new(1);
        expr.bind(&mut ctx);

        let mut expected = Vec::new();
        first_seen(&t, &mut expected);
        let expected: Vec<_> = expected.into_iter().map(|i| pool[i].id()).collect();

        let args = enqueue(&expr);
        prop_assert_eq!(ctx.buffers(), expected.clone());
        prop_assert_eq!(args.buffers(), expected.clone());
        prop_assert_eq!(args.len(), 2 * expected.len());
        prop_assert!(args.is_dense());
    }

    #[test]
    fn signature_tracks_aliasing(a in tree(), b in tree()) {
        let pool: Vec<_> = (0..4).map(|_| vector(ScalarType::Float32, 4)).collect();
        let generator = KernelGenerator::new(GeneratorConfig::builder().kernel_name("alias_prop").build()).unwrap();
        let statement = |t: &Tree| [Assignment::new(Expr::vector(pool[0].clone()), AssignOp::Assign, build(t, &pool)).unwrap()];
        let (mut sa, mut sb) = (statement(&a), statement(&b));

        let same_pattern = canonical(&a, &mut vec![0]) == canonical(&b, &mut vec![0]);
        prop_assert_eq!(generator.signature(&sa) == generator.signature(&sb), same_pattern);
        if same_pattern {
            let (ka, kb) = (generator.render(&mut sa).unwrap(), generator.render(&mut sb).unwrap());
            prop_assert_eq!(ka.code, kb.code);
        }
    }
}
