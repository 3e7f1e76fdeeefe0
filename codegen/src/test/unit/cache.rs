use std::sync::Arc;

use linacc_device::{KernelArg, LaunchArgs};
use linacc_dtype::ScalarType;

use crate::kernel_cache::{self, CachedKernel};
use crate::test::{FailingCompiler, RecordingCompiler, vector};
use crate::{AssignOp, Assignment, BinaryOp, Error, Expr, GeneratorConfig, KernelGenerator};

/// Kernel names keep tests apart in the process-wide cache.
fn generator(name: &str) -> KernelGenerator {
    KernelGenerator::new(GeneratorConfig::builder().kernel_name(name).build()).unwrap()
}

fn axpy(alpha: f32) -> [Assignment; 1] {
    let f = ScalarType::Float32;
    let rhs = Expr::binary(Expr::host_scalar(alpha), BinaryOp::Mul, Expr::vector(vector(f, 16))).unwrap();
    [Assignment::new(Expr::vector(vector(f, 16)), AssignOp::InplaceAdd, rhs).unwrap()]
}

#[test]
fn test_execute_compiles_once_per_signature() {
    let generator = generator("cache_once");
    let compiler = RecordingCompiler::new("REC:once");

    let mut first = axpy(1.0);
    let mut second = axpy(2.5);
    generator.execute(&mut first, &compiler).unwrap();
    let args = generator.execute(&mut second, &compiler).unwrap();

    assert_eq!(compiler.compile_count(), 1);
    assert_eq!(compiler.launch_count(), 2);
    assert_eq!(args.get(2), Some(&KernelArg::Value(2.5f32.into())));

    let (source, entry) = compiler.compiled.borrow()[0].clone();
    assert_eq!(entry, "cache_once");
    assert!(source.contains("arg0[i] += (arg1 * arg2[i]);"), "{source}");

    let cached = kernel_cache::get(&generator.signature(&second), "REC:once").unwrap();
    assert_eq!(cached.code, source);
}

#[test]
fn test_launch_receives_enqueued_arguments() {
    let generator = generator("cache_args");
    let compiler = RecordingCompiler::new("REC:args");
    let f = ScalarType::Float32;
    let (x, y) = (vector(f, 4), vector(f, 4));
    let rhs = Expr::binary(Expr::vector(y.clone()), BinaryOp::Add, Expr::vector(y.clone())).unwrap();
    let mut statements = [Assignment::new(Expr::vector(x.clone()), AssignOp::Assign, rhs).unwrap()];

    let args = generator.execute(&mut statements, &compiler).unwrap();

    let launched: Vec<LaunchArgs> = compiler.launches.lock().unwrap().clone();
    assert_eq!(launched, vec![args.clone()]);
    assert_eq!(args.buffers(), vec![x.id(), y.id()]);
    assert!(args.is_dense());
}

#[test]
fn test_devices_do_not_share_programs() {
    let generator = generator("cache_devices");
    let (a, b) = (RecordingCompiler::new("REC:dev0"), RecordingCompiler::new("REC:dev1"));
    generator.execute(&mut axpy(1.0), &a).unwrap();
    generator.execute(&mut axpy(1.0), &b).unwrap();
    assert_eq!(a.compile_count(), 1);
    assert_eq!(b.compile_count(), 1);
}

#[test]
fn test_different_shapes_compile_separately() {
    let generator = generator("cache_shapes");
    let compiler = RecordingCompiler::new("REC:shapes");
    let f = ScalarType::Float32;
    let mut copy = [Assignment::new(Expr::vector(vector(f, 4)), AssignOp::Assign, Expr::vector(vector(f, 4))).unwrap()];

    generator.execute(&mut axpy(1.0), &compiler).unwrap();
    generator.execute(&mut copy, &compiler).unwrap();
    assert_eq!(compiler.compile_count(), 2);
}

#[test]
fn test_compilation_failure_is_not_cached() {
    let generator = generator("cache_failure");
    let err = generator.execute(&mut axpy(1.0), &FailingCompiler).unwrap_err();
    assert!(matches!(err, Error::Device { .. }));
    assert!(kernel_cache::get(&generator.signature(&axpy(1.0)), "FAIL:0").is_none());
}

#[test]
fn test_concurrent_insert_keeps_one_winner() {
    let compile = |tag: &str| -> Result<CachedKernel, Error> {
        let compiler = RecordingCompiler::new("REC:race");
        let program = linacc_device::Compiler::compile(&compiler, tag, tag).unwrap();
        Ok(CachedKernel {
            program,
            device: "REC:race".to_string(),
            code: tag.to_string(),
            entry_point: tag.to_string(),
            global_size: [1, 1, 1],
            local_size: None,
        })
    };

    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                kernel_cache::get_or_compile_kernel("race_signature", "REC:race", || compile(&format!("k{i}")))
                    .unwrap()
            })
        })
        .collect();
    let kernels: Vec<Arc<CachedKernel>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(kernels.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn test_aliased_statements_compile_separately() {
    let generator = generator("cache_alias");
    let compiler = RecordingCompiler::new("REC:alias");
    let f = ScalarType::Float32;
    let (x, y, z) = (vector(f, 4), vector(f, 4), vector(f, 4));
    let statement = |a: &linacc_device::Vector| {
        let rhs = Expr::binary(Expr::vector(a.clone()), BinaryOp::Add, Expr::vector(y.clone())).unwrap();
        [Assignment::new(Expr::vector(x.clone()), AssignOp::Assign, rhs).unwrap()]
    };

    let distinct = generator.execute(&mut statement(&z), &compiler).unwrap();
    let aliased = generator.execute(&mut statement(&x), &compiler).unwrap();

    assert_eq!(compiler.compile_count(), 2);
    assert_eq!((distinct.len(), aliased.len()), (6, 4));
    let cached = kernel_cache::get(&generator.signature(&statement(&x)), "REC:alias").unwrap();
    assert!(cached.code.contains("unsigned int arg1_size)"), "{}", cached.code);
    assert!(!cached.code.contains("arg2"), "{}", cached.code);
}
