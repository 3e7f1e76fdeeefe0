pub mod unit;

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use linacc_device::{Compiler, LaunchArgs, Matrix, Program, Vector, cpu};
use linacc_dtype::{Layout, ScalarType};

pub fn vector(scalar: ScalarType, size: usize) -> Vector {
    Vector::new(cpu(), scalar, size).unwrap()
}

pub fn matrix(scalar: ScalarType, layout: Layout, size1: usize, size2: usize) -> Matrix {
    Matrix::new(cpu(), scalar, layout, size1, size2).unwrap()
}

/// Compiler that records sources and hands out programs recording their launches.
pub struct RecordingCompiler {
    device: String,
    pub compiled: RefCell<Vec<(String, String)>>,
    pub launches: Arc<Mutex<Vec<LaunchArgs>>>,
}

impl RecordingCompiler {
    pub fn new(device: &str) -> Self {
        Self { device: device.to_string(), compiled: RefCell::default(), launches: Arc::default() }
    }

    pub fn compile_count(&self) -> usize {
        self.compiled.borrow().len()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

impl Compiler for RecordingCompiler {
    fn compile(&self, source: &str, entry_point: &str) -> linacc_device::Result<Box<dyn Program>> {
        self.compiled.borrow_mut().push((source.to_string(), entry_point.to_string()));
        Ok(Box::new(RecordingProgram { name: entry_point.to_string(), launches: Arc::clone(&self.launches) }))
    }

    fn device(&self) -> &str {
        &self.device
    }
}

struct RecordingProgram {
    name: String,
    launches: Arc<Mutex<Vec<LaunchArgs>>>,
}

impl Program for RecordingProgram {
    fn launch(
        &self,
        args: &LaunchArgs,
        _global_size: [usize; 3],
        _local_size: Option<[usize; 3]>,
    ) -> linacc_device::Result<()> {
        self.launches.lock().unwrap().push(args.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Compiler whose every compilation fails.
pub struct FailingCompiler;

impl Compiler for FailingCompiler {
    fn compile(&self, _source: &str, entry_point: &str) -> linacc_device::Result<Box<dyn Program>> {
        linacc_device::error::CompilationSnafu { entry_point, reason: "rejected" }.fail()
    }

    fn device(&self) -> &str {
        "FAIL:0"
    }
}
