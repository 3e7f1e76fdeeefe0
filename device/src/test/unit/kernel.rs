use linacc_dtype::ScalarType;

use crate::{ArgSink, Buffer, HostValue, KernelArg, LaunchArgs, cpu};

#[test]
fn test_host_value_scalar() {
    assert_eq!(HostValue::from(1.0f32).scalar(), ScalarType::Float32);
    assert_eq!(HostValue::from(1.0f64).scalar(), ScalarType::Float64);
    assert_eq!(HostValue::from(-1i32).scalar(), ScalarType::Int32);
    assert_eq!(HostValue::from(1u32).scalar(), ScalarType::UInt32);
}

#[test]
fn test_launch_args_ordering() {
    let buffer = Buffer::allocate(cpu(), ScalarType::Float32, 4).unwrap();
    let mut args = LaunchArgs::new();
    args.set_arg(1, KernelArg::UInt(4));
    args.set_arg(0, KernelArg::Buffer(buffer.id()));

    assert!(args.is_dense());
    let ordered: Vec<_> = args.iter().copied().collect();
    assert_eq!(ordered, vec![KernelArg::Buffer(buffer.id()), KernelArg::UInt(4)]);
    assert_eq!(args.buffers(), vec![buffer.id()]);
}

#[test]
fn test_launch_args_gap_is_not_dense() {
    let mut args = LaunchArgs::new();
    args.set_arg(0, KernelArg::UInt(1));
    args.set_arg(2, KernelArg::UInt(1));
    assert!(!args.is_dense());
}
