use linacc_dtype::{Layout, ScalarType};
use test_case::test_case;

use crate::{Buffer, Error, Matrix, PADDING, Vector, cpu, padded};

#[test_case(0, 0; "empty")]
#[test_case(1, PADDING; "one")]
#[test_case(PADDING, PADDING; "exact")]
#[test_case(PADDING + 1, 2 * PADDING; "just_over")]
fn test_padded(size: usize, expected: usize) {
    assert_eq!(padded(size), expected);
}

#[test]
fn test_vector_internal_size() {
    let v = Vector::new(cpu(), ScalarType::Float32, 10).unwrap();
    assert_eq!(v.size(), 10);
    assert_eq!(v.internal_size(), PADDING);
    assert_eq!(v.handle().len(), PADDING);
}

#[test]
fn test_vector_from_small_buffer() {
    let buffer = Buffer::allocate(cpu(), ScalarType::Float32, 4).unwrap();
    let err = Vector::from_buffer(buffer, 4).unwrap_err();
    assert!(matches!(err, Error::InvalidView { required: PADDING, available: 4 }));
}

#[test]
fn test_matrix_defaults() {
    let m = Matrix::new(cpu(), ScalarType::Float64, Layout::ColumnMajor, 3, 200).unwrap();
    assert_eq!(m.layout(), Layout::ColumnMajor);
    assert_eq!((m.size1(), m.size2()), (3, 200));
    assert_eq!((m.internal_size1(), m.internal_size2()), (PADDING, 2 * PADDING));
    assert_eq!((m.start1(), m.stride1(), m.start2(), m.stride2()), (0, 1, 0, 1));
}

#[test]
fn test_matrix_slice_shares_buffer() {
    let m = Matrix::new(cpu(), ScalarType::Float32, Layout::RowMajor, 8, 8).unwrap();
    let s = m.slice((1, 2, 3), (0, 1, 4)).unwrap();
    assert_eq!(s.id(), m.id());
    assert_eq!((s.start1(), s.stride1(), s.size1()), (1, 2, 3));
    assert_eq!((s.start2(), s.stride2(), s.size2()), (0, 1, 4));
}

#[test]
fn test_matrix_slice_out_of_range() {
    let m = Matrix::new(cpu(), ScalarType::Float32, Layout::RowMajor, 8, 8).unwrap();
    assert!(m.slice((0, PADDING, 2), (0, 1, 1)).is_err());
}

proptest::proptest! {
    #[test]
    fn padded_is_smallest_covering_multiple(size in 0usize..100_000) {
        let p = padded(size);
        proptest::prop_assert_eq!(p % PADDING, 0);
        proptest::prop_assert!(p >= size);
        proptest::prop_assert!(p < size + PADDING);
    }
}
