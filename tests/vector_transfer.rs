//! Tests for the redistribution hooks: same-row copies with permutation,
//! row packing, and packet unpacking under each combine rule.
//!
//! A driver above these methods decides which rows travel between
//! processes; here both endpoints live in one process, which pins down the
//! packet layout and the combine arithmetic without any wire in between.

use std::sync::Arc;

use multivec::{CombineMode, MultiVec, MvError, RowMap};

fn replicated(n: usize) -> Arc<RowMap> {
    Arc::new(RowMap::replicated(n, None))
}

/// `rows x cols` block whose column `j` holds `10*j + i` at row `i`.
fn iota(rows: usize, cols: usize) -> MultiVec<f64> {
    let data: Vec<f64> = (0..cols)
        .flat_map(|j| (0..rows).map(move |i| (10 * j + i) as f64))
        .collect();
    MultiVec::from_flat_copy(replicated(rows), &data, rows, cols).unwrap()
}

/// The leading same-rows run copies straight across; the permutation pairs
/// scatter the rest; untouched rows keep their values.
#[test]
fn copy_and_permute_moves_rows() {
    let src = iota(5, 2);
    let mut dst = MultiVec::<f64>::from_map(replicated(5), 2, true);
    dst.put_scalar(-1.0);

    dst.copy_and_permute(&src, 2, &[4, 3], &[0, 1]).unwrap();
    let cols = dst.get_2d_copy();
    assert_eq!(cols[0], vec![0.0, 1.0, -1.0, 1.0, 0.0]);
    assert_eq!(cols[1], vec![10.0, 11.0, -1.0, 11.0, 10.0]);
}

/// Every index list is validated before the first write; a bad entry
/// anywhere leaves the destination untouched.
#[test]
fn copy_and_permute_validates_before_writing() {
    let src = iota(4, 1);
    let mut dst = MultiVec::<f64>::from_map(replicated(4), 1, true);
    dst.put_scalar(-1.0);

    assert!(matches!(
        dst.copy_and_permute(&src, 2, &[3, 9], &[0, 1]),
        Err(MvError::RowOutOfBounds { index: 9, bound: 4 })
    ));
    assert!(matches!(
        dst.copy_and_permute(&src, 2, &[3], &[0, 1]),
        Err(MvError::InvalidArgument(_))
    ));
    assert!(matches!(
        dst.copy_and_permute(&src, 5, &[], &[]),
        Err(MvError::InvalidArgument(_))
    ));
    let narrow = iota(4, 2);
    assert!(matches!(
        dst.copy_and_permute(&narrow, 1, &[], &[]),
        Err(MvError::ShapeMismatch { .. })
    ));
    assert_eq!(dst.get_2d_copy()[0], vec![-1.0; 4]);
}

/// Packets hold all selected columns of one row before the next row.
#[test]
fn pack_is_row_major() {
    let src = iota(4, 2);
    let mut wire = Vec::new();
    src.pack(&[3, 0], &mut wire).unwrap();
    assert_eq!(wire, vec![3.0, 13.0, 0.0, 10.0]);

    // Packing a column sub-view only ships the selected columns.
    let right = src.sub_view(&[1]).unwrap();
    right.pack(&[2], &mut wire).unwrap();
    assert_eq!(wire, vec![12.0]);

    assert!(matches!(
        src.pack(&[4], &mut wire),
        Err(MvError::RowOutOfBounds { index: 4, bound: 4 })
    ));
}

/// Each combine mode applies its own arithmetic; `Zero` drops the packet.
#[test]
fn combine_modes_apply_their_rule() {
    let packet = [-7.0, 3.0];
    let fresh = || {
        let mut mv = MultiVec::<f64>::from_map(replicated(3), 2, true);
        mv.put_scalar(5.0);
        mv
    };

    let mut mv = fresh();
    mv.unpack_and_combine(&[1], &packet, CombineMode::Insert)
        .unwrap();
    assert_eq!(mv.get_2d_copy()[0], vec![5.0, -7.0, 5.0]);
    assert_eq!(mv.get_2d_copy()[1], vec![5.0, 3.0, 5.0]);

    let mut mv = fresh();
    mv.unpack_and_combine(&[1], &packet, CombineMode::Replace)
        .unwrap();
    assert_eq!(mv.get_2d_copy()[0][1], -7.0);

    let mut mv = fresh();
    mv.unpack_and_combine(&[1], &packet, CombineMode::Add)
        .unwrap();
    assert_eq!(mv.get_2d_copy()[0][1], -2.0);
    assert_eq!(mv.get_2d_copy()[1][1], 8.0);

    // AbsMax keeps the larger magnitude and its sign; ties keep the
    // entry already present.
    let mut mv = fresh();
    mv.unpack_and_combine(&[1], &packet, CombineMode::AbsMax)
        .unwrap();
    assert_eq!(mv.get_2d_copy()[0][1], -7.0);
    assert_eq!(mv.get_2d_copy()[1][1], 5.0);
    mv.replace_local(2, 0, -5.0).unwrap();
    mv.unpack_and_combine(&[2], &[5.0, 0.0], CombineMode::AbsMax)
        .unwrap();
    assert_eq!(mv.get_2d_copy()[0][2], -5.0);

    let mut mv = fresh();
    mv.unpack_and_combine(&[1], &packet, CombineMode::Zero)
        .unwrap();
    assert_eq!(mv.get_2d_copy()[0], vec![5.0; 3]);
}

/// Unpacking validates rows and packet length before writing.
#[test]
fn unpack_validates_packet() {
    let mut mv = MultiVec::<f64>::from_map(replicated(2), 2, true);
    assert!(matches!(
        mv.unpack_and_combine(&[2], &[0.0, 0.0], CombineMode::Insert),
        Err(MvError::RowOutOfBounds { index: 2, bound: 2 })
    ));
    assert!(matches!(
        mv.unpack_and_combine(&[0, 1], &[0.0; 3], CombineMode::Insert),
        Err(MvError::InvalidArgument(_))
    ));
}

/// A pack on one block feeds an unpack on another, reordering rows in
/// flight the way an import does.
#[test]
fn pack_then_unpack_moves_rows() {
    let src = iota(4, 3);
    let mut dst = MultiVec::<f64>::from_map(replicated(4), 3, true);

    let mut wire = Vec::new();
    src.pack(&[1, 3], &mut wire).unwrap();
    dst.unpack_and_combine(&[0, 2], &wire, CombineMode::Insert)
        .unwrap();

    let cols = dst.get_2d_copy();
    for j in 0..3 {
        assert_eq!(cols[j][0], (10 * j + 1) as f64);
        assert_eq!(cols[j][2], (10 * j + 3) as f64);
        assert_eq!(cols[j][1], 0.0);
        assert_eq!(cols[j][3], 0.0);
    }
}

/// Combining into a column sub-view leaves unselected columns alone.
#[test]
fn unpack_into_sub_view_spares_other_columns() {
    let parent = iota(3, 3);
    let mut middle = parent.sub_view(&[1]).unwrap();
    middle
        .unpack_and_combine(&[0], &[99.0], CombineMode::Insert)
        .unwrap();
    let cols = parent.get_2d_copy();
    assert_eq!(cols[0], vec![0.0, 1.0, 2.0]);
    assert_eq!(cols[1], vec![99.0, 11.0, 12.0]);
    assert_eq!(cols[2], vec![20.0, 21.0, 22.0]);
}
