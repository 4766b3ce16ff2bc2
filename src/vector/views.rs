//! Sub-views, offset views, and raw data access.
//!
//! Everything here is zero-copy unless the name says otherwise: sub-views
//! narrow the column selection, offset views move the row window, and the
//! guard types hand out slices of one residency while holding the
//! allocation's lock. Deep-copying twins (`sub_copy`, `get_1d_copy`,
//! `get_2d_copy`) exist for callers that need detached data.

use std::ops::{Deref, DerefMut, Range};
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use num_traits::Float;

use crate::error::MvError;
use crate::map::RowMap;
use crate::storage::{DualBuffer, Residency};
use crate::vector::multi_vec::MultiVec;
use crate::vector::selection::ColSelection;

/// `Some((first, one past last))` when `cols` is a non-empty ascending run
/// of consecutive indices.
fn contiguous_run(cols: &[usize]) -> Option<(usize, usize)> {
    let first = *cols.first()?;
    let mut expect = first;
    for &c in cols {
        if c != expect {
            return None;
        }
        expect += 1;
    }
    Some((first, expect))
}

impl<T: Float> MultiVec<T> {
    /// View a row window of `src`'s allocation under a smaller map. The
    /// window starts at `row_offset` *in the original allocation*, not in
    /// `src`'s current window, so chained offset views compose against the
    /// same frame of reference. The window must fit the allocation.
    pub fn offset_view(
        src: &MultiVec<T>,
        sub_map: Arc<RowMap>,
        row_offset: usize,
    ) -> Result<MultiVec<T>, MvError> {
        let rows = sub_map.local_len();
        let alloc = src.buf_read().rows();
        let end = row_offset.saturating_add(rows);
        if end > alloc {
            return Err(MvError::RowWindowOutOfBounds {
                offset: row_offset,
                end,
                alloc,
            });
        }
        Ok(MultiVec {
            buf: Arc::clone(&src.buf),
            row_offset,
            row_count: rows,
            sel: src.sel.clone(),
            map: Some(sub_map),
        })
    }

    /// Zero-copy view of the listed logical columns, in the order given.
    /// Contiguous ascending lists take the range path and stay
    /// constant-stride; an empty list yields a 0-column constant-stride
    /// block.
    pub fn sub_view(&self, cols: &[usize]) -> Result<MultiVec<T>, MvError> {
        if cols.is_empty() {
            return self.sub_view_range(0..0);
        }
        if let Some((lo, hi)) = contiguous_run(cols) {
            return self.sub_view_range(lo..hi);
        }
        let sel = self.sel.narrow_list(cols)?;
        Ok(MultiVec {
            buf: Arc::clone(&self.buf),
            row_offset: self.row_offset,
            row_count: self.row_count,
            sel,
            map: self.map.clone(),
        })
    }

    /// Zero-copy view of a contiguous logical column range. An empty range
    /// yields a valid 0-column block that keeps the allocation's stride.
    pub fn sub_view_range(&self, range: Range<usize>) -> Result<MultiVec<T>, MvError> {
        let n = self.sel.count();
        if range.start < range.end && range.end > n {
            return Err(MvError::ColumnOutOfBounds {
                index: range.end - 1,
                bound: n,
            });
        }
        let sel = self.sel.narrow_range(range.start, range.end.min(n));
        Ok(MultiVec {
            buf: Arc::clone(&self.buf),
            row_offset: self.row_offset,
            row_count: self.row_count,
            sel,
            map: self.map.clone(),
        })
    }

    /// Deep-copying twin of [`sub_view`](Self::sub_view).
    pub fn sub_copy(&self, cols: &[usize]) -> Result<MultiVec<T>, MvError> {
        Ok(self.sub_view(cols)?.deep_copy())
    }

    /// Deep-copying twin of [`sub_view_range`](Self::sub_view_range).
    pub fn sub_copy_range(&self, range: Range<usize>) -> Result<MultiVec<T>, MvError> {
        Ok(self.sub_view_range(range)?.deep_copy())
    }

    /// Zero-copy view of a single column. Always constant-stride, even when
    /// this block is not.
    pub fn get_vector(&self, j: usize) -> Result<MultiVec<T>, MvError> {
        self.sub_view_range(j..j + 1)
    }

    /// Guarded read access to the visible window in residency `r`. The data
    /// is only current if `r` was synced beforehand (or is authoritative).
    pub fn view(&self, r: Residency) -> BlockRead<'_, T> {
        let guard = self.buf_read();
        let lda = guard.rows();
        BlockRead {
            guard,
            res: r,
            lda,
            row_offset: self.row_offset,
            rows: self.row_count,
            sel: self.sel.clone(),
        }
    }

    /// Guarded write access to the visible window in residency `r`, marking
    /// `r` modified on creation. When the other residency holds newer data
    /// the caller must sync first; checked builds trip an assertion
    /// otherwise.
    pub fn view_mut(&mut self, r: Residency) -> BlockWrite<'_, T> {
        let mut guard = self.buf_write();
        guard.mark_modified(r);
        let lda = guard.rows();
        BlockWrite {
            guard,
            res: r,
            lda,
            row_offset: self.row_offset,
            rows: self.row_count,
            sel: self.sel.clone(),
        }
    }

    /// Copy the visible window into `out` column-major with leading
    /// dimension `lda`, reading the authoritative residency. Works for any
    /// selection.
    pub fn get_1d_copy(&self, out: &mut [T], lda: usize) -> Result<(), MvError> {
        let rows = self.row_count;
        let n = self.num_vectors();
        if lda < rows {
            return Err(MvError::BadLeadingDim { lda, rows });
        }
        let required = if n == 0 { 0 } else { lda * (n - 1) + rows };
        if out.len() < required {
            return Err(MvError::ShortArray {
                len: out.len(),
                lda,
                rows,
                cols: n,
            });
        }
        let g = self.read_cols_guarded();
        for j in 0..n {
            out[j * lda..j * lda + rows].copy_from_slice(g.col(j));
        }
        Ok(())
    }

    /// One owned copy per selected column, reading the authoritative
    /// residency.
    pub fn get_2d_copy(&self) -> Vec<Vec<T>> {
        let g = self.read_cols_guarded();
        (0..self.num_vectors()).map(|j| g.col(j).to_vec()).collect()
    }

    /// Flat host-residency view of the visible window, stride gaps
    /// included; derefs to `[T]` of length `stride * (cols - 1) + rows`.
    /// Syncs the host side first. Only meaningful for constant-stride
    /// blocks.
    pub fn get_1d_view(&self) -> Result<HostSlice<'_, T>, MvError> {
        let (origin, count) = match self.sel {
            ColSelection::ConstantStride { origin, count } => (origin, count),
            ColSelection::ExplicitList(_) => {
                return Err(MvError::NotConstantStride("get_1d_view"));
            }
        };
        self.sync(Residency::Host);
        let guard = self.buf_read();
        let lda = guard.rows();
        let start = origin * lda + self.row_offset;
        let len = if count == 0 {
            0
        } else {
            lda * (count - 1) + self.row_count
        };
        Ok(HostSlice { guard, start, len })
    }

    /// Mutable twin of [`get_1d_view`](Self::get_1d_view); syncs the host
    /// side and marks it modified.
    pub fn get_1d_view_mut(&mut self) -> Result<HostSliceMut<'_, T>, MvError> {
        let (origin, count) = match self.sel {
            ColSelection::ConstantStride { origin, count } => (origin, count),
            ColSelection::ExplicitList(_) => {
                return Err(MvError::NotConstantStride("get_1d_view_mut"));
            }
        };
        self.sync(Residency::Host);
        let mut guard = self.buf_write();
        guard.mark_modified(Residency::Host);
        let lda = guard.rows();
        let start = origin * lda + self.row_offset;
        let len = if count == 0 {
            0
        } else {
            lda * (count - 1) + self.row_count
        };
        Ok(HostSliceMut { guard, start, len })
    }
}

/// Read guard over one residency of a block's visible window.
pub struct BlockRead<'a, T> {
    guard: RwLockReadGuard<'a, DualBuffer<T>>,
    res: Residency,
    lda: usize,
    row_offset: usize,
    rows: usize,
    sel: ColSelection,
}

impl<T: Float> BlockRead<'_, T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.sel.count()
    }

    /// Logical column `j` as a contiguous slice.
    pub fn col(&self, j: usize) -> &[T] {
        let base = self.sel.physical(j) * self.lda + self.row_offset;
        &self.guard.slice(self.res)[base..base + self.rows]
    }

    /// Entry `(i, j)` of the window; panics on out-of-range indices like
    /// slice indexing does.
    pub fn at(&self, i: usize, j: usize) -> T {
        self.col(j)[i]
    }
}

/// Write guard over one residency of a block's visible window.
pub struct BlockWrite<'a, T> {
    guard: RwLockWriteGuard<'a, DualBuffer<T>>,
    res: Residency,
    lda: usize,
    row_offset: usize,
    rows: usize,
    sel: ColSelection,
}

impl<T: Float> BlockWrite<'_, T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.sel.count()
    }

    pub fn col(&self, j: usize) -> &[T] {
        let base = self.sel.physical(j) * self.lda + self.row_offset;
        &self.guard.slice(self.res)[base..base + self.rows]
    }

    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        let base = self.sel.physical(j) * self.lda + self.row_offset;
        &mut self.guard.slice_mut(self.res)[base..base + self.rows]
    }

    pub fn at(&self, i: usize, j: usize) -> T {
        self.col(j)[i]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.col_mut(j)[i] = value;
    }
}

/// Flat host view handed out by [`MultiVec::get_1d_view`].
pub struct HostSlice<'a, T> {
    guard: RwLockReadGuard<'a, DualBuffer<T>>,
    start: usize,
    len: usize,
}

impl<T: Float> Deref for HostSlice<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.guard.slice(Residency::Host)[self.start..self.start + self.len]
    }
}

/// Flat mutable host view handed out by [`MultiVec::get_1d_view_mut`].
pub struct HostSliceMut<'a, T> {
    guard: RwLockWriteGuard<'a, DualBuffer<T>>,
    start: usize,
    len: usize,
}

impl<T: Float> Deref for HostSliceMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.guard.slice(Residency::Host)[self.start..self.start + self.len]
    }
}

impl<T: Float> DerefMut for HostSliceMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        let (start, len) = (self.start, self.len);
        &mut self.guard.slice_mut(Residency::Host)[start..start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::UniverseComm;

    fn serial_map(rows: usize) -> Arc<RowMap> {
        Arc::new(RowMap::contiguous(rows, Arc::new(UniverseComm::local())))
    }

    fn iota(rows: usize, cols: usize) -> MultiVec<f64> {
        let data: Vec<f64> = (0..rows * cols).map(|k| k as f64).collect();
        MultiVec::from_flat_copy(serial_map(rows), &data, rows, cols).unwrap()
    }

    #[test]
    fn offset_view_is_absolute_in_the_allocation() {
        let x = iota(6, 2);
        let top = MultiVec::offset_view(&x, serial_map(2), 0).unwrap();
        let bottom = MultiVec::offset_view(&top, serial_map(3), 3).unwrap();
        // `bottom` offsets against the allocation, not against `top`.
        let g = bottom.read_cols_guarded();
        assert_eq!(g.col(0), &[3.0, 4.0, 5.0]);
        assert_eq!(g.col(1), &[9.0, 10.0, 11.0]);
    }

    #[test]
    fn oversized_offset_view_fails_and_leaves_source_intact() {
        let x = iota(4, 1);
        let err = MultiVec::offset_view(&x, serial_map(3), 2).unwrap_err();
        assert!(matches!(
            err,
            MvError::RowWindowOutOfBounds {
                offset: 2,
                end: 5,
                alloc: 4
            }
        ));
        assert_eq!(x.local_len(), 4);
        assert_eq!(x.read_cols_guarded().col(0), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn sub_view_routes_contiguous_lists_to_the_range_path() {
        let x = iota(3, 5);
        let v = x.sub_view(&[1, 2, 3]).unwrap();
        assert!(v.is_constant_stride());
        assert_eq!(v.num_vectors(), 3);
        let w = x.sub_view(&[3, 1]).unwrap();
        assert!(!w.is_constant_stride());
        assert_eq!(w.read_cols_guarded().col(0), x.read_cols_guarded().col(3));
    }

    #[test]
    fn empty_sub_view_keeps_the_stride() {
        let x = iota(3, 4);
        let v = x.sub_view_range(2..2).unwrap();
        assert_eq!(v.num_vectors(), 0);
        assert!(v.is_constant_stride());
        assert_eq!(v.stride(), 3);
    }

    #[test]
    fn single_column_of_explicit_list_is_constant_stride() {
        let x = iota(3, 4);
        let scattered = x.sub_view(&[3, 0, 2]).unwrap();
        let one = scattered.get_vector(1).unwrap();
        assert!(one.is_constant_stride());
        assert_eq!(one.read_cols_guarded().col(0), x.read_cols_guarded().col(0));
    }

    #[test]
    fn guards_read_and_write_through() {
        let mut x = iota(3, 2);
        x.sync(Residency::Host);
        {
            let mut w = x.view_mut(Residency::Host);
            w.set(1, 1, 42.0);
            assert_eq!(w.at(1, 1), 42.0);
        }
        x.sync(Residency::Device);
        let r = x.view(Residency::Device);
        assert_eq!(r.at(1, 1), 42.0);
        assert_eq!(r.col(0), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn get_1d_copy_respects_the_output_stride() {
        let x = iota(2, 2);
        let mut out = vec![-1.0; 5];
        x.get_1d_copy(&mut out, 3).unwrap();
        assert_eq!(out, vec![0.0, 1.0, -1.0, 2.0, 3.0]);
        let mut short = vec![0.0; 3];
        assert!(matches!(
            x.get_1d_copy(&mut short, 2),
            Err(MvError::ShortArray { .. })
        ));
    }

    #[test]
    fn flat_host_view_requires_constant_stride() {
        let x = iota(3, 3);
        let picked = x.sub_view(&[2, 0]).unwrap();
        assert!(matches!(
            picked.get_1d_view(),
            Err(MvError::NotConstantStride("get_1d_view"))
        ));
        let run = x.sub_view_range(1..3).unwrap();
        let flat = run.get_1d_view().unwrap();
        // Window starts at column 1; stride gaps are part of the view.
        assert_eq!(flat.len(), 6);
        assert_eq!(&flat[..3], &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn mutable_flat_view_marks_host() {
        let mut x = iota(2, 1);
        {
            let mut flat = x.get_1d_view_mut().unwrap();
            flat[0] = 9.0;
        }
        assert!(x.needs_sync(Residency::Device));
        x.sync(Residency::Device);
        assert_eq!(x.read_cols_guarded().col(0), &[9.0, 1.0]);
    }
}
