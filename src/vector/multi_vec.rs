//! The distributed vector block.
//!
//! A `MultiVec` is a window into a shared [`DualBuffer`] allocation: a row
//! range plus a [`ColSelection`], bound to an optional [`RowMap`] describing
//! how the rows are spread over a communicator. Cloning is shallow (view
//! semantics); deep copies go through the explicit construction paths.
//!
//! Residency rules, applied uniformly across the operation set:
//! unary mutators execute in the buffer's authoritative residency and mark
//! it; operations that write `self` while reading other blocks first sync
//! `self` to the first guest's authoritative residency and execute there;
//! guest operands are always read in their own authoritative residency and
//! are never synced.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use num_traits::Float;
use rand::SeedableRng;
use rand::distributions::uniform::SampleUniform;
use rand::rngs::SmallRng;

use crate::error::MvError;
use crate::kernel;
use crate::map::RowMap;
use crate::parallel::Comm;
use crate::storage::{DualBuffer, Residency};
use crate::vector::DataAccess;
use crate::vector::selection::ColSelection;

/// Column-oriented, row-distributed dense block with dual memory residency.
pub struct MultiVec<T> {
    /// The original allocation. Row-offset views validate and index against
    /// this, not against the view they were derived from.
    pub(crate) buf: Arc<RwLock<DualBuffer<T>>>,
    /// First visible row, absolute in the allocation.
    pub(crate) row_offset: usize,
    /// Visible rows; equals the map's local length (0 with no map).
    pub(crate) row_count: usize,
    pub(crate) sel: ColSelection,
    pub(crate) map: Option<Arc<RowMap>>,
}

impl<T> Clone for MultiVec<T> {
    /// Shallow copy sharing the allocation; writes through either handle are
    /// visible to both.
    fn clone(&self) -> Self {
        MultiVec {
            buf: Arc::clone(&self.buf),
            row_offset: self.row_offset,
            row_count: self.row_count,
            sel: self.sel.clone(),
            map: self.map.clone(),
        }
    }
}

impl<T> fmt::Debug for MultiVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiVec")
            .field("local_rows", &self.row_count)
            .field("row_offset", &self.row_offset)
            .field("cols", &self.sel.count())
            .field("constant_stride", &self.sel.is_constant_stride())
            .field("has_map", &self.map.is_some())
            .finish()
    }
}

impl<T> MultiVec<T> {
    pub(crate) fn buf_read(&self) -> RwLockReadGuard<'_, DualBuffer<T>> {
        self.buf.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn buf_write(&self) -> RwLockWriteGuard<'_, DualBuffer<T>> {
        self.buf.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of columns this block exposes.
    pub fn num_vectors(&self) -> usize {
        self.sel.count()
    }

    /// Rows owned by this process.
    pub fn local_len(&self) -> usize {
        self.row_count
    }

    /// Rows across all processes; 0 for a block without a map.
    pub fn global_len(&self) -> u64 {
        self.map.as_ref().map(|m| m.global_len()).unwrap_or(0)
    }

    /// The row map, if this block has not been excluded from its
    /// communicator.
    pub fn map(&self) -> Option<&Arc<RowMap>> {
        self.map.as_ref()
    }

    /// Whether the map splits rows across processes. Blocks without a map
    /// count as non-distributed.
    pub fn is_distributed(&self) -> bool {
        self.map.as_ref().map(|m| m.is_distributed()).unwrap_or(false)
    }

    /// Whether the selected columns are contiguous in the allocation.
    pub fn is_constant_stride(&self) -> bool {
        self.sel.is_constant_stride()
    }

    /// The allocation's leading dimension for constant-stride blocks, 0
    /// otherwise.
    pub fn stride(&self) -> usize {
        if self.sel.is_constant_stride() {
            self.buf_read().rows()
        } else {
            0
        }
    }
}

/// Read-only snapshot of another block's selected columns, used while
/// writing into `self`. Either holds a read guard on the guest's allocation
/// or, when the guest shares the writer's allocation, a packed copy taken
/// before the writer locks (the same `RwLock` must never be held twice by
/// one thread).
pub(crate) struct GuestView<'a, T> {
    res: Residency,
    rows: usize,
    body: GuestBody<'a, T>,
}

enum GuestBody<'a, T> {
    Guarded {
        guard: RwLockReadGuard<'a, DualBuffer<T>>,
        lda: usize,
        row_offset: usize,
        sel: ColSelection,
    },
    Packed(Vec<T>),
}

impl<T: Float> GuestView<'_, T> {
    /// The guest's authoritative residency at snapshot time.
    pub(crate) fn residency(&self) -> Residency {
        self.res
    }

    /// Logical column `j` of the guest's visible window.
    pub(crate) fn col(&self, j: usize) -> &[T] {
        match &self.body {
            GuestBody::Guarded {
                guard,
                lda,
                row_offset,
                sel,
            } => {
                let base = sel.physical(j) * lda + row_offset;
                &guard.slice(self.res)[base..base + self.rows]
            }
            GuestBody::Packed(data) => &data[j * self.rows..(j + 1) * self.rows],
        }
    }
}

impl<T: Float> MultiVec<T> {
    /// An empty block: zero rows, zero columns, no map.
    pub fn new() -> Self {
        MultiVec {
            buf: Arc::new(RwLock::new(DualBuffer::allocate(0, 0, true))),
            row_offset: 0,
            row_count: 0,
            sel: ColSelection::full(0),
            map: None,
        }
    }

    /// Allocate a fresh `local_len x num_cols` block over `map`. Both
    /// residencies start zeroed when `zero_fill`, unspecified otherwise.
    pub fn from_map(map: Arc<RowMap>, num_cols: usize, zero_fill: bool) -> Self {
        let rows = map.local_len();
        MultiVec {
            buf: Arc::new(RwLock::new(DualBuffer::allocate(rows, num_cols, zero_fill))),
            row_offset: 0,
            row_count: rows,
            sel: ColSelection::full(num_cols),
            map: Some(map),
        }
    }

    /// Deep-copy column-major data with leading dimension `lda` into a
    /// fresh, tightly packed block.
    pub fn from_flat_copy(
        map: Arc<RowMap>,
        data: &[T],
        lda: usize,
        num_cols: usize,
    ) -> Result<Self, MvError> {
        let rows = map.local_len();
        Self::check_flat(data.len(), lda, rows, num_cols)?;
        let mut packed = Vec::with_capacity(rows * num_cols);
        for j in 0..num_cols {
            let base = j * lda;
            packed.extend_from_slice(&data[base..base + rows]);
        }
        let mut buf = DualBuffer::allocate(rows, num_cols, false);
        buf.mark_modified(Residency::Device);
        buf.slice_mut(Residency::Device).copy_from_slice(&packed);
        Ok(MultiVec {
            buf: Arc::new(RwLock::new(buf)),
            row_offset: 0,
            row_count: rows,
            sel: ColSelection::full(num_cols),
            map: Some(map),
        })
    }

    /// Take ownership of column-major data with leading dimension `lda`,
    /// keeping the caller's stride (rows beyond the map's local length stay
    /// in the allocation but out of the visible window). The vector is
    /// padded out to `lda * num_cols` if the final column was given short.
    pub fn from_flat(
        map: Arc<RowMap>,
        mut data: Vec<T>,
        lda: usize,
        num_cols: usize,
    ) -> Result<Self, MvError> {
        let rows = map.local_len();
        Self::check_flat(data.len(), lda, rows, num_cols)?;
        data.resize(lda * num_cols, T::zero());
        let buf = DualBuffer::from_vec(data, lda, num_cols)?;
        Ok(MultiVec {
            buf: Arc::new(RwLock::new(buf)),
            row_offset: 0,
            row_count: rows,
            sel: ColSelection::full(num_cols),
            map: Some(map),
        })
    }

    /// Share an existing allocation, optionally restricting it to the listed
    /// physical columns (`None` selects all of them).
    pub fn from_shared(
        map: Arc<RowMap>,
        buf: Arc<RwLock<DualBuffer<T>>>,
        cols: Option<&[usize]>,
    ) -> Result<Self, MvError> {
        let rows = map.local_len();
        let (alloc_rows, alloc_cols) = {
            let guard = buf.read().unwrap_or_else(PoisonError::into_inner);
            (guard.rows(), guard.cols())
        };
        if alloc_rows < rows {
            return Err(MvError::BadLeadingDim {
                lda: alloc_rows,
                rows,
            });
        }
        let sel = match cols {
            Some(list) => ColSelection::from_list(list, alloc_cols)?,
            None => ColSelection::full(alloc_cols),
        };
        Ok(MultiVec {
            buf,
            row_offset: 0,
            row_count: rows,
            sel,
            map: Some(map),
        })
    }

    /// Copy or share another block, per `access`. The copy is always
    /// constant-stride over a tight fresh allocation; the view is identical
    /// to [`Clone`].
    pub fn from_block(src: &MultiVec<T>, access: DataAccess) -> Self {
        match access {
            DataAccess::Copy => src.deep_copy(),
            DataAccess::View => src.clone(),
        }
    }

    fn check_flat(len: usize, lda: usize, rows: usize, num_cols: usize) -> Result<(), MvError> {
        if lda < rows {
            return Err(MvError::BadLeadingDim { lda, rows });
        }
        let required = if num_cols == 0 {
            0
        } else {
            lda * (num_cols - 1) + rows
        };
        if len < required {
            return Err(MvError::ShortArray {
                len,
                lda,
                rows,
                cols: num_cols,
            });
        }
        Ok(())
    }

    /// Selected window packed tightly column-by-column, read from the
    /// authoritative residency (which is also returned).
    pub(crate) fn packed_local(&self) -> (Vec<T>, Residency) {
        let guard = self.buf_read();
        let res = guard.authoritative();
        let flat = guard.slice(res);
        let lda = guard.rows();
        let n = self.sel.count();
        let mut data = Vec::with_capacity(self.row_count * n);
        for j in 0..n {
            let base = self.sel.physical(j) * lda + self.row_offset;
            data.extend_from_slice(&flat[base..base + self.row_count]);
        }
        (data, res)
    }

    /// Fresh constant-stride block holding a copy of the visible window.
    pub(crate) fn deep_copy(&self) -> MultiVec<T> {
        let (packed, _) = self.packed_local();
        let rows = self.row_count;
        let n = self.sel.count();
        let mut buf = DualBuffer::allocate(rows, n, false);
        buf.mark_modified(Residency::Device);
        buf.slice_mut(Residency::Device).copy_from_slice(&packed);
        MultiVec {
            buf: Arc::new(RwLock::new(buf)),
            row_offset: 0,
            row_count: rows,
            sel: ColSelection::full(n),
            map: self.map.clone(),
        }
    }

    /// Snapshot this block for reading while `writer` is being written.
    /// Falls back to a packed copy when the two share an allocation.
    pub(crate) fn read_cols(&self, writer: &MultiVec<T>) -> GuestView<'_, T> {
        if Arc::ptr_eq(&self.buf, &writer.buf) {
            self.read_cols_packed()
        } else {
            self.read_cols_guarded()
        }
    }

    /// Snapshot backed by a read guard on this block's allocation.
    pub(crate) fn read_cols_guarded(&self) -> GuestView<'_, T> {
        let guard = self.buf_read();
        let res = guard.authoritative();
        let lda = guard.rows();
        GuestView {
            res,
            rows: self.row_count,
            body: GuestBody::Guarded {
                guard,
                lda,
                row_offset: self.row_offset,
                sel: self.sel.clone(),
            },
        }
    }

    /// Snapshot backed by a packed copy; takes and releases the read lock.
    pub(crate) fn read_cols_packed(&self) -> GuestView<'_, T> {
        let (data, res) = self.packed_local();
        GuestView {
            res,
            rows: self.row_count,
            body: GuestBody::Packed(data),
        }
    }

    /// Run `f` over every selected column in the authoritative residency and
    /// mark that residency modified.
    pub(crate) fn mutate_cols(&mut self, mut f: impl FnMut(usize, &mut [T])) {
        let mut buf = self.buf_write();
        let r = buf.authoritative();
        buf.mark_modified(r);
        let lda = buf.rows();
        let flat = buf.slice_mut(r);
        for j in 0..self.sel.count() {
            let base = self.sel.physical(j) * lda + self.row_offset;
            f(j, &mut flat[base..base + self.row_count]);
        }
    }

    /// Run `f` over every selected column in residency `r`, syncing first.
    /// The modified mark covers the whole allocation, so `r` must be brought
    /// fully current before any column is written.
    pub(crate) fn mutate_cols_in(&mut self, r: Residency, mut f: impl FnMut(usize, &mut [T])) {
        let mut buf = self.buf_write();
        buf.sync(r);
        buf.mark_modified(r);
        let lda = buf.rows();
        let flat = buf.slice_mut(r);
        for j in 0..self.sel.count() {
            let base = self.sel.physical(j) * lda + self.row_offset;
            f(j, &mut flat[base..base + self.row_count]);
        }
    }

    /// Equal local row and column counts, or a `ShapeMismatch` naming `op`.
    pub(crate) fn check_same_shape(
        &self,
        op: &'static str,
        other: &MultiVec<T>,
    ) -> Result<(), MvError> {
        if self.row_count != other.row_count || self.sel.count() != other.sel.count() {
            return Err(MvError::ShapeMismatch {
                op,
                detail: format!(
                    "{} x {} here, {} x {} in the operand",
                    self.row_count,
                    self.sel.count(),
                    other.row_count,
                    other.sel.count()
                ),
            });
        }
        Ok(())
    }

    /// Set every entry of every selected column to `value`.
    pub fn put_scalar(&mut self, value: T) {
        self.mutate_cols(|_, col| col.fill(value));
    }

    /// In-place multiply by `alpha`. Exact no-op when `alpha == 1`; a zero
    /// `alpha` still multiplies, so NaN entries stay NaN.
    pub fn scale(&mut self, alpha: T) {
        if alpha == T::one() {
            return;
        }
        self.mutate_cols(|_, col| kernel::scale_in_place(col, alpha));
    }

    /// Per-column in-place scaling; `alphas` must hold one factor per
    /// column.
    pub fn scale_columns(&mut self, alphas: &[T]) -> Result<(), MvError> {
        if alphas.len() != self.sel.count() {
            return Err(MvError::InvalidArgument(format!(
                "scale_columns expects {} factor(s), got {}",
                self.sel.count(),
                alphas.len()
            )));
        }
        self.mutate_cols(|j, col| kernel::scale_in_place(col, alphas[j]));
        Ok(())
    }

    /// `self = alpha * a`.
    pub fn scale_from(&mut self, alpha: T, a: &MultiVec<T>) -> Result<(), MvError> {
        self.check_same_shape("scale_from", a)?;
        let g = a.read_cols(self);
        self.mutate_cols_in(g.residency(), |j, dst| kernel::scale_from(dst, alpha, g.col(j)));
        Ok(())
    }

    /// `self = alpha * a + beta * self`. A zero `beta` overwrites without
    /// reading `self`; a zero `alpha` leaves `a` untouched.
    pub fn update(&mut self, alpha: T, a: &MultiVec<T>, beta: T) -> Result<(), MvError> {
        self.check_same_shape("update", a)?;
        let g = a.read_cols(self);
        self.mutate_cols_in(g.residency(), |j, dst| {
            kernel::axpby(dst, alpha, g.col(j), beta)
        });
        Ok(())
    }

    /// `self = alpha * a + beta * b + gamma * self`, with the same
    /// zero-coefficient conventions as [`update`](Self::update).
    pub fn update2(
        &mut self,
        alpha: T,
        a: &MultiVec<T>,
        beta: T,
        b: &MultiVec<T>,
        gamma: T,
    ) -> Result<(), MvError> {
        self.check_same_shape("update", a)?;
        self.check_same_shape("update", b)?;
        // Pack b first when it shares an allocation with either other
        // operand; its lock is released again before a's guard is taken.
        let gb = if Arc::ptr_eq(&b.buf, &self.buf) || Arc::ptr_eq(&b.buf, &a.buf) {
            b.read_cols_packed()
        } else {
            b.read_cols_guarded()
        };
        let ga = a.read_cols(self);
        self.mutate_cols_in(ga.residency(), |j, dst| {
            kernel::lin_comb3(dst, alpha, ga.col(j), beta, gb.col(j), gamma)
        });
        Ok(())
    }

    /// `self = 1 / a` elementwise; zeros in `a` become IEEE infinities.
    pub fn reciprocal_of(&mut self, a: &MultiVec<T>) -> Result<(), MvError> {
        self.check_same_shape("reciprocal_of", a)?;
        let g = a.read_cols(self);
        self.mutate_cols_in(g.residency(), |j, dst| kernel::reciprocal_into(dst, g.col(j)));
        Ok(())
    }

    /// `self = |a|` elementwise.
    pub fn abs_of(&mut self, a: &MultiVec<T>) -> Result<(), MvError> {
        self.check_same_shape("abs_of", a)?;
        let g = a.read_cols(self);
        self.mutate_cols_in(g.residency(), |j, dst| kernel::abs_into(dst, g.col(j)));
        Ok(())
    }

    /// Deep value copy from `src`; shapes must match locally and globally.
    /// Executes in `src`'s authoritative residency and leaves both
    /// residencies of `self` in sync.
    pub fn assign(&mut self, src: &MultiVec<T>) -> Result<(), MvError> {
        self.check_same_shape("assign", src)?;
        if self.global_len() != src.global_len() {
            return Err(MvError::ShapeMismatch {
                op: "assign",
                detail: format!(
                    "global length {} here, {} in the source",
                    self.global_len(),
                    src.global_len()
                ),
            });
        }
        let g = src.read_cols(self);
        self.mutate_cols_in(g.residency(), |j, dst| dst.copy_from_slice(g.col(j)));
        drop(g);
        let mut buf = self.buf_write();
        let stale = buf.authoritative().other();
        buf.sync(stale);
        Ok(())
    }

    /// Rebind this block to a different map; constant-stride blocks only.
    ///
    /// With both maps present the local length must match and only the
    /// reference is swapped. Replacing a present map with `None` excludes
    /// this process: the block reallocates to zero rows, keeping its column
    /// count. Replacing `None` with a map reallocates to the new local
    /// length, zero-filled. `None` to `None` is ambiguous and rejected.
    pub fn replace_map(&mut self, new_map: Option<Arc<RowMap>>) -> Result<(), MvError> {
        if !self.sel.is_constant_stride() {
            return Err(MvError::NotConstantStride("replace_map"));
        }
        let cols = self.sel.count();
        match (self.map.is_some(), &new_map) {
            (true, Some(new)) => {
                if self.row_count != new.local_len() {
                    return Err(MvError::ShapeMismatch {
                        op: "replace_map",
                        detail: format!(
                            "{} local row(s) here, {} in the replacement",
                            self.row_count,
                            new.local_len()
                        ),
                    });
                }
            }
            (true, None) => {
                self.buf = Arc::new(RwLock::new(DualBuffer::allocate(0, cols, true)));
                self.row_offset = 0;
                self.row_count = 0;
                self.sel = ColSelection::full(cols);
            }
            (false, Some(new)) => {
                self.buf = Arc::new(RwLock::new(DualBuffer::allocate(
                    new.local_len(),
                    cols,
                    true,
                )));
                self.row_offset = 0;
                self.row_count = new.local_len();
                self.sel = ColSelection::full(cols);
            }
            (false, None) => return Err(MvError::AmbiguousMapReplacement),
        }
        self.map = new_map;
        Ok(())
    }

    fn with_entry(
        &mut self,
        row: usize,
        col: usize,
        f: impl FnOnce(&mut T),
    ) -> Result<(), MvError> {
        if row >= self.row_count {
            return Err(MvError::RowOutOfBounds {
                index: row,
                bound: self.row_count,
            });
        }
        if col >= self.sel.count() {
            return Err(MvError::ColumnOutOfBounds {
                index: col,
                bound: self.sel.count(),
            });
        }
        let mut buf = self.buf_write();
        let r = buf.authoritative();
        buf.mark_modified(r);
        let lda = buf.rows();
        let idx = self.sel.physical(col) * lda + self.row_offset + row;
        f(&mut buf.slice_mut(r)[idx]);
        Ok(())
    }

    /// Overwrite one locally indexed entry.
    pub fn replace_local(&mut self, row: usize, col: usize, value: T) -> Result<(), MvError> {
        self.with_entry(row, col, |e| *e = value)
    }

    /// Add into one locally indexed entry.
    pub fn sum_into_local(&mut self, row: usize, col: usize, value: T) -> Result<(), MvError> {
        self.with_entry(row, col, |e| *e = *e + value)
    }

    fn owned_local_row(&self, global_row: u64) -> Result<usize, MvError> {
        self.map
            .as_ref()
            .and_then(|m| m.local_index(global_row))
            .ok_or(MvError::NotLocallyOwned(global_row))
    }

    /// Overwrite one globally indexed entry; the row must be owned here.
    pub fn replace_global(&mut self, global_row: u64, col: usize, value: T) -> Result<(), MvError> {
        let row = self.owned_local_row(global_row)?;
        self.with_entry(row, col, |e| *e = value)
    }

    /// Add into one globally indexed entry; the row must be owned here.
    pub fn sum_into_global(&mut self, global_row: u64, col: usize, value: T) -> Result<(), MvError> {
        let row = self.owned_local_row(global_row)?;
        self.with_entry(row, col, |e| *e = *e + value)
    }

    /// Bring residency `target` up to date with the authoritative one.
    pub fn sync(&self, target: Residency) {
        self.buf_write().sync(target);
    }

    /// Whether `target` is stale relative to the other residency.
    pub fn needs_sync(&self, target: Residency) -> bool {
        self.buf_read().needs_sync(target)
    }

    /// Declare that residency `r` is about to be written directly.
    pub fn mark_modified(&mut self, r: Residency) {
        self.buf_write().mark_modified(r);
    }
}

impl<T: Float + SampleUniform> MultiVec<T> {
    /// Pseudorandom fill over `[-1, 1]`; no communication, streams
    /// decorrelated across ranks.
    pub fn randomize(&mut self) {
        self.randomize_range(-T::one(), T::one());
    }

    /// Pseudorandom fill over `[lo, hi]`.
    pub fn randomize_range(&mut self, lo: T, hi: T) {
        let rank = self
            .map
            .as_ref()
            .and_then(|m| m.comm())
            .map(|c| c.rank())
            .unwrap_or(0);
        // Fold the rank into the seed so processes sharing an entropy
        // source still draw distinct streams.
        let seed = rand::random::<u64>() ^ (rank as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let mut rng = SmallRng::seed_from_u64(seed);
        self.mutate_cols(|_, col| kernel::fill_random(col, &mut rng, lo, hi));
    }
}

impl<T: Float> Default for MultiVec<T> {
    fn default() -> Self {
        MultiVec::new()
    }
}
