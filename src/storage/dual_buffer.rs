//! A 2-D column-major allocation kept in two memory residencies.
//!
//! The buffer holds a device copy and a host copy of the same `rows x cols`
//! data and tracks which side was written most recently with a three-state
//! machine: `InSync`, `DeviceNewer`, `HostNewer`. `mark_modified` and `sync`
//! are the only operations that move the state. Readers use whichever side
//! they need after ensuring a sync; writers declare their intent with
//! `mark_modified` before touching a slice.
//!
//! The allocated row count doubles as the column stride (leading dimension):
//! entry `(i, j)` of either residency lives at flat index `j * rows + i`.
//! Row windows and column selections are layered on top by the vector block;
//! the buffer itself stays a dumb rectangle.

use num_traits::Float;

use crate::error::MvError;

/// One of the two memory spaces a buffer copy can live in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Residency {
    Device,
    Host,
}

impl Residency {
    pub fn other(self) -> Residency {
        match self {
            Residency::Device => Residency::Host,
            Residency::Host => Residency::Device,
        }
    }
}

/// Coherence state of the two residencies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Both sides hold the same data. The device side is treated as
    /// authoritative by convention, so a fresh buffer never forces a copy.
    InSync,
    DeviceNewer,
    HostNewer,
}

#[derive(Debug)]
pub struct DualBuffer<T> {
    /// Allocated rows; also the column stride.
    rows: usize,
    cols: usize,
    dev: Vec<T>,
    host: Vec<T>,
    state: SyncState,
}

impl<T> DualBuffer<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

impl<T: Float> DualBuffer<T> {
    /// Allocate a `rows x cols` buffer. With `zero_fill` both sides are
    /// zeroed; otherwise the contents are unspecified (checked builds fill
    /// with NaN so use-before-init surfaces in results).
    pub fn allocate(rows: usize, cols: usize, zero_fill: bool) -> Self {
        let fill = if zero_fill { T::zero() } else { Self::uninit_fill() };
        let n = rows * cols;
        DualBuffer {
            rows,
            cols,
            dev: vec![fill; n],
            host: vec![fill; n],
            state: SyncState::InSync,
        }
    }

    #[cfg(any(debug_assertions, feature = "strict-invariants"))]
    fn uninit_fill() -> T {
        T::nan()
    }

    #[cfg(not(any(debug_assertions, feature = "strict-invariants")))]
    fn uninit_fill() -> T {
        T::zero()
    }

    /// Wrap caller data as the device copy of a `rows x cols` buffer. The
    /// host side starts stale (`DeviceNewer`).
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self, MvError> {
        if data.len() != rows * cols {
            return Err(MvError::InvalidArgument(format!(
                "buffer of length {} cannot hold {} x {} column-major data",
                data.len(),
                rows,
                cols
            )));
        }
        let host = vec![T::zero(); data.len()];
        Ok(DualBuffer {
            rows,
            cols,
            dev: data,
            host,
            state: SyncState::DeviceNewer,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// The residency holding the newest data; `Device` when in sync.
    pub fn authoritative(&self) -> Residency {
        match self.state {
            SyncState::HostNewer => Residency::Host,
            SyncState::InSync | SyncState::DeviceNewer => Residency::Device,
        }
    }

    /// True when `target` is stale relative to the other residency.
    pub fn needs_sync(&self, target: Residency) -> bool {
        matches!(
            (self.state, target),
            (SyncState::DeviceNewer, Residency::Host) | (SyncState::HostNewer, Residency::Device)
        )
    }

    /// Record that `r` now holds the newest data. Marking one side while the
    /// other is already newer loses that side's updates; checked builds
    /// treat it as a protocol violation.
    pub fn mark_modified(&mut self, r: Residency) {
        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        {
            let conflict = matches!(
                (self.state, r),
                (SyncState::DeviceNewer, Residency::Host)
                    | (SyncState::HostNewer, Residency::Device)
            );
            assert!(
                !conflict,
                "mark_modified({r:?}) while the other residency holds newer data; sync first"
            );
        }
        self.state = match r {
            Residency::Device => SyncState::DeviceNewer,
            Residency::Host => SyncState::HostNewer,
        };
    }

    /// Copy the authoritative residency into `target` if it is stale.
    /// Idempotent; afterwards both sides agree.
    pub fn sync(&mut self, target: Residency) {
        if !self.needs_sync(target) {
            return;
        }
        match target {
            Residency::Host => self.host.copy_from_slice(&self.dev),
            Residency::Device => self.dev.copy_from_slice(&self.host),
        }
        self.state = SyncState::InSync;
    }

    /// Flat column-major data of one residency. Reading fresh data requires
    /// a prior `sync` unless `r` is authoritative.
    pub fn slice(&self, r: Residency) -> &[T] {
        match r {
            Residency::Device => &self.dev,
            Residency::Host => &self.host,
        }
    }

    /// Mutable counterpart of [`slice`](Self::slice); callers must have
    /// declared `mark_modified(r)` first.
    pub fn slice_mut(&mut self, r: Residency) -> &mut [T] {
        match r {
            Residency::Device => &mut self.dev,
            Residency::Host => &mut self.host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_zeroed_starts_in_sync() {
        let buf = DualBuffer::<f64>::allocate(3, 2, true);
        assert_eq!(buf.state(), SyncState::InSync);
        assert_eq!(buf.authoritative(), Residency::Device);
        assert!(!buf.needs_sync(Residency::Host));
        assert!(!buf.needs_sync(Residency::Device));
        assert!(buf.slice(Residency::Device).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn from_vec_leaves_host_stale() {
        let buf = DualBuffer::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        assert_eq!(buf.state(), SyncState::DeviceNewer);
        assert!(buf.needs_sync(Residency::Host));
        assert!(!buf.needs_sync(Residency::Device));
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = DualBuffer::from_vec(vec![1.0f64; 5], 2, 2).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn sync_copies_authoritative_side() {
        let mut buf = DualBuffer::<f64>::allocate(2, 1, true);
        buf.mark_modified(Residency::Host);
        buf.slice_mut(Residency::Host).copy_from_slice(&[5.0, 6.0]);
        assert_eq!(buf.authoritative(), Residency::Host);
        buf.sync(Residency::Device);
        assert_eq!(buf.state(), SyncState::InSync);
        assert_eq!(buf.slice(Residency::Device), &[5.0, 6.0]);
        // Idempotent.
        buf.sync(Residency::Device);
        assert_eq!(buf.slice(Residency::Device), &[5.0, 6.0]);
    }

    #[test]
    fn write_after_sync_flips_authority() {
        let mut buf = DualBuffer::<f64>::allocate(2, 1, true);
        buf.mark_modified(Residency::Device);
        buf.slice_mut(Residency::Device).copy_from_slice(&[1.0, 2.0]);
        buf.sync(Residency::Host);
        buf.mark_modified(Residency::Host);
        buf.slice_mut(Residency::Host).copy_from_slice(&[3.0, 4.0]);
        buf.sync(Residency::Device);
        assert_eq!(buf.slice(Residency::Device), &[3.0, 4.0]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "sync first")]
    fn conflicting_mark_is_caught_in_checked_builds() {
        let mut buf = DualBuffer::<f64>::allocate(2, 1, true);
        buf.mark_modified(Residency::Device);
        buf.mark_modified(Residency::Host);
    }
}
