//! Contiguous row maps.
//!
//! A `RowMap` describes how the rows of a vector block are divided among the
//! processes of a communicator: how many rows this process owns, how many
//! exist globally, and where this process's contiguous slice starts in the
//! global numbering. Maps are immutable once built and shared by `Arc`; a
//! block excluded from its communicator carries no map at all (`Option::None`
//! on the block, not a map state).

use std::fmt;
use std::sync::Arc;

use crate::parallel::{Comm, UniverseComm};

pub struct RowMap {
    local_count: usize,
    global_count: u64,
    /// First global row index owned by this process.
    index_base: u64,
    distributed: bool,
    comm: Option<Arc<UniverseComm>>,
}

impl RowMap {
    /// A map where every process holds all `n` rows. Not distributed: no
    /// collective communication is needed to reduce over it, though the
    /// communicator is kept for operations that explicitly combine
    /// replicated data across processes.
    pub fn replicated(n: usize, comm: Option<Arc<UniverseComm>>) -> Self {
        RowMap {
            local_count: n,
            global_count: n as u64,
            index_base: 0,
            distributed: false,
            comm,
        }
    }

    /// A map assigning `local` contiguous rows to this process, stacked in
    /// rank order. The global count and this process's offset are derived
    /// from the communicator with an all-reduce and an inclusive scan, so
    /// this constructor is itself collective.
    pub fn contiguous(local: usize, comm: Arc<UniverseComm>) -> Self {
        let scan = comm.scan_sum(local as u64);
        let index_base = scan - local as u64;
        // Row counts are far below 2^53, so the f64 wire sum is exact.
        let global_count = comm.all_reduce_sum(local as f64) as u64;
        RowMap {
            local_count: local,
            global_count,
            index_base,
            distributed: global_count != local as u64,
            comm: Some(comm),
        }
    }

    /// Fully explicit layout, for callers that already know the
    /// decomposition (and for tests that exercise distributed code paths on
    /// a single process).
    pub fn new(
        local: usize,
        global: u64,
        index_base: u64,
        distributed: bool,
        comm: Option<Arc<UniverseComm>>,
    ) -> Self {
        RowMap {
            local_count: local,
            global_count: global,
            index_base,
            distributed,
            comm,
        }
    }

    pub fn local_len(&self) -> usize {
        self.local_count
    }

    pub fn global_len(&self) -> u64 {
        self.global_count
    }

    /// True when the rows are split across more than one process. A
    /// replicated map is never distributed, regardless of communicator size.
    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    pub fn comm(&self) -> Option<&Arc<UniverseComm>> {
        self.comm.as_ref()
    }

    /// Global index of a locally owned row, or `None` when out of range.
    pub fn global_index(&self, local: usize) -> Option<u64> {
        if local < self.local_count {
            Some(self.index_base + local as u64)
        } else {
            None
        }
    }

    /// Local index of a global row, or `None` when this process does not
    /// own it.
    pub fn local_index(&self, global: u64) -> Option<usize> {
        if global >= self.index_base && global < self.index_base + self.local_count as u64 {
            Some((global - self.index_base) as usize)
        } else {
            None
        }
    }
}

impl fmt::Debug for RowMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowMap")
            .field("local_count", &self.local_count)
            .field("global_count", &self.global_count)
            .field("index_base", &self.index_base)
            .field("distributed", &self.distributed)
            .field("comm", &self.comm.is_some())
            .finish()
    }
}
