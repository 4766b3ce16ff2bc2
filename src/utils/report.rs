//! Human-readable reports on block vectors.
//!
//! `description` gives a one-line summary; `describe` expands it according
//! to the requested [`ReportFields`]; `describe_all` prints every rank's
//! report in rank order when a communicator is attached.

use std::fmt::{self, Write as _};

use num_traits::Float;

use crate::config::ReportFields;
use crate::parallel::Comm;
use crate::storage::Residency;
use crate::vector::MultiVec;

impl<T: Float + fmt::Display> MultiVec<T> {
    /// One-line summary of shape and stride.
    pub fn description(&self) -> String {
        format!(
            "MultiVec {{global rows: {}, local rows: {}, columns: {}, constant stride: {}}}",
            self.global_len(),
            self.local_len(),
            self.num_vectors(),
            self.is_constant_stride(),
        )
    }

    /// Multi-line report over this rank's portion of the block.
    pub fn describe(&self, fields: ReportFields) -> String {
        let mut s = String::new();
        if fields.contains(ReportFields::SHAPE) {
            let _ = writeln!(s, "{}", self.description());
        }
        if fields.contains(ReportFields::DISTRIBUTION) {
            match self.map() {
                Some(map) => {
                    let _ = writeln!(
                        s,
                        "distribution: {} ({} of {} rows here)",
                        if map.is_distributed() { "distributed" } else { "replicated" },
                        map.local_len(),
                        map.global_len(),
                    );
                    if let Some(c) = map.comm() {
                        let _ = writeln!(s, "communicator: rank {} of {}", c.rank(), c.size());
                    }
                }
                None => {
                    let _ = writeln!(s, "distribution: no row map");
                }
            }
        }
        if fields.contains(ReportFields::RESIDENCY) {
            let buf = self.buf_read();
            let _ = writeln!(
                s,
                "residency: {:?} (host stale: {}, device stale: {})",
                buf.state(),
                buf.needs_sync(Residency::Host),
                buf.needs_sync(Residency::Device),
            );
        }
        if fields.contains(ReportFields::VALUES) {
            let guest = self.read_cols_guarded();
            let rows = self.local_len();
            let cols = self.num_vectors();
            for i in 0..rows {
                for j in 0..cols {
                    if j > 0 {
                        let _ = write!(s, "  ");
                    }
                    let _ = write!(s, "{}", guest.col(j)[i]);
                }
                let _ = writeln!(s);
            }
        }
        s
    }

    /// Print `describe` output on every rank, one rank at a time.
    pub fn describe_all(&self, fields: ReportFields) {
        let report = self.describe(fields);
        match self.map().and_then(|m| m.comm()) {
            Some(c) => {
                for r in 0..c.size() {
                    if r == c.rank() {
                        print!("{report}");
                    }
                    c.barrier();
                }
            }
            None => print!("{report}"),
        }
    }
}

impl<T: Float + fmt::Display> fmt::Display for MultiVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
