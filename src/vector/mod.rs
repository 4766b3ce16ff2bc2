//! The distributed block vector and everything that hangs off it: column
//! selection, sub-views, reductions, the dense multiply, and import/export
//! combining.

pub mod multi_vec;
pub mod multiply;
pub mod reduce;
pub mod selection;
pub mod transfer;
pub mod views;

pub use multi_vec::MultiVec;
pub use multiply::Transpose;
pub use selection::ColSelection;
pub use transfer::CombineMode;
pub use views::{BlockRead, BlockWrite, HostSlice, HostSliceMut};

/// How a block constructed from another block relates to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccess {
    /// Deep copy; the two blocks share nothing afterwards.
    Copy,
    /// Shared storage; writes through either block are visible to both.
    View,
}
