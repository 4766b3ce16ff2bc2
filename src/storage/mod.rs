//! Dual-residency storage for dense column-major data.

pub mod dual_buffer;
pub use dual_buffer::{DualBuffer, Residency, SyncState};
