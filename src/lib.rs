//! multivec: Tpetra-style distributed block vectors over Faer
//!
//! This crate provides a column-oriented block of row-distributed dense vectors
//! with dual host/device residency tracking, zero-copy column and row sub-views,
//! two-phase collective reductions, and a constrained dense matrix product, with
//! support for shared and distributed memory parallelism.

pub mod parallel;

pub mod config;
pub mod error;
pub mod kernel;
pub mod map;
pub mod storage;
pub mod utils;
pub mod vector;

// Re-exports for convenience
pub use config::*;
pub use error::*;
pub use map::*;
pub use storage::*;
pub use vector::*;

// Re-export the communicator handle at the crate root for convenience
pub use parallel::{Comm, UniverseComm};
