//! Local dense kernels consumed by the vector block.
//!
//! Everything here operates on flat column-major slices (or on `faer::Mat`
//! temporaries for the matrix product) and knows nothing about maps,
//! residencies, or communicators.

pub mod dense;
pub use dense::*;
