//! Configuration types: reporting verbosity and related options.

pub mod options;
pub use options::ReportFields;
