//! Row distribution maps: local/global row counts, contiguous index
//! translation, and the communicator handle owned by each distribution.

pub mod row_map;
pub use row_map::RowMap;
