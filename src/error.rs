use thiserror::Error;

// Unified error type for multivec.

/// Coarse classification of [`MvError`] variants.
///
/// `InvalidArgument` marks self-inconsistent caller input, `Runtime` marks a
/// precondition failing against actual distributed state, and `Logic` marks
/// an internal invariant violation, i.e. a bug in this crate rather than
/// caller misuse.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Runtime,
    Logic,
}

#[derive(Error, Debug)]
pub enum MvError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("leading dimension {lda} smaller than local row count {rows}")]
    BadLeadingDim { lda: usize, rows: usize },
    #[error("array of length {len} too short for stride {lda}, {cols} column(s), {rows} local row(s)")]
    ShortArray {
        len: usize,
        lda: usize,
        rows: usize,
        cols: usize,
    },
    #[error("column index {index} out of bounds for {bound} column(s)")]
    ColumnOutOfBounds { index: usize, bound: usize },
    #[error("local row {index} out of bounds for {bound} local row(s)")]
    RowOutOfBounds { index: usize, bound: usize },
    #[error("global row {0} is not owned by this process")]
    NotLocallyOwned(u64),
    #[error("{0} requires a constant-stride block")]
    NotConstantStride(&'static str),
    #[error("row window [{offset}, {end}) exceeds the original allocation of {alloc} row(s)")]
    RowWindowOutOfBounds {
        offset: usize,
        end: usize,
        alloc: usize,
    },
    #[error("shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },
    #[error("unsupported multiply case: {0}")]
    UnsupportedMultiply(String),
    #[error("replacing a null map with a null map is ambiguous")]
    AmbiguousMapReplacement,
    #[error("{0} requires a locally replicated block, but the map is distributed")]
    NotReplicated(&'static str),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl MvError {
    /// The taxonomy class this variant belongs to.
    pub fn kind(&self) -> ErrorKind {
        use MvError::*;
        match self {
            InvalidArgument(_)
            | BadLeadingDim { .. }
            | ShortArray { .. }
            | ColumnOutOfBounds { .. }
            | RowOutOfBounds { .. }
            | ShapeMismatch { .. } => ErrorKind::InvalidArgument,
            NotLocallyOwned(_)
            | NotConstantStride(_)
            | RowWindowOutOfBounds { .. }
            | UnsupportedMultiply(_)
            | AmbiguousMapReplacement
            | NotReplicated(_) => ErrorKind::Runtime,
            Internal(_) => ErrorKind::Logic,
        }
    }
}
