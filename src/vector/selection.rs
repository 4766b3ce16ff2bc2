//! Column selection for a block over a shared allocation.
//!
//! A block sees either a contiguous run of columns at the allocation's
//! stride, or an arbitrary list of physical column indices. The contiguous
//! case is the fast path everywhere: 1-D host access, flat copies, and the
//! map-replacement realloc all require it.

use crate::error::MvError;

/// Invalid-column sentinel rejected during validation.
pub const INVALID_COL: usize = usize::MAX;

/// Which physical columns of the allocation a block exposes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColSelection {
    /// Columns `origin .. origin + count`, contiguous in the allocation.
    ConstantStride { origin: usize, count: usize },
    /// Explicit physical column per logical column; duplicates allowed.
    ExplicitList(Vec<usize>),
}

impl ColSelection {
    /// All columns of an allocation that is `count` columns wide.
    pub fn full(count: usize) -> Self {
        ColSelection::ConstantStride { origin: 0, count }
    }

    /// Build a selection from an explicit list, validating each entry
    /// against the allocation width. A single-entry list collapses to the
    /// contiguous form. Bound checks are skipped when the allocation has no
    /// columns at all, so an empty block can still carry a nominal
    /// selection.
    pub fn from_list(cols: &[usize], alloc_cols: usize) -> Result<Self, MvError> {
        for &c in cols {
            if c == INVALID_COL {
                return Err(MvError::InvalidArgument(format!(
                    "column list contains the invalid sentinel {INVALID_COL}"
                )));
            }
            if alloc_cols > 0 && c >= alloc_cols {
                return Err(MvError::ColumnOutOfBounds {
                    index: c,
                    bound: alloc_cols,
                });
            }
        }
        if cols.len() == 1 {
            return Ok(ColSelection::ConstantStride {
                origin: cols[0],
                count: 1,
            });
        }
        Ok(ColSelection::ExplicitList(cols.to_vec()))
    }

    /// Number of logical columns the selection exposes.
    pub fn count(&self) -> usize {
        match self {
            ColSelection::ConstantStride { count, .. } => *count,
            ColSelection::ExplicitList(v) => v.len(),
        }
    }

    /// Whether logical columns are contiguous in the allocation.
    pub fn is_constant_stride(&self) -> bool {
        matches!(self, ColSelection::ConstantStride { .. })
    }

    /// Physical column behind logical column `j`. Callers bound-check `j`
    /// against [`count`](Self::count) first.
    pub fn physical(&self, j: usize) -> usize {
        match self {
            ColSelection::ConstantStride { origin, .. } => origin + j,
            ColSelection::ExplicitList(v) => v[j],
        }
    }

    /// Selection for logical columns `lo .. hi` of this one. An empty range
    /// yields a zero-column contiguous selection anchored at the (clamped)
    /// start, so the result never degrades to an explicit list.
    pub fn narrow_range(&self, lo: usize, hi: usize) -> Self {
        if hi <= lo {
            let origin = match self {
                ColSelection::ConstantStride { origin, count } => origin + lo.min(*count),
                ColSelection::ExplicitList(v) => {
                    if lo < v.len() {
                        v[lo]
                    } else {
                        v.last().map(|&c| c + 1).unwrap_or(0)
                    }
                }
            };
            return ColSelection::ConstantStride { origin, count: 0 };
        }
        match self {
            ColSelection::ConstantStride { origin, .. } => ColSelection::ConstantStride {
                origin: origin + lo,
                count: hi - lo,
            },
            ColSelection::ExplicitList(v) => {
                if hi - lo == 1 {
                    ColSelection::ConstantStride {
                        origin: v[lo],
                        count: 1,
                    }
                } else {
                    ColSelection::ExplicitList(v[lo..hi].to_vec())
                }
            }
        }
    }

    /// Selection for the listed logical columns of this one, re-validated
    /// against this selection's own width.
    pub fn narrow_list(&self, cols: &[usize]) -> Result<Self, MvError> {
        let n = self.count();
        for &c in cols {
            if c >= n {
                return Err(MvError::ColumnOutOfBounds { index: c, bound: n });
            }
        }
        let physical: Vec<usize> = cols.iter().map(|&c| self.physical(c)).collect();
        if physical.len() == 1 {
            return Ok(ColSelection::ConstantStride {
                origin: physical[0],
                count: 1,
            });
        }
        // A list that happens to be contiguous and ascending stays a list;
        // only the single-column case collapses.
        Ok(ColSelection::ExplicitList(physical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entry_list_collapses() {
        let s = ColSelection::from_list(&[3], 8).unwrap();
        assert!(s.is_constant_stride());
        assert_eq!(s.count(), 1);
        assert_eq!(s.physical(0), 3);
    }

    #[test]
    fn sentinel_and_bounds_rejected() {
        assert!(ColSelection::from_list(&[INVALID_COL], 4).is_err());
        assert!(ColSelection::from_list(&[0, 4], 4).is_err());
        // Zero-width allocation skips the bound check entirely.
        assert!(ColSelection::from_list(&[7, 9], 0).is_ok());
    }

    #[test]
    fn narrow_range_keeps_stride() {
        let s = ColSelection::full(6).narrow_range(2, 5);
        assert_eq!(
            s,
            ColSelection::ConstantStride {
                origin: 2,
                count: 3
            }
        );
        let empty = ColSelection::full(6).narrow_range(4, 4);
        assert!(empty.is_constant_stride());
        assert_eq!(empty.count(), 0);
    }

    #[test]
    fn narrow_list_maps_through() {
        let s = ColSelection::from_list(&[5, 1, 3], 8).unwrap();
        let t = s.narrow_list(&[2, 0]).unwrap();
        assert_eq!(t, ColSelection::ExplicitList(vec![3, 5]));
        assert!(s.narrow_list(&[3]).is_err());
    }
}
