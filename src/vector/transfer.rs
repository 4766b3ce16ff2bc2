//! Hooks for a redistribution driver: same-row copy with permutation,
//! packing rows into a wire buffer, and unpacking with a combine rule.
//!
//! The driver decides *which* rows move between processes; these methods
//! only move values. Packets are row-major: all selected columns of the
//! first row, then all columns of the next, so a receiver can unpack
//! without knowing the sender's column stride. Every index list is
//! validated before the first write.

use num_traits::Float;

use crate::error::MvError;
use crate::vector::multi_vec::MultiVec;

/// How an incoming packet value combines with the entry already present.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CombineMode {
    /// Overwrite with the incoming value.
    Insert,
    /// Overwrite with the incoming value (no distinction from `Insert` for
    /// dense data; both exist so callers can state intent).
    Replace,
    /// Add the incoming value onto the entry.
    Add,
    /// Keep whichever of entry and incoming value has the larger
    /// magnitude.
    AbsMax,
    /// Ignore the packet entirely.
    Zero,
}

impl<T: Float> MultiVec<T> {
    /// Copy the first `num_same_rows` rows of every selected column from
    /// `src`, then copy `src` row `permute_from[k]` into row
    /// `permute_to[k]` for each pair. Column counts must match; the index
    /// lists must have equal length and stay within each side's local
    /// rows.
    pub fn copy_and_permute(
        &mut self,
        src: &MultiVec<T>,
        num_same_rows: usize,
        permute_to: &[usize],
        permute_from: &[usize],
    ) -> Result<(), MvError> {
        if self.num_vectors() != src.num_vectors() {
            return Err(MvError::ShapeMismatch {
                op: "copy_and_permute",
                detail: format!(
                    "{} column(s) here, {} in the source",
                    self.num_vectors(),
                    src.num_vectors()
                ),
            });
        }
        if permute_to.len() != permute_from.len() {
            return Err(MvError::InvalidArgument(format!(
                "permutation lists differ in length: {} destinations, {} sources",
                permute_to.len(),
                permute_from.len()
            )));
        }
        if num_same_rows > self.local_len() || num_same_rows > src.local_len() {
            return Err(MvError::InvalidArgument(format!(
                "cannot copy {} same row(s) between blocks of {} and {} local row(s)",
                num_same_rows,
                src.local_len(),
                self.local_len()
            )));
        }
        for &to in permute_to {
            if to >= self.local_len() {
                return Err(MvError::RowOutOfBounds {
                    index: to,
                    bound: self.local_len(),
                });
            }
        }
        for &from in permute_from {
            if from >= src.local_len() {
                return Err(MvError::RowOutOfBounds {
                    index: from,
                    bound: src.local_len(),
                });
            }
        }
        let g = src.read_cols(self);
        self.mutate_cols_in(g.residency(), |j, dst| {
            let s = g.col(j);
            dst[..num_same_rows].copy_from_slice(&s[..num_same_rows]);
            for (&to, &from) in permute_to.iter().zip(permute_from) {
                dst[to] = s[from];
            }
        });
        Ok(())
    }

    /// Pack the listed local rows into `out`, row-major over the selected
    /// columns, reading the authoritative residency. `out` is cleared
    /// first.
    pub fn pack(&self, export_rows: &[usize], out: &mut Vec<T>) -> Result<(), MvError> {
        for &r in export_rows {
            if r >= self.local_len() {
                return Err(MvError::RowOutOfBounds {
                    index: r,
                    bound: self.local_len(),
                });
            }
        }
        let n = self.num_vectors();
        out.clear();
        out.reserve(export_rows.len() * n);
        let g = self.read_cols_guarded();
        for &r in export_rows {
            for j in 0..n {
                out.push(g.col(j)[r]);
            }
        }
        Ok(())
    }

    /// Apply a packet produced by [`pack`](Self::pack) on the sending side
    /// to the listed local rows, combining with `mode`.
    pub fn unpack_and_combine(
        &mut self,
        import_rows: &[usize],
        packet: &[T],
        mode: CombineMode,
    ) -> Result<(), MvError> {
        for &r in import_rows {
            if r >= self.local_len() {
                return Err(MvError::RowOutOfBounds {
                    index: r,
                    bound: self.local_len(),
                });
            }
        }
        let n = self.num_vectors();
        let need = import_rows.len() * n;
        if packet.len() < need {
            return Err(MvError::InvalidArgument(format!(
                "packet holds {} value(s); {} import row(s) x {} column(s) need {}",
                packet.len(),
                import_rows.len(),
                n,
                need
            )));
        }
        if mode == CombineMode::Zero {
            return Ok(());
        }
        self.mutate_cols(|j, dst| {
            for (k, &r) in import_rows.iter().enumerate() {
                let v = packet[k * n + j];
                dst[r] = match mode {
                    CombineMode::Insert | CombineMode::Replace => v,
                    CombineMode::Add => dst[r] + v,
                    CombineMode::AbsMax => {
                        if v.abs() > dst[r].abs() {
                            v
                        } else {
                            dst[r]
                        }
                    }
                    CombineMode::Zero => dst[r],
                };
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::RowMap;
    use crate::parallel::UniverseComm;
    use std::sync::Arc;

    fn block(data: &[f64], rows: usize, cols: usize) -> MultiVec<f64> {
        let map = Arc::new(RowMap::contiguous(rows, Arc::new(UniverseComm::local())));
        MultiVec::from_flat_copy(map, data, rows, cols).unwrap()
    }

    #[test]
    fn packets_are_row_major() {
        let x = block(&[1.0, 2.0, 3.0, 10.0, 20.0, 30.0], 3, 2);
        let mut out = Vec::new();
        x.pack(&[2, 0], &mut out).unwrap();
        assert_eq!(out, vec![3.0, 30.0, 1.0, 10.0]);
    }

    #[test]
    fn permutation_lists_are_validated_before_any_write() {
        let src = block(&[1.0, 2.0, 3.0], 3, 1);
        let mut dst = block(&[9.0, 9.0, 9.0], 3, 1);
        let err = dst.copy_and_permute(&src, 1, &[0, 1], &[2]).unwrap_err();
        assert!(matches!(err, MvError::InvalidArgument(_)));
        let err = dst.copy_and_permute(&src, 1, &[5], &[2]).unwrap_err();
        assert!(matches!(err, MvError::RowOutOfBounds { index: 5, .. }));
        // Nothing was written by the failed calls.
        assert_eq!(dst.read_cols_guarded().col(0), &[9.0, 9.0, 9.0]);
        dst.copy_and_permute(&src, 1, &[2], &[1]).unwrap();
        assert_eq!(dst.read_cols_guarded().col(0), &[1.0, 9.0, 2.0]);
    }

    #[test]
    fn combine_modes() {
        let packet = vec![5.0, -2.0];
        let base = block(&[1.0, -4.0, 3.0], 3, 1);

        let mut x = MultiVec::from_block(&base, crate::vector::DataAccess::Copy);
        x.unpack_and_combine(&[0, 1], &packet, CombineMode::Insert)
            .unwrap();
        assert_eq!(x.read_cols_guarded().col(0), &[5.0, -2.0, 3.0]);

        let mut x = MultiVec::from_block(&base, crate::vector::DataAccess::Copy);
        x.unpack_and_combine(&[0, 1], &packet, CombineMode::Add)
            .unwrap();
        assert_eq!(x.read_cols_guarded().col(0), &[6.0, -6.0, 3.0]);

        let mut x = MultiVec::from_block(&base, crate::vector::DataAccess::Copy);
        x.unpack_and_combine(&[0, 1], &packet, CombineMode::AbsMax)
            .unwrap();
        assert_eq!(x.read_cols_guarded().col(0), &[5.0, -4.0, 3.0]);

        let mut x = MultiVec::from_block(&base, crate::vector::DataAccess::Copy);
        x.unpack_and_combine(&[0, 1], &packet, CombineMode::Zero)
            .unwrap();
        assert_eq!(x.read_cols_guarded().col(0), &[1.0, -4.0, 3.0]);
    }

    #[test]
    fn short_packets_are_rejected() {
        let mut x = block(&[0.0; 4], 2, 2);
        let err = x
            .unpack_and_combine(&[0, 1], &[1.0, 2.0, 3.0], CombineMode::Insert)
            .unwrap_err();
        assert!(matches!(err, MvError::InvalidArgument(_)));
    }
}
