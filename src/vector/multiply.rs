//! The constrained dense matrix product and the broadcast elementwise
//! product.
//!
//! `multiply` interprets three blocks as dense matrices and computes
//! `C = alpha * op(A) * op(B) + beta * C` for exactly three
//! distribution/transpose combinations; everything else is rejected before
//! any work happens. Operands are always gathered (transpose applied) into
//! dense temporaries for the kernel, which keeps the product correct when
//! `C` shares an allocation with `A` or `B` and makes explicit column lists
//! a non-issue; the result is scattered back into `C`'s selected window.

use std::sync::Arc;

use faer::Mat;
use num_traits::{Float, FromPrimitive};

use crate::error::MvError;
use crate::kernel;
use crate::parallel::Comm;
use crate::vector::multi_vec::MultiVec;

/// Whether an operand of [`MultiVec::multiply`] enters the product
/// transposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum MulKind {
    /// All three blocks replicated: one local product.
    Local,
    /// Replicated C from transposed-A times B, both distributed: local
    /// partial products summed across processes afterwards.
    TransposeReduce,
    /// Distributed C and A, replicated B: each process computes its own row
    /// block independently.
    RowBlock,
}

/// The `beta` each process feeds its local product when the partials are
/// summed afterwards: exactly one process may carry the true `beta * C`
/// term into the sum, or it would be counted once per participant.
pub(crate) fn local_beta<T: Float>(rank: usize, beta: T) -> T {
    if rank == 0 { beta } else { T::zero() }
}

impl<T: Float> MultiVec<T> {
    /// The visible window as a dense matrix, optionally transposed, read
    /// from the authoritative residency.
    fn gather_mat(&self, transpose: bool) -> Mat<T> {
        let guard = self.buf_read();
        let flat = guard.slice(guard.authoritative());
        kernel::gather(
            flat,
            guard.rows(),
            self.row_offset,
            self.row_count,
            self.sel.count(),
            |j| self.sel.physical(j),
            transpose,
        )
    }
}

impl<T: Float + FromPrimitive + Send + Sync> MultiVec<T> {
    /// `self = alpha * op(A) * op(B) + beta * self`, treating the blocks as
    /// dense matrices.
    ///
    /// Supported distribution/transpose combinations:
    /// - all three replicated, any transposes: local product;
    /// - `self` replicated, A distributed and transposed, B distributed
    ///   untransposed: partial products summed across processes, with
    ///   `beta` zeroed away from rank 0 so the `beta * self` term enters
    ///   the sum exactly once;
    /// - `self` and A distributed (A untransposed), B replicated: each
    ///   process computes its own row block, no communication.
    ///
    /// Anything else is rejected with `UnsupportedMultiply` before any
    /// collective is entered.
    pub fn multiply(
        &mut self,
        trans_a: Transpose,
        trans_b: Transpose,
        alpha: T,
        a: &MultiVec<T>,
        b: &MultiVec<T>,
        beta: T,
    ) -> Result<(), MvError> {
        let c_repl = !self.is_distributed();
        let a_repl = !a.is_distributed();
        let b_repl = !b.is_distributed();
        let ta = trans_a == Transpose::Yes;
        let tb = trans_b == Transpose::Yes;

        let kind = if c_repl && a_repl && b_repl {
            MulKind::Local
        } else if c_repl && !a_repl && !b_repl && ta && !tb {
            MulKind::TransposeReduce
        } else if !c_repl && !a_repl && b_repl && !ta {
            MulKind::RowBlock
        } else {
            let word = |repl: bool| if repl { "replicated" } else { "distributed" };
            let op = |t: bool| if t { "transposed " } else { "" };
            return Err(MvError::UnsupportedMultiply(format!(
                "{} C = {}{} A * {}{} B",
                word(c_repl),
                op(ta),
                word(a_repl),
                op(tb),
                word(b_repl)
            )));
        };

        let (am, ak) = if ta {
            (a.num_vectors(), a.local_len())
        } else {
            (a.local_len(), a.num_vectors())
        };
        let (bk, bn) = if tb {
            (b.num_vectors(), b.local_len())
        } else {
            (b.local_len(), b.num_vectors())
        };
        let (cm, cn) = (self.local_len(), self.num_vectors());
        if am != cm || bn != cn || ak != bk {
            return Err(MvError::ShapeMismatch {
                op: "multiply",
                detail: format!("C is {cm} x {cn}, op(A) is {am} x {ak}, op(B) is {bk} x {bn}"),
            });
        }
        match kind {
            MulKind::TransposeReduce if a.global_len() != b.global_len() => {
                return Err(MvError::ShapeMismatch {
                    op: "multiply",
                    detail: format!(
                        "contracted global length {} in A, {} in B",
                        a.global_len(),
                        b.global_len()
                    ),
                });
            }
            MulKind::RowBlock if self.global_len() != a.global_len() => {
                return Err(MvError::ShapeMismatch {
                    op: "multiply",
                    detail: format!(
                        "global row count {} in C, {} in A",
                        self.global_len(),
                        a.global_len()
                    ),
                });
            }
            _ => {}
        }

        let rank = self
            .map
            .as_ref()
            .and_then(|m| m.comm())
            .map(|c| c.rank())
            .unwrap_or(0);
        let eff_beta = match kind {
            MulKind::TransposeReduce => local_beta(rank, beta),
            _ => beta,
        };

        // Gathers take and release the allocation locks one at a time, so
        // aliasing among C, A, B needs no special handling here.
        let a_mat = a.gather_mat(ta);
        let b_mat = b.gather_mat(tb);
        let c_mat = if eff_beta != T::zero() {
            self.gather_mat(false)
        } else {
            Mat::from_fn(0, 0, |_, _| T::zero())
        };
        let out = kernel::gemm(alpha, &a_mat, &b_mat, eff_beta, &c_mat);
        self.mutate_cols(|j, dst| {
            for (i, d) in dst.iter_mut().enumerate() {
                *d = out[(i, j)];
            }
        });

        if kind == MulKind::TransposeReduce {
            self.reduce()?;
        }
        Ok(())
    }

    /// `self = scalar_this * self + scalar_ab * (a ⊙ b)`, broadcasting the
    /// single column of `a` across every column of `b`. A zero
    /// `scalar_this` overwrites without reading the previous contents.
    pub fn element_wise_multiply(
        &mut self,
        scalar_ab: T,
        a: &MultiVec<T>,
        b: &MultiVec<T>,
        scalar_this: T,
    ) -> Result<(), MvError> {
        if a.num_vectors() != 1 {
            return Err(MvError::InvalidArgument(format!(
                "element_wise_multiply broadcasts a single-column block, got {} column(s)",
                a.num_vectors()
            )));
        }
        self.check_same_shape("element_wise_multiply", b)?;
        if a.local_len() != self.local_len() {
            return Err(MvError::ShapeMismatch {
                op: "element_wise_multiply",
                detail: format!(
                    "{} local row(s) here, {} in the scaling vector",
                    self.local_len(),
                    a.local_len()
                ),
            });
        }
        // Pack a first when it shares an allocation with another operand;
        // its lock is released again before the others are taken.
        let ga = if Arc::ptr_eq(&a.buf, &self.buf) || Arc::ptr_eq(&a.buf, &b.buf) {
            a.read_cols_packed()
        } else {
            a.read_cols_guarded()
        };
        let gb = b.read_cols(self);
        self.mutate_cols_in(gb.residency(), |j, dst| {
            kernel::elem_mul(dst, scalar_this, scalar_ab, ga.col(0), gb.col(j))
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::RowMap;
    use crate::parallel::UniverseComm;
    use approx::assert_relative_eq;

    fn replicated(rows: usize, data: &[f64], cols: usize) -> MultiVec<f64> {
        let map = Arc::new(RowMap::replicated(rows, Some(Arc::new(UniverseComm::local()))));
        MultiVec::from_flat_copy(map, data, rows, cols).unwrap()
    }

    #[test]
    fn beta_survives_only_on_rank_zero() {
        assert_eq!(local_beta(0, 0.5), 0.5);
        assert_eq!(local_beta(1, 0.5), 0.0);
        assert_eq!(local_beta(7, 0.5), 0.0);
    }

    #[test]
    fn replicated_product_with_transposes() {
        // A = [[1, 2], [3, 4], [5, 6]], B = [[1, 0, 2], [0, 1, 3]]
        let a = replicated(3, &[1.0, 3.0, 5.0, 2.0, 4.0, 6.0], 2);
        let b = replicated(2, &[1.0, 0.0, 0.0, 1.0, 2.0, 3.0], 3);
        let mut c = replicated(3, &[0.0; 9], 3);
        c.multiply(Transpose::No, Transpose::No, 1.0, &a, &b, 0.0)
            .unwrap();
        let g = c.read_cols_guarded();
        assert_eq!(g.col(0), &[1.0, 3.0, 5.0]);
        assert_eq!(g.col(1), &[2.0, 4.0, 6.0]);
        assert_eq!(g.col(2), &[8.0, 18.0, 28.0]);

        // Gram matrix with a transposed operand and beta carrying old data.
        let mut d = replicated(2, &[1.0; 4], 2);
        d.multiply(Transpose::Yes, Transpose::No, 1.0, &a, &a, 2.0)
            .unwrap();
        let g = d.read_cols_guarded();
        assert_relative_eq!(g.col(0)[0], 35.0 + 2.0, max_relative = 1e-12);
        assert_relative_eq!(g.col(1)[0], 44.0 + 2.0, max_relative = 1e-12);
        assert_relative_eq!(g.col(0)[1], 44.0 + 2.0, max_relative = 1e-12);
        assert_relative_eq!(g.col(1)[1], 56.0 + 2.0, max_relative = 1e-12);
    }

    #[test]
    fn aliased_gram_product_is_safe() {
        let a = replicated(2, &[1.0, 2.0, 3.0, 4.0], 2);
        let mut c = a.clone();
        // C = Aᵀ * A with C sharing A's allocation.
        c.multiply(Transpose::Yes, Transpose::No, 1.0, &a, &a, 0.0)
            .unwrap();
        let g = c.read_cols_guarded();
        assert_eq!(g.col(0), &[5.0, 11.0]);
        assert_eq!(g.col(1), &[11.0, 25.0]);
    }

    #[test]
    fn unsupported_combinations_are_rejected() {
        let dist_map = Arc::new(RowMap::new(2, 6, 0, true, None));
        let a = MultiVec::from_flat_copy(Arc::clone(&dist_map), &[1.0, 2.0], 2, 1).unwrap();
        let b = replicated(1, &[1.0], 1);
        let mut c = replicated(2, &[0.0, 0.0], 1);
        // Distributed A against replicated B with replicated C fits no case.
        let err = c
            .multiply(Transpose::No, Transpose::No, 1.0, &a, &b, 0.0)
            .unwrap_err();
        assert!(matches!(err, MvError::UnsupportedMultiply(_)));
    }

    #[test]
    fn dimension_mismatch_is_reported_before_work() {
        let a = replicated(3, &[0.0; 6], 2);
        let b = replicated(2, &[0.0; 6], 3);
        let mut c = replicated(3, &[0.0; 6], 2);
        let err = c
            .multiply(Transpose::No, Transpose::No, 1.0, &a, &b, 0.0)
            .unwrap_err();
        assert!(matches!(err, MvError::ShapeMismatch { op: "multiply", .. }));
    }

    #[test]
    fn broadcast_elementwise_product() {
        let s = replicated(3, &[2.0, 3.0, 4.0], 1);
        let b = replicated(3, &[1.0, 1.0, 1.0, 10.0, 10.0, 10.0], 2);
        let mut c = replicated(3, &[f64::NAN; 6], 2);
        // scalar_this == 0 must overwrite the NaN fill, not blend with it.
        c.element_wise_multiply(5.0, &s, &b, 0.0).unwrap();
        let g = c.read_cols_guarded();
        assert_eq!(g.col(0), &[10.0, 15.0, 20.0]);
        assert_eq!(g.col(1), &[100.0, 150.0, 200.0]);
    }

    #[test]
    fn elementwise_rejects_multi_column_scaling_vector() {
        let s = replicated(2, &[1.0; 4], 2);
        let b = replicated(2, &[1.0; 4], 2);
        let mut c = replicated(2, &[0.0; 4], 2);
        assert!(matches!(
            c.element_wise_multiply(1.0, &s, &b, 0.0),
            Err(MvError::InvalidArgument(_))
        ));
    }
}
