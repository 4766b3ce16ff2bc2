//! Collective reductions: dots, norms, column means, and the
//! replicated-block sum.
//!
//! Every reduction runs in two phases. Phase one computes per-column `f64`
//! partials over locally owned rows; a process with zero rows contributes
//! the reduction identity rather than skipping. Phase two all-reduces the
//! partial vector over the map's communicator, but only when the map is
//! present, reports distributed, and actually carries a communicator.
//! Preconditions are checked before phase one from local state only, so
//! every process takes the same error path and none is left stranded inside
//! a collective. A block with zero columns skips the collective uniformly.

use std::sync::Arc;

use num_traits::{Float, FromPrimitive};

use crate::error::MvError;
use crate::kernel;
use crate::parallel::Comm;
use crate::vector::multi_vec::MultiVec;

#[derive(Copy, Clone, PartialEq, Eq)]
enum NormKind {
    One,
    Two,
    Inf,
}

impl<T: Float + FromPrimitive + Send + Sync> MultiVec<T> {
    fn combine(&self, partials: &mut [f64], max: bool) {
        if partials.is_empty() {
            return;
        }
        let comm = match self
            .map
            .as_ref()
            .filter(|m| m.is_distributed())
            .and_then(|m| m.comm())
        {
            Some(c) => c,
            None => return,
        };
        let local = partials.to_vec();
        if max {
            comm.all_reduce_max_into(&local, partials);
        } else {
            comm.all_reduce_sum_into(&local, partials);
        }
    }

    fn check_out_len(&self, op: &'static str, len: usize) -> Result<(), MvError> {
        if len < self.num_vectors() {
            return Err(MvError::InvalidArgument(format!(
                "{op} needs {} output slot(s), got {len}",
                self.num_vectors()
            )));
        }
        Ok(())
    }

    /// Per-column dot products with `a`, combined across processes.
    pub fn dot(&self, a: &MultiVec<T>) -> Result<Vec<T>, MvError> {
        self.check_same_shape("dot", a)?;
        if self.global_len() != a.global_len() {
            return Err(MvError::ShapeMismatch {
                op: "dot",
                detail: format!(
                    "global length {} here, {} in the operand",
                    self.global_len(),
                    a.global_len()
                ),
            });
        }
        let n = self.num_vectors();
        let ga = a.read_cols(self);
        let gs = self.read_cols_guarded();
        let mut partials: Vec<f64> = (0..n)
            .map(|j| kernel::dot_local(gs.col(j), ga.col(j)))
            .collect();
        drop(gs);
        drop(ga);
        self.combine(&mut partials, false);
        Ok(partials
            .iter()
            .map(|&p| T::from_f64(p).unwrap_or(T::zero()))
            .collect())
    }

    /// [`dot`](Self::dot) writing into a caller slice of at least
    /// `num_vectors()` entries.
    pub fn dot_into(&self, a: &MultiVec<T>, out: &mut [T]) -> Result<(), MvError> {
        self.check_out_len("dot", out.len())?;
        let vals = self.dot(a)?;
        out[..vals.len()].copy_from_slice(&vals);
        Ok(())
    }

    fn norm_values(&self, kind: NormKind) -> Vec<T> {
        let n = self.num_vectors();
        let gs = self.read_cols_guarded();
        let mut partials: Vec<f64> = (0..n)
            .map(|j| match kind {
                NormKind::One => kernel::norm1_local(gs.col(j)),
                NormKind::Two => kernel::sumsq_local(gs.col(j)),
                NormKind::Inf => kernel::norm_inf_local(gs.col(j)),
            })
            .collect();
        drop(gs);
        self.combine(&mut partials, kind == NormKind::Inf);
        if kind == NormKind::Two {
            // The wire carries sums of squares; the root is taken after the
            // combine so every process agrees bitwise.
            for p in partials.iter_mut() {
                *p = p.sqrt();
            }
        }
        partials
            .iter()
            .map(|&p| T::from_f64(p).unwrap_or(T::zero()))
            .collect()
    }

    /// Per-column 1-norms (sums of absolute values) across all processes.
    pub fn norm1(&self) -> Vec<T> {
        self.norm_values(NormKind::One)
    }

    /// Per-column Euclidean norms across all processes.
    pub fn norm2(&self) -> Vec<T> {
        self.norm_values(NormKind::Two)
    }

    /// Per-column max-absolute-value norms across all processes.
    pub fn norm_inf(&self) -> Vec<T> {
        self.norm_values(NormKind::Inf)
    }

    pub fn norm1_into(&self, out: &mut [T]) -> Result<(), MvError> {
        self.check_out_len("norm1", out.len())?;
        let vals = self.norm_values(NormKind::One);
        out[..vals.len()].copy_from_slice(&vals);
        Ok(())
    }

    pub fn norm2_into(&self, out: &mut [T]) -> Result<(), MvError> {
        self.check_out_len("norm2", out.len())?;
        let vals = self.norm_values(NormKind::Two);
        out[..vals.len()].copy_from_slice(&vals);
        Ok(())
    }

    pub fn norm_inf_into(&self, out: &mut [T]) -> Result<(), MvError> {
        self.check_out_len("norm_inf", out.len())?;
        let vals = self.norm_values(NormKind::Inf);
        out[..vals.len()].copy_from_slice(&vals);
        Ok(())
    }

    /// Per-column means: global column sums divided by the global length.
    /// A zero global length yields NaN entries, as IEEE division dictates.
    pub fn mean_value(&self) -> Vec<T> {
        let n = self.num_vectors();
        let gs = self.read_cols_guarded();
        let mut partials: Vec<f64> = (0..n).map(|j| kernel::sum_local(gs.col(j))).collect();
        drop(gs);
        self.combine(&mut partials, false);
        let denom = self.global_len() as f64;
        partials
            .iter()
            .map(|&s| T::from_f64(s / denom).unwrap_or(T::zero()))
            .collect()
    }

    pub fn mean_value_into(&self, out: &mut [T]) -> Result<(), MvError> {
        self.check_out_len("mean_value", out.len())?;
        let vals = self.mean_value();
        out[..vals.len()].copy_from_slice(&vals);
        Ok(())
    }

    /// Elementwise sum of the local contents across all processes of a
    /// locally replicated block; afterwards every process holds identical
    /// data. Distributed blocks are rejected; a block without a map or
    /// communicator has nothing to combine and is left untouched.
    pub fn reduce(&mut self) -> Result<(), MvError> {
        if self.is_distributed() {
            return Err(MvError::NotReplicated("reduce"));
        }
        let comm = match self.map.as_ref().and_then(|m| m.comm()) {
            Some(c) => Arc::clone(c),
            None => return Ok(()),
        };
        let rows = self.local_len();
        if rows * self.num_vectors() == 0 {
            return Ok(());
        }
        let (packed, _) = self.packed_local();
        let local: Vec<f64> = packed.iter().map(|&x| x.to_f64().unwrap_or(0.0)).collect();
        let mut global = vec![0.0; local.len()];
        comm.all_reduce_sum_into(&local, &mut global);
        self.mutate_cols(|j, dst| {
            for (i, d) in dst.iter_mut().enumerate() {
                *d = T::from_f64(global[j * rows + i]).unwrap_or(T::zero());
            }
        });
        Ok(())
    }
}
