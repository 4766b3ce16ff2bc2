//! Process-level communication backends.
//!
//! Collective reductions on vector blocks go through the [`Comm`] trait so the
//! same code runs under MPI (feature `mpi`), shared-memory rayon (feature
//! `rayon`), or serially. Per-column partial results travel the wire as `f64`
//! regardless of the block's scalar type.

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Sum a single value across all processes.
    fn all_reduce_sum(&self, x: f64) -> f64 {
        let mut out = [0.0];
        self.all_reduce_sum_into(&[x], &mut out);
        out[0]
    }
    /// Elementwise sum of `local` across all processes, written to `out`.
    ///
    /// Every process receives the identical combined result. `local` and
    /// `out` must have the same length on every participating process.
    fn all_reduce_sum_into(&self, local: &[f64], out: &mut [f64]);
    /// Elementwise max of `local` across all processes, written to `out`.
    fn all_reduce_max_into(&self, local: &[f64], out: &mut [f64]);
    /// Inclusive prefix sum of `x` over ranks 0..=self.rank().
    fn scan_sum(&self, x: u64) -> u64;
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

#[cfg(feature = "rayon")]
pub mod rayon_comm;
#[cfg(feature = "rayon")]
pub use rayon_comm::RayonComm;

pub enum UniverseComm {
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
    #[cfg(feature = "rayon")]
    Rayon(RayonComm),
    Serial,
}

impl UniverseComm {
    /// A communicator covering this process only. Collectives degenerate to
    /// identity operations; no MPI initialization takes place.
    pub fn local() -> Self {
        #[cfg(feature = "rayon")]
        {
            UniverseComm::Rayon(RayonComm::new())
        }
        #[cfg(not(feature = "rayon"))]
        {
            UniverseComm::Serial
        }
    }
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.rank(),
            UniverseComm::Serial => 0,
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.size(),
            UniverseComm::Serial => 1,
        }
    }
    fn barrier(&self) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.barrier(),
            UniverseComm::Serial => {}
        }
    }
    fn all_reduce_sum_into(&self, local: &[f64], out: &mut [f64]) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_sum_into(local, out),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce_sum_into(local, out),
            UniverseComm::Serial => out.copy_from_slice(local),
        }
    }
    fn all_reduce_max_into(&self, local: &[f64], out: &mut [f64]) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_max_into(local, out),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce_max_into(local, out),
            UniverseComm::Serial => out.copy_from_slice(local),
        }
    }
    fn scan_sum(&self, x: u64) -> u64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.scan_sum(x),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.scan_sum(x),
            UniverseComm::Serial => x,
        }
    }
}
