/// MPI-based parallel communication module.
///
/// This module provides an implementation of the `Comm` trait using the MPI
/// (Message Passing Interface) backend for distributed-memory parallelism.
/// It supplies the collectives the vector-block reductions rely on: barrier
/// synchronization, elementwise sum/max all-reduce, and an inclusive scan
/// used to lay out contiguous row maps. Only available when the `mpi`
/// feature is enabled.
///
/// # Usage
///
/// - The `MpiComm` struct wraps the MPI world communicator and exposes the
///   collective operations.
/// - The `Comm` trait is implemented for `MpiComm`, allowing it to be used
///   as a drop-in replacement for the serial or shared-memory backends.
///
/// # References
/// - [MPI Standard](https://www.mpi-forum.org/)
///
/// # Example
/// ```no_run
/// #[cfg(feature = "mpi")]
/// let comm = MpiComm::new();
/// println!("Rank: {} / {}", comm.rank(), comm.size());
/// comm.barrier();
/// ```
#[cfg(feature = "mpi")]
use mpi::topology::SimpleCommunicator;
#[cfg(feature = "mpi")]
use mpi::traits::*;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds the MPI world communicator, the rank of the current process, and
/// the total number of processes.
#[cfg(feature = "mpi")]
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

#[cfg(feature = "mpi")]
impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// # Panics
    /// Panics if MPI initialization fails.
    pub fn new() -> Self {
        let universe = mpi::initialize().unwrap();
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { world, rank, size }
    }
}

#[cfg(feature = "mpi")]
impl super::Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize {
        self.rank
    }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize {
        self.size
    }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) {
        self.world.barrier();
    }

    /// Elementwise sum across all processes.
    ///
    /// Every process receives the identical combined vector, as guaranteed
    /// by the MPI all-reduce semantics.
    fn all_reduce_sum_into(&self, local: &[f64], out: &mut [f64]) {
        use mpi::collective::SystemOperation;
        self.world
            .all_reduce_into(local, out, &SystemOperation::sum());
    }

    /// Elementwise max across all processes.
    fn all_reduce_max_into(&self, local: &[f64], out: &mut [f64]) {
        use mpi::collective::SystemOperation;
        self.world
            .all_reduce_into(local, out, &SystemOperation::max());
    }

    /// Inclusive prefix sum over ranks: rank r receives the sum of `x` from
    /// ranks 0..=r.
    fn scan_sum(&self, x: u64) -> u64 {
        use mpi::collective::SystemOperation;
        let mut y = 0u64;
        self.world.scan_into(&x, &mut y, &SystemOperation::sum());
        y
    }
}
