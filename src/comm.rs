//! Thin communicator abstraction over the tuning exchanges.
//!
//! Builds without the `mpi` feature use the degenerate single-rank
//! implementation: rank 0, size 1, reductions copy, broadcasts keep the
//! buffer. All distribution and optimisation logic upstream is pure and
//! works against this trait, so it is testable without any MPI runtime.

use crate::error::{Error, Result};
use crate::tuning::SERIALIZED_LEN;

pub trait Communicator {
    fn rank(&self) -> i32;

    fn size(&self) -> i32;

    /// Global minimum of a per-rank sample count.
    fn all_reduce_min_u64(&self, value: u64) -> Result<u64>;

    /// Global minimum of a per-rank integer (rank election).
    fn all_reduce_min_i32(&self, value: i32) -> Result<i32>;

    /// Broadcast a serialised configuration record from `root`.
    fn broadcast_record(&self, record: &mut [u8; SERIALIZED_LEN], root: i32) -> Result<()>;

    /// Gather one scalar from every rank, ordered by rank.
    fn all_gather_f64(&self, value: f64) -> Result<Vec<f64>>;

    /// Split into sub-communicators by colour, ordered by key within each.
    fn split(&self, color: i32, key: i32) -> Result<Box<dyn Communicator>>;
}

/// The no-MPI fallback: one rank, every collective is local.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn all_reduce_min_u64(&self, value: u64) -> Result<u64> {
        Ok(value)
    }

    fn all_reduce_min_i32(&self, value: i32) -> Result<i32> {
        Ok(value)
    }

    fn broadcast_record(&self, _record: &mut [u8; SERIALIZED_LEN], root: i32) -> Result<()> {
        if root != 0 {
            return Err(Error::Communication(format!(
                "broadcast root {root} out of range for single-rank communicator"
            )));
        }
        Ok(())
    }

    fn all_gather_f64(&self, value: f64) -> Result<Vec<f64>> {
        Ok(vec![value])
    }

    fn split(&self, _color: i32, _key: i32) -> Result<Box<dyn Communicator>> {
        Ok(Box::new(SingleRank))
    }
}

#[cfg(feature = "mpi")]
pub use self::with_mpi::MpiCommunicator;

#[cfg(feature = "mpi")]
mod with_mpi {
    use super::{Communicator, SERIALIZED_LEN};
    use crate::error::{Error, Result};
    use mpi::collective::SystemOperation;
    use mpi::topology::{Communicator as _, SimpleCommunicator};
    use mpi::traits::*;

    /// Real transport backed by an MPI communicator. Constructed from the
    /// world communicator of an initialised MPI environment.
    pub struct MpiCommunicator {
        comm: SimpleCommunicator,
    }

    impl MpiCommunicator {
        pub fn new(comm: SimpleCommunicator) -> Self {
            Self { comm }
        }

        pub fn world(universe: &mpi::environment::Universe) -> Self {
            Self::new(universe.world())
        }
    }

    impl Communicator for MpiCommunicator {
        fn rank(&self) -> i32 {
            self.comm.rank()
        }

        fn size(&self) -> i32 {
            self.comm.size()
        }

        fn all_reduce_min_u64(&self, value: u64) -> Result<u64> {
            let mut out = 0u64;
            self.comm
                .all_reduce_into(&value, &mut out, SystemOperation::min());
            Ok(out)
        }

        fn all_reduce_min_i32(&self, value: i32) -> Result<i32> {
            let mut out = 0i32;
            self.comm
                .all_reduce_into(&value, &mut out, SystemOperation::min());
            Ok(out)
        }

        fn broadcast_record(&self, record: &mut [u8; SERIALIZED_LEN], root: i32) -> Result<()> {
            if root < 0 || root >= self.comm.size() {
                return Err(Error::Communication(format!(
                    "broadcast root {root} out of range"
                )));
            }
            self.comm
                .process_at_rank(root)
                .broadcast_into(&mut record[..]);
            Ok(())
        }

        fn all_gather_f64(&self, value: f64) -> Result<Vec<f64>> {
            let mut out = vec![0.0f64; self.comm.size() as usize];
            self.comm.all_gather_into(&value, &mut out[..]);
            Ok(out)
        }

        fn split(&self, color: i32, key: i32) -> Result<Box<dyn Communicator>> {
            let sub = self
                .comm
                .split_by_color_with_key(mpi::topology::Color::with_value(color), key)
                .ok_or_else(|| {
                    Error::Communication("communicator split yielded no group".into())
                })?;
            Ok(Box::new(MpiCommunicator { comm: sub }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rank_collectives() {
        let comm = SingleRank;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.all_reduce_min_u64(17).unwrap(), 17);
        assert_eq!(comm.all_gather_f64(1.5).unwrap(), vec![1.5]);

        let mut record = [7u8; SERIALIZED_LEN];
        comm.broadcast_record(&mut record, 0).unwrap();
        assert_eq!(record, [7u8; SERIALIZED_LEN]);
        assert!(comm.broadcast_record(&mut record, 1).is_err());
    }
}
