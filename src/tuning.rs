//! The selector/tuning subsystem: enumerate allowed configurations,
//! measure them, commit to the best, and (optionally) share the work and
//! the verdict across MPI ranks.

mod communicator;
mod configuration;
mod search_space;
mod tuner;

pub use communicator::{
    distribute_configurations, distribute_ranks_in_buckets, optimize_configuration,
    search_space_size, similarity_metric, OptionSets,
};
pub use configuration::{Configuration, SERIALIZED_LEN};
pub use search_space::enumerate_search_space;
pub use tuner::{Tuner, TuningOptions};
