use crate::options::{ContainerOption, TraversalOption, TuningStrategyOption};
use nalgebra::Point3;
use thiserror::Error;

/// Everything that can go wrong inside the engine.
///
/// Inapplicable traversals are only an error when requested explicitly;
/// during tuning they are silently skipped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid region: min {min:?} must be componentwise <= max {max:?}")]
    InvalidRegion { min: Point3<f64>, max: Point3<f64> },

    #[error("domain box is empty or inverted")]
    InvalidDomain,

    #[error("cutoff, skin and cell size factor must be positive (cutoff {cutoff}, skin {skin})")]
    InvalidInteractionParameters { cutoff: f64, skin: f64 },

    #[error("particle {id} at {position:?} is neither inside the owned box nor inside the halo region")]
    ParticleOutsideDomain { id: u64, position: Point3<f64> },

    #[error("search space is empty after filtering, cannot tune")]
    EmptySearchSpace,

    #[error("traversal {traversal} is not applicable to the current domain")]
    InapplicableTraversal { traversal: TraversalOption },

    #[error("traversal {traversal} cannot run on container {container}")]
    ContainerMismatch {
        container: ContainerOption,
        traversal: TraversalOption,
    },

    #[error("unknown {what} wire code {code}")]
    UnknownOptionCode { what: &'static str, code: u8 },

    #[error("serialised configuration record must be 13 bytes, got {0}")]
    MalformedRecord(usize),

    #[error("tuning strategy {0} is not implemented")]
    UnsupportedTuningStrategy(TuningStrategyOption),

    #[error("communication failed: {0}")]
    Communication(String),
}

pub type Result<T> = std::result::Result<T, Error>;
