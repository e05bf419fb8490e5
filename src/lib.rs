//! tunell: an auto-tuning engine for short-range pairwise particle
//! interactions.
//!
//! Given a rectangular domain and a cutoff radius, the engine computes all
//! pairwise interactions within the cutoff each time step and continuously
//! tunes, transparently to the caller, which spatial container (direct
//! sum, linked cells, verlet lists, verlet cluster lists, octree), which
//! traversal schedule, which data layout, and whether Newton's third law
//! shortcut are used to do so.
//!
//! The force kernel itself is yours: implement [`Functor`] and hand it to
//! [`Engine::iterate_pairwise`].
//!
//! ```
//! use nalgebra::Point3;
//! use tunell::{Engine, Functor, Particle};
//!
//! struct Springs;
//! impl Functor for Springs {
//!     fn aos(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
//!         let f = (j.r - i.r) * 0.01;
//!         i.f += f;
//!         if newton3 {
//!             j.f -= f;
//!         }
//!     }
//! }
//!
//! let mut engine = Engine::builder(
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(10.0, 10.0, 10.0),
//!     1.0,
//! )
//! .build()
//! .unwrap();
//! engine.add_particle(Particle::new(0, Point3::new(1.0, 1.0, 1.0))).unwrap();
//! engine.add_particle(Particle::new(1, Point3::new(1.5, 1.0, 1.0))).unwrap();
//! engine.iterate_pairwise(&Springs).unwrap();
//! ```
//!
//! Parallelism comes from the `rayon` feature (on by default); the pair
//! visit semantics are identical without it. The `mpi` feature adds a real
//! transport behind the configuration-sharing interface in [`tuning`];
//! without it a degenerate single-rank communicator is used.

pub mod cell;
pub mod comm;
pub mod container;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod functor;
pub mod options;
pub mod particle;
pub mod soa;
pub mod traversal;
pub mod tuning;
pub(crate) mod util;

pub use cell::Cell;
pub use container::{AnyContainer, ParticleContainer};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use functor::Functor;
pub use options::{
    ContainerOption, DataLayout, IteratorBehavior, LoadEstimatorOption, Newton3Option, NumberSet,
    SelectorStrategy, TraversalOption, TuningStrategyOption,
};
pub use particle::{OwnershipState, Particle};
pub use soa::{Soa, SoaView};
pub use tuning::{Configuration, Tuner, TuningOptions};
pub use util::Box3;
