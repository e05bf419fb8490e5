//! The pluggable pairwise-interaction kernel.
//!
//! The engine never computes a force itself; it routes candidate pairs into
//! a [`Functor`]. Kernels take `&self` because a traversal shares one
//! functor instance across the whole thread pool; stateful functors (pair
//! counters and the like) use atomics.

use crate::particle::Particle;
use crate::soa::Soa;
use std::ops::Range;

/// Contract between the engine and a pairwise kernel.
///
/// The AoS kernel is mandatory. The SoA kernels only run when
/// [`Functor::provides_soa`] returns `true`; SoA configurations are filtered
/// from the search space otherwise, so the default bodies are unreachable
/// for honest implementations.
///
/// Call discipline, which the pair-counting tests pin down:
/// * `newton3 == true`: every candidate pair is seen exactly once and the
///   kernel writes both sides.
/// * `newton3 == false`: every candidate pair is seen exactly twice, once
///   per direction, and the kernel must only write the first argument.
pub trait Functor: Send + Sync {
    /// Process one candidate pair in AoS layout.
    fn aos(&self, i: &mut Particle, j: &mut Particle, newton3: bool);

    /// All pairs within one cell, SoA layout. Invoked once per cell
    /// regardless of the Newton-3 setting.
    fn soa_single(&self, _cell: &mut Soa, _newton3: bool) {
        unreachable!("functor reported provides_soa() but has no SoA kernels");
    }

    /// All pairs between two distinct cells, SoA layout. Without Newton-3
    /// this is invoked a second time with the arguments flipped and must
    /// only write into `a`.
    fn soa_pair(&self, _a: &mut Soa, _b: &mut Soa, _newton3: bool) {
        unreachable!("functor reported provides_soa() but has no SoA kernels");
    }

    /// All pairs between two index ranges of the same buffer (cluster
    /// towers). For `a == b` this degenerates to the single-cluster case.
    fn soa_view_pair(&self, _soa: &mut Soa, _a: Range<usize>, _b: Range<usize>, _newton3: bool) {
        unreachable!("functor reported provides_soa() but has no SoA kernels");
    }

    /// All pairs between an index range of `a` and an index range of `b`,
    /// two distinct buffers (cross-tower cluster pairs).
    fn soa_two_view_pair(
        &self,
        _a: &mut Soa,
        _a_view: Range<usize>,
        _b: &mut Soa,
        _b_view: Range<usize>,
        _newton3: bool,
    ) {
        unreachable!("functor reported provides_soa() but has no SoA kernels");
    }

    /// Particle `i` of `soa` against its pre-built neighbour list (indices
    /// into the same buffer).
    fn soa_verlet(&self, _soa: &mut Soa, _i: usize, _neighbors: &[u32], _newton3: bool) {
        unreachable!("functor reported provides_soa() but has no SoA kernels");
    }

    /// Populate the columnar mirror from the AoS records. The default copies
    /// the standard attribute set; override to load custom attributes.
    fn soa_load(&self, particles: &[Particle], soa: &mut Soa) {
        soa.fill_from(particles);
    }

    /// Drain the columnar mirror back into the AoS records.
    fn soa_extract(&self, particles: &mut [Particle], soa: &Soa) {
        soa.write_forces(particles);
    }

    /// Whether the SoA kernel family above is implemented.
    fn provides_soa(&self) -> bool {
        false
    }

    fn allows_newton3(&self) -> bool {
        true
    }

    fn allows_non_newton3(&self) -> bool {
        true
    }

    /// Functors that are not relevant for tuning (list rebuilds, one-off
    /// measurements) run under the committed configuration without being
    /// timed.
    fn is_relevant_for_tuning(&self) -> bool {
        true
    }
}
