//! The pluggable spatial containers.
//!
//! All containers own their particles, know the owned and halo boxes, and
//! expose the same iteration and pairwise entry points. What differs is the
//! index structure: nothing (direct sum), a cell grid, neighbour lists over
//! a cell grid, clusters in towers, or an octree.

pub(crate) mod cellblock;
mod direct_sum;
mod linked_cells;
pub(crate) mod octree;
pub(crate) mod verlet_clusters;
mod verlet_grid;
mod verlet_lists;
mod verlet_lists_cells;

pub use direct_sum::DirectSum;
pub use linked_cells::LinkedCells;
pub use octree::{Octree, TREE_SPLIT_THRESHOLD};
pub use verlet_clusters::{ClusterRange, VerletClusterLists, DEFAULT_CLUSTER_SIZE};
pub use verlet_lists::VerletLists;
pub use verlet_lists_cells::VerletListsCells;

use crate::error::Result;
use crate::functor::Functor;
use crate::options::{ContainerOption, IteratorBehavior};
use crate::particle::Particle;
use crate::traversal::TraversalPlan;
use crate::util::Box3;
use nalgebra::Point3;

/// Geometry summary a traversal needs to decide its applicability.
#[derive(Debug, Clone, Copy)]
pub struct SelectorInfo {
    /// Cells per dimension including halo layers; towers as `(x, y, 1)` for
    /// the cluster container; `(1, 1, 1)` for trees.
    pub cells_per_dim: [usize; 3],
    pub cell_length: [f64; 3],
    pub interaction_length: f64,
    /// Particles per cluster, zero for non-cluster containers.
    pub cluster_size: usize,
}

/// Common surface of every container.
///
/// Pairwise iteration and neighbour-list rebuilds are inherent methods of
/// the concrete types (they are generic over the functor); everything the
/// engine needs dynamically lives here.
pub trait ParticleContainer {
    fn container_type(&self) -> ContainerOption;

    /// Owned box.
    fn box3(&self) -> Box3;

    fn cutoff(&self) -> f64;

    fn skin(&self) -> f64;

    fn interaction_length(&self) -> f64 {
        self.cutoff() + self.skin()
    }

    /// Halo region: owned box grown by the interaction length.
    fn halo_box(&self) -> Box3 {
        self.box3().grown(self.interaction_length())
    }

    fn selector_info(&self) -> SelectorInfo;

    /// Insert an owned particle. Must lie inside the owned box.
    fn add_particle(&mut self, p: Particle) -> Result<()>;

    /// Insert a halo particle. Must lie inside the halo box but outside the
    /// owned box; the ownership state is forced to halo.
    fn add_halo_particle(&mut self, p: Particle) -> Result<()>;

    /// Overwrite an existing halo particle, identified by id, searched
    /// within skin/2 of the incoming position. Returns whether a particle
    /// was found and updated.
    fn update_halo_particle(&mut self, p: &Particle) -> bool;

    fn delete_halo_particles(&mut self);

    fn delete_all_particles(&mut self);

    /// Remove and return every owned particle that has left the owned box;
    /// halo particles are removed as well.
    #[must_use = "the returned particles have left the domain and must be migrated"]
    fn update_container(&mut self) -> Vec<Particle>;

    /// Number of actual particles (owned and halo, no dummies).
    fn num_particles(&self) -> usize;

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle));

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle));

    /// Yield every particle with position in `[min, max]` and matching
    /// ownership exactly once. The region is clamped to the halo box.
    fn for_each_in_region(
        &self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&Particle),
    ) -> Result<()>;

    fn for_each_in_region_mut(
        &mut self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&mut Particle),
    ) -> Result<()>;

    /// Mark every particle matching the predicate as deleted. The container
    /// becomes structurally dirty and repairs itself before the next
    /// pairwise iteration.
    fn delete_if(&mut self, pred: &mut dyn FnMut(&Particle) -> bool);
}

/// Region bounds sanity check shared by all implementations.
pub(crate) fn check_region(min: &Point3<f64>, max: &Point3<f64>) -> Result<()> {
    if (0..3).any(|d| min[d] > max[d]) {
        return Err(crate::error::Error::InvalidRegion {
            min: *min,
            max: *max,
        });
    }
    Ok(())
}

/// Inclusive containment used by region iteration (the contract is
/// "position in `[min, max]`", unlike the half-open owned box).
#[inline]
pub(crate) fn in_region(p: &Point3<f64>, min: &Point3<f64>, max: &Point3<f64>) -> bool {
    (0..3).all(|d| p[d] >= min[d] && p[d] <= max[d])
}

/// Container-level dispatch used by the engine once a configuration is
/// committed. Concrete callers that know their container type can invoke
/// the inherent methods directly.
pub enum AnyContainer {
    DirectSum(DirectSum),
    LinkedCells(LinkedCells),
    VerletLists(VerletLists),
    VerletListsCells(VerletListsCells),
    VerletClusterLists(VerletClusterLists),
    Octree(Octree),
}

macro_rules! delegate {
    ($self:ident, $c:ident => $body:expr) => {
        match $self {
            AnyContainer::DirectSum($c) => $body,
            AnyContainer::LinkedCells($c) => $body,
            AnyContainer::VerletLists($c) => $body,
            AnyContainer::VerletListsCells($c) => $body,
            AnyContainer::VerletClusterLists($c) => $body,
            AnyContainer::Octree($c) => $body,
        }
    };
}

impl AnyContainer {
    /// Run one pairwise interaction sweep with the given plan.
    pub fn iterate_pairwise<F: Functor>(&mut self, plan: &TraversalPlan, functor: &F) -> Result<()> {
        delegate!(self, c => c.iterate_pairwise(plan, functor))
    }

    /// Rebuild neighbour lists where the container maintains any; no-op
    /// otherwise.
    pub fn rebuild_neighbor_lists(&mut self, plan: &TraversalPlan) {
        match self {
            AnyContainer::VerletLists(c) => c.rebuild_neighbor_lists(plan),
            AnyContainer::VerletListsCells(c) => c.rebuild_neighbor_lists(plan),
            AnyContainer::VerletClusterLists(c) => c.rebuild_neighbor_lists(plan),
            _ => {}
        }
    }

    /// Whether the neighbour structure needs a rebuild before the next
    /// pairwise iteration.
    pub fn neighbor_lists_need_rebuild(&self) -> bool {
        match self {
            AnyContainer::VerletLists(c) => c.needs_rebuild(),
            AnyContainer::VerletListsCells(c) => c.needs_rebuild(),
            AnyContainer::VerletClusterLists(c) => c.needs_rebuild(),
            _ => false,
        }
    }
}

impl ParticleContainer for AnyContainer {
    fn container_type(&self) -> ContainerOption {
        delegate!(self, c => c.container_type())
    }

    fn box3(&self) -> Box3 {
        delegate!(self, c => c.box3())
    }

    fn cutoff(&self) -> f64 {
        delegate!(self, c => c.cutoff())
    }

    fn skin(&self) -> f64 {
        delegate!(self, c => c.skin())
    }

    fn halo_box(&self) -> Box3 {
        delegate!(self, c => c.halo_box())
    }

    fn selector_info(&self) -> SelectorInfo {
        delegate!(self, c => c.selector_info())
    }

    fn add_particle(&mut self, p: Particle) -> Result<()> {
        delegate!(self, c => c.add_particle(p))
    }

    fn add_halo_particle(&mut self, p: Particle) -> Result<()> {
        delegate!(self, c => c.add_halo_particle(p))
    }

    fn update_halo_particle(&mut self, p: &Particle) -> bool {
        delegate!(self, c => c.update_halo_particle(p))
    }

    fn delete_halo_particles(&mut self) {
        delegate!(self, c => c.delete_halo_particles())
    }

    fn delete_all_particles(&mut self) {
        delegate!(self, c => c.delete_all_particles())
    }

    fn update_container(&mut self) -> Vec<Particle> {
        delegate!(self, c => c.update_container())
    }

    fn num_particles(&self) -> usize {
        delegate!(self, c => c.num_particles())
    }

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        delegate!(self, c => c.for_each(behavior, f))
    }

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        delegate!(self, c => c.for_each_mut(behavior, f))
    }

    fn for_each_in_region(
        &self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&Particle),
    ) -> Result<()> {
        delegate!(self, c => c.for_each_in_region(min, max, behavior, f))
    }

    fn for_each_in_region_mut(
        &mut self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&mut Particle),
    ) -> Result<()> {
        delegate!(self, c => c.for_each_in_region_mut(min, max, behavior, f))
    }

    fn delete_if(&mut self, pred: &mut dyn FnMut(&Particle) -> bool) {
        delegate!(self, c => c.delete_if(pred))
    }
}
