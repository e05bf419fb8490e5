//! Verlet cluster lists: the xy-plane is divided into towers spanning all
//! z; each tower sorts its particles along z and chops them into clusters
//! of a fixed size. Clusters keep neighbour-cluster lists instead of
//! per-particle lists, trading a few spurious candidates for contiguous
//! memory per interaction.

use crate::cell::Cell;
use crate::container::{check_region, in_region, ParticleContainer, SelectorInfo};
use crate::error::{Error, Result};
use crate::functor::Functor;
use crate::options::{ContainerOption, DataLayout, IteratorBehavior, TraversalOption};
use crate::particle::{OwnershipState, Particle};
use crate::traversal::{compatible_traversals, vcl, TraversalPlan};
use crate::util::parallel;
use crate::util::{distance_squared, Box3};
use nalgebra::Point3;

/// Default number of particles per cluster.
pub const DEFAULT_CLUSTER_SIZE: usize = 4;

pub(crate) struct Tower {
    pub cell: Cell,
    pub clusters: Vec<Cluster>,
    pub num_dummies: usize,
}

pub(crate) struct Cluster {
    /// First slot of this cluster in the tower's particle storage.
    pub start: usize,
    /// `(tower, cluster)` pairs within the interaction length, symmetric.
    pub neighbors: Vec<(u32, u32)>,
}

impl Cluster {
    /// z-extent of the actual particles (dummies sit far away on purpose).
    fn z_range(particles: &[Particle]) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for p in particles.iter().filter(|p| !p.is_dummy()) {
            min = min.min(p.r[2]);
            max = max.max(p.r[2]);
        }
        (min, max)
    }
}

/// A contiguous range of clusters assigned to one worker by the static
/// cluster-thread-partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRange {
    pub start_tower: usize,
    pub start_cluster: usize,
    pub num_clusters: usize,
}

pub struct VerletClusterLists {
    towers: Vec<Tower>,
    towers_per_dim: [usize; 2],
    tower_side: [f64; 2],
    /// Neighbour-list reach in towers (towers per interaction length).
    reach: usize,
    pending: Vec<Particle>,
    partition: Vec<ClusterRange>,
    build_positions: Vec<Vec<Point3<f64>>>,
    valid: bool,
    steps_since_rebuild: u64,
    rebuild_frequency: u64,
    cluster_size: usize,
    box3: Box3,
    cutoff: f64,
    skin: f64,
}

impl VerletClusterLists {
    pub fn new(
        box3: Box3,
        cutoff: f64,
        skin: f64,
        rebuild_frequency: u64,
        cluster_size: usize,
    ) -> Result<Self> {
        if cutoff <= 0.0 || skin < 0.0 || cluster_size == 0 {
            return Err(Error::InvalidInteractionParameters { cutoff, skin });
        }
        let interaction_length = cutoff + skin;
        let halo = box3.grown(interaction_length);
        let mut towers_per_dim = [1usize; 2];
        let mut tower_side = [0.0f64; 2];
        for d in 0..2 {
            let extent = halo.max[d] - halo.min[d];
            let count = ((extent / interaction_length).floor() as usize).max(1);
            towers_per_dim[d] = count;
            tower_side[d] = extent / count as f64;
        }
        let towers = (0..towers_per_dim[0] * towers_per_dim[1])
            .map(|_| Tower {
                cell: Cell::default(),
                clusters: Vec::new(),
                num_dummies: 0,
            })
            .collect();
        Ok(Self {
            towers,
            towers_per_dim,
            tower_side,
            reach: 1,
            pending: Vec::new(),
            partition: Vec::new(),
            build_positions: Vec::new(),
            valid: false,
            steps_since_rebuild: 0,
            rebuild_frequency: rebuild_frequency.max(1),
            cluster_size,
            box3,
            cutoff,
            skin,
        })
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn num_clusters(&self) -> usize {
        self.towers.iter().map(|t| t.clusters.len()).sum()
    }

    pub(crate) fn cluster_thread_partition(&self) -> &[ClusterRange] {
        &self.partition
    }

    fn tower_index_of(&self, pos: &Point3<f64>) -> usize {
        let halo = self.halo_box();
        let mut idx = [0usize; 2];
        for d in 0..2 {
            let v = ((pos[d] - halo.min[d]) / self.tower_side[d]).floor() as i64;
            idx[d] = v.clamp(0, self.towers_per_dim[d] as i64 - 1) as usize;
        }
        idx[0] + idx[1] * self.towers_per_dim[0]
    }

    /// Sort every particle into its tower, chop towers into clusters and
    /// pad the last cluster of each tower with dummies placed on a spaced
    /// z-ladder outside the domain.
    fn rebuild_towers_and_clusters(&mut self) {
        let mut all: Vec<Particle> = std::mem::take(&mut self.pending);
        for tower in &mut self.towers {
            all.extend(tower.cell.iter().copied());
            tower.cell.clear();
            tower.clusters.clear();
            tower.num_dummies = 0;
        }
        for p in all {
            let t = self.tower_index_of(&p.r);
            self.towers[t].cell.push(p);
        }

        let dummy_x = self.box3.max[0] + 8.0 * self.interaction_length();
        let dummy_dist_z = 2.0 * self.interaction_length();
        for tower in &mut self.towers {
            if tower.cell.is_empty() {
                continue;
            }
            tower.cell.sort_by_z();
            let actual = tower.cell.len();
            let missing = (self.cluster_size - actual % self.cluster_size) % self.cluster_size;
            for k in 1..=missing {
                let mut dummy = Particle::new(u64::MAX, Point3::new(dummy_x, 0.0, dummy_dist_z * k as f64));
                dummy.ownership = OwnershipState::Dummy;
                tower.cell.push(dummy);
            }
            tower.num_dummies = missing;
            let num_clusters = tower.cell.len() / self.cluster_size;
            tower.clusters = (0..num_clusters)
                .map(|ci| Cluster {
                    start: ci * self.cluster_size,
                    neighbors: Vec::new(),
                })
                .collect();
        }
    }

    /// Fill every cluster's neighbour list: clusters of towers within
    /// `reach` whose z-extents are within the interaction length.
    fn rebuild_cluster_neighbor_lists(&mut self) {
        let il_sq = self.interaction_length() * self.interaction_length();
        let [tx, ty] = self.towers_per_dim;
        let reach = self.reach as i64;

        // z-ranges of all clusters, up front
        let z_ranges: Vec<Vec<(f64, f64)>> = self
            .towers
            .iter()
            .map(|tower| {
                tower
                    .clusters
                    .iter()
                    .map(|c| {
                        let end = (c.start + self.cluster_size).min(tower.cell.len());
                        Cluster::z_range(&tower.cell.particles[c.start..end])
                    })
                    .collect()
            })
            .collect();

        for t in 0..self.towers.len() {
            let (x, y) = (t % tx, t / tx);
            let mut neighbor_towers = Vec::new();
            for dy in -reach..=reach {
                for dx in -reach..=reach {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= tx as i64 || ny >= ty as i64 {
                        continue;
                    }
                    neighbor_towers.push(nx as usize + ny as usize * tx);
                }
            }

            let num_clusters = self.towers[t].clusters.len();
            for ci in 0..num_clusters {
                let (amin, amax) = z_ranges[t][ci];
                let mut neighbors = Vec::new();
                for &nt in &neighbor_towers {
                    for nc in 0..self.towers[nt].clusters.len() {
                        if nt == t && nc == ci {
                            continue;
                        }
                        let (bmin, bmax) = z_ranges[nt][nc];
                        let gap = (amin - bmax).max(bmin - amax).max(0.0);
                        if gap * gap <= il_sq {
                            neighbors.push((nt as u32, nc as u32));
                        }
                    }
                }
                self.towers[t].clusters[ci].neighbors = neighbors;
            }
        }
    }

    /// The static cluster-thread-partition: contiguous cluster ranges with
    /// roughly equal aggregate neighbour counts.
    fn calculate_cluster_thread_partition(&mut self) {
        let total_pairs: usize = self
            .towers
            .iter()
            .flat_map(|t| t.clusters.iter())
            .map(|c| c.neighbors.len())
            .sum();
        let workers = parallel::max_threads().max(1);
        let target = (total_pairs / workers).max(1);

        self.partition.clear();
        let mut current: Option<ClusterRange> = None;
        let mut pairs_in_current = 0usize;
        for (ti, tower) in self.towers.iter().enumerate() {
            for (ci, cluster) in tower.clusters.iter().enumerate() {
                let range = current.get_or_insert(ClusterRange {
                    start_tower: ti,
                    start_cluster: ci,
                    num_clusters: 0,
                });
                range.num_clusters += 1;
                pairs_in_current += cluster.neighbors.len();
                if pairs_in_current >= target && self.partition.len() + 1 < workers {
                    self.partition.push(current.take().unwrap_or(ClusterRange {
                        start_tower: ti,
                        start_cluster: ci,
                        num_clusters: 0,
                    }));
                    pairs_in_current = 0;
                }
            }
        }
        if let Some(range) = current {
            self.partition.push(range);
        }
    }

    pub fn check_neighbor_lists_are_valid(&self) -> bool {
        if !self.valid || !self.pending.is_empty() {
            return false;
        }
        let limit_sq = (self.skin / 2.0) * (self.skin / 2.0);
        if self.build_positions.len() != self.towers.len() {
            return false;
        }
        self.towers.iter().zip(&self.build_positions).all(|(tower, positions)| {
            tower.cell.len() == positions.len()
                && tower
                    .cell
                    .particles
                    .iter()
                    .zip(positions)
                    .filter(|(p, _)| !p.is_dummy())
                    .all(|(p, r0)| distance_squared(&p.r, r0) <= limit_sq)
        })
    }

    pub(crate) fn needs_rebuild(&self) -> bool {
        !self.check_neighbor_lists_are_valid()
            || self.steps_since_rebuild >= self.rebuild_frequency
    }

    pub fn rebuild_neighbor_lists(&mut self, _plan: &TraversalPlan) {
        self.rebuild_towers_and_clusters();
        self.rebuild_cluster_neighbor_lists();
        self.calculate_cluster_thread_partition();
        self.build_positions = self
            .towers
            .iter()
            .map(|t| t.cell.particles.iter().map(|p| p.r).collect())
            .collect();
        self.valid = true;
        self.steps_since_rebuild = 0;
        log::trace!(
            "verletClusterLists rebuilt: {} towers, {} clusters, {} ranges",
            self.towers.len(),
            self.num_clusters(),
            self.partition.len()
        );
    }

    pub fn iterate_pairwise<F: Functor>(&mut self, plan: &TraversalPlan, functor: &F) -> Result<()> {
        if !compatible_traversals(self.container_type()).contains(&plan.traversal) {
            return Err(Error::ContainerMismatch {
                container: self.container_type(),
                traversal: plan.traversal,
            });
        }
        if self.needs_rebuild() {
            self.rebuild_neighbor_lists(plan);
        }

        if plan.layout == DataLayout::Soa {
            parallel::for_each_mut(&mut self.towers, |tower| tower.cell.load_soa(functor));
        }
        match plan.traversal {
            TraversalOption::VclClusterIteration => match plan.layout {
                DataLayout::Aos => vcl::cluster_iteration_aos(
                    &mut self.towers,
                    &self.partition,
                    self.cluster_size,
                    functor,
                ),
                DataLayout::Soa => vcl::cluster_iteration_soa(
                    &mut self.towers,
                    self.towers_per_dim,
                    self.cluster_size,
                    self.reach,
                    functor,
                ),
            },
            TraversalOption::VclSliced => vcl::run_sliced(
                &mut self.towers,
                self.towers_per_dim,
                self.cluster_size,
                self.reach,
                plan.layout,
                functor,
            ),
            _ => unreachable!("compatibility checked above"),
        }
        if plan.layout == DataLayout::Soa {
            parallel::for_each_mut(&mut self.towers, |tower| tower.cell.extract_soa(functor));
        }
        self.steps_since_rebuild += 1;
        Ok(())
    }
}

impl ParticleContainer for VerletClusterLists {
    fn container_type(&self) -> ContainerOption {
        ContainerOption::VerletClusterLists
    }

    fn box3(&self) -> Box3 {
        self.box3
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn skin(&self) -> f64 {
        self.skin
    }

    fn selector_info(&self) -> SelectorInfo {
        SelectorInfo {
            cells_per_dim: [self.towers_per_dim[0], self.towers_per_dim[1], 1],
            cell_length: [
                self.tower_side[0],
                self.tower_side[1],
                self.box3.max[2] - self.box3.min[2],
            ],
            interaction_length: self.interaction_length(),
            cluster_size: self.cluster_size,
        }
    }

    fn add_particle(&mut self, p: Particle) -> Result<()> {
        if !self.box3.contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Owned;
        self.pending.push(p);
        self.valid = false;
        Ok(())
    }

    fn add_halo_particle(&mut self, p: Particle) -> Result<()> {
        if self.box3.contains(&p.r) || !self.halo_box().contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Halo;
        self.pending.push(p);
        self.valid = false;
        Ok(())
    }

    fn update_halo_particle(&mut self, p: &Particle) -> bool {
        let radius_sq = (self.skin / 2.0) * (self.skin / 2.0);
        // the particle can only be in its own or a bordering tower
        let t = self.tower_index_of(&p.r);
        let [tx, ty] = self.towers_per_dim;
        let (x, y) = (t % tx, t / tx);
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= tx as i64 || ny >= ty as i64 {
                    continue;
                }
                let tower = &mut self.towers[nx as usize + ny as usize * tx];
                for q in tower.cell.iter_mut() {
                    if q.is_halo() && q.id == p.id && distance_squared(&q.r, &p.r) <= radius_sq {
                        *q = *p;
                        q.ownership = OwnershipState::Halo;
                        return true;
                    }
                }
            }
        }
        // not sorted in yet
        for q in &mut self.pending {
            if q.is_halo() && q.id == p.id && distance_squared(&q.r, &p.r) <= radius_sq {
                *q = *p;
                q.ownership = OwnershipState::Halo;
                return true;
            }
        }
        false
    }

    fn delete_halo_particles(&mut self) {
        for tower in &mut self.towers {
            tower.cell.particles.retain(|p| !p.is_halo());
        }
        self.pending.retain(|p| !p.is_halo());
        self.valid = false;
    }

    fn delete_all_particles(&mut self) {
        for tower in &mut self.towers {
            tower.cell.clear();
            tower.clusters.clear();
            tower.num_dummies = 0;
        }
        self.pending.clear();
        self.partition.clear();
        self.valid = false;
    }

    fn update_container(&mut self) -> Vec<Particle> {
        let box3 = self.box3;
        let mut leaving = Vec::new();
        let mut keep = Vec::new();
        for tower in &mut self.towers {
            for p in tower.cell.particles.drain(..) {
                if p.is_dummy() || p.is_halo() {
                    continue;
                }
                if box3.contains(&p.r) {
                    keep.push(p);
                } else {
                    leaving.push(p);
                }
            }
            tower.clusters.clear();
            tower.num_dummies = 0;
        }
        for p in self.pending.drain(..) {
            if p.is_halo() {
                continue;
            }
            if box3.contains(&p.r) {
                keep.push(p);
            } else {
                leaving.push(p);
            }
        }
        self.pending = keep;
        self.valid = false;
        leaving
    }

    fn num_particles(&self) -> usize {
        self.towers.iter().map(|t| t.cell.num_actual()).sum::<usize>() + self.pending.len()
    }

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        for tower in &self.towers {
            for p in tower.cell.iter_all() {
                if behavior.matches(p.ownership) {
                    f(p);
                }
            }
        }
        for p in &self.pending {
            if behavior.matches(p.ownership) {
                f(p);
            }
        }
    }

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        for tower in &mut self.towers {
            for p in tower.cell.particles.iter_mut() {
                if behavior.matches(p.ownership) {
                    f(p);
                }
            }
        }
        for p in &mut self.pending {
            if behavior.matches(p.ownership) {
                f(p);
            }
        }
    }

    fn for_each_in_region(
        &self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&Particle),
    ) -> Result<()> {
        check_region(&min, &max)?;
        let (min, max) = self.halo_box().clamp(min, max);
        self.for_each(behavior, &mut |p| {
            if in_region(&p.r, &min, &max) {
                f(p);
            }
        });
        Ok(())
    }

    fn for_each_in_region_mut(
        &mut self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&mut Particle),
    ) -> Result<()> {
        check_region(&min, &max)?;
        let (min, max) = self.halo_box().clamp(min, max);
        self.for_each_mut(behavior, &mut |p| {
            if in_region(&p.r, &min, &max) {
                f(p);
            }
        });
        Ok(())
    }

    fn delete_if(&mut self, pred: &mut dyn FnMut(&Particle) -> bool) {
        for tower in &mut self.towers {
            for p in tower.cell.particles.iter_mut() {
                if !p.is_dummy() && pred(p) {
                    p.make_dummy();
                }
            }
        }
        self.pending.retain(|p| !pred(p));
        self.valid = false;
    }
}
