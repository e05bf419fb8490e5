//! Cluster traversals: towers over the xy-plane, fixed-size clusters along
//! z, pre-built cluster neighbour lists.
//!
//! All cluster traversals run without Newton-3; a base step writes its own
//! cluster only, neighbour clusters are read. Cluster pairs appear in both
//! directions through the symmetric neighbour lists.

use crate::container::verlet_clusters::{ClusterRange, Tower};
use crate::functor::Functor;
use crate::options::DataLayout;
use crate::particle::Particle;
use crate::traversal::sliced::{self, SliceSchedule};
use crate::util::pair_mut;
use crate::util::parallel::{self, SendSyncPtr};

/// Intra-cluster sweep: ordered pairs within one slice of a tower's
/// particle storage, writes confined to the first argument.
fn intra_cluster_aos<F: Functor>(particles: &mut [Particle], functor: &F) {
    for i in 0..particles.len() {
        for j in 0..particles.len() {
            if i == j {
                continue;
            }
            let (pi, pj) = pair_mut(particles, i, j);
            if pi.is_dummy() || pj.is_dummy() {
                continue;
            }
            functor.aos(pi, pj, false);
        }
    }
}

/// One direction of a cluster pair against a read-only partner slice.
fn cluster_pair_oneway_aos<F: Functor>(own: &mut [Particle], other: &[Particle], functor: &F) {
    for pi in own.iter_mut().filter(|p| !p.is_dummy()) {
        for pj in other.iter().filter(|p| !p.is_dummy()) {
            let mut scratch = *pj;
            functor.aos(pi, &mut scratch, false);
        }
    }
}

/// vcl_cluster_iteration in AoS: gather over the static
/// cluster-thread-partition. Each range computes its clusters against an
/// immutable snapshot, then everything is written back.
pub(crate) fn cluster_iteration_aos<F: Functor>(
    towers: &mut [Tower],
    partition: &[ClusterRange],
    cluster_size: usize,
    functor: &F,
) {
    let snapshot: &[Tower] = towers;
    let updates = parallel::map_indices(partition.len(), |r| {
        let range = &partition[r];
        let mut out: Vec<(usize, usize, Vec<Particle>)> = Vec::new();
        let mut tower_index = range.start_tower;
        let mut cluster_index = range.start_cluster;
        for _ in 0..range.num_clusters {
            while tower_index < snapshot.len()
                && cluster_index >= snapshot[tower_index].clusters.len()
            {
                tower_index += 1;
                cluster_index = 0;
            }
            if tower_index >= snapshot.len() {
                break;
            }
            let tower = &snapshot[tower_index];
            let cluster = &tower.clusters[cluster_index];
            let begin = cluster.start;
            let end = (begin + cluster_size).min(tower.cell.particles.len());
            let mut own = tower.cell.particles[begin..end].to_vec();

            intra_cluster_aos(&mut own, functor);
            for &(nt, nc) in &cluster.neighbors {
                let other_tower = &snapshot[nt as usize];
                let other = &other_tower.clusters[nc as usize];
                let ob = other.start;
                let oe = (ob + cluster_size).min(other_tower.cell.particles.len());
                cluster_pair_oneway_aos(&mut own, &other_tower.cell.particles[ob..oe], functor);
            }

            out.push((tower_index, cluster_index, own));
            cluster_index += 1;
        }
        out
    });

    for range_updates in updates {
        for (tower_index, cluster_index, particles) in range_updates {
            let begin = towers[tower_index].clusters[cluster_index].start;
            towers[tower_index].cell.particles[begin..begin + particles.len()]
                .copy_from_slice(&particles);
        }
    }
}

/// vcl_cluster_iteration in SoA: coloured tower sweep on the loaded tower
/// buffers. `reach` is the neighbour-list range in towers; the colour
/// stride `2 * reach + 1` keeps concurrently processed neighbourhoods
/// disjoint.
pub(crate) fn cluster_iteration_soa<F: Functor>(
    towers: &mut [Tower],
    towers_per_dim: [usize; 2],
    cluster_size: usize,
    reach: usize,
    functor: &F,
) {
    let stride = 2 * reach + 1;
    let ptr = unsafe { SendSyncPtr::new(towers.as_mut_ptr()) };
    for color in 0..stride * stride {
        let (cx, cy) = (color % stride, color / stride);
        let mut bases = Vec::new();
        for y in (cy..towers_per_dim[1]).step_by(stride) {
            for x in (cx..towers_per_dim[0]).step_by(stride) {
                bases.push(x + y * towers_per_dim[0]);
            }
        }
        parallel::for_each(&bases, |&t| {
            // same-colour towers are `stride` apart while a step only
            // touches towers within `reach`
            unsafe { tower_step_soa(&ptr, t, cluster_size, functor) };
        });
    }
}

/// # Safety
/// No other thread may concurrently touch this tower or any tower its
/// cluster neighbour lists point into.
unsafe fn tower_step_soa<F: Functor>(
    ptr: &SendSyncPtr<Tower>,
    t: usize,
    cluster_size: usize,
    functor: &F,
) {
    let tower = ptr.get_mut(t);
    let num_clusters = tower.clusters.len();
    for ci in 0..num_clusters {
        let begin = tower.clusters[ci].start;
        let end = (begin + cluster_size).min(tower.cell.soa.len());
        functor.soa_view_pair(&mut tower.cell.soa, begin..end, begin..end, false);
        for ni in 0..tower.clusters[ci].neighbors.len() {
            let (nt, nc) = tower.clusters[ci].neighbors[ni];
            if nt as usize == t {
                let other = &tower.clusters[nc as usize];
                let ob = other.start;
                let oe = (ob + cluster_size).min(tower.cell.soa.len());
                functor.soa_view_pair(&mut tower.cell.soa, begin..end, ob..oe, false);
            } else {
                let other_tower = ptr.get_mut(nt as usize);
                let other = &other_tower.clusters[nc as usize];
                let ob = other.start;
                let oe = (ob + cluster_size).min(other_tower.cell.soa.len());
                functor.soa_two_view_pair(
                    &mut tower.cell.soa,
                    begin..end,
                    &mut other_tower.cell.soa,
                    ob..oe,
                    false,
                );
            }
        }
    }
}

/// One AoS tower step for the sliced schedule: mutates its own tower in
/// place, reads neighbour towers.
///
/// # Safety
/// The slice schedule must serialise access to towers reachable from two
/// concurrently processed slices (the boundary locks do).
unsafe fn tower_step_aos<F: Functor>(
    ptr: &SendSyncPtr<Tower>,
    t: usize,
    cluster_size: usize,
    functor: &F,
) {
    let tower = ptr.get_mut(t);
    let num_clusters = tower.clusters.len();
    for ci in 0..num_clusters {
        let begin = tower.clusters[ci].start;
        let end = (begin + cluster_size).min(tower.cell.particles.len());
        intra_cluster_aos(&mut tower.cell.particles[begin..end], functor);
        for ni in 0..tower.clusters[ci].neighbors.len() {
            let (nt, nc) = tower.clusters[ci].neighbors[ni];
            if nt as usize == t {
                // both clusters live in the same particle vector
                let ob = tower.clusters[nc as usize].start;
                for i in begin..end {
                    for j in ob..(ob + cluster_size).min(tower.cell.particles.len()) {
                        let (pi, pj) = pair_mut(&mut tower.cell.particles, i, j);
                        if pi.is_dummy() || pj.is_dummy() {
                            continue;
                        }
                        functor.aos(pi, pj, false);
                    }
                }
            } else {
                let other_tower = ptr.get(nt as usize);
                let other = &other_tower.clusters[nc as usize];
                let ob = other.start;
                let oe = (ob + cluster_size).min(other_tower.cell.particles.len());
                cluster_pair_oneway_aos(
                    &mut tower.cell.particles[begin..end],
                    &other_tower.cell.particles[ob..oe],
                    functor,
                );
            }
        }
    }
}

/// vcl_sliced: lock-based slices over the tower grid.
pub(crate) fn run_sliced<F: Functor>(
    towers: &mut [Tower],
    towers_per_dim: [usize; 2],
    cluster_size: usize,
    reach: usize,
    layout: DataLayout,
    functor: &F,
) {
    let base_dims = [towers_per_dim[0], towers_per_dim[1], 1];
    let num_towers = towers.len();
    let spec = sliced::plan_slices(base_dims, parallel::max_threads(), reach + 1, None);
    let ptr = unsafe { SendSyncPtr::new(towers.as_mut_ptr()) };
    let step = |idx: [usize; 3]| {
        let t = idx[0] + idx[1] * towers_per_dim[0];
        unsafe {
            match layout {
                DataLayout::Aos => tower_step_aos(&ptr, t, cluster_size, functor),
                DataLayout::Soa => tower_step_soa(&ptr, t, cluster_size, functor),
            }
        }
    };
    match spec {
        Some(spec) => sliced::run(base_dims, &spec, &SliceSchedule::Lock, reach, step),
        None => {
            // too few towers to slice: sequential sweep
            for t in 0..num_towers {
                step([t % towers_per_dim[0], t / towers_per_dim[0], 0]);
            }
        }
    }
}
