//! Traversals over cell-grouped verlet lists: walk the cells of the
//! underlying grid, and inside each cell run every particle against its
//! pre-built list.
//!
//! With Newton-3 the lists store each pair once, on the particle whose
//! cell is earlier in the forward ordering; a base step therefore writes
//! its own cell plus forward neighbours, the same footprint as c18.

use crate::functor::Functor;
use crate::options::DataLayout;
use crate::particle::Particle;
use crate::soa::Soa;
use crate::traversal::sliced::{self, SliceSchedule};
use crate::util::parallel::{self, SendSyncPtr};
use crate::util::three_to_one;

pub(crate) struct VlcData<'a> {
    pub cell_particles: &'a [Vec<u32>],
    pub lists: &'a [Vec<u32>],
    pub dims: [usize; 3],
}

impl VlcData<'_> {
    fn summed_list_length(&self, flat: usize) -> u64 {
        self.cell_particles[flat]
            .iter()
            .map(|&ai| self.lists[ai as usize].len() as u64)
            .sum()
    }
}

/// One base step: all list interactions of the particles in one cell.
///
/// # Safety
/// No other thread may concurrently touch any particle of this cell or of
/// the cells its lists reach into (same cell and forward neighbours with
/// Newton-3; same cell only without).
unsafe fn cell_step_aos<F: Functor>(
    arena: &SendSyncPtr<Particle>,
    data: &VlcData<'_>,
    flat: usize,
    newton3: bool,
    functor: &F,
) {
    for &ai in &data.cell_particles[flat] {
        for &aj in &data.lists[ai as usize] {
            let pi = arena.get_mut(ai as usize);
            let pj = arena.get_mut(aj as usize);
            if pi.is_dummy() || pj.is_dummy() {
                continue;
            }
            functor.aos(pi, pj, newton3);
        }
    }
}

/// Sequential SoA sweep shared by all variants: the schedule only affects
/// parallelism, never which pairs are visited.
fn soa_sweep<F: Functor>(arena: &mut [Particle], data: &VlcData<'_>, newton3: bool, functor: &F) {
    let mut soa = Soa::default();
    functor.soa_load(arena, &mut soa);
    for lists_of_cell in data.cell_particles {
        for &ai in lists_of_cell {
            let list = &data.lists[ai as usize];
            if !list.is_empty() {
                functor.soa_verlet(&mut soa, ai as usize, list, newton3);
            }
        }
    }
    functor.soa_extract(arena, &soa);
}

/// vlc_c01: every cell its own colour, no Newton-3, gather-style parallel.
pub(crate) fn c01<F: Functor>(
    arena: &mut [Particle],
    data: &VlcData<'_>,
    layout: DataLayout,
    functor: &F,
) {
    match layout {
        DataLayout::Soa => soa_sweep(arena, data, false, functor),
        DataLayout::Aos => {
            let snapshot: &[Particle] = arena;
            let updates = parallel::map_indices(data.cell_particles.len(), |flat| {
                let own = &data.cell_particles[flat];
                if own.is_empty() {
                    return Vec::new();
                }
                let mut out = Vec::with_capacity(own.len());
                for &ai in own {
                    let p = snapshot[ai as usize];
                    if p.is_dummy() {
                        continue;
                    }
                    let mut p = p;
                    for &aj in &data.lists[ai as usize] {
                        let partner = snapshot[aj as usize];
                        if partner.is_dummy() {
                            continue;
                        }
                        let mut scratch = partner;
                        functor.aos(&mut p, &mut scratch, false);
                    }
                    out.push((ai, p));
                }
                out
            });
            for cell_updates in updates {
                for (ai, p) in cell_updates {
                    arena[ai as usize] = p;
                }
            }
        }
    }
}

/// vlc_c18: 18-coloured cell sweep, Newton-3 capable.
pub(crate) fn c18<F: Functor>(
    arena: &mut [Particle],
    data: &VlcData<'_>,
    layout: DataLayout,
    newton3: bool,
    functor: &F,
) {
    if layout == DataLayout::Soa {
        soa_sweep(arena, data, newton3, functor);
        return;
    }
    let dims = data.dims;
    let ptr = unsafe { SendSyncPtr::new(arena.as_mut_ptr()) };
    for color in 0..18usize {
        let (cx, cy, cz) = (color % 3, (color / 3) % 3, color / 9);
        let mut bases = Vec::new();
        for z in (cz..dims[2]).step_by(2) {
            for y in (cy..dims[1]).step_by(3) {
                for x in (cx..dims[0]).step_by(3) {
                    let flat = three_to_one([x, y, z], dims);
                    if !data.cell_particles[flat].is_empty() {
                        bases.push(flat);
                    }
                }
            }
        }
        parallel::for_each(&bases, |&flat| {
            // write footprint is the cell plus forward neighbours; bases of
            // one colour are 3 apart in x/y and 2 in z
            unsafe { cell_step_aos(&ptr, data, flat, newton3, functor) };
        });
    }
}

/// The sliced variants; base space is the full cell grid, reach one layer
/// in every direction, boundary layers serialised by the schedule.
pub(crate) fn run_sliced<F: Functor>(
    arena: &mut [Particle],
    data: &VlcData<'_>,
    layout: DataLayout,
    newton3: bool,
    functor: &F,
    schedule: SliceSchedule,
) {
    if layout == DataLayout::Soa {
        soa_sweep(arena, data, newton3, functor);
        return;
    }
    let dims = data.dims;
    let loads = match &schedule {
        SliceSchedule::Balanced(loads) => Some(loads.as_slice()),
        _ => None,
    };
    let Some(spec) = sliced::plan_slices(dims, parallel::max_threads(), 2, loads) else {
        // too small to slice: plain coloured sweep
        c18(arena, data, layout, newton3, functor);
        return;
    };
    let ptr = unsafe { SendSyncPtr::new(arena.as_mut_ptr()) };
    // forward-ordered lists still reach one layer backwards when the slice
    // dimension is not z
    sliced::run(dims, &spec, &schedule, 1, |idx| {
        let flat = three_to_one(idx, dims);
        if !data.cell_particles[flat].is_empty() {
            unsafe { cell_step_aos(&ptr, data, flat, newton3, functor) };
        }
    });
}

/// Per-layer neighbour-list loads for the balanced variant.
pub(crate) fn list_length_loads(data: &VlcData<'_>, dim: usize) -> Vec<u64> {
    crate::estimator::neighbor_list_length_per_layer(data.dims, dim, |flat| {
        data.summed_list_length(flat)
    })
}
