//! Cell-based colourings over a regular 3d grid: c01, c08 and c18.
//!
//! All three operate on a raw grid of `dims` cells; the linked-cells
//! container passes its halo-inclusive grid, the tests pass bare grids.

use crate::cell::Cell;
use crate::functor::Functor;
use crate::options::DataLayout;
use crate::traversal::kernel::CellKernel;
use crate::util::parallel::{self, SendSyncPtr};
use crate::util::{pair_mut, three_to_one};

/// The 13 cell-pair interactions handled by one c08 base step, all inside
/// the 2x2x2 block anchored at the base cell. Together with the base cell's
/// self-interaction this covers every pair of the 26-neighbourhood exactly
/// once over all base steps.
const C08_PAIRS: [([i64; 3], [i64; 3]); 13] = [
    ([0, 0, 0], [1, 0, 0]),
    ([0, 0, 0], [0, 1, 0]),
    ([0, 0, 0], [0, 0, 1]),
    ([0, 0, 0], [1, 1, 0]),
    ([0, 0, 0], [1, 0, 1]),
    ([0, 0, 0], [0, 1, 1]),
    ([0, 0, 0], [1, 1, 1]),
    ([1, 0, 0], [0, 1, 0]),
    ([1, 0, 0], [0, 0, 1]),
    ([0, 1, 0], [0, 0, 1]),
    ([1, 0, 0], [0, 1, 1]),
    ([0, 1, 0], [1, 0, 1]),
    ([0, 0, 1], [1, 1, 0]),
];

/// The 13 forward neighbour offsets of the half-space enumeration used by
/// c18: positive z, or same z and positive y, or same z and y and positive x.
pub(crate) const FORWARD_OFFSETS: [[i64; 3]; 13] = [
    [1, 0, 0],
    [-1, 1, 0],
    [0, 1, 0],
    [1, 1, 0],
    [-1, -1, 1],
    [0, -1, 1],
    [1, -1, 1],
    [-1, 0, 1],
    [0, 0, 1],
    [1, 0, 1],
    [-1, 1, 1],
    [0, 1, 1],
    [1, 1, 1],
];

#[inline]
fn offset_index(idx: [usize; 3], off: [i64; 3], dims: [usize; 3]) -> Option<usize> {
    let mut out = [0usize; 3];
    for d in 0..3 {
        let v = idx[d] as i64 + off[d];
        if v < 0 || v >= dims[d] as i64 {
            return None;
        }
        out[d] = v as usize;
    }
    Some(three_to_one(out, dims))
}

/// One c08 base step: the base cell's self-interaction plus the 13 in-block
/// pair interactions.
///
/// # Safety
/// The caller must guarantee that no other thread concurrently touches any
/// cell of the 2x2x2 block anchored at `base`.
pub(crate) unsafe fn c08_base_step<F: Functor>(
    cells: &SendSyncPtr<Cell>,
    dims: [usize; 3],
    base: [usize; 3],
    kernel: &CellKernel<'_, F>,
) {
    kernel.process_cell(cells.get_mut(three_to_one(base, dims)));
    for (off_a, off_b) in C08_PAIRS {
        let (Some(a), Some(b)) = (
            offset_index(base, off_a, dims),
            offset_index(base, off_b, dims),
        ) else {
            continue;
        };
        kernel.process_cell_pair(cells.get_mut(a), cells.get_mut(b));
    }
}

/// c08: 2x2x2 super-cell colouring, eight colours, Newton-3 friendly.
pub(crate) fn c08<F: Functor>(cells: &mut [Cell], dims: [usize; 3], kernel: &CellKernel<'_, F>) {
    if dims.iter().any(|&d| d < 2) {
        return;
    }
    let base_dims = [dims[0] - 1, dims[1] - 1, dims[2] - 1];
    let ptr = unsafe { SendSyncPtr::new(cells.as_mut_ptr()) };

    for color in 0..8usize {
        let (cx, cy, cz) = (color & 1, (color >> 1) & 1, (color >> 2) & 1);
        let mut bases = Vec::new();
        for z in (cz..base_dims[2]).step_by(2) {
            for y in (cy..base_dims[1]).step_by(2) {
                for x in (cx..base_dims[0]).step_by(2) {
                    bases.push([x, y, z]);
                }
            }
        }
        parallel::for_each(&bases, |&base| {
            // bases of one colour are >= 2 cells apart in every dimension,
            // so their 2x2x2 blocks are disjoint
            unsafe { c08_base_step(&ptr, dims, base, kernel) };
        });
    }
}

/// c18: every cell interacts with its 13 forward neighbours; 18 colours
/// (stride 3 in x and y, stride 2 in z) keep the write sets disjoint.
pub(crate) fn c18<F: Functor>(cells: &mut [Cell], dims: [usize; 3], kernel: &CellKernel<'_, F>) {
    let ptr = unsafe { SendSyncPtr::new(cells.as_mut_ptr()) };

    for color in 0..18usize {
        let (cx, cy, cz) = (color % 3, (color / 3) % 3, color / 9);
        let mut bases = Vec::new();
        for z in (cz..dims[2]).step_by(2) {
            for y in (cy..dims[1]).step_by(3) {
                for x in (cx..dims[0]).step_by(3) {
                    bases.push([x, y, z]);
                }
            }
        }
        parallel::for_each(&bases, |&base| {
            // same-colour bases are 3 apart in x/y and 2 apart in z while a
            // base step only touches dz in {0,1}, dy/dx in {-1,0,1}
            let flat = three_to_one(base, dims);
            unsafe {
                kernel.process_cell(ptr.get_mut(flat));
            }
            for off in FORWARD_OFFSETS {
                let Some(n) = offset_index(base, off, dims) else {
                    continue;
                };
                unsafe {
                    kernel.process_cell_pair(ptr.get_mut(flat), ptr.get_mut(n));
                }
            }
        });
    }
}

/// c01: every cell is its own colour. No Newton-3; each base step writes
/// only its own cell, so all cells can be processed concurrently with the
/// neighbourhood held immutably.
pub(crate) fn c01<F: Functor>(cells: &mut [Cell], dims: [usize; 3], kernel: &CellKernel<'_, F>) {
    debug_assert!(!kernel.newton3);
    let total: usize = dims.iter().product();

    match kernel.layout {
        DataLayout::Aos => {
            // gather: new cell contents computed against an immutable grid
            let snapshot: &[Cell] = cells;
            let results = parallel::map_indices(total, |flat| {
                let cell = &snapshot[flat];
                if cell.is_empty() {
                    return None;
                }
                let mut own = cell.particles.clone();
                kernel.aos_cell_slice(&mut own);
                let idx = crate::util::one_to_three(flat, dims);
                for off in full_neighborhood() {
                    let Some(n) = offset_index(idx, off, dims) else {
                        continue;
                    };
                    kernel.aos_pair_oneway_slice(&mut own, &snapshot[n].particles);
                }
                Some(own)
            });
            for (flat, new_particles) in results.into_iter().enumerate() {
                if let Some(p) = new_particles {
                    cells[flat].particles = p;
                }
            }
        }
        DataLayout::Soa => {
            // sequential sweep; each directed pair once
            for flat in 0..total {
                kernel.process_cell(&mut cells[flat]);
                let idx = crate::util::one_to_three(flat, dims);
                for off in full_neighborhood() {
                    let Some(n) = offset_index(idx, off, dims) else {
                        continue;
                    };
                    let (a, b) = pair_mut(cells, flat, n);
                    kernel.process_cell_pair_directed(a, b);
                }
            }
        }
    }
}

/// All 26 offsets of the full neighbourhood.
fn full_neighborhood() -> impl Iterator<Item = [i64; 3]> {
    itertools::iproduct!(-1i64..=1, -1i64..=1, -1i64..=1)
        .filter(|&(x, y, z)| (x, y, z) != (0, 0, 0))
        .map(|(x, y, z)| [x, y, z])
}
