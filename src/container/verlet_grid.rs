//! Shared machinery of the verlet-list containers: a particle arena plus a
//! linked-cells index over it, and the neighbour-list build sweep.
//!
//! Particles stay in one stable arena; cells and neighbour lists hold
//! indices into it. Every structural rebuild invalidates all indices at
//! once, which keeps vector reallocation harmless.

use crate::container::cellblock::CellBlock;
use crate::error::Result;
use crate::particle::Particle;
use crate::util::{distance_squared, Box3};
use nalgebra::Point3;

pub(crate) struct VerletGrid {
    pub arena: Vec<Particle>,
    pub block: CellBlock,
    /// Flat cell index -> arena indices of the particles currently binned
    /// there. Only meaningful after [`VerletGrid::rebin`].
    pub cell_particles: Vec<Vec<u32>>,
}

impl VerletGrid {
    pub fn new(box3: Box3, edge: f64) -> Result<Self> {
        let block = CellBlock::new(box3, edge)?;
        let cell_particles = vec![Vec::new(); block.num_cells()];
        Ok(Self {
            arena: Vec::new(),
            block,
            cell_particles,
        })
    }

    /// Drop dummies and re-bin every particle into its cell.
    pub fn rebin(&mut self) {
        self.arena.retain(|p| !p.is_dummy());
        for cell in &mut self.cell_particles {
            cell.clear();
        }
        for (i, p) in self.arena.iter().enumerate() {
            let cell = self.block.flat_index_of_position(&p.r);
            self.cell_particles[cell].push(i as u32);
        }
    }

    /// Build one neighbour list per arena slot.
    ///
    /// With `newton3` each pair is stored once, on the particle whose cell
    /// comes first in the forward ordering (same-cell ties break on the
    /// arena index), so a c18-coloured walk owns all its writes. Without
    /// `newton3` the lists are symmetric.
    pub fn build_lists(&self, radius: f64, newton3: bool) -> Vec<Vec<u32>> {
        let radius_sq = radius * radius;
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); self.arena.len()];
        let dims = self.block.cells_per_dim;

        let mut record = |i: u32, j: u32, lists: &mut Vec<Vec<u32>>| {
            let (pi, pj) = (&self.arena[i as usize], &self.arena[j as usize]);
            if distance_squared(&pi.r, &pj.r) <= radius_sq {
                lists[i as usize].push(j);
                if !newton3 {
                    lists[j as usize].push(i);
                }
            }
        };

        for flat in 0..self.cell_particles.len() {
            let own = &self.cell_particles[flat];
            if own.is_empty() {
                continue;
            }
            // same cell: unordered pairs once, arena order as tie break
            for (a, &i) in own.iter().enumerate() {
                for &j in own.iter().skip(a + 1) {
                    record(i, j, &mut lists);
                }
            }
            // forward neighbour cells
            let idx = self.block.unflatten(flat);
            for off in crate::traversal::lc::FORWARD_OFFSETS {
                let mut n = [0usize; 3];
                let mut ok = true;
                for d in 0..3 {
                    let v = idx[d] as i64 + off[d];
                    if v < 0 || v >= dims[d] as i64 {
                        ok = false;
                        break;
                    }
                    n[d] = v as usize;
                }
                if !ok {
                    continue;
                }
                for &i in own {
                    for &j in &self.cell_particles[self.block.flatten(n)] {
                        record(i, j, &mut lists);
                    }
                }
            }
        }
        lists
    }

    /// Positions to diff against in the validity check.
    pub fn snapshot_positions(&self) -> Vec<Point3<f64>> {
        self.arena.iter().map(|p| p.r).collect()
    }

    /// The lists stay valid while no particle moved further than half the
    /// skin from its build-time position.
    pub fn positions_valid(&self, build_positions: &[Point3<f64>], skin: f64) -> bool {
        if build_positions.len() != self.arena.len() {
            return false;
        }
        let limit_sq = (skin / 2.0) * (skin / 2.0);
        self.arena
            .iter()
            .zip(build_positions)
            .filter(|(p, _)| !p.is_dummy())
            .all(|(p, r0)| distance_squared(&p.r, r0) <= limit_sq)
    }
}
