//! The cell-pair kernel: applies a functor to all candidate pairs of one
//! cell or a pair of cells, under the chosen layout and Newton-3 setting.
//!
//! Candidate means candidate: no distance check happens here. Cutoff
//! filtering is the functor's business, which keeps kernel call counts
//! exactly predictable for the schedule tests.

use crate::cell::Cell;
use crate::functor::Functor;
use crate::options::DataLayout;
use crate::particle::Particle;
use crate::traversal::TraversalPlan;

pub(crate) struct CellKernel<'f, F> {
    functor: &'f F,
    pub layout: DataLayout,
    pub newton3: bool,
}

impl<'f, F: Functor> CellKernel<'f, F> {
    pub fn new(functor: &'f F, plan: &TraversalPlan) -> Self {
        Self {
            functor,
            layout: plan.layout,
            newton3: plan.newton3.enabled(),
        }
    }

    /// All pairs within one cell.
    ///
    /// With Newton-3 every unordered pair is visited once; without, every
    /// ordered pair, so the kernel only ever writes its first argument.
    /// The SoA single-cell kernel is invoked once per cell either way,
    /// since there is no Newton-3 saving inside a cell.
    pub fn process_cell(&self, cell: &mut Cell) {
        match self.layout {
            DataLayout::Aos => self.aos_cell_slice(&mut cell.particles),
            DataLayout::Soa => self.functor.soa_single(&mut cell.soa, self.newton3),
        }
    }

    /// All pairs between two distinct cells, both sides updated (via
    /// Newton-3 or via the mirrored second invocation).
    pub fn process_cell_pair(&self, a: &mut Cell, b: &mut Cell) {
        match self.layout {
            DataLayout::Aos => {
                self.aos_cell_pair_directed(&mut a.particles, &mut b.particles);
                if !self.newton3 {
                    self.aos_cell_pair_directed(&mut b.particles, &mut a.particles);
                }
            }
            DataLayout::Soa => {
                self.functor.soa_pair(&mut a.soa, &mut b.soa, self.newton3);
                if !self.newton3 {
                    self.functor.soa_pair(&mut b.soa, &mut a.soa, false);
                }
            }
        }
    }

    /// A single direction of a cell pair: every `(i in a, j in b)` candidate
    /// exactly once. Only meaningful without Newton-3, where the kernel
    /// writes its first argument only; the mirrored direction is someone
    /// else's base step.
    pub fn process_cell_pair_directed(&self, a: &mut Cell, b: &mut Cell) {
        debug_assert!(!self.newton3);
        match self.layout {
            DataLayout::Aos => self.aos_cell_pair_directed(&mut a.particles, &mut b.particles),
            DataLayout::Soa => self.functor.soa_pair(&mut a.soa, &mut b.soa, false),
        }
    }

    /// Like [`Self::process_cell_pair_directed`] but with a read-only
    /// partner, for gather-style schedules that hold the neighbourhood
    /// immutably. The kernel contract (no writes to the second argument
    /// without Newton-3) makes a throwaway copy of the partner sound.
    pub fn aos_pair_oneway_slice(&self, a: &mut [Particle], b: &[Particle]) {
        debug_assert!(!self.newton3);
        for pi in a.iter_mut().filter(|p| !p.is_dummy()) {
            for pj in b.iter().filter(|p| !p.is_dummy()) {
                let mut scratch = *pj;
                self.functor.aos(pi, &mut scratch, false);
            }
        }
    }

    /// Intra-cell sweep over AoS particles.
    pub fn aos_cell_slice(&self, particles: &mut [Particle]) {
        if self.newton3 {
            for i in 0..particles.len() {
                let (head, tail) = particles.split_at_mut(i + 1);
                let pi = &mut head[i];
                if pi.is_dummy() {
                    continue;
                }
                for pj in tail.iter_mut().filter(|p| !p.is_dummy()) {
                    self.functor.aos(pi, pj, true);
                }
            }
        } else {
            for i in 0..particles.len() {
                for j in 0..particles.len() {
                    if i == j {
                        continue;
                    }
                    let (pi, pj) = crate::util::pair_mut(particles, i, j);
                    if pi.is_dummy() || pj.is_dummy() {
                        continue;
                    }
                    self.functor.aos(pi, pj, false);
                }
            }
        }
    }

    fn aos_cell_pair_directed(&self, a: &mut [Particle], b: &mut [Particle]) {
        for pi in a.iter_mut().filter(|p| !p.is_dummy()) {
            for pj in b.iter_mut().filter(|p| !p.is_dummy()) {
                self.functor.aos(pi, pj, self.newton3);
            }
        }
    }
}
