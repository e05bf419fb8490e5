//! Linked cells: the workhorse container. Particles live in the cells of a
//! halo-inclusive regular grid; pair candidates come from the
//! 26-neighbourhood.

use crate::cell::Cell;
use crate::container::cellblock::CellBlock;
use crate::container::{check_region, in_region, ParticleContainer, SelectorInfo};
use crate::error::{Error, Result};
use crate::estimator;
use crate::functor::Functor;
use crate::options::{
    ContainerOption, DataLayout, IteratorBehavior, LoadEstimatorOption, TraversalOption,
};
use crate::particle::{OwnershipState, Particle};
use crate::traversal::kernel::CellKernel;
use crate::traversal::sliced::{self, SliceSchedule};
use crate::traversal::{compatible_traversals, lc, TraversalPlan};
use crate::util::parallel::{self, SendSyncPtr};
use crate::util::{distance_squared, Box3};
use nalgebra::Point3;

pub struct LinkedCells {
    cells: Vec<Cell>,
    block: CellBlock,
    cutoff: f64,
    skin: f64,
    cell_size_factor: f64,
    /// Set by deletions through `delete_if`; cleared by the compaction that
    /// runs before the next pairwise iteration.
    dirty: bool,
}

impl LinkedCells {
    pub fn new(box3: Box3, cutoff: f64, skin: f64, cell_size_factor: f64) -> Result<Self> {
        if cutoff <= 0.0 || skin < 0.0 || cell_size_factor <= 0.0 {
            return Err(Error::InvalidInteractionParameters { cutoff, skin });
        }
        let block = CellBlock::new(box3, cell_size_factor * (cutoff + skin))?;
        let cells = vec![Cell::default(); block.num_cells()];
        Ok(Self {
            cells,
            block,
            cutoff,
            skin,
            cell_size_factor,
            dirty: false,
        })
    }

    pub fn cell_size_factor(&self) -> f64 {
        self.cell_size_factor
    }

    pub(crate) fn block(&self) -> &CellBlock {
        &self.block
    }

    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Drop dummy slots left behind by deletions.
    fn repair(&mut self) {
        if self.dirty {
            parallel::for_each_mut(&mut self.cells, |cell| cell.compact());
            self.dirty = false;
        }
    }

    pub fn iterate_pairwise<F: Functor>(&mut self, plan: &TraversalPlan, functor: &F) -> Result<()> {
        if !compatible_traversals(self.container_type()).contains(&plan.traversal) {
            return Err(Error::ContainerMismatch {
                container: self.container_type(),
                traversal: plan.traversal,
            });
        }
        self.repair();

        let kernel = CellKernel::new(functor, plan);
        if plan.layout == DataLayout::Soa {
            parallel::for_each_mut(&mut self.cells, |cell| cell.load_soa(functor));
        }

        let dims = self.block.cells_per_dim;
        match plan.traversal {
            TraversalOption::LcC01 => lc::c01(&mut self.cells, dims, &kernel),
            TraversalOption::LcC08 => lc::c08(&mut self.cells, dims, &kernel),
            TraversalOption::LcC18 => lc::c18(&mut self.cells, dims, &kernel),
            TraversalOption::LcSliced
            | TraversalOption::LcSlicedC02
            | TraversalOption::LcSlicedBalanced => self.traverse_sliced(plan, &kernel)?,
            _ => unreachable!("compatibility checked above"),
        }

        if plan.layout == DataLayout::Soa {
            parallel::for_each_mut(&mut self.cells, |cell| cell.extract_soa(functor));
        }
        Ok(())
    }

    /// Sliced schedules run c08 base steps grouped into slices along the
    /// longest dimension of the base-step space.
    fn traverse_sliced<F: Functor>(
        &mut self,
        plan: &TraversalPlan,
        kernel: &CellKernel<'_, F>,
    ) -> Result<()> {
        let dims = self.block.cells_per_dim;
        let base_dims = [dims[0] - 1, dims[1] - 1, dims[2] - 1];

        let schedule = match plan.traversal {
            TraversalOption::LcSliced => SliceSchedule::Lock,
            TraversalOption::LcSlicedC02 => SliceSchedule::C02,
            TraversalOption::LcSlicedBalanced => {
                let dim = (0..3).max_by_key(|&d| base_dims[d]).unwrap_or(0);
                let loads = match plan.load_estimator {
                    LoadEstimatorOption::SquaredParticlesPerCell => {
                        // estimate on the full grid, truncated to base layers
                        let mut loads =
                            estimator::squared_particles_per_layer(&self.cells, dims, dim);
                        loads.truncate(base_dims[dim]);
                        loads
                    }
                    _ => vec![1; base_dims[dim]],
                };
                SliceSchedule::Balanced(loads)
            }
            _ => unreachable!(),
        };
        let loads = match &schedule {
            SliceSchedule::Balanced(loads) => Some(loads.as_slice()),
            _ => None,
        };

        let Some(spec) =
            sliced::plan_slices(base_dims, parallel::max_threads(), 2, loads)
        else {
            // domain too small to slice; fall back to the plain colouring
            lc::c08(&mut self.cells, dims, kernel);
            return Ok(());
        };

        let ptr = unsafe { SendSyncPtr::new(self.cells.as_mut_ptr()) };
        // c08 base steps only reach forward, never into earlier layers
        sliced::run(base_dims, &spec, &schedule, 0, |base| {
            // boundary layers are serialised by the slice schedule; inner
            // layers of one slice run on a single thread
            unsafe { lc::c08_base_step(&ptr, dims, base, kernel) };
        });
        Ok(())
    }

    fn cell_of(&self, pos: &Point3<f64>) -> usize {
        self.block.flat_index_of_position(pos)
    }
}

impl ParticleContainer for LinkedCells {
    fn container_type(&self) -> ContainerOption {
        ContainerOption::LinkedCells
    }

    fn box3(&self) -> Box3 {
        self.block.box3
    }

    fn halo_box(&self) -> Box3 {
        // the halo region is one cell layer, which may be wider than the
        // interaction length if the cell size factor exceeds one
        self.block.halo_box
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn skin(&self) -> f64 {
        self.skin
    }

    fn selector_info(&self) -> SelectorInfo {
        SelectorInfo {
            cells_per_dim: self.block.cells_per_dim,
            cell_length: self.block.cell_length,
            interaction_length: self.interaction_length(),
            cluster_size: 0,
        }
    }

    fn add_particle(&mut self, p: Particle) -> Result<()> {
        if !self.block.box3.contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Owned;
        let cell = self.cell_of(&p.r);
        self.cells[cell].push(p);
        Ok(())
    }

    fn add_halo_particle(&mut self, p: Particle) -> Result<()> {
        if self.block.box3.contains(&p.r) || !self.block.halo_box.contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Halo;
        let cell = self.cell_of(&p.r);
        self.cells[cell].push(p);
        Ok(())
    }

    fn update_halo_particle(&mut self, p: &Particle) -> bool {
        let radius = self.skin / 2.0;
        let radius_sq = radius * radius;
        let (lo, hi) = self.block.region_cell_bounds(
            &Point3::new(p.r[0] - radius, p.r[1] - radius, p.r[2] - radius),
            &Point3::new(p.r[0] + radius, p.r[1] + radius, p.r[2] + radius),
        );
        let mut found = false;
        let mut indices = Vec::new();
        self.block.for_each_in_bounds(lo, hi, |i| indices.push(i));
        for i in indices {
            for q in self.cells[i].iter_mut() {
                if q.is_halo() && q.id == p.id && distance_squared(&q.r, &p.r) <= radius_sq {
                    *q = *p;
                    q.ownership = OwnershipState::Halo;
                    found = true;
                }
            }
            if found {
                break;
            }
        }
        found
    }

    fn delete_halo_particles(&mut self) {
        for index in self.block.halo_cell_indices() {
            self.cells[index].clear();
        }
        // halo particles that drifted into interior cells are removed too
        for cell in &mut self.cells {
            cell.particles.retain(|p| !p.is_halo());
        }
    }

    fn delete_all_particles(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.dirty = false;
    }

    fn update_container(&mut self) -> Vec<Particle> {
        let mut leaving = Vec::new();
        let mut keep = Vec::new();
        for cell in &mut self.cells {
            for p in cell.particles.drain(..) {
                if p.is_dummy() || p.is_halo() {
                    continue;
                }
                if self.block.box3.contains(&p.r) {
                    keep.push(p);
                } else {
                    leaving.push(p);
                }
            }
        }
        for p in keep {
            let cell = self.cell_of(&p.r);
            self.cells[cell].push(p);
        }
        self.dirty = false;
        leaving
    }

    fn num_particles(&self) -> usize {
        self.cells.iter().map(Cell::num_actual).sum()
    }

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        for cell in &self.cells {
            for p in cell.iter_all() {
                if behavior.matches(p.ownership) {
                    f(p);
                }
            }
        }
    }

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        for cell in &mut self.cells {
            for p in cell.particles.iter_mut() {
                if behavior.matches(p.ownership) {
                    f(p);
                }
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
        let (min, max) = self.block.halo_box.clamp(min, max);
        let (lo, hi) = self.block.region_cell_bounds(&min, &max);
        self.block.for_each_in_bounds(lo, hi, |i| {
            for p in self.cells[i].iter_all() {
                if behavior.matches(p.ownership) && in_region(&p.r, &min, &max) {
                    f(p);
                }
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
        let (min, max) = self.block.halo_box.clamp(min, max);
        let (lo, hi) = self.block.region_cell_bounds(&min, &max);
        let mut indices = Vec::new();
        self.block.for_each_in_bounds(lo, hi, |i| indices.push(i));
        for i in indices {
            for p in self.cells[i].particles.iter_mut() {
                if behavior.matches(p.ownership) && in_region(&p.r, &min, &max) {
                    f(p);
                }
            }
        }
        Ok(())
    }

    fn delete_if(&mut self, pred: &mut dyn FnMut(&Particle) -> bool) {
        for cell in &mut self.cells {
            for p in cell.particles.iter_mut() {
                if !p.is_dummy() && pred(p) {
                    p.make_dummy();
                    self.dirty = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::testing::{CountFunctor, LjFunctor};
    use crate::options::Newton3Option;

    fn box10() -> Box3 {
        Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0))
    }

    fn fill_grid(lc: &mut LinkedCells, per_dim: usize) {
        let mut id = 0;
        let step = 10.0 / per_dim as f64;
        for x in 0..per_dim {
            for y in 0..per_dim {
                for z in 0..per_dim {
                    let r = Point3::new(
                        (x as f64 + 0.5) * step,
                        (y as f64 + 0.5) * step,
                        (z as f64 + 0.5) * step,
                    );
                    lc.add_particle(Particle::new(id, r)).unwrap();
                    id += 1;
                }
            }
        }
    }

    #[test]
    fn test_particles_land_in_their_cells() {
        let mut lc = LinkedCells::new(box10(), 0.8, 0.2, 1.0).unwrap();
        fill_grid(&mut lc, 10);
        assert_eq!(lc.num_particles(), 1000);
        // one particle per interior cell
        for (i, cell) in lc.cells().iter().enumerate() {
            if lc.block().is_halo_cell(i) {
                assert!(cell.is_empty(), "halo cell {i} must be empty");
            } else {
                assert_eq!(cell.len(), 1, "interior cell {i}");
            }
        }
    }

    #[test]
    fn test_c08_on_container_grid() {
        // 10^3 owned cells, cutoff = cell width: the classic count, now on
        // the halo-inclusive grid where every owned cell is a base cell
        let mut lc = LinkedCells::new(box10(), 0.8, 0.2, 1.0).unwrap();
        fill_grid(&mut lc, 10);
        let functor = CountFunctor::default();
        let plan = TraversalPlan::new(
            TraversalOption::LcC08,
            DataLayout::Aos,
            Newton3Option::Enabled,
        );
        lc.iterate_pairwise(&plan, &functor).unwrap();
        // halo is empty: bases in the halo layers find nothing, interior
        // bases see the full 26-neighbourhood pair set exactly once
        let expected: usize =
            crate::traversal::lc::tests_support::full_grid_pair_count([10, 10, 10]);
        assert_eq!(functor.aos_count(), expected);
    }

    #[test]
    fn test_all_lc_traversals_agree_on_forces() {
        let reference = forces_of(TraversalOption::LcC08, Newton3Option::Enabled, DataLayout::Aos);
        assert!(reference.iter().any(|f| f.norm() > 0.0));
        for traversal in [
            TraversalOption::LcC01,
            TraversalOption::LcC18,
            TraversalOption::LcSliced,
            TraversalOption::LcSlicedC02,
            TraversalOption::LcSlicedBalanced,
        ] {
            for newton3 in [Newton3Option::Disabled, Newton3Option::Enabled] {
                if traversal == TraversalOption::LcC01 && newton3.enabled() {
                    continue;
                }
                for layout in [DataLayout::Aos, DataLayout::Soa] {
                    let forces = forces_of(traversal, newton3, layout);
                    for (a, b) in reference.iter().zip(forces.iter()) {
                        assert!(
                            (a - b).norm() <= 1e-10 * b.norm().max(1.0),
                            "{traversal}/{newton3}/{layout}: {a} vs {b}"
                        );
                    }
                }
            }
        }
    }

    fn forces_of(
        traversal: TraversalOption,
        newton3: Newton3Option,
        layout: DataLayout,
    ) -> Vec<nalgebra::Vector3<f64>> {
        // lattice spacing 10/9 < cutoff, so neighbours push back
        let mut lc = LinkedCells::new(box10(), 1.2, 0.3, 1.0).unwrap();
        fill_grid(&mut lc, 9);
        let functor = LjFunctor::new(1.2);
        let plan = TraversalPlan::new(traversal, layout, newton3);
        lc.iterate_pairwise(&plan, &functor).unwrap();
        let mut forces = Vec::new();
        lc.for_each(IteratorBehavior::Owned, &mut |p| forces.push((p.id, p.f)));
        forces.sort_by_key(|(id, _)| *id);
        forces.into_iter().map(|(_, f)| f).collect()
    }

    #[test]
    fn test_delete_if_marks_and_repairs() {
        let mut lc = LinkedCells::new(box10(), 1.0, 0.2, 1.0).unwrap();
        fill_grid(&mut lc, 4);
        lc.delete_if(&mut |p| p.id % 2 == 0);
        assert_eq!(lc.num_particles(), 32);
        // pairwise iteration repairs the dummies away
        let functor = CountFunctor::default();
        let plan = TraversalPlan::new(
            TraversalOption::LcC18,
            DataLayout::Aos,
            Newton3Option::Enabled,
        );
        lc.iterate_pairwise(&plan, &functor).unwrap();
        assert!(lc.cells().iter().all(|c| c.iter_all().all(|p| !p.is_dummy())));
    }
}
