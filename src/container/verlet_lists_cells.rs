//! Verlet lists grouped by linked cell, enabling coloured and sliced
//! parallel walks over the list structure.

use crate::container::verlet_grid::VerletGrid;
use crate::container::{check_region, in_region, ParticleContainer, SelectorInfo};
use crate::error::{Error, Result};
use crate::functor::Functor;
use crate::options::{
    ContainerOption, IteratorBehavior, LoadEstimatorOption, TraversalOption,
};
use crate::particle::{OwnershipState, Particle};
use crate::traversal::sliced::SliceSchedule;
use crate::traversal::vlc::{self, VlcData};
use crate::traversal::{compatible_traversals, TraversalPlan};
use crate::util::{distance_squared, Box3};
use nalgebra::Point3;

pub struct VerletListsCells {
    grid: VerletGrid,
    lists: Vec<Vec<u32>>,
    build_positions: Vec<Point3<f64>>,
    /// Newton-3 mode the current lists were built for.
    built_newton3: Option<bool>,
    valid: bool,
    steps_since_rebuild: u64,
    rebuild_frequency: u64,
    cutoff: f64,
    skin: f64,
    cell_size_factor: f64,
}

impl VerletListsCells {
    pub fn new(
        box3: Box3,
        cutoff: f64,
        skin: f64,
        rebuild_frequency: u64,
        cell_size_factor: f64,
    ) -> Result<Self> {
        if cutoff <= 0.0 || skin < 0.0 || cell_size_factor < 1.0 {
            return Err(Error::InvalidInteractionParameters { cutoff, skin });
        }
        let grid = VerletGrid::new(box3, cell_size_factor * (cutoff + skin))?;
        Ok(Self {
            grid,
            lists: Vec::new(),
            build_positions: Vec::new(),
            built_newton3: None,
            valid: false,
            steps_since_rebuild: 0,
            rebuild_frequency: rebuild_frequency.max(1),
            cutoff,
            skin,
            cell_size_factor,
        })
    }

    pub fn cell_size_factor(&self) -> f64 {
        self.cell_size_factor
    }

    pub fn check_neighbor_lists_are_valid(&self) -> bool {
        self.valid && self.grid.positions_valid(&self.build_positions, self.skin)
    }

    pub(crate) fn needs_rebuild(&self) -> bool {
        !self.check_neighbor_lists_are_valid()
            || self.steps_since_rebuild >= self.rebuild_frequency
    }

    pub fn rebuild_neighbor_lists(&mut self, plan: &TraversalPlan) {
        let newton3 = plan.newton3.enabled();
        self.grid.rebin();
        self.lists = self.grid.build_lists(self.interaction_length(), newton3);
        self.build_positions = self.grid.snapshot_positions();
        self.built_newton3 = Some(newton3);
        self.valid = true;
        self.steps_since_rebuild = 0;
    }

    pub fn iterate_pairwise<F: Functor>(&mut self, plan: &TraversalPlan, functor: &F) -> Result<()> {
        if !compatible_traversals(self.container_type()).contains(&plan.traversal) {
            return Err(Error::ContainerMismatch {
                container: self.container_type(),
                traversal: plan.traversal,
            });
        }
        let newton3 = plan.newton3.enabled();
        if self.needs_rebuild() || self.built_newton3 != Some(newton3) {
            self.rebuild_neighbor_lists(plan);
        }

        let data = VlcData {
            cell_particles: &self.grid.cell_particles,
            lists: &self.lists,
            dims: self.grid.block.cells_per_dim,
        };
        match plan.traversal {
            TraversalOption::VlcC01 => {
                vlc::c01(&mut self.grid.arena, &data, plan.layout, functor)
            }
            TraversalOption::VlcC18 => {
                vlc::c18(&mut self.grid.arena, &data, plan.layout, newton3, functor)
            }
            TraversalOption::VlcSliced => vlc::run_sliced(
                &mut self.grid.arena,
                &data,
                plan.layout,
                newton3,
                functor,
                SliceSchedule::Lock,
            ),
            TraversalOption::VlcSlicedC02 => vlc::run_sliced(
                &mut self.grid.arena,
                &data,
                plan.layout,
                newton3,
                functor,
                SliceSchedule::C02,
            ),
            TraversalOption::VlcSlicedBalanced => {
                let dims = self.grid.block.cells_per_dim;
                let dim = (0..3).max_by_key(|&d| dims[d]).unwrap_or(0);
                let loads = match plan.load_estimator {
                    LoadEstimatorOption::NeighborListLength => vlc::list_length_loads(&data, dim),
                    LoadEstimatorOption::SquaredParticlesPerCell => {
                        crate::estimator::neighbor_list_length_per_layer(dims, dim, |flat| {
                            let n = data.cell_particles[flat].len() as u64;
                            n * n
                        })
                    }
                    LoadEstimatorOption::None => vec![1; dims[dim]],
                };
                vlc::run_sliced(
                    &mut self.grid.arena,
                    &data,
                    plan.layout,
                    newton3,
                    functor,
                    SliceSchedule::Balanced(loads),
                )
            }
            _ => unreachable!("compatibility checked above"),
        }
        self.steps_since_rebuild += 1;
        Ok(())
    }
}

impl ParticleContainer for VerletListsCells {
    fn container_type(&self) -> ContainerOption {
        ContainerOption::VerletListsCells
    }

    fn box3(&self) -> Box3 {
        self.grid.block.box3
    }

    fn halo_box(&self) -> Box3 {
        self.grid.block.halo_box
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn skin(&self) -> f64 {
        self.skin
    }

    fn selector_info(&self) -> SelectorInfo {
        SelectorInfo {
            cells_per_dim: self.grid.block.cells_per_dim,
            cell_length: self.grid.block.cell_length,
            interaction_length: self.interaction_length(),
            cluster_size: 0,
        }
    }

    fn add_particle(&mut self, p: Particle) -> Result<()> {
        if !self.grid.block.box3.contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Owned;
        self.grid.arena.push(p);
        self.valid = false;
        Ok(())
    }

    fn add_halo_particle(&mut self, p: Particle) -> Result<()> {
        if self.grid.block.box3.contains(&p.r) || !self.grid.block.halo_box.contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Halo;
        self.grid.arena.push(p);
        self.valid = false;
        Ok(())
    }

    fn update_halo_particle(&mut self, p: &Particle) -> bool {
        let radius_sq = (self.skin / 2.0) * (self.skin / 2.0);
        for q in self.grid.arena.iter_mut() {
            if q.is_halo() && q.id == p.id && distance_squared(&q.r, &p.r) <= radius_sq {
                *q = *p;
                q.ownership = OwnershipState::Halo;
                return true;
            }
        }
        false
    }

    fn delete_halo_particles(&mut self) {
        self.grid.arena.retain(|p| !p.is_halo());
        self.valid = false;
    }

    fn delete_all_particles(&mut self) {
        self.grid.arena.clear();
        self.lists.clear();
        self.build_positions.clear();
        self.valid = false;
    }

    fn update_container(&mut self) -> Vec<Particle> {
        let box3 = self.grid.block.box3;
        let mut leaving = Vec::new();
        self.grid.arena.retain(|p| {
            if p.is_dummy() || p.is_halo() {
                return false;
            }
            if box3.contains(&p.r) {
                true
            } else {
                leaving.push(*p);
                false
            }
        });
        self.valid = false;
        leaving
    }

    fn num_particles(&self) -> usize {
        self.grid.arena.iter().filter(|p| !p.is_dummy()).count()
    }

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        for p in &self.grid.arena {
            if behavior.matches(p.ownership) {
                f(p);
            }
        }
    }

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        for p in &mut self.grid.arena {
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
        for p in &mut self.grid.arena {
            if !p.is_dummy() && pred(p) {
                p.make_dummy();
            }
        }
        self.valid = false;
    }
}
