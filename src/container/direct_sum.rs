//! The trivial container: all owned particles in one cell, all halo
//! particles in a second one. Wins for small and dense scenarios where any
//! index structure is pure overhead.

use crate::cell::Cell;
use crate::container::{check_region, in_region, ParticleContainer, SelectorInfo};
use crate::error::{Error, Result};
use crate::functor::Functor;
use crate::options::{ContainerOption, IteratorBehavior, TraversalOption};
use crate::particle::{OwnershipState, Particle};
use crate::traversal::{ds, kernel::CellKernel, TraversalPlan};
use crate::util::{distance_squared, Box3};
use nalgebra::Point3;

pub struct DirectSum {
    owned: Cell,
    halo: Cell,
    box3: Box3,
    cutoff: f64,
    skin: f64,
}

impl DirectSum {
    pub fn new(box3: Box3, cutoff: f64, skin: f64) -> Result<Self> {
        if cutoff <= 0.0 || skin < 0.0 {
            return Err(Error::InvalidInteractionParameters { cutoff, skin });
        }
        Ok(Self {
            owned: Cell::default(),
            halo: Cell::default(),
            box3,
            cutoff,
            skin,
        })
    }

    pub fn iterate_pairwise<F: Functor>(&mut self, plan: &TraversalPlan, functor: &F) -> Result<()> {
        if plan.traversal != TraversalOption::DsSequential {
            return Err(Error::ContainerMismatch {
                container: self.container_type(),
                traversal: plan.traversal,
            });
        }
        let kernel = CellKernel::new(functor, plan);
        if plan.layout == crate::options::DataLayout::Soa {
            self.owned.load_soa(functor);
            self.halo.load_soa(functor);
        }
        ds::sequential(&mut self.owned, &mut self.halo, &kernel);
        if plan.layout == crate::options::DataLayout::Soa {
            self.owned.extract_soa(functor);
            self.halo.extract_soa(functor);
        }
        Ok(())
    }

    fn cells(&self) -> [&Cell; 2] {
        [&self.owned, &self.halo]
    }
}

impl ParticleContainer for DirectSum {
    fn container_type(&self) -> ContainerOption {
        ContainerOption::DirectSum
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
        let side = self.box3.max - self.box3.min;
        SelectorInfo {
            cells_per_dim: [1, 1, 1],
            cell_length: [side[0], side[1], side[2]],
            interaction_length: self.interaction_length(),
            cluster_size: 0,
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
        self.owned.push(p);
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
        self.halo.push(p);
        Ok(())
    }

    fn update_halo_particle(&mut self, p: &Particle) -> bool {
        let radius_sq = (self.skin / 2.0) * (self.skin / 2.0);
        for q in self.halo.iter_mut() {
            if q.id == p.id && distance_squared(&q.r, &p.r) <= radius_sq {
                *q = *p;
                q.ownership = OwnershipState::Halo;
                return true;
            }
        }
        false
    }

    fn delete_halo_particles(&mut self) {
        self.halo.clear();
    }

    fn delete_all_particles(&mut self) {
        self.owned.clear();
        self.halo.clear();
    }

    fn update_container(&mut self) -> Vec<Particle> {
        self.delete_halo_particles();
        let box3 = self.box3;
        let mut leaving = Vec::new();
        self.owned.particles.retain(|p| {
            if p.is_dummy() {
                return false;
            }
            if box3.contains(&p.r) {
                true
            } else {
                leaving.push(*p);
                false
            }
        });
        leaving
    }

    fn num_particles(&self) -> usize {
        self.owned.num_actual() + self.halo.num_actual()
    }

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        for cell in self.cells() {
            for p in cell.iter_all() {
                if behavior.matches(p.ownership) {
                    f(p);
                }
            }
        }
    }

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        for cell in [&mut self.owned, &mut self.halo] {
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
        for cell in [&mut self.owned, &mut self.halo] {
            for p in cell.particles.iter_mut() {
                if !p.is_dummy() && pred(p) {
                    p.make_dummy();
                }
            }
            cell.compact();
        }
    }
}
