//! The engine facade: owns the current container, drives the tuner, and
//! forwards particle management to whatever container is live.

use crate::container::{
    AnyContainer, DirectSum, LinkedCells, Octree, ParticleContainer, VerletClusterLists,
    VerletLists, VerletListsCells,
};
use crate::error::{Error, Result};
use crate::functor::Functor;
use crate::options::{
    ContainerOption, DataLayout, IteratorBehavior, LoadEstimatorOption, Newton3Option, NumberSet,
    TraversalOption,
};
use crate::particle::Particle;
use crate::traversal::{self, ApplicabilityInfo, TraversalPlan};
use crate::tuning::{enumerate_search_space, OptionSets, Tuner, TuningOptions};
use crate::util::{Box3, Timer};
use nalgebra::Point3;

/// Builder for [`Engine`]; every knob of the configuration surface.
pub struct EngineBuilder {
    box3: Box3,
    cutoff: f64,
    verlet_skin: f64,
    verlet_rebuild_frequency: u64,
    verlet_cluster_size: usize,
    options: OptionSets,
    tuning: TuningOptions,
    distribution: Option<(i32, i32)>,
}

impl EngineBuilder {
    pub fn new(box_min: Point3<f64>, box_max: Point3<f64>, cutoff: f64) -> Self {
        Self {
            box3: Box3::new(box_min, box_max),
            cutoff,
            verlet_skin: 0.2 * cutoff,
            verlet_rebuild_frequency: 20,
            verlet_cluster_size: crate::container::verlet_clusters::DEFAULT_CLUSTER_SIZE,
            options: OptionSets {
                containers: ContainerOption::ALL.to_vec(),
                cell_size_factors: NumberSet::finite(vec![1.0]),
                traversals: TraversalOption::ALL.to_vec(),
                load_estimators: LoadEstimatorOption::ALL.to_vec(),
                data_layouts: DataLayout::ALL.to_vec(),
                newton3: Newton3Option::ALL.to_vec(),
            },
            tuning: TuningOptions::default(),
            distribution: None,
        }
    }

    pub fn verlet_skin(mut self, skin: f64) -> Self {
        self.verlet_skin = skin;
        self
    }

    pub fn verlet_rebuild_frequency(mut self, frequency: u64) -> Self {
        self.verlet_rebuild_frequency = frequency;
        self
    }

    pub fn verlet_cluster_size(mut self, size: usize) -> Self {
        self.verlet_cluster_size = size;
        self
    }

    pub fn allowed_containers(mut self, containers: Vec<ContainerOption>) -> Self {
        self.options.containers = containers;
        self
    }

    pub fn allowed_traversals(mut self, traversals: Vec<TraversalOption>) -> Self {
        self.options.traversals = traversals;
        self
    }

    pub fn allowed_data_layouts(mut self, layouts: Vec<DataLayout>) -> Self {
        self.options.data_layouts = layouts;
        self
    }

    pub fn allowed_newton3(mut self, newton3: Vec<Newton3Option>) -> Self {
        self.options.newton3 = newton3;
        self
    }

    pub fn allowed_load_estimators(mut self, estimators: Vec<LoadEstimatorOption>) -> Self {
        self.options.load_estimators = estimators;
        self
    }

    pub fn cell_size_factors(mut self, factors: NumberSet) -> Self {
        self.options.cell_size_factors = factors;
        self
    }

    pub fn tuning_options(mut self, tuning: TuningOptions) -> Self {
        self.tuning = tuning;
        self
    }

    /// Restrict this engine to the search-space block of `rank` out of
    /// `comm_size` collaborating ranks.
    pub fn distributed(mut self, rank: i32, comm_size: i32) -> Self {
        self.distribution = Some((rank, comm_size));
        self
    }

    pub fn build(mut self) -> Result<Engine> {
        if self.cutoff <= 0.0 || self.verlet_skin < 0.0 {
            return Err(Error::InvalidInteractionParameters {
                cutoff: self.cutoff,
                skin: self.verlet_skin,
            });
        }
        if let Some((rank, comm_size)) = self.distribution {
            crate::tuning::distribute_configurations(&mut self.options, rank, comm_size)?;
        }
        let search_space = enumerate_search_space(&self.options);
        log::debug!("search space holds {} configurations", search_space.len());
        let tuner = Tuner::new(search_space, self.tuning)?;

        let mut engine = Engine {
            box3: self.box3,
            cutoff: self.cutoff,
            verlet_skin: self.verlet_skin,
            verlet_rebuild_frequency: self.verlet_rebuild_frequency,
            verlet_cluster_size: self.verlet_cluster_size,
            container: AnyContainer::DirectSum(DirectSum::new(
                self.box3,
                self.cutoff,
                self.verlet_skin,
            )?),
            materialized: None,
            tuner,
        };
        let first = engine.tuner.current_configuration();
        engine.materialize(&first)?;
        Ok(engine)
    }
}

pub struct Engine {
    box3: Box3,
    cutoff: f64,
    verlet_skin: f64,
    verlet_rebuild_frequency: u64,
    verlet_cluster_size: usize,
    container: AnyContainer,
    /// Which `(container, cellSizeFactor)` the live container realises.
    materialized: Option<(ContainerOption, u64)>,
    tuner: Tuner,
}

impl Engine {
    pub fn builder(box_min: Point3<f64>, box_max: Point3<f64>, cutoff: f64) -> EngineBuilder {
        EngineBuilder::new(box_min, box_max, cutoff)
    }

    pub fn container(&self) -> &AnyContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut AnyContainer {
        &mut self.container
    }

    pub fn current_configuration(&self) -> crate::tuning::Configuration {
        self.tuner.current_configuration()
    }

    pub fn is_tuning(&self) -> bool {
        self.tuner.is_tuning()
    }

    /// Compute all pairwise interactions of this time step. Returns whether
    /// the iteration was part of a tuning phase.
    pub fn iterate_pairwise<F: Functor>(&mut self, functor: &F) -> Result<bool> {
        let relevant = functor.is_relevant_for_tuning();
        let mut config = if relevant {
            self.tuner.begin_iteration()
        } else {
            self.tuner.current_configuration()
        };

        // a tuning phase may surface configurations that cannot run here;
        // skip them, bounded by the search-space size
        let mut attempts = self.tuner.search_space().len() + 1;
        loop {
            self.materialize(&config)?;
            let info =
                ApplicabilityInfo::from_functor(self.container.selector_info().cells_per_dim, functor);
            let applicable = traversal::is_applicable(
                config.traversal,
                config.data_layout,
                config.newton3,
                &info,
            );
            if applicable {
                break;
            }
            if !(relevant && self.tuner.is_tuning()) || attempts == 0 {
                return Err(Error::InapplicableTraversal {
                    traversal: config.traversal,
                });
            }
            self.tuner.skip_current();
            config = self.tuner.current_configuration();
            attempts -= 1;
        }

        let plan = TraversalPlan::new(config.traversal, config.data_layout, config.newton3)
            .with_estimator(config.load_estimator);
        if self.container.neighbor_lists_need_rebuild() {
            self.container.rebuild_neighbor_lists(&plan);
        }

        let was_tuning = self.tuner.is_tuning();
        let timer = Timer::start();
        self.container.iterate_pairwise(&plan, functor)?;
        if relevant {
            self.tuner.record_sample(timer.elapsed_nanos());
        }
        Ok(was_tuning)
    }

    /// Swap the live container for the one the configuration requires,
    /// carrying every particle over.
    fn materialize(&mut self, config: &crate::tuning::Configuration) -> Result<()> {
        let wanted = (config.container, config.cell_size_factor.to_bits());
        if self.materialized == Some(wanted) {
            return Ok(());
        }

        let mut fresh = self.make_container(config.container, config.cell_size_factor)?;
        let mut owned = Vec::new();
        let mut halo = Vec::new();
        self.container.for_each(IteratorBehavior::OwnedOrHalo, &mut |p| {
            if p.is_owned() {
                owned.push(*p);
            } else {
                halo.push(*p);
            }
        });
        for p in owned {
            fresh.add_particle(p)?;
        }
        for p in halo {
            fresh.add_halo_particle(p)?;
        }
        log::debug!(
            "materialized {} (cellSizeFactor {})",
            config.container,
            config.cell_size_factor
        );
        self.container = fresh;
        self.materialized = Some(wanted);
        Ok(())
    }

    fn make_container(&self, option: ContainerOption, csf: f64) -> Result<AnyContainer> {
        Ok(match option {
            ContainerOption::DirectSum => {
                AnyContainer::DirectSum(DirectSum::new(self.box3, self.cutoff, self.verlet_skin)?)
            }
            ContainerOption::LinkedCells => AnyContainer::LinkedCells(LinkedCells::new(
                self.box3,
                self.cutoff,
                self.verlet_skin,
                csf,
            )?),
            ContainerOption::VerletLists => AnyContainer::VerletLists(VerletLists::new(
                self.box3,
                self.cutoff,
                self.verlet_skin,
                self.verlet_rebuild_frequency,
                csf.max(1.0),
            )?),
            ContainerOption::VerletListsCells => {
                AnyContainer::VerletListsCells(VerletListsCells::new(
                    self.box3,
                    self.cutoff,
                    self.verlet_skin,
                    self.verlet_rebuild_frequency,
                    csf.max(1.0),
                )?)
            }
            ContainerOption::VerletClusterLists => {
                AnyContainer::VerletClusterLists(VerletClusterLists::new(
                    self.box3,
                    self.cutoff,
                    self.verlet_skin,
                    self.verlet_rebuild_frequency,
                    self.verlet_cluster_size,
                )?)
            }
            ContainerOption::Octree => {
                AnyContainer::Octree(Octree::new(self.box3, self.cutoff, self.verlet_skin)?)
            }
        })
    }

    /// Homogeneity (standard deviation of bin densities) and maximum bin
    /// density of the owned particles: the inputs of the rank-similarity
    /// bucketing.
    pub fn homogeneity_and_max_density(&self) -> (f64, f64) {
        let n = {
            let mut count = 0usize;
            self.container.for_each(IteratorBehavior::Owned, &mut |_| count += 1);
            count
        };
        if n == 0 {
            return (0.0, 0.0);
        }
        // roughly ten particles per bin
        let bins_per_dim = (((n as f64) / 10.0).cbrt().ceil() as usize).max(1);
        let mut counts = vec![0usize; bins_per_dim.pow(3)];
        let side = self.box3.max - self.box3.min;
        self.container.for_each(IteratorBehavior::Owned, &mut |p| {
            let mut idx = [0usize; 3];
            for d in 0..3 {
                let rel = (p.r[d] - self.box3.min[d]) / side[d];
                idx[d] = ((rel * bins_per_dim as f64) as usize).min(bins_per_dim - 1);
            }
            counts[(idx[2] * bins_per_dim + idx[1]) * bins_per_dim + idx[0]] += 1;
        });
        let bin_volume = side[0] * side[1] * side[2] / counts.len() as f64;
        let densities: Vec<f64> = counts.iter().map(|&c| c as f64 / bin_volume).collect();
        let mean = densities.iter().sum::<f64>() / densities.len() as f64;
        let variance = densities
            .iter()
            .map(|d| (d - mean) * (d - mean))
            .sum::<f64>()
            / densities.len() as f64;
        let max = densities.iter().copied().fold(0.0f64, f64::max);
        (variance.sqrt(), max)
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<()> {
        self.container.add_particle(p)
    }

    pub fn add_halo_particle(&mut self, p: Particle) -> Result<()> {
        self.container.add_halo_particle(p)
    }

    pub fn update_halo_particle(&mut self, p: &Particle) -> bool {
        self.container.update_halo_particle(p)
    }

    pub fn delete_halo_particles(&mut self) {
        self.container.delete_halo_particles()
    }

    pub fn update_container(&mut self) -> Vec<Particle> {
        self.container.update_container()
    }

    pub fn num_particles(&self) -> usize {
        self.container.num_particles()
    }

    pub fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        self.container.for_each(behavior, f)
    }

    pub fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        self.container.for_each_mut(behavior, f)
    }

    pub fn for_each_in_region(
        &self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&Particle),
    ) -> Result<()> {
        self.container.for_each_in_region(min, max, behavior, f)
    }

    /// Delete every particle matching the predicate. The container repairs
    /// itself before the next pairwise iteration.
    pub fn delete_if(&mut self, pred: &mut dyn FnMut(&Particle) -> bool) {
        self.container.delete_if(pred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::testing::LjFunctor;
    use rand::prelude::*;

    fn engine_with(n: usize, tuning: TuningOptions) -> Engine {
        let mut engine = Engine::builder(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(6.0, 6.0, 6.0),
            1.2,
        )
        .verlet_skin(0.3)
        .tuning_options(tuning)
        .build()
        .unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        for id in 0..n {
            let r = Point3::new(
                rng.gen::<f64>() * 6.0,
                rng.gen::<f64>() * 6.0,
                rng.gen::<f64>() * 6.0,
            );
            engine.add_particle(Particle::new(id as u64, r)).unwrap();
        }
        engine
    }

    #[test]
    fn test_tuning_sweep_commits() {
        let tuning = TuningOptions {
            num_samples: 1,
            tuning_interval: 1000,
            ..TuningOptions::default()
        };
        let mut engine = engine_with(120, tuning);
        let functor = LjFunctor::new(1.2);
        let budget = engine.tuner.search_space().len() + 8;
        let mut iterations = 0;
        while engine.is_tuning() && iterations < budget {
            engine.iterate_pairwise(&functor).unwrap();
            iterations += 1;
        }
        assert!(!engine.is_tuning(), "sweep must terminate");
        // committed configuration keeps working
        engine.iterate_pairwise(&functor).unwrap();
        assert_eq!(engine.num_particles(), 120);
    }

    #[test]
    fn test_forces_stable_across_container_switches() {
        // measure a full tuning sweep; every iteration recomputes forces
        // from scratch on top of the previous ones, so instead compare two
        // engines pinned to different containers
        let functor = LjFunctor::new(1.2);
        let mut reference: Option<Vec<(u64, nalgebra::Vector3<f64>)>> = None;
        for container in [
            ContainerOption::LinkedCells,
            ContainerOption::DirectSum,
            ContainerOption::VerletLists,
        ] {
            let mut engine = Engine::builder(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(6.0, 6.0, 6.0),
                1.2,
            )
            .verlet_skin(0.3)
            .allowed_containers(vec![container])
            .tuning_options(TuningOptions {
                num_samples: 1,
                ..TuningOptions::default()
            })
            .build()
            .unwrap();
            let mut rng = StdRng::seed_from_u64(7);
            for id in 0..100 {
                let r = Point3::new(
                    rng.gen::<f64>() * 6.0,
                    rng.gen::<f64>() * 6.0,
                    rng.gen::<f64>() * 6.0,
                );
                engine.add_particle(Particle::new(id as u64, r)).unwrap();
            }
            engine.iterate_pairwise(&functor).unwrap();
            let mut forces = Vec::new();
            engine.for_each(IteratorBehavior::Owned, &mut |p| forces.push((p.id, p.f)));
            forces.sort_by_key(|(id, _)| *id);
            match &reference {
                None => reference = Some(forces),
                Some(reference) => {
                    let scale = reference
                        .iter()
                        .map(|(_, f)| f.norm())
                        .fold(1.0f64, f64::max);
                    for ((ia, fa), (_, fb)) in forces.iter().zip(reference.iter()) {
                        assert!(
                            (fa - fb).norm() <= 1e-10 * scale,
                            "{container}, particle {ia}: {fa} vs {fb}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_homogeneity_of_uniform_cloud() {
        let engine = engine_with(1000, TuningOptions::default());
        let (homogeneity, max_density) = engine.homogeneity_and_max_density();
        let mean_density = 1000.0 / (6.0f64.powi(3));
        assert!(max_density >= mean_density);
        assert!(homogeneity < mean_density, "uniform cloud varies mildly");
    }

    #[test]
    fn test_empty_engine_iterates() {
        let mut engine = engine_with(0, TuningOptions::default());
        let functor = LjFunctor::new(1.2);
        engine.iterate_pairwise(&functor).unwrap();
        assert_eq!(engine.num_particles(), 0);
    }
}
