//! The unit of spatial storage: an unordered bag of particles with an
//! optional columnar mirror.

use crate::functor::Functor;
use crate::particle::Particle;
use crate::soa::Soa;

/// One cell of a container.
///
/// The AoS side (`particles`) is authoritative. The SoA mirror is only
/// consistent between an explicit [`Cell::load_soa`] and
/// [`Cell::extract_soa`]; any structural mutation in between voids it.
#[derive(Debug, Default, Clone)]
pub struct Cell {
    pub(crate) particles: Vec<Particle>,
    pub(crate) soa: Soa,
}

impl Cell {
    pub fn push(&mut self, p: Particle) {
        self.particles.push(p);
    }

    /// Number of slots including dummies.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of actual (non-dummy) particles.
    pub fn num_actual(&self) -> usize {
        self.particles.iter().filter(|p| !p.is_dummy()).count()
    }

    /// Iterate the actual particles, skipping dummies.
    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter().filter(|p| !p.is_dummy())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.particles.iter_mut().filter(|p| !p.is_dummy())
    }

    /// Iterate every slot, dummies included.
    pub fn iter_all(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.soa.clear();
    }

    /// Remove the slot at `index` without preserving order.
    pub fn swap_remove(&mut self, index: usize) -> Particle {
        self.particles.swap_remove(index)
    }

    /// Drop all dummy slots.
    pub fn compact(&mut self) {
        self.particles.retain(|p| !p.is_dummy());
    }

    /// Sort slots by the z coordinate. Used by the cluster towers.
    pub fn sort_by_z(&mut self) {
        self.particles
            .sort_by(|a, b| a.r[2].total_cmp(&b.r[2]));
    }

    /// Populate the SoA mirror through the functor's loader.
    pub fn load_soa<F: Functor>(&mut self, functor: &F) {
        let mut soa = std::mem::take(&mut self.soa);
        functor.soa_load(&self.particles, &mut soa);
        self.soa = soa;
    }

    /// Drain the SoA mirror back into the particles through the functor's
    /// extractor.
    pub fn extract_soa<F: Functor>(&mut self, functor: &F) {
        let soa = std::mem::take(&mut self.soa);
        functor.soa_extract(&mut self.particles, &soa);
        self.soa = soa;
        self.soa.clear();
    }
}
