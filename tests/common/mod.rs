//! Shared kernels and point clouds for the integration suites.

use nalgebra::{Point3, Vector3};
use rand::prelude::*;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use tunell::{Functor, Particle, Soa};

/// Generate a uniformly random 3d point cloud of size `n` inside a cuboid
/// spanning `[origin, origin + vol)`, with a fixed seed for reproducibility.
pub fn generate_points_random(n: usize, vol: [f64; 3], origin: [f64; 3], seed: Option<u64>) -> Vec<Point3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or(3079380797442975911));
    std::iter::repeat_with(|| {
        Point3::new(
            origin[0] + rng.gen::<f64>() * vol[0],
            origin[1] + rng.gen::<f64>() * vol[1],
            origin[2] + rng.gen::<f64>() * vol[2],
        )
    })
    .take(n)
    .collect()
}

/// Counts kernel invocations; thread safe because traversals share the
/// functor across the pool.
#[derive(Default)]
pub struct CountFunctor {
    pub aos_calls: AtomicUsize,
}

impl CountFunctor {
    pub fn count(&self) -> usize {
        self.aos_calls.load(Ordering::Relaxed)
    }
}

impl Functor for CountFunctor {
    fn aos(&self, _i: &mut Particle, _j: &mut Particle, _newton3: bool) {
        self.aos_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Dimensionless truncated 12-6 Lennard-Jones with epsilon = sigma = 1,
/// with the full SoA kernel family.
pub struct LjFunctor {
    cutoff_squared: f64,
}

impl LjFunctor {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff_squared: cutoff * cutoff,
        }
    }

    fn force(&self, ri: Point3<f64>, rj: Point3<f64>) -> Option<Vector3<f64>> {
        let dsq = (ri - rj).norm_squared();
        if dsq > self.cutoff_squared || dsq == 0.0 {
            return None;
        }
        let inv = dsq.recip();
        let lj6 = inv * inv * inv;
        let lj12 = lj6 * lj6;
        Some((ri - rj) * (24.0 * inv * (2.0 * lj12 - lj6)))
    }

    fn soa_point(soa: &Soa, i: usize) -> Point3<f64> {
        Point3::new(soa.rx[i], soa.ry[i], soa.rz[i])
    }

    fn add(soa: &mut Soa, i: usize, f: Vector3<f64>) {
        soa.fx[i] += f[0];
        soa.fy[i] += f[1];
        soa.fz[i] += f[2];
    }
}

impl Functor for LjFunctor {
    fn aos(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
        if let Some(f) = self.force(i.r, j.r) {
            i.f += f;
            if newton3 {
                j.f -= f;
            }
        }
    }

    fn soa_single(&self, cell: &mut Soa, _newton3: bool) {
        for i in 0..cell.len() {
            if cell.is_dummy(i) {
                continue;
            }
            for j in (i + 1)..cell.len() {
                if cell.is_dummy(j) {
                    continue;
                }
                if let Some(f) = self.force(Self::soa_point(cell, i), Self::soa_point(cell, j)) {
                    Self::add(cell, i, f);
                    Self::add(cell, j, -f);
                }
            }
        }
    }

    fn soa_pair(&self, a: &mut Soa, b: &mut Soa, newton3: bool) {
        for i in 0..a.len() {
            if a.is_dummy(i) {
                continue;
            }
            for j in 0..b.len() {
                if b.is_dummy(j) {
                    continue;
                }
                if let Some(f) = self.force(Self::soa_point(a, i), Self::soa_point(b, j)) {
                    Self::add(a, i, f);
                    if newton3 {
                        Self::add(b, j, -f);
                    }
                }
            }
        }
    }

    fn soa_view_pair(&self, soa: &mut Soa, a: Range<usize>, b: Range<usize>, newton3: bool) {
        let same = a == b;
        for i in a {
            if soa.is_dummy(i) {
                continue;
            }
            for j in b.clone() {
                if j == i || soa.is_dummy(j) || (same && newton3 && j < i) {
                    continue;
                }
                if let Some(f) = self.force(Self::soa_point(soa, i), Self::soa_point(soa, j)) {
                    Self::add(soa, i, f);
                    if newton3 {
                        Self::add(soa, j, -f);
                    }
                }
            }
        }
    }

    fn soa_two_view_pair(
        &self,
        a: &mut Soa,
        a_view: Range<usize>,
        b: &mut Soa,
        b_view: Range<usize>,
        newton3: bool,
    ) {
        for i in a_view {
            if a.is_dummy(i) {
                continue;
            }
            for j in b_view.clone() {
                if b.is_dummy(j) {
                    continue;
                }
                if let Some(f) = self.force(Self::soa_point(a, i), Self::soa_point(b, j)) {
                    Self::add(a, i, f);
                    if newton3 {
                        Self::add(b, j, -f);
                    }
                }
            }
        }
    }

    fn soa_verlet(&self, soa: &mut Soa, i: usize, neighbors: &[u32], newton3: bool) {
        if soa.is_dummy(i) {
            return;
        }
        for &j in neighbors {
            let j = j as usize;
            if soa.is_dummy(j) {
                continue;
            }
            if let Some(f) = self.force(Self::soa_point(soa, i), Self::soa_point(soa, j)) {
                Self::add(soa, i, f);
                if newton3 {
                    Self::add(soa, j, -f);
                }
            }
        }
    }

    fn provides_soa(&self) -> bool {
        true
    }
}
