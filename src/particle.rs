use nalgebra::{Point3, Vector3};
use std::fmt;

/// Ownership of a particle with respect to the local sub-domain.
///
/// Dummies are structural filler (cluster padding, lazily deleted entries);
/// they are not actual particles and are skipped by every iteration mode
/// except the explicit owned|halo|dummy one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OwnershipState {
    Dummy = 0,
    Owned = 1,
    Halo = 2,
}

impl fmt::Display for OwnershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OwnershipState::Dummy => "dummy",
            OwnershipState::Owned => "owned",
            OwnershipState::Halo => "halo",
        })
    }
}

/// A point particle. The engine reads positions, accumulates forces and
/// never touches velocities; they ride along for the caller's integrator.
///
/// Ids are opaque to the engine, uniqueness is the caller's contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub id: u64,
    pub type_id: u32,
    pub r: Point3<f64>,
    pub v: Vector3<f64>,
    pub f: Vector3<f64>,
    pub ownership: OwnershipState,
}

impl Particle {
    /// An owned particle at rest.
    pub fn new(id: u64, r: Point3<f64>) -> Self {
        Self {
            id,
            type_id: 0,
            r,
            v: Vector3::zeros(),
            f: Vector3::zeros(),
            ownership: OwnershipState::Owned,
        }
    }

    pub fn halo(id: u64, r: Point3<f64>) -> Self {
        Self {
            ownership: OwnershipState::Halo,
            ..Self::new(id, r)
        }
    }

    #[inline]
    pub fn is_dummy(&self) -> bool {
        self.ownership == OwnershipState::Dummy
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.ownership == OwnershipState::Owned
    }

    #[inline]
    pub fn is_halo(&self) -> bool {
        self.ownership == OwnershipState::Halo
    }

    /// Turn this slot into structural filler. Position is kept; the dummy
    /// is swept out at the next structural rebuild.
    pub fn make_dummy(&mut self) {
        self.ownership = OwnershipState::Dummy;
    }
}
