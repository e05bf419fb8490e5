//! The option vocabulary of the engine.
//!
//! Every enum here has a stable one-byte wire code so that a
//! [`Configuration`](crate::tuning::Configuration) can be serialised into
//! the fixed 13-byte record exchanged between ranks. Codes are part of the
//! wire format; append new variants, never renumber.

use crate::error::Error;
use crate::particle::OwnershipState;
use std::fmt;

/// Which spatial data structure owns the particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ContainerOption {
    DirectSum = 0,
    LinkedCells = 1,
    VerletLists = 2,
    VerletListsCells = 3,
    VerletClusterLists = 4,
    Octree = 5,
}

impl ContainerOption {
    pub const ALL: [ContainerOption; 6] = [
        ContainerOption::DirectSum,
        ContainerOption::LinkedCells,
        ContainerOption::VerletLists,
        ContainerOption::VerletListsCells,
        ContainerOption::VerletClusterLists,
        ContainerOption::Octree,
    ];

    pub(crate) fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|o| *o as u8 == code)
            .ok_or(Error::UnknownOptionCode {
                what: "container",
                code,
            })
    }
}

impl fmt::Display for ContainerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerOption::DirectSum => "directSum",
            ContainerOption::LinkedCells => "linkedCells",
            ContainerOption::VerletLists => "verletLists",
            ContainerOption::VerletListsCells => "verletListsCells",
            ContainerOption::VerletClusterLists => "verletClusterLists",
            ContainerOption::Octree => "octree",
        })
    }
}

/// How the cells (or lists, or towers, or leaves) are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TraversalOption {
    DsSequential = 0,
    LcC01 = 1,
    LcC08 = 2,
    LcC18 = 3,
    LcSliced = 4,
    LcSlicedC02 = 5,
    LcSlicedBalanced = 6,
    VlListIteration = 7,
    VlcC01 = 8,
    VlcC18 = 9,
    VlcSliced = 10,
    VlcSlicedC02 = 11,
    VlcSlicedBalanced = 12,
    VclClusterIteration = 13,
    VclSliced = 14,
    OtC01 = 15,
    OtC18 = 16,
}

impl TraversalOption {
    pub const ALL: [TraversalOption; 17] = [
        TraversalOption::DsSequential,
        TraversalOption::LcC01,
        TraversalOption::LcC08,
        TraversalOption::LcC18,
        TraversalOption::LcSliced,
        TraversalOption::LcSlicedC02,
        TraversalOption::LcSlicedBalanced,
        TraversalOption::VlListIteration,
        TraversalOption::VlcC01,
        TraversalOption::VlcC18,
        TraversalOption::VlcSliced,
        TraversalOption::VlcSlicedC02,
        TraversalOption::VlcSlicedBalanced,
        TraversalOption::VclClusterIteration,
        TraversalOption::VclSliced,
        TraversalOption::OtC01,
        TraversalOption::OtC18,
    ];

    pub(crate) fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|o| *o as u8 == code)
            .ok_or(Error::UnknownOptionCode {
                what: "traversal",
                code,
            })
    }
}

impl fmt::Display for TraversalOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraversalOption::DsSequential => "ds_sequential",
            TraversalOption::LcC01 => "lc_c01",
            TraversalOption::LcC08 => "lc_c08",
            TraversalOption::LcC18 => "lc_c18",
            TraversalOption::LcSliced => "lc_sliced",
            TraversalOption::LcSlicedC02 => "lc_sliced_c02",
            TraversalOption::LcSlicedBalanced => "lc_sliced_balanced",
            TraversalOption::VlListIteration => "vl_list_iteration",
            TraversalOption::VlcC01 => "vlc_c01",
            TraversalOption::VlcC18 => "vlc_c18",
            TraversalOption::VlcSliced => "vlc_sliced",
            TraversalOption::VlcSlicedC02 => "vlc_sliced_c02",
            TraversalOption::VlcSlicedBalanced => "vlc_sliced_balanced",
            TraversalOption::VclClusterIteration => "vcl_cluster_iteration",
            TraversalOption::VclSliced => "vcl_sliced",
            TraversalOption::OtC01 => "ot_c01",
            TraversalOption::OtC18 => "ot_c18",
        })
    }
}

/// Memory layout the functor kernels operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DataLayout {
    Aos = 0,
    Soa = 1,
}

impl DataLayout {
    pub const ALL: [DataLayout; 2] = [DataLayout::Aos, DataLayout::Soa];

    pub(crate) fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|o| *o as u8 == code)
            .ok_or(Error::UnknownOptionCode {
                what: "data layout",
                code,
            })
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataLayout::Aos => "aos",
            DataLayout::Soa => "soa",
        })
    }
}

/// Whether the symmetric force contribution is written to the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Newton3Option {
    Disabled = 0,
    Enabled = 1,
}

impl Newton3Option {
    pub const ALL: [Newton3Option; 2] = [Newton3Option::Disabled, Newton3Option::Enabled];

    #[inline]
    pub fn enabled(self) -> bool {
        self == Newton3Option::Enabled
    }

    pub(crate) fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|o| *o as u8 == code)
            .ok_or(Error::UnknownOptionCode {
                what: "newton3",
                code,
            })
    }
}

impl fmt::Display for Newton3Option {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Newton3Option::Disabled => "disabled",
            Newton3Option::Enabled => "enabled",
        })
    }
}

/// How per-slice work is estimated for the balanced sliced traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LoadEstimatorOption {
    None = 0,
    SquaredParticlesPerCell = 1,
    NeighborListLength = 2,
}

impl LoadEstimatorOption {
    pub const ALL: [LoadEstimatorOption; 3] = [
        LoadEstimatorOption::None,
        LoadEstimatorOption::SquaredParticlesPerCell,
        LoadEstimatorOption::NeighborListLength,
    ];

    pub(crate) fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|o| *o as u8 == code)
            .ok_or(Error::UnknownOptionCode {
                what: "load estimator",
                code,
            })
    }
}

impl fmt::Display for LoadEstimatorOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadEstimatorOption::None => "none",
            LoadEstimatorOption::SquaredParticlesPerCell => "squaredParticlesPerCell",
            LoadEstimatorOption::NeighborListLength => "neighborListLength",
        })
    }
}

/// Reduction applied to the per-configuration samples of a tuning phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectorStrategy {
    /// Minimum over all samples.
    #[default]
    FastestAbs,
    /// Minimum of the per-configuration means.
    FastestMean,
    /// Minimum of the per-configuration medians.
    FastestMedian,
}

impl fmt::Display for SelectorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectorStrategy::FastestAbs => "fastestAbs",
            SelectorStrategy::FastestMean => "fastestMean",
            SelectorStrategy::FastestMedian => "fastestMedian",
        })
    }
}

/// Search strategy over the configuration space.
///
/// Only exhaustive search is implemented; the other names are accepted so
/// that configuration files round-trip, and rejected at engine build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TuningStrategyOption {
    #[default]
    FullSearch,
    Bayesian,
    Predictive,
}

impl fmt::Display for TuningStrategyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TuningStrategyOption::FullSearch => "fullSearch",
            TuningStrategyOption::Bayesian => "bayesian",
            TuningStrategyOption::Predictive => "predictive",
        })
    }
}

/// Ownership filter for particle iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IteratorBehavior {
    Owned,
    Halo,
    OwnedOrHalo,
    /// Also yields dummies; the only mode that does.
    OwnedHaloDummy,
}

impl IteratorBehavior {
    #[inline]
    pub fn matches(self, state: OwnershipState) -> bool {
        match self {
            IteratorBehavior::Owned => state == OwnershipState::Owned,
            IteratorBehavior::Halo => state == OwnershipState::Halo,
            IteratorBehavior::OwnedOrHalo => state != OwnershipState::Dummy,
            IteratorBehavior::OwnedHaloDummy => true,
        }
    }
}

/// A set of admissible cell size factors: either finitely many values or a
/// closed interval that the MPI distribution may subdivide.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberSet {
    Finite(Vec<f64>),
    Interval { min: f64, max: f64 },
}

impl NumberSet {
    /// Finite set from unsorted, possibly duplicated values.
    pub fn finite(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        values.dedup();
        NumberSet::Finite(values)
    }

    pub fn interval(min: f64, max: f64) -> Self {
        NumberSet::Interval { min, max }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, NumberSet::Finite(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            NumberSet::Finite(v) => v.is_empty(),
            NumberSet::Interval { min, max } => min > max,
        }
    }

    /// Number of discrete values; an interval counts as one slot.
    pub fn size(&self) -> usize {
        match self {
            NumberSet::Finite(v) => v.len(),
            NumberSet::Interval { .. } => 1,
        }
    }

    pub fn min(&self) -> f64 {
        match self {
            NumberSet::Finite(v) => v.first().copied().unwrap_or(f64::NAN),
            NumberSet::Interval { min, .. } => *min,
        }
    }

    pub fn max(&self) -> f64 {
        match self {
            NumberSet::Finite(v) => v.last().copied().unwrap_or(f64::NAN),
            NumberSet::Interval { max, .. } => *max,
        }
    }

    /// The discrete values used for search-space enumeration. For an
    /// interval this is its midpoint, standing in for the whole range.
    pub fn enumerable(&self) -> Vec<f64> {
        match self {
            NumberSet::Finite(v) => v.clone(),
            NumberSet::Interval { min, max } => vec![0.5 * (min + max)],
        }
    }
}
