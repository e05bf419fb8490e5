//! The traversal family: ordered walks over cell pairs.
//!
//! A traversal is identified by its `(option, data layout, newton3)`
//! triple. The schedules (colourings, slicings, partitions) live in the
//! per-family submodules; this module holds the plan type, the
//! applicability rules and the container compatibility table.

pub(crate) mod ds;
pub(crate) mod kernel;
pub(crate) mod lc;
pub(crate) mod ot;
pub(crate) mod sliced;
pub(crate) mod vcl;
pub(crate) mod vl;
pub(crate) mod vlc;

use crate::options::{
    ContainerOption, DataLayout, LoadEstimatorOption, Newton3Option, TraversalOption,
};

/// A fully resolved traversal choice, ready to be executed by a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalPlan {
    pub traversal: TraversalOption,
    pub layout: DataLayout,
    pub newton3: Newton3Option,
    pub load_estimator: LoadEstimatorOption,
}

impl TraversalPlan {
    pub fn new(traversal: TraversalOption, layout: DataLayout, newton3: Newton3Option) -> Self {
        Self {
            traversal,
            layout,
            newton3,
            load_estimator: LoadEstimatorOption::None,
        }
    }

    pub fn with_estimator(mut self, estimator: LoadEstimatorOption) -> Self {
        self.load_estimator = estimator;
        self
    }
}

/// Everything `is_applicable` needs to know about the current domain and
/// the functor.
#[derive(Debug, Clone, Copy)]
pub struct ApplicabilityInfo {
    /// Cells per dimension including halo layers (towers as `(x, y, 1)`,
    /// trees as `(1, 1, 1)`).
    pub cells_per_dim: [usize; 3],
    /// Worker threads the schedule may assume.
    pub threads: usize,
    pub functor_provides_soa: bool,
    pub functor_allows_newton3: bool,
    pub functor_allows_non_newton3: bool,
}

impl ApplicabilityInfo {
    pub(crate) fn from_functor<F: crate::functor::Functor>(
        cells_per_dim: [usize; 3],
        functor: &F,
    ) -> Self {
        Self {
            cells_per_dim,
            threads: crate::util::parallel::max_threads(),
            functor_provides_soa: functor.provides_soa(),
            functor_allows_newton3: functor.allows_newton3(),
            functor_allows_non_newton3: functor.allows_non_newton3(),
        }
    }
}

/// The compatible traversals of each container. Fixed table; the search
/// space enumeration intersects it with the allowed options.
pub fn compatible_traversals(container: ContainerOption) -> &'static [TraversalOption] {
    use TraversalOption::*;
    match container {
        ContainerOption::DirectSum => &[DsSequential],
        ContainerOption::LinkedCells => &[
            LcC01,
            LcC08,
            LcC18,
            LcSliced,
            LcSlicedC02,
            LcSlicedBalanced,
        ],
        ContainerOption::VerletLists => &[VlListIteration],
        ContainerOption::VerletListsCells => &[
            VlcC01,
            VlcC18,
            VlcSliced,
            VlcSlicedC02,
            VlcSlicedBalanced,
        ],
        ContainerOption::VerletClusterLists => &[VclClusterIteration, VclSliced],
        ContainerOption::Octree => &[OtC01, OtC18],
    }
}

/// A sliced schedule needs enough layers along its slice dimension to give
/// every thread a slice of at least the overlap thickness.
fn sliced_applicable(info: &ApplicabilityInfo) -> bool {
    let longest = *info.cells_per_dim.iter().max().unwrap_or(&0);
    longest >= 2 * info.threads.max(1)
}

/// Whether the `(traversal, layout, newton3)` triple can run on the current
/// domain with the current functor. Never an error; the selector skips
/// inapplicable configurations during enumeration.
pub fn is_applicable(
    traversal: TraversalOption,
    layout: DataLayout,
    newton3: Newton3Option,
    info: &ApplicabilityInfo,
) -> bool {
    use TraversalOption::*;

    if layout == DataLayout::Soa && !info.functor_provides_soa {
        return false;
    }
    if newton3.enabled() && !info.functor_allows_newton3 {
        return false;
    }
    if !newton3.enabled() && !info.functor_allows_non_newton3 {
        return false;
    }

    match traversal {
        DsSequential => true,
        // per-cell colouring cannot write into neighbours
        LcC01 => !newton3.enabled(),
        LcC08 => info.cells_per_dim.iter().all(|&d| d >= 2),
        LcC18 => true,
        LcSliced | LcSlicedC02 | LcSlicedBalanced => sliced_applicable(info),
        VlListIteration => !newton3.enabled(),
        VlcC01 => !newton3.enabled(),
        VlcC18 => true,
        VlcSliced | VlcSlicedBalanced => sliced_applicable(info),
        VlcSlicedC02 => layout == DataLayout::Aos && sliced_applicable(info),
        VclClusterIteration => !newton3.enabled(),
        VclSliced => !newton3.enabled() && sliced_applicable(info),
        OtC01 => !newton3.enabled(),
        OtC18 => newton3.enabled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(cells: [usize; 3], threads: usize) -> ApplicabilityInfo {
        ApplicabilityInfo {
            cells_per_dim: cells,
            threads,
            functor_provides_soa: true,
            functor_allows_newton3: true,
            functor_allows_non_newton3: true,
        }
    }

    #[test]
    fn test_c01_rejects_newton3() {
        let i = info([10, 10, 10], 4);
        assert!(!is_applicable(
            TraversalOption::LcC01,
            DataLayout::Aos,
            Newton3Option::Enabled,
            &i
        ));
        assert!(is_applicable(
            TraversalOption::LcC01,
            DataLayout::Aos,
            Newton3Option::Disabled,
            &i
        ));
    }

    #[test]
    fn test_sliced_needs_enough_layers() {
        let wide = info([32, 4, 4], 4);
        let narrow = info([6, 4, 4], 4);
        for t in [
            TraversalOption::LcSliced,
            TraversalOption::LcSlicedC02,
            TraversalOption::LcSlicedBalanced,
        ] {
            assert!(is_applicable(t, DataLayout::Aos, Newton3Option::Enabled, &wide));
            assert!(!is_applicable(t, DataLayout::Aos, Newton3Option::Enabled, &narrow));
        }
    }

    #[test]
    fn test_soa_requires_functor_support() {
        let mut i = info([10, 10, 10], 1);
        i.functor_provides_soa = false;
        assert!(!is_applicable(
            TraversalOption::LcC08,
            DataLayout::Soa,
            Newton3Option::Enabled,
            &i
        ));
        assert!(is_applicable(
            TraversalOption::LcC08,
            DataLayout::Aos,
            Newton3Option::Enabled,
            &i
        ));
    }

    #[test]
    fn test_octree_newton3_split() {
        let i = info([1, 1, 1], 8);
        assert!(is_applicable(
            TraversalOption::OtC18,
            DataLayout::Aos,
            Newton3Option::Enabled,
            &i
        ));
        assert!(!is_applicable(
            TraversalOption::OtC18,
            DataLayout::Aos,
            Newton3Option::Disabled,
            &i
        ));
        assert!(is_applicable(
            TraversalOption::OtC01,
            DataLayout::Aos,
            Newton3Option::Disabled,
            &i
        ));
    }

    #[test]
    fn test_vlc_sliced_c02_is_aos_only() {
        let i = info([32, 8, 8], 2);
        assert!(!is_applicable(
            TraversalOption::VlcSlicedC02,
            DataLayout::Soa,
            Newton3Option::Enabled,
            &i
        ));
        assert!(is_applicable(
            TraversalOption::VlcSlicedC02,
            DataLayout::Aos,
            Newton3Option::Enabled,
            &i
        ));
    }

    #[test]
    fn test_compatibility_table_is_disjoint_prefixed() {
        // every traversal belongs to exactly one container family
        let mut seen = std::collections::HashSet::new();
        for c in ContainerOption::ALL {
            for t in compatible_traversals(c) {
                assert!(seen.insert(*t), "{t} listed for two containers");
            }
        }
        assert_eq!(seen.len(), TraversalOption::ALL.len());
    }
}
