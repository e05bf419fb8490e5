//! Search-space enumeration: the filtered cartesian product of the allowed
//! option sets.

use crate::estimator::applicable_estimators;
use crate::options::{
    ContainerOption, DataLayout, Newton3Option, NumberSet, TraversalOption,
};
use crate::tuning::communicator::OptionSets;
use crate::tuning::Configuration;
use crate::traversal::compatible_traversals;

/// All configurations of the cartesian product that pass the static
/// filters: container-compatible traversals, applicable load estimators,
/// and the octree's cell-size-factor floor. An interval of cell size
/// factors contributes its midpoint as a stand-in value.
///
/// Dynamic applicability (domain size, functor capabilities) is checked
/// later, per tuning iteration.
pub fn enumerate_search_space(options: &OptionSets) -> Vec<Configuration> {
    let csf_values: Vec<f64> = options.cell_size_factors.enumerable();
    let mut out = Vec::new();
    for &container in &options.containers {
        let traversals: Vec<TraversalOption> = compatible_traversals(container)
            .iter()
            .copied()
            .filter(|t| options.traversals.contains(t))
            .collect();
        for &traversal in &traversals {
            let estimators =
                applicable_estimators(container, traversal, &options.load_estimators);
            for &csf in &csf_values {
                // the octree split criterion assumes at least one
                // interaction length per cell
                if container == ContainerOption::Octree && csf < 1.0 {
                    continue;
                }
                for &estimator in &estimators {
                    for &layout in &options.data_layouts {
                        for &newton3 in &options.newton3 {
                            out.push(Configuration::new(
                                container, csf, traversal, estimator, layout, newton3,
                            ));
                        }
                    }
                }
            }
        }
    }
    out
}

/// Option sets admitting everything, the default configuration surface.
#[cfg(test)]
pub(crate) fn full_option_sets() -> OptionSets {
    OptionSets {
        containers: ContainerOption::ALL.to_vec(),
        cell_size_factors: NumberSet::finite(vec![1.0]),
        traversals: TraversalOption::ALL.to_vec(),
        load_estimators: crate::options::LoadEstimatorOption::ALL.to_vec(),
        data_layouts: DataLayout::ALL.to_vec(),
        newton3: Newton3Option::ALL.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LoadEstimatorOption;

    #[test]
    fn test_enumeration_respects_compatibility() {
        let space = enumerate_search_space(&full_option_sets());
        assert!(!space.is_empty());
        for config in &space {
            assert!(
                compatible_traversals(config.container).contains(&config.traversal),
                "{config}"
            );
        }
    }

    #[test]
    fn test_estimators_only_where_applicable() {
        let space = enumerate_search_space(&full_option_sets());
        for config in &space {
            if config.load_estimator != LoadEstimatorOption::None {
                assert!(
                    matches!(
                        config.traversal,
                        TraversalOption::LcSlicedBalanced | TraversalOption::VlcSlicedBalanced
                    ),
                    "{config}"
                );
            }
        }
    }

    #[test]
    fn test_octree_csf_floor() {
        let mut options = full_option_sets();
        options.cell_size_factors = NumberSet::finite(vec![0.5, 1.0]);
        let space = enumerate_search_space(&options);
        assert!(space
            .iter()
            .filter(|c| c.container == ContainerOption::Octree)
            .all(|c| c.cell_size_factor >= 1.0));
        // other containers keep both factors
        assert!(space
            .iter()
            .any(|c| c.container == ContainerOption::LinkedCells && c.cell_size_factor == 0.5));
    }

    #[test]
    fn test_size_matches_enumeration() {
        let options = full_option_sets();
        let space = enumerate_search_space(&options);
        assert_eq!(space.len(), crate::tuning::search_space_size(&options));
    }
}
