//! Load estimators for the balanced sliced schedules.
//!
//! An estimator condenses a layer of the base-step space into one scalar
//! that approximates the pair work hiding in it. The balanced slicer then
//! cuts the domain so every slice carries about the same aggregate.

use crate::cell::Cell;
use crate::options::{ContainerOption, LoadEstimatorOption, TraversalOption};
use crate::util::three_to_one;

/// Load estimators that make sense for the given container/traversal
/// combination, restricted to the allowed set. Falls back to `none` when
/// nothing applies, so a configuration always exists.
pub fn applicable_estimators(
    container: ContainerOption,
    traversal: TraversalOption,
    allowed: &[LoadEstimatorOption],
) -> Vec<LoadEstimatorOption> {
    let applicable: &[LoadEstimatorOption] = match (container, traversal) {
        (ContainerOption::LinkedCells, TraversalOption::LcSlicedBalanced) => &[
            LoadEstimatorOption::None,
            LoadEstimatorOption::SquaredParticlesPerCell,
        ],
        (ContainerOption::VerletListsCells, TraversalOption::VlcSlicedBalanced) => &[
            LoadEstimatorOption::None,
            LoadEstimatorOption::SquaredParticlesPerCell,
            LoadEstimatorOption::NeighborListLength,
        ],
        _ => &[LoadEstimatorOption::None],
    };

    let filtered: Vec<LoadEstimatorOption> = applicable
        .iter()
        .copied()
        .filter(|e| allowed.contains(e))
        .collect();
    if filtered.is_empty() {
        vec![LoadEstimatorOption::None]
    } else {
        filtered
    }
}

/// Per-layer loads along `dim` as the sum of squared cell occupancies.
pub(crate) fn squared_particles_per_layer(
    cells: &[Cell],
    dims: [usize; 3],
    dim: usize,
) -> Vec<u64> {
    per_layer(dims, dim, |flat| {
        let n = cells[flat].num_actual() as u64;
        n * n
    })
}

/// Per-layer loads along `dim` as the total neighbour-list length of the
/// particles in the layer. `list_len` maps a flat cell index to the summed
/// list length of its particles.
pub(crate) fn neighbor_list_length_per_layer(
    dims: [usize; 3],
    dim: usize,
    list_len: impl Fn(usize) -> u64,
) -> Vec<u64> {
    per_layer(dims, dim, list_len)
}

fn per_layer(dims: [usize; 3], dim: usize, cell_load: impl Fn(usize) -> u64) -> Vec<u64> {
    let others: Vec<usize> = (0..3).filter(|&d| d != dim).collect();
    (0..dims[dim])
        .map(|layer| {
            let mut load = 0u64;
            for a in 0..dims[others[0]] {
                for b in 0..dims[others[1]] {
                    let mut idx = [0usize; 3];
                    idx[dim] = layer;
                    idx[others[0]] = a;
                    idx[others[1]] = b;
                    load += cell_load(three_to_one(idx, dims));
                }
            }
            load
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use nalgebra::Point3;

    #[test]
    fn test_applicability_falls_back_to_none() {
        let allowed = [LoadEstimatorOption::NeighborListLength];
        let est = applicable_estimators(
            ContainerOption::LinkedCells,
            TraversalOption::LcC08,
            &allowed,
        );
        assert_eq!(est, vec![LoadEstimatorOption::None]);

        let est = applicable_estimators(
            ContainerOption::VerletListsCells,
            TraversalOption::VlcSlicedBalanced,
            &allowed,
        );
        assert_eq!(est, vec![LoadEstimatorOption::NeighborListLength]);
    }

    #[test]
    fn test_squared_particles_per_layer() {
        let dims = [3, 2, 2];
        let mut cells = vec![Cell::default(); 12];
        // two particles in one cell of layer 0, one particle in layer 2
        for _ in 0..2 {
            cells[three_to_one([0, 1, 1], dims)].push(Particle::new(0, Point3::origin()));
        }
        cells[three_to_one([2, 0, 0], dims)].push(Particle::new(1, Point3::origin()));

        let loads = squared_particles_per_layer(&cells, dims, 0);
        assert_eq!(loads, vec![4, 0, 1]);
    }
}
