//! Direct-sum traversal: one owned cell, one halo cell, no spatial pruning.

use crate::cell::Cell;
use crate::functor::Functor;
use crate::traversal::kernel::CellKernel;

pub(crate) fn sequential<F: Functor>(owned: &mut Cell, halo: &mut Cell, kernel: &CellKernel<'_, F>) {
    kernel.process_cell(owned);
    kernel.process_cell_pair(owned, halo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::testing::CountFunctor;
    use crate::options::{DataLayout, Newton3Option, TraversalOption};
    use crate::particle::Particle;
    use crate::traversal::TraversalPlan;
    use nalgebra::Point3;

    #[test]
    fn test_all_pairs_visited() {
        let mut owned = Cell::default();
        for i in 0..4 {
            owned.push(Particle::new(i, Point3::new(i as f64, 0.0, 0.0)));
        }
        let mut halo = Cell::default();
        for i in 0..2 {
            halo.push(Particle::halo(100 + i, Point3::new(-1.0, i as f64, 0.0)));
        }

        let functor = CountFunctor::default();
        let plan = TraversalPlan::new(
            TraversalOption::DsSequential,
            DataLayout::Aos,
            Newton3Option::Enabled,
        );
        sequential(&mut owned, &mut halo, &CellKernel::new(&functor, &plan));
        // 6 intra-owned pairs + 4*2 owned-halo pairs
        assert_eq!(functor.aos_count(), 6 + 8);
    }
}
