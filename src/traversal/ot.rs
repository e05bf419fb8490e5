//! Octree traversals. Leaves get integer ids at traversal start (owned
//! first, halo after), and Newton-3 deduplication compares ids: a pair is
//! processed by the leaf with the smaller id.

use crate::cell::Cell;
use crate::container::octree::{NodeKind, Tree};
use crate::functor::Functor;
use crate::traversal::kernel::CellKernel;
use crate::traversal::TraversalPlan;
use crate::util::pair_mut;
use hashbrown::HashMap;
use nalgebra::Point3;

fn leaf_pair_mut(tree: &mut Tree, a: u32, b: u32) -> (&mut Cell, &mut Cell) {
    let (na, nb) = pair_mut(&mut tree.nodes, a as usize, b as usize);
    match (&mut na.kind, &mut nb.kind) {
        (NodeKind::Leaf(ca), NodeKind::Leaf(cb)) => (ca, cb),
        _ => unreachable!("neighbour queries only yield leaves"),
    }
}

fn grown(min: Point3<f64>, max: Point3<f64>, by: f64) -> (Point3<f64>, Point3<f64>) {
    (
        Point3::new(min[0] - by, min[1] - by, min[2] - by),
        Point3::new(max[0] + by, max[1] + by, max[2] + by),
    )
}

/// ot_c18: Newton-3 walk over the owned leaves. Every leaf processes
/// itself, its same-or-larger-id owned neighbours, and all halo leaves in
/// range (halo ids always exceed owned ids).
pub(crate) fn c18<F: Functor>(
    owned: &mut Tree,
    halo: &mut Tree,
    interaction_length: f64,
    plan: &TraversalPlan,
    functor: &F,
) {
    let kernel = CellKernel::new(functor, plan);
    let owned_leaves = owned.leaves();
    let ids: HashMap<u32, usize> = owned_leaves
        .iter()
        .enumerate()
        .map(|(i, &leaf)| (leaf, i))
        .collect();

    for (id, &leaf) in owned_leaves.iter().enumerate() {
        kernel.process_cell(owned.cell_mut(leaf));

        let (lmin, lmax) = owned.leaf_box(leaf);
        let (gmin, gmax) = grown(lmin, lmax, interaction_length);

        for neighbor in owned.leaves_in_range(&gmin, &gmax) {
            if ids[&neighbor] <= id {
                continue;
            }
            let (a, b) = leaf_pair_mut(owned, leaf, neighbor);
            kernel.process_cell_pair(a, b);
        }
        for neighbor in halo.leaves_in_range(&gmin, &gmax) {
            kernel.process_cell_pair(owned.cell_mut(leaf), halo.cell_mut(neighbor));
        }
    }
}

/// ot_c01: no Newton-3. Owned neighbours are processed one direction per
/// base leaf; halo pairs both directions at once since halo leaves never
/// take a base turn.
pub(crate) fn c01<F: Functor>(
    owned: &mut Tree,
    halo: &mut Tree,
    interaction_length: f64,
    plan: &TraversalPlan,
    functor: &F,
) {
    let kernel = CellKernel::new(functor, plan);
    let owned_leaves = owned.leaves();

    for &leaf in &owned_leaves {
        kernel.process_cell(owned.cell_mut(leaf));

        let (lmin, lmax) = owned.leaf_box(leaf);
        let (gmin, gmax) = grown(lmin, lmax, interaction_length);

        for neighbor in owned.leaves_in_range(&gmin, &gmax) {
            if neighbor == leaf {
                continue;
            }
            let (a, b) = leaf_pair_mut(owned, leaf, neighbor);
            kernel.process_cell_pair_directed(a, b);
        }
        for neighbor in halo.leaves_in_range(&gmin, &gmax) {
            kernel.process_cell_pair(owned.cell_mut(leaf), halo.cell_mut(neighbor));
        }
    }
}
