//! Octree container: two arena-backed trees, one for owned and one for
//! halo particles. Leaves are cells; nodes reference each other by arena
//! index, so growing the arena never invalidates anything.

use crate::cell::Cell;
use crate::container::{check_region, in_region, ParticleContainer, SelectorInfo};
use crate::error::{Error, Result};
use crate::functor::Functor;
use crate::options::{ContainerOption, DataLayout, IteratorBehavior, TraversalOption};
use crate::particle::{OwnershipState, Particle};
use crate::traversal::{compatible_traversals, ot, TraversalPlan};
use crate::util::{distance_squared, Box3};
use nalgebra::Point3;

/// Particles a leaf holds before it tries to split.
pub const TREE_SPLIT_THRESHOLD: usize = 16;

pub(crate) const NO_NODE: u32 = u32::MAX;

pub(crate) struct Node {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
    pub parent: u32,
    pub kind: NodeKind,
}

pub(crate) enum NodeKind {
    Leaf(Cell),
    /// Children in standard octant order (x fastest, then y, then z).
    Inner([u32; 8]),
}

pub(crate) struct Tree {
    pub nodes: Vec<Node>,
    split_threshold: usize,
    /// Children whose half-edge would fall below this are never created.
    min_half_edge: f64,
}

impl Tree {
    fn new(min: Point3<f64>, max: Point3<f64>, split_threshold: usize, min_half_edge: f64) -> Self {
        Self {
            nodes: vec![Node {
                min,
                max,
                parent: NO_NODE,
                kind: NodeKind::Leaf(Cell::default()),
            }],
            split_threshold,
            min_half_edge,
        }
    }

    fn clear(&mut self) {
        let (min, max) = (self.nodes[0].min, self.nodes[0].max);
        self.nodes.clear();
        self.nodes.push(Node {
            min,
            max,
            parent: NO_NODE,
            kind: NodeKind::Leaf(Cell::default()),
        });
    }

    fn octant_of(node: &Node, pos: &Point3<f64>) -> usize {
        let mut octant = 0;
        for d in 0..3 {
            if pos[d] >= 0.5 * (node.min[d] + node.max[d]) {
                octant |= 1 << d;
            }
        }
        octant
    }

    fn descend_to_leaf(&self, pos: &Point3<f64>) -> u32 {
        let mut at = 0u32;
        loop {
            match &self.nodes[at as usize].kind {
                NodeKind::Leaf(_) => return at,
                NodeKind::Inner(children) => {
                    at = children[Self::octant_of(&self.nodes[at as usize], pos)];
                }
            }
        }
    }

    fn insert(&mut self, p: Particle) {
        let leaf = self.descend_to_leaf(&p.r);
        if let NodeKind::Leaf(cell) = &mut self.nodes[leaf as usize].kind {
            cell.push(p);
        }
        self.maybe_split(leaf);
    }

    /// Promote an overfull leaf to an inner node with eight children,
    /// unless the children would become smaller than the minimum half-edge.
    fn maybe_split(&mut self, index: u32) {
        let node = &self.nodes[index as usize];
        let NodeKind::Leaf(cell) = &node.kind else {
            return;
        };
        if cell.len() <= self.split_threshold {
            return;
        }
        let half = [
            0.5 * (node.max[0] - node.min[0]),
            0.5 * (node.max[1] - node.min[1]),
            0.5 * (node.max[2] - node.min[2]),
        ];
        if half.iter().any(|&h| h < self.min_half_edge) {
            return;
        }

        let (min, max) = (node.min, node.max);
        let mid = Point3::new(min[0] + half[0], min[1] + half[1], min[2] + half[2]);
        let mut children = [NO_NODE; 8];
        for (octant, child) in children.iter_mut().enumerate() {
            let mut cmin = min;
            let mut cmax = mid;
            for d in 0..3 {
                if octant & (1 << d) != 0 {
                    cmin[d] = mid[d];
                    cmax[d] = max[d];
                }
            }
            *child = self.nodes.len() as u32;
            self.nodes.push(Node {
                min: cmin,
                max: cmax,
                parent: index,
                kind: NodeKind::Leaf(Cell::default()),
            });
        }

        let old_kind = std::mem::replace(&mut self.nodes[index as usize].kind, NodeKind::Inner(children));
        let NodeKind::Leaf(cell) = old_kind else {
            unreachable!();
        };
        for p in cell.particles {
            if p.is_dummy() {
                continue;
            }
            let octant = Self::octant_of(&self.nodes[index as usize], &p.r);
            let child = children[octant];
            if let NodeKind::Leaf(c) = &mut self.nodes[child as usize].kind {
                c.push(p);
            }
            // a crowded child splits again on its own insertions; splitting
            // here immediately keeps the invariant strict
            self.maybe_split(child);
        }
    }

    /// Leaf arena indices in depth-first order.
    pub fn leaves(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![0u32];
        while let Some(at) = stack.pop() {
            match &self.nodes[at as usize].kind {
                NodeKind::Leaf(_) => out.push(at),
                NodeKind::Inner(children) => stack.extend(children.iter().rev().copied()),
            }
        }
        out
    }

    /// Leaves whose boxes intersect the closed region.
    pub fn leaves_in_range(&self, min: &Point3<f64>, max: &Point3<f64>) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![0u32];
        while let Some(at) = stack.pop() {
            let node = &self.nodes[at as usize];
            if (0..3).any(|d| node.max[d] < min[d] || node.min[d] > max[d]) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(_) => out.push(at),
                NodeKind::Inner(children) => stack.extend(children.iter().rev().copied()),
            }
        }
        out
    }

    pub fn cell(&self, index: u32) -> &Cell {
        match &self.nodes[index as usize].kind {
            NodeKind::Leaf(cell) => cell,
            NodeKind::Inner(_) => unreachable!("leaf index expected"),
        }
    }

    pub fn cell_mut(&mut self, index: u32) -> &mut Cell {
        match &mut self.nodes[index as usize].kind {
            NodeKind::Leaf(cell) => cell,
            NodeKind::Inner(_) => unreachable!("leaf index expected"),
        }
    }

    pub fn leaf_box(&self, index: u32) -> (Point3<f64>, Point3<f64>) {
        let node = &self.nodes[index as usize];
        (node.min, node.max)
    }

    fn num_particles(&self) -> usize {
        self.leaves()
            .iter()
            .map(|&l| self.cell(l).num_actual())
            .sum()
    }

    fn for_each(&self, f: &mut dyn FnMut(&Particle)) {
        for leaf in self.leaves() {
            for p in self.cell(leaf).iter_all() {
                f(p);
            }
        }
    }

    fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut Particle)) {
        for node in &mut self.nodes {
            if let NodeKind::Leaf(cell) = &mut node.kind {
                for p in cell.particles.iter_mut() {
                    f(p);
                }
            }
        }
    }
}

pub struct Octree {
    owned: Tree,
    halo: Tree,
    box3: Box3,
    cutoff: f64,
    skin: f64,
}

impl Octree {
    pub fn new(box3: Box3, cutoff: f64, skin: f64) -> Result<Self> {
        if cutoff <= 0.0 || skin < 0.0 {
            return Err(Error::InvalidInteractionParameters { cutoff, skin });
        }
        let interaction_length = cutoff + skin;
        let halo_box = box3.grown(interaction_length);
        Ok(Self {
            owned: Tree::new(box3.min, box3.max, TREE_SPLIT_THRESHOLD, interaction_length),
            halo: Tree::new(
                halo_box.min,
                halo_box.max,
                TREE_SPLIT_THRESHOLD,
                interaction_length,
            ),
            box3,
            cutoff,
            skin,
        })
    }

    pub fn iterate_pairwise<F: Functor>(&mut self, plan: &TraversalPlan, functor: &F) -> Result<()> {
        if !compatible_traversals(self.container_type()).contains(&plan.traversal) {
            return Err(Error::ContainerMismatch {
                container: self.container_type(),
                traversal: plan.traversal,
            });
        }
        let interaction_length = self.interaction_length();

        if plan.layout == DataLayout::Soa {
            for tree in [&mut self.owned, &mut self.halo] {
                for leaf in tree.leaves() {
                    tree.cell_mut(leaf).load_soa(functor);
                }
            }
        }
        match plan.traversal {
            TraversalOption::OtC18 => {
                ot::c18(&mut self.owned, &mut self.halo, interaction_length, plan, functor)
            }
            TraversalOption::OtC01 => {
                ot::c01(&mut self.owned, &mut self.halo, interaction_length, plan, functor)
            }
            _ => unreachable!("compatibility checked above"),
        }
        if plan.layout == DataLayout::Soa {
            for tree in [&mut self.owned, &mut self.halo] {
                for leaf in tree.leaves() {
                    tree.cell_mut(leaf).extract_soa(functor);
                }
            }
        }
        Ok(())
    }
}

impl ParticleContainer for Octree {
    fn container_type(&self) -> ContainerOption {
        ContainerOption::Octree
    }

    fn box3(&self) -> Box3 {
        self.box3
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn skin(&self) -> f64 {
        self.skin
    }

    fn selector_info(&self) -> SelectorInfo {
        let side = self.box3.max - self.box3.min;
        SelectorInfo {
            cells_per_dim: [1, 1, 1],
            cell_length: [side[0], side[1], side[2]],
            interaction_length: self.interaction_length(),
            cluster_size: 0,
        }
    }

    fn add_particle(&mut self, p: Particle) -> Result<()> {
        if !self.box3.contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Owned;
        self.owned.insert(p);
        Ok(())
    }

    fn add_halo_particle(&mut self, p: Particle) -> Result<()> {
        if self.box3.contains(&p.r) || !self.halo_box().contains(&p.r) {
            return Err(Error::ParticleOutsideDomain {
                id: p.id,
                position: p.r,
            });
        }
        let mut p = p;
        p.ownership = OwnershipState::Halo;
        self.halo.insert(p);
        Ok(())
    }

    fn update_halo_particle(&mut self, p: &Particle) -> bool {
        let radius = self.skin / 2.0;
        let radius_sq = radius * radius;
        let min = Point3::new(p.r[0] - radius, p.r[1] - radius, p.r[2] - radius);
        let max = Point3::new(p.r[0] + radius, p.r[1] + radius, p.r[2] + radius);
        for leaf in self.halo.leaves_in_range(&min, &max) {
            for q in self.halo.cell_mut(leaf).iter_mut() {
                if q.id == p.id && distance_squared(&q.r, &p.r) <= radius_sq {
                    *q = *p;
                    q.ownership = OwnershipState::Halo;
                    return true;
                }
            }
        }
        false
    }

    fn delete_halo_particles(&mut self) {
        self.halo.clear();
    }

    fn delete_all_particles(&mut self) {
        self.owned.clear();
        self.halo.clear();
    }

    fn update_container(&mut self) -> Vec<Particle> {
        self.delete_halo_particles();
        let mut keep = Vec::new();
        let mut leaving = Vec::new();
        let box3 = self.box3;
        self.owned.for_each(&mut |p| {
            if p.is_dummy() {
                return;
            }
            if box3.contains(&p.r) {
                keep.push(*p);
            } else {
                leaving.push(*p);
            }
        });
        self.owned.clear();
        for p in keep {
            self.owned.insert(p);
        }
        leaving
    }

    fn num_particles(&self) -> usize {
        self.owned.num_particles() + self.halo.num_particles()
    }

    fn for_each(&self, behavior: IteratorBehavior, f: &mut dyn FnMut(&Particle)) {
        self.owned.for_each(&mut |p| {
            if behavior.matches(p.ownership) {
                f(p);
            }
        });
        self.halo.for_each(&mut |p| {
            if behavior.matches(p.ownership) {
                f(p);
            }
        });
    }

    fn for_each_mut(&mut self, behavior: IteratorBehavior, f: &mut dyn FnMut(&mut Particle)) {
        self.owned.for_each_mut(&mut |p| {
            if behavior.matches(p.ownership) {
                f(p);
            }
        });
        self.halo.for_each_mut(&mut |p| {
            if behavior.matches(p.ownership) {
                f(p);
            }
        });
    }

    fn for_each_in_region(
        &self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&Particle),
    ) -> Result<()> {
        check_region(&min, &max)?;
        let (min, max) = self.halo_box().clamp(min, max);
        for tree in [&self.owned, &self.halo] {
            for leaf in tree.leaves_in_range(&min, &max) {
                for p in tree.cell(leaf).iter_all() {
                    if behavior.matches(p.ownership) && in_region(&p.r, &min, &max) {
                        f(p);
                    }
                }
            }
        }
        Ok(())
    }

    fn for_each_in_region_mut(
        &mut self,
        min: Point3<f64>,
        max: Point3<f64>,
        behavior: IteratorBehavior,
        f: &mut dyn FnMut(&mut Particle),
    ) -> Result<()> {
        check_region(&min, &max)?;
        let (min, max) = self.halo_box().clamp(min, max);
        let leaves_owned = self.owned.leaves_in_range(&min, &max);
        for leaf in leaves_owned {
            for p in self.owned.cell_mut(leaf).particles.iter_mut() {
                if behavior.matches(p.ownership) && in_region(&p.r, &min, &max) {
                    f(p);
                }
            }
        }
        let leaves_halo = self.halo.leaves_in_range(&min, &max);
        for leaf in leaves_halo {
            for p in self.halo.cell_mut(leaf).particles.iter_mut() {
                if behavior.matches(p.ownership) && in_region(&p.r, &min, &max) {
                    f(p);
                }
            }
        }
        Ok(())
    }

    fn delete_if(&mut self, pred: &mut dyn FnMut(&Particle) -> bool) {
        for tree in [&mut self.owned, &mut self.halo] {
            tree.for_each_mut(&mut |p| {
                if !p.is_dummy() && pred(p) {
                    p.make_dummy();
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn tree_box() -> Box3 {
        Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(16.0, 16.0, 16.0))
    }

    #[test]
    fn test_leaf_splits_on_overflow() {
        let mut ot = Octree::new(tree_box(), 1.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for id in 0..(TREE_SPLIT_THRESHOLD + 1) {
            // cluster everything into one octant so the split is forced
            let r = Point3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
            ot.add_particle(Particle::new(id as u64, r)).unwrap();
        }
        assert!(ot.owned.nodes.len() > 1, "root must have split");
        assert_eq!(ot.num_particles(), TREE_SPLIT_THRESHOLD + 1);
    }

    #[test]
    fn test_split_respects_interaction_length_floor() {
        // domain of 2 x interaction length: children would be exactly one
        // interaction length wide, grandchildren half of it
        let mut ot = Octree::new(
            Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0)),
            1.0,
            0.0,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for id in 0..200 {
            let r = Point3::new(
                rng.gen::<f64>() * 0.5,
                rng.gen::<f64>() * 0.5,
                rng.gen::<f64>() * 0.5,
            );
            ot.add_particle(Particle::new(id, r)).unwrap();
        }
        // depth 1 split allowed (half-edge 1.0 >= 1.0), depth 2 forbidden
        let max_nodes = 1 + 8;
        assert!(ot.owned.nodes.len() <= max_nodes);
        assert_eq!(ot.num_particles(), 200);
    }

    #[test]
    fn test_leaves_in_range_prunes() {
        let mut ot = Octree::new(tree_box(), 1.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for id in 0..500 {
            let r = Point3::new(
                rng.gen::<f64>() * 16.0,
                rng.gen::<f64>() * 16.0,
                rng.gen::<f64>() * 16.0,
            );
            ot.add_particle(Particle::new(id, r)).unwrap();
        }
        let all = ot.owned.leaves();
        let some = ot
            .owned
            .leaves_in_range(&Point3::new(0.0, 0.0, 0.0), &Point3::new(2.0, 2.0, 2.0));
        assert!(some.len() < all.len());

        // range iteration sees exactly the particles in the region
        let mut count = 0;
        ot.for_each_in_region(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(8.0, 8.0, 8.0),
            IteratorBehavior::Owned,
            &mut |_| count += 1,
        )
        .unwrap();
        let mut brute = 0;
        ot.for_each(IteratorBehavior::Owned, &mut |p| {
            if (0..3).all(|d| p.r[d] >= 0.0 && p.r[d] <= 8.0) {
                brute += 1;
            }
        });
        assert_eq!(count, brute);
    }

    #[test]
    fn test_update_container_rebuilds() {
        let mut ot = Octree::new(tree_box(), 1.0, 0.0).unwrap();
        for id in 0..32 {
            ot.add_particle(Particle::new(id, Point3::new(0.25 * id as f64, 1.0, 1.0)))
                .unwrap();
        }
        // push one outside
        ot.for_each_mut(IteratorBehavior::Owned, &mut |p| {
            if p.id == 3 {
                p.r = Point3::new(20.0, 1.0, 1.0);
            }
        });
        let leaving = ot.update_container();
        assert_eq!(leaving.len(), 1);
        assert_eq!(leaving[0].id, 3);
        assert_eq!(ot.num_particles(), 31);
    }
}
