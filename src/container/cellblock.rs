//! Geometry of a regular halo-inclusive cell grid.
//!
//! The owned box is cut into cells of edge length at least
//! `cell_size_factor * interaction_length` (at least one cell per
//! dimension), and one layer of halo cells is prepended and appended in
//! every dimension. Index (0, 0, 0) is the lower halo corner.

use crate::error::{Error, Result};
use crate::util::{one_to_three, three_to_one, Box3};
use nalgebra::Point3;

#[derive(Debug, Clone)]
pub(crate) struct CellBlock {
    /// Owned box.
    pub box3: Box3,
    /// Owned box grown by one cell length per dimension.
    pub halo_box: Box3,
    /// Cells per dimension including the two halo layers.
    pub cells_per_dim: [usize; 3],
    /// Actual cell edge lengths (>= requested edge, from rounding down the
    /// cell count).
    pub cell_length: [f64; 3],
    /// Reciprocals, precomputed because cell assignment runs per particle.
    cell_length_reciprocal: [f64; 3],
}

impl CellBlock {
    /// `edge` is the requested minimal cell edge, usually
    /// `cell_size_factor * interaction_length`.
    pub fn new(box3: Box3, edge: f64) -> Result<Self> {
        if edge <= 0.0 || !edge.is_finite() {
            return Err(Error::InvalidInteractionParameters {
                cutoff: edge,
                skin: 0.0,
            });
        }
        let mut cells_per_dim = [0usize; 3];
        let mut cell_length = [0.0f64; 3];
        let mut cell_length_reciprocal = [0.0f64; 3];
        let mut halo_min = box3.min;
        let mut halo_max = box3.max;
        for d in 0..3 {
            let diff = box3.max[d] - box3.min[d];
            if diff <= 0.0 {
                return Err(Error::InvalidDomain);
            }
            // at least one central cell, then the two halo layers
            let cells = ((diff / edge).floor() as usize).max(1);
            cells_per_dim[d] = cells + 2;
            cell_length[d] = diff / cells as f64;
            cell_length_reciprocal[d] = cells as f64 / diff;
            halo_min[d] -= cell_length[d];
            halo_max[d] += cell_length[d];
        }
        Ok(Self {
            box3,
            halo_box: Box3::new(halo_min, halo_max),
            cells_per_dim,
            cell_length,
            cell_length_reciprocal,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.cells_per_dim.iter().product()
    }

    /// Cells per dimension of the owned region only.
    pub fn owned_cells_per_dim(&self) -> [usize; 3] {
        [
            self.cells_per_dim[0] - 2,
            self.cells_per_dim[1] - 2,
            self.cells_per_dim[2] - 2,
        ]
    }

    /// 3d index of the cell containing `pos`.
    ///
    /// Positions outside the halo box are clamped into the outermost halo
    /// layer; positions exactly on the upper owned face land in the upper
    /// halo layer, so the owned box stays lower-inclusive/upper-exclusive.
    pub fn index_of_position(&self, pos: &Point3<f64>) -> [usize; 3] {
        let mut index = [0usize; 3];
        for d in 0..3 {
            let value = ((pos[d] - self.box3.min[d]) * self.cell_length_reciprocal[d]).floor()
                as i64
                + 1;
            index[d] = value.clamp(0, self.cells_per_dim[d] as i64 - 1) as usize;
            // rounding can misplace positions right on a face
            if pos[d] >= self.box3.max[d] {
                index[d] = self.cells_per_dim[d] - 1;
            } else if pos[d] < self.box3.min[d] {
                index[d] = 0;
            }
        }
        index
    }

    #[inline]
    pub fn flat_index_of_position(&self, pos: &Point3<f64>) -> usize {
        three_to_one(self.index_of_position(pos), self.cells_per_dim)
    }

    #[inline]
    pub fn flatten(&self, index: [usize; 3]) -> usize {
        three_to_one(index, self.cells_per_dim)
    }

    #[inline]
    pub fn unflatten(&self, index: usize) -> [usize; 3] {
        one_to_three(index, self.cells_per_dim)
    }

    /// Whether the flat index denotes a halo cell (any coordinate in the
    /// first or last layer).
    pub fn is_halo_cell(&self, index: usize) -> bool {
        let idx = self.unflatten(index);
        (0..3).any(|d| idx[d] == 0 || idx[d] == self.cells_per_dim[d] - 1)
    }

    /// Inclusive 3d index range of all cells intersecting the region.
    /// The region itself is clamped to the halo box.
    pub fn region_cell_bounds(
        &self,
        min: &Point3<f64>,
        max: &Point3<f64>,
    ) -> ([usize; 3], [usize; 3]) {
        let (lo, hi) = self.halo_box.clamp(*min, *max);
        (self.index_of_position(&lo), self.index_of_position(&hi))
    }

    /// Visit all flat indices of the inclusive 3d range.
    pub fn for_each_in_bounds(&self, lo: [usize; 3], hi: [usize; 3], mut f: impl FnMut(usize)) {
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    f(self.flatten([x, y, z]));
                }
            }
        }
    }

    /// Flat indices of all halo cells.
    pub fn halo_cell_indices(&self) -> Vec<usize> {
        (0..self.num_cells())
            .filter(|&i| self.is_halo_cell(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_block(edge: f64) -> CellBlock {
        CellBlock::new(
            Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0)),
            edge,
        )
        .unwrap()
    }

    #[test]
    fn test_dimensions() {
        let block = unit_block(3.0);
        // floor(10/3) = 3 owned cells -> 5 with halo, edge 10/3
        assert_eq!(block.cells_per_dim, [5, 5, 5]);
        assert_eq!(block.owned_cells_per_dim(), [3, 3, 3]);
        assert!((block.cell_length[0] - 10.0 / 3.0).abs() < 1e-12);
        assert_eq!(block.num_cells(), 125);
    }

    #[test]
    fn test_oversized_edge_clamps_to_one_cell() {
        let block = unit_block(25.0);
        assert_eq!(block.cells_per_dim, [3, 3, 3]);
        assert_eq!(block.cell_length, [10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_position_mapping() {
        let block = unit_block(2.5);
        // owned positions land in layers 1..=4
        assert_eq!(block.index_of_position(&Point3::new(0.0, 0.0, 0.0)), [1, 1, 1]);
        assert_eq!(block.index_of_position(&Point3::new(9.9, 9.9, 9.9)), [4, 4, 4]);
        // upper face is the upper halo layer
        assert_eq!(block.index_of_position(&Point3::new(10.0, 5.0, 5.0))[0], 5);
        // below the lower face is the lower halo layer
        assert_eq!(block.index_of_position(&Point3::new(-0.1, 5.0, 5.0))[0], 0);
        // far outside is clamped
        assert_eq!(block.index_of_position(&Point3::new(-100.0, 5.0, 5.0))[0], 0);
        assert_eq!(block.index_of_position(&Point3::new(100.0, 5.0, 5.0))[0], 5);
    }

    #[test]
    fn test_halo_classification() {
        let block = unit_block(2.5);
        assert!(block.is_halo_cell(block.flatten([0, 2, 2])));
        assert!(block.is_halo_cell(block.flatten([5, 2, 2])));
        assert!(!block.is_halo_cell(block.flatten([1, 1, 1])));
        assert!(!block.is_halo_cell(block.flatten([4, 4, 4])));
        let halo = block.halo_cell_indices();
        let interior = 4usize.pow(3);
        assert_eq!(halo.len(), block.num_cells() - interior);
    }

    #[test]
    fn test_region_bounds() {
        let block = unit_block(2.5);
        let (lo, hi) =
            block.region_cell_bounds(&Point3::new(-50.0, 0.1, 0.1), &Point3::new(50.0, 0.2, 0.2));
        assert_eq!(lo, [0, 1, 1]);
        assert_eq!(hi[0], 5);
        let mut visited = 0;
        block.for_each_in_bounds(lo, hi, |_| visited += 1);
        assert_eq!(visited, 6);
    }

    #[test]
    fn test_degenerate_box_rejected() {
        let r = CellBlock::new(
            Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0)),
            1.0,
        );
        assert!(r.is_err());
    }
}
