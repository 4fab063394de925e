//! Cell addressing for the triangulator
//!
//! A [`GridCell`] is a cubical sampling window whose span doubles per LOD.
//! A [`TransitionCell`] is the thin Transvoxel cell flush to one cube face;
//! it addresses the 3x3 full-resolution sample grid plus the co-located
//! half-resolution corners, in 2D face coordinates mapped onto the cube per
//! side.

use voxel::descriptor::CubeDescriptor;
use voxel::neighbor::OrthogonalNeighbor;
use voxel::types::{
    field_solid_bit, CellIndex, DimensionType, FieldStrength, GridPointCoords, VoxelIndex,
};

/// A regular sampling cell of span `2^lod` voxels.
#[derive(Debug, Clone)]
pub struct GridCell<'a> {
    descriptor: &'a CubeDescriptor,
    lod: u8,
    pub x: DimensionType,
    pub y: DimensionType,
    pub z: DimensionType,
}

impl<'a> GridCell<'a> {
    pub fn new(descriptor: &'a CubeDescriptor, lod: u8) -> Self {
        Self {
            descriptor,
            lod,
            x: 0,
            y: 0,
            z: 0,
        }
    }

    #[inline]
    pub fn lod(&self) -> u8 {
        self.lod
    }

    #[inline]
    pub fn span(&self) -> DimensionType {
        1 << self.lod
    }

    /// Moves this cell to the given finest-resolution cell index.
    pub fn set_index(&mut self, index: CellIndex) {
        let gcc = self.descriptor.grid_cell(index, self.lod);
        self.x = gcc.i;
        self.y = gcc.j;
        self.z = gcc.k;
    }

    #[inline]
    pub fn index(&self) -> CellIndex {
        self.descriptor.grid_cell_index(self.x, self.y, self.z)
    }

    /// Grid point of a cell corner; bit 0 of `corner` selects +x, bit 1 +y,
    /// bit 2 +z, each scaled by the cell span.
    #[inline]
    pub fn corner_coords(&self, corner: u8) -> GridPointCoords {
        debug_assert!(corner < 8, "corner index out of bounds");
        GridPointCoords::new(
            self.x + (((corner & 1) as DimensionType) << self.lod),
            self.y + ((((corner >> 1) & 1) as DimensionType) << self.lod),
            self.z + ((((corner >> 2) & 1) as DimensionType) << self.lod),
        )
    }

    #[inline]
    pub fn corner_index(&self, corner: u8) -> VoxelIndex {
        let c = self.corner_coords(corner);
        self.descriptor.grid_point_index(c.i, c.j, c.k)
    }

    /// 8-bit Marching Cubes case code; bit `c` set when corner `c` is solid.
    pub fn case_code(&self, values: &[FieldStrength]) -> u8 {
        let mut code = 0u8;
        for corner in 0..8 {
            code |= field_solid_bit(values[self.corner_index(corner)]) << corner;
        }
        code
    }
}

/// Maps face coordinates `(u, v)` on a cube side to 3D grid coordinates.
///
/// The per-side frames are fixed so that every face has a consistent
/// two-axis parameterization; sides whose `(u, v, inward)` frame is
/// left-handed are listed in [`WINDING_FLIP_SIDES`].
#[inline]
pub fn face_to_grid(
    side: OrthogonalNeighbor,
    u: DimensionType,
    v: DimensionType,
    dim: DimensionType,
) -> GridPointCoords {
    match side {
        OrthogonalNeighbor::North => GridPointCoords::new(u, v, 0),
        OrthogonalNeighbor::South => GridPointCoords::new(u, v, dim),
        OrthogonalNeighbor::West => GridPointCoords::new(0, v, u),
        OrthogonalNeighbor::East => GridPointCoords::new(dim, v, u),
        OrthogonalNeighbor::Below => GridPointCoords::new(u, 0, v),
        OrthogonalNeighbor::Above => GridPointCoords::new(u, dim, v),
    }
}

/// Inverse of [`face_to_grid`] for points lying on the side's face.
#[inline]
pub fn grid_to_face(
    side: OrthogonalNeighbor,
    coords: GridPointCoords,
) -> (DimensionType, DimensionType) {
    match side {
        OrthogonalNeighbor::North | OrthogonalNeighbor::South => (coords.i, coords.j),
        OrthogonalNeighbor::West | OrthogonalNeighbor::East => (coords.k, coords.j),
        OrthogonalNeighbor::Below | OrthogonalNeighbor::Above => (coords.i, coords.k),
    }
}

/// Sides whose face frame is left-handed; their transition triangles wind
/// the other way. Bit position = orthogonal neighbor ordinal.
pub const WINDING_FLIP_SIDES: u8 = 0b101100; // West, South, Below

#[inline]
pub fn side_winding_flipped(side: OrthogonalNeighbor) -> bool {
    WINDING_FLIP_SIDES >> (side as u8) & 1 != 0
}

/// Full-resolution sample offsets of the 13 transition cell corners, in
/// half-cell units: 0-8 row-major on the full face, 9-0xC the half face.
const CORNER_OFFSETS: [(u8, u8); 13] = [
    (0, 0),
    (1, 0),
    (2, 0),
    (0, 1),
    (1, 1),
    (2, 1),
    (0, 2),
    (1, 2),
    (2, 2),
    (0, 0),
    (2, 0),
    (0, 2),
    (2, 2),
];

/// Spiral traversal of the full face used by the 9-bit case code, matching
/// the corner flag numbering of the Transvoxel reference.
const CASE_SPIRAL: [u8; 9] = [0, 1, 2, 5, 8, 7, 6, 3, 4];

/// A Transvoxel transition cell on one cube face.
#[derive(Debug, Clone)]
pub struct TransitionCell<'a> {
    descriptor: &'a CubeDescriptor,
    /// LOD of this cube's surface; the cell spans `2^half_lod` on the face.
    half_lod: u8,
    pub side: OrthogonalNeighbor,
    pub u: DimensionType,
    pub v: DimensionType,
}

impl<'a> TransitionCell<'a> {
    pub fn new(descriptor: &'a CubeDescriptor, half_lod: u8, side: OrthogonalNeighbor) -> Self {
        debug_assert!(half_lod >= 1, "transition cells need a finer neighbor");
        Self {
            descriptor,
            half_lod,
            side,
            u: 0,
            v: 0,
        }
    }

    #[inline]
    pub fn half_lod(&self) -> u8 {
        self.half_lod
    }

    /// LOD of the finer neighbor whose resolution the full face matches.
    #[inline]
    pub fn full_lod(&self) -> u8 {
        self.half_lod - 1
    }

    #[inline]
    pub fn span(&self) -> DimensionType {
        1 << self.half_lod
    }

    /// Side-local cell index of the minimal corner.
    #[inline]
    pub fn index(&self) -> CellIndex {
        self.v as usize * self.descriptor.dimensions as usize + self.u as usize
    }

    pub fn set_index(&mut self, index: CellIndex) {
        let dim = self.descriptor.dimensions as usize;
        self.u = (index % dim) as DimensionType;
        self.v = (index / dim) as DimensionType;
    }

    /// Face coordinates of a transition corner.
    #[inline]
    pub fn corner_face_coords(&self, corner: u8) -> (DimensionType, DimensionType) {
        debug_assert!(corner < 13, "corner index out of bounds");
        let (cu, cv) = CORNER_OFFSETS[corner as usize];
        (
            self.u + ((cu as DimensionType) << self.full_lod()),
            self.v + ((cv as DimensionType) << self.full_lod()),
        )
    }

    #[inline]
    pub fn corner_coords(&self, corner: u8) -> GridPointCoords {
        let (u, v) = self.corner_face_coords(corner);
        face_to_grid(self.side, u, v, self.descriptor.dimensions)
    }

    #[inline]
    pub fn corner_index(&self, corner: u8) -> VoxelIndex {
        let c = self.corner_coords(corner);
        self.descriptor.grid_point_index(c.i, c.j, c.k)
    }

    /// 9-bit Transvoxel case code over the full-resolution face.
    pub fn case_code(&self, values: &[FieldStrength]) -> u16 {
        let mut code = 0u16;
        for (bit, &corner) in CASE_SPIRAL.iter().enumerate() {
            let value = values[self.corner_index(corner)];
            code |= (field_solid_bit(value) as u16) << bit;
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel::descriptor::VoxelRegionFlags;

    fn descriptor() -> CubeDescriptor {
        CubeDescriptor::new(17, 1.0, VoxelRegionFlags::NONE).unwrap()
    }

    #[test]
    fn test_grid_cell_corners_scale_with_lod() {
        let meta = descriptor();
        let mut gc = GridCell::new(&meta, 2);
        gc.x = 4;
        gc.y = 0;
        gc.z = 8;
        assert_eq!(gc.corner_coords(0), GridPointCoords::new(4, 0, 8));
        assert_eq!(gc.corner_coords(1), GridPointCoords::new(8, 0, 8));
        assert_eq!(gc.corner_coords(2), GridPointCoords::new(4, 4, 8));
        assert_eq!(gc.corner_coords(7), GridPointCoords::new(8, 4, 12));
    }

    #[test]
    fn test_grid_cell_case_code_bits() {
        let meta = descriptor();
        let mut values = vec![1 as FieldStrength; meta.grid_point_count];
        let gc = GridCell::new(&meta, 0);
        // corner 5 = (+x, 0, +z)
        values[meta.grid_point_index(1, 0, 1)] = -1;
        assert_eq!(gc.case_code(&values), 1 << 5);
    }

    #[test]
    fn test_face_mappings_roundtrip() {
        let meta = descriptor();
        for side in OrthogonalNeighbor::ALL {
            for &(u, v) in &[(0u16, 0u16), (3, 7), (16, 16)] {
                let coords = face_to_grid(side, u, v, meta.dimensions);
                assert_eq!(grid_to_face(side, coords), (u, v));
                // mapped point lies on the side's face plane
                let touch = meta.touch_side(coords.i, coords.j, coords.k);
                assert!(touch.contains(voxel::types::Touch3dSide::from_neighbor(side)));
            }
        }
    }

    #[test]
    fn test_transition_corner_layout() {
        let meta = descriptor();
        let mut tc = TransitionCell::new(&meta, 1, OrthogonalNeighbor::North);
        tc.u = 2;
        tc.v = 4;
        // full face row-major at half the cell span
        assert_eq!(tc.corner_face_coords(0), (2, 4));
        assert_eq!(tc.corner_face_coords(2), (4, 4));
        assert_eq!(tc.corner_face_coords(8), (4, 6));
        // half-res corners co-located with full corners 0, 2, 6, 8
        assert_eq!(tc.corner_face_coords(9), tc.corner_face_coords(0));
        assert_eq!(tc.corner_face_coords(12), tc.corner_face_coords(8));
    }

    #[test]
    fn test_transition_case_spiral() {
        let meta = descriptor();
        let mut values = vec![1 as FieldStrength; meta.grid_point_count];
        let tc = TransitionCell::new(&meta, 1, OrthogonalNeighbor::North);
        // center sample (corner 4) is the last spiral bit
        values[meta.grid_point_index(1, 1, 0)] = -1;
        assert_eq!(tc.case_code(&values), 1 << 8);
        // corner 0 is bit zero
        let mut values = vec![1 as FieldStrength; meta.grid_point_count];
        values[meta.grid_point_index(0, 0, 0)] = -1;
        assert_eq!(tc.case_code(&values), 1);
    }

    #[test]
    fn test_winding_flip_sides() {
        assert!(side_winding_flipped(OrthogonalNeighbor::West));
        assert!(side_winding_flipped(OrthogonalNeighbor::South));
        assert!(side_winding_flipped(OrthogonalNeighbor::Below));
        assert!(!side_winding_flipped(OrthogonalNeighbor::North));
        assert!(!side_winding_flipped(OrthogonalNeighbor::East));
        assert!(!side_winding_flipped(OrthogonalNeighbor::Above));
    }
}
