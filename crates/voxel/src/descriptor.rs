//! Immutable per-scene metadata describing every cube region in a scene

use glam::Vec3;

use crate::error::VoxelError;
use crate::fixed::FixVec3;
use crate::types::{
    CellIndex, DimensionType, GridCellCoords, GridPointCoords, Touch3dSide, TouchStatus,
    VoxelIndex,
};

/// Flags describing which optional channels a scene's cube regions store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct VoxelRegionFlags(pub u8);

impl VoxelRegionFlags {
    pub const NONE: VoxelRegionFlags = VoxelRegionFlags(0);
    pub const GRADIENT: VoxelRegionFlags = VoxelRegionFlags(0x01);
    pub const COLOURS: VoxelRegionFlags = VoxelRegionFlags(0x02);
    pub const TEX_COORDS: VoxelRegionFlags = VoxelRegionFlags(0x04);

    #[inline]
    pub fn contains(self, other: VoxelRegionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: VoxelRegionFlags) -> Self {
        VoxelRegionFlags(self.0 | other.0)
    }
}

/// Translation multipliers for converting coordinates into a linear index:
/// `index = k*mz + j*my + i*mx`.
#[derive(Debug, Clone, Copy)]
pub struct IndexTransform {
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
}

/// Axis-aligned box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBox {
    pub minimum: Vec3,
    pub maximum: Vec3,
}

impl WorldBox {
    #[inline]
    pub fn new(minimum: Vec3, maximum: Vec3) -> Self {
        Self { minimum, maximum }
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.maximum - self.minimum
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.minimum + self.maximum) * 0.5
    }

    #[inline]
    pub fn intersects(&self, other: &WorldBox) -> bool {
        self.minimum.cmple(other.maximum).all() && self.maximum.cmpge(other.minimum).all()
    }
}

/// Immutable meta-information for a cubical region of voxels, shared by all
/// cubes in a scene.
///
/// `dimensions` is the number of cells along one side; grid points run
/// `0 ..= dimensions` per axis. The precomputed vertex position table is
/// centered on the origin so a cube's world placement is purely a translate
/// and scale.
#[derive(Debug)]
pub struct CubeDescriptor {
    /// Cells per side; power of two, at most 32.
    pub dimensions: DimensionType,
    /// World units per cell.
    pub scale: f32,
    /// Total grid points per region: `(dimensions + 1)^3`.
    pub grid_point_count: usize,
    /// Total cells per region: `dimensions^3`.
    pub cell_count: usize,
    /// Grid points per face: `(dimensions + 1)^2`.
    pub side_point_count: usize,
    /// Cells per face: `dimensions^2`.
    pub side_cell_count: usize,
    /// Index transform for grid points.
    pub point_tx: IndexTransform,
    /// Index transform for cells.
    pub cell_tx: IndexTransform,
    /// Which optional channels cube regions of this scene carry.
    pub region_flags: VoxelRegionFlags,

    /// Fixed-point position of every grid point, origin-centered.
    positions: Box<[FixVec3]>,
    /// log2 of `dimensions`, used by the branch-free touch test.
    dim_order: u32,
}

impl CubeDescriptor {
    /// `side_voxel_count` is the number of grid points along one edge and
    /// must be a power of two plus one (so cells per side are a power of
    /// two), at most 33.
    pub fn new(
        side_voxel_count: DimensionType,
        scale: f32,
        region_flags: VoxelRegionFlags,
    ) -> Result<Self, VoxelError> {
        if side_voxel_count < 2 {
            return Err(VoxelError::OutOfRange("side voxel count below 2"));
        }
        let dimensions = side_voxel_count - 1;
        if !dimensions.is_power_of_two() || dimensions > 32 {
            return Err(VoxelError::OutOfRange(
                "cube side must be a power of two no greater than 32 cells",
            ));
        }
        if scale <= 0.0 {
            return Err(VoxelError::OutOfRange("cell scale must be positive"));
        }

        let d = dimensions as usize;
        let side = d + 1;
        let half = (dimensions / 2) as i32;

        let mut positions = Vec::with_capacity(side * side * side);
        for k in 0..side as i32 {
            for j in 0..side as i32 {
                for i in 0..side as i32 {
                    positions.push(FixVec3::from_ints(i - half, j - half, k - half));
                }
            }
        }

        Ok(Self {
            dimensions,
            scale,
            grid_point_count: side * side * side,
            cell_count: d * d * d,
            side_point_count: side * side,
            side_cell_count: d * d,
            point_tx: IndexTransform {
                mx: 1,
                my: side,
                mz: side * side,
            },
            cell_tx: IndexTransform {
                mx: 1,
                my: d,
                mz: d * d,
            },
            region_flags,
            positions: positions.into_boxed_slice(),
            dim_order: dimensions.trailing_zeros(),
        })
    }

    #[inline]
    pub fn has_gradient(&self) -> bool {
        self.region_flags.contains(VoxelRegionFlags::GRADIENT)
    }

    #[inline]
    pub fn has_colours(&self) -> bool {
        self.region_flags.contains(VoxelRegionFlags::COLOURS)
    }

    #[inline]
    pub fn has_texcoords(&self) -> bool {
        self.region_flags.contains(VoxelRegionFlags::TEX_COORDS)
    }

    /// Origin-centered fixed-point positions of all grid points.
    #[inline]
    pub fn positions(&self) -> &[FixVec3] {
        &self.positions
    }

    /// Linear index of a grid point; coordinates must be in `0 ..= dimensions`.
    #[inline]
    pub fn grid_point_index(
        &self,
        i: DimensionType,
        j: DimensionType,
        k: DimensionType,
    ) -> VoxelIndex {
        debug_assert!(
            i <= self.dimensions && j <= self.dimensions && k <= self.dimensions,
            "grid point coordinates out of bounds"
        );
        k as usize * self.point_tx.mz + j as usize * self.point_tx.my + i as usize
    }

    /// Linear index of a cell; coordinates must be in `0 .. dimensions`.
    #[inline]
    pub fn grid_cell_index(
        &self,
        i: DimensionType,
        j: DimensionType,
        k: DimensionType,
    ) -> CellIndex {
        debug_assert!(
            i < self.dimensions && j < self.dimensions && k < self.dimensions,
            "grid cell coordinates out of bounds"
        );
        k as usize * self.cell_tx.mz + j as usize * self.cell_tx.my + i as usize
    }

    /// Inverse of [`grid_point_index`](Self::grid_point_index).
    #[inline]
    pub fn grid_point(&self, index: VoxelIndex) -> GridPointCoords {
        GridPointCoords::new(
            (index % self.point_tx.my) as DimensionType,
            ((index % self.point_tx.mz) / self.point_tx.my) as DimensionType,
            (index / self.point_tx.mz) as DimensionType,
        )
    }

    /// Inverse of [`grid_cell_index`](Self::grid_cell_index).
    #[inline]
    pub fn grid_cell(&self, index: CellIndex, lod: u8) -> GridCellCoords {
        GridCellCoords::new(
            (index % self.cell_tx.my) as DimensionType,
            ((index % self.cell_tx.mz) / self.cell_tx.my) as DimensionType,
            (index / self.cell_tx.mz) as DimensionType,
            lod,
        )
    }

    /// Constant-time, branch-free classification of a coordinate against the
    /// `[0, dimensions]` range.
    ///
    /// `m = (dimensions - 1) & v` is zero exactly when `v` is 0 or a
    /// multiple of `dimensions`; `(m - 1) & !m` then raises the sign bit,
    /// and the shift selects flag 1 (low) or 2 (high) from `v >> dim_order`.
    #[inline]
    pub fn touch_status(&self, v: DimensionType) -> TouchStatus {
        let m = ((self.dimensions - 1) & v) as u32;
        let bits = (m.wrapping_sub(1) & !m & 0x8000_0000)
            >> (30 + (1 ^ ((v as u32) >> self.dim_order)));
        TouchStatus::from_bits(bits as u8)
    }

    /// Which faces the grid point `(i, j, k)` is flush with.
    #[inline]
    pub fn touch_side(
        &self,
        i: DimensionType,
        j: DimensionType,
        k: DimensionType,
    ) -> Touch3dSide {
        Touch3dSide::new(
            self.touch_status(i),
            self.touch_status(j),
            self.touch_status(k),
        )
    }

    /// Which faces the cell at `(i, j, k)` with span `2^lod` is flush with.
    ///
    /// Touch at both extreme corners is OR'd together: a coarse cell can be
    /// flush with two opposite faces at once.
    #[inline]
    pub fn cell_touch_side(
        &self,
        i: DimensionType,
        j: DimensionType,
        k: DimensionType,
        lod: u8,
    ) -> Touch3dSide {
        let span = 1 << lod;
        self.touch_side(i, j, k)
            .union(self.touch_side(i + span, j + span, k + span))
    }

    /// World-space box of a cube whose minimum corner sits at `origin`.
    pub fn world_box(&self, origin: Vec3) -> WorldBox {
        let extent = self.dimensions as f32 * self.scale;
        WorldBox::new(origin, origin + Vec3::splat(extent))
    }
}
