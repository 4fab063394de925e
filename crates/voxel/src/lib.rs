// Voxel crate - cube-region voxel data model for isosurface terrain

pub mod data;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod fixed;
pub mod neighbor;
pub mod ray;
pub mod types;

// Re-export main types
pub use data::{
    empty_status, CompressedVoxelData, CubeDataRegion, DataAccessor, EmptyStatus, FieldEdit,
    GradientChannels, ReadAccessor, VoxelDataBase, VoxelDataPool,
};
pub use descriptor::{CubeDescriptor, IndexTransform, VoxelRegionFlags, WorldBox};
pub use error::VoxelError;
pub use field::{FieldAccessor, FieldCoords, FieldIter, GradientIter, GradientSample};
pub use fixed::{FixVec3, FixedPoint, IsoFix, ISO_FRAC_BITS};
pub use neighbor::{Moore3dNeighbor, OrthogonalNeighbor, VonNeumannNeighbor};
pub use ray::{DiscreteRayIterator, Ray, RayStep};
pub use types::{
    field_solid_bit, CellIndex, DimensionType, FieldStrength, GridCellCoords, GridPointCoords,
    HwVertexIndex, IsoVertexIndex, Touch2dSide, Touch3dSide, TouchStatus, VoxelIndex, YLevel,
    FS_MANTISSA, FS_MANTISSA_BITS, FS_UNIT, HWVI_UNMAPPED, IVI_NONE,
};

// Re-export glam for convenience
pub use glam;
