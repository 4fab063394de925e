// Terrain crate - scene-level glue over the voxel and isosurface layers

pub mod dispatch;
pub mod metaball;
pub mod options;
pub mod scene;

// Re-export main types
pub use dispatch::{BuildDispatcher, RequestId};
pub use metaball::{DensitySource, MetaBall};
pub use options::{NormalsMode, OptionsError, TerrainOptions};
pub use scene::{TerrainScene, TerrainTile};
