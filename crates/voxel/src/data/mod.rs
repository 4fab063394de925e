// Voxel storage: raw channels, pooling, compression, and cube regions

pub mod base;
pub mod compressed;
pub mod pool;
pub mod region;
pub mod rle;

pub use base::{ColourChannels, GradientChannels, TexCoordChannels, VoxelDataBase};
pub use compressed::CompressedVoxelData;
pub use pool::VoxelDataPool;
pub use region::{empty_status, CubeDataRegion, DataAccessor, EmptyStatus, FieldEdit, ReadAccessor};
pub use rle::RleChannel;
