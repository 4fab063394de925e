// Isosurface crate - Marching Cubes + Transvoxel extraction over cube regions

pub mod builder;
pub mod elements;
pub mod error;
pub mod renderable;
pub mod shadow;
pub mod tables;

// Re-export main types
pub use builder::{
    ChannelParameters, IsoSurfaceBuilder, NormalsType, RayHit, SurfaceFlags,
};
pub use elements::{IsoVertexElements, IsoVertexLayout, RegularGroup, TransitionGroup};
pub use error::{ConsumerUnavailable, IsoSurfaceError};
pub use renderable::{HardwareBuffer, MeshRenderable};
pub use shadow::queue::{BuilderQueue, VertexElement};
pub use shadow::{
    ClearDepth, HardwareShadow, NonTrivialCase, ProducerQueue, ResolutionState, StitchState,
    TransitionVertexProperties, VertexIndexSpace,
};
