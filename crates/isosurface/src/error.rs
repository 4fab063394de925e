use thiserror::Error;

/// Non-fatal reasons the main thread cannot drain a builder queue this
/// frame. The caller skips the frame and retries later.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerUnavailable {
    /// Another actor holds the shadow lock.
    #[error("shadow lock is contended")]
    Contended,
    /// No builder queue is pending.
    #[error("no builder queue is pending")]
    NothingPending,
    /// The pending queue was produced for a different (lod, stitches).
    #[error("pending builder queue does not match the requested configuration")]
    Mismatch,
}

/// Errors surfaced by the isosurface layer.
#[derive(Error, Debug)]
pub enum IsoSurfaceError {
    #[error("Out of range: {0}")]
    OutOfRange(&'static str),

    #[error(transparent)]
    Voxel(#[from] voxel::VoxelError),
}
