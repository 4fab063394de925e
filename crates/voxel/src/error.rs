use thiserror::Error;

/// Errors surfaced by the voxel data model.
#[derive(Error, Debug)]
pub enum VoxelError {
    /// A coordinate, LOD, or configuration value lies outside its documented
    /// bounds. Callers are expected to validate; hot paths only debug-assert.
    #[error("Out of range: {0}")]
    OutOfRange(&'static str),

    /// An object was returned to a pool that never issued it.
    #[error("Retired object was not leased from this pool")]
    UnmatchedLease,

    /// RLE decompression would overrun the destination buffer; the
    /// compressed stream is corrupt.
    #[error("Buffer overflow during decompression at offset {offset}")]
    BufferOverflow { offset: usize },

    /// A serialized cube stream did not match the expected layout.
    #[error("Stream format error: {0}")]
    Format(&'static str),

    /// Underlying I/O failure while reading or writing a serialized cube.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
