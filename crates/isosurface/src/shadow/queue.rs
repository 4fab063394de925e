//! Geometry batch data for one pending GPU update

use bytemuck::{Pod, Zeroable};

use voxel::types::{HwVertexIndex, IsoVertexIndex, Touch3dSide};

use super::flags::ResetFlags;

/// One hardware vertex element as it will land in the vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexElement {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Packed RGBA.
    pub colour: u32,
    pub texcoord: [f32; 2],
}

/// The single in-flight update a shadow can hold: everything the main
/// thread needs to flush one `(lod, stitches)` configuration to the GPU.
#[derive(Debug, Default)]
pub struct BuilderQueue {
    pub lod: u8,
    pub stitches: Touch3dSide,
    /// Vertex elements to append to the hardware vertex buffer.
    pub vertex_queue: Vec<VertexElement>,
    /// Triangle list indices to append to the hardware index buffer.
    pub index_queue: Vec<HwVertexIndex>,
    /// Iso-vertex indices of the new vertices, in buffer order; consumed
    /// into the shadow's vertex index space on upload.
    pub revmap_queue: Vec<IsoVertexIndex>,
    pub reset: ResetFlags,
}

impl BuilderQueue {
    pub fn new(lod: u8, stitches: Touch3dSide) -> Self {
        Self {
            lod,
            stitches,
            ..Default::default()
        }
    }

    #[inline]
    pub fn matches(&self, lod: u8, stitches: Touch3dSide) -> bool {
        self.lod == lod && self.stitches == stitches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_element_is_pod() {
        let element = VertexElement {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            colour: 0xFF00FF00,
            texcoord: [0.5, 0.25],
        };
        let bytes = bytemuck::bytes_of(&element);
        assert_eq!(bytes.len(), std::mem::size_of::<VertexElement>());
        let back: VertexElement = *bytemuck::from_bytes(bytes);
        assert_eq!(back, element);
    }

    #[test]
    fn test_queue_matching() {
        let queue = BuilderQueue::new(2, Touch3dSide::EAST);
        assert!(queue.matches(2, Touch3dSide::EAST));
        assert!(!queue.matches(1, Touch3dSide::EAST));
        assert!(!queue.matches(2, Touch3dSide::NONE));
    }
}
