//! The surface emitted from one cube region
//!
//! Owns the opaque GPU-side stores: one vertex buffer shared by every
//! configuration plus one index buffer per `(lod, stitch)` configuration.
//! Buffer writes happen on the main thread only; the background builder
//! talks to this object exclusively through the hardware shadow.

use std::collections::HashMap;
use std::sync::Arc;

use voxel::data::CubeDataRegion;
use voxel::types::{HwVertexIndex, Touch3dSide};

use crate::elements::IsoVertexElements;
use crate::error::ConsumerUnavailable;
use crate::shadow::queue::VertexElement;
use crate::shadow::{ClearDepth, HardwareShadow, ProducerQueue};

/// Resize-aware byte store standing in for a GPU buffer object.
#[derive(Debug, Default)]
pub struct HardwareBuffer {
    bytes: Vec<u8>,
    element_size: usize,
    capacity: usize,
    count: usize,
}

impl HardwareBuffer {
    pub fn new(element_size: usize) -> Self {
        Self {
            bytes: Vec::new(),
            element_size,
            capacity: 0,
            count: 0,
        }
    }

    /// Elements the buffer can hold without reallocation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements currently written.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.count * self.element_size]
    }

    /// Ensures room for `count` elements, doubling capacity as needed.
    /// Returns `false` when the store was reallocated and prior contents
    /// are gone (a replaced GPU buffer starts empty).
    pub fn prepare(&mut self, count: usize) -> bool {
        if count <= self.capacity && self.capacity != 0 {
            return true;
        }
        let mut capacity = self.capacity.max(1);
        while capacity < count {
            capacity <<= 1;
        }
        self.capacity = capacity;
        self.bytes = vec![0; capacity * self.element_size];
        self.count = 0;
        false
    }

    /// Writes `elements` starting at element `offset`.
    pub fn write<T: bytemuck::Pod>(&mut self, offset: usize, elements: &[T]) {
        debug_assert_eq!(std::mem::size_of::<T>(), self.element_size);
        debug_assert!(offset + elements.len() <= self.capacity, "buffer overrun");
        let start = offset * self.element_size;
        let end = start + std::mem::size_of_val(elements);
        self.bytes[start..end].copy_from_slice(bytemuck::cast_slice(elements));
        self.count = self.count.max(offset + elements.len());
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.capacity = 0;
        self.count = 0;
    }
}

/// Index geometry for one `(lod, stitches)` configuration.
#[derive(Debug)]
struct MeshData {
    indices: HardwareBuffer,
}

impl MeshData {
    fn new() -> Self {
        Self {
            indices: HardwareBuffer::new(std::mem::size_of::<HwVertexIndex>()),
        }
    }
}

/// Renderable surface of one cube region.
pub struct MeshRenderable {
    region: Arc<CubeDataRegion>,
    shadow: Arc<HardwareShadow>,
    vertices: HardwareBuffer,
    meshes: HashMap<(u8, Touch3dSide), MeshData>,
}

impl MeshRenderable {
    pub fn new(region: Arc<CubeDataRegion>, shadow: Arc<HardwareShadow>) -> Self {
        Self {
            region,
            shadow,
            vertices: HardwareBuffer::new(std::mem::size_of::<VertexElement>()),
            meshes: HashMap::new(),
        }
    }

    #[inline]
    pub fn region(&self) -> &Arc<CubeDataRegion> {
        &self.region
    }

    #[inline]
    pub fn shadow(&self) -> &Arc<HardwareShadow> {
        &self.shadow
    }

    /// Current vertex buffer capacity, the builder's resize threshold.
    #[inline]
    pub fn vertex_capacity(&self) -> usize {
        self.vertices.capacity()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.count()
    }

    pub fn index_count(&self, lod: u8, stitches: Touch3dSide) -> usize {
        self.meshes
            .get(&(lod, stitches))
            .map_or(0, |mesh| mesh.indices.count())
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        self.vertices.bytes()
    }

    pub fn index_bytes(&self, lod: u8, stitches: Touch3dSide) -> Option<&[u8]> {
        self.meshes
            .get(&(lod, stitches))
            .map(|mesh| mesh.indices.bytes())
    }

    /// Main-thread upload: drains the pending builder queue for the given
    /// configuration into the hardware stores. Returns `Err` when no
    /// matching queue can be drained this frame; the caller skips the frame.
    pub fn populate_buffers(
        &mut self,
        lod: u8,
        stitches: Touch3dSide,
    ) -> Result<(), ConsumerUnavailable> {
        let mut queue = self.shadow.request_consumer_lock(lod, stitches)?;

        if queue.reset_vertex_buffer() {
            self.vertices.clear();
        }
        let preserved = self.vertices.prepare(queue.actual_vertex_count());
        if !preserved && queue.vertex_buffer_offset() != 0 {
            // The store was replaced under a non-reset update; resident
            // vertices are gone, which only the builder can repair
            tracing::warn!(lod, "vertex buffer lost residents on resize");
        }
        self.vertices
            .write(queue.vertex_buffer_offset(), queue.vertex_queue());

        let mesh = self
            .meshes
            .entry((lod, stitches))
            .or_insert_with(MeshData::new);
        if queue.reset_index_buffer() {
            mesh.indices.clear();
        }
        mesh.indices.prepare(queue.actual_index_count());
        mesh.indices
            .write(queue.index_buffer_offset(), queue.index_queue());
        let capacity = mesh.indices.capacity();
        queue.set_index_capacity(capacity);

        queue.consume();
        Ok(())
    }

    /// Synchronous counterpart used by ray queries and main-thread builds:
    /// writes the builder's scratch output directly, bypassing the queue.
    pub fn directly_populate_buffers(
        &mut self,
        elements: &IsoVertexElements,
        producer: &mut ProducerQueue<'_>,
        stitches: Touch3dSide,
    ) {
        let lod = producer.lod();
        let offset = producer.next_vertex_index();
        let new_count = elements.vertex_shipment.len();

        self.vertices.prepare(offset + new_count);
        let mut batch = Vec::with_capacity(new_count);
        for &ivi in &elements.vertex_shipment {
            batch.push(crate::builder::vertex_element(elements, ivi, self.region.grid_scale()));
        }
        self.vertices.write(offset, &batch);

        let mesh = self
            .meshes
            .entry((lod, stitches))
            .or_insert_with(MeshData::new);
        let mut indices: Vec<HwVertexIndex> = Vec::with_capacity(elements.index_count());
        for triangle in &elements.triangles {
            for &ivi in triangle {
                indices.push(elements.indices[ivi as usize]);
            }
        }
        mesh.indices.clear();
        mesh.indices.prepare(indices.len());
        mesh.indices.write(0, &indices);

        producer.commit_direct(&elements.vertex_shipment, indices.len());
    }

    /// Clears all hardware stores and invalidates every cached case list.
    pub fn delete_geometry(&mut self) {
        self.vertices.clear();
        self.meshes.clear();
        self.shadow.clear_vertices(ClearDepth::Shadow);
        self.shadow.clear_indices(ClearDepth::Shadow);
    }
}
