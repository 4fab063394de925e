//! Cached, concurrency-managed projection of triangulation state
//!
//! The shadow is the handshake area between the background mesh builder and
//! the main-thread uploader. It caches per-LOD triangulation case lists (so
//! rebuilds skip the scan), remembers the order in which vertices entered
//! the GPU buffer (so reuse and resize-time repopulation are possible), and
//! holds at most one in-flight [`BuilderQueue`].
//!
//! Locking: one reader/writer lock. The producer takes it exclusively and
//! replaces the pending queue; a second producer overwrites the first's
//! queue by contract. The consumer only ever *tries* the lock so the main
//! thread skips a frame instead of stalling; consuming mutates the shadow,
//! so the try-lock is exclusive. Ray queries take plain shared access.

pub mod flags;
pub mod queue;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use voxel::neighbor::OrthogonalNeighbor;
use voxel::types::{CellIndex, IsoVertexIndex, Touch3dSide};

use crate::elements::IsoVertexElements;
use crate::error::ConsumerUnavailable;

use queue::BuilderQueue;

/// A non-trivial triangulation case: a cell and its case code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonTrivialCase<C> {
    pub cell: CellIndex,
    pub case_code: C,
}

/// Cached metadata for a transition iso-vertex that sits on a cube face,
/// kept so later stitch configurations can re-derive its mappings without a
/// full rescan.
#[derive(Debug, Clone, Copy)]
pub struct TransitionVertexProperties {
    pub index: IsoVertexIndex,
    pub side: OrthogonalNeighbor,
    /// Side-local transition cell index.
    pub cell: CellIndex,
    /// Table vertex code (corner pair in the low byte).
    pub code: u16,
    /// Faces of the cube the vertex is flush with.
    pub touch: Touch3dSide,
}

/// Per-face stitching state of one LOD.
#[derive(Debug)]
pub struct StitchState {
    pub side: OrthogonalNeighbor,
    pub transition_cases: Vec<NonTrivialCase<u16>>,
    /// Case list populated.
    pub shadowed: bool,
    /// Triangles batched to the GPU.
    pub gpued: bool,
}

impl StitchState {
    fn new(side: OrthogonalNeighbor) -> Self {
        Self {
            side,
            transition_cases: Vec::new(),
            shadowed: false,
            gpued: false,
        }
    }
}

/// Per-LOD shadow state.
#[derive(Debug)]
pub struct ResolutionState {
    pub lod: u8,
    pub regular_cases: Vec<NonTrivialCase<u8>>,
    pub stitches: [StitchState; OrthogonalNeighbor::COUNT],
    /// Full-resolution transition vertices flush with the cube boundary.
    pub border_vertex_properties: Vec<TransitionVertexProperties>,
    /// Half-resolution transition vertices.
    pub middle_vertex_properties: Vec<TransitionVertexProperties>,
    pub shadowed: bool,
    pub gpued: bool,
}

impl ResolutionState {
    fn new(lod: u8) -> Self {
        Self {
            lod,
            regular_cases: Vec::new(),
            stitches: std::array::from_fn(|s| StitchState::new(OrthogonalNeighbor::ALL[s])),
            border_vertex_properties: Vec::new(),
            middle_vertex_properties: Vec::new(),
            shadowed: false,
            gpued: false,
        }
    }

    fn clear_gpu_flags(&mut self) {
        self.gpued = false;
        for stitch in &mut self.stitches {
            stitch.gpued = false;
        }
    }

    fn clear_shadow(&mut self) {
        self.regular_cases.clear();
        self.border_vertex_properties.clear();
        self.middle_vertex_properties.clear();
        self.shadowed = false;
        for stitch in &mut self.stitches {
            stitch.transition_cases.clear();
            stitch.shadowed = false;
        }
        self.clear_gpu_flags();
    }
}

/// Allocation counters for the hardware index buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexAllocation {
    pub allocated: usize,
    pub capacity: usize,
}

impl IndexAllocation {
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity - self.allocated
    }

    #[inline]
    pub fn clear(&mut self) {
        self.allocated = 0;
        self.capacity = 0;
    }
}

/// The iso-vertex to hardware-vertex mapping shared by all LODs: entry `n`
/// is the iso-vertex occupying GPU buffer slot `n`.
#[derive(Debug, Default)]
pub struct VertexIndexSpace {
    pub revmap: Vec<IsoVertexIndex>,
}

impl VertexIndexSpace {
    /// Next free slot in the hardware vertex buffer.
    #[inline]
    pub fn high_water(&self) -> usize {
        self.revmap.len()
    }
}

/// How deep a clear reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearDepth {
    /// Wipe GPU counters and shadow case caches.
    Shadow,
    /// Wipe GPU counters only; case caches survive.
    GpuOnly,
}

#[derive(Debug)]
struct ShadowInner {
    resolutions: Vec<ResolutionState>,
    vertex_space: VertexIndexSpace,
    index_alloc: IndexAllocation,
    queue: Option<BuilderQueue>,
}

/// Per-renderable shadow of the hardware buffer state.
#[derive(Debug)]
pub struct HardwareShadow {
    inner: RwLock<ShadowInner>,
}

impl HardwareShadow {
    pub fn new(lod_count: u8) -> Self {
        Self {
            inner: RwLock::new(ShadowInner {
                resolutions: (0..lod_count).map(ResolutionState::new).collect(),
                vertex_space: VertexIndexSpace::default(),
                index_alloc: IndexAllocation::default(),
                queue: None,
            }),
        }
    }

    /// Exclusive producer access; replaces any pending queue.
    pub fn request_producer_queue(&self, lod: u8, stitches: Touch3dSide) -> ProducerQueue<'_> {
        let mut guard = self.inner.write().expect("shadow lock poisoned");
        if let Some(old) = &guard.queue {
            tracing::debug!(
                old_lod = old.lod,
                new_lod = lod,
                "pending builder queue overwritten"
            );
        }
        guard.queue = Some(BuilderQueue::new(lod, stitches));
        ProducerQueue { guard, lod }
    }

    /// Non-blocking consumer access, valid only when the pending queue
    /// matches the requested configuration.
    pub fn request_consumer_lock(
        &self,
        lod: u8,
        stitches: Touch3dSide,
    ) -> Result<ConsumerLock<'_>, ConsumerUnavailable> {
        let guard = self
            .inner
            .try_write()
            .map_err(|_| ConsumerUnavailable::Contended)?;
        match &guard.queue {
            None => Err(ConsumerUnavailable::NothingPending),
            Some(queue) if !queue.matches(lod, stitches) => Err(ConsumerUnavailable::Mismatch),
            Some(_) => Ok(ConsumerLock { guard }),
        }
    }

    /// Shared access for ray queries over the case caches.
    pub fn request_read_only(&self, lod: u8) -> ReadOnlyAccess<'_> {
        ReadOnlyAccess {
            guard: self.inner.read().expect("shadow lock poisoned"),
            lod,
        }
    }

    /// Clears vertex state for every resolution.
    pub fn clear_vertices(&self, depth: ClearDepth) {
        let mut guard = self.inner.write().expect("shadow lock poisoned");
        guard.vertex_space.revmap.clear();
        guard.queue = None;
        for resolution in &mut guard.resolutions {
            match depth {
                ClearDepth::GpuOnly => resolution.clear_gpu_flags(),
                ClearDepth::Shadow => resolution.clear_shadow(),
            }
        }
    }

    /// Clears index state for every resolution.
    pub fn clear_indices(&self, depth: ClearDepth) {
        let mut guard = self.inner.write().expect("shadow lock poisoned");
        guard.index_alloc.clear();
        for resolution in &mut guard.resolutions {
            resolution.clear_gpu_flags();
            if depth == ClearDepth::Shadow {
                for stitch in &mut resolution.stitches {
                    stitch.transition_cases.clear();
                    stitch.shadowed = false;
                }
            }
        }
    }

    pub fn lod_count(&self) -> u8 {
        self.inner.read().expect("shadow lock poisoned").resolutions.len() as u8
    }
}

/// Exclusive write access for the mesh builder.
pub struct ProducerQueue<'a> {
    guard: RwLockWriteGuard<'a, ShadowInner>,
    lod: u8,
}

impl ProducerQueue<'_> {
    #[inline]
    pub fn lod(&self) -> u8 {
        self.lod
    }

    #[inline]
    pub fn resolution(&self) -> &ResolutionState {
        &self.guard.resolutions[self.lod as usize]
    }

    #[inline]
    pub fn resolution_mut(&mut self) -> &mut ResolutionState {
        let lod = self.lod as usize;
        &mut self.guard.resolutions[lod]
    }

    #[inline]
    pub fn queue_mut(&mut self) -> &mut BuilderQueue {
        self.guard.queue.as_mut().expect("producer owns the queue")
    }

    /// Next free slot in the hardware vertex buffer.
    #[inline]
    pub fn next_vertex_index(&self) -> usize {
        self.guard.vertex_space.high_water()
    }

    #[inline]
    pub fn index_allocated(&self) -> usize {
        self.guard.index_alloc.allocated
    }

    /// Restores the iso-vertex to hardware-index mapping recorded by
    /// previous uploads into the builder's scratch arena.
    pub fn restore_hw_indices(&self, elements: &mut IsoVertexElements) {
        for (hw, &ivi) in self.guard.vertex_space.revmap.iter().enumerate() {
            elements.indices[ivi as usize] = hw as u16;
        }
    }

    /// Producer capability on the reset flags: raise only.
    pub fn raise_reset_vertex(&mut self) {
        self.queue_mut().reset.set_only().raise_vertex();
    }

    pub fn raise_reset_index(&mut self) {
        self.queue_mut().reset.set_only().raise_index();
    }

    /// Direct commit for the synchronous build path: records uploaded
    /// vertices and indices without going through the consumer handshake.
    pub fn commit_direct(&mut self, revmap: &[IsoVertexIndex], index_count: usize) {
        let stitches = self.guard.queue.as_ref().map(|q| q.stitches);
        self.guard.vertex_space.revmap.extend_from_slice(revmap);
        self.guard.index_alloc.allocated += index_count;
        let lod = self.lod as usize;
        let resolution = &mut self.guard.resolutions[lod];
        resolution.gpued = true;
        if let Some(stitches) = stitches {
            for side in stitches.faces() {
                resolution.stitches[side as usize].gpued = true;
            }
        }
        self.guard.queue = None;
    }

    /// Forgets all uploaded vertices so the next consume starts the buffer
    /// from scratch. Used when the required capacity exceeds the buffer.
    pub fn clear_hardware_state(&mut self) {
        self.guard.vertex_space.revmap.clear();
        self.guard.index_alloc.clear();
        for resolution in &mut self.guard.resolutions {
            resolution.clear_gpu_flags();
        }
    }
}

/// Non-blocking main-thread access to drain the pending queue.
pub struct ConsumerLock<'a> {
    guard: RwLockWriteGuard<'a, ShadowInner>,
}

impl ConsumerLock<'_> {
    #[inline]
    fn queue(&self) -> &BuilderQueue {
        self.guard.queue.as_ref().expect("validated on acquisition")
    }

    #[inline]
    pub fn lod(&self) -> u8 {
        self.queue().lod
    }

    #[inline]
    pub fn stitches(&self) -> Touch3dSide {
        self.queue().stitches
    }

    #[inline]
    pub fn vertex_queue(&self) -> &[queue::VertexElement] {
        &self.queue().vertex_queue
    }

    #[inline]
    pub fn index_queue(&self) -> &[voxel::types::HwVertexIndex] {
        &self.queue().index_queue
    }

    #[inline]
    pub fn reset_vertex_buffer(&self) -> bool {
        self.queue().reset.vertex()
    }

    #[inline]
    pub fn reset_index_buffer(&self) -> bool {
        self.queue().reset.index()
    }

    /// Vertices the hardware buffer must hold including already-resident
    /// ones, ignoring any reset.
    #[inline]
    pub fn required_vertex_count(&self) -> usize {
        self.guard.vertex_space.high_water() + self.queue().vertex_queue.len()
    }

    /// Vertices the buffer must hold after honoring a pending reset.
    #[inline]
    pub fn actual_vertex_count(&self) -> usize {
        self.vertex_buffer_offset() + self.queue().vertex_queue.len()
    }

    /// First slot new vertices are written to; zero after a reset.
    #[inline]
    pub fn vertex_buffer_offset(&self) -> usize {
        if self.reset_vertex_buffer() {
            0
        } else {
            self.guard.vertex_space.high_water()
        }
    }

    #[inline]
    pub fn required_index_count(&self) -> usize {
        self.guard.index_alloc.allocated + self.queue().index_queue.len()
    }

    #[inline]
    pub fn actual_index_count(&self) -> usize {
        self.index_buffer_offset() + self.queue().index_queue.len()
    }

    #[inline]
    pub fn index_buffer_offset(&self) -> usize {
        if self.reset_index_buffer() {
            0
        } else {
            self.guard.index_alloc.allocated
        }
    }

    /// Records the index-buffer capacity chosen by the uploader.
    pub fn set_index_capacity(&mut self, capacity: usize) {
        self.guard.index_alloc.capacity = capacity;
    }

    /// Commits the drained queue: honours reset flags, appends the new
    /// iso-vertex mappings to the shared vertex index space, flags the
    /// resolution (and its stitched sides) as uploaded, and clears flags.
    pub fn consume(mut self) {
        let vertex_offset = self.vertex_buffer_offset();
        let index_offset = self.index_buffer_offset();

        if self.reset_vertex_buffer() {
            self.guard.vertex_space.revmap.clear();
            self.guard.index_alloc.allocated = 0;
            for resolution in &mut self.guard.resolutions {
                resolution.clear_gpu_flags();
            }
        } else if self.reset_index_buffer() {
            self.guard.index_alloc.allocated = 0;
        }
        debug_assert_eq!(vertex_offset, self.guard.vertex_space.high_water());

        let mut queue = self.guard.queue.take().expect("validated on acquisition");
        self.guard
            .vertex_space
            .revmap
            .append(&mut queue.revmap_queue);
        self.guard.index_alloc.allocated = index_offset + queue.index_queue.len();

        let lod = queue.lod as usize;
        let resolution = &mut self.guard.resolutions[lod];
        resolution.gpued = true;
        for side in queue.stitches.faces() {
            resolution.stitches[side as usize].gpued = true;
        }
    }
}

/// Shared read access for ray queries.
pub struct ReadOnlyAccess<'a> {
    guard: RwLockReadGuard<'a, ShadowInner>,
    lod: u8,
}

impl ReadOnlyAccess<'_> {
    #[inline]
    pub fn resolution(&self) -> &ResolutionState {
        &self.guard.resolutions[self.lod as usize]
    }
}
