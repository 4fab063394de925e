//! The isosurface triangulator
//!
//! Marching Cubes over regular cells, Transvoxel transition cells on faces
//! with a finer neighbor. One long-lived builder per scene holds all scratch
//! state behind a mutex, sized by the cube descriptor, so a steady-state
//! build allocates nothing.

pub mod cell;
pub mod refine;

use std::sync::{Arc, Mutex};

use glam::Vec3;

use voxel::data::{CubeDataRegion, EmptyStatus, GradientChannels, ReadAccessor};
use voxel::descriptor::CubeDescriptor;
use voxel::fixed::{FixVec3, IsoFix};
use voxel::neighbor::OrthogonalNeighbor;
use voxel::ray::{DiscreteRayIterator, Ray};
use voxel::types::{
    FieldStrength, GridCellCoords, GridPointCoords, IsoVertexIndex, Touch3dSide, HWVI_UNMAPPED,
    IVI_NONE,
};

use crate::elements::IsoVertexElements;
use crate::renderable::MeshRenderable;
use crate::shadow::queue::VertexElement;
use crate::shadow::{
    HardwareShadow, NonTrivialCase, ProducerQueue, TransitionVertexProperties,
};
use crate::tables::{
    vertex_code_corners, REGULAR_CELL_CLASS, REGULAR_CELL_DATA, REGULAR_VERTEX_DATA,
    TRANSITION_CELL_CLASS, TRANSITION_CELL_DATA, TRANSITION_VERTEX_DATA, TRANSITION_WINDING_FLIP,
};

use cell::{grid_to_face, side_winding_flipped, GridCell, TransitionCell};
use refine::{refine_face_edge, refine_regular_edge};

/// Normal generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalsType {
    None,
    #[default]
    Gradient,
    Average,
    WeightedAverage,
}

/// Channel-level toggles for generated vertex attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceFlags(pub u8);

impl SurfaceFlags {
    pub const NONE: SurfaceFlags = SurfaceFlags(0);
    pub const NORMALS: SurfaceFlags = SurfaceFlags(0x01);
    pub const VERTEX_COLOURS: SurfaceFlags = SurfaceFlags(0x02);
    pub const TEX_COORDS: SurfaceFlags = SurfaceFlags(0x04);

    #[inline]
    pub fn contains(self, other: SurfaceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: SurfaceFlags) -> Self {
        SurfaceFlags(self.0 | other.0)
    }
}

/// Per-scene triangulation parameters.
#[derive(Debug, Clone)]
pub struct ChannelParameters {
    /// Number of detail levels renderables support.
    pub lod_count: u8,
    /// LOD switch threshold in pixels, consumed by the paging layer.
    pub max_pixel_error: f32,
    pub normals_type: NormalsType,
    /// Reverses the gradient-derived normal direction.
    pub flip_normals: bool,
    /// Transition cell depth as a fraction of a full cell, in `[0, 1]`.
    pub transition_cell_width_ratio: f32,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self {
            lod_count: 5,
            max_pixel_error: 8.0,
            normals_type: NormalsType::Gradient,
            flip_normals: false,
            transition_cell_width_ratio: 0.5,
        }
    }
}

/// Result of a ray query against the extracted surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub cell: GridCellCoords,
    /// Hit point in cube-local, origin-centered voxel coordinates.
    pub point: Vec3,
    /// Distance from the ray origin, in voxel units.
    pub distance: f32,
}

/// Builder scratch reused across calls.
struct Scratch {
    elements: IsoVertexElements,
    regular_lut: Vec<u8>,
    transition_luts: [Vec<u16>; OrthogonalNeighbor::COUNT],
    border_props: Vec<TransitionVertexProperties>,
    middle_props: Vec<TransitionVertexProperties>,
}

/// Marching Cubes + Transvoxel triangulator for one scene.
pub struct IsoSurfaceBuilder {
    descriptor: Arc<CubeDescriptor>,
    params: ChannelParameters,
    /// Per LOD, per touch-side combination: the inward translation applied
    /// to transition vertices on the full-resolution face.
    translators: Vec<[FixVec3; Touch3dSide::COUNT]>,
    scratch: Mutex<Scratch>,
}

impl IsoSurfaceBuilder {
    pub fn new(descriptor: Arc<CubeDescriptor>, params: ChannelParameters) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&params.transition_cell_width_ratio),
            "transition cell width ratio out of bounds"
        );
        let translators = (0..params.lod_count)
            .map(|lod| build_translators(lod, params.transition_cell_width_ratio))
            .collect();
        let scratch = Scratch {
            elements: IsoVertexElements::new(&descriptor),
            regular_lut: vec![0; descriptor.cell_count],
            transition_luts: std::array::from_fn(|_| vec![0; descriptor.side_cell_count]),
            border_props: Vec::new(),
            middle_props: Vec::new(),
        };
        Self {
            descriptor,
            params,
            translators,
            scratch: Mutex::new(scratch),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CubeDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn params(&self) -> &ChannelParameters {
        &self.params
    }

    /// Background build: triangulates and terminates by filling the
    /// shadow's builder queue for the main thread to drain.
    pub fn enqueue_build(
        &self,
        region: &CubeDataRegion,
        shadow: &HardwareShadow,
        lod: u8,
        stitches: Touch3dSide,
        surface_flags: SurfaceFlags,
        vertex_buffer_capacity: usize,
    ) {
        let mut scratch = self.scratch.lock().expect("builder mutex poisoned");
        let data = region.lease_shared();
        let mut producer = shadow.request_producer_queue(lod, stitches);

        self.build_impl(
            &mut scratch,
            &data,
            &mut producer,
            stitches,
            surface_flags,
            vertex_buffer_capacity,
        );
        fill_queue(&mut scratch.elements, &mut producer, self.descriptor.scale);
    }

    /// Synchronous build: triangulates and populates the renderable's
    /// buffers directly. Main thread only.
    pub fn build(
        &self,
        region: &CubeDataRegion,
        shadow: &HardwareShadow,
        renderable: &mut MeshRenderable,
        lod: u8,
        stitches: Touch3dSide,
        surface_flags: SurfaceFlags,
    ) {
        let mut scratch = self.scratch.lock().expect("builder mutex poisoned");
        let data = region.lease_shared();
        let mut producer = shadow.request_producer_queue(lod, stitches);

        self.build_impl(
            &mut scratch,
            &data,
            &mut producer,
            stitches,
            surface_flags,
            renderable.vertex_capacity(),
        );
        renderable.directly_populate_buffers(&scratch.elements, &mut producer, stitches);
    }

    fn build_impl(
        &self,
        scratch: &mut Scratch,
        data: &ReadAccessor<'_>,
        producer: &mut ProducerQueue<'_>,
        stitches: Touch3dSide,
        surface_flags: SurfaceFlags,
        vertex_buffer_capacity: usize,
    ) {
        let lod = producer.lod();
        debug_assert!(lod < self.params.lod_count, "level of detail out of range");
        scratch.elements.clear();
        scratch.border_props.clear();
        scratch.middle_props.clear();

        // A uniformly solid or empty cube has no surface; mark the caches
        // populated so nothing rescans it until the density changes
        if data.empty_status() != EmptyStatus::Mixed {
            tracing::debug!(lod, "cube classified trivial, skipping triangulation");
            let resolution = producer.resolution_mut();
            resolution.shadowed = true;
            for side in stitches.faces() {
                resolution.stitches[side as usize].shadowed = true;
            }
            return;
        }

        if !producer.resolution().shadowed {
            let cases = self.attain_regular_cases(data.values(), lod);
            producer.resolution_mut().regular_cases = cases;
        }
        for side in stitches.faces() {
            if !producer.resolution().stitches[side as usize].shadowed {
                let cases = self.attain_transition_cases(data.values(), lod, side);
                producer.resolution_mut().stitches[side as usize].transition_cases = cases;
            }
        }

        producer.restore_hw_indices(&mut scratch.elements);

        let overflow = {
            let mut pass = SurfacePass::new(self, scratch, data, lod, stitches, surface_flags);
            pass.next_hw = producer.next_vertex_index();
            pass.run(producer.resolution());
            producer.next_vertex_index() + pass.elements.vertex_shipment.len()
                > vertex_buffer_capacity
        };

        if overflow {
            // Not enough room: restart the hardware vertex buffer and
            // re-emit everything from offset zero
            tracing::debug!(lod, capacity = vertex_buffer_capacity, "vertex buffer restart");
            producer.raise_reset_vertex();
            producer.clear_hardware_state();
            scratch.elements.rollback();
            scratch.border_props.clear();
            scratch.middle_props.clear();

            let mut pass = SurfacePass::new(self, scratch, data, lod, stitches, surface_flags);
            pass.next_hw = 0;
            pass.run(producer.resolution());
        }

        // Cache face-vertex metadata for stitch configurations that were
        // scanned for the first time this build
        let border = std::mem::take(&mut scratch.border_props);
        let middle = std::mem::take(&mut scratch.middle_props);
        let resolution = producer.resolution_mut();
        for props in border {
            if !resolution.stitches[props.side as usize].shadowed {
                resolution.border_vertex_properties.push(props);
            }
        }
        for props in middle {
            if !resolution.stitches[props.side as usize].shadowed {
                resolution.middle_vertex_properties.push(props);
            }
        }

        resolution.shadowed = true;
        for side in stitches.faces() {
            resolution.stitches[side as usize].shadowed = true;
        }
    }

    fn attain_regular_cases(
        &self,
        values: &[FieldStrength],
        lod: u8,
    ) -> Vec<NonTrivialCase<u8>> {
        let dim = self.descriptor.dimensions;
        let span = 1u16 << lod;
        let mut gc = GridCell::new(&self.descriptor, lod);
        let mut cases = Vec::new();

        let mut z = 0;
        while z < dim {
            let mut y = 0;
            while y < dim {
                let mut x = 0;
                while x < dim {
                    gc.x = x;
                    gc.y = y;
                    gc.z = z;
                    let code = gc.case_code(values);
                    if code != 0 && code != 0xFF {
                        cases.push(NonTrivialCase {
                            cell: gc.index(),
                            case_code: code,
                        });
                    }
                    x += span;
                }
                y += span;
            }
            z += span;
        }
        cases
    }

    fn attain_transition_cases(
        &self,
        values: &[FieldStrength],
        lod: u8,
        side: OrthogonalNeighbor,
    ) -> Vec<NonTrivialCase<u16>> {
        let dim = self.descriptor.dimensions;
        let span = 1u16 << lod;
        let mut tc = TransitionCell::new(&self.descriptor, lod, side);
        let mut cases = Vec::new();

        let mut v = 0;
        while v < dim {
            let mut u = 0;
            while u < dim {
                tc.u = u;
                tc.v = v;
                let code = tc.case_code(values);
                if code != 0 && code != 0x1FF {
                    cases.push(NonTrivialCase {
                        cell: tc.index(),
                        case_code: code,
                    });
                }
                u += span;
            }
            v += span;
        }
        cases
    }

    /// Walks the ray through the cube at `2^lod` cell scale and returns the
    /// first triangle hit. Cells are triangulated on demand from the cached
    /// case codes; transition cells take priority over the coincident
    /// regular cell. The ray is given in cube-local, origin-centered voxel
    /// coordinates, matching emitted vertex positions.
    pub fn ray_query(
        &self,
        region: &CubeDataRegion,
        shadow: &HardwareShadow,
        lod: u8,
        stitches: Touch3dSide,
        ray: Ray,
        distance_limit: f32,
    ) -> Option<RayHit> {
        let mut scratch = self.scratch.lock().expect("builder mutex poisoned");
        let scratch = &mut *scratch;
        let data = region.lease_shared();
        let access = shadow.request_read_only(lod);
        let resolution = access.resolution();

        scratch.elements.clear();
        let shadowed = resolution.shadowed;
        let mut side_shadowed = [false; OrthogonalNeighbor::COUNT];
        if shadowed {
            scratch.regular_lut.fill(0);
            for case in &resolution.regular_cases {
                scratch.regular_lut[case.cell] = case.case_code;
            }
        }
        for side in stitches.faces() {
            let stitch = &resolution.stitches[side as usize];
            side_shadowed[side as usize] = stitch.shadowed;
            if stitch.shadowed {
                let lut = &mut scratch.transition_luts[side as usize];
                lut.fill(0);
                for case in &stitch.transition_cases {
                    lut[case.cell] = case.case_code;
                }
            }
        }

        let dim = self.descriptor.dimensions as i32;
        let half = (dim / 2) as f32;
        // walk in unsigned grid space; positions stay centered
        let grid_ray = Ray {
            origin: ray.origin + Vec3::splat(half),
            direction: ray.direction,
        };
        let span = 1i32 << lod;

        let mut pass = SurfacePass::new(self, scratch, &data, lod, stitches, SurfaceFlags::NONE);
        let walker = DiscreteRayIterator::new(grid_ray, span as f32);

        for step in walker {
            if distance_limit > 0.0 && step.distance > distance_limit {
                break;
            }
            let cell = step.cell * span;
            if cell.cmplt(glam::IVec3::ZERO).any() || cell.cmpge(glam::IVec3::splat(dim)).any() {
                // outside the cube; stop once the walker has passed through
                if step.distance > 3.0 * dim as f32 {
                    break;
                }
                continue;
            }
            let (x, y, z) = (cell.x as u16, cell.y as u16, cell.z as u16);
            let touch = self.descriptor.cell_touch_side(x, y, z, lod);

            let mark = pass.elements.triangles.len();
            for side in touch.intersect(stitches).faces() {
                let mut tc = TransitionCell::new(&self.descriptor, lod, side);
                let coords = GridPointCoords::new(x, y, z);
                let (u, v) = grid_to_face(side, coords);
                tc.u = u;
                tc.v = v;
                let code = if side_shadowed[side as usize] {
                    pass.transition_lut_code(side, &tc)
                } else {
                    tc.case_code(pass.values)
                };
                if code != 0 && code != 0x1FF {
                    pass.triangulate_transition_case(&tc, code);
                }
            }
            let mut gc = GridCell::new(&self.descriptor, lod);
            gc.x = x;
            gc.y = y;
            gc.z = z;
            let code = if shadowed {
                pass.regular_lut_code(&gc)
            } else {
                gc.case_code(pass.values)
            };
            if code != 0 && code != 0xFF {
                pass.triangulate_regular_case(&gc, code);
            }

            // test the freshly emitted triangles
            let mut best: Option<f32> = None;
            for triangle in &pass.elements.triangles[mark..] {
                let p: [Vec3; 3] = std::array::from_fn(|i| {
                    pass.elements.positions[triangle[i] as usize].to_vec3()
                });
                if let Some(distance) = ray_hits_triangle(&ray, p[0], p[1], p[2]) {
                    if distance_limit <= 0.0 || distance <= distance_limit {
                        best = Some(best.map_or(distance, |b: f32| b.min(distance)));
                    }
                }
            }
            if let Some(distance) = best {
                return Some(RayHit {
                    cell: GridCellCoords::new(x, y, z, lod),
                    point: ray.point_at(distance),
                    distance,
                });
            }
        }
        None
    }
}

/// Inward translation table for one LOD: per touch-side combination, the
/// offset pushing a face vertex into the cube by `ratio * 2^lod` on each
/// flagged axis.
fn build_translators(lod: u8, ratio: f32) -> [FixVec3; Touch3dSide::COUNT] {
    let amount = ratio * (1 << lod) as f32;
    std::array::from_fn(|bits| {
        let side = Touch3dSide(bits as u8);
        let axis = |low: Touch3dSide, high: Touch3dSide| -> f32 {
            let mut offset = 0.0;
            if side.contains(low) {
                offset += amount;
            }
            if side.contains(high) {
                offset -= amount;
            }
            offset
        };
        FixVec3::from_f32s(
            axis(Touch3dSide::WEST, Touch3dSide::EAST),
            axis(Touch3dSide::BELOW, Touch3dSide::ABOVE),
            axis(Touch3dSide::NORTH, Touch3dSide::SOUTH),
        )
    })
}

/// One triangulation pass over a cube: resolves, marshals, and emits.
struct SurfacePass<'a> {
    descriptor: &'a CubeDescriptor,
    elements: &'a mut IsoVertexElements,
    regular_lut: &'a [u8],
    transition_luts: &'a [Vec<u16>; OrthogonalNeighbor::COUNT],
    border_props: &'a mut Vec<TransitionVertexProperties>,
    middle_props: &'a mut Vec<TransitionVertexProperties>,
    values: &'a [FieldStrength],
    gradient: Option<&'a GradientChannels>,
    colours: Option<&'a voxel::data::ColourChannels>,
    params: &'a ChannelParameters,
    translator: &'a [FixVec3; Touch3dSide::COUNT],
    surface_flags: SurfaceFlags,
    lod: u8,
    stitches: Touch3dSide,
    next_hw: usize,
}

impl<'a> SurfacePass<'a> {
    fn new(
        builder: &'a IsoSurfaceBuilder,
        scratch: &'a mut Scratch,
        data: &'a ReadAccessor<'_>,
        lod: u8,
        stitches: Touch3dSide,
        surface_flags: SurfaceFlags,
    ) -> Self {
        Self {
            descriptor: &builder.descriptor,
            elements: &mut scratch.elements,
            regular_lut: &scratch.regular_lut,
            transition_luts: &scratch.transition_luts,
            border_props: &mut scratch.border_props,
            middle_props: &mut scratch.middle_props,
            values: data.values(),
            gradient: data.gradient(),
            colours: data.colours(),
            params: &builder.params,
            translator: &builder.translators[lod as usize],
            surface_flags,
            lod,
            stitches,
            next_hw: 0,
        }
    }

    fn regular_lut_code(&self, gc: &GridCell) -> u8 {
        self.regular_lut[gc.index()]
    }

    fn transition_lut_code(&self, side: OrthogonalNeighbor, tc: &TransitionCell) -> u16 {
        self.transition_luts[side as usize][tc.index()]
    }

    /// Full build over the cached case lists: regular cells first, then the
    /// stitched sides in orthogonal-neighbor order.
    fn run(&mut self, resolution: &crate::shadow::ResolutionState) {
        let mut gc = GridCell::new(self.descriptor, self.lod);
        for case in &resolution.regular_cases {
            gc.set_index(case.cell);
            self.triangulate_regular_case(&gc, case.case_code);
        }
        for side in self.stitches.faces() {
            let stitch = &resolution.stitches[side as usize];
            let mut tc = TransitionCell::new(self.descriptor, self.lod, side);
            for case in &stitch.transition_cases {
                tc.set_index(case.cell);
                self.triangulate_transition_case(&tc, case.case_code);
            }
        }
    }

    fn triangulate_regular_case(&mut self, gc: &GridCell, code: u8) {
        let class = REGULAR_CELL_CLASS[code as usize] as usize;
        let geometry = &REGULAR_CELL_DATA[class];
        let row = &REGULAR_VERTEX_DATA[code as usize];

        let mut slots = [IVI_NONE; 12];
        for (slot, &vertex_code) in row.iter().take(geometry.vertex_count()).enumerate() {
            slots[slot] = self.resolve_regular_vertex(gc, vertex_code);
        }

        for triangle in geometry.vertex_index[..geometry.triangle_count() * 3].chunks_exact(3) {
            self.add_triangle([
                slots[triangle[0] as usize],
                slots[triangle[1] as usize],
                slots[triangle[2] as usize],
            ]);
        }
    }

    fn triangulate_transition_case(&mut self, tc: &TransitionCell, code: u16) {
        let class_raw = TRANSITION_CELL_CLASS[code as usize];
        let class = (class_raw & !TRANSITION_WINDING_FLIP) as usize;
        let geometry = &TRANSITION_CELL_DATA[class];
        let row = &TRANSITION_VERTEX_DATA[code as usize];
        let invert =
            (class_raw & TRANSITION_WINDING_FLIP != 0) ^ side_winding_flipped(tc.side);

        let mut slots = [IVI_NONE; 12];
        for (slot, &vertex_code) in row.iter().take(geometry.vertex_count()).enumerate() {
            slots[slot] = self.resolve_transition_vertex(tc, vertex_code);
        }

        for triangle in geometry.vertex_index[..geometry.triangle_count() * 3].chunks_exact(3) {
            let (a, b, c) = if invert {
                (triangle[2], triangle[1], triangle[0])
            } else {
                (triangle[0], triangle[1], triangle[2])
            };
            self.add_triangle([slots[a as usize], slots[b as usize], slots[c as usize]]);
        }
    }

    /// Memo key for a coarse regular edge: the fine vertex id of its group
    /// and minimal corner, unique per build since a build runs at one LOD.
    fn regular_coarse_key(&self, a: GridPointCoords, b: GridPointCoords) -> usize {
        use crate::elements::RegularGroup;
        let (lo, hi) = if (a.k, a.j, a.i) <= (b.k, b.j, b.i) {
            (a, b)
        } else {
            (b, a)
        };
        let group = if hi.i != lo.i {
            RegularGroup::EdgeX
        } else if hi.j != lo.j {
            RegularGroup::EdgeY
        } else {
            RegularGroup::EdgeZ
        };
        self.elements.layout.regular(group, lo.i, lo.j, lo.k) as usize
    }

    /// Resolves one regular-cell vertex slot to its refined iso-vertex,
    /// marshaling it on first use.
    fn resolve_regular_vertex(&mut self, gc: &GridCell, vertex_code: u16) -> IsoVertexIndex {
        let (ca, cb) = vertex_code_corners(vertex_code);
        let a = gc.corner_coords(ca);
        let b = gc.corner_coords(cb);
        let key = self.regular_coarse_key(a, b);

        let memo = self.elements.refinements[key];
        let ivi = if memo != IVI_NONE {
            memo
        } else {
            let refined = refine_regular_edge(self.descriptor, self.values, a, b, gc.lod());
            let ivi = self
                .elements
                .layout
                .regular_for_pair(self.descriptor, refined.idx0, refined.idx1);
            self.elements.cell_corners[ivi as usize] = (refined.idx0, refined.idx1);
            self.elements.refinements[key] = ivi;
            ivi
        };

        self.marshal_vertex(ivi, FixVec3::ZERO);
        ivi
    }

    /// Resolves one transition-cell vertex slot: full-resolution codes live
    /// in the face index space (translated inward), half-resolution codes
    /// refine onto the regular lattice and share the regular mesh vertex.
    fn resolve_transition_vertex(
        &mut self,
        tc: &TransitionCell,
        vertex_code: u16,
    ) -> IsoVertexIndex {
        let (ca, cb) = vertex_code_corners(vertex_code);
        let half_res = ca >= 9 && cb >= 9;

        if half_res {
            let a = tc.corner_coords(ca);
            let b = tc.corner_coords(cb);
            let key = self.regular_coarse_key(a, b);
            let memo = self.elements.refinements[key];
            let ivi = if memo != IVI_NONE {
                memo
            } else {
                let refined =
                    refine_regular_edge(self.descriptor, self.values, a, b, tc.half_lod());
                let ivi = self
                    .elements
                    .layout
                    .regular_for_pair(self.descriptor, refined.idx0, refined.idx1);
                self.elements.cell_corners[ivi as usize] = (refined.idx0, refined.idx1);
                self.elements.refinements[key] = ivi;
                ivi
            };
            self.marshal_vertex(ivi, FixVec3::ZERO);
            self.middle_props.push(TransitionVertexProperties {
                index: ivi,
                side: tc.side,
                cell: tc.index(),
                code: vertex_code,
                touch: Touch3dSide::from_neighbor(tc.side),
            });
            return ivi;
        }

        let fa = tc.corner_face_coords(ca);
        let fb = tc.corner_face_coords(cb);
        let key = self.transition_coarse_key(tc.side, fa, fb);
        let memo = self.elements.refinements[key];
        let ivi = if memo != IVI_NONE {
            memo
        } else {
            let refined = refine_face_edge(
                self.descriptor,
                self.values,
                tc.side,
                fa,
                fb,
                tc.full_lod(),
            );
            let ivi = self
                .elements
                .layout
                .transition_for_pair(tc.side, refined.face0, refined.face1);
            self.elements.cell_corners[ivi as usize] = (refined.idx0, refined.idx1);
            self.elements.refinements[key] = ivi;

            // Touch set of the vertex: faces both refined endpoints share
            let g0 = self.descriptor.grid_point(refined.idx0);
            let g1 = self.descriptor.grid_point(refined.idx1);
            let touch = self
                .descriptor
                .touch_side(g0.i, g0.j, g0.k)
                .intersect(self.descriptor.touch_side(g1.i, g1.j, g1.k));

            // A vertex on a cube edge shared with an earlier stitched side
            // already exists in that side's index space; reuse it so both
            // stitches share one emitted vertex
            let mut owner = IVI_NONE;
            for other in self.stitches.faces() {
                if (other as u8) >= (tc.side as u8) {
                    break;
                }
                if touch.contains(Touch3dSide::from_neighbor(other)) {
                    let o0 = grid_to_face(other, g0);
                    let o1 = grid_to_face(other, g1);
                    owner = self.elements.layout.transition_for_pair(other, o0, o1);
                    break;
                }
            }
            if owner != IVI_NONE && self.elements.indices[owner as usize] != HWVI_UNMAPPED {
                self.elements.remappings[ivi as usize] = owner;
            } else {
                let dv = self.translator[touch.0 as usize];
                self.marshal_vertex(ivi, dv);
            }

            if touch.0.count_ones() > 1 {
                self.border_props.push(TransitionVertexProperties {
                    index: ivi,
                    side: tc.side,
                    cell: tc.index(),
                    code: vertex_code,
                    touch,
                });
            }
            ivi
        };

        let resolved = self.elements.resolve(ivi);
        self.marshal_vertex(resolved, FixVec3::ZERO);
        resolved
    }

    fn transition_coarse_key(
        &self,
        side: OrthogonalNeighbor,
        a: (u16, u16),
        b: (u16, u16),
    ) -> usize {
        use crate::elements::TransitionGroup;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let group = if hi.0 != lo.0 {
            TransitionGroup::EdgeU
        } else {
            TransitionGroup::EdgeV
        };
        self.elements.layout.transition(side, group, lo.0, lo.1) as usize
    }

    /// Emits the vertex into the shipment on first use: interpolated
    /// position plus the optional attribute channels.
    fn marshal_vertex(&mut self, ivi: IsoVertexIndex, dv: FixVec3) {
        let slot = ivi as usize;
        if self.elements.indices[slot] != HWVI_UNMAPPED {
            return;
        }

        let (i0, i1) = self.elements.cell_corners[slot];
        let v0 = self.values[i0] as i32;
        let v1 = self.values[i1] as i32;
        let denominator = IsoFix::from_int(v1 - v0).non_zero();
        let t = IsoFix::from_int(v1) / denominator;

        let positions = self.descriptor.positions();
        self.elements.positions[slot] =
            positions[i0] * t + positions[i1] * (IsoFix::ONE - t) + dv;

        if self.surface_flags.contains(SurfaceFlags::NORMALS) {
            self.elements.normals[slot] = match self.params.normals_type {
                NormalsType::Gradient => {
                    let sample = |idx: usize| -> Vec3 {
                        let g = self.gradient.expect("gradient channel required");
                        Vec3::new(g.dx[idx] as f32, g.dy[idx] as f32, g.dz[idx] as f32)
                    };
                    let g0 = sample(i0);
                    let g1 = sample(i1);
                    let blended = g0 + (g1 - g0) * t.to_f32();
                    // the stored channel points into the solid; the outward
                    // normal is its negation unless flipped
                    let normal = if self.params.flip_normals {
                        blended
                    } else {
                        -blended
                    };
                    normal.normalize_or_zero()
                }
                _ => Vec3::ZERO,
            };
        }

        if self.surface_flags.contains(SurfaceFlags::VERTEX_COLOURS) {
            if let Some(colours) = self.colours {
                let c0 = colours.get(i0);
                let c1 = colours.get(i1);
                let tf = t.to_f32();
                self.elements.colours[slot] = std::array::from_fn(|c| {
                    (c0[c] as f32 * tf + c1[c] as f32 * (1.0 - tf)) as u8
                });
            }
        }

        if self.surface_flags.contains(SurfaceFlags::TEX_COORDS) {
            let p = self.elements.positions[slot];
            self.elements.texcoords[slot] = [p.x.to_f32(), p.y.to_f32()];
        }

        self.elements.indices[slot] = self.next_hw as u16;
        self.next_hw += 1;
        self.elements.vertex_shipment.push(ivi);
    }

    /// Queues a triangle unless it degenerated to a line; accumulates face
    /// normals for the averaging normal modes.
    fn add_triangle(&mut self, triangle: [IsoVertexIndex; 3]) {
        let resolved = triangle.map(|v| self.elements.resolve(v));
        if resolved[0] == resolved[1]
            || resolved[1] == resolved[2]
            || resolved[2] == resolved[0]
        {
            return;
        }

        if self.surface_flags.contains(SurfaceFlags::NORMALS) {
            let accumulate = match self.params.normals_type {
                NormalsType::Average | NormalsType::WeightedAverage => true,
                NormalsType::Gradient | NormalsType::None => false,
            };
            if accumulate {
                let p: [Vec3; 3] = std::array::from_fn(|i| {
                    self.elements.positions[resolved[i] as usize].to_vec3()
                });
                let face = (p[1] - p[0]).cross(p[2] - p[0]);
                let contribution = match self.params.normals_type {
                    NormalsType::WeightedAverage => {
                        let len_sq = face.length_squared();
                        if len_sq > f32::EPSILON {
                            face / len_sq
                        } else {
                            Vec3::ZERO
                        }
                    }
                    _ => face.normalize_or_zero(),
                };
                for &v in &resolved {
                    self.elements.normals[v as usize] += contribution;
                }
            }
        }

        self.elements.triangles.push(resolved);
    }
}

/// Builds the hardware vertex element for one marshaled iso-vertex.
pub(crate) fn vertex_element(
    elements: &IsoVertexElements,
    ivi: IsoVertexIndex,
    scale: f32,
) -> VertexElement {
    let slot = ivi as usize;
    let position = elements.positions[slot].to_vec3() * scale;
    let normal = elements.normals[slot].normalize_or_zero();
    let [r, g, b, a] = elements.colours[slot];
    VertexElement {
        position: position.to_array(),
        normal: normal.to_array(),
        colour: u32::from_be_bytes([r, g, b, a]),
        texcoord: elements.texcoords[slot],
    }
}

/// Moves the pass output into the shadow's builder queue.
fn fill_queue(elements: &mut IsoVertexElements, producer: &mut ProducerQueue<'_>, scale: f32) {
    let queue = producer.queue_mut();
    queue.vertex_queue.clear();
    queue.index_queue.clear();
    queue.revmap_queue.clear();

    for &ivi in &elements.vertex_shipment {
        queue.vertex_queue.push(vertex_element(elements, ivi, scale));
    }
    for triangle in &elements.triangles {
        for &ivi in triangle {
            let hw = elements.indices[ivi as usize];
            debug_assert_ne!(hw, HWVI_UNMAPPED, "triangle references unmapped vertex");
            queue.index_queue.push(hw);
        }
    }
    queue.revmap_queue = std::mem::take(&mut elements.vertex_shipment);
}

/// Projective ray/triangle intersection; returns the ray parameter of the
/// hit when the barycentrics land inside the triangle.
fn ray_hits_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let u = b - a;
    let v = c - a;
    let normal = u.cross(v);
    let denominator = ray.direction.dot(normal);
    if denominator.abs() < 1e-9 {
        return None;
    }
    let distance = (a - ray.origin).dot(normal) / denominator;
    if distance < 0.0 {
        return None;
    }
    let w = ray.point_at(distance) - a;

    let uu = u.dot(u);
    let vv = v.dot(v);
    let uv = u.dot(v);
    let wu = w.dot(u);
    let wv = w.dot(v);
    let det = uv * uv - uu * vv;
    if det.abs() < 1e-12 {
        return None;
    }
    let s = (uv * wv - vv * wu) / det;
    let t = (uv * wu - uu * wv) / det;
    (s >= -1e-6 && t >= -1e-6 && s + t <= 1.0 + 1e-6).then_some(distance)
}
