//! Scratch arena for iso-vertices and the deterministic index layout
//!
//! Every potential iso-vertex of a cube has a fixed logical index derived
//! from its refined voxel pair, never from the order of discovery. Two
//! builds of the same density, and two cells sharing an edge, therefore
//! always agree on vertex identity; that is what makes vertex reuse and
//! cross-cube stitching exact.
//!
//! Layout: regular vertices come first in four lattice blocks (grid points,
//! then edges along x, y, z), followed by one block per cube face for the
//! transition vertices living on that face (face points, then face u-edges,
//! then face v-edges). Half-resolution transition vertices refine onto the
//! regular lattice and borrow regular indices.

use glam::Vec3;

use voxel::descriptor::CubeDescriptor;
use voxel::fixed::FixVec3;
use voxel::neighbor::OrthogonalNeighbor;
use voxel::types::{
    DimensionType, HwVertexIndex, IsoVertexIndex, VoxelIndex, HWVI_UNMAPPED, IVI_NONE,
};

/// Lattice group of a regular iso-vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularGroup {
    /// Vertex sits exactly on a grid point (zero-valued sample).
    Point,
    EdgeX,
    EdgeY,
    EdgeZ,
}

/// Lattice group of a transition iso-vertex on a cube face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGroup {
    Point,
    EdgeU,
    EdgeV,
}

/// Precomputed block offsets of the iso-vertex index space.
#[derive(Debug, Clone)]
pub struct IsoVertexLayout {
    dim: usize,
    regular_offsets: [usize; 4],
    side_offsets: [usize; OrthogonalNeighbor::COUNT],
    side_group_offsets: [usize; 3],
    total: usize,
}

impl IsoVertexLayout {
    pub fn new(descriptor: &CubeDescriptor) -> Self {
        let d = descriptor.dimensions as usize;
        let points = (d + 1) * (d + 1) * (d + 1);
        let edges_per_axis = d * (d + 1) * (d + 1);

        let regular_offsets = [
            0,
            points,
            points + edges_per_axis,
            points + 2 * edges_per_axis,
        ];
        let regular_total = points + 3 * edges_per_axis;

        let face_points = (d + 1) * (d + 1);
        let face_edges = d * (d + 1);
        let side_group_offsets = [0, face_points, face_points + face_edges];
        let side_size = face_points + 2 * face_edges;

        let mut side_offsets = [0; OrthogonalNeighbor::COUNT];
        for (s, offset) in side_offsets.iter_mut().enumerate() {
            *offset = regular_total + s * side_size;
        }

        Self {
            dim: d,
            regular_offsets,
            side_offsets,
            side_group_offsets,
            total: regular_total + OrthogonalNeighbor::COUNT * side_size,
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Index of a regular vertex by group and minimal grid point.
    pub fn regular(
        &self,
        group: RegularGroup,
        i: DimensionType,
        j: DimensionType,
        k: DimensionType,
    ) -> IsoVertexIndex {
        let d = self.dim;
        let (i, j, k) = (i as usize, j as usize, k as usize);
        let (base, linear) = match group {
            RegularGroup::Point => (
                self.regular_offsets[0],
                (k * (d + 1) + j) * (d + 1) + i,
            ),
            RegularGroup::EdgeX => {
                debug_assert!(i < d);
                (self.regular_offsets[1], (k * (d + 1) + j) * d + i)
            }
            RegularGroup::EdgeY => {
                debug_assert!(j < d);
                (self.regular_offsets[2], (k * d + j) * (d + 1) + i)
            }
            RegularGroup::EdgeZ => {
                debug_assert!(k < d);
                (self.regular_offsets[3], (k * (d + 1) + j) * (d + 1) + i)
            }
        };
        (base + linear) as IsoVertexIndex
    }

    /// Index of a regular vertex from a refined voxel index pair.
    ///
    /// The pair must be identical (point vertex) or axis-adjacent; the
    /// adjacency axis selects the edge group, the smaller index the anchor.
    pub fn regular_for_pair(
        &self,
        descriptor: &CubeDescriptor,
        idx0: VoxelIndex,
        idx1: VoxelIndex,
    ) -> IsoVertexIndex {
        let (lo, hi) = if idx0 <= idx1 { (idx0, idx1) } else { (idx1, idx0) };
        let gpc = descriptor.grid_point(lo);
        if lo == hi {
            return self.regular(RegularGroup::Point, gpc.i, gpc.j, gpc.k);
        }
        let group = match hi - lo {
            1 => RegularGroup::EdgeX,
            delta if delta == descriptor.point_tx.my => RegularGroup::EdgeY,
            delta => {
                debug_assert_eq!(delta, descriptor.point_tx.mz, "refined pair is not adjacent");
                RegularGroup::EdgeZ
            }
        };
        self.regular(group, gpc.i, gpc.j, gpc.k)
    }

    /// Index of a transition vertex by face, group, and minimal face point.
    pub fn transition(
        &self,
        side: OrthogonalNeighbor,
        group: TransitionGroup,
        u: DimensionType,
        v: DimensionType,
    ) -> IsoVertexIndex {
        let d = self.dim;
        let (u, v) = (u as usize, v as usize);
        let (base, linear) = match group {
            TransitionGroup::Point => (self.side_group_offsets[0], v * (d + 1) + u),
            TransitionGroup::EdgeU => {
                debug_assert!(u < d);
                (self.side_group_offsets[1], v * d + u)
            }
            TransitionGroup::EdgeV => {
                debug_assert!(v < d);
                (self.side_group_offsets[2], v * (d + 1) + u)
            }
        };
        (self.side_offsets[side as usize] + base + linear) as IsoVertexIndex
    }

    /// Index of a transition vertex from a refined face-coordinate pair.
    pub fn transition_for_pair(
        &self,
        side: OrthogonalNeighbor,
        c0: (DimensionType, DimensionType),
        c1: (DimensionType, DimensionType),
    ) -> IsoVertexIndex {
        let (lo, hi) = if c0 <= c1 { (c0, c1) } else { (c1, c0) };
        if lo == hi {
            return self.transition(side, TransitionGroup::Point, lo.0, lo.1);
        }
        let group = if lo.1 == hi.1 {
            debug_assert_eq!(lo.0 + 1, hi.0, "refined pair is not adjacent");
            TransitionGroup::EdgeU
        } else {
            debug_assert_eq!(lo.1 + 1, hi.1, "refined pair is not adjacent");
            debug_assert_eq!(lo.0, hi.0, "refined pair is not adjacent");
            TransitionGroup::EdgeV
        };
        self.transition(side, group, lo.0, lo.1)
    }
}

/// One triangle of the extracted surface, as logical vertex indices.
pub type IsoTriangle = [IsoVertexIndex; 3];

/// Aggregate scratch container for all iso-vertex attributes, sized once per
/// descriptor so builds allocate nothing in steady state.
pub struct IsoVertexElements {
    pub layout: IsoVertexLayout,

    /// Hardware vertex index per iso-vertex; `HWVI_UNMAPPED` when unused.
    pub indices: Vec<HwVertexIndex>,
    pub positions: Vec<FixVec3>,
    pub normals: Vec<Vec3>,
    pub colours: Vec<[u8; 4]>,
    pub texcoords: Vec<[f32; 2]>,
    /// Refined voxel pair bracketing each used vertex.
    pub cell_corners: Vec<(VoxelIndex, VoxelIndex)>,

    /// Maps a transition vertex to the vertex another stitched face emitted
    /// for the same world position.
    pub remappings: Vec<IsoVertexIndex>,
    /// Maps a coarse iso-vertex to its refined counterpart.
    pub refinements: Vec<IsoVertexIndex>,

    /// Vertices queued for the hardware buffer, in emission order.
    pub vertex_shipment: Vec<IsoVertexIndex>,
    pub triangles: Vec<IsoTriangle>,
}

impl IsoVertexElements {
    pub fn new(descriptor: &CubeDescriptor) -> Self {
        let layout = IsoVertexLayout::new(descriptor);
        let total = layout.total();
        Self {
            layout,
            indices: vec![HWVI_UNMAPPED; total],
            positions: vec![FixVec3::ZERO; total],
            normals: vec![Vec3::ZERO; total],
            colours: vec![[0; 4]; total],
            texcoords: vec![[0.0; 2]; total],
            cell_corners: vec![(0, 0); total],
            remappings: vec![IVI_NONE; total],
            refinements: vec![IVI_NONE; total],
            vertex_shipment: Vec::new(),
            triangles: Vec::new(),
        }
    }

    /// Resets per-build state. Attribute arrays are left stale; `indices`
    /// and the mapping LUTs are what gate reuse.
    pub fn clear(&mut self) {
        self.indices.fill(HWVI_UNMAPPED);
        self.remappings.fill(IVI_NONE);
        self.refinements.fill(IVI_NONE);
        self.vertex_shipment.clear();
        self.triangles.clear();
    }

    /// Undoes hardware index assignment after a failed capacity check so the
    /// marshal pass can run again against an empty buffer. Every mapping is
    /// dropped, including entries restored from earlier uploads: the restart
    /// re-emits all of them from offset zero.
    pub fn rollback(&mut self) {
        self.indices.fill(HWVI_UNMAPPED);
        self.vertex_shipment.clear();
        self.triangles.clear();
    }

    /// Number of hardware indices the queued triangles will occupy.
    #[inline]
    pub fn index_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Follows the remapping chain to the vertex that actually got emitted.
    #[inline]
    pub fn resolve(&self, ivi: IsoVertexIndex) -> IsoVertexIndex {
        let mapped = self.remappings[ivi as usize];
        if mapped == IVI_NONE {
            ivi
        } else {
            mapped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel::descriptor::VoxelRegionFlags;

    fn descriptor() -> CubeDescriptor {
        CubeDescriptor::new(17, 1.0, VoxelRegionFlags::NONE).unwrap()
    }

    #[test]
    fn test_layout_blocks_are_disjoint() {
        let meta = descriptor();
        let layout = IsoVertexLayout::new(&meta);
        let d = 16u16;

        let mut seen = std::collections::HashSet::new();
        for k in 0..=d {
            for j in 0..=d {
                for i in 0..=d {
                    assert!(seen.insert(layout.regular(RegularGroup::Point, i, j, k)));
                    if i < d {
                        assert!(seen.insert(layout.regular(RegularGroup::EdgeX, i, j, k)));
                    }
                    if j < d {
                        assert!(seen.insert(layout.regular(RegularGroup::EdgeY, i, j, k)));
                    }
                    if k < d {
                        assert!(seen.insert(layout.regular(RegularGroup::EdgeZ, i, j, k)));
                    }
                }
            }
        }
        for side in OrthogonalNeighbor::ALL {
            for v in 0..=d {
                for u in 0..=d {
                    assert!(seen.insert(layout.transition(side, TransitionGroup::Point, u, v)));
                    if u < d {
                        assert!(seen.insert(layout.transition(side, TransitionGroup::EdgeU, u, v)));
                    }
                    if v < d {
                        assert!(seen.insert(layout.transition(side, TransitionGroup::EdgeV, u, v)));
                    }
                }
            }
        }
        assert_eq!(seen.len(), layout.total());
    }

    #[test]
    fn test_pair_derivation_matches_groups() {
        let meta = descriptor();
        let layout = IsoVertexLayout::new(&meta);

        let p = meta.grid_point_index(3, 4, 5);
        assert_eq!(
            layout.regular_for_pair(&meta, p, p),
            layout.regular(RegularGroup::Point, 3, 4, 5)
        );
        assert_eq!(
            layout.regular_for_pair(&meta, p, meta.grid_point_index(4, 4, 5)),
            layout.regular(RegularGroup::EdgeX, 3, 4, 5)
        );
        // order independence
        assert_eq!(
            layout.regular_for_pair(&meta, meta.grid_point_index(3, 5, 5), p),
            layout.regular(RegularGroup::EdgeY, 3, 4, 5)
        );
        assert_eq!(
            layout.regular_for_pair(&meta, p, meta.grid_point_index(3, 4, 6)),
            layout.regular(RegularGroup::EdgeZ, 3, 4, 5)
        );
    }

    #[test]
    fn test_transition_pair_derivation() {
        let meta = descriptor();
        let layout = IsoVertexLayout::new(&meta);
        let side = OrthogonalNeighbor::East;

        assert_eq!(
            layout.transition_for_pair(side, (2, 7), (3, 7)),
            layout.transition(side, TransitionGroup::EdgeU, 2, 7)
        );
        assert_eq!(
            layout.transition_for_pair(side, (2, 8), (2, 7)),
            layout.transition(side, TransitionGroup::EdgeV, 2, 7)
        );
        assert_eq!(
            layout.transition_for_pair(side, (5, 5), (5, 5)),
            layout.transition(side, TransitionGroup::Point, 5, 5)
        );
    }

    #[test]
    fn test_rollback_restores_indices() {
        let meta = descriptor();
        let mut elements = IsoVertexElements::new(&meta);
        elements.clear();
        elements.indices[10] = 0;
        elements.indices[11] = 1;
        elements.vertex_shipment.extend([10, 11]);
        elements.triangles.push([10, 11, 10]);

        elements.rollback();
        assert_eq!(elements.indices[10], HWVI_UNMAPPED);
        assert_eq!(elements.indices[11], HWVI_UNMAPPED);
        assert!(elements.vertex_shipment.is_empty());
        assert!(elements.triangles.is_empty());
    }
}
