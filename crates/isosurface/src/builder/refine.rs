//! Iso-vertex refinement by interval bisection
//!
//! A cell at LOD `n` spans `2^n` voxels per edge, so the zero crossing
//! implied by its case code may sit anywhere along a run of finest-level
//! voxels. Bisecting `n` times, each time keeping the half whose endpoint
//! classification matches the midpoint sample, lands on the two adjacent
//! finest-resolution voxels that actually straddle the crossing. Every cell
//! that shares the crossing refines to the same pair, which is what makes
//! vertex identity deterministic across LODs and cube boundaries.

use voxel::descriptor::CubeDescriptor;
use voxel::neighbor::OrthogonalNeighbor;
use voxel::types::{DimensionType, FieldStrength, GridPointCoords, VoxelIndex};

use super::cell::face_to_grid;

/// Result of refining one cell edge down to the finest lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinedEdge {
    pub coords0: GridPointCoords,
    pub coords1: GridPointCoords,
    pub idx0: VoxelIndex,
    pub idx1: VoxelIndex,
    /// The empty endpoint sampled exactly zero, collapsing the vertex onto
    /// that grid point.
    pub zero: bool,
}

#[inline]
fn solid(v: FieldStrength) -> bool {
    v < 0
}

/// Refines a regular cell edge given its two corner grid points.
pub fn refine_regular_edge(
    descriptor: &CubeDescriptor,
    values: &[FieldStrength],
    mut c0: GridPointCoords,
    mut c1: GridPointCoords,
    lod: u8,
) -> RefinedEdge {
    let sample =
        |c: GridPointCoords| -> FieldStrength { values[descriptor.grid_point_index(c.i, c.j, c.k)] };

    let mut v0 = sample(c0);
    let mut v1 = sample(c1);
    debug_assert_ne!(solid(v0), solid(v1), "edge endpoints must straddle the surface");

    for _ in 0..lod {
        let mid = GridPointCoords::new(
            (c0.i + c1.i) / 2,
            (c0.j + c1.j) / 2,
            (c0.k + c1.k) / 2,
        );
        let vm = sample(mid);
        if solid(vm) == solid(v0) {
            c0 = mid;
            v0 = vm;
        } else {
            c1 = mid;
            v1 = vm;
        }
    }

    // A zero sample can only occur on the empty endpoint; the vertex then
    // sits exactly on that grid point.
    let (zero_c0, zero_c1) = (v0 == 0, v1 == 0);
    if zero_c0 {
        c1 = c0;
    } else if zero_c1 {
        c0 = c1;
    }

    RefinedEdge {
        coords0: c0,
        coords1: c1,
        idx0: descriptor.grid_point_index(c0.i, c0.j, c0.k),
        idx1: descriptor.grid_point_index(c1.i, c1.j, c1.k),
        zero: zero_c0 || zero_c1,
    }
}

/// Result of refining a transition cell edge in face coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinedFaceEdge {
    pub face0: (DimensionType, DimensionType),
    pub face1: (DimensionType, DimensionType),
    pub idx0: VoxelIndex,
    pub idx1: VoxelIndex,
    pub zero: bool,
}

/// Refines a full-resolution transition edge on a cube face.
pub fn refine_face_edge(
    descriptor: &CubeDescriptor,
    values: &[FieldStrength],
    side: OrthogonalNeighbor,
    mut f0: (DimensionType, DimensionType),
    mut f1: (DimensionType, DimensionType),
    lod: u8,
) -> RefinedFaceEdge {
    let dim = descriptor.dimensions;
    let sample = |f: (DimensionType, DimensionType)| -> FieldStrength {
        let c = face_to_grid(side, f.0, f.1, dim);
        values[descriptor.grid_point_index(c.i, c.j, c.k)]
    };

    let mut v0 = sample(f0);
    let mut v1 = sample(f1);
    debug_assert_ne!(solid(v0), solid(v1), "edge endpoints must straddle the surface");

    for _ in 0..lod {
        let mid = ((f0.0 + f1.0) / 2, (f0.1 + f1.1) / 2);
        let vm = sample(mid);
        if solid(vm) == solid(v0) {
            f0 = mid;
            v0 = vm;
        } else {
            f1 = mid;
            v1 = vm;
        }
    }

    let (zero_f0, zero_f1) = (v0 == 0, v1 == 0);
    if zero_f0 {
        f1 = f0;
    } else if zero_f1 {
        f0 = f1;
    }

    let g0 = face_to_grid(side, f0.0, f0.1, dim);
    let g1 = face_to_grid(side, f1.0, f1.1, dim);
    RefinedFaceEdge {
        face0: f0,
        face1: f1,
        idx0: descriptor.grid_point_index(g0.i, g0.j, g0.k),
        idx1: descriptor.grid_point_index(g1.i, g1.j, g1.k),
        zero: zero_f0 || zero_f1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel::descriptor::VoxelRegionFlags;

    fn setup() -> (CubeDescriptor, Vec<FieldStrength>) {
        let meta = CubeDescriptor::new(17, 1.0, VoxelRegionFlags::NONE).unwrap();
        let values = vec![4 as FieldStrength; meta.grid_point_count];
        (meta, values)
    }

    #[test]
    fn test_refinement_finds_straddling_pair() {
        let (meta, mut values) = setup();
        // Solid below x=5.x on the row j=0, k=0
        for i in 0..=5u16 {
            values[meta.grid_point_index(i, 0, 0)] = -4;
        }

        let refined = refine_regular_edge(
            &meta,
            &values,
            GridPointCoords::new(0, 0, 0),
            GridPointCoords::new(16, 0, 0),
            4,
        );
        assert_eq!(refined.coords0, GridPointCoords::new(5, 0, 0));
        assert_eq!(refined.coords1, GridPointCoords::new(6, 0, 0));
        assert!(!refined.zero);
    }

    #[test]
    fn test_refinement_idempotent_across_lods() {
        let (meta, mut values) = setup();
        for i in 0..=10u16 {
            values[meta.grid_point_index(i, 0, 0)] = -4;
        }
        // The LOD-4 edge and the LOD-1 edge containing the crossing must
        // refine to the same pair
        let coarse = refine_regular_edge(
            &meta,
            &values,
            GridPointCoords::new(0, 0, 0),
            GridPointCoords::new(16, 0, 0),
            4,
        );
        let fine = refine_regular_edge(
            &meta,
            &values,
            GridPointCoords::new(10, 0, 0),
            GridPointCoords::new(12, 0, 0),
            1,
        );
        assert_eq!(coarse.idx0, fine.idx0);
        assert_eq!(coarse.idx1, fine.idx1);
    }

    #[test]
    fn test_zero_sample_collapses_vertex() {
        let (meta, mut values) = setup();
        values[meta.grid_point_index(0, 0, 0)] = -4;
        values[meta.grid_point_index(1, 0, 0)] = 0; // empty, exactly zero

        let refined = refine_regular_edge(
            &meta,
            &values,
            GridPointCoords::new(0, 0, 0),
            GridPointCoords::new(1, 0, 0),
            0,
        );
        assert!(refined.zero);
        assert_eq!(refined.idx0, refined.idx1);
        assert_eq!(refined.coords0, GridPointCoords::new(1, 0, 0));
    }

    #[test]
    fn test_face_refinement_matches_regular() {
        let (meta, mut values) = setup();
        // Crossing along the z axis on the west face (face u maps to z)
        for k in 0..=6u16 {
            values[meta.grid_point_index(0, 3, k)] = -4;
        }
        let refined = refine_face_edge(
            &meta,
            &values,
            OrthogonalNeighbor::West,
            (4, 3),
            (8, 3),
            2,
        );
        assert_eq!(refined.face0, (6, 3));
        assert_eq!(refined.face1, (7, 3));
        assert_eq!(refined.idx0, meta.grid_point_index(0, 3, 6));
        assert_eq!(refined.idx1, meta.grid_point_index(0, 3, 7));
    }
}
