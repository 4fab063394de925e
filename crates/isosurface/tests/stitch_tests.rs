//! Multi-resolution stitching across adjacent cube regions

use std::collections::BTreeSet;
use std::sync::Arc;

use glam::Vec3;

use isosurface::builder::{ChannelParameters, IsoSurfaceBuilder, SurfaceFlags};
use isosurface::shadow::HardwareShadow;
use isosurface::VertexElement;
use voxel::data::{CubeDataRegion, VoxelDataPool};
use voxel::descriptor::{CubeDescriptor, VoxelRegionFlags};
use voxel::types::{FieldStrength, Touch3dSide};

/// Two adjacent 17-cubes sharing the left cube's East face; the field is a
/// function of world coordinates so the shared plane samples identically.
struct Pair {
    left: CubeDataRegion,
    right: CubeDataRegion,
    builder: IsoSurfaceBuilder,
}

fn make_pair(field: impl Fn(f32, f32, f32) -> FieldStrength) -> Pair {
    let descriptor = Arc::new(CubeDescriptor::new(17, 1.0, VoxelRegionFlags::GRADIENT).unwrap());
    let pool = Arc::new(VoxelDataPool::new(
        descriptor.grid_point_count,
        descriptor.region_flags,
        2,
        1,
    ));

    let make = |origin: Vec3| {
        let region = CubeDataRegion::new(
            Arc::clone(&descriptor),
            Arc::clone(&pool),
            descriptor.world_box(origin),
        );
        {
            let mut accessor = region.lease();
            for k in 0..=16u16 {
                for j in 0..=16u16 {
                    for i in 0..=16u16 {
                        let world = origin + Vec3::new(i as f32, j as f32, k as f32);
                        let index = descriptor.grid_point_index(i, j, k);
                        accessor.values_mut()[index] = field(world.x, world.y, world.z);
                    }
                }
            }
            accessor.edit().update_gradient();
        }
        region
    };

    let left = make(Vec3::new(0.0, 0.0, 0.0));
    let right = make(Vec3::new(16.0, 0.0, 0.0));
    // zero width ratio keeps transition vertices on the face plane so the
    // comparison is bit-exact
    let builder = IsoSurfaceBuilder::new(
        Arc::clone(&descriptor),
        ChannelParameters {
            transition_cell_width_ratio: 0.0,
            ..Default::default()
        },
    );
    Pair {
        left,
        right,
        builder,
    }
}

fn drain(
    pair: &Pair,
    region: &CubeDataRegion,
    lod: u8,
    stitches: Touch3dSide,
) -> Vec<VertexElement> {
    let shadow = HardwareShadow::new(5);
    pair.builder
        .enqueue_build(region, &shadow, lod, stitches, SurfaceFlags::NORMALS, 1 << 20);
    let consumer = shadow.request_consumer_lock(lod, stitches).unwrap();
    let vertices = consumer.vertex_queue().to_vec();
    consumer.consume();
    vertices
}

/// Vertex positions on a given local x-plane, deduplicated and made
/// comparable through exact bit patterns.
fn face_positions(vertices: &[VertexElement], x: f32) -> BTreeSet<(u32, u32)> {
    vertices
        .iter()
        .filter(|v| v.position[0] == x)
        .map(|v| (v.position[1].to_bits(), v.position[2].to_bits()))
        .collect()
}

#[test]
fn test_stitched_plane_has_no_cracks() {
    // horizontal plane at world y = 7.5 crossing both cubes
    let pair = make_pair(|_, y, _| if y < 7.5 { -2 } else { 2 });

    let left = drain(&pair, &pair.left, 1, Touch3dSide::EAST);
    let right = drain(&pair, &pair.right, 0, Touch3dSide::NONE);

    // the shared plane is the left cube's +x face and the right cube's -x
    let left_face = face_positions(&left, 8.0);
    let right_face = face_positions(&right, -8.0);

    assert!(!left_face.is_empty(), "stitched face emitted no vertices");
    assert_eq!(
        left_face, right_face,
        "face vertices must coincide in world space"
    );
}

#[test]
fn test_stitched_slope_has_no_cracks() {
    // a sloped surface exercises refinement along two axes
    let pair = make_pair(|x, y, z| {
        let height = 6.0 + 0.25 * x + 0.125 * z;
        if y < height {
            -2
        } else {
            2
        }
    });

    let left = drain(&pair, &pair.left, 1, Touch3dSide::EAST);
    let right = drain(&pair, &pair.right, 0, Touch3dSide::NONE);

    let left_face = face_positions(&left, 8.0);
    let right_face = face_positions(&right, -8.0);

    assert!(!left_face.is_empty());
    assert_eq!(left_face, right_face);
}

#[test]
fn test_transition_cases_cached_per_side() {
    let pair = make_pair(|_, y, _| if y < 7.5 { -2 } else { 2 });
    let shadow = HardwareShadow::new(5);
    pair.builder.enqueue_build(
        &pair.left,
        &shadow,
        1,
        Touch3dSide::EAST,
        SurfaceFlags::NORMALS,
        1 << 20,
    );
    shadow
        .request_consumer_lock(1, Touch3dSide::EAST)
        .unwrap()
        .consume();

    let access = shadow.request_read_only(1);
    let resolution = access.resolution();
    let east = &resolution.stitches[voxel::neighbor::OrthogonalNeighbor::East as usize];
    assert!(east.shadowed);
    // the plane crosses a full row of transition cells on the east face
    assert_eq!(east.transition_cases.len(), 8);
    // the unstitched sides stay unscanned
    let north = &resolution.stitches[voxel::neighbor::OrthogonalNeighbor::North as usize];
    assert!(!north.shadowed);
    assert!(north.transition_cases.is_empty());
}

#[test]
fn test_half_res_vertices_join_the_regular_mesh() {
    let pair = make_pair(|_, y, _| if y < 7.5 { -2 } else { 2 });

    // build the left cube with and without the stitch: the regular face
    // vertices must be a subset of the stitched build's face vertices
    let stitched = drain(&pair, &pair.left, 1, Touch3dSide::EAST);
    let plain = drain(&pair, &pair.left, 1, Touch3dSide::NONE);

    let stitched_face = face_positions(&stitched, 8.0);
    let plain_face = face_positions(&plain, 8.0);
    assert!(!plain_face.is_empty());
    assert!(
        plain_face.is_subset(&stitched_face),
        "stitching must keep the coarse face vertices"
    );
    // and the stitch adds the finer ones
    assert!(stitched_face.len() > plain_face.len());
}
