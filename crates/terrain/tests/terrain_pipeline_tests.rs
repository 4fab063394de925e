//! Scene-level pipeline: density edit, background build, main-thread drain

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{IVec3, Vec3};

use isosurface::error::ConsumerUnavailable;
use terrain::dispatch::BuildDispatcher;
use terrain::metaball::{DensitySource, MetaBall};
use terrain::options::TerrainOptions;
use terrain::scene::TerrainScene;
use voxel::types::Touch3dSide;

fn test_options() -> TerrainOptions {
    TerrainOptions {
        transition_cell_width_ratio: 0.0,
        ..Default::default()
    }
}

#[test]
fn test_metaball_edit_then_rebuild() {
    let mut scene = TerrainScene::new(test_options()).unwrap();
    scene.ensure_tile(IVec3::ZERO);

    // a solid ball in the middle of the (empty) tile
    let center = Vec3::splat(8.0);
    let radius = 5.0;
    let ball = MetaBall::new(center, radius, false);
    assert_eq!(scene.apply_density_source(&ball), 1);

    let tile = scene.tile(IVec3::ZERO).unwrap();
    let builder = Arc::clone(scene.builder());
    builder.enqueue_build(
        &tile.region,
        &tile.shadow,
        0,
        Touch3dSide::NONE,
        scene.options().surface_flags(),
        1 << 20,
    );

    let consumer = tile
        .shadow
        .request_consumer_lock(0, Touch3dSide::NONE)
        .unwrap();
    let vertices = consumer.vertex_queue().to_vec();
    let triangles = consumer.index_queue().len() / 3;
    consumer.consume();

    assert!(triangles > 0, "the ball must produce a surface");
    // every vertex sits in a thin shell around the ball radius; positions
    // are cube-centered and the ball sits at the cube center
    for vertex in &vertices {
        let p = Vec3::from_array(vertex.position);
        let distance = p.length();
        assert!(
            (4.0..=6.2).contains(&distance),
            "vertex at distance {distance} from the ball center"
        );
    }
}

#[test]
fn test_excavating_ball_carves_solid_ground() {
    let mut scene = TerrainScene::new(test_options()).unwrap();
    scene.ensure_tile(IVec3::ZERO);

    // solid floor, then a cave carved into it
    {
        let tile = scene.tile(IVec3::ZERO).unwrap();
        let mut accessor = tile.region.lease();
        accessor.values_mut().fill(-32);
        accessor.edit().update_gradient();
    }
    let mut ball = MetaBall::new(Vec3::splat(8.0), 4.0, false);
    ball.set_excavating(true);
    assert!(ball.excavating());
    scene.apply_density_source(&ball);

    let tile = scene.tile(IVec3::ZERO).unwrap();
    let reader = tile.region.lease_shared();
    let meta = tile.region.descriptor();
    // the cave interior went empty, the far corner stayed solid
    assert!(reader.values()[meta.grid_point_index(8, 8, 8)] > 0);
    assert!(reader.values()[meta.grid_point_index(0, 0, 0)] < 0);
}

#[test]
fn test_background_build_drains_on_main_thread() {
    let mut scene = TerrainScene::new(test_options()).unwrap();
    scene.ensure_tile(IVec3::ZERO);
    let ball = MetaBall::new(Vec3::splat(8.0), 5.0, false);
    scene.apply_density_source(&ball);

    let tile = scene.tile(IVec3::ZERO).unwrap();
    let region = Arc::clone(&tile.region);
    let shadow = Arc::clone(&tile.shadow);
    let builder = Arc::clone(scene.builder());
    let surface_flags = scene.options().surface_flags();

    let dispatcher = BuildDispatcher::new(2);
    dispatcher.enqueue(move || {
        builder.enqueue_build(&region, &shadow, 0, Touch3dSide::NONE, surface_flags, 1 << 20);
    });

    // main thread polls without blocking, skipping frames until the
    // producer has finished
    let shadow = Arc::clone(&scene.tile(IVec3::ZERO).unwrap().shadow);
    let deadline = Instant::now() + Duration::from_secs(10);
    let drained = loop {
        match shadow.request_consumer_lock(0, Touch3dSide::NONE) {
            Ok(consumer) => {
                let count = consumer.vertex_queue().len();
                consumer.consume();
                break count;
            }
            Err(ConsumerUnavailable::Contended | ConsumerUnavailable::NothingPending) => {
                assert!(Instant::now() < deadline, "builder never delivered");
                std::thread::yield_now();
            }
            Err(other) => panic!("unexpected consumer failure: {other}"),
        }
    };
    assert!(drained > 0);
}

#[test]
fn test_ball_straddling_two_tiles_feathers_both() {
    let mut scene = TerrainScene::new(test_options()).unwrap();
    scene.ensure_tile(IVec3::ZERO);
    scene.ensure_tile(IVec3::new(1, 0, 0));

    let extent = scene.descriptor().dimensions as f32;
    let ball = MetaBall::new(Vec3::new(extent, 8.0, 8.0), 3.0, false);
    assert_eq!(scene.apply_density_source(&ball), 2);

    // both tiles carry solid samples near the shared face
    for coord in [IVec3::ZERO, IVec3::new(1, 0, 0)] {
        let tile = scene.tile(coord).unwrap();
        let reader = tile.region.lease_shared();
        let meta = tile.region.descriptor();
        let face_x = if coord == IVec3::ZERO { 16 } else { 0 };
        let sample = reader.values()[meta.grid_point_index(face_x, 8, 8)];
        assert!(sample < 0, "tile {coord:?} missing the ball on its face");
    }
}
