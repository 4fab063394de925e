//! Scene container for cube regions and their renderables
//!
//! Tiles are arena-owned and keyed by integer cube coordinates; neighbor
//! links resolve through the arena instead of stored references, so there
//! are no ownership cycles and teardown is a plain drop. Diagonal neighbors
//! are reached through two orthogonal steps.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec3, Vec3};

use isosurface::builder::IsoSurfaceBuilder;
use isosurface::renderable::MeshRenderable;
use isosurface::shadow::HardwareShadow;
use voxel::data::{CubeDataRegion, VoxelDataPool};
use voxel::descriptor::CubeDescriptor;
use voxel::neighbor::{Moore3dNeighbor, OrthogonalNeighbor};
use voxel::types::Touch3dSide;

use crate::metaball::DensitySource;
use crate::options::TerrainOptions;

/// One loaded cube: voxels, shadow, and surface.
pub struct TerrainTile {
    pub region: Arc<CubeDataRegion>,
    pub shadow: Arc<HardwareShadow>,
    pub renderable: MeshRenderable,
    /// LOD the tile currently renders at.
    pub lod: u8,
}

/// Arena of loaded tiles plus the scene-wide shared services.
pub struct TerrainScene {
    descriptor: Arc<CubeDescriptor>,
    pool: Arc<VoxelDataPool>,
    builder: Arc<IsoSurfaceBuilder>,
    options: TerrainOptions,
    tiles: HashMap<IVec3, TerrainTile>,
}

impl TerrainScene {
    pub fn new(options: TerrainOptions) -> Result<Self, crate::options::OptionsError> {
        options.validate()?;
        let descriptor = Arc::new(
            CubeDescriptor::new(
                options.side_voxel_count,
                options.cell_scale,
                options.voxel_region_flags(),
            )
            .expect("validated options"),
        );
        let pool = Arc::new(VoxelDataPool::new(
            descriptor.grid_point_count,
            descriptor.region_flags,
            4,
            2,
        ));
        let builder = Arc::new(IsoSurfaceBuilder::new(
            Arc::clone(&descriptor),
            options.channel_parameters(),
        ));
        Ok(Self {
            descriptor,
            pool,
            builder,
            options,
            tiles: HashMap::new(),
        })
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CubeDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn builder(&self) -> &Arc<IsoSurfaceBuilder> {
        &self.builder
    }

    #[inline]
    pub fn options(&self) -> &TerrainOptions {
        &self.options
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// World position of a tile's minimum corner.
    pub fn tile_origin(&self, coord: IVec3) -> Vec3 {
        let extent = self.descriptor.dimensions as f32 * self.descriptor.scale;
        coord.as_vec3() * extent
    }

    /// Creates (or returns) the tile at `coord`.
    pub fn ensure_tile(&mut self, coord: IVec3) -> &mut TerrainTile {
        if !self.tiles.contains_key(&coord) {
            let bounds = self.descriptor.world_box(self.tile_origin(coord));
            let region = Arc::new(CubeDataRegion::new(
                Arc::clone(&self.descriptor),
                Arc::clone(&self.pool),
                bounds,
            ));
            let shadow = Arc::new(HardwareShadow::new(self.options.max_lod));
            let renderable = MeshRenderable::new(Arc::clone(&region), Arc::clone(&shadow));
            tracing::debug!(?coord, "tile created");
            self.tiles.insert(
                coord,
                TerrainTile {
                    region,
                    shadow,
                    renderable,
                    lod: 0,
                },
            );
        }
        self.tiles.get_mut(&coord).expect("inserted above")
    }

    pub fn tile(&self, coord: IVec3) -> Option<&TerrainTile> {
        self.tiles.get(&coord)
    }

    pub fn tile_mut(&mut self, coord: IVec3) -> Option<&mut TerrainTile> {
        self.tiles.get_mut(&coord)
    }

    pub fn remove_tile(&mut self, coord: IVec3) -> bool {
        self.tiles.remove(&coord).is_some()
    }

    pub fn coords(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.tiles.keys().copied()
    }

    /// Face neighbor of a tile.
    pub fn neighbor(&self, coord: IVec3, side: OrthogonalNeighbor) -> Option<&TerrainTile> {
        let (dx, dy, dz) = side.offset();
        self.tiles.get(&(coord + IVec3::new(dx, dy, dz)))
    }

    /// Any of the 26 neighbors; edge neighbors resolve through their two
    /// orthogonal steps, corner neighbors are unsupported here just like the
    /// alternate-path table they would need.
    pub fn moore_neighbor(&self, coord: IVec3, neighbor: Moore3dNeighbor) -> Option<&TerrainTile> {
        if neighbor.is_face() {
            let side = OrthogonalNeighbor::from_index(neighbor as usize).expect("face ordinal");
            return self.neighbor(coord, side);
        }
        let [a, b] = neighbor.ortho_path()?;
        let (ax, ay, az) = a.offset();
        let (bx, by, bz) = b.offset();
        self.tiles
            .get(&(coord + IVec3::new(ax + bx, ay + by, az + bz)))
    }

    /// Which faces of the tile need transition cells: those whose loaded
    /// neighbor renders at a finer LOD.
    pub fn stitch_flags_for(&self, coord: IVec3) -> Touch3dSide {
        let Some(tile) = self.tiles.get(&coord) else {
            return Touch3dSide::NONE;
        };
        let mut flags = Touch3dSide::NONE;
        for side in OrthogonalNeighbor::ALL {
            if let Some(neighbor) = self.neighbor(coord, side) {
                if neighbor.lod < tile.lod {
                    flags = flags.union(Touch3dSide::from_neighbor(side));
                }
            }
        }
        flags
    }

    /// Applies a density source to every tile whose bounds it overlaps.
    pub fn apply_density_source<S: DensitySource>(&self, source: &S) -> usize {
        let bounds = source.world_bounds();
        let mut touched = 0;
        for tile in self.tiles.values() {
            if tile.region.bounds().intersects(&bounds) {
                source.apply(&tile.region);
                touched += 1;
            }
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metaball::MetaBall;

    fn scene() -> TerrainScene {
        TerrainScene::new(TerrainOptions::default()).unwrap()
    }

    #[test]
    fn test_tiles_and_neighbors() {
        let mut scene = scene();
        scene.ensure_tile(IVec3::ZERO);
        scene.ensure_tile(IVec3::new(1, 0, 0));
        scene.ensure_tile(IVec3::new(1, 0, 1));
        assert_eq!(scene.len(), 3);

        assert!(scene.neighbor(IVec3::ZERO, OrthogonalNeighbor::East).is_some());
        assert!(scene.neighbor(IVec3::ZERO, OrthogonalNeighbor::West).is_none());
        // edge neighbor through two orthogonal steps
        assert!(scene
            .moore_neighbor(IVec3::ZERO, Moore3dNeighbor::SouthEast)
            .is_some());
        assert!(scene
            .moore_neighbor(IVec3::ZERO, Moore3dNeighbor::AboveNorthEast)
            .is_none());
    }

    #[test]
    fn test_stitch_flags_follow_neighbor_lods() {
        let mut scene = scene();
        scene.ensure_tile(IVec3::ZERO).lod = 1;
        scene.ensure_tile(IVec3::new(1, 0, 0)).lod = 0;
        scene.ensure_tile(IVec3::new(-1, 0, 0)).lod = 1;

        let flags = scene.stitch_flags_for(IVec3::ZERO);
        assert_eq!(flags, Touch3dSide::EAST);
        // the finer tile itself needs no stitching toward the coarse one
        assert_eq!(
            scene.stitch_flags_for(IVec3::new(1, 0, 0)),
            Touch3dSide::NONE
        );
    }

    #[test]
    fn test_density_source_reaches_overlapping_tiles() {
        let mut scene = scene();
        scene.ensure_tile(IVec3::ZERO);
        scene.ensure_tile(IVec3::new(1, 0, 0));
        scene.ensure_tile(IVec3::new(5, 5, 5));

        // a ball on the shared face of the first two tiles
        let extent = scene.descriptor().dimensions as f32;
        let ball = MetaBall::new(Vec3::new(extent, extent / 2.0, extent / 2.0), 3.0, false);
        assert_eq!(scene.apply_density_source(&ball), 2);
    }

    #[test]
    fn test_tile_origin_spacing() {
        let scene = scene();
        let origin = scene.tile_origin(IVec3::new(2, 0, -1));
        assert_eq!(origin, Vec3::new(32.0, 0.0, -16.0));
    }
}
