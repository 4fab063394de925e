//! Metaball density source
//!
//! A metaball contributes field strength inside its sphere of influence,
//! written through the feathered field accessor so a ball straddling a cube
//! boundary also reaches the border slabs.

use glam::Vec3;

use voxel::data::CubeDataRegion;
use voxel::descriptor::WorldBox;
use voxel::types::FieldStrength;

/// Anything that can contribute density to a cube region.
pub trait DensitySource {
    /// World box of the source's influence.
    fn world_bounds(&self) -> WorldBox;

    /// Signed field contribution at a world position. Negative values add
    /// solid matter, positive values carve it away.
    fn contribution(&self, world: Vec3) -> f32;

    /// Writes the source into a cube region, feathered overreach included,
    /// then refreshes the gradient channel.
    fn apply(&self, region: &CubeDataRegion) {
        let Some((lo, hi)) = region.map_region(&self.world_bounds()) else {
            return;
        };
        let scale = region.grid_scale();
        let minimum = region.bounds().minimum;

        let mut accessor = region.lease();
        let mut edit = accessor.edit();
        for (x, y, z) in edit.field.iterate(
            (lo.x, lo.y, lo.z),
            (hi.x, hi.y, hi.z),
        ) {
            let world = minimum + Vec3::new(x as f32, y as f32, z as f32) * scale;
            let contribution = self.contribution(world);
            if contribution == 0.0 {
                continue;
            }
            let value = edit.field.get(x, y, z);
            let sum = (value as i32 + contribution as i32)
                .clamp(FieldStrength::MIN as i32, FieldStrength::MAX as i32);
            edit.field.set(x, y, z, sum as FieldStrength);
        }
        edit.update_gradient();
    }
}

/// A spherical density source with a quadratic falloff.
#[derive(Debug, Clone)]
pub struct MetaBall {
    position: Vec3,
    radius: f32,
    /// Carves open space when set; fills in solid matter otherwise.
    excavating: bool,
}

impl MetaBall {
    pub fn new(position: Vec3, radius: f32, excavating: bool) -> Self {
        debug_assert!(radius > 0.0, "metaball radius must be positive");
        Self {
            position,
            radius,
            excavating,
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn excavating(&self) -> bool {
        self.excavating
    }

    /// Switches between carving and filling; the sign used by the field
    /// contribution follows.
    pub fn set_excavating(&mut self, excavating: bool) {
        self.excavating = excavating;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }
}

impl DensitySource for MetaBall {
    fn world_bounds(&self) -> WorldBox {
        WorldBox::new(
            self.position - Vec3::splat(self.radius),
            self.position + Vec3::splat(self.radius),
        )
    }

    fn contribution(&self, world: Vec3) -> f32 {
        let distance_sq = (world - self.position).length_squared();
        let radius_sq = self.radius * self.radius;
        if distance_sq >= radius_sq {
            return 0.0;
        }
        let falloff = 1.0 - distance_sq / radius_sq;
        let amplitude = falloff * FieldStrength::MAX as f32;
        if self.excavating {
            amplitude
        } else {
            -amplitude
        }
    }
}
