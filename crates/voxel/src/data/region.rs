//! One cube worth of voxels in space
//!
//! The compressed image is the authoritative state. Accessors lease a
//! decompressed [`VoxelDataBase`] from the pool for their lifetime; a
//! mutable accessor writes its changes back into the compression on drop.

use std::io::{Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::{IVec3, Vec3};

use crate::descriptor::{CubeDescriptor, WorldBox};
use crate::error::VoxelError;
use crate::field::FieldAccessor;
use crate::types::{FieldStrength, FS_MANTISSA};

use super::base::{ColourChannels, GradientChannels, VoxelDataBase};
use super::compressed::CompressedVoxelData;
use super::pool::VoxelDataPool;

/// Aggregate classification of a cube's field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyStatus {
    /// Every sample is solid; no surface crosses this cube.
    Solid,
    /// Every sample is empty.
    Empty,
    /// The cube carries a zero crossing somewhere.
    Mixed,
}

/// A cubical region of voxels with its world placement.
pub struct CubeDataRegion {
    descriptor: Arc<CubeDescriptor>,
    pool: Arc<VoxelDataPool>,
    bounds: WorldBox,
    compression: RwLock<CompressedVoxelData>,
}

impl CubeDataRegion {
    pub fn new(
        descriptor: Arc<CubeDescriptor>,
        pool: Arc<VoxelDataPool>,
        bounds: WorldBox,
    ) -> Self {
        let flags = descriptor.region_flags;
        Self {
            descriptor,
            pool,
            bounds,
            compression: RwLock::new(CompressedVoxelData::new(flags)),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CubeDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn bounds(&self) -> &WorldBox {
        &self.bounds
    }

    #[inline]
    pub fn grid_scale(&self) -> f32 {
        self.descriptor.scale
    }

    /// Exclusive mutable lease. Blocks other mutators and readers; changes
    /// are committed back into the compressed image when the accessor drops.
    pub fn lease(&self) -> DataAccessor<'_> {
        let guard = self.compression.write().expect("region lock poisoned");
        let mut bucket = self.pool.lease();
        guard
            .decompress_into(&mut bucket)
            .expect("authoritative compressed image failed to decompress");
        DataAccessor {
            region: self,
            guard,
            bucket: Some(bucket),
        }
    }

    /// Shared read lease; any number may be outstanding concurrently.
    pub fn lease_shared(&self) -> ReadAccessor<'_> {
        let guard = self.compression.read().expect("region lock poisoned");
        let mut bucket = self.pool.lease();
        guard
            .decompress_into(&mut bucket)
            .expect("authoritative compressed image failed to decompress");
        ReadAccessor {
            region: self,
            _guard: guard,
            bucket: Some(bucket),
        }
    }

    /// Clips a world-space box to this cube's feathered grid range,
    /// returning integer grid bounds in `[-1, dimensions + 1]` per axis, or
    /// `None` when the box is disjoint from the feathered cube.
    pub fn map_region(&self, aabb: &WorldBox) -> Option<(IVec3, IVec3)> {
        let scale = self.descriptor.scale;
        let dim = self.descriptor.dimensions as i32;
        let v0 = self.bounds.minimum - Vec3::splat(scale);
        let vn = self.bounds.maximum + Vec3::splat(scale);

        let mut lo = IVec3::ZERO;
        let mut hi = IVec3::ZERO;
        for axis in 0..3 {
            let a_min = aabb.minimum[axis];
            let a_max = aabb.maximum[axis];
            let b_min = self.bounds.minimum[axis];

            lo[axis] = if a_min <= v0[axis] {
                -1
            } else if a_min > vn[axis] {
                return None;
            } else {
                ((a_min - b_min) / scale).ceil() as i32
            };

            hi[axis] = if a_max < v0[axis] {
                return None;
            } else if a_max >= vn[axis] {
                dim + 1
            } else {
                ((a_max - b_min) / scale).floor() as i32
            };
        }
        Some((lo, hi))
    }

    /// Serializes the bounding box as six IEEE 754 singles, then every
    /// present channel as a length-prefixed RLE stream in canonical order.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), VoxelError> {
        let guard = self.compression.read().expect("region lock poisoned");
        for v in [self.bounds.minimum, self.bounds.maximum] {
            for c in v.to_array() {
                out.write_all(&c.to_le_bytes())?;
            }
        }
        guard.write_to(out)
    }

    /// Restores a cube previously written by [`write_to`](Self::write_to).
    /// The channel set is dictated by the descriptor and must match the
    /// stream producer's.
    pub fn read_from<R: Read>(&mut self, input: &mut R) -> Result<(), VoxelError> {
        let mut floats = [0f32; 6];
        let mut raw = [0u8; 4];
        for f in &mut floats {
            input.read_exact(&mut raw)?;
            *f = f32::from_le_bytes(raw);
        }
        let minimum = Vec3::new(floats[0], floats[1], floats[2]);
        let maximum = Vec3::new(floats[3], floats[4], floats[5]);
        if minimum.cmpgt(maximum).any() {
            return Err(VoxelError::Format("inverted bounding box"));
        }
        self.bounds = WorldBox::new(minimum, maximum);
        self.compression
            .get_mut()
            .expect("region lock poisoned")
            .read_from(input)
    }
}

/// Classifies a field as uniformly solid, uniformly empty, or mixed.
///
/// Differences confined to the implicit mantissa bits do not count as
/// mixing; the classification bit is what matters for triangulation.
pub fn empty_status(values: &[FieldStrength]) -> EmptyStatus {
    let mut acc: FieldStrength = 0;
    for window in values.windows(2) {
        acc |= window[0] ^ window[1];
    }
    if acc & !FS_MANTISSA == 0 {
        if values[0] < 0 {
            EmptyStatus::Solid
        } else {
            EmptyStatus::Empty
        }
    } else {
        EmptyStatus::Mixed
    }
}

/// Exclusive mutable accessor over a region's decompressed voxels.
pub struct DataAccessor<'a> {
    region: &'a CubeDataRegion,
    guard: RwLockWriteGuard<'a, CompressedVoxelData>,
    bucket: Option<Box<VoxelDataBase>>,
}

/// Split view for density edits: the feathered field plus the optional
/// channels the edit may refresh afterwards.
pub struct FieldEdit<'b> {
    pub field: FieldAccessor<'b>,
    gradient: Option<&'b mut GradientChannels>,
}

impl FieldEdit<'_> {
    /// Recomputes the gradient channels from the edited field, when the
    /// scene stores a gradient.
    pub fn update_gradient(&mut self) {
        if let Some(gradient) = self.gradient.as_deref_mut() {
            self.field.update_gradient(gradient);
        }
    }
}

impl DataAccessor<'_> {
    #[inline]
    fn database(&self) -> &VoxelDataBase {
        self.bucket.as_ref().expect("bucket held until drop")
    }

    #[inline]
    fn database_mut(&mut self) -> &mut VoxelDataBase {
        self.bucket.as_mut().expect("bucket held until drop")
    }

    #[inline]
    pub fn values(&self) -> &[FieldStrength] {
        &self.database().values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [FieldStrength] {
        &mut self.database_mut().values
    }

    #[inline]
    pub fn gradient(&self) -> Option<&GradientChannels> {
        self.database().gradient.as_ref()
    }

    #[inline]
    pub fn colours(&self) -> Option<&ColourChannels> {
        self.database().colours.as_ref()
    }

    #[inline]
    pub fn colours_mut(&mut self) -> Option<&mut ColourChannels> {
        self.database_mut().colours.as_mut()
    }

    pub fn empty_status(&self) -> EmptyStatus {
        empty_status(self.values())
    }

    /// Opens a feathered field edit session over the values array.
    pub fn edit(&mut self) -> FieldEdit<'_> {
        let descriptor = Arc::as_ref(&self.region.descriptor);
        let database = self.bucket.as_mut().expect("bucket held until drop");
        let VoxelDataBase {
            values, gradient, ..
        } = &mut **database;
        FieldEdit {
            field: FieldAccessor::new(descriptor, values),
            gradient: gradient.as_mut(),
        }
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        self.database_mut().clear();
    }
}

impl Drop for DataAccessor<'_> {
    fn drop(&mut self) {
        let bucket = self.bucket.take().expect("bucket held until drop");
        self.guard.compress_from(&bucket);
        if let Err(error) = self.region.pool.retire(bucket) {
            tracing::error!(%error, "failed to retire voxel data bucket");
        }
    }
}

/// Shared read accessor over a region's decompressed voxels.
pub struct ReadAccessor<'a> {
    region: &'a CubeDataRegion,
    _guard: RwLockReadGuard<'a, CompressedVoxelData>,
    bucket: Option<Box<VoxelDataBase>>,
}

impl ReadAccessor<'_> {
    #[inline]
    fn database(&self) -> &VoxelDataBase {
        self.bucket.as_ref().expect("bucket held until drop")
    }

    #[inline]
    pub fn values(&self) -> &[FieldStrength] {
        &self.database().values
    }

    #[inline]
    pub fn gradient(&self) -> Option<&GradientChannels> {
        self.database().gradient.as_ref()
    }

    #[inline]
    pub fn colours(&self) -> Option<&ColourChannels> {
        self.database().colours.as_ref()
    }

    #[inline]
    pub fn texcoords(&self) -> Option<&super::base::TexCoordChannels> {
        self.database().texcoords.as_ref()
    }

    pub fn empty_status(&self) -> EmptyStatus {
        empty_status(self.values())
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CubeDescriptor> {
        self.region.descriptor()
    }
}

impl Drop for ReadAccessor<'_> {
    fn drop(&mut self) {
        let bucket = self.bucket.take().expect("bucket held until drop");
        if let Err(error) = self.region.pool.retire(bucket) {
            tracing::error!(%error, "failed to retire voxel data bucket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::VoxelRegionFlags;

    fn region() -> CubeDataRegion {
        let descriptor =
            Arc::new(CubeDescriptor::new(5, 1.0, VoxelRegionFlags::GRADIENT).unwrap());
        let pool = Arc::new(VoxelDataPool::new(
            descriptor.grid_point_count,
            descriptor.region_flags,
            2,
            1,
        ));
        let bounds = descriptor.world_box(Vec3::ZERO);
        CubeDataRegion::new(descriptor, pool, bounds)
    }

    #[test]
    fn test_mutation_persists_across_leases() {
        let region = region();
        {
            let mut accessor = region.lease();
            accessor.values_mut()[7] = -12;
        }
        let reader = region.lease_shared();
        assert_eq!(reader.values()[7], -12);
    }

    #[test]
    fn test_empty_status_classification() {
        let region = region();
        assert_eq!(region.lease_shared().empty_status(), EmptyStatus::Empty);
        {
            let mut accessor = region.lease();
            accessor.values_mut().fill(-8);
        }
        assert_eq!(region.lease_shared().empty_status(), EmptyStatus::Solid);
        {
            let mut accessor = region.lease();
            let last = accessor.values().len() - 1;
            accessor.values_mut()[last] = 8;
        }
        assert_eq!(region.lease_shared().empty_status(), EmptyStatus::Mixed);
    }

    #[test]
    fn test_mantissa_noise_does_not_mix() {
        let mut values = vec![-8 as FieldStrength; 27];
        values[3] = -8 + 1; // differs only in mantissa bits
        assert_eq!(empty_status(&values), EmptyStatus::Solid);
    }

    #[test]
    fn test_map_region_clips_and_rejects() {
        let region = region();
        // Fully covering box clamps to the feathered bounds
        let world = WorldBox::new(Vec3::splat(-100.0), Vec3::splat(100.0));
        let (lo, hi) = region.map_region(&world).unwrap();
        assert_eq!(lo, IVec3::splat(-1));
        assert_eq!(hi, IVec3::splat(5));

        // Disjoint box
        let far = WorldBox::new(Vec3::splat(50.0), Vec3::splat(60.0));
        assert!(region.map_region(&far).is_none());

        // Interior box quantizes inward
        let inner = WorldBox::new(Vec3::new(0.5, 1.0, 1.5), Vec3::new(3.5, 3.0, 2.5));
        let (lo, hi) = region.map_region(&inner).unwrap();
        assert_eq!(lo, IVec3::new(1, 1, 2));
        assert_eq!(hi, IVec3::new(3, 3, 2));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let source = region();
        {
            let mut accessor = source.lease();
            accessor.values_mut()[0] = -4;
            let mut edit = accessor.edit();
            edit.field.set(2, 2, 2, -8);
            edit.update_gradient();
        }
        let mut stream = Vec::new();
        source.write_to(&mut stream).unwrap();
        // Bounding box header plus at least the values channel
        assert!(stream.len() > 24 + 8);

        let mut restored = region();
        restored.read_from(&mut stream.as_slice()).unwrap();
        assert_eq!(restored.bounds(), source.bounds());
        let reader = restored.lease_shared();
        assert_eq!(reader.values()[0], -4);
    }

    #[test]
    fn test_edit_writes_through_feather() {
        let region = region();
        let mut accessor = region.lease();
        let mut edit = accessor.edit();
        edit.field.set(-1, 2, 2, -6);
        edit.update_gradient();
        drop(edit);
        // The slab write feeds the border gradient sample at x=0
        let center = region.descriptor().grid_point_index(0, 2, 2);
        assert_eq!(accessor.gradient().unwrap().dx[center], -3);
    }
}
