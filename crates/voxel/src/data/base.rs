//! Raw channel storage for one cube region worth of voxels

use crate::descriptor::{CubeDescriptor, VoxelRegionFlags};
use crate::types::FieldStrength;

/// Signed gradient components, one per grid point.
#[derive(Debug)]
pub struct GradientChannels {
    pub dx: Box<[i8]>,
    pub dy: Box<[i8]>,
    pub dz: Box<[i8]>,
}

/// Colour components distributed per channel to maximize RLE compression.
#[derive(Debug)]
pub struct ColourChannels {
    pub r: Box<[u8]>,
    pub g: Box<[u8]>,
    pub b: Box<[u8]>,
    pub a: Box<[u8]>,
}

impl ColourChannels {
    /// Recomposes the RGBA value at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> [u8; 4] {
        [self.r[index], self.g[index], self.b[index], self.a[index]]
    }

    #[inline]
    pub fn set(&mut self, index: usize, rgba: [u8; 4]) {
        self.r[index] = rgba[0];
        self.g[index] = rgba[1];
        self.b[index] = rgba[2];
        self.a[index] = rgba[3];
    }
}

/// Texture coordinate components, quantized to bytes.
#[derive(Debug)]
pub struct TexCoordChannels {
    pub u: Box<[u8]>,
    pub v: Box<[u8]>,
}

/// Structure-of-arrays voxel storage for one cube: field values always,
/// gradient/colour/texcoord channels when the scene descriptor enables them.
#[derive(Debug)]
pub struct VoxelDataBase {
    pub count: usize,
    pub values: Box<[FieldStrength]>,
    pub gradient: Option<GradientChannels>,
    pub colours: Option<ColourChannels>,
    pub texcoords: Option<TexCoordChannels>,
}

impl VoxelDataBase {
    pub fn new(count: usize, flags: VoxelRegionFlags) -> Self {
        let zeroed = || vec![0u8; count].into_boxed_slice();
        Self {
            count,
            values: vec![0 as FieldStrength; count].into_boxed_slice(),
            gradient: flags
                .contains(VoxelRegionFlags::GRADIENT)
                .then(|| GradientChannels {
                    dx: vec![0i8; count].into_boxed_slice(),
                    dy: vec![0i8; count].into_boxed_slice(),
                    dz: vec![0i8; count].into_boxed_slice(),
                }),
            colours: flags
                .contains(VoxelRegionFlags::COLOURS)
                .then(|| ColourChannels {
                    r: zeroed(),
                    g: zeroed(),
                    b: zeroed(),
                    a: zeroed(),
                }),
            texcoords: flags
                .contains(VoxelRegionFlags::TEX_COORDS)
                .then(|| TexCoordChannels {
                    u: zeroed(),
                    v: zeroed(),
                }),
        }
    }

    pub fn for_descriptor(descriptor: &CubeDescriptor) -> Self {
        Self::new(descriptor.grid_point_count, descriptor.region_flags)
    }

    /// Resets every channel to zero.
    pub fn clear(&mut self) {
        self.values.fill(0);
        if let Some(g) = &mut self.gradient {
            g.dx.fill(0);
            g.dy.fill(0);
            g.dz.fill(0);
        }
        if let Some(c) = &mut self.colours {
            c.r.fill(0);
            c.g.fill(0);
            c.b.fill(0);
            c.a.fill(0);
        }
        if let Some(t) = &mut self.texcoords {
            t.u.fill(0);
            t.v.fill(0);
        }
    }
}
