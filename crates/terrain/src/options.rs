//! Per-scene terrain configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use isosurface::builder::{ChannelParameters, NormalsType, SurfaceFlags};
use voxel::descriptor::VoxelRegionFlags;
use voxel::types::DimensionType;

#[derive(Error, Debug, PartialEq)]
pub enum OptionsError {
    #[error("side voxel count {0} must be a power of two plus one, at most 33")]
    BadSideVoxelCount(DimensionType),
    #[error("cell scale must be positive, got {0}")]
    BadCellScale(f32),
    #[error("max lod {given} exceeds what a {side}-voxel cube supports")]
    BadMaxLod { given: u8, side: DimensionType },
    #[error("transition cell width ratio {0} must lie in [0, 1]")]
    BadTransitionRatio(f32),
}

/// Normal generation selection, mirrored into the builder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalsMode {
    None,
    #[default]
    Gradient,
    Average,
    WeightedAverage,
}

impl From<NormalsMode> for NormalsType {
    fn from(mode: NormalsMode) -> Self {
        match mode {
            NormalsMode::None => NormalsType::None,
            NormalsMode::Gradient => NormalsType::Gradient,
            NormalsMode::Average => NormalsType::Average,
            NormalsMode::WeightedAverage => NormalsType::WeightedAverage,
        }
    }
}

/// Main configuration for a terrain scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainOptions {
    /// Cube side in voxel points; power of two plus one.
    pub side_voxel_count: DimensionType,
    /// World units per cell.
    pub cell_scale: f32,
    /// Number of detail levels per renderable.
    pub max_lod: u8,
    /// LOD switch threshold in pixels.
    pub max_pixel_error: f32,
    pub normals_mode: NormalsMode,
    pub flip_normals: bool,
    /// Transition cell depth as a fraction of a full cell, in `[0, 1]`.
    pub transition_cell_width_ratio: f32,
    /// Whether cube regions store gradient vectors.
    pub gradient_channel: bool,
    /// Whether cube regions store vertex colours.
    pub colour_channel: bool,
    /// Whether cube regions store texture coordinates.
    pub texcoord_channel: bool,
}

impl Default for TerrainOptions {
    fn default() -> Self {
        Self {
            side_voxel_count: 17,
            cell_scale: 1.0,
            max_lod: 5,
            max_pixel_error: 8.0,
            normals_mode: NormalsMode::Gradient,
            flip_normals: false,
            transition_cell_width_ratio: 0.5,
            gradient_channel: true,
            colour_channel: false,
            texcoord_channel: false,
        }
    }
}

impl TerrainOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        let dims = self.side_voxel_count.wrapping_sub(1);
        if self.side_voxel_count < 2 || !dims.is_power_of_two() || dims > 32 {
            return Err(OptionsError::BadSideVoxelCount(self.side_voxel_count));
        }
        if self.cell_scale <= 0.0 {
            return Err(OptionsError::BadCellScale(self.cell_scale));
        }
        // the coarsest LOD still needs at least one cell per side
        if self.max_lod == 0 || (1u32 << (self.max_lod - 1)) > dims as u32 {
            return Err(OptionsError::BadMaxLod {
                given: self.max_lod,
                side: self.side_voxel_count,
            });
        }
        if !(0.0..=1.0).contains(&self.transition_cell_width_ratio) {
            return Err(OptionsError::BadTransitionRatio(
                self.transition_cell_width_ratio,
            ));
        }
        Ok(())
    }

    /// Channel feature bits carried by every cube region of the scene.
    pub fn voxel_region_flags(&self) -> VoxelRegionFlags {
        let mut flags = VoxelRegionFlags::NONE;
        if self.gradient_channel {
            flags = flags.union(VoxelRegionFlags::GRADIENT);
        }
        if self.colour_channel {
            flags = flags.union(VoxelRegionFlags::COLOURS);
        }
        if self.texcoord_channel {
            flags = flags.union(VoxelRegionFlags::TEX_COORDS);
        }
        flags
    }

    /// Vertex attribute toggles implied by the configured channels.
    pub fn surface_flags(&self) -> SurfaceFlags {
        let mut flags = SurfaceFlags::NONE;
        if self.normals_mode != NormalsMode::None {
            flags = flags.union(SurfaceFlags::NORMALS);
        }
        if self.colour_channel {
            flags = flags.union(SurfaceFlags::VERTEX_COLOURS);
        }
        if self.texcoord_channel {
            flags = flags.union(SurfaceFlags::TEX_COORDS);
        }
        flags
    }

    pub fn channel_parameters(&self) -> ChannelParameters {
        ChannelParameters {
            lod_count: self.max_lod,
            max_pixel_error: self.max_pixel_error,
            normals_type: self.normals_mode.into(),
            flip_normals: self.flip_normals,
            transition_cell_width_ratio: self.transition_cell_width_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        assert_eq!(TerrainOptions::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut options = TerrainOptions {
            side_voxel_count: 18,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(OptionsError::BadSideVoxelCount(18))
        ));

        options.side_voxel_count = 17;
        options.max_lod = 7;
        assert!(matches!(options.validate(), Err(OptionsError::BadMaxLod { .. })));

        options.max_lod = 4;
        options.transition_cell_width_ratio = 1.5;
        assert!(matches!(
            options.validate(),
            Err(OptionsError::BadTransitionRatio(_))
        ));
    }

    #[test]
    fn test_flags_derivation() {
        let options = TerrainOptions {
            colour_channel: true,
            ..Default::default()
        };
        let region = options.voxel_region_flags();
        assert!(region.contains(VoxelRegionFlags::GRADIENT));
        assert!(region.contains(VoxelRegionFlags::COLOURS));
        assert!(!region.contains(VoxelRegionFlags::TEX_COORDS));

        let surface = options.surface_flags();
        assert!(surface.contains(SurfaceFlags::NORMALS));
        assert!(surface.contains(SurfaceFlags::VERTEX_COLOURS));
    }

    #[test]
    fn test_serde_roundtrip() {
        let options = TerrainOptions {
            max_lod: 3,
            normals_mode: NormalsMode::WeightedAverage,
            ..Default::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: TerrainOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_lod, 3);
        assert_eq!(back.normals_mode, NormalsMode::WeightedAverage);
    }
}
