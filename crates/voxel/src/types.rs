// Shared primitive types for the voxel grid and isosurface layers

use crate::neighbor::OrthogonalNeighbor;

/// Scalar field sample at one grid point.
///
/// The sign bit classifies the sample: negative is solid, non-negative is
/// empty. The low [`FS_MANTISSA_BITS`] bits are an implicit mantissa; two
/// samples that differ only in mantissa bits classify a cube identically.
pub type FieldStrength = i8;

/// Number of implicit fractional bits in a [`FieldStrength`].
pub const FS_MANTISSA_BITS: u32 = 2;
/// Mask selecting the mantissa bits of a [`FieldStrength`].
pub const FS_MANTISSA: FieldStrength = (1 << FS_MANTISSA_BITS) - 1;

/// Unit magnitude of a fully solid/empty field sample.
pub const FS_UNIT: FieldStrength = 1 << FS_MANTISSA_BITS;

/// Extracts the solid/empty classification bit (1 = solid).
#[inline]
pub fn field_solid_bit(v: FieldStrength) -> u8 {
    ((v as u8) >> 7) & 1
}

/// Linear index of a grid point within a cube region.
pub type VoxelIndex = usize;
/// Linear index of a cell within a cube region.
pub type CellIndex = usize;
/// Index into the GPU vertex buffer.
pub type HwVertexIndex = u16;
/// Index into the logical per-cube iso-vertex table (wider than hardware).
pub type IsoVertexIndex = u32;
/// Sentinel for an unmapped hardware vertex index.
pub const HWVI_UNMAPPED: HwVertexIndex = HwVertexIndex::MAX;
/// Sentinel for an absent iso-vertex index.
pub const IVI_NONE: IsoVertexIndex = IsoVertexIndex::MAX;

/// Cube side length in voxels.
pub type DimensionType = u16;

/// Vertical slab a cube occupies in a terrain column.
pub type YLevel = i16;

/// Whether a coordinate is flush with the minimal edge, the maximal edge, or
/// neither of a bounded range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchStatus {
    None = 0,
    Low = 1,
    High = 2,
}

impl TouchStatus {
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Reconstructs a status from its two-bit encoding.
    ///
    /// Both bits set is impossible for a non-degenerate range; it is mapped
    /// to `High` which only arises for callers composing raw flag words.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => TouchStatus::None,
            1 => TouchStatus::Low,
            _ => TouchStatus::High,
        }
    }
}

/// Two-bit-per-axis touch flags for a 2D coordinate pair.
///
/// Bits 0-1 hold the x-axis [`TouchStatus`], bits 2-3 the y-axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Touch2dSide(pub u8);

impl Touch2dSide {
    pub const NONE: Touch2dSide = Touch2dSide(0);

    #[inline]
    pub fn new(tsx: TouchStatus, tsy: TouchStatus) -> Self {
        Touch2dSide(tsx.bits() | (tsy.bits() << 2))
    }

    #[inline]
    pub fn x(self) -> TouchStatus {
        TouchStatus::from_bits(self.0)
    }

    #[inline]
    pub fn y(self) -> TouchStatus {
        TouchStatus::from_bits(self.0 >> 2)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Two-bit-per-axis touch flags for a 3D coordinate triple, doubling as the
/// set of cube faces a cell or vertex is flush with (the "stitch flags").
///
/// Bit layout: x pair in bits 0-1 (West low, East high), y pair in bits 2-3
/// (Below low, Above high), z pair in bits 4-5 (North low, South high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Touch3dSide(pub u8);

impl Touch3dSide {
    pub const NONE: Touch3dSide = Touch3dSide(0);
    pub const WEST: Touch3dSide = Touch3dSide(0b000001);
    pub const EAST: Touch3dSide = Touch3dSide(0b000010);
    pub const BELOW: Touch3dSide = Touch3dSide(0b000100);
    pub const ABOVE: Touch3dSide = Touch3dSide(0b001000);
    pub const NORTH: Touch3dSide = Touch3dSide(0b010000);
    pub const SOUTH: Touch3dSide = Touch3dSide(0b100000);
    pub const ALL: Touch3dSide = Touch3dSide(0b111111);

    /// Number of distinct flag values.
    pub const COUNT: usize = 64;

    #[inline]
    pub fn new(tsx: TouchStatus, tsy: TouchStatus, tsz: TouchStatus) -> Self {
        Touch3dSide(tsx.bits() | (tsy.bits() << 2) | (tsz.bits() << 4))
    }

    #[inline]
    pub fn from_neighbor(neighbor: OrthogonalNeighbor) -> Self {
        NEIGHBOR_TO_SIDE[neighbor as usize]
    }

    #[inline]
    pub fn union(self, other: Touch3dSide) -> Self {
        Touch3dSide(self.0 | other.0)
    }

    #[inline]
    pub fn intersect(self, other: Touch3dSide) -> Self {
        Touch3dSide(self.0 & other.0)
    }

    #[inline]
    pub fn contains(self, other: Touch3dSide) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Touch3dSide) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Iterates the orthogonal neighbors whose face flag is set.
    pub fn faces(self) -> impl Iterator<Item = OrthogonalNeighbor> {
        OrthogonalNeighbor::ALL
            .into_iter()
            .filter(move |n| self.contains(Touch3dSide::from_neighbor(*n)))
    }
}

const NEIGHBOR_TO_SIDE: [Touch3dSide; 6] = [
    Touch3dSide::NORTH,
    Touch3dSide::EAST,
    Touch3dSide::WEST,
    Touch3dSide::SOUTH,
    Touch3dSide::ABOVE,
    Touch3dSide::BELOW,
];

impl std::fmt::Display for Touch3dSide {
    /// Compact face-name rendering, e.g. `WEB` for West|East|Below.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const LETTERS: [(u8, char); 6] = [
            (0b000001, 'W'),
            (0b000010, 'E'),
            (0b000100, 'B'),
            (0b001000, 'A'),
            (0b010000, 'N'),
            (0b100000, 'S'),
        ];
        if self.0 == 0 {
            return write!(f, "-");
        }
        for (bit, letter) in LETTERS {
            if self.0 & bit != 0 {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

/// Grid point coordinates within a cube region, `0 ..= dimensions` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPointCoords {
    pub i: DimensionType,
    pub j: DimensionType,
    pub k: DimensionType,
}

impl GridPointCoords {
    #[inline]
    pub fn new(i: DimensionType, j: DimensionType, k: DimensionType) -> Self {
        Self { i, j, k }
    }
}

/// Grid cell coordinates within a cube region plus the LOD that defines the
/// cell span, `0 .. dimensions` per axis at LOD 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCellCoords {
    pub i: DimensionType,
    pub j: DimensionType,
    pub k: DimensionType,
    pub lod: u8,
}

impl GridCellCoords {
    #[inline]
    pub fn new(i: DimensionType, j: DimensionType, k: DimensionType, lod: u8) -> Self {
        Self { i, j, k, lod }
    }

    /// Span of the cell in finest-resolution voxels.
    #[inline]
    pub fn span(&self) -> DimensionType {
        1 << self.lod
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_bit() {
        assert_eq!(field_solid_bit(-1), 1);
        assert_eq!(field_solid_bit(-128), 1);
        assert_eq!(field_solid_bit(0), 0);
        assert_eq!(field_solid_bit(127), 0);
    }

    #[test]
    fn test_touch3d_axis_packing() {
        let side = Touch3dSide::new(TouchStatus::Low, TouchStatus::High, TouchStatus::None);
        assert!(side.contains(Touch3dSide::WEST));
        assert!(side.contains(Touch3dSide::ABOVE));
        assert!(!side.contains(Touch3dSide::NORTH));
    }

    #[test]
    fn test_touch3d_faces_roundtrip() {
        for neighbor in OrthogonalNeighbor::ALL {
            let side = Touch3dSide::from_neighbor(neighbor);
            let faces: Vec<_> = side.faces().collect();
            assert_eq!(faces, vec![neighbor]);
        }
    }

    #[test]
    fn test_touch3d_display() {
        assert_eq!(Touch3dSide::NONE.to_string(), "-");
        let side = Touch3dSide::WEST
            .union(Touch3dSide::EAST)
            .union(Touch3dSide::BELOW);
        assert_eq!(side.to_string(), "WEB");
    }
}
