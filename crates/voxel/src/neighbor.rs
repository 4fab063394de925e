// Neighborhood enumerations and lookup tables for cube adjacency

/// The four lateral neighbors of a square tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VonNeumannNeighbor {
    North = 0,
    East = 1,
    West = 2,
    South = 3,
}

impl VonNeumannNeighbor {
    pub const COUNT: usize = 4;

    /// Mirror neighbor; North/South and East/West swap.
    #[inline]
    pub fn opposite(self) -> Self {
        // N=0 <-> S=3 and E=1 <-> W=2 are both an XOR with 3
        match (self as u8) ^ 3 {
            0 => VonNeumannNeighbor::North,
            1 => VonNeumannNeighbor::East,
            2 => VonNeumannNeighbor::West,
            _ => VonNeumannNeighbor::South,
        }
    }
}

/// The six face neighbors of a cube, superset of the Von Neumann set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrthogonalNeighbor {
    North = 0,
    East = 1,
    West = 2,
    South = 3,
    Above = 4,
    Below = 5,
}

impl OrthogonalNeighbor {
    pub const COUNT: usize = 6;
    pub const ALL: [OrthogonalNeighbor; 6] = [
        OrthogonalNeighbor::North,
        OrthogonalNeighbor::East,
        OrthogonalNeighbor::West,
        OrthogonalNeighbor::South,
        OrthogonalNeighbor::Above,
        OrthogonalNeighbor::Below,
    ];

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Mirror neighbor across the cube center.
    #[inline]
    pub fn opposite(self) -> Self {
        // Lateral pairs XOR with 3, vertical pair XOR with 1
        let n = self as u8;
        let flipped = n ^ (3 ^ ((n & 4) >> 1));
        Self::ALL[flipped as usize]
    }

    /// Unit step this neighbor takes on each axis (x, y, z).
    #[inline]
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            OrthogonalNeighbor::North => (0, 0, -1),
            OrthogonalNeighbor::East => (1, 0, 0),
            OrthogonalNeighbor::West => (-1, 0, 0),
            OrthogonalNeighbor::South => (0, 0, 1),
            OrthogonalNeighbor::Above => (0, 1, 0),
            OrthogonalNeighbor::Below => (0, -1, 0),
        }
    }

    /// Abbreviated name used in trace output.
    pub fn abbrev(self) -> &'static str {
        NAMES_ABBREV[self as usize]
    }

    /// Full name.
    pub fn name(self) -> &'static str {
        NAMES_FULL[self as usize]
    }
}

/// All 26 neighbors of a cube: 6 faces, 12 edges, 8 corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Moore3dNeighbor {
    North = 0,
    East = 1,
    West = 2,
    South = 3,
    Above = 4,
    Below = 5,

    AboveNorth = 6,
    AboveSouth = 7,
    AboveEast = 8,
    AboveWest = 9,
    NorthEast = 10,
    NorthWest = 11,
    SouthEast = 12,
    SouthWest = 13,
    BelowEast = 14,
    BelowWest = 15,
    BelowNorth = 16,
    BelowSouth = 17,

    AboveNorthWest = 18,
    AboveNorthEast = 19,
    AboveSouthWest = 20,
    AboveSouthEast = 21,
    BelowNorthWest = 22,
    BelowNorthEast = 23,
    BelowSouthWest = 24,
    BelowSouthEast = 25,
}

impl Moore3dNeighbor {
    pub const COUNT: usize = 26;
    pub const EDGES_BEGIN: usize = 6;
    pub const CORNERS_BEGIN: usize = 18;
    pub const ALL: [Moore3dNeighbor; 26] = [
        Moore3dNeighbor::North,
        Moore3dNeighbor::East,
        Moore3dNeighbor::West,
        Moore3dNeighbor::South,
        Moore3dNeighbor::Above,
        Moore3dNeighbor::Below,
        Moore3dNeighbor::AboveNorth,
        Moore3dNeighbor::AboveSouth,
        Moore3dNeighbor::AboveEast,
        Moore3dNeighbor::AboveWest,
        Moore3dNeighbor::NorthEast,
        Moore3dNeighbor::NorthWest,
        Moore3dNeighbor::SouthEast,
        Moore3dNeighbor::SouthWest,
        Moore3dNeighbor::BelowEast,
        Moore3dNeighbor::BelowWest,
        Moore3dNeighbor::BelowNorth,
        Moore3dNeighbor::BelowSouth,
        Moore3dNeighbor::AboveNorthWest,
        Moore3dNeighbor::AboveNorthEast,
        Moore3dNeighbor::AboveSouthWest,
        Moore3dNeighbor::AboveSouthEast,
        Moore3dNeighbor::BelowNorthWest,
        Moore3dNeighbor::BelowNorthEast,
        Moore3dNeighbor::BelowSouthWest,
        Moore3dNeighbor::BelowSouthEast,
    ];

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn is_face(self) -> bool {
        (self as usize) < Self::EDGES_BEGIN
    }

    #[inline]
    pub fn is_edge(self) -> bool {
        (Self::EDGES_BEGIN..Self::CORNERS_BEGIN).contains(&(self as usize))
    }

    #[inline]
    pub fn is_corner(self) -> bool {
        (self as usize) >= Self::CORNERS_BEGIN
    }

    /// Mirror neighbor across the cube center, for any of the 26.
    pub fn opposite(self) -> Self {
        // Each band (faces, vertical-pair, edges, corners) mirrors by
        // reflecting the ordinal within the band
        let (hi, lo) = OPPOSITE_FLIPPERS[self as usize];
        Moore3dNeighbor::from_index(hi - self as usize + lo).expect("flipper in range")
    }

    /// Decomposes an edge neighbor into its two orthogonal steps.
    ///
    /// Returns `None` for faces (one step suffices) and corners (three
    /// steps would be required).
    pub fn ortho_path(self) -> Option<[OrthogonalNeighbor; 2]> {
        ALT_NEIGHBOR_PATH[self as usize]
    }

    pub fn abbrev(self) -> &'static str {
        NAMES_ABBREV[self as usize]
    }

    pub fn name(self) -> &'static str {
        NAMES_FULL[self as usize]
    }
}

impl From<OrthogonalNeighbor> for Moore3dNeighbor {
    #[inline]
    fn from(n: OrthogonalNeighbor) -> Self {
        Moore3dNeighbor::from_index(n as usize).expect("orthogonal subset")
    }
}

/// `(band_end, band_begin)` pairs: the mirror of ordinal `n` within its band
/// is `band_end - n + band_begin`.
const OPPOSITE_FLIPPERS: [(usize, usize); Moore3dNeighbor::COUNT] = {
    let mut t = [(0usize, 0usize); Moore3dNeighbor::COUNT];
    let mut i = 0;
    while i < Moore3dNeighbor::COUNT {
        t[i] = if i < 4 {
            (3, 0)
        } else if i < 6 {
            (5, 4)
        } else if i < Moore3dNeighbor::CORNERS_BEGIN {
            (17, 6)
        } else {
            (25, 18)
        };
        i += 1;
    }
    t
};

const ALT_NEIGHBOR_PATH: [Option<[OrthogonalNeighbor; 2]>; Moore3dNeighbor::COUNT] = {
    use OrthogonalNeighbor::*;
    [
        None,
        None,
        None,
        None,
        None,
        None,
        Some([Above, North]),
        Some([Above, South]),
        Some([Above, East]),
        Some([Above, West]),
        Some([North, East]),
        Some([North, West]),
        Some([South, East]),
        Some([South, West]),
        Some([Below, East]),
        Some([Below, West]),
        Some([Below, North]),
        Some([Below, South]),
        None,
        None,
        None,
        None,
        None,
        None,
        None,
        None,
    ]
};

const NAMES_ABBREV: [&str; Moore3dNeighbor::COUNT] = [
    "N", "E", "W", "S", "A", "B", "AN", "AS", "AE", "AW", "NE", "NW", "SE", "SW", "BE", "BW",
    "BN", "BS", "ANW", "ANE", "ASW", "ASE", "BNW", "BNE", "BSW", "BSE",
];

const NAMES_FULL: [&str; Moore3dNeighbor::COUNT] = [
    "NORTH",
    "EAST",
    "WEST",
    "SOUTH",
    "ABOVE",
    "BELOW",
    "ABOVENORTH",
    "ABOVESOUTH",
    "ABOVEEAST",
    "ABOVEWEST",
    "NORTHEAST",
    "NORTHWEST",
    "SOUTHEAST",
    "SOUTHWEST",
    "BELOWEAST",
    "BELOWWEST",
    "BELOWNORTH",
    "BELOWSOUTH",
    "ABOVENORTHWEST",
    "ABOVENORTHEAST",
    "ABOVESOUTHWEST",
    "ABOVESOUTHEAST",
    "BELOWNORTHWEST",
    "BELOWNORTHEAST",
    "BELOWSOUTHWEST",
    "BELOWSOUTHEAST",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthogonal_opposite() {
        assert_eq!(OrthogonalNeighbor::North.opposite(), OrthogonalNeighbor::South);
        assert_eq!(OrthogonalNeighbor::South.opposite(), OrthogonalNeighbor::North);
        assert_eq!(OrthogonalNeighbor::East.opposite(), OrthogonalNeighbor::West);
        assert_eq!(OrthogonalNeighbor::West.opposite(), OrthogonalNeighbor::East);
        assert_eq!(OrthogonalNeighbor::Above.opposite(), OrthogonalNeighbor::Below);
        assert_eq!(OrthogonalNeighbor::Below.opposite(), OrthogonalNeighbor::Above);
    }

    #[test]
    fn test_moore_opposite_involution() {
        for i in 0..Moore3dNeighbor::COUNT {
            let n = Moore3dNeighbor::from_index(i).unwrap();
            assert_eq!(n.opposite().opposite(), n, "double flip must return {:?}", n);
        }
    }

    #[test]
    fn test_moore_opposite_edges() {
        assert_eq!(
            Moore3dNeighbor::AboveNorth.opposite(),
            Moore3dNeighbor::BelowSouth
        );
        assert_eq!(
            Moore3dNeighbor::NorthEast.opposite(),
            Moore3dNeighbor::SouthWest
        );
        assert_eq!(
            Moore3dNeighbor::AboveNorthWest.opposite(),
            Moore3dNeighbor::BelowSouthEast
        );
    }

    #[test]
    fn test_ortho_path_reaches_edges_only() {
        for i in 0..Moore3dNeighbor::COUNT {
            let n = Moore3dNeighbor::from_index(i).unwrap();
            assert_eq!(n.ortho_path().is_some(), n.is_edge());
        }
    }

    #[test]
    fn test_ortho_path_offsets_compose() {
        for i in Moore3dNeighbor::EDGES_BEGIN..Moore3dNeighbor::CORNERS_BEGIN {
            let n = Moore3dNeighbor::from_index(i).unwrap();
            let [a, b] = n.ortho_path().unwrap();
            let (ax, ay, az) = a.offset();
            let (bx, by, bz) = b.offset();
            // An edge neighbor displaces along exactly two axes
            assert_eq!(
                (ax + bx).abs() + (ay + by).abs() + (az + bz).abs(),
                2,
                "path for {:?} must step two axes",
                n
            );
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(OrthogonalNeighbor::Above.abbrev(), "A");
        assert_eq!(Moore3dNeighbor::BelowSouthEast.name(), "BELOWSOUTHEAST");
    }
}
