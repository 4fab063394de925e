//! Feathered read/write view over a cube's field values
//!
//! The main array covers grid points `[0, d]^3`. Six face slabs, each one
//! grid point deep, extend the logical range to `[-1, d+1]` so a density
//! source straddling the cube boundary can write its overreach without
//! touching the neighbor cube. Slab edits are propagated to neighbors by the
//! scene layer in a later synchronization step, not here.

use crate::data::base::GradientChannels;
use crate::descriptor::CubeDescriptor;
use crate::neighbor::OrthogonalNeighbor;
use crate::types::{FieldStrength, VoxelIndex};

/// Signed field coordinates, each axis in `[-1, dimensions + 1]`.
pub type FieldCoords = (i32, i32, i32);

/// Where a field coordinate lands in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Interior(usize),
    Slab(usize, usize),
    /// Diagonal overreach (two or more coordinates outside the cube); reads
    /// return zero, writes are discarded.
    Dummy,
}

/// Mutable field view plus the six feathered face slabs.
pub struct FieldAccessor<'a> {
    descriptor: &'a CubeDescriptor,
    values: &'a mut [FieldStrength],
    slabs: [Box<[FieldStrength]>; OrthogonalNeighbor::COUNT],
    dummy: FieldStrength,
}

impl<'a> FieldAccessor<'a> {
    pub fn new(descriptor: &'a CubeDescriptor, values: &'a mut [FieldStrength]) -> Self {
        debug_assert_eq!(values.len(), descriptor.grid_point_count);
        let side = descriptor.side_point_count;
        Self {
            descriptor,
            values,
            slabs: std::array::from_fn(|_| vec![0; side].into_boxed_slice()),
            dummy: 0,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &CubeDescriptor {
        self.descriptor
    }

    /// Interior values, without the feathered slabs.
    #[inline]
    pub fn values(&self) -> &[FieldStrength] {
        self.values
    }

    /// Slab contents for one face, `(u, v)`-indexed.
    #[inline]
    pub fn slab(&self, side: OrthogonalNeighbor) -> &[FieldStrength] {
        &self.slabs[side as usize]
    }

    fn slot(&self, x: i32, y: i32, z: i32) -> Slot {
        let d = self.descriptor.dimensions as i32;
        let side = self.descriptor.point_tx.my as i32;
        debug_assert!(
            (-1..=d + 1).contains(&x) && (-1..=d + 1).contains(&y) && (-1..=d + 1).contains(&z),
            "field coordinates out of feathered range"
        );

        let out_x = x < 0 || x > d;
        let out_y = y < 0 || y > d;
        let out_z = z < 0 || z > d;
        match (out_x, out_y, out_z) {
            (false, false, false) => Slot::Interior(
                (z * side * side + y * side + x) as usize,
            ),
            (true, false, false) => {
                let n = if x < 0 {
                    OrthogonalNeighbor::West
                } else {
                    OrthogonalNeighbor::East
                };
                Slot::Slab(n as usize, (y + z * side) as usize)
            }
            (false, true, false) => {
                let n = if y < 0 {
                    OrthogonalNeighbor::Below
                } else {
                    OrthogonalNeighbor::Above
                };
                Slot::Slab(n as usize, (x + z * side) as usize)
            }
            (false, false, true) => {
                let n = if z < 0 {
                    OrthogonalNeighbor::North
                } else {
                    OrthogonalNeighbor::South
                };
                Slot::Slab(n as usize, (x + y * side) as usize)
            }
            _ => Slot::Dummy,
        }
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> FieldStrength {
        match self.slot(x, y, z) {
            Slot::Interior(i) => self.values[i],
            Slot::Slab(s, i) => self.slabs[s][i],
            Slot::Dummy => self.dummy,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, x: i32, y: i32, z: i32) -> &mut FieldStrength {
        match self.slot(x, y, z) {
            Slot::Interior(i) => &mut self.values[i],
            Slot::Slab(s, i) => &mut self.slabs[s][i],
            Slot::Dummy => {
                // Reset so a prior discarded write never leaks back out
                self.dummy = 0;
                &mut self.dummy
            }
        }
    }

    #[inline]
    pub fn set(&mut self, x: i32, y: i32, z: i32, value: FieldStrength) {
        *self.get_mut(x, y, z) = value;
    }

    /// Zeroes the interior and every slab.
    pub fn clear(&mut self) {
        self.values.fill(0);
        for slab in &mut self.slabs {
            slab.fill(0);
        }
    }

    /// Visits every field position inside `[c0, cN]` (inclusive, feathered
    /// coordinates allowed): the six face slabs first in orthogonal-neighbor
    /// order, then the interior in z-major, y-major, x-minor scan order.
    ///
    /// The iterator is lazy, single-pass, and non-restartable.
    pub fn iterate(&self, c0: FieldCoords, cn: FieldCoords) -> FieldIter {
        FieldIter::new(self.descriptor.dimensions as i32, c0, cn)
    }

    /// Visits the whole feathered cube.
    pub fn iterate_all(&self) -> FieldIter {
        let d = self.descriptor.dimensions as i32;
        self.iterate((-1, -1, -1), (d + 1, d + 1, d + 1))
    }

    /// Yields `(voxel index, left, right)` samples displaced one step along
    /// `axis` for every interior grid point of the box, sourcing slabs where
    /// the point is flush with a face.
    pub fn iterate_gradient(&self, axis: usize, c0: FieldCoords, cn: FieldCoords) -> GradientIter<'_, 'a> {
        debug_assert!(axis < 3, "gradient axis out of bounds");
        GradientIter::new(self, axis, c0, cn)
    }

    /// Recomputes all three gradient channels as the halved central
    /// difference of the field, with slab samples supplying the one-sided
    /// borders.
    pub fn update_gradient(&self, gradient: &mut GradientChannels) {
        let d = self.descriptor.dimensions as i32;
        let whole = ((0, 0, 0), (d, d, d));
        for sample in self.iterate_gradient(0, whole.0, whole.1) {
            gradient.dx[sample.index] = sample.halved_difference();
        }
        for sample in self.iterate_gradient(1, whole.0, whole.1) {
            gradient.dy[sample.index] = sample.halved_difference();
        }
        for sample in self.iterate_gradient(2, whole.0, whole.1) {
            gradient.dz[sample.index] = sample.halved_difference();
        }
    }
}

/// Iteration phases: one per face slab, then the interior block.
const PHASE_INTERIOR: usize = OrthogonalNeighbor::COUNT;

/// Lazy walk over slab positions then interior positions of a box.
pub struct FieldIter {
    dim: i32,
    c0: FieldCoords,
    cn: FieldCoords,
    phase: usize,
    /// Current 2D position within a slab phase, or 3D position via `cursor`.
    cursor: FieldCoords,
    /// Whether `cursor` is primed for the current phase.
    primed: bool,
}

impl FieldIter {
    fn new(dim: i32, c0: FieldCoords, cn: FieldCoords) -> Self {
        Self {
            dim,
            c0,
            cn,
            phase: 0,
            cursor: (0, 0, 0),
            primed: false,
        }
    }

    /// The slab plane coordinate for a phase, or `None` when the box does
    /// not reach that slab.
    fn slab_plane(&self, side: OrthogonalNeighbor) -> Option<FieldCoords> {
        let d = self.dim;
        let (fixed_axis, plane) = match side {
            OrthogonalNeighbor::North => (2, -1),
            OrthogonalNeighbor::South => (2, d + 1),
            OrthogonalNeighbor::East => (0, d + 1),
            OrthogonalNeighbor::West => (0, -1),
            OrthogonalNeighbor::Above => (1, d + 1),
            OrthogonalNeighbor::Below => (1, -1),
        };
        let lo = [self.c0.0, self.c0.1, self.c0.2];
        let hi = [self.cn.0, self.cn.1, self.cn.2];
        if lo[fixed_axis] > plane || hi[fixed_axis] < plane {
            return None;
        }
        let mut start = [
            lo[0].clamp(0, d),
            lo[1].clamp(0, d),
            lo[2].clamp(0, d),
        ];
        start[fixed_axis] = plane;
        Some((start[0], start[1], start[2]))
    }

    /// Bounds of the free axes clamped to the cube for slab phases.
    fn clamped(&self, v: i32) -> i32 {
        v.clamp(0, self.dim)
    }

    fn advance_in_slab(&mut self, side: OrthogonalNeighbor) -> bool {
        let fixed_axis = match side {
            OrthogonalNeighbor::East | OrthogonalNeighbor::West => 0,
            OrthogonalNeighbor::Above | OrthogonalNeighbor::Below => 1,
            OrthogonalNeighbor::North | OrthogonalNeighbor::South => 2,
        };
        let lo = [
            self.clamped(self.c0.0),
            self.clamped(self.c0.1),
            self.clamped(self.c0.2),
        ];
        let hi = [
            self.clamped(self.cn.0),
            self.clamped(self.cn.1),
            self.clamped(self.cn.2),
        ];
        let mut cur = [self.cursor.0, self.cursor.1, self.cursor.2];

        // Increment minor axis first, skipping the fixed one
        for axis in 0..3 {
            if axis == fixed_axis {
                continue;
            }
            if cur[axis] < hi[axis] {
                cur[axis] += 1;
                self.cursor = (cur[0], cur[1], cur[2]);
                return true;
            }
            cur[axis] = lo[axis];
        }
        false
    }

    fn advance_in_interior(&mut self) -> bool {
        let lo = (
            self.clamped(self.c0.0),
            self.clamped(self.c0.1),
            self.clamped(self.c0.2),
        );
        let hi = (
            self.clamped(self.cn.0),
            self.clamped(self.cn.1),
            self.clamped(self.cn.2),
        );
        let (mut x, mut y, mut z) = self.cursor;
        if x < hi.0 {
            x += 1;
        } else {
            x = lo.0;
            if y < hi.1 {
                y += 1;
            } else {
                y = lo.1;
                if z < hi.2 {
                    z += 1;
                } else {
                    return false;
                }
            }
        }
        self.cursor = (x, y, z);
        true
    }

    fn interior_start(&self) -> Option<FieldCoords> {
        let lo = (
            self.clamped(self.c0.0),
            self.clamped(self.c0.1),
            self.clamped(self.c0.2),
        );
        let hi = (
            self.clamped(self.cn.0),
            self.clamped(self.cn.1),
            self.clamped(self.cn.2),
        );
        (lo.0 <= hi.0 && lo.1 <= hi.1 && lo.2 <= hi.2).then_some(lo)
    }
}

impl Iterator for FieldIter {
    type Item = FieldCoords;

    fn next(&mut self) -> Option<FieldCoords> {
        loop {
            if self.phase < PHASE_INTERIOR {
                let side = OrthogonalNeighbor::ALL[self.phase];
                if !self.primed {
                    match self.slab_plane(side) {
                        Some(start) => {
                            self.cursor = start;
                            self.primed = true;
                            return Some(self.cursor);
                        }
                        None => {
                            self.phase += 1;
                            continue;
                        }
                    }
                }
                if self.advance_in_slab(side) {
                    return Some(self.cursor);
                }
                self.phase += 1;
                self.primed = false;
            } else if self.phase == PHASE_INTERIOR {
                if !self.primed {
                    match self.interior_start() {
                        Some(start) => {
                            self.cursor = start;
                            self.primed = true;
                            return Some(self.cursor);
                        }
                        None => {
                            self.phase += 1;
                            continue;
                        }
                    }
                }
                if self.advance_in_interior() {
                    return Some(self.cursor);
                }
                self.phase += 1;
            } else {
                return None;
            }
        }
    }
}

/// One central-difference sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradientSample {
    pub index: VoxelIndex,
    pub left: FieldStrength,
    pub right: FieldStrength,
}

impl GradientSample {
    /// `(left - right) / 2`, the stored gradient component.
    #[inline]
    pub fn halved_difference(&self) -> i8 {
        ((self.left as i16 - self.right as i16) / 2) as i8
    }
}

/// Walks interior grid points yielding displaced sample pairs along an axis.
pub struct GradientIter<'b, 'a> {
    field: &'b FieldAccessor<'a>,
    axis: usize,
    lo: FieldCoords,
    hi: FieldCoords,
    cursor: FieldCoords,
    done: bool,
}

impl<'b, 'a> GradientIter<'b, 'a> {
    fn new(field: &'b FieldAccessor<'a>, axis: usize, c0: FieldCoords, cn: FieldCoords) -> Self {
        let d = field.descriptor.dimensions as i32;
        let lo = (c0.0.clamp(0, d), c0.1.clamp(0, d), c0.2.clamp(0, d));
        let hi = (cn.0.clamp(0, d), cn.1.clamp(0, d), cn.2.clamp(0, d));
        Self {
            field,
            axis,
            lo,
            hi,
            cursor: lo,
            done: lo.0 > hi.0 || lo.1 > hi.1 || lo.2 > hi.2,
        }
    }
}

impl Iterator for GradientIter<'_, '_> {
    type Item = GradientSample;

    fn next(&mut self) -> Option<GradientSample> {
        if self.done {
            return None;
        }
        let (x, y, z) = self.cursor;
        let (dx, dy, dz) = match self.axis {
            0 => (1, 0, 0),
            1 => (0, 1, 0),
            _ => (0, 0, 1),
        };
        let sample = GradientSample {
            index: self.field.descriptor.grid_point_index(x as u16, y as u16, z as u16),
            left: self.field.get(x - dx, y - dy, z - dz),
            right: self.field.get(x + dx, y + dy, z + dz),
        };

        // x-minor, z-major advance
        if self.cursor.0 < self.hi.0 {
            self.cursor.0 += 1;
        } else {
            self.cursor.0 = self.lo.0;
            if self.cursor.1 < self.hi.1 {
                self.cursor.1 += 1;
            } else {
                self.cursor.1 = self.lo.1;
                if self.cursor.2 < self.hi.2 {
                    self.cursor.2 += 1;
                } else {
                    self.done = true;
                }
            }
        }
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::VoxelRegionFlags;

    fn descriptor() -> CubeDescriptor {
        CubeDescriptor::new(5, 1.0, VoxelRegionFlags::GRADIENT).unwrap()
    }

    #[test]
    fn test_feathered_reads_and_writes() {
        let meta = descriptor();
        let mut values = vec![0; meta.grid_point_count];
        let mut field = FieldAccessor::new(&meta, &mut values);

        field.set(2, 2, 2, -5);
        assert_eq!(field.get(2, 2, 2), -5);

        // Feathered write lands in the slab, not the interior
        field.set(-1, 2, 2, -7);
        assert_eq!(field.get(-1, 2, 2), -7);
        assert!(field.values().iter().all(|&v| v == 0 || v == -5));
        assert_eq!(field.slab(OrthogonalNeighbor::West)[2 + 2 * 5], -7);

        // Diagonal overreach is absorbed and never read back
        field.set(-1, -1, 0, -9);
        assert_eq!(field.get(-1, -1, 0), 0);
    }

    #[test]
    fn test_iterate_orders_slabs_before_interior() {
        let meta = descriptor();
        let mut values = vec![0; meta.grid_point_count];
        let field = FieldAccessor::new(&meta, &mut values);
        let d = meta.dimensions as i32;

        let visited: Vec<_> = field.iterate_all().collect();
        // Every slab position and interior position exactly once
        let slab_count = 6 * meta.side_point_count;
        assert_eq!(visited.len(), slab_count + meta.grid_point_count);

        // Slab phases first: the first position sits on the north plane
        assert_eq!(visited[0].2, -1);
        // Interior phase is a contiguous z-major tail
        let tail = &visited[slab_count..];
        assert_eq!(tail[0], (0, 0, 0));
        assert_eq!(tail[1], (1, 0, 0));
        assert_eq!(*tail.last().unwrap(), (d, d, d));
    }

    #[test]
    fn test_iterate_clips_to_box() {
        let meta = descriptor();
        let mut values = vec![0; meta.grid_point_count];
        let field = FieldAccessor::new(&meta, &mut values);

        // A strictly interior box never touches a slab
        let visited: Vec<_> = field.iterate((1, 1, 1), (2, 2, 2)).collect();
        assert_eq!(visited.len(), 8);
        assert!(visited.iter().all(|&(x, y, z)| {
            (1..=2).contains(&x) && (1..=2).contains(&y) && (1..=2).contains(&z)
        }));
    }

    #[test]
    fn test_gradient_pulls_from_slab_at_borders() {
        let meta = descriptor();
        let mut values = vec![0; meta.grid_point_count];
        let mut field = FieldAccessor::new(&meta, &mut values);

        // Interior ramp along x plus a slab sample behind the west face
        field.set(-1, 0, 0, -8);
        field.set(0, 0, 0, -4);
        field.set(1, 0, 0, 4);

        let samples: Vec<_> = field.iterate_gradient(0, (0, 0, 0), (1, 0, 0)).collect();
        assert_eq!(samples.len(), 2);
        // At x=0 the left sample comes from the west slab
        assert_eq!(samples[0].left, -8);
        assert_eq!(samples[0].right, 4);
        assert_eq!(samples[0].halved_difference(), -6);
    }

    #[test]
    fn test_update_gradient_writes_all_axes() {
        let meta = descriptor();
        let mut values = vec![0; meta.grid_point_count];
        let mut field = FieldAccessor::new(&meta, &mut values);
        for z in 0..=4 {
            for y in 0..=4 {
                for x in 0..=4 {
                    // Field increases along y only
                    field.set(x, y, z, (y * 2 - 4) as FieldStrength);
                }
            }
        }

        let mut gradient = GradientChannels {
            dx: vec![0; meta.grid_point_count].into_boxed_slice(),
            dy: vec![0; meta.grid_point_count].into_boxed_slice(),
            dz: vec![0; meta.grid_point_count].into_boxed_slice(),
        };
        field.update_gradient(&mut gradient);

        let center = meta.grid_point_index(2, 2, 2);
        assert_eq!(gradient.dx[center], 0);
        // left - right = (y-1 sample) - (y+1 sample) = -4, halved
        assert_eq!(gradient.dy[center], -2);
        assert_eq!(gradient.dz[center], 0);
    }
}
