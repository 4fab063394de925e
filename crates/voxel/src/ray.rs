//! Cell-by-cell ray traversal over a discrete 3D grid

use glam::{IVec3, Vec3};

use crate::types::Touch3dSide;

/// A ray in world or grid space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    #[inline]
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// One visited cell during traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayStep {
    /// Grid coordinates of the cell.
    pub cell: IVec3,
    /// Face of the cell the ray entered through; `NONE` for the start cell.
    pub entered_through: Touch3dSide,
    /// Linear distance from the ray origin to the entry point.
    pub distance: f32,
    /// World position where the ray crossed into this cell.
    pub entry_point: Vec3,
}

/// Iterator walking a ray through a grid of cubical cells.
///
/// Standard incremental traversal: per axis the parametric distance to the
/// next cell boundary is kept, the smallest one decides the axis to step.
/// Sign handling is branch-free via precomputed step and boundary offsets.
/// Supports coarsening the cell size mid-walk for LOD transitions.
pub struct DiscreteRayIterator {
    ray: Ray,
    cell_size: f32,
    cell: IVec3,
    step: IVec3,
    /// Which face a step along each axis enters the next cell through.
    entry_side: [Touch3dSide; 3],
    t_max: Vec3,
    t_delta: Vec3,
    distance: f32,
    entered: Touch3dSide,
    started: bool,
}

impl DiscreteRayIterator {
    pub fn new(ray: Ray, cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        let dir = ray.direction;

        // Sign masks without branches on the hot path thereafter
        let step = IVec3::new(
            if dir.x < 0.0 { -1 } else { 1 },
            if dir.y < 0.0 { -1 } else { 1 },
            if dir.z < 0.0 { -1 } else { 1 },
        );
        let entry_side = [
            if dir.x < 0.0 {
                Touch3dSide::EAST
            } else {
                Touch3dSide::WEST
            },
            if dir.y < 0.0 {
                Touch3dSide::ABOVE
            } else {
                Touch3dSide::BELOW
            },
            if dir.z < 0.0 {
                Touch3dSide::SOUTH
            } else {
                Touch3dSide::NORTH
            },
        ];

        let mut iter = Self {
            ray,
            cell_size,
            cell: IVec3::ZERO,
            step,
            entry_side,
            t_max: Vec3::ZERO,
            t_delta: Vec3::ZERO,
            distance: 0.0,
            entered: Touch3dSide::NONE,
            started: false,
        };
        iter.realign();
        iter
    }

    /// Current cell span in world units.
    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Linear distance traversed so far.
    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    #[inline]
    pub fn within(&self, limit: f32) -> bool {
        limit <= 0.0 || self.distance < limit
    }

    /// Doubles the cell span and realigns the walker to the coarser lattice
    /// at the current position. Used when the surface LOD changes mid-ray.
    pub fn upgrade_lod(&mut self) {
        self.cell_size *= 2.0;
        self.realign();
    }

    fn realign(&mut self) {
        let position = self.ray.point_at(self.distance);
        let scaled = position / self.cell_size;
        self.cell = scaled.floor().as_ivec3();

        for axis in 0..3 {
            let dir = self.ray.direction[axis];
            if dir == 0.0 {
                self.t_delta[axis] = f32::INFINITY;
                self.t_max[axis] = f32::INFINITY;
            } else {
                self.t_delta[axis] = self.cell_size / dir.abs();
                // Distance from the current position to the next boundary on
                // this axis, in the direction of travel
                let next_boundary = if dir > 0.0 {
                    (self.cell[axis] + 1) as f32 * self.cell_size
                } else {
                    self.cell[axis] as f32 * self.cell_size
                };
                self.t_max[axis] = self.distance + (next_boundary - position[axis]) / dir;
            }
        }
    }
}

impl Iterator for DiscreteRayIterator {
    type Item = RayStep;

    fn next(&mut self) -> Option<RayStep> {
        if !self.started {
            self.started = true;
            return Some(RayStep {
                cell: self.cell,
                entered_through: Touch3dSide::NONE,
                distance: self.distance,
                entry_point: self.ray.origin,
            });
        }

        // Step across the nearest boundary
        let axis = if self.t_max.x <= self.t_max.y && self.t_max.x <= self.t_max.z {
            0
        } else if self.t_max.y <= self.t_max.z {
            1
        } else {
            2
        };
        if self.t_max[axis].is_infinite() {
            return None;
        }

        self.distance = self.t_max[axis];
        self.cell[axis] += self.step[axis];
        self.t_max[axis] += self.t_delta[axis];
        self.entered = self.entry_side[axis];

        Some(RayStep {
            cell: self.cell,
            entered_through: self.entered,
            distance: self.distance,
            entry_point: self.ray.point_at(self.distance),
        })
    }
}
