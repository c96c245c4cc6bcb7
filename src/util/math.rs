//! Math type re-exports and renderer-specific math utilities.
//!
//! This module re-exports types from `glam` and provides the bounding box
//! and camera-frame helpers shared by the scene builder, the camera and the
//! execution backends.

pub use glam::{Mat3, Mat4, Quat, UVec2, Vec2, Vec3, Vec4};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Axis-aligned bounding box with single precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box spanning `center ± half_extent` on every axis.
    #[inline]
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Surface area (for SAH cost). Zero for empty boxes.
    #[inline]
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Slab test. Returns the parametric entry/exit distances clipped to
    /// `[t_min, t_max]`, or `None` when the ray misses.
    #[inline]
    pub fn intersect_ray(&self, origin: Vec3, inv_dir: Vec3, t_min: f32, t_max: f32) -> Option<(f32, f32)> {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let near = t0.min(t1).max_element().max(t_min);
        let far = t0.max(t1).min_element().min(t_max);
        (near <= far).then_some((near, far))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb({:?} - {:?})", self.min, self.max)
    }
}

/// Orthonormal look-at basis: `u` right, `v` up, `w` forward (towards lookat).
pub fn look_at_basis(eye: Vec3, lookat: Vec3, up: Vec3) -> (Vec3, Vec3, Vec3) {
    let w = (lookat - eye).normalize_or_zero();
    let u = w.cross(up).normalize_or_zero();
    let v = u.cross(w).normalize_or_zero();
    (u, v, w)
}

/// True when no look-at basis exists: non-finite input, `eye` on top of
/// `lookat`, or `up` parallel to the view direction.
pub fn is_degenerate_pose(eye: Vec3, lookat: Vec3, up: Vec3) -> bool {
    if !(eye.is_finite() && lookat.is_finite() && up.is_finite()) {
        return true;
    }
    let view = lookat - eye;
    if view.length_squared() <= f32::EPSILON * f32::EPSILON || up.length_squared() <= f32::EPSILON {
        return true;
    }
    view.normalize().cross(up.normalize()).length_squared() < 1e-8
}

/// Matrix whose columns are the given axes with `origin` as translation.
#[inline]
pub fn frame_from_basis(x: Vec3, y: Vec3, z: Vec3, origin: Vec3) -> Mat4 {
    Mat4::from_cols(x.extend(0.0), y.extend(0.0), z.extend(0.0), origin.extend(1.0))
}
