//! Intersection programs for the three shape kinds.

use std::sync::Arc;

use super::bvh::Bvh;
use crate::scene::TriangleMesh;
use crate::util::{Aabb, Vec3};

/// Ray with a unit-length direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Hit distance and geometric normal (not face-forwarded).
#[derive(Debug, Clone, Copy)]
pub struct ShapeHit {
    pub t: f32,
    pub normal: Vec3,
}

pub fn intersect_sphere(center: Vec3, radius: f32, ray: &Ray, t_min: f32, t_max: f32) -> Option<ShapeHit> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.dir);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sdisc = disc.sqrt();
    let t = [-b - sdisc, -b + sdisc].into_iter().find(|&t| t > t_min && t < t_max)?;
    Some(ShapeHit {
        t,
        normal: (ray.at(t) - center) / radius,
    })
}

/// Mandelbox distance estimator parameters.
mod mandelbox {
    pub const SCALE: f32 = 2.8;
    pub const MIN_RADIUS2: f32 = 0.25;
    pub const FIXED_RADIUS2: f32 = 1.0;
    pub const ITERATIONS: usize = 10;
}

/// Raymarch step limit.
const MAX_MARCH_STEPS: usize = 300;

/// Hit threshold in estimator units.
const MARCH_EPSILON: f32 = 1e-3;

/// Mandelbox distance estimate in its own unit space.
pub fn mandelbox_de(p: Vec3) -> f32 {
    use mandelbox::*;

    let mut z = p;
    let mut dr = 1.0f32;
    for _ in 0..ITERATIONS {
        z = z.clamp(Vec3::NEG_ONE, Vec3::ONE) * 2.0 - z;
        let r2 = z.length_squared();
        if r2 < MIN_RADIUS2 {
            let k = FIXED_RADIUS2 / MIN_RADIUS2;
            z *= k;
            dr *= k;
        } else if r2 < FIXED_RADIUS2 {
            let k = FIXED_RADIUS2 / r2;
            z *= k;
            dr *= k;
        }
        z = z * SCALE + p;
        dr = dr * SCALE.abs() + 1.0;
    }
    z.length() / dr.abs()
}

/// Distance estimate in world space for a volume placed at `center`.
#[inline]
pub fn volume_distance(p: Vec3, center: Vec3, local_scale: Vec3) -> f32 {
    mandelbox_de((p - center) / local_scale) * local_scale.min_element()
}

/// Sphere-trace the volume inside its bounds.
pub fn intersect_volume(
    center: Vec3,
    local_scale: Vec3,
    bounds: &Aabb,
    ray: &Ray,
    t_min: f32,
    t_max: f32,
) -> Option<ShapeHit> {
    let (near, far) = bounds.intersect_ray(ray.origin, ray.dir.recip(), t_min, t_max)?;
    let scale = local_scale.min_element();
    let threshold = MARCH_EPSILON * scale;

    // Rays leaving the surface start inside the hit threshold
    let leaving = near <= t_min;
    let mut t = near;
    for _ in 0..MAX_MARCH_STEPS {
        if t > far {
            return None;
        }
        let d = volume_distance(ray.at(t), center, local_scale);
        if d < threshold {
            if leaving && t - near < 2.0 * threshold {
                t += threshold;
                continue;
            }
            let normal = volume_normal(ray.at(t), center, local_scale, threshold);
            return Some(ShapeHit { t, normal });
        }
        t += d;
    }
    None
}

/// Central-difference gradient of the distance field.
fn volume_normal(p: Vec3, center: Vec3, local_scale: Vec3, h: f32) -> Vec3 {
    let de = |q: Vec3| volume_distance(q, center, local_scale);
    Vec3::new(
        de(p + Vec3::X * h) - de(p - Vec3::X * h),
        de(p + Vec3::Y * h) - de(p - Vec3::Y * h),
        de(p + Vec3::Z * h) - de(p - Vec3::Z * h),
    )
    .normalize_or_zero()
}

/// Triangle mesh with its own BVH.
#[derive(Debug)]
pub struct MeshAccel {
    mesh: Arc<TriangleMesh>,
    bvh: Bvh,
}

impl MeshAccel {
    #[tracing::instrument(skip_all, fields(tri_count = mesh.triangle_count()))]
    pub fn build(mesh: Arc<TriangleMesh>) -> Self {
        let bounds: Vec<Aabb> = mesh
            .indices
            .iter()
            .map(|tri| {
                let mut b = Aabb::EMPTY;
                for &i in tri {
                    b.expand_by_point(mesh.positions[i as usize]);
                }
                b
            })
            .collect();
        let bvh = Bvh::build(&bounds);
        Self { mesh, bvh }
    }

    pub fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<ShapeHit> {
        let mut best: Option<(usize, f32, f32, f32)> = None;
        self.bvh.closest(ray.origin, ray.dir, t_min, t_max, |tri, t_max| {
            let (t, u, v) = self.intersect_triangle(tri, ray, t_min, t_max)?;
            best = Some((tri, t, u, v));
            Some(t)
        });
        let (tri, t, u, v) = best?;
        Some(ShapeHit {
            t,
            normal: self.shading_normal(tri, u, v),
        })
    }

    pub fn occluded(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        self.bvh
            .any(ray.origin, ray.dir, t_min, t_max, |tri| self.intersect_triangle(tri, ray, t_min, t_max).is_some())
    }

    fn vertices(&self, tri: usize) -> [Vec3; 3] {
        let [a, b, c] = self.mesh.indices[tri];
        let p = &self.mesh.positions;
        [p[a as usize], p[b as usize], p[c as usize]]
    }

    /// Möller-Trumbore. Returns (t, u, v).
    fn intersect_triangle(&self, tri: usize, ray: &Ray, t_min: f32, t_max: f32) -> Option<(f32, f32, f32)> {
        let [v0, v1, v2] = self.vertices(tri);
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let pvec = ray.dir.cross(e2);
        let det = e1.dot(pvec);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.origin - v0;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(e1);
        let v = ray.dir.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(qvec) * inv_det;
        (t > t_min && t < t_max).then_some((t, u, v))
    }

    fn shading_normal(&self, tri: usize, u: f32, v: f32) -> Vec3 {
        let [a, b, c] = self.mesh.indices[tri];
        if self.mesh.normals.len() == self.mesh.positions.len() {
            let n = &self.mesh.normals;
            let interp = n[a as usize] * (1.0 - u - v) + n[b as usize] * u + n[c as usize] * v;
            if let Some(n) = interp.try_normalize() {
                return n;
            }
        }
        let [v0, v1, v2] = self.vertices(tri);
        (v1 - v0).cross(v2 - v0).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_hit_and_miss() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let hit = intersect_sphere(Vec3::ZERO, 1.0, &ray, 1e-3, f32::INFINITY).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert!((hit.normal + Vec3::Z).length() < 1e-5);

        let miss = Ray::new(Vec3::new(2.0, 0.0, -5.0), Vec3::Z);
        assert!(intersect_sphere(Vec3::ZERO, 1.0, &miss, 1e-3, f32::INFINITY).is_none());
    }

    #[test]
    fn test_sphere_from_inside() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let hit = intersect_sphere(Vec3::ZERO, 2.0, &ray, 1e-3, f32::INFINITY).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_mandelbox_distance_positive_outside() {
        assert!(mandelbox_de(Vec3::splat(20.0)) > 1.0);
        // The origin lies inside the set
        assert!(mandelbox_de(Vec3::ZERO) < 0.05);
    }

    #[test]
    fn test_volume_hit_from_outside() {
        let center = Vec3::ZERO;
        let world = Vec3::splat(300.0);
        let local_scale = world / Vec3::splat(4.3);
        let bounds = Aabb::from_center_half_extent(center, world);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1000.0), -Vec3::Z);
        let hit = intersect_volume(center, local_scale, &bounds, &ray, 1e-3, f32::INFINITY).unwrap();
        assert!(hit.t > 690.0 && hit.t < 1000.0);
        assert!((hit.normal.length() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_volume_outside_bounds_misses() {
        let bounds = Aabb::from_center_half_extent(Vec3::ZERO, Vec3::ONE);
        let ray = Ray::new(Vec3::new(5.0, 5.0, 5.0), Vec3::X);
        assert!(intersect_volume(Vec3::ZERO, Vec3::ONE, &bounds, &ray, 0.0, f32::INFINITY).is_none());
    }

    fn quad() -> Arc<TriangleMesh> {
        Arc::new(TriangleMesh {
            positions: vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            normals: vec![],
            indices: vec![[0, 1, 2], [0, 2, 3]],
            source: Default::default(),
        })
    }

    #[test]
    fn test_mesh_hit() {
        let accel = MeshAccel::build(quad());
        let ray = Ray::new(Vec3::new(0.25, -0.5, 3.0), -Vec3::Z);
        let hit = accel.intersect(&ray, 1e-3, f32::INFINITY).unwrap();
        assert!((hit.t - 3.0).abs() < 1e-5);
        assert!((hit.normal.z.abs() - 1.0).abs() < 1e-5);
        assert!(accel.occluded(&ray, 1e-3, 10.0));
        assert!(!accel.occluded(&ray, 1e-3, 2.0));
    }

    #[test]
    fn test_mesh_miss() {
        let accel = MeshAccel::build(quad());
        let ray = Ray::new(Vec3::new(3.0, 0.0, 3.0), -Vec3::Z);
        assert!(accel.intersect(&ray, 1e-3, f32::INFINITY).is_none());
    }
}
