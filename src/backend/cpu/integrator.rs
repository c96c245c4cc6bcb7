//! Progressive diffuse path tracing over the CPU scene.

use std::f32::consts::PI;

use super::shapes::{intersect_sphere, intersect_volume, Ray, ShapeHit};
use super::{CpuAccel, CpuGeometry, CpuShape};
use crate::backend::AccelHandle;
use crate::camera::CameraUniform;
use crate::light::{self, offsets, LightKind, LIGHT_PARAMETER_STRIDE};
use crate::scene::EnvironmentMap;
use crate::util::Vec3;

/// Written for non-finite samples; large enough to survive averaging.
pub const BAD_COLOR: [f32; 4] = [1_000_000.0, 0.0, 1_000_000.0, 1.0];

/// Tiny Encryption Algorithm, 4 rounds; seeds the per-pixel generator.
pub fn tea(val0: u32, val1: u32) -> u32 {
    let (mut v0, mut v1, mut s0) = (val0, val1, 0u32);
    for _ in 0..4 {
        s0 = s0.wrapping_add(0x9e37_79b9);
        v0 = v0.wrapping_add(
            (v1 << 4).wrapping_add(0xa341_316c) ^ v1.wrapping_add(s0) ^ (v1 >> 5).wrapping_add(0xc801_3ea4),
        );
        v1 = v1.wrapping_add(
            (v0 << 4).wrapping_add(0xad90_777d) ^ v0.wrapping_add(s0) ^ (v0 >> 5).wrapping_add(0x7e95_761e),
        );
    }
    v0
}

/// Linear congruential generator.
#[derive(Debug, Clone, Copy)]
pub struct Rng(u32);

impl Rng {
    pub fn new(pixel: u32, frame_number: u32) -> Self {
        Self(tea(pixel, frame_number))
    }

    /// Uniform in `[0, 1)`.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.0 & 0x00ff_ffff) as f32 / 0x0100_0000 as f32
    }
}

/// Per-launch parameters resolved from bindings.
#[derive(Debug, Clone, Copy)]
pub struct LaunchParams {
    pub camera: CameraUniform,
    pub frame_number: u32,
    pub top_object: AccelHandle,
    pub top_shadower: AccelHandle,
    pub max_depth: u32,
    pub sample_per_launch: u32,
    pub rr_begin_depth: u32,
    pub scene_epsilon: f32,
    pub light_count: usize,
}

/// Closest hit against the scene.
#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f32,
    normal: Vec3,
    geometry: usize,
}

/// Read-only view of everything a launch touches.
pub struct SceneView<'a> {
    pub geometries: &'a [CpuGeometry],
    pub accels: &'a [CpuAccel],
    pub lights: &'a [u8],
    pub environment: Option<&'a EnvironmentMap>,
    pub params: LaunchParams,
}

impl SceneView<'_> {
    fn intersect(&self, accel: AccelHandle, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        let mut best = None;
        match &self.accels[accel.index()] {
            CpuAccel::Geometry { members, bvh } => {
                bvh.closest(ray.origin, ray.dir, t_min, t_max, |slot, t_max| {
                    let geometry = members[slot].index();
                    let hit = self.geometries[geometry].intersect(ray, t_min, t_max)?;
                    best = Some(Hit {
                        t: hit.t,
                        normal: hit.normal,
                        geometry,
                    });
                    Some(hit.t)
                });
            }
            CpuAccel::Groups { children, bvh } => {
                bvh.closest(ray.origin, ray.dir, t_min, t_max, |slot, t_max| {
                    let hit = self.intersect(children[slot], ray, t_min, t_max)?;
                    best = Some(hit);
                    Some(hit.t)
                });
            }
        }
        best
    }

    fn occluded(&self, accel: AccelHandle, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        match &self.accels[accel.index()] {
            CpuAccel::Geometry { members, bvh } => bvh.any(ray.origin, ray.dir, t_min, t_max, |slot| {
                self.geometries[members[slot].index()].occludes(ray, t_min, t_max)
            }),
            CpuAccel::Groups { children, bvh } => bvh.any(ray.origin, ray.dir, t_min, t_max, |slot| {
                self.occluded(children[slot], ray, t_min, t_max)
            }),
        }
    }

    fn miss(&self, dir: Vec3) -> Vec3 {
        match self.environment {
            Some(env) => env.lookup(dir),
            None => {
                let t = 0.5 * (dir.y + 1.0);
                Vec3::ONE.lerp(Vec3::new(0.5, 0.7, 1.0), t)
            }
        }
    }

    /// Accumulated color for pixel (`x`, `y`) of a `width` x `height` launch.
    pub fn shade_pixel(&self, x: u32, y: u32, width: u32, height: u32) -> [f32; 4] {
        let p = self.params;
        let mut rng = Rng::new(y * width + x, p.frame_number);
        let eye = Vec3::from(p.camera.eye);
        let (u, v, w) = (Vec3::from(p.camera.u), Vec3::from(p.camera.v), Vec3::from(p.camera.w));

        let spl = p.sample_per_launch.max(1);
        let mut sum = Vec3::ZERO;
        for _ in 0..spl {
            let jitter_x = rng.next_f32();
            let jitter_y = rng.next_f32();
            let dx = (x as f32 + jitter_x) / width as f32 * 2.0 - 1.0;
            let dy = 1.0 - (y as f32 + jitter_y) / height as f32 * 2.0;
            let dir = (u * dx + v * dy + w).normalize_or_zero();
            sum += self.trace_path(Ray::new(eye, dir), &mut rng);
        }
        let color = sum / spl as f32;
        if !color.is_finite() {
            return BAD_COLOR;
        }
        [color.x, color.y, color.z, 1.0]
    }

    fn trace_path(&self, mut ray: Ray, rng: &mut Rng) -> Vec3 {
        let p = self.params;
        let eps = p.scene_epsilon;
        let mut radiance = Vec3::ZERO;
        let mut throughput = Vec3::ONE;
        let mut depth = 0u32;

        loop {
            let Some(hit) = self.intersect(p.top_object, &ray, eps, f32::INFINITY) else {
                radiance += throughput * self.miss(ray.dir);
                break;
            };
            let geometry = &self.geometries[hit.geometry];
            if geometry.emissive {
                // Emitters are reached through light sampling on bounces
                if depth == 0 {
                    radiance += throughput * geometry.color;
                }
                break;
            }

            let position = ray.at(hit.t);
            let normal = if hit.normal.dot(ray.dir) > 0.0 { -hit.normal } else { hit.normal };
            throughput *= geometry.color;

            radiance += throughput * self.sample_light(position, normal, rng);

            depth += 1;
            if depth >= p.max_depth {
                break;
            }
            if depth >= p.rr_begin_depth {
                let survive = throughput.max_element().min(0.99);
                if survive <= 0.0 || rng.next_f32() >= survive {
                    break;
                }
                throughput /= survive;
            }

            let dir = cosine_sample_hemisphere(rng.next_f32(), rng.next_f32(), normal);
            ray = Ray::new(position + normal * eps, dir);
        }
        radiance
    }

    /// Next-event estimation against one uniformly chosen light.
    fn sample_light(&self, position: Vec3, normal: Vec3, rng: &mut Rng) -> Vec3 {
        let count = self.params.light_count;
        if count == 0 {
            return Vec3::ZERO;
        }
        let index = ((rng.next_f32() * count as f32) as usize).min(count - 1);
        let base = index * LIGHT_PARAMETER_STRIDE;
        let tag = u32::from_le_bytes([
            self.lights[base + offsets::LIGHT_TYPE],
            self.lights[base + offsets::LIGHT_TYPE + 1],
            self.lights[base + offsets::LIGHT_TYPE + 2],
            self.lights[base + offsets::LIGHT_TYPE + 3],
        ]);
        if LightKind::from_tag(tag) != Some(LightKind::Sphere) {
            return Vec3::ZERO;
        }
        let center = light::read_vec3(self.lights, base + offsets::POSITION);
        let emission = light::read_vec3(self.lights, base + offsets::EMISSION);
        let radius = light::read_f32(self.lights, base + offsets::RADIUS);
        let area = light::read_f32(self.lights, base + offsets::AREA);

        let light_normal = uniform_sample_sphere(rng.next_f32(), rng.next_f32());
        let on_light = center + light_normal * radius;
        let to_light = on_light - position;
        let dist = to_light.length();
        if dist <= 0.0 {
            return Vec3::ZERO;
        }
        let l = to_light / dist;
        let n_dot_l = normal.dot(l);
        let ln_dot_l = -light_normal.dot(l);
        if n_dot_l <= 0.0 || ln_dot_l <= 0.0 {
            return Vec3::ZERO;
        }

        let eps = self.params.scene_epsilon;
        let shadow = Ray::new(position + normal * eps, l);
        if self.occluded(self.params.top_shadower, &shadow, eps, dist - eps) {
            return Vec3::ZERO;
        }
        let weight = n_dot_l * ln_dot_l * area / (PI * dist * dist);
        emission * weight * count as f32
    }
}

impl CpuGeometry {
    fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<ShapeHit> {
        match &self.shape {
            CpuShape::Sphere { center, radius } => intersect_sphere(*center, *radius, ray, t_min, t_max),
            CpuShape::Volume { center, local_scale } => {
                intersect_volume(*center, *local_scale, &self.bounds, ray, t_min, t_max)
            }
            CpuShape::Mesh(mesh) => mesh.intersect(ray, t_min, t_max),
        }
    }

    fn occludes(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        match &self.shape {
            CpuShape::Mesh(mesh) => mesh.occluded(ray, t_min, t_max),
            _ => self.intersect(ray, t_min, t_max).is_some(),
        }
    }
}

/// Cosine-weighted direction around `normal`.
pub fn cosine_sample_hemisphere(u1: f32, u2: f32, normal: Vec3) -> Vec3 {
    let r = u1.sqrt();
    let phi = 2.0 * PI * u2;
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - u1).max(0.0).sqrt());
    let (t, b) = normal.any_orthonormal_pair();
    (t * local.x + b * local.y + normal * local.z).normalize_or_zero()
}

/// Uniform direction on the unit sphere.
pub fn uniform_sample_sphere(u1: f32, u2: f32) -> Vec3 {
    let z = 1.0 - 2.0 * u1;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}
