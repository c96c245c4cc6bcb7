//! Geometry instances: one primitive, its bounds and its material binding.

use std::path::PathBuf;
use std::sync::Arc;

use crate::util::{Aabb, Error, Result, Vec3};

/// Primitive kinds understood by the execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    RaymarchedVolume,
    Sphere,
    TriangleMesh,
}

/// Indexed triangle soup already transformed to world space.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    /// Per-vertex normals, empty when the source had none.
    pub normals: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    /// File the mesh was imported from.
    pub source: PathBuf,
}

impl TriangleMesh {
    /// Bounds of all referenced vertices.
    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        for p in &self.positions {
            b.expand_by_point(*p);
        }
        b
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }
}

/// Shape parameters, one variant per [`ShapeKind`].
#[derive(Debug, Clone)]
pub enum Shape {
    /// Distance-estimated volume evaluated in unit space and scaled to world.
    RaymarchedVolume { center: Vec3, local_scale: Vec3 },
    Sphere { center: Vec3, radius: f32 },
    TriangleMesh(Arc<TriangleMesh>),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::RaymarchedVolume { .. } => ShapeKind::RaymarchedVolume,
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::TriangleMesh(_) => ShapeKind::TriangleMesh,
        }
    }
}

/// Closest-hit behaviour of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Lambertian surface; casts and receives shadows.
    Diffuse,
    /// Emitter; terminates paths and is sampled through the light buffer.
    Light,
}

/// Material shared between every instance that uses it.
#[derive(Debug)]
pub struct Material {
    name: String,
    kind: MaterialKind,
}

impl Material {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }
}

/// Per-instance material variables.
#[derive(Debug, Clone)]
pub struct MaterialBinding {
    pub material: Arc<Material>,
    /// Albedo for diffuse materials, emission for lights.
    pub color: Vec3,
    /// Index into the light parameter buffer, set only on emitters.
    pub light_id: Option<u32>,
}

impl MaterialBinding {
    pub fn diffuse(material: &Arc<Material>, albedo: Vec3) -> Self {
        Self {
            material: Arc::clone(material),
            color: albedo,
            light_id: None,
        }
    }

    pub fn light(material: &Arc<Material>, emission: Vec3, light_id: u32) -> Self {
        Self {
            material: Arc::clone(material),
            color: emission,
            light_id: Some(light_id),
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.material.kind() == MaterialKind::Light
    }
}

/// One primitive placed in the scene.
#[derive(Debug, Clone)]
pub struct GeometryInstance {
    shape: Shape,
    material: MaterialBinding,
    bounds: Aabb,
}

impl GeometryInstance {
    /// Raymarched volume centred at `center`, spanning `world_scale` on each
    /// side; `unit_scale` is the half-extent of the estimator in its own units.
    pub fn raymarched_volume(
        center: Vec3,
        world_scale: Vec3,
        unit_scale: Vec3,
        material: MaterialBinding,
    ) -> Result<Self> {
        if unit_scale.cmpeq(Vec3::ZERO).any() || !unit_scale.is_finite() {
            return Err(Error::InvalidScene(format!(
                "raymarched volume unit scale must be non-zero, got {unit_scale:?}"
            )));
        }
        let local_scale = world_scale / unit_scale;
        Ok(Self {
            shape: Shape::RaymarchedVolume { center, local_scale },
            material,
            bounds: Aabb::new(center - world_scale, center + world_scale),
        })
    }

    /// Analytic sphere.
    pub fn sphere(center: Vec3, radius: f32, material: MaterialBinding) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidScene(format!("sphere radius must be positive, got {radius}")));
        }
        Ok(Self {
            shape: Shape::Sphere { center, radius },
            material,
            bounds: Aabb::from_center_half_extent(center, Vec3::splat(radius)),
        })
    }

    /// Triangle mesh already in world space.
    pub fn triangle_mesh(mesh: Arc<TriangleMesh>, material: MaterialBinding) -> Self {
        let bounds = mesh.bounds();
        Self {
            shape: Shape::TriangleMesh(mesh),
            material,
            bounds,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn material(&self) -> &MaterialBinding {
        &self.material
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn is_emissive(&self) -> bool {
        self.material.is_emissive()
    }
}
