//! Scene description and construction.
//!
//! A [`SceneSpec`] (JSON or the built-in default) is turned by
//! [`SceneBuilder`] into backend geometry grouped into two top-level
//! hierarchies sharing the same opaque groups:
//!
//! ```text
//! top_shadower ─┬─ procedural (volumes, spheres)
//!               └─ triangles  (meshes)
//! top_object   ─┬─ procedural
//!               ├─ triangles
//!               └─ lights     (emissive spheres)
//! ```

pub mod assets;
pub mod builder;
pub mod environment;
pub mod group;
pub mod instance;
pub mod mesh;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result, Vec3};

pub use assets::AssetResolver;
pub use builder::{BuiltScene, SceneBuilder};
pub use environment::EnvironmentMap;
pub use group::{GeometryGroup, TopLevelGroup};
pub use instance::{GeometryInstance, Material, MaterialBinding, MaterialKind, Shape, ShapeKind, TriangleMesh};
pub use mesh::{MeshImporter, ObjImporter};

/// Camera pose and field of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub eye: [f32; 3],
    pub lookat: [f32; 3],
    #[serde(default = "default_up")]
    pub up: [f32; 3],
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov: f32,
}

fn default_up() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_fov() -> f32 {
    35.0
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self {
            eye: [13.91, 166.787, 413.0],
            lookat: [-6.59, 169.94, -9.11],
            up: default_up(),
            fov: default_fov(),
        }
    }
}

impl CameraSpec {
    pub fn eye(&self) -> Vec3 {
        Vec3::from(self.eye)
    }

    pub fn lookat(&self) -> Vec3 {
        Vec3::from(self.lookat)
    }

    pub fn up(&self) -> Vec3 {
        Vec3::from(self.up)
    }
}

/// Path tracer parameters bound before the first launch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub max_depth: u32,
    pub sample_per_launch: u32,
    pub rr_begin_depth: u32,
    pub scene_epsilon: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_depth: 10,
            sample_per_launch: 2,
            rr_begin_depth: 1,
            scene_epsilon: 0.001,
        }
    }
}

fn default_albedo() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// One opaque primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrimitiveSpec {
    RaymarchedVolume {
        center: [f32; 3],
        world_scale: [f32; 3],
        unit_scale: [f32; 3],
        #[serde(default = "default_albedo")]
        albedo: [f32; 3],
    },
    Sphere {
        center: [f32; 3],
        radius: f32,
        #[serde(default = "default_albedo")]
        albedo: [f32; 3],
    },
    Mesh {
        /// Asset name, looked up through the [`AssetResolver`]
        path: String,
        #[serde(default)]
        translate: [f32; 3],
        #[serde(default = "unit_scale")]
        scale: [f32; 3],
        #[serde(default = "default_albedo")]
        albedo: [f32; 3],
    },
}

/// One emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LightSpec {
    Sphere {
        position: [f32; 3],
        radius: f32,
        emission: [f32; 3],
    },
}

/// Full scene description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSpec {
    pub camera: CameraSpec,
    pub render: RenderSettings,
    /// Equirectangular environment asset name
    pub environment: Option<String>,
    pub primitives: Vec<PrimitiveSpec>,
    pub lights: Vec<LightSpec>,
}

impl SceneSpec {
    /// Parse a JSON scene description.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidScene(e.to_string()))
    }

    /// Load a JSON scene description from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::InvalidScene(format!("{}: {e}", path.display())))
    }

    /// The stock scene: fractal volume, a green sphere, a cow and two sphere
    /// lights under a canyon sky.
    pub fn default_scene() -> Self {
        Self {
            camera: CameraSpec::default(),
            render: RenderSettings::default(),
            environment: Some("GrandCanyon_C_YumaPoint/GCanyon_C_YumaPoint_3k.hdr".to_string()),
            primitives: vec![
                PrimitiveSpec::RaymarchedVolume {
                    center: [0.0, 0.0, 0.0],
                    world_scale: [300.0; 3],
                    unit_scale: [4.3; 3],
                    albedo: [0.8, 0.8, 0.8],
                },
                PrimitiveSpec::Sphere {
                    center: [0.0, 310.0, 50.0],
                    radius: 10.0,
                    albedo: [0.05, 0.8, 0.05],
                },
                PrimitiveSpec::Mesh {
                    path: "cow.obj".to_string(),
                    translate: [0.0, 300.0, 0.0],
                    scale: [500.0; 3],
                    albedo: [0.9, 0.1, 0.1],
                },
            ],
            lights: vec![
                LightSpec::Sphere {
                    position: [50.0, 310.0, 50.0],
                    radius: 10.0,
                    emission: [1.0, 1.0, 1.0],
                },
                LightSpec::Sphere {
                    position: [0.01, 166.787, 190.0],
                    radius: 2.0,
                    emission: [10.0, 0.01, 0.01],
                },
            ],
        }
    }

    /// Asset names the scene refers to.
    pub fn assets(&self) -> Vec<&str> {
        let meshes = self.primitives.iter().filter_map(|p| match p {
            PrimitiveSpec::Mesh { path, .. } => Some(path.as_str()),
            _ => None,
        });
        meshes.chain(self.environment.as_deref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scene() {
        let spec = SceneSpec::default_scene();
        assert_eq!(spec.primitives.len(), 3);
        assert_eq!(spec.lights.len(), 2);
        assert_eq!(spec.render.max_depth, 10);
        assert_eq!(spec.render.sample_per_launch, 2);
        assert_eq!(
            spec.assets(),
            vec!["cow.obj", "GrandCanyon_C_YumaPoint/GCanyon_C_YumaPoint_3k.hdr"]
        );
    }

    #[test]
    fn test_parse_json() {
        let spec = SceneSpec::from_json(
            r#"{
                "camera": { "eye": [0, 0, 5], "lookat": [0, 0, 0] },
                "primitives": [
                    { "kind": "sphere", "center": [0, 0, 0], "radius": 1.5 },
                    { "kind": "mesh", "path": "bunny.obj", "scale": [2, 2, 2] }
                ],
                "lights": [
                    { "kind": "sphere", "position": [0, 4, 0], "radius": 0.5, "emission": [5, 5, 5] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(spec.camera.up, [0.0, 1.0, 0.0]);
        assert_eq!(spec.camera.fov, 35.0);
        assert_eq!(spec.render, RenderSettings::default());
        assert!(spec.environment.is_none());
        match &spec.primitives[1] {
            PrimitiveSpec::Mesh { translate, scale, .. } => {
                assert_eq!(*translate, [0.0; 3]);
                assert_eq!(*scale, [2.0; 3]);
            }
            other => panic!("unexpected primitive {other:?}"),
        }
        assert_eq!(spec.lights.len(), 1);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let r = SceneSpec::from_json(r#"{ "primitives": [ { "kind": "torus", "center": [0,0,0] } ] }"#);
        assert!(matches!(r, Err(Error::InvalidScene(_))));
        // Syntax errors land in the same class
        let r = SceneSpec::from_json(r#"{ "camera": { "eye": [0, 0 "#);
        assert!(matches!(r, Err(Error::InvalidScene(_))));
    }
}
