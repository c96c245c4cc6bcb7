//! Mesh import.

use std::path::{Path, PathBuf};

use crate::scene::TriangleMesh;
use crate::util::{Error, Mat4, Result, Vec3};

/// Loads a triangle mesh and bakes `transform` into it.
pub trait MeshImporter {
    fn load_mesh(&self, path: &Path, transform: Mat4) -> Result<TriangleMesh>;
}

/// Wavefront OBJ importer. All models in the file are merged into one mesh.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjImporter;

impl MeshImporter for ObjImporter {
    #[tracing::instrument(skip(self, transform), fields(path = %path.display()))]
    fn load_mesh(&self, path: &Path, transform: Mat4) -> Result<TriangleMesh> {
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|e| import_error(path, e.to_string()))?;

        if models.is_empty() {
            return Err(import_error(path, "no models found"));
        }

        let normal_matrix = transform.inverse().transpose();
        let mut mesh = TriangleMesh {
            source: path.to_path_buf(),
            ..Default::default()
        };
        let mut all_have_normals = true;

        for model in &models {
            let m = &model.mesh;
            let base = mesh.positions.len() as u32;
            let vertex_count = m.positions.len() / 3;

            mesh.positions.extend(
                m.positions
                    .chunks_exact(3)
                    .map(|p| transform.transform_point3(Vec3::new(p[0], p[1], p[2]))),
            );
            if m.normals.len() == m.positions.len() && all_have_normals {
                mesh.normals.extend(m.normals.chunks_exact(3).map(|n| {
                    normal_matrix
                        .transform_vector3(Vec3::new(n[0], n[1], n[2]))
                        .normalize_or_zero()
                }));
            } else {
                all_have_normals = false;
            }

            for tri in m.indices.chunks_exact(3) {
                if tri.iter().any(|&i| i as usize >= vertex_count) {
                    return Err(import_error(path, format!("index out of range in '{}'", model.name)));
                }
                mesh.indices.push([base + tri[0], base + tri[1], base + tri[2]]);
            }
        }

        if !all_have_normals {
            mesh.normals.clear();
        }
        if mesh.indices.is_empty() {
            return Err(import_error(path, "mesh has no triangles"));
        }

        log::info!(
            "loaded {}: {} vertices, {} triangles",
            path.display(),
            mesh.positions.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }
}

fn import_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::MeshImport {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

/// Model transform: scale first, then translation.
pub fn mesh_transform(translate: Vec3, scale: Vec3) -> Mat4 {
    Mat4::from_translation(translate) * Mat4::from_scale(scale)
}
