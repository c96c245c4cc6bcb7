//! Scene construction: instances, groups, lights and top-level hierarchies.

use std::sync::Arc;

use crate::backend::Backend;
use crate::light::{Light, LightRegistry};
use crate::scene::mesh::mesh_transform;
use crate::scene::{
    AssetResolver, EnvironmentMap, GeometryGroup, GeometryInstance, LightSpec, Material, MaterialBinding,
    MaterialKind, MeshImporter, PrimitiveSpec, SceneSpec, TopLevelGroup,
};
use crate::util::{Result, Vec3};

/// Everything [`SceneBuilder::build`] created on the backend.
#[derive(Debug)]
pub struct BuiltScene {
    /// Opaque groups, shared by both hierarchies
    pub opaque: Vec<Arc<GeometryGroup>>,
    /// Emissive spheres, visible but never shadowing
    pub lights_group: Option<Arc<GeometryGroup>>,
    /// Shadow-ray hierarchy (opaque groups only)
    pub shadower: TopLevelGroup,
    /// Primary-ray hierarchy (opaque groups and lights)
    pub visible: TopLevelGroup,
    /// Light records, not yet committed
    pub lights: LightRegistry,
    pub environment: Option<Arc<EnvironmentMap>>,
}

impl BuiltScene {
    pub fn instance_count(&self) -> usize {
        self.visible.instance_count()
    }
}

/// Builds a [`SceneSpec`] into backend state.
pub struct SceneBuilder<'a> {
    resolver: &'a AssetResolver,
    importer: &'a dyn MeshImporter,
}

/// Instances prepared on the host before any backend call.
struct Prepared {
    procedural: Vec<GeometryInstance>,
    triangles: Vec<GeometryInstance>,
    emitters: Vec<GeometryInstance>,
    lights: LightRegistry,
    environment: Option<Arc<EnvironmentMap>>,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(resolver: &'a AssetResolver, importer: &'a dyn MeshImporter) -> Self {
        Self { resolver, importer }
    }

    /// Build the scene. Fails without returning anything when an asset can't
    /// be resolved or a primitive is invalid.
    #[tracing::instrument(skip_all)]
    pub fn build(&self, spec: &SceneSpec, backend: &mut dyn Backend) -> Result<BuiltScene> {
        let prepared = self.prepare(spec)?;

        let procedural = upload_group("procedural", prepared.procedural, backend)?;
        let triangles = upload_group("triangles", prepared.triangles, backend)?;
        let lights_group = upload_group("lights", prepared.emitters, backend)?;

        let opaque: Vec<Arc<GeometryGroup>> = procedural.into_iter().chain(triangles).collect();

        let shadower = TopLevelGroup::build("top_shadower", opaque.clone(), backend)?;
        let mut visible_children = opaque.clone();
        visible_children.extend(lights_group.iter().cloned());
        let visible = TopLevelGroup::build("top_object", visible_children, backend)?;

        log::info!(
            "scene built: {} opaque group(s), {} instance(s), {} light(s)",
            opaque.len(),
            visible.instance_count(),
            prepared.lights.len()
        );

        Ok(BuiltScene {
            opaque,
            lights_group,
            shadower,
            visible,
            lights: prepared.lights,
            environment: prepared.environment,
        })
    }

    fn prepare(&self, spec: &SceneSpec) -> Result<Prepared> {
        let diffuse = Material::new("diffuse", MaterialKind::Diffuse);
        let light_material = Material::new("light", MaterialKind::Light);

        let mut procedural = Vec::new();
        let mut triangles = Vec::new();
        for primitive in &spec.primitives {
            match primitive {
                PrimitiveSpec::RaymarchedVolume {
                    center,
                    world_scale,
                    unit_scale,
                    albedo,
                } => procedural.push(GeometryInstance::raymarched_volume(
                    Vec3::from(*center),
                    Vec3::from(*world_scale),
                    Vec3::from(*unit_scale),
                    MaterialBinding::diffuse(&diffuse, Vec3::from(*albedo)),
                )?),
                PrimitiveSpec::Sphere { center, radius, albedo } => procedural.push(GeometryInstance::sphere(
                    Vec3::from(*center),
                    *radius,
                    MaterialBinding::diffuse(&diffuse, Vec3::from(*albedo)),
                )?),
                PrimitiveSpec::Mesh {
                    path,
                    translate,
                    scale,
                    albedo,
                } => {
                    let file = self.resolver.resolve(path)?;
                    let transform = mesh_transform(Vec3::from(*translate), Vec3::from(*scale));
                    let mesh = self.importer.load_mesh(&file, transform)?;
                    triangles.push(GeometryInstance::triangle_mesh(
                        Arc::new(mesh),
                        MaterialBinding::diffuse(&diffuse, Vec3::from(*albedo)),
                    ));
                }
            }
        }

        let mut lights = LightRegistry::new();
        let mut emitters = Vec::new();
        for light in &spec.lights {
            match light {
                LightSpec::Sphere {
                    position,
                    radius,
                    emission,
                } => {
                    let (position, emission) = (Vec3::from(*position), Vec3::from(*emission));
                    let id = lights.register(Light::sphere(position, *radius, emission))?;
                    emitters.push(GeometryInstance::sphere(
                        position,
                        *radius,
                        MaterialBinding::light(&light_material, emission, id),
                    )?);
                }
            }
        }

        let environment = match &spec.environment {
            Some(name) => Some(Arc::new(EnvironmentMap::load(&self.resolver.resolve(name)?)?)),
            None => None,
        };

        Ok(Prepared {
            procedural,
            triangles,
            emitters,
            lights,
            environment,
        })
    }
}

/// Create geometry and the acceleration structure for one group; empty
/// groups are skipped.
fn upload_group(
    name: &str,
    instances: Vec<GeometryInstance>,
    backend: &mut dyn Backend,
) -> Result<Option<Arc<GeometryGroup>>> {
    if instances.is_empty() {
        return Ok(None);
    }
    let mut group = GeometryGroup::new(name);
    for gi in instances {
        group.add(backend, gi)?;
    }
    group.rebuild(backend)?;
    Ok(Some(Arc::new(group)))
}
