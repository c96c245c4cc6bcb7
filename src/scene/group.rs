//! Two-level grouping of geometry instances.

use std::sync::Arc;

use crate::backend::{AccelHandle, AccelInput, Backend, GeometryHandle};
use crate::scene::GeometryInstance;
use crate::util::{Aabb, Error, Result};

/// Instances plus the bottom-level acceleration structure over them.
///
/// Adding an instance marks the structure stale until the next
/// [`rebuild`](Self::rebuild); a stale structure is never handed out.
#[derive(Debug)]
pub struct GeometryGroup {
    name: String,
    instances: Vec<GeometryInstance>,
    handles: Vec<GeometryHandle>,
    accel: Option<AccelHandle>,
    stale: bool,
}

impl GeometryGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: Vec::new(),
            handles: Vec::new(),
            accel: None,
            stale: true,
        }
    }

    /// Create backend geometry for `instance` and take ownership of it.
    pub fn add(&mut self, backend: &mut dyn Backend, instance: GeometryInstance) -> Result<GeometryHandle> {
        let handle = backend.create_geometry(&instance)?;
        self.instances.push(instance);
        self.handles.push(handle);
        self.stale = true;
        Ok(handle)
    }

    /// Rebuild the acceleration structure over the current members.
    pub fn rebuild(&mut self, backend: &mut dyn Backend) -> Result<AccelHandle> {
        let accel = backend.create_acceleration(AccelInput::Geometry(&self.handles))?;
        log::debug!("group '{}': acceleration over {} instance(s)", self.name, self.handles.len());
        self.accel = Some(accel);
        self.stale = false;
        Ok(accel)
    }

    /// Current acceleration structure; errors when membership changed since
    /// the last rebuild.
    pub fn acceleration(&self) -> Result<AccelHandle> {
        match self.accel {
            Some(accel) if !self.stale => Ok(accel),
            _ => Err(Error::StaleAcceleration(self.name.clone())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instances(&self) -> &[GeometryInstance] {
        &self.instances
    }

    pub fn handles(&self) -> &[GeometryHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn contains_emissive(&self) -> bool {
        self.instances.iter().any(GeometryInstance::is_emissive)
    }

    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        for gi in &self.instances {
            b.expand_by_box(&gi.bounds());
        }
        b
    }
}

/// Top-level hierarchy over shared geometry groups.
#[derive(Debug)]
pub struct TopLevelGroup {
    name: String,
    children: Vec<Arc<GeometryGroup>>,
    accel: AccelHandle,
}

impl TopLevelGroup {
    /// Build the top-level structure; every child must be up to date.
    pub fn build(name: impl Into<String>, children: Vec<Arc<GeometryGroup>>, backend: &mut dyn Backend) -> Result<Self> {
        let name = name.into();
        let handles = children
            .iter()
            .map(|child| child.acceleration())
            .collect::<Result<Vec<_>>>()?;
        let accel = backend.create_acceleration(AccelInput::Groups(&handles))?;
        log::debug!("top-level '{name}': {} child group(s)", children.len());
        Ok(Self { name, children, accel })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Arc<GeometryGroup>] {
        &self.children
    }

    pub fn acceleration(&self) -> AccelHandle {
        self.accel
    }

    pub fn contains_emissive(&self) -> bool {
        self.children.iter().any(|c| c.contains_emissive())
    }

    /// Total instance count across children.
    pub fn instance_count(&self) -> usize {
        self.children.iter().map(|c| c.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockAccel;
    use crate::backend::MockBackend;
    use crate::scene::{Material, MaterialBinding, MaterialKind};
    use crate::util::Vec3;

    fn sphere(x: f32) -> GeometryInstance {
        let m = Material::new("diffuse", MaterialKind::Diffuse);
        GeometryInstance::sphere(Vec3::new(x, 0.0, 0.0), 1.0, MaterialBinding::diffuse(&m, Vec3::ONE)).unwrap()
    }

    #[test]
    fn test_stale_until_rebuilt() {
        let mut mock = MockBackend::new();
        let mut group = GeometryGroup::new("opaque");
        group.add(&mut mock, sphere(0.0)).unwrap();
        assert!(matches!(group.acceleration(), Err(Error::StaleAcceleration(_))));

        let accel = group.rebuild(&mut mock).unwrap();
        assert_eq!(group.acceleration().unwrap(), accel);

        group.add(&mut mock, sphere(3.0)).unwrap();
        assert!(group.is_stale());
        assert!(group.acceleration().is_err());
        group.rebuild(&mut mock).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.bounds().max.x, 4.0);
    }

    #[test]
    fn test_top_level_rejects_stale_child() {
        let mut mock = MockBackend::new();
        let mut group = GeometryGroup::new("opaque");
        group.add(&mut mock, sphere(0.0)).unwrap();
        let r = TopLevelGroup::build("top", vec![Arc::new(group)], &mut mock);
        assert!(matches!(r, Err(Error::StaleAcceleration(name)) if name == "opaque"));
    }

    #[test]
    fn test_top_level_references_child_accels() {
        let mut mock = MockBackend::new();
        let mut a = GeometryGroup::new("a");
        a.add(&mut mock, sphere(0.0)).unwrap();
        let a_accel = a.rebuild(&mut mock).unwrap();
        let mut b = GeometryGroup::new("b");
        b.add(&mut mock, sphere(5.0)).unwrap();
        let b_accel = b.rebuild(&mut mock).unwrap();

        let top = TopLevelGroup::build("top", vec![Arc::new(a), Arc::new(b)], &mut mock).unwrap();
        assert_eq!(top.instance_count(), 2);
        assert_eq!(
            mock.acceleration(top.acceleration()),
            Some(&MockAccel::Groups(vec![a_accel, b_accel]))
        );
    }
}
