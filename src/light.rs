//! Light registry and the fixed-layout light parameter buffer.
//!
//! The shading stage reads `sysLightParameters` by raw byte offset, so the
//! record layout below is part of the wire contract:
//!
//! ```text
//! offset  field      type
//!      0  position   3 x f32
//!     12  emission   3 x f32
//!     24  radius     f32
//!     28  area       f32
//!     32  u          3 x f32
//!     44  v          3 x f32
//!     56  normal     3 x f32
//!     68  light_type u32
//!     72  (stride)
//! ```

use bytemuck::{Pod, Zeroable};
use std::f32::consts::PI;

use crate::backend::{bindings, Backend, BufferData};
use crate::util::{Error, Result, Vec3};

/// Byte stride of one [`LightParameter`] record.
pub const LIGHT_PARAMETER_STRIDE: usize = 72;

/// Field offsets inside a record.
pub mod offsets {
    pub const POSITION: usize = 0;
    pub const EMISSION: usize = 12;
    pub const RADIUS: usize = 24;
    pub const AREA: usize = 28;
    pub const U: usize = 32;
    pub const V: usize = 44;
    pub const NORMAL: usize = 56;
    pub const LIGHT_TYPE: usize = 68;
}

const _: () = assert!(std::mem::size_of::<LightParameter>() == LIGHT_PARAMETER_STRIDE);

/// Emitter shape, stored as the record's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    Sphere = 0,
}

impl LightKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(LightKind::Sphere),
            _ => None,
        }
    }
}

/// Light description as supplied by the scene.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub radius: f32,
    pub emission: Vec3,
    pub normal: Vec3,
    pub u: Vec3,
    pub v: Vec3,
}

impl Light {
    pub fn sphere(position: Vec3, radius: f32, emission: Vec3) -> Self {
        Self {
            kind: LightKind::Sphere,
            position,
            radius,
            emission,
            normal: Vec3::ZERO,
            u: Vec3::ZERO,
            v: Vec3::ZERO,
        }
    }
}

/// Packed light record. Only [`LightRegistry::register`] creates these, so
/// `area` is always derived from `radius`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightParameter {
    position: [f32; 3],
    emission: [f32; 3],
    radius: f32,
    area: f32,
    u: [f32; 3],
    v: [f32; 3],
    normal: [f32; 3],
    light_type: u32,
}

impl LightParameter {
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn emission(&self) -> Vec3 {
        Vec3::from(self.emission)
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn u(&self) -> Vec3 {
        Vec3::from(self.u)
    }

    pub fn v(&self) -> Vec3 {
        Vec3::from(self.v)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from(self.normal)
    }

    pub fn kind(&self) -> Option<LightKind> {
        LightKind::from_tag(self.light_type)
    }
}

/// Surface area of a sphere light.
#[inline]
pub fn sphere_area(radius: f32) -> f32 {
    4.0 * PI * radius * radius
}

/// Ordered light records. The index of a record is its light ID.
#[derive(Debug, Default)]
pub struct LightRegistry {
    records: Vec<LightParameter>,
    committed: bool,
}

impl LightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a light, returning its index.
    pub fn register(&mut self, light: Light) -> Result<u32> {
        if self.committed {
            return Err(Error::LightsCommitted);
        }
        if !light.position.is_finite() {
            return Err(Error::InvalidLight(format!("position {:?} is not finite", light.position)));
        }
        if !(light.radius.is_finite() && light.radius > 0.0) {
            return Err(Error::InvalidLight(format!("radius must be positive, got {}", light.radius)));
        }
        if !light.emission.is_finite() || light.emission.min_element() < 0.0 {
            return Err(Error::InvalidLight(format!(
                "emission must be finite and non-negative, got {:?}",
                light.emission
            )));
        }

        let index = self.records.len() as u32;
        self.records.push(LightParameter {
            position: light.position.to_array(),
            emission: light.emission.to_array(),
            radius: light.radius,
            area: sphere_area(light.radius),
            u: light.u.to_array(),
            v: light.v.to_array(),
            normal: light.normal.normalize_or_zero().to_array(),
            light_type: light.kind as u32,
        });
        log::debug!("registered light {index}: {:?} r={}", light.position, light.radius);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&LightParameter> {
        self.records.get(index as usize)
    }

    pub fn records(&self) -> &[LightParameter] {
        &self.records
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Packed records, `LIGHT_PARAMETER_STRIDE` bytes each.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }

    /// Upload the records and the light count. Allowed once.
    pub fn commit(&mut self, backend: &mut dyn Backend) -> Result<()> {
        if self.committed {
            return Err(Error::LightsCommitted);
        }
        backend.bind_buffer(
            bindings::LIGHT_PARAMETERS,
            BufferData::Records {
                bytes: self.as_bytes().to_vec(),
                stride: LIGHT_PARAMETER_STRIDE,
                count: self.records.len(),
            },
        )?;
        backend.bind_buffer(bindings::NUMBER_OF_LIGHTS, BufferData::Int(self.records.len() as i32))?;
        self.committed = true;
        log::info!("committed {} light(s)", self.records.len());
        Ok(())
    }
}

/// Read a light field straight from a packed buffer, the way the shading
/// stage does.
pub fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_le_bytes(raw)
}

/// Read three consecutive f32 values from a packed buffer.
pub fn read_vec3(bytes: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_f32(bytes, offset),
        read_f32(bytes, offset + 4),
        read_f32(bytes, offset + 8),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn two_lights() -> LightRegistry {
        let mut reg = LightRegistry::new();
        reg.register(Light::sphere(Vec3::new(50.0, 310.0, 50.0), 10.0, Vec3::ONE)).unwrap();
        reg.register(Light::sphere(Vec3::new(0.01, 166.787, 190.0), 2.0, Vec3::new(10.0, 0.01, 0.01)))
            .unwrap();
        reg
    }

    #[test]
    fn test_indices_follow_insertion_order() {
        let mut reg = LightRegistry::new();
        assert_eq!(reg.register(Light::sphere(Vec3::ZERO, 1.0, Vec3::ONE)).unwrap(), 0);
        assert_eq!(reg.register(Light::sphere(Vec3::X, 2.0, Vec3::ONE)).unwrap(), 1);
        assert_eq!(reg.get(1).unwrap().position(), Vec3::X);
    }

    #[test]
    fn test_area_derived_from_radius() {
        let reg = two_lights();
        for rec in reg.records() {
            let expected = 4.0 * PI * rec.radius() * rec.radius();
            assert!((rec.area() - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_normal_is_normalized() {
        let mut reg = LightRegistry::new();
        let mut light = Light::sphere(Vec3::ZERO, 1.0, Vec3::ONE);
        light.normal = Vec3::new(0.0, 3.0, 4.0);
        reg.register(light).unwrap();
        assert!((reg.get(0).unwrap().normal().length() - 1.0).abs() < 1e-6);

        // zero normal stays zero instead of turning into NaN
        reg.register(Light::sphere(Vec3::ZERO, 1.0, Vec3::ONE)).unwrap();
        assert_eq!(reg.get(1).unwrap().normal(), Vec3::ZERO);
    }

    #[test]
    fn test_invalid_lights_rejected() {
        let mut reg = LightRegistry::new();
        assert!(reg.register(Light::sphere(Vec3::ZERO, 0.0, Vec3::ONE)).is_err());
        assert!(reg.register(Light::sphere(Vec3::ZERO, 1.0, Vec3::new(-1.0, 0.0, 0.0))).is_err());
        assert!(reg.register(Light::sphere(Vec3::splat(f32::NAN), 1.0, Vec3::ONE)).is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_layout_offsets() {
        let reg = two_lights();
        let bytes = reg.as_bytes();
        assert_eq!(bytes.len(), 2 * LIGHT_PARAMETER_STRIDE);

        let base = LIGHT_PARAMETER_STRIDE;
        assert_eq!(read_vec3(bytes, base + offsets::POSITION), Vec3::new(0.01, 166.787, 190.0));
        assert_eq!(read_vec3(bytes, base + offsets::EMISSION), Vec3::new(10.0, 0.01, 0.01));
        assert_eq!(read_f32(bytes, base + offsets::RADIUS), 2.0);
        assert!((read_f32(bytes, base + offsets::AREA) - sphere_area(2.0)).abs() < 1e-4);
        assert_eq!(read_vec3(bytes, base + offsets::NORMAL), Vec3::ZERO);
        assert_eq!(
            u32::from_le_bytes(bytes[base + offsets::LIGHT_TYPE..base + offsets::LIGHT_TYPE + 4].try_into().unwrap()),
            LightKind::Sphere as u32
        );
    }

    #[test]
    fn test_commit_publishes_count_and_records() {
        let mut reg = two_lights();
        let mut mock = MockBackend::new();
        reg.commit(&mut mock).unwrap();

        match mock.binding(bindings::NUMBER_OF_LIGHTS) {
            Some(BufferData::Int(n)) => assert_eq!(*n, 2),
            other => panic!("unexpected light count binding {other:?}"),
        }
        match mock.binding(bindings::LIGHT_PARAMETERS) {
            Some(BufferData::Records { bytes, stride, count }) => {
                assert_eq!(*stride, LIGHT_PARAMETER_STRIDE);
                assert_eq!(*count, 2);
                assert_eq!(bytes.len(), 2 * LIGHT_PARAMETER_STRIDE);
            }
            other => panic!("unexpected light buffer binding {other:?}"),
        }
    }

    #[test]
    fn test_commit_only_once() {
        let mut reg = two_lights();
        let mut mock = MockBackend::new();
        reg.commit(&mut mock).unwrap();
        assert!(matches!(reg.commit(&mut mock), Err(Error::LightsCommitted)));
        assert!(matches!(
            reg.register(Light::sphere(Vec3::ZERO, 1.0, Vec3::ONE)),
            Err(Error::LightsCommitted)
        ));
        assert_eq!(mock.bind_count(bindings::LIGHT_PARAMETERS), 1);
    }
}
