//! Execution backend capability interface.
//!
//! The host-side orchestration (scene builder, light registry, camera,
//! accumulation loop) talks to the ray tracing engine only through the
//! [`Backend`] trait:
//!
//! ```text
//! create_geometry ─┐
//! create_acceleration ─► top_object / top_shadower ─┐
//! bind_buffer (lights, camera, frame_number) ───────┼─► launch(w, h) ─► output()
//! resize_output ────────────────────────────────────┘
//! ```
//!
//! [`mock::MockBackend`] records calls for device-free tests;
//! [`cpu::CpuBackend`] executes the scene in software.

pub mod cpu;
pub mod mock;

use std::sync::Arc;

use crate::camera::CameraUniform;
use crate::scene::environment::EnvironmentMap;
use crate::scene::GeometryInstance;
use crate::util::Result;

pub use cpu::CpuBackend;
pub use mock::MockBackend;

/// Well-known binding names shared with the shading stage.
pub mod bindings {
    pub const LIGHT_PARAMETERS: &str = "sysLightParameters";
    pub const NUMBER_OF_LIGHTS: &str = "sysNumberOfLights";
    pub const FRAME_NUMBER: &str = "frame_number";
    pub const CAMERA: &str = "camera";
    pub const TOP_OBJECT: &str = "top_object";
    pub const TOP_SHADOWER: &str = "top_shadower";
    pub const MAX_DEPTH: &str = "max_depth";
    pub const SAMPLE_PER_LAUNCH: &str = "sample_per_launch";
    pub const RR_BEGIN_DEPTH: &str = "rr_begin_depth";
    pub const SCENE_EPSILON: &str = "scene_epsilon";
    pub const ENVMAP: &str = "envmap";
}

/// Opaque handle to a geometry created on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(u32);

impl GeometryHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque handle to an acceleration structure created on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccelHandle(u32);

impl AccelHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Members of an acceleration structure.
#[derive(Debug, Clone, Copy)]
pub enum AccelInput<'a> {
    /// Bottom level: geometries of one group.
    Geometry(&'a [GeometryHandle]),
    /// Top level: acceleration structures of child groups.
    Groups(&'a [AccelHandle]),
}

impl AccelInput<'_> {
    pub fn len(&self) -> usize {
        match self {
            AccelInput::Geometry(h) => h.len(),
            AccelInput::Groups(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Value bound under a well-known name.
#[derive(Debug, Clone)]
pub enum BufferData {
    Uint(u32),
    Int(i32),
    Float(f32),
    /// Fixed-stride record array; consumers index by raw byte offset.
    Records { bytes: Vec<u8>, stride: usize, count: usize },
    Camera(CameraUniform),
    Accel(AccelHandle),
    Environment(Arc<EnvironmentMap>),
}

/// Float4 output buffer: row-major, row 0 at the top.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl OutputBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Capability interface of a ray tracing execution engine.
///
/// All calls are synchronous; `launch` blocks until the frame is complete.
pub trait Backend {
    /// Create backend geometry for one instance. The shape kind selects the
    /// intersection and bounds programs.
    fn create_geometry(&mut self, instance: &GeometryInstance) -> Result<GeometryHandle>;

    /// Build an acceleration structure over geometries or child structures.
    fn create_acceleration(&mut self, input: AccelInput<'_>) -> Result<AccelHandle>;

    /// Bind a value under a well-known name, replacing any previous value.
    fn bind_buffer(&mut self, name: &str, data: BufferData) -> Result<()>;

    /// Reallocate the output buffer, discarding its contents.
    fn resize_output(&mut self, width: u32, height: u32) -> Result<()>;

    /// Check that everything a launch needs is bound.
    fn validate(&mut self) -> Result<()>;

    /// Run one progressive pass over a `width` x `height` launch grid.
    fn launch(&mut self, width: u32, height: u32) -> Result<()>;

    /// Accumulated output.
    fn output(&self) -> &OutputBuffer;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn create_geometry(&mut self, instance: &GeometryInstance) -> Result<GeometryHandle> {
        (**self).create_geometry(instance)
    }

    fn create_acceleration(&mut self, input: AccelInput<'_>) -> Result<AccelHandle> {
        (**self).create_acceleration(input)
    }

    fn bind_buffer(&mut self, name: &str, data: BufferData) -> Result<()> {
        (**self).bind_buffer(name, data)
    }

    fn resize_output(&mut self, width: u32, height: u32) -> Result<()> {
        (**self).resize_output(width, height)
    }

    fn validate(&mut self) -> Result<()> {
        (**self).validate()
    }

    fn launch(&mut self, width: u32, height: u32) -> Result<()> {
        (**self).launch(width, height)
    }

    fn output(&self) -> &OutputBuffer {
        (**self).output()
    }
}
