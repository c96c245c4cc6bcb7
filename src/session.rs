//! Render session: the single owner of backend, scene, lights, camera and
//! accumulation state.
//!
//! Construction order:
//!
//! ```text
//! render settings ─► resize_output ─► SceneBuilder::build ─► lights.commit
//!   ─► bind top_object / top_shadower / envmap ─► camera pose ─► validate
//! ```
//!
//! Any failure aborts construction; no partially built session exists.

use std::sync::Arc;

use crate::accumulation::FrameCounter;
use crate::backend::{bindings, Backend, BufferData, OutputBuffer};
use crate::camera::CameraController;
use crate::light::LightRegistry;
use crate::scene::{AssetResolver, BuiltScene, MeshImporter, SceneBuilder, SceneSpec};
use crate::util::{Error, Result};

pub struct RenderSession<B: Backend> {
    backend: B,
    scene: BuiltScene,
    camera: CameraController,
    frames: FrameCounter,
    width: u32,
    height: u32,
}

impl<B: Backend> RenderSession<B> {
    #[tracing::instrument(skip(backend, spec, importer, resolver))]
    pub fn new(
        mut backend: B,
        spec: &SceneSpec,
        width: u32,
        height: u32,
        importer: &dyn MeshImporter,
        resolver: &AssetResolver,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::config(format!("invalid image size {width}x{height}")));
        }

        let settings = spec.render;
        backend.bind_buffer(bindings::MAX_DEPTH, BufferData::Uint(settings.max_depth))?;
        backend.bind_buffer(bindings::SAMPLE_PER_LAUNCH, BufferData::Uint(settings.sample_per_launch))?;
        backend.bind_buffer(bindings::RR_BEGIN_DEPTH, BufferData::Uint(settings.rr_begin_depth))?;
        backend.bind_buffer(bindings::SCENE_EPSILON, BufferData::Float(settings.scene_epsilon))?;
        backend.resize_output(width, height)?;

        let mut scene = SceneBuilder::new(resolver, importer).build(spec, &mut backend)?;
        scene.lights.commit(&mut backend)?;
        backend.bind_buffer(bindings::TOP_OBJECT, BufferData::Accel(scene.visible.acceleration()))?;
        backend.bind_buffer(bindings::TOP_SHADOWER, BufferData::Accel(scene.shadower.acceleration()))?;
        if let Some(env) = &scene.environment {
            backend.bind_buffer(bindings::ENVMAP, BufferData::Environment(Arc::clone(env)))?;
        }

        let cam = &spec.camera;
        let camera = CameraController::new(cam.eye(), cam.lookat(), cam.up(), cam.fov, width, height)?;

        backend.validate()?;
        log::info!("session ready: {width}x{height}, {} light(s)", scene.lights.len());

        Ok(Self {
            backend,
            scene,
            camera,
            frames: FrameCounter::new(),
            width,
            height,
        })
    }

    /// Tick the camera; a change schedules an accumulation reset.
    pub fn sync_camera(&mut self) -> Result<bool> {
        let reset = self.camera.tick(&mut self.backend)?;
        if reset {
            self.frames.request_reset();
        }
        Ok(reset)
    }

    /// Advance and publish the frame number.
    pub fn advance_frame(&mut self) -> Result<u32> {
        let frame_number = self.frames.advance();
        self.backend.bind_buffer(bindings::FRAME_NUMBER, BufferData::Uint(frame_number))?;
        Ok(frame_number)
    }

    /// Launch one pass over the full output.
    pub fn launch(&mut self) -> Result<()> {
        self.backend.launch(self.width, self.height)
    }

    /// Camera tick, frame advance and launch. Returns the frame number.
    pub fn render_frame(&mut self) -> Result<u32> {
        self.sync_camera()?;
        let frame_number = self.advance_frame()?;
        self.launch()?;
        Ok(frame_number)
    }

    /// Reallocate the output for a new viewport. Same size is a no-op and
    /// returns false; sizes are clamped to at least one pixel.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        self.backend.resize_output(width, height)?;
        self.camera.resize(width, height);
        self.width = width;
        self.height = height;
        log::debug!("resized to {width}x{height}");
        Ok(true)
    }

    pub fn output(&self) -> &OutputBuffer {
        self.backend.output()
    }

    /// Last frame number published, 0 before the first frame.
    pub fn frame_number(&self) -> u32 {
        self.frames.current()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn scene(&self) -> &BuiltScene {
        &self.scene
    }

    pub fn lights(&self) -> &LightRegistry {
        &self.scene.lights
    }

    /// Tear down, handing the backend back.
    pub fn finish(self) -> B {
        log::debug!("session finished after frame {}", self.frames.current());
        self.backend
    }
}
