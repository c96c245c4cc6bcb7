//! # redflash
//!
//! Host-side orchestration for a progressive path tracer.
//!
//! A [`session::RenderSession`] builds a scene on an execution [`backend`],
//! publishes sphere lights and camera uniforms, and drives progressive
//! accumulation either interactively (one launch per displayed frame) or in
//! batch mode (a fixed number of launches or a time budget, then one image).
//!
//! ## Modules
//!
//! - [`util`] - Errors, math re-exports, bounding boxes
//! - [`backend`] - Execution backend trait, mock and CPU engines
//! - [`scene`] - Scene description, geometry groups, scene builder
//! - [`light`] - Light registry and fixed-layout light records
//! - [`camera`] - Arcball camera controller
//! - [`accumulation`] - Frame counter, clocks, interactive and batch loops
//! - [`session`] - Render session
//! - [`output`] - Image writing
//! - [`config`] - Command-line configuration
//!
//! ## Example
//!
//! ```ignore
//! use redflash::prelude::*;
//!
//! let resolver = AssetResolver::from_env()?;
//! let mut session = RenderSession::new(
//!     CpuBackend::new(), &SceneSpec::default_scene(), 480, 270, &ObjImporter, &resolver,
//! )?;
//! run_batch(&mut session, &BatchPlan::samples(20), &SystemClock::new(), &mut ImageWriter::new(), "out.png".as_ref())?;
//! ```

pub mod util;
pub mod backend;
pub mod scene;
pub mod light;
pub mod camera;
pub mod accumulation;
pub mod session;
pub mod output;
pub mod config;
pub mod logging;

// Interactive viewer (optional, enabled with "viewer" feature)
#[cfg(feature = "viewer")]
pub mod viewer;

pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::accumulation::{run_batch, run_interactive_frame, BatchPlan, BatchReport, Clock, SystemClock};
    pub use crate::backend::{Backend, CpuBackend, MockBackend, OutputBuffer};
    pub use crate::camera::{CameraController, Drag};
    pub use crate::light::{Light, LightRegistry};
    pub use crate::output::{ImageSink, ImageWriter};
    pub use crate::scene::{AssetResolver, ObjImporter, SceneBuilder, SceneSpec};
    pub use crate::session::RenderSession;
}
