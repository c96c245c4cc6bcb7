//! Utility types shared across the renderer.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`Aabb`] and camera-frame helpers, plus math re-exports from glam

mod error;
mod math;

pub use error::*;
pub use math::*;
