//! Error types for the renderer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scene setup, device execution and output.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad command-line or configuration input
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Asset could not be found in any search location
    #[error("Couldn't open source file {name} (searched {} locations)", searched.len())]
    ResourceNotFound { name: String, searched: Vec<PathBuf> },

    /// Mesh file exists but could not be imported
    #[error("Failed to import mesh {path}: {reason}")]
    MeshImport { path: PathBuf, reason: String },

    /// Scene description is malformed or names an unknown shape kind
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// Light record failed validation
    #[error("Invalid light: {0}")]
    InvalidLight(String),

    /// Light buffer was already uploaded
    #[error("Light parameters are already committed")]
    LightsCommitted,

    /// Acceleration structure queried after group membership changed
    #[error("Acceleration structure of group '{0}' is stale")]
    StaleAcceleration(String),

    /// Execution backend reported a failure
    #[error("Device error: {0}")]
    Device(String),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error from a string.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a device error from a string.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Whether this error belongs to the configuration class (usage + exit).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, Error>;
