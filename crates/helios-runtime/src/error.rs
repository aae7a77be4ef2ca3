//! Runtime error types.

use thiserror::Error;

/// Errors surfaced by the runtime front door.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Loading error: {0}")]
    Loader(#[from] helios_scene::LoaderError),

    #[error(transparent)]
    Device(#[from] helios_device::DeviceError),

    #[error("Failed to compile {shader} shader in variant {variant}")]
    ShaderCompile { variant: usize, shader: String },

    #[error("No scene loaded")]
    NoSceneLoaded,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;
