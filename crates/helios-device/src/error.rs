//! Device error types.

use thiserror::Error;

/// Device-related errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// GPU backend error.
    #[error("GPU error: {0}")]
    Gpu(#[from] helios_gpu::GpuError),

    /// No scene database assigned yet.
    #[error("No scene database assigned")]
    NoScene,

    /// A named resource is missing from the scene database.
    #[error("Unknown {kind} '{name}'")]
    UnknownResource { kind: &'static str, name: String },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, DeviceError>;
