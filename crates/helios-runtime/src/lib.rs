//! Runtime orchestrator for the Helios renderer.
//!
//! The [`Runtime`] is the front door for applications: it loads a scene
//! through the loader collaborator, compiles each technique variant's
//! shaders through the compiler collaborator, and issues iterations
//! against the device.

pub mod compiler;
pub mod error;
pub mod options;
pub mod runtime;
pub mod shader;

pub use compiler::{entry_points, ScriptCompiler};
pub use error::{Result, RuntimeError};
pub use options::{RuntimeOptions, SpecializationMode};
pub use runtime::Runtime;

pub use helios_device::Denoiser;
