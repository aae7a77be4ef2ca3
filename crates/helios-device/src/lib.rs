//! Device interface and shader dispatch for the Helios renderer.
//!
//! This crate owns everything the JIT-compiled shader variants touch at
//! runtime:
//! - Device memory residency (host or GPU) and the grow-only buffers
//! - Structure-of-arrays ray stream buffers with payload extension
//! - Framebuffer and AOV accumulators
//! - Scene database residency caches (BVHs, tables, images, buffers)
//! - The per-thread scratch pool and the shader dispatch machinery
//! - The `extern "C"` surface generated shaders call back into
//!
//! The [`Device`] front door is created by the runtime; behind it sits
//! a process-wide [`interface::Interface`] singleton the ABI functions
//! resolve against.

pub mod abi;
pub mod backend;
pub mod cache;
pub mod debug;
pub mod device;
pub mod error;
pub mod fenv;
pub mod framebuffer;
pub mod interface;
pub mod scratch;
pub mod settings;
pub mod shader;
pub mod stream;

pub use device::{AovAccessor, Denoiser, Device, RenderSettings, SceneSettings, SetupSettings};
pub use error::{DeviceError, Result};
pub use settings::{DriverSettings, SceneInfoAbi, StreamRay, WorkInfo};
pub use shader::{
    AdvancedShadowShaderFn, BakeShaderFn, CallbackShaderFn, DeviceShaderFn, HitShaderFn,
    ImageInfoShaderFn, MissShaderFn, RayGenShaderFn, ShaderSet, ShaderSlot, TonemapShaderFn,
    TraversalShaderFn,
};
