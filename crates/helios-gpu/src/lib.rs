//! Headless Vulkan residency backend for the Helios renderer.
//!
//! Helios shaders are JIT-compiled host entry points: device memory
//! they touch must be reachable through plain pointers. This crate
//! provides the minimal Vulkan layer for that model:
//! - Instance creation and physical device pick by index
//! - Vendor/capability detection
//! - Host-visible buffer allocation with persistent mapped pointers
//!
//! There is no swapchain, pipeline or descriptor machinery here; the
//! renderer core never records Vulkan commands itself.

pub mod capabilities;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;

pub use capabilities::{GpuCapabilities, Vendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer};
