//! Core types for the Helios renderer.
//!
//! This crate provides the foundational types used throughout the renderer:
//! - Execution target description (CPU/GPU, threads, vector width)
//! - Parameter registries consumed by shaders
//! - Bounding box math and shared runtime structs

pub mod math;
pub mod parameters;
pub mod structs;
pub mod target;
pub mod util;

pub use math::BoundingBox;
pub use parameters::ParameterSet;
pub use structs::{CameraOrientation, ImageInfoOutput, ImageInfoSettings, Ray, TonemapSettings};
pub use target::{CpuArchitecture, GpuVendor, Target};
