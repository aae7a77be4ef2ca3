//! Compiled shader sets and their function pointer signatures.
//!
//! The compiler collaborator turns shader source into entry points with
//! these exact C signatures; the device calls through them and the
//! shaders call back through the [`crate::abi`] surface.

use std::sync::Arc;

use helios_core::ParameterSet;
use parking_lot::RwLock;

use crate::settings::{
    DriverSettings, ImageInfoOutputAbi, ImageInfoParams, TonemapParams,
};

/// Top-level per-variant driver routine.
pub type DeviceShaderFn = unsafe extern "C" fn(settings: *const DriverSettings);

/// Callback shader (before/after iteration), same shape as the device shader.
pub type CallbackShaderFn = DeviceShaderFn;

/// Bake/pass utility shader.
pub type BakeShaderFn = DeviceShaderFn;

/// Primary or secondary traversal over `size` rays.
pub type TraversalShaderFn = unsafe extern "C" fn(settings: *const DriverSettings, size: i32);

/// Ray generation for the work rectangle; returns the number of rays emitted.
pub type RayGenShaderFn = unsafe extern "C" fn(
    settings: *const DriverSettings,
    next_id: i32,
    size: i32,
    xmin: i32,
    ymin: i32,
    xmax: i32,
    ymax: i32,
) -> i32;

/// Miss shader over the ray range `[first, last)`.
pub type MissShaderFn =
    unsafe extern "C" fn(settings: *const DriverSettings, first: i32, last: i32);

/// Hit shader for one entity/material over the ray range `[first, last)`.
pub type HitShaderFn = unsafe extern "C" fn(
    settings: *const DriverSettings,
    entity_id: i32,
    material_id: i32,
    first: i32,
    last: i32,
);

/// Advanced shadow hit or miss shader.
pub type AdvancedShadowShaderFn = unsafe extern "C" fn(
    settings: *const DriverSettings,
    material_id: i32,
    first: i32,
    last: i32,
);

/// Tonemap shader mapping the float accumulator to packed 8-bit pixels.
pub type TonemapShaderFn = unsafe extern "C" fn(
    settings: *const DriverSettings,
    in_pixels: *const f32,
    out_pixels: *mut u32,
    width: i32,
    height: i32,
    params: *const TonemapParams,
);

/// Imageinfo shader aggregating image statistics.
pub type ImageInfoShaderFn = unsafe extern "C" fn(
    settings: *const DriverSettings,
    in_pixels: *const f32,
    width: i32,
    height: i32,
    params: *const ImageInfoParams,
    output: *mut ImageInfoOutputAbi,
);

/// One compiled shader plus its local parameter registry.
///
/// Local registries are filled at compile time and read-only from the
/// shader's perspective; the shared lock exists for the rare explicit
/// set through the ABI.
#[derive(Clone)]
pub struct ShaderSlot<F> {
    pub exec: F,
    pub local_registry: Arc<RwLock<ParameterSet>>,
}

impl<F> ShaderSlot<F> {
    pub fn new(exec: F, local_registry: ParameterSet) -> Self {
        Self {
            exec,
            local_registry: Arc::new(RwLock::new(local_registry)),
        }
    }
}

/// All compiled shaders of one technique variant.
///
/// The hit vector is indexed by material id; advanced shadow vectors
/// are empty unless the variant uses advanced shadow handling.
#[derive(Clone)]
pub struct ShaderSet {
    pub id: u32,
    pub device: ShaderSlot<DeviceShaderFn>,
    pub primary_traversal: ShaderSlot<TraversalShaderFn>,
    pub secondary_traversal: ShaderSlot<TraversalShaderFn>,
    pub ray_generation: ShaderSlot<RayGenShaderFn>,
    pub miss: ShaderSlot<MissShaderFn>,
    pub hits: Vec<ShaderSlot<HitShaderFn>>,
    pub advanced_shadow_hits: Vec<ShaderSlot<AdvancedShadowShaderFn>>,
    pub advanced_shadow_misses: Vec<ShaderSlot<AdvancedShadowShaderFn>>,
    pub callbacks: [Option<ShaderSlot<CallbackShaderFn>>; 2],
    pub tonemap: Option<ShaderSlot<TonemapShaderFn>>,
    pub imageinfo: Option<ShaderSlot<ImageInfoShaderFn>>,
    pub bake: Option<ShaderSlot<BakeShaderFn>>,
}

impl ShaderSet {
    /// Whether both advanced shadow shader families are present.
    #[must_use]
    pub fn has_advanced_shadow_handling(&self) -> bool {
        !self.advanced_shadow_hits.is_empty() && !self.advanced_shadow_misses.is_empty()
    }
}
