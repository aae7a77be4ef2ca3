//! The runtime-facing device front door.
//!
//! A [`Device`] owns the process-wide interface singleton for its
//! lifetime; the generated shaders reach the same interface through the
//! [`crate::abi`] surface.

use std::sync::Arc;

use helios_core::{
    ImageInfoOutput, ImageInfoSettings, ParameterSet, Ray, Target, TonemapSettings,
};
use helios_scene::{SceneDatabase, TechniqueVariantInfo};
use helios_stats::Statistics;
use parking_lot::RwLock;

use crate::abi;
use crate::error::Result;
use crate::fenv::FlushToZeroGuard;
use crate::interface::Interface;
use crate::shader::{BakeShaderFn, ShaderSet, ShaderSlot};

/// Device construction settings.
#[derive(Debug, Clone)]
pub struct SetupSettings {
    pub target: Target,
    pub acquire_stats: bool,
    /// Log every dispatch at debug level.
    pub debug_trace: bool,
}

/// Scene data handed to the device once after loading.
#[derive(Clone)]
pub struct SceneSettings {
    pub database: Arc<SceneDatabase>,
    /// Names of the AOVs to allocate besides the main framebuffer.
    pub aov_map: Vec<String>,
    /// Resource paths indexed by the ids encoded in generated shaders.
    pub resource_map: Arc<Vec<String>>,
}

/// Per-iteration render settings.
#[derive(Clone, Default)]
pub struct RenderSettings {
    /// Tracer-mode ray list; `work_width` rays, `work_height == 1`.
    pub rays: Option<Arc<Vec<Ray>>>,
    pub spi: usize,
    /// Film size.
    pub width: usize,
    pub height: usize,
    /// Dispatch size, usually the film size unless overridden.
    pub work_width: usize,
    pub work_height: usize,
    pub iteration: usize,
    pub frame: usize,
    pub seed: u32,
    pub info: TechniqueVariantInfo,
    pub apply_denoiser: bool,
}

/// Accessor to one host framebuffer or AOV.
#[derive(Debug, Clone, Copy)]
pub struct AovAccessor {
    pub data: *mut f32,
    /// Pixel count times three channels.
    pub len: usize,
    pub iteration_count: usize,
}

impl AovAccessor {
    #[must_use]
    pub const fn null() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
            iteration_count: 0,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// View the pixels as a slice.
    ///
    /// # Safety
    /// The framebuffer must not be resized or cleared concurrently.
    #[must_use]
    pub unsafe fn as_slice(&self) -> &[f32] {
        if self.data.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }
    }
}

/// Denoiser collaborator, invoked after the final variant of an
/// iteration when a "Denoised" AOV is registered.
pub trait Denoiser: Send + Sync {
    fn denoise(
        &self,
        color: &[f32],
        normals: &[f32],
        albedo: &[f32],
        output: &mut [f32],
        width: usize,
        height: usize,
        iteration_count: usize,
    );
}

/// The device front door. Owns the interface singleton.
pub struct Device {
    interface: Arc<Interface>,
}

impl Device {
    /// Set up the device and install the shader ABI singleton.
    ///
    /// Only one device may exist per process at a time.
    pub fn new(setup: SetupSettings) -> Result<Self> {
        let interface = Arc::new(Interface::new(setup)?);
        abi::install(Arc::clone(&interface))?;
        Ok(Self { interface })
    }

    /// Assign the loaded scene. Recomputes the entity count and AOV set.
    pub fn assign_scene(&self, settings: SceneSettings) {
        self.interface.assign_scene(settings);
    }

    /// Render one iteration of the given variant.
    pub fn render(
        &self,
        shader_set: &Arc<ShaderSet>,
        settings: RenderSettings,
        globals: &Arc<RwLock<ParameterSet>>,
        denoiser: Option<&dyn Denoiser>,
    ) {
        let _fenv = FlushToZeroGuard::new();
        self.interface
            .render(shader_set, settings, globals, denoiser);
    }

    /// Resize the framebuffer and every AOV, resetting iteration counts.
    pub fn resize(&self, width: usize, height: usize) {
        self.interface.resize_framebuffer(width, height);
    }

    /// Access a framebuffer by name; empty or "Color" selects the main
    /// accumulator. Device copies are synchronised to the host first.
    #[must_use]
    pub fn framebuffer(&self, name: &str) -> AovAccessor {
        self.interface.aov_for_host(name)
    }

    /// Clear one framebuffer.
    pub fn clear_framebuffer(&self, name: &str) {
        self.interface.clear_aov(name);
    }

    /// Clear the main framebuffer and every AOV.
    pub fn clear_all_framebuffers(&self) {
        self.interface.clear_all_aovs();
    }

    /// Merge all thread statistics into one aggregate.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.interface.statistics()
    }

    /// Run the tonemap shader into `out_pixels` (one `u32` per pixel).
    pub fn tonemap(&self, out_pixels: &mut [u32], settings: &TonemapSettings) {
        let _fenv = FlushToZeroGuard::new();
        self.interface.tonemap(out_pixels, settings);
    }

    /// Run the imageinfo shader and return the aggregates.
    #[must_use]
    pub fn imageinfo(&self, settings: &ImageInfoSettings) -> ImageInfoOutput {
        let _fenv = FlushToZeroGuard::new();
        self.interface.imageinfo(settings)
    }

    /// Run a bake/pass shader and copy its output buffer to the host.
    pub fn bake(&self, shader: &ShaderSlot<BakeShaderFn>, output: &mut Vec<f32>) {
        let _fenv = FlushToZeroGuard::new();
        self.interface.bake(shader, output);
    }

    /// Drop every residency cache for a mid-life reset.
    pub fn release_all(&self) {
        self.interface.release_all();
    }

    /// The target this device was created for.
    #[must_use]
    pub fn target(&self) -> Target {
        self.interface.target()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        abi::uninstall();
    }
}
