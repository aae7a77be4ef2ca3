//! Runtime configuration.

use helios_core::Target;

pub use helios_scene::SpecializationMode;

/// Options the runtime is constructed with.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Tracer mode: iterations consume explicit ray lists.
    pub is_tracer: bool,
    /// Interactive sessions halve the recommended samples per iteration.
    pub is_interactive: bool,
    /// Compile tonemap and imageinfo shaders.
    pub enable_tonemapping: bool,
    /// Collect per-shader statistics.
    pub acquire_stats: bool,
    /// Log every device dispatch.
    pub debug_trace: bool,
    /// Samples per iteration; zero selects automatically.
    pub spi: u32,
    /// Base random seed.
    pub seed: u32,
    pub target: Target,
    /// Technique override; empty keeps the scene's technique.
    pub override_technique: String,
    /// Camera override; empty keeps the scene's camera.
    pub override_camera: String,
    /// Film size override; zero keeps the scene's film size.
    pub override_film_size: (u32, u32),
    /// Specialization of generated shaders, applied at load time.
    pub specialization: SpecializationMode,
    /// Run the denoiser after the final variant of each iteration.
    pub denoise: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            is_tracer: false,
            is_interactive: false,
            enable_tonemapping: true,
            acquire_stats: false,
            debug_trace: false,
            spi: 0,
            seed: 0,
            target: Target::pick_best(),
            override_technique: String::new(),
            override_camera: String::new(),
            override_film_size: (0, 0),
            specialization: SpecializationMode::default(),
            denoise: false,
        }
    }
}

impl RuntimeOptions {
    /// Default options for tracer or camera mode.
    #[must_use]
    pub fn for_trace(trace: bool) -> Self {
        Self {
            is_tracer: trace,
            ..Default::default()
        }
    }
}
