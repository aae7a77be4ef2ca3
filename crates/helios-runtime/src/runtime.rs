//! The runtime front door.

use std::path::Path;
use std::sync::Arc;

use glam::{Vec3, Vec4};
use helios_core::{
    BoundingBox, CameraOrientation, ImageInfoOutput, ImageInfoSettings, ParameterSet, Ray, Target,
    TonemapSettings,
};
use helios_device::{
    AovAccessor, Denoiser, Device, RenderSettings, SceneSettings, SetupSettings, ShaderSet,
};
use helios_scene::{LoaderOptions, SceneDatabase, SceneLoader, TechniqueInfo, TechniqueVariant};
use helios_stats::Statistics;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::compiler::ScriptCompiler;
use crate::error::{Result, RuntimeError};
use crate::options::RuntimeOptions;
use crate::shader::compile_shader_set;

/// Recommended samples per iteration for a target and film size.
///
/// Measured against a 1000×1000 baseline; scene content is ignored.
fn recommend_spi(target: &Target, width: usize, height: usize, interactive: bool) -> usize {
    let mut spi_f = if target.is_cpu() { 2.0f32 } else { 8.0f32 };
    if interactive {
        spi_f /= 2.0;
    }
    let spi = (spi_f / ((width as f32 / 1000.0) * (height as f32 / 1000.0))).ceil() as usize;
    spi.clamp(1, 64)
}

/// The renderer front door: load → compile → iterate.
pub struct Runtime {
    options: RuntimeOptions,
    loader: Box<dyn SceneLoader>,
    compiler: Box<dyn ScriptCompiler>,
    denoiser: Option<Box<dyn Denoiser>>,

    device: Option<Device>,
    database: Option<Arc<SceneDatabase>>,
    globals: Arc<RwLock<ParameterSet>>,

    samples_per_iteration: usize,
    current_iteration: usize,
    current_sample_count: usize,
    current_frame: usize,

    film_width: usize,
    film_height: usize,

    camera_name: String,
    technique_name: String,
    technique_info: TechniqueInfo,
    initial_camera_orientation: CameraOrientation,
    resource_map: Arc<Vec<String>>,

    variants: Vec<TechniqueVariant>,
    shader_sets: Vec<Arc<ShaderSet>>,
}

impl Runtime {
    /// Create a runtime with its loader and compiler collaborators.
    #[must_use]
    pub fn new(
        options: RuntimeOptions,
        loader: Box<dyn SceneLoader>,
        compiler: Box<dyn ScriptCompiler>,
    ) -> Self {
        info!("Using target {}", options.target);
        Self {
            options,
            loader,
            compiler,
            denoiser: None,
            device: None,
            database: None,
            globals: Arc::new(RwLock::new(ParameterSet::new())),
            samples_per_iteration: 0,
            current_iteration: 0,
            current_sample_count: 0,
            current_frame: 0,
            film_width: 0,
            film_height: 0,
            camera_name: String::new(),
            technique_name: String::new(),
            technique_info: TechniqueInfo::default(),
            initial_camera_orientation: CameraOrientation::default(),
            resource_map: Arc::new(Vec::new()),
            variants: Vec::new(),
            shader_sets: Vec::new(),
        }
    }

    /// Attach the denoiser collaborator.
    #[must_use]
    pub fn with_denoiser(mut self, denoiser: Box<dyn Denoiser>) -> Self {
        self.denoiser = Some(denoiser);
        self
    }

    /// Load a scene description, compile all variants and set up the
    /// device. The runtime refuses to step until this succeeds.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        let lopts = LoaderOptions {
            target: self.options.target,
            technique_type: self.options.override_technique.clone(),
            camera_type: self.options.override_camera.clone(),
            film_width: self.options.override_film_size.0 as usize,
            film_height: self.options.override_film_size.1 as usize,
            samples_per_iteration: self.options.spi as usize,
            is_tracer: self.options.is_tracer,
            enable_tonemapping: self.options.enable_tonemapping,
            specialization: self.options.specialization,
        };

        debug!("Loading scene");
        let result = self.loader.load(path, &lopts)?;

        self.film_width = result.film_width.max(1);
        self.film_height = result.film_height.max(1);
        self.camera_name = result.camera_type;
        self.technique_name = result.technique_type;
        self.technique_info = result.technique_info;
        self.initial_camera_orientation = result.camera_orientation;
        self.resource_map = Arc::new(result.resource_map);
        self.variants = result.variants;
        self.database = Some(Arc::new(result.database));

        self.samples_per_iteration = if self.options.spi == 0 {
            recommend_spi(
                &self.options.target,
                self.film_width,
                self.film_height,
                self.options.is_interactive,
            )
        } else {
            self.options.spi as usize
        };
        debug!(
            "Recommended samples per iteration = {}",
            self.samples_per_iteration
        );

        if self.options.denoise && self.denoiser.is_some() {
            info!("Using denoiser");
            self.technique_info
                .enabled_aovs
                .push("Denoised".to_string());
        }

        self.set_camera_orientation(self.initial_camera_orientation);
        self.setup()
    }

    fn setup(&mut self) -> Result<()> {
        debug!("Init device");
        // Tear a previous device down first; only one may exist
        self.device = None;
        let device = Device::new(SetupSettings {
            target: self.options.target,
            acquire_stats: self.options.acquire_stats,
            debug_trace: self.options.debug_trace,
        })?;

        let database = self.database.clone().ok_or(RuntimeError::NoSceneLoaded)?;
        device.assign_scene(SceneSettings {
            database,
            aov_map: self.technique_info.enabled_aovs.clone(),
            resource_map: Arc::clone(&self.resource_map),
        });

        self.compile_shaders()?;

        device.resize(self.film_width, self.film_height);
        device.clear_all_framebuffers();
        self.device = Some(device);
        Ok(())
    }

    fn compile_shaders(&mut self) -> Result<()> {
        let start = std::time::Instant::now();
        let compiler = self.compiler.as_ref();
        let enable_tonemapping = self.options.enable_tonemapping;
        let sets = self
            .variants
            .iter()
            .enumerate()
            .map(|(i, variant)| {
                compile_shader_set(compiler, i, variant, enable_tonemapping).map(Arc::new)
            })
            .collect::<Result<_>>()?;
        self.shader_sets = sets;
        debug!(
            "Compiling shaders took {:.3} seconds",
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }

    /// Run one iteration in non-tracing mode.
    pub fn step(&mut self, ignore_denoiser: bool) {
        if self.options.is_tracer {
            error!("Trying to use step() in a trace session!");
            return;
        }
        if self.variants.is_empty() {
            error!("No scene loaded!");
            return;
        }
        if self.device.is_none() {
            error!("Device not setup!");
            return;
        }

        if let Some(selector) = self.technique_info.variant_selector {
            let active = selector(self.current_iteration);
            debug_assert!(!active.is_empty(), "selector returned no variants");
            for (i, &variant) in active.iter().enumerate() {
                self.step_variant(ignore_denoiser, variant, i == active.len() - 1);
            }
        } else {
            let count = self.variants.len();
            for i in 0..count {
                self.step_variant(ignore_denoiser, i, i == count - 1);
            }
        }

        self.current_iteration += 1;
    }

    fn step_variant(&mut self, mut ignore_denoiser: bool, variant: usize, last_variant: bool) {
        debug_assert!(variant < self.variants.len(), "variant out of range");
        let info = self.technique_info.variants[variant].clone();

        // Only apply the denoiser after the final pass
        if !last_variant {
            ignore_denoiser = true;
        }

        let spi = info.spi(self.samples_per_iteration);
        let settings = RenderSettings {
            rays: None,
            spi,
            width: self.film_width,
            height: self.film_height,
            work_width: info.width(self.film_width),
            work_height: info.height(self.film_height),
            iteration: self.current_iteration,
            frame: self.current_frame,
            seed: self.options.seed,
            info: info.clone(),
            apply_denoiser: self.options.denoise && self.denoiser.is_some() && !ignore_denoiser,
        };

        self.set_parameter_i32("__spi", spi as i32);
        let device = self.device.as_ref().expect("device is set up");
        device.render(
            &self.shader_sets[variant],
            settings,
            &self.globals,
            self.denoiser.as_deref(),
        );

        if !info.lock_framebuffer {
            self.current_sample_count += spi;
        }
    }

    /// Run one iteration in tracing mode. Results land in the
    /// framebuffer, one pixel per ray.
    pub fn trace(&mut self, rays: &[Ray]) {
        if !self.options.is_tracer {
            error!("Trying to use trace() in a camera session!");
            return;
        }
        if self.variants.is_empty() {
            error!("No scene loaded!");
            return;
        }
        if self.device.is_none() {
            error!("Device not setup!");
            return;
        }

        let ray_list = Arc::new(rays.to_vec());
        if let Some(selector) = self.technique_info.variant_selector {
            for variant in selector(self.current_iteration) {
                self.trace_variant(&ray_list, variant);
            }
        } else {
            for variant in 0..self.variants.len() {
                self.trace_variant(&ray_list, variant);
            }
        }

        self.current_iteration += 1;
    }

    /// Tracing mode returning the radiance triplets of each ray.
    pub fn trace_into(&mut self, rays: &[Ray], data: &mut Vec<f32>) {
        self.trace(rays);

        let accessor = self.framebuffer("");
        if accessor.is_null() {
            data.clear();
            return;
        }
        let wanted = rays.len() * 3;
        let available = wanted.min(accessor.len);
        data.resize(wanted, 0.0);
        unsafe {
            data[..available].copy_from_slice(&accessor.as_slice()[..available]);
        }
    }

    fn trace_variant(&mut self, rays: &Arc<Vec<Ray>>, variant: usize) {
        debug_assert!(variant < self.variants.len(), "variant out of range");
        let info = self.technique_info.variants[variant].clone();

        let spi = info.spi(self.samples_per_iteration);
        let settings = RenderSettings {
            rays: Some(Arc::clone(rays)),
            spi,
            width: self.film_width,
            height: self.film_height,
            work_width: rays.len(),
            work_height: 1,
            iteration: self.current_iteration,
            frame: self.current_frame,
            seed: self.options.seed,
            info: info.clone(),
            apply_denoiser: false,
        };

        self.set_parameter_i32("__spi", spi as i32);
        let device = self.device.as_ref().expect("device is set up");
        device.render(&self.shader_sets[variant], settings, &self.globals, None);

        if !info.lock_framebuffer {
            self.current_sample_count += spi;
        }
    }

    /// Resize the framebuffer, clear it and reset rendering.
    pub fn resize_framebuffer(&mut self, width: usize, height: usize) {
        let Some(device) = self.device.as_ref() else {
            error!("Device not setup!");
            return;
        };
        self.film_width = width;
        self.film_height = height;
        device.resize(width, height);
        self.reset();
    }

    /// Access a framebuffer; empty or "Color" selects the main
    /// accumulator.
    #[must_use]
    pub fn framebuffer(&self, name: &str) -> AovAccessor {
        self.device
            .as_ref()
            .map_or(AovAccessor::null(), |device| device.framebuffer(name))
    }

    /// Clear all framebuffers.
    pub fn clear_framebuffer(&self) {
        if let Some(device) = self.device.as_ref() {
            device.clear_all_framebuffers();
        }
    }

    /// Clear one framebuffer.
    pub fn clear_framebuffer_by_name(&self, name: &str) {
        if let Some(device) = self.device.as_ref() {
            device.clear_framebuffer(name);
        }
    }

    /// Reset iteration and sample counters and clear the framebuffers.
    /// The frame counter is kept.
    pub fn reset(&mut self) {
        self.clear_framebuffer();
        self.current_iteration = 0;
        self.current_sample_count = 0;
    }

    /// Tonemap into `out_pixels` (one packed `u32` per pixel).
    pub fn tonemap(&self, out_pixels: &mut [u32], settings: &TonemapSettings) {
        if self.variants.is_empty() {
            error!("No scene loaded!");
            return;
        }
        if let Some(device) = self.device.as_ref() {
            device.tonemap(out_pixels, settings);
        }
    }

    /// Aggregate image statistics of a framebuffer.
    #[must_use]
    pub fn imageinfo(&self, settings: &ImageInfoSettings) -> ImageInfoOutput {
        if self.variants.is_empty() {
            error!("No scene loaded!");
            return ImageInfoOutput::default();
        }
        self.device
            .as_ref()
            .map_or_else(ImageInfoOutput::default, |device| {
                device.imageinfo(settings)
            })
    }

    /// Merged statistics, when enabled.
    #[must_use]
    pub fn statistics(&self) -> Option<Statistics> {
        if !self.options.acquire_stats {
            return None;
        }
        self.device.as_ref().map(Device::statistics)
    }

    // ------------------------------------------------- parameters

    pub fn set_parameter_i32(&self, name: &str, value: i32) {
        self.globals.write().set_int(name, value);
    }

    pub fn set_parameter_f32(&self, name: &str, value: f32) {
        self.globals.write().set_float(name, value);
    }

    pub fn set_parameter_vector(&self, name: &str, value: Vec3) {
        self.globals.write().set_vector(name, value);
    }

    pub fn set_parameter_color(&self, name: &str, value: Vec4) {
        self.globals.write().set_color(name, value);
    }

    /// Publish a camera orientation through the built-in parameters.
    pub fn set_camera_orientation(&self, orientation: CameraOrientation) {
        self.set_parameter_vector("__camera_eye", orientation.eye);
        self.set_parameter_vector("__camera_dir", orientation.dir);
        self.set_parameter_vector("__camera_up", orientation.up);
    }

    // -------------------------------------------------- accessors

    #[must_use]
    pub fn aovs(&self) -> &[String] {
        &self.technique_info.enabled_aovs
    }

    #[must_use]
    pub fn current_iteration_count(&self) -> usize {
        self.current_iteration
    }

    #[must_use]
    pub fn current_sample_count(&self) -> usize {
        self.current_sample_count
    }

    #[must_use]
    pub fn current_frame_count(&self) -> usize {
        self.current_frame
    }

    /// Increase the frame count (interactive sessions only).
    pub fn inc_frame_count(&mut self) {
        self.current_frame += 1;
    }

    #[must_use]
    pub fn technique(&self) -> &str {
        &self.technique_name
    }

    #[must_use]
    pub fn camera(&self) -> &str {
        &self.camera_name
    }

    #[must_use]
    pub fn is_trace(&self) -> bool {
        self.options.is_tracer
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.options.target
    }

    /// Approximate samples per iteration across the active variants.
    #[must_use]
    pub fn samples_per_iteration(&self) -> usize {
        self.technique_info
            .compute_spi(0, self.samples_per_iteration)
    }

    #[must_use]
    pub fn scene_bounding_box(&self) -> BoundingBox {
        self.database
            .as_ref()
            .map_or_else(BoundingBox::empty, |db| db.scene_bbox)
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> usize {
        self.film_width
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> usize {
        self.film_height
    }

    #[must_use]
    pub fn initial_camera_orientation(&self) -> CameraOrientation {
        self.initial_camera_orientation
    }

    #[must_use]
    pub fn has_denoiser(&self) -> bool {
        self.denoiser.is_some()
    }

    #[must_use]
    pub fn technique_info(&self) -> &TechniqueInfo {
        &self.technique_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spi_recommendation_is_clamped() {
        let cpu = Target::cpu(8, 8);
        // Tiny film: the factor explodes, clamp at 64
        assert_eq!(recommend_spi(&cpu, 64, 64, false), 64);
        // Baseline film: factor 2 for CPU targets
        assert_eq!(recommend_spi(&cpu, 1000, 1000, false), 2);
        assert_eq!(recommend_spi(&cpu, 1000, 1000, true), 1);
        // Huge film: never below one sample
        assert_eq!(recommend_spi(&cpu, 8000, 8000, false), 1);

        let gpu = Target::gpu(helios_core::GpuVendor::Nvidia, 0);
        assert_eq!(recommend_spi(&gpu, 1000, 1000, false), 8);
        assert_eq!(recommend_spi(&gpu, 1000, 1000, true), 4);
    }
}
