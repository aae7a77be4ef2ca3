//! The process-wide device interface.
//!
//! One [`Interface`] exists per [`crate::Device`] lifetime. It owns all
//! device memory, schedules the compiled shaders and serves the
//! resource queries of the `extern "C"` surface in [`crate::abi`].
//!
//! Locking order, where multiple guards are held: scene → film →
//! devices → shader_infos. The per-thread scratch pool is lock-free.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use helios_core::util::round_up;
use helios_core::{
    ImageInfoOutput, ImageInfoSettings, ParameterSet, Target, TonemapSettings,
};
use helios_scene::ShadowHandlingMode;
use helios_stats::{
    Quantity, SectionType, ShaderKey, ShaderType, SmallShaderKey, Statistics,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::backend::{device_id_for_target, DeviceArray, DeviceBackend};
use crate::cache::{
    load_image_file, load_packed_image_file, read_buffer_file, upload_image, upload_packed_image,
    BvhProxy, BvhWidth, DeviceBuffer, DeviceData, DynTableProxy, LoadedImage, LoadedPackedImage,
    ShaderInfo,
};
use crate::debug::{drain_debug_buffer, DEBUG_BUFFER_NAME};
use crate::device::{AovAccessor, Denoiser, RenderSettings, SceneSettings, SetupSettings};
use crate::error::Result;
use crate::framebuffer::Aov;
use crate::scratch::{CpuData, ScratchPool};
use crate::settings::{
    DriverSettings, DynTableData, ImageInfoOutputAbi, ImageInfoParams, PrimaryStreamAbi,
    SceneInfoAbi, SecondaryStreamAbi, StreamRay, TemporaryStorageHost, TonemapParams, WorkInfo,
    MIN_PRIMARY_STREAM_SIZE, MIN_SECONDARY_STREAM_SIZE,
};
use crate::shader::{BakeShaderFn, ShaderSet, ShaderSlot};
use crate::stream::components_per_ray;

/// Name of the bake output buffer a pass shader writes into.
pub const BAKE_OUTPUT_BUFFER_NAME: &str = "__bake_output";

/// The driver settings block shaders read during a dispatch.
///
/// Written only by the coordinator between dispatches; shaders receive
/// a read-only pointer to it.
struct SettingsCell(UnsafeCell<DriverSettings>);

unsafe impl Sync for SettingsCell {}

struct SceneSlot {
    database: Option<Arc<helios_scene::SceneDatabase>>,
    resource_map: Arc<Vec<String>>,
    aov_map: Vec<String>,
    entity_count: usize,
}

struct FilmState {
    width: usize,
    height: usize,
    host: Aov,
    aovs: HashMap<String, Aov>,
}

/// The device interface. See module docs.
pub struct Interface {
    setup: SetupSettings,
    backend: DeviceBackend,
    dev_id: i32,
    is_gpu: bool,

    scene: RwLock<SceneSlot>,
    film: Mutex<FilmState>,
    devices: Mutex<HashMap<i32, Box<DeviceData>>>,
    shader_infos: Mutex<HashMap<ShaderKey, ShaderInfo>>,
    scratch: ScratchPool,

    driver_settings: SettingsCell,
    current_settings: RwLock<RenderSettings>,
    shader_set: RwLock<Option<Arc<ShaderSet>>>,
    globals: RwLock<Option<Arc<RwLock<ParameterSet>>>>,

    /// Monotonic render pass counter, used to invalidate per-pass
    /// uploads such as the tracer ray list.
    render_counter: AtomicU64,
}

impl Interface {
    pub fn new(setup: SetupSettings) -> Result<Self> {
        let backend = DeviceBackend::for_target(&setup.target)?;
        backend.announce();

        let dev_id = device_id_for_target(&setup.target);
        let is_gpu = setup.target.is_gpu();

        let scratch = if is_gpu {
            ScratchPool::new(1, true)
        } else {
            let hw = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
            let req = setup.target.thread_count() as usize;
            ScratchPool::new(req.max(hw) + 1, false)
        };

        let driver = DriverSettings {
            device: dev_id,
            thread_count: setup.target.thread_count() as i32,
            ..Default::default()
        };

        Ok(Self {
            setup,
            backend,
            dev_id,
            is_gpu,
            scene: RwLock::new(SceneSlot {
                database: None,
                resource_map: Arc::new(Vec::new()),
                aov_map: Vec::new(),
                entity_count: 0,
            }),
            film: Mutex::new(FilmState {
                width: 0,
                height: 0,
                host: Aov::default(),
                aovs: HashMap::new(),
            }),
            devices: Mutex::new(HashMap::new()),
            shader_infos: Mutex::new(HashMap::new()),
            scratch,
            driver_settings: SettingsCell(UnsafeCell::new(driver)),
            current_settings: RwLock::new(RenderSettings::default()),
            shader_set: RwLock::new(None),
            globals: RwLock::new(None),
            render_counter: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn target(&self) -> Target {
        self.setup.target
    }

    #[must_use]
    pub const fn device_id(&self) -> i32 {
        self.dev_id
    }

    #[must_use]
    pub const fn is_gpu(&self) -> bool {
        self.is_gpu
    }

    fn driver_settings_ptr(&self) -> *const DriverSettings {
        self.driver_settings.0.get()
    }

    // ------------------------------------------------------- scene

    pub fn assign_scene(&self, settings: SceneSettings) {
        let mut scene = self.scene.write();
        scene.entity_count = settings.database.entity_count();
        scene.database = Some(settings.database);
        scene.resource_map = settings.resource_map;
        scene.aov_map = settings.aov_map;
    }

    fn lookup_resource(&self, id: i32) -> String {
        let scene = self.scene.read();
        scene
            .resource_map
            .get(id as usize)
            .unwrap_or_else(|| panic!("Resource id {id} out of range"))
            .clone()
    }

    // ------------------------------------------------- framebuffer

    /// Lazily allocate the framebuffer once dimensions are known.
    pub fn ensure_framebuffer(&self) {
        let scene = self.scene.read();
        let mut film = self.film.lock();
        if !film.host.data.is_empty() || film.width == 0 || film.height == 0 {
            return;
        }
        Self::setup_framebuffer(&mut film, &scene.aov_map, &self.backend);
    }

    fn setup_framebuffer(film: &mut FilmState, aov_map: &[String], backend: &DeviceBackend) {
        let (width, height) = (film.width, film.height);
        film.host.allocate(backend, width, height, "framebuffer");

        film.aovs.clear();
        for name in aov_map {
            let mut aov = Aov::default();
            aov.allocate(backend, width, height, name);
            // Denoised output is produced on the host and never copied
            // back from the device
            aov.host_only = name == "Denoised";
            film.aovs.insert(name.clone(), aov);
        }
    }

    pub fn resize_framebuffer(&self, width: usize, height: usize) {
        assert!(width > 0 && height > 0, "film size must be non-zero");

        let scene = self.scene.read();
        let mut film = self.film.lock();
        if film.width == width && film.height == height && !film.host.data.is_empty() {
            return;
        }
        film.width = width;
        film.height = height;
        Self::setup_framebuffer(&mut film, &scene.aov_map, &self.backend);
    }

    fn reset_framebuffer_access(&self) {
        let mut film = self.film.lock();
        film.host.mapped = false;
        for aov in film.aovs.values_mut() {
            aov.mapped = false;
        }
    }

    /// Device-side pointer to the main accumulator.
    pub fn film_image(&self, dev: i32) -> (*mut f32, usize) {
        let film = self.film.lock();
        let host_len = film.host.data.len();
        if dev == 0 {
            return (film.host.data.as_mut_ptr(), host_len);
        }

        let host_slice = film.host.data.as_slice();
        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if data.film_pixels.len() != host_len {
            let section = self.begin_section(SectionType::FramebufferUpdate);
            data.film_pixels = self.backend.copy_to_device(host_slice, "film");
            self.end_section(SectionType::FramebufferUpdate, section);
        }
        (data.film_pixels.as_mut_ptr(), host_len)
    }

    /// Device-side accessor to an AOV by name; empty or "Color" selects
    /// the main accumulator.
    pub fn aov_image(&self, dev: i32, name: &str) -> AovAccessor {
        if name.is_empty() || name == "Color" {
            let iteration_count = self.film.lock().host.iteration_count;
            let (data, len) = self.film_image(dev);
            return AovAccessor {
                data,
                len,
                iteration_count,
            };
        }

        let film = self.film.lock();
        let Some(aov) = film.aovs.get(name) else {
            error!("Unknown aov '{name}' access");
            return AovAccessor::null();
        };
        let iteration_count = aov.iteration_count;
        let len = aov.data.len();

        if dev == 0 {
            return AovAccessor {
                data: aov.data.as_mut_ptr(),
                len,
                iteration_count,
            };
        }

        let host_slice = aov.data.as_slice();
        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if data.aovs.get(name).map_or(0, DeviceArray::len) != len {
            let section = self.begin_section(SectionType::AovUpdate);
            data.aovs
                .insert(name.to_string(), self.backend.copy_to_device(host_slice, name));
            self.end_section(SectionType::AovUpdate, section);
        }
        AovAccessor {
            data: data.aovs[name].as_mut_ptr(),
            len,
            iteration_count,
        }
    }

    /// Host-side accessor, synchronising device copies first.
    pub fn aov_for_host(&self, name: &str) -> AovAccessor {
        {
            let film = self.film.lock();
            if film.host.data.is_empty() {
                error!("Framebuffer not yet initialized. Run a single iteration first");
                return AovAccessor::null();
            }
        }

        if !self.is_gpu {
            return self.aov_image(0, name);
        }

        let dev = self.dev_id;
        let mut film = self.film.lock();
        if name.is_empty() || name == "Color" {
            if !film.host.mapped {
                let devices = self.devices.lock();
                if let Some(data) = devices.get(&dev) {
                    if !data.film_pixels.is_empty() {
                        let section = self.begin_section(SectionType::FramebufferHostUpdate);
                        film.host.data.copy_from_slice(data.film_pixels.as_slice());
                        self.end_section(SectionType::FramebufferHostUpdate, section);
                    }
                }
                film.host.mapped = true;
            }
            return AovAccessor {
                data: film.host.data.as_mut_ptr(),
                len: film.host.data.len(),
                iteration_count: film.host.iteration_count,
            };
        }

        let Some(aov) = film.aovs.get_mut(name) else {
            error!("Unknown aov '{name}' access for host");
            return AovAccessor::null();
        };
        if !aov.host_only && !aov.mapped {
            let devices = self.devices.lock();
            if let Some(device_copy) = devices.get(&dev).and_then(|d| d.aovs.get(name)) {
                if !device_copy.is_empty() {
                    let section = self.begin_section(SectionType::AovHostUpdate);
                    aov.data.copy_from_slice(device_copy.as_slice());
                    self.end_section(SectionType::AovHostUpdate, section);
                }
            }
            aov.mapped = true;
        }
        AovAccessor {
            data: aov.data.as_mut_ptr(),
            len: aov.data.len(),
            iteration_count: aov.iteration_count,
        }
    }

    /// Declare the pending iteration delta of an AOV.
    pub fn mark_aov_as_used(&self, name: &str, iter: i32) {
        let mut film = self.film.lock();
        if name.is_empty() || name == "Color" {
            film.host.iter_diff = iter;
        } else if let Some(aov) = film.aovs.get_mut(name) {
            aov.iter_diff = iter;
        } else {
            error!("Unknown aov '{name}' access");
        }
    }

    pub fn clear_aov(&self, name: &str) {
        let mut film = self.film.lock();
        if film.host.data.is_empty() {
            return;
        }

        if name.is_empty() || name == "Color" {
            film.host.clear();
            let host_len = film.host.data.len();
            let mut devices = self.devices.lock();
            for data in devices.values_mut() {
                if data.film_pixels.len() == host_len {
                    data.film_pixels.fill_zero();
                }
            }
        } else {
            let Some(aov) = film.aovs.get_mut(name) else {
                error!("Unknown aov '{name}' access");
                return;
            };
            aov.clear();
            let len = aov.data.len();
            let mut devices = self.devices.lock();
            for data in devices.values_mut() {
                if let Some(copy) = data.aovs.get_mut(name) {
                    if copy.len() == len {
                        copy.fill_zero();
                    }
                }
            }
        }
    }

    pub fn clear_all_aovs(&self) {
        self.clear_aov("");
        let names: Vec<String> = self.film.lock().aovs.keys().cloned().collect();
        for name in names {
            self.clear_aov(&name);
        }
    }

    /// Commit iteration counts at the end of an iteration.
    fn present(&self) {
        let lock_framebuffer = self.current_settings.read().info.lock_framebuffer;
        let mut film = self.film.lock();
        if !lock_framebuffer {
            film.host.commit_main_iteration();
        } else {
            film.host.iter_diff = 0;
        }
        for aov in film.aovs.values_mut() {
            aov.commit_iteration();
        }
    }

    // ---------------------------------------------------- threading

    pub fn register_thread(&self) {
        self.scratch.register();
    }

    pub fn unregister_thread(&self) {
        self.scratch.unregister();
    }

    fn with_thread_data<R>(&self, f: impl FnOnce(&mut CpuData) -> R) -> Option<R> {
        self.scratch.with_current(f)
    }

    // ----------------------------------------------------- settings

    fn update_settings(&self, settings: &RenderSettings) {
        let driver = self.driver_settings.0.get();
        unsafe {
            (*driver).spi = settings.spi as i32;
            (*driver).frame = settings.frame as i32;
            (*driver).iter = settings.iteration as i32;
            (*driver).width = settings.work_width as i32;
            (*driver).height = settings.work_height as i32;
            (*driver).seed = settings.seed as i32;
        }
    }

    pub fn work_info(&self) -> WorkInfo {
        let driver = unsafe { *self.driver_settings.0.get() };
        let settings = self.current_settings.read();
        let advanced = self
            .shader_set
            .read()
            .as_ref()
            .is_some_and(|set| set.has_advanced_shadow_handling());

        let (width, height) = if driver.width > 0 && driver.height > 0 {
            (driver.width, driver.height)
        } else {
            let film = self.film.lock();
            (film.width as i32, film.height as i32)
        };

        WorkInfo {
            width,
            height,
            advanced_shadows: i32::from(
                advanced && settings.info.shadow_handling_mode == ShadowHandlingMode::Advanced,
            ),
            advanced_shadows_with_materials: i32::from(
                advanced
                    && settings.info.shadow_handling_mode
                        == ShadowHandlingMode::AdvancedWithMaterials,
            ),
            framebuffer_locked: i32::from(settings.info.lock_framebuffer),
        }
    }

    #[must_use]
    pub fn shadow_handling_mode(&self) -> ShadowHandlingMode {
        self.current_settings.read().info.shadow_handling_mode
    }

    // ------------------------------------------------ shader context

    fn setup_shader_set(&self, set: &Arc<ShaderSet>) {
        *self.shader_set.write() = Some(Arc::clone(set));

        let mut infos = self.shader_infos.lock();
        let mut seed = |key: ShaderKey| {
            infos.entry(key).or_default();
        };

        seed(ShaderKey::new(set.id, ShaderType::Device, 0));
        seed(ShaderKey::new(set.id, ShaderType::PrimaryTraversal, 0));
        seed(ShaderKey::new(set.id, ShaderType::SecondaryTraversal, 0));
        seed(ShaderKey::new(set.id, ShaderType::RayGeneration, 0));
        seed(ShaderKey::new(set.id, ShaderType::Miss, 0));
        if set.tonemap.is_some() {
            seed(ShaderKey::new(set.id, ShaderType::Tonemap, 0));
            seed(ShaderKey::new(set.id, ShaderType::ImageInfo, 0));
        }
        for i in 0..set.hits.len() {
            seed(ShaderKey::new(set.id, ShaderType::Hit, i as u32));
        }
        for i in 0..set.advanced_shadow_hits.len() {
            seed(ShaderKey::new(set.id, ShaderType::AdvancedShadowHit, i as u32));
        }
        for i in 0..set.advanced_shadow_misses.len() {
            seed(ShaderKey::new(set.id, ShaderType::AdvancedShadowMiss, i as u32));
        }
        for i in 0..set.callbacks.len() {
            seed(ShaderKey::new(set.id, ShaderType::Callback, i as u32));
        }
    }

    fn shader_set(&self) -> Option<Arc<ShaderSet>> {
        self.shader_set.read().clone()
    }

    fn set_current_shader<F>(&self, dev: i32, key: ShaderKey, slot: &ShaderSlot<F>) {
        if self.is_gpu {
            let mut devices = self.devices.lock();
            let data = devices.entry(dev).or_default();
            data.current_local_registry = Some(Arc::clone(&slot.local_registry));
            data.current_shader_key = key;
        } else {
            self.with_thread_data(|data| {
                data.current_local_registry = Some(Arc::clone(&slot.local_registry));
                data.current_shader_key = key;
            });
        }
    }

    fn current_local_registry(&self, dev: i32) -> Option<Arc<RwLock<ParameterSet>>> {
        if self.is_gpu {
            self.devices
                .lock()
                .get(&dev)
                .and_then(|d| d.current_local_registry.clone())
        } else {
            self.with_thread_data(|data| data.current_local_registry.clone())
                .flatten()
        }
    }

    fn current_shader_key(&self, dev: i32) -> ShaderKey {
        if self.is_gpu {
            self.devices
                .lock()
                .get(&dev)
                .map_or(ShaderKey::new(0, ShaderType::Device, 0), |d| {
                    d.current_shader_key
                })
        } else {
            self.with_thread_data(|data| data.current_shader_key)
                .unwrap_or(ShaderKey::new(0, ShaderType::Device, 0))
        }
    }

    // -------------------------------------------------- statistics

    fn begin_launch(&self, key: SmallShaderKey, workload: u64) {
        if self.setup.acquire_stats {
            self.with_thread_data(|data| data.stats.begin_shader_launch(key, workload));
        }
    }

    fn end_launch(&self, key: SmallShaderKey) {
        if self.setup.acquire_stats {
            self.with_thread_data(|data| data.stats.end_shader_launch(key));
        }
    }

    fn begin_section(&self, _ty: SectionType) -> Option<std::time::Instant> {
        if self.setup.acquire_stats {
            Some(std::time::Instant::now())
        } else {
            None
        }
    }

    fn end_section(&self, ty: SectionType, start: Option<std::time::Instant>) {
        if let Some(start) = start {
            self.with_thread_data(|data| data.stats.end_section(ty, start));
        }
    }

    pub fn abi_begin_section(&self, id: i32) {
        if !self.setup.acquire_stats {
            return;
        }
        let Some(ty) = SectionType::from_id(id) else {
            return;
        };
        self.with_thread_data(|data| data.open_sections.push((ty, std::time::Instant::now())));
    }

    pub fn abi_end_section(&self, id: i32) {
        if !self.setup.acquire_stats {
            return;
        }
        let Some(ty) = SectionType::from_id(id) else {
            return;
        };
        self.with_thread_data(|data| {
            if let Some(pos) = data.open_sections.iter().rposition(|(t, _)| *t == ty) {
                let (_, start) = data.open_sections.remove(pos);
                data.stats.end_section(ty, start);
            }
        });
    }

    pub fn abi_add_quantity(&self, id: i32, value: u64) {
        if !self.setup.acquire_stats {
            return;
        }
        let Some(quantity) = Quantity::from_id(id) else {
            return;
        };
        self.with_thread_data(|data| data.stats.increase(quantity, value));
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.scratch.merged_statistics()
    }

    // ------------------------------------------------- dispatching

    fn check_debug_output(&self) {
        let mut devices = self.devices.lock();
        for data in devices.values_mut() {
            if let Some(buffer) = data.buffers.get_mut(DEBUG_BUFFER_NAME) {
                let words = unsafe {
                    std::slice::from_raw_parts_mut(
                        buffer.data.as_mut_ptr().cast::<i32>(),
                        buffer.data.len() / 4,
                    )
                };
                drain_debug_buffer(words);
            }
        }
    }

    fn run_device_shader(&self) {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return;
        };
        if self.setup.debug_trace {
            debug!("TRACE> Device Shader");
        }

        let key = ShaderKey::new(set.id, ShaderType::Device, 0);
        self.begin_launch(key.small(), 1);
        self.set_current_shader(0, key, &set.device);
        unsafe { (set.device.exec)(self.driver_settings_ptr()) };
        self.check_debug_output();
        self.end_launch(key.small());
    }

    pub fn run_traversal_shader(&self, dev: i32, size: i32, primary: bool) {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return;
        };
        let (slot, ty) = if primary {
            (&set.primary_traversal, ShaderType::PrimaryTraversal)
        } else {
            (&set.secondary_traversal, ShaderType::SecondaryTraversal)
        };
        if self.setup.debug_trace {
            debug!("TRACE> {} Traversal Shader [S={size}]", if primary { "Primary" } else { "Secondary" });
        }

        let key = ShaderKey::new(set.id, ty, 0);
        self.begin_launch(key.small(), size.max(0) as u64);
        self.set_current_shader(dev, key, slot);
        unsafe { (slot.exec)(self.driver_settings_ptr(), size) };
        self.check_debug_output();
        self.end_launch(key.small());
    }

    pub fn run_ray_generation_shader(
        &self,
        dev: i32,
        next_id: i32,
        size: i32,
        xmin: i32,
        ymin: i32,
        xmax: i32,
        ymax: i32,
    ) -> i32 {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return -1;
        };
        if self.setup.debug_trace {
            debug!("TRACE> Ray Generation Shader [S={size}, I={next_id}]");
        }

        let workload = (i64::from(xmax - xmin) * i64::from(ymax - ymin)).max(0) as u64;
        let key = ShaderKey::new(set.id, ShaderType::RayGeneration, 0);
        self.begin_launch(key.small(), workload);
        self.set_current_shader(dev, key, &set.ray_generation);
        let ret = unsafe {
            (set.ray_generation.exec)(
                self.driver_settings_ptr(),
                next_id,
                size,
                xmin,
                ymin,
                xmax,
                ymax,
            )
        };
        self.check_debug_output();
        self.end_launch(key.small());
        ret
    }

    pub fn run_miss_shader(&self, dev: i32, first: i32, last: i32) {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return;
        };
        if self.setup.debug_trace {
            debug!("TRACE> Miss Shader [S={first}, E={last}]");
        }

        let key = ShaderKey::new(set.id, ShaderType::Miss, 0);
        self.begin_launch(key.small(), (last - first).max(0) as u64);
        self.set_current_shader(dev, key, &set.miss);
        unsafe { (set.miss.exec)(self.driver_settings_ptr(), first, last) };
        self.check_debug_output();
        self.end_launch(key.small());
    }

    pub fn run_hit_shader(&self, dev: i32, entity_id: i32, first: i32, last: i32) {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return;
        };
        let material_id = {
            let scene = self.scene.read();
            let Some(db) = scene.database.as_ref() else {
                error!("No scene database assigned");
                return;
            };
            match db.entity_to_material.get(entity_id.max(0) as usize) {
                Some(&material) => material,
                None => {
                    error!("Entity id {entity_id} has no material mapping");
                    return;
                }
            }
        };
        if self.setup.debug_trace {
            debug!("TRACE> Hit Shader [I={entity_id}, M={material_id}, S={first}, E={last}]");
        }

        let Some(slot) = set.hits.get(material_id.max(0) as usize) else {
            error!("Material id {material_id} has no hit shader");
            return;
        };
        let key = ShaderKey::new(set.id, ShaderType::Hit, material_id as u32);
        self.begin_launch(key.small(), (last - first).max(0) as u64);
        self.set_current_shader(dev, key, slot);
        unsafe { (slot.exec)(self.driver_settings_ptr(), entity_id, material_id, first, last) };
        self.check_debug_output();
        self.end_launch(key.small());
    }

    pub fn run_advanced_shadow_shader(
        &self,
        dev: i32,
        material_id: i32,
        first: i32,
        last: i32,
        is_hit: bool,
    ) {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return;
        };
        if !set.has_advanced_shadow_handling() {
            error!("Advanced shadow shader called without advanced shadow handling");
            return;
        }
        if self.setup.debug_trace {
            debug!(
                "TRACE> Advanced {} Shader [I={material_id}, S={first}, E={last}]",
                if is_hit { "Hit" } else { "Miss" }
            );
        }

        let (shaders, ty) = if is_hit {
            (&set.advanced_shadow_hits, ShaderType::AdvancedShadowHit)
        } else {
            (&set.advanced_shadow_misses, ShaderType::AdvancedShadowMiss)
        };
        let Some(slot) = shaders.get(material_id.max(0) as usize) else {
            error!("Material id {material_id} has no advanced shadow shader");
            return;
        };

        let key = ShaderKey::new(set.id, ty, material_id as u32);
        self.begin_launch(key.small(), (last - first).max(0) as u64);
        self.set_current_shader(dev, key, slot);
        unsafe { (slot.exec)(self.driver_settings_ptr(), material_id, first, last) };
        self.check_debug_output();
        self.end_launch(key.small());
    }

    pub fn run_callback_shader(&self, dev: i32, ty: i32) {
        let Some(set) = self.shader_set() else {
            error!("No shader set bound");
            return;
        };
        let Some(Some(slot)) = set.callbacks.get(ty.max(0) as usize) else {
            return; // Callbacks are optional
        };
        if self.setup.debug_trace {
            debug!("TRACE> Callback Shader [T={ty}]");
        }

        let key = ShaderKey::new(set.id, ShaderType::Callback, ty as u32);
        self.begin_launch(key.small(), 1);
        self.set_current_shader(dev, key, slot);
        unsafe { (slot.exec)(self.driver_settings_ptr()) };
        self.check_debug_output();
        self.end_launch(key.small());
    }

    // ----------------------------------------------------- render

    pub fn render(
        &self,
        shader_set: &Arc<ShaderSet>,
        settings: RenderSettings,
        globals: &Arc<RwLock<ParameterSet>>,
        denoiser: Option<&dyn Denoiser>,
    ) {
        self.render_counter.fetch_add(1, Ordering::Relaxed);

        // Resize and clear if the film size changed
        if settings.width > 0 && settings.height > 0 {
            let needs_resize = {
                let film = self.film.lock();
                film.width != settings.width
                    || film.height != settings.height
                    || film.host.data.is_empty()
            };
            if needs_resize {
                self.resize_framebuffer(settings.width, settings.height);
            }
        }

        self.register_thread();
        self.setup_shader_set(shader_set);
        self.update_settings(&settings);
        let apply_denoiser = settings.apply_denoiser;
        *self.current_settings.write() = settings;
        *self.globals.write() = Some(Arc::clone(globals));

        self.reset_framebuffer_access();
        self.run_device_shader();
        self.present();

        if apply_denoiser {
            if let Some(denoiser) = denoiser {
                self.denoise(denoiser);
            }
        }

        self.unregister_thread();
    }

    fn denoise(&self, denoiser: &dyn Denoiser) {
        let has_denoised = self.film.lock().aovs.contains_key("Denoised");
        if !has_denoised {
            return;
        }

        let color = self.aov_for_host("");
        let normals = self.aov_for_host("Normals");
        let albedo = self.aov_for_host("Albedo");
        let output = self.aov_for_host("Denoised");
        if color.is_null() || normals.is_null() || albedo.is_null() || output.is_null() {
            warn!("Denoiser inputs incomplete, skipping denoise pass");
            return;
        }

        let (width, height) = {
            let film = self.film.lock();
            (film.width, film.height)
        };

        unsafe {
            let out = std::slice::from_raw_parts_mut(output.data, output.len);
            denoiser.denoise(
                color.as_slice(),
                normals.as_slice(),
                albedo.as_slice(),
                out,
                width,
                height,
                color.iteration_count,
            );
        }

        let mut film = self.film.lock();
        let color_iterations = film.host.iteration_count;
        if let Some(aov) = film.aovs.get_mut("Denoised") {
            aov.iteration_count = color_iterations;
            aov.iter_diff = 0;
        }
        drop(film);

        // Mirror the result onto the device
        if self.is_gpu {
            let film = self.film.lock();
            if let Some(aov) = film.aovs.get("Denoised") {
                let host_slice = aov.data.as_slice();
                let mut devices = self.devices.lock();
                let data = devices.entry(self.dev_id).or_default();
                if data.aovs.get("Denoised").map_or(0, DeviceArray::len) != host_slice.len() {
                    data.aovs.insert(
                        "Denoised".to_string(),
                        self.backend.copy_to_device(host_slice, "Denoised"),
                    );
                } else if let Some(copy) = data.aovs.get_mut("Denoised") {
                    copy.copy_from_slice(host_slice);
                }
            }
        }
    }

    // ---------------------------------------------------- streams

    fn primary_components(&self) -> usize {
        components_per_ray(
            MIN_PRIMARY_STREAM_SIZE,
            self.current_settings.read().info.primary_payload_count,
        )
    }

    fn secondary_components(&self) -> usize {
        components_per_ray(
            MIN_SECONDARY_STREAM_SIZE,
            self.current_settings.read().info.secondary_payload_count,
        )
    }

    pub fn primary_stream(&self, dev: i32, buffer: i32, size: i32, out: &mut PrimaryStreamAbi) {
        let components = self.primary_components();
        if self.is_gpu {
            let mut devices = self.devices.lock();
            let data = devices.entry(dev).or_default();
            let index = data.current_primary[(buffer.max(0) as usize).min(1)];
            data.primary[index].resize(&self.backend, size.max(0) as usize, components, "primary");
            data.primary[index].write_primary_abi(out);
        } else {
            let ok = self.with_thread_data(|data| {
                data.primary
                    .resize(&self.backend, size.max(0) as usize, components, "primary");
                data.primary.write_primary_abi(out);
            });
            if ok.is_none() {
                error!("Thread not registered for primary stream access");
            }
        }
    }

    pub fn primary_stream_const(&self, dev: i32, buffer: i32, out: &mut PrimaryStreamAbi) {
        if self.is_gpu {
            let mut devices = self.devices.lock();
            let data = devices.entry(dev).or_default();
            let index = data.current_primary[(buffer.max(0) as usize).min(1)];
            if !data.primary[index].is_allocated() {
                error!("Primary stream accessed before initialization");
                return;
            }
            data.primary[index].write_primary_abi(out);
        } else {
            let ok = self.with_thread_data(|data| {
                if data.primary.is_allocated() {
                    data.primary.write_primary_abi(out);
                } else {
                    error!("Primary stream accessed before initialization");
                }
            });
            if ok.is_none() {
                error!("Thread not registered for primary stream access");
            }
        }
    }

    pub fn secondary_stream(&self, dev: i32, buffer: i32, size: i32, out: &mut SecondaryStreamAbi) {
        let components = self.secondary_components();
        if self.is_gpu {
            let mut devices = self.devices.lock();
            let data = devices.entry(dev).or_default();
            let index = data.current_secondary[(buffer.max(0) as usize).min(1)];
            data.secondary[index].resize(
                &self.backend,
                size.max(0) as usize,
                components,
                "secondary",
            );
            data.secondary[index].write_secondary_abi(out);
        } else {
            let ok = self.with_thread_data(|data| {
                data.secondary
                    .resize(&self.backend, size.max(0) as usize, components, "secondary");
                data.secondary.write_secondary_abi(out);
            });
            if ok.is_none() {
                error!("Thread not registered for secondary stream access");
            }
        }
    }

    pub fn secondary_stream_const(&self, dev: i32, buffer: i32, out: &mut SecondaryStreamAbi) {
        if self.is_gpu {
            let mut devices = self.devices.lock();
            let data = devices.entry(dev).or_default();
            let index = data.current_secondary[(buffer.max(0) as usize).min(1)];
            if !data.secondary[index].is_allocated() {
                error!("Secondary stream accessed before initialization");
                return;
            }
            data.secondary[index].write_secondary_abi(out);
        } else {
            let ok = self.with_thread_data(|data| {
                if data.secondary.is_allocated() {
                    data.secondary.write_secondary_abi(out);
                } else {
                    error!("Secondary stream accessed before initialization");
                }
            });
            if ok.is_none() {
                error!("Thread not registered for secondary stream access");
            }
        }
    }

    pub fn swap_primary_streams(&self, dev: i32) {
        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        data.current_primary.swap(0, 1);
    }

    pub fn swap_secondary_streams(&self, dev: i32) {
        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        data.current_secondary.swap(0, 1);
    }

    /// Upper bound for the traversal scratch, from mapping code.
    fn temporary_buffer_size(&self) -> usize {
        let scene = self.scene.read();
        let material_count = scene
            .database
            .as_ref()
            .map_or(0, |db| db.material_count);
        round_up(32.max((scene.entity_count + 1).max(material_count * 2)), 4)
    }

    pub fn gpu_temporary_buffer(&self, dev: i32) -> (*mut i32, usize) {
        let size = self.temporary_buffer_size();
        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if data.tmp_buffer.len() < size {
            data.tmp_buffer = self.backend.alloc_array::<i32>(size, "tmp buffer");
        }
        (data.tmp_buffer.as_mut_ptr(), size)
    }

    pub fn temporary_storage_host(&self, dev: i32) -> TemporaryStorageHost {
        let size = self.temporary_buffer_size();
        // Host-side scratch regardless of target
        let host = DeviceBackend::Host;

        if dev == 0 && !self.is_gpu {
            self.with_thread_data(|data| {
                if data.tmp_ray_begins.len() < size {
                    data.tmp_ray_begins = host.alloc_array::<i32>(size, "ray begins");
                    data.tmp_ray_ends = host.alloc_array::<i32>(size, "ray ends");
                }
                TemporaryStorageHost {
                    ray_begins: data.tmp_ray_begins.as_mut_ptr(),
                    ray_ends: data.tmp_ray_ends.as_mut_ptr(),
                }
            })
            .unwrap_or_else(|| {
                error!("Thread not registered for temporary storage access");
                TemporaryStorageHost::default()
            })
        } else {
            let mut devices = self.devices.lock();
            let data = devices.entry(dev).or_default();
            if data.tmp_ray_begins.len() < size {
                data.tmp_ray_begins = host.alloc_array::<i32>(size, "ray begins");
                data.tmp_ray_ends = host.alloc_array::<i32>(size, "ray ends");
            }
            TemporaryStorageHost {
                ray_begins: data.tmp_ray_begins.as_mut_ptr(),
                ray_ends: data.tmp_ray_ends.as_mut_ptr(),
            }
        }
    }

    // ------------------------------------------------- scene data

    pub fn load_bvh(&self, dev: i32, prim_type: &str, width: BvhWidth) -> (*const u8, *const u8) {
        let scene = self.scene.read();
        let Some(db) = scene.database.clone() else {
            error!("No scene database assigned");
            return (std::ptr::null(), std::ptr::null());
        };
        drop(scene);

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if let Some(proxy) = data.bvh_ents.get(prim_type) {
            assert!(
                proxy.width == width,
                "BVH '{prim_type}' requested with width {width:?} but resident as {:?}",
                proxy.width
            );
            return (proxy.nodes.as_ptr(), proxy.leaves.as_ptr());
        }

        debug!("Loading scene bvh {prim_type}");
        let Some(bvh) = db.scene_bvhs.get(prim_type) else {
            // A missing BVH requested by a shader cannot be served
            panic!("Scene bvh '{prim_type}' missing from database");
        };

        let proxy = BvhProxy {
            width,
            nodes: self.backend.make_resident(&bvh.nodes, &db, "bvh nodes"),
            leaves: self.backend.make_resident(&bvh.leaves, &db, "bvh leaves"),
        };
        data.bvh_ents.insert(prim_type.to_string(), proxy);
        let entry = &data.bvh_ents[prim_type];
        (entry.nodes.as_ptr(), entry.leaves.as_ptr())
    }

    pub fn load_dyntable(&self, dev: i32, name: &str) -> DynTableData {
        let scene = self.scene.read();
        let Some(db) = scene.database.clone() else {
            error!("No scene database assigned");
            return DynTableData::default();
        };
        drop(scene);

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if !data.dyntables.contains_key(name) {
            debug!("Loading dyntable '{name}'");
            let Some(table) = db.dyn_tables.get(name) else {
                panic!("Dyntable '{name}' missing from database");
            };
            let proxy = DynTableProxy {
                entry_count: table.entry_count(),
                lookups: self.backend.make_resident(table.lookups(), &db, "lookups"),
                data: self.backend.make_resident(table.data(), &db, "dyntable"),
            };
            data.dyntables.insert(name.to_string(), proxy);
        }

        let proxy = &data.dyntables[name];
        DynTableData {
            count: proxy.entry_count as u64,
            header: proxy.lookups.as_ptr(),
            size: proxy.data.len() as u64,
            start: proxy.data.as_ptr(),
        }
    }

    pub fn load_fixtable(&self, dev: i32, name: &str) -> (*const u8, i32) {
        let scene = self.scene.read();
        let Some(db) = scene.database.clone() else {
            error!("No scene database assigned");
            return (std::ptr::null(), 0);
        };
        drop(scene);

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if !data.fixtables.contains_key(name) {
            debug!("Loading fixtable '{name}'");
            let Some(table) = db.fix_tables.get(name) else {
                panic!("Fixtable '{name}' missing from database");
            };
            data.fixtables.insert(
                name.to_string(),
                DeviceBuffer {
                    data: self.backend.copy_to_device(table.data(), name),
                },
            );
        }

        let buffer = &data.fixtables[name];
        (buffer.data.as_ptr(), buffer.data.len() as i32)
    }

    pub fn scene_info(&self) -> SceneInfoAbi {
        let scene = self.scene.read();
        SceneInfoAbi {
            num_entities: scene.entity_count as i32,
            num_materials: scene
                .database
                .as_ref()
                .map_or(0, |db| db.material_count as i32),
        }
    }

    pub fn load_rays(&self, dev: i32) -> *const StreamRay {
        let settings = self.current_settings.read();
        let count = settings.work_width;
        let Some(rays) = settings.rays.clone() else {
            error!("No ray list available for tracing");
            return std::ptr::null();
        };
        drop(settings);

        let stamp = self.render_counter.load(Ordering::Relaxed);
        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if data.ray_list.len() == count && data.ray_list_stamp == stamp {
            return data.ray_list.as_ptr();
        }

        let mut upload = Vec::with_capacity(count);
        for ray in rays.iter().take(count) {
            let mut norm = ray.direction.length();
            if norm < f32::EPSILON {
                error!("Invalid ray given: Ray has zero direction!");
                norm = 1.0;
            }
            upload.push(StreamRay {
                org: ray.origin.to_array(),
                dir: (ray.direction / norm).to_array(),
                tmin: ray.range.x,
                tmax: ray.range.y,
            });
        }

        if data.ray_list.len() != count {
            data.ray_list = self.backend.copy_to_device(&upload, "ray list");
        } else {
            data.ray_list.copy_from_slice(&upload);
        }
        data.ray_list_stamp = stamp;
        data.ray_list.as_ptr()
    }

    // ---------------------------------------------- image caches

    /// Attribute an image use to the shader currently running.
    ///
    /// The counter advances on every access; the memory usage is
    /// recorded once the image has actually been decoded.
    fn attribute_image(&self, dev: i32, filename: &str, bytes: usize, packed: bool) {
        let key = self.current_shader_key(dev);
        let mut infos = self.shader_infos.lock();
        let info = infos.entry(key).or_insert_with(ShaderInfo::default);
        let resources = if packed {
            &mut info.packed_images
        } else {
            &mut info.images
        };
        let stats = resources.entry(filename.to_string()).or_default();
        stats.counter += 1;
        if bytes > 0 {
            stats.memory_usage = bytes;
        }
    }

    pub fn load_image(
        &self,
        dev: i32,
        filename: &str,
        expected_channels: i32,
    ) -> (*const f32, i32, i32) {
        {
            let devices = self.devices.lock();
            if let Some(img) = devices.get(&dev).and_then(|d| d.images.get(filename)) {
                let out = (img.data.as_ptr(), img.width as i32, img.height as i32);
                drop(devices);
                self.attribute_image(dev, filename, 0, false);
                return out;
            }
        }

        let section = self.begin_section(SectionType::ImageLoading);
        debug!("Loading image '{filename}' (C={expected_channels})");
        let img = match load_image_file(filename) {
            Ok(img) => {
                if expected_channels > 0 && expected_channels != img.channels as i32 {
                    error!("Image '{filename}' has unexpected channel count");
                    LoadedImage::fallback()
                } else {
                    img
                }
            }
            Err(err) => {
                error!("{err}");
                LoadedImage::fallback()
            }
        };
        self.end_section(SectionType::ImageLoading, section);
        self.attribute_image(
            dev,
            filename,
            img.pixels.len() * std::mem::size_of::<f32>(),
            false,
        );

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if !data.images.contains_key(filename) {
            let uploaded = upload_image(&self.backend, &img, filename);
            data.images.insert(filename.to_string(), uploaded);
        }
        let img = &data.images[filename];
        (img.data.as_ptr(), img.width as i32, img.height as i32)
    }

    pub fn load_packed_image(
        &self,
        dev: i32,
        filename: &str,
        expected_channels: i32,
        linear: bool,
    ) -> (*const u8, i32, i32) {
        {
            let devices = self.devices.lock();
            if let Some(img) = devices.get(&dev).and_then(|d| d.packed_images.get(filename)) {
                let out = (img.data.as_ptr(), img.width as i32, img.height as i32);
                drop(devices);
                self.attribute_image(dev, filename, 0, true);
                return out;
            }
        }

        let section = self.begin_section(SectionType::PackedImageLoading);
        debug!("Loading (packed) image '{filename}' (C={expected_channels})");
        let img = match load_packed_image_file(filename, linear) {
            Ok(img) => {
                if expected_channels > 0 && expected_channels != img.channels as i32 {
                    error!("Packed image '{filename}' has unexpected channel count");
                    LoadedPackedImage::fallback()
                } else {
                    img
                }
            }
            Err(err) => {
                error!("{err}");
                LoadedPackedImage::fallback()
            }
        };
        self.end_section(SectionType::PackedImageLoading, section);
        self.attribute_image(dev, filename, img.pixels.len(), true);

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if !data.packed_images.contains_key(filename) {
            let uploaded = upload_packed_image(&self.backend, &img, filename);
            data.packed_images.insert(filename.to_string(), uploaded);
        }
        let img = &data.packed_images[filename];
        (img.data.as_ptr(), img.width as i32, img.height as i32)
    }

    pub fn load_buffer(&self, dev: i32, filename: &str) -> (*const u8, i32) {
        {
            let devices = self.devices.lock();
            if let Some(buffer) = devices.get(&dev).and_then(|d| d.buffers.get(filename)) {
                return (buffer.data.as_ptr(), buffer.data.len() as i32);
            }
        }

        let section = self.begin_section(SectionType::BufferLoading);
        debug!("Loading buffer '{filename}'");
        let bytes = match read_buffer_file(filename) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("Failed to load buffer '{filename}': {err}");
                Vec::new()
            }
        };
        self.end_section(SectionType::BufferLoading, section);

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if !data.buffers.contains_key(filename) {
            data.buffers.insert(
                filename.to_string(),
                DeviceBuffer {
                    data: self.backend.copy_to_device(&bytes, filename),
                },
            );
        }
        let buffer = &data.buffers[filename];
        (buffer.data.as_ptr(), buffer.data.len() as i32)
    }

    pub fn request_buffer(&self, dev: i32, name: &str, size: i32, _flags: i32) -> (*mut u8, usize) {
        assert!(size > 0, "buffer size must be larger than zero");
        let size = round_up(size as usize, 32);

        let mut devices = self.devices.lock();
        let data = devices.entry(dev).or_default();
        if let Some(buffer) = data.buffers.get(name) {
            if buffer.data.len() >= size {
                return (buffer.data.as_mut_ptr(), buffer.data.len());
            }
        }

        let section = self.begin_section(SectionType::BufferRequests);
        debug!(
            "Requested buffer '{name}' with {}",
            helios_core::util::format_memory(size)
        );
        let buffer = DeviceBuffer {
            data: self.backend.alloc_array::<u8>(size, name),
        };
        data.buffers.insert(name.to_string(), buffer);
        let entry = &data.buffers[name];
        let result = (entry.data.as_mut_ptr(), entry.data.len());
        self.end_section(SectionType::BufferRequests, section);
        result
    }

    pub fn dump_buffer(&self, dev: i32, name: &str, filename: &str) {
        let devices = self.devices.lock();
        let Some(buffer) = devices.get(&dev).and_then(|d| d.buffers.get(name)) else {
            warn!("Buffer '{name}' can not be dumped as it does not exist");
            return;
        };
        if let Err(err) = std::fs::write(filename, buffer.data.as_slice()) {
            error!("Failed to dump buffer '{name}' to '{filename}': {err}");
        }
    }

    pub fn lookup_resource_path(&self, id: i32) -> String {
        self.lookup_resource(id)
    }

    // ---------------------------------------------- parameters

    pub fn parameter_i32(&self, dev: i32, name: &str, def: i32, global: bool) -> i32 {
        self.with_registry(dev, global, def, |set| set.int_or(name, def))
    }

    pub fn parameter_f32(&self, dev: i32, name: &str, def: f32, global: bool) -> f32 {
        self.with_registry(dev, global, def, |set| set.float_or(name, def))
    }

    pub fn parameter_vector(
        &self,
        dev: i32,
        name: &str,
        def: glam::Vec3,
        global: bool,
    ) -> glam::Vec3 {
        self.with_registry(dev, global, def, |set| set.vector_or(name, def))
    }

    pub fn parameter_color(
        &self,
        dev: i32,
        name: &str,
        def: glam::Vec4,
        global: bool,
    ) -> glam::Vec4 {
        self.with_registry(dev, global, def, |set| set.color_or(name, def))
    }

    fn with_registry<R>(
        &self,
        dev: i32,
        global: bool,
        def: R,
        f: impl FnOnce(&ParameterSet) -> R,
    ) -> R {
        if global {
            match self.globals.read().as_ref() {
                Some(globals) => f(&globals.read()),
                None => {
                    error!("No global parameters available");
                    def
                }
            }
        } else {
            match self.current_local_registry(dev) {
                Some(registry) => f(&registry.read()),
                None => {
                    error!("No local parameters available");
                    def
                }
            }
        }
    }

    fn with_registry_mut(&self, dev: i32, global: bool, f: impl FnOnce(&mut ParameterSet)) {
        if global {
            match self.globals.read().as_ref() {
                Some(globals) => f(&mut globals.write()),
                None => error!("No global parameters available"),
            }
        } else {
            match self.current_local_registry(dev) {
                Some(registry) => f(&mut registry.write()),
                None => error!("No local parameters available"),
            }
        }
    }

    pub fn set_parameter_i32(&self, dev: i32, name: &str, value: i32, global: bool) {
        self.with_registry_mut(dev, global, |set| set.set_int(name, value));
    }

    pub fn set_parameter_f32(&self, dev: i32, name: &str, value: f32, global: bool) {
        self.with_registry_mut(dev, global, |set| set.set_float(name, value));
    }

    pub fn set_parameter_vector(&self, dev: i32, name: &str, value: glam::Vec3, global: bool) {
        self.with_registry_mut(dev, global, |set| set.set_vector(name, value));
    }

    pub fn set_parameter_color(&self, dev: i32, name: &str, value: glam::Vec4, global: bool) {
        self.with_registry_mut(dev, global, |set| set.set_color(name, value));
    }

    // ---------------------------------------------- utility passes

    pub fn tonemap(&self, out_pixels: &mut [u32], settings: &TonemapSettings) {
        self.ensure_framebuffer();
        let Some(set) = self.shader_set() else {
            error!("No shader set bound for tonemapping");
            return;
        };
        let Some(slot) = set.tonemap.clone() else {
            error!("Variant has no tonemap shader");
            return;
        };

        self.register_thread();

        let acc = self.aov_image(self.dev_id, &settings.aov);
        let inv_iter = if acc.iteration_count > 0 {
            1.0 / acc.iteration_count as f32
        } else {
            0.0
        };

        let (width, height) = {
            let film = self.film.lock();
            (film.width, film.height)
        };
        if out_pixels.len() < width * height {
            error!("Tonemap output buffer too small");
            self.unregister_thread();
            return;
        }

        let params = TonemapParams {
            method: settings.method as i32,
            use_gamma: i32::from(settings.use_gamma),
            scale: settings.scale * inv_iter,
            exposure_factor: settings.exposure_factor,
            exposure_offset: settings.exposure_offset,
        };

        let device_out = if self.is_gpu {
            let section = self.begin_section(SectionType::TonemapUpdate);
            let mut devices = self.devices.lock();
            let data = devices.entry(self.dev_id).or_default();
            if data.tonemap_pixels.len() != width * height {
                data.tonemap_pixels = self.backend.alloc_array::<u32>(width * height, "tonemap");
            }
            let ptr = data.tonemap_pixels.as_mut_ptr();
            drop(devices);
            self.end_section(SectionType::TonemapUpdate, section);
            ptr
        } else {
            out_pixels.as_mut_ptr()
        };

        if self.setup.debug_trace {
            debug!("TRACE> Tonemap Shader");
        }
        let key = ShaderKey::new(set.id, ShaderType::Tonemap, 0);
        self.begin_launch(key.small(), 1);
        self.set_current_shader(self.dev_id, key, &slot);
        unsafe {
            (slot.exec)(
                self.driver_settings_ptr(),
                acc.data,
                device_out,
                width as i32,
                height as i32,
                &params,
            );
        }
        self.check_debug_output();
        self.end_launch(key.small());

        if self.is_gpu {
            let devices = self.devices.lock();
            if let Some(data) = devices.get(&self.dev_id) {
                out_pixels[..width * height].copy_from_slice(data.tonemap_pixels.as_slice());
            }
        }

        self.unregister_thread();
    }

    pub fn imageinfo(&self, settings: &ImageInfoSettings) -> ImageInfoOutput {
        self.ensure_framebuffer();
        let Some(set) = self.shader_set() else {
            error!("No shader set bound for imageinfo");
            return ImageInfoOutput::default();
        };
        let Some(slot) = set.imageinfo.clone() else {
            error!("Variant has no imageinfo shader");
            return ImageInfoOutput::default();
        };

        self.register_thread();

        let acc = self.aov_image(self.dev_id, &settings.aov);
        let inv_iter = if acc.iteration_count > 0 {
            1.0 / acc.iteration_count as f32
        } else {
            0.0
        };

        let (width, height) = {
            let film = self.film.lock();
            (film.width, film.height)
        };

        let mut histogram = vec![0i32; settings.bins];
        let params = ImageInfoParams {
            scale: settings.scale * inv_iter,
            bins: settings.bins as i32,
            histogram: if histogram.is_empty() {
                std::ptr::null_mut()
            } else {
                histogram.as_mut_ptr()
            },
        };

        if self.setup.debug_trace {
            debug!("TRACE> Imageinfo Shader");
        }
        let key = ShaderKey::new(set.id, ShaderType::ImageInfo, 0);
        self.begin_launch(key.small(), 1);
        self.set_current_shader(self.dev_id, key, &slot);
        let mut output = ImageInfoOutputAbi::default();
        unsafe {
            (slot.exec)(
                self.driver_settings_ptr(),
                acc.data,
                width as i32,
                height as i32,
                &params,
                &mut output,
            );
        }
        self.check_debug_output();
        self.end_launch(key.small());

        self.unregister_thread();

        ImageInfoOutput {
            min: output.min,
            max: output.max,
            average: output.avg,
            soft_min: output.soft_min,
            soft_max: output.soft_max,
            median: output.median,
            histogram,
        }
    }

    pub fn bake(&self, shader: &ShaderSlot<BakeShaderFn>, output: &mut Vec<f32>) {
        self.register_thread();

        if self.setup.debug_trace {
            debug!("TRACE> Bake Shader");
        }
        let variant = self.shader_set().map_or(0, |set| set.id);
        let key = ShaderKey::new(variant, ShaderType::Bake, 0);
        self.begin_launch(key.small(), 1);
        self.set_current_shader(self.dev_id, key, shader);
        unsafe { (shader.exec)(self.driver_settings_ptr()) };
        self.check_debug_output();
        self.end_launch(key.small());

        // The pass shader leaves its result in the bake output buffer
        let devices = self.devices.lock();
        if let Some(buffer) = devices
            .get(&self.dev_id)
            .and_then(|d| d.buffers.get(BAKE_OUTPUT_BUFFER_NAME))
        {
            let floats = buffer.data.len() / std::mem::size_of::<f32>();
            output.resize(floats, 0.0);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    buffer.data.as_ptr().cast::<f32>(),
                    output.as_mut_ptr(),
                    floats,
                );
            }
        } else {
            warn!("Bake shader produced no output buffer");
            output.clear();
        }
        drop(devices);

        self.unregister_thread();
    }

    // ----------------------------------------------------- reset

    /// Drop every residency cache for a mid-life reset.
    pub fn release_all(&self) {
        info!("Releasing all device caches");
        self.devices.lock().clear();
        self.shader_infos.lock().clear();
    }
}
