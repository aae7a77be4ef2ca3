//! Script compiler collaborator interface.
//!
//! Shader sources are opaque strings to the core; the compiler turns a
//! prepared source plus an entry function name into a function pointer.
//! The JIT itself lives outside this workspace.

/// Entry function names the runtime requests per shader slot.
///
/// The shader text generators emit functions with these names; the
/// compiler resolves them after compilation.
pub mod entry_points {
    pub const DEVICE: &str = "helios_device_shader";
    pub const TRAVERSAL: &str = "helios_traversal_shader";
    pub const RAY_GENERATION: &str = "helios_ray_generation_shader";
    pub const MISS: &str = "helios_miss_shader";
    pub const HIT: &str = "helios_hit_shader";
    pub const ADVANCED_SHADOW: &str = "helios_advanced_shadow_shader";
    pub const CALLBACK: &str = "helios_callback_shader";
    pub const TONEMAP: &str = "helios_tonemap_shader";
    pub const IMAGEINFO: &str = "helios_imageinfo_shader";
    pub const BAKE: &str = "helios_bake_shader";
}

/// The shader compilation collaborator.
///
/// `prepare` concatenates the standard library (or an override) with
/// the generated source; `compile` produces the entry function pointer
/// or `None` on failure, with diagnostics going to the log.
pub trait ScriptCompiler: Send + Sync {
    fn prepare(&self, source: &str) -> String;
    fn compile(&self, source: &str, entry: &str) -> Option<*const ()>;
}
