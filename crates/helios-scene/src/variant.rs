//! Shader source variants produced by the loader.

use helios_core::ParameterSet;

use crate::technique::CallbackType;

/// One shader slot: its payload plus the local parameter registry the
/// shader was generated against.
///
/// The payload is source text on the loader side and a compiled
/// function pointer on the device side.
#[derive(Debug, Clone, Default)]
pub struct ShaderOutput<T> {
    pub exec: T,
    pub local_registry: ParameterSet,
}

impl<T> ShaderOutput<T> {
    pub fn new(exec: T) -> Self {
        Self {
            exec,
            local_registry: ParameterSet::new(),
        }
    }

    pub fn with_registry(exec: T, local_registry: ParameterSet) -> Self {
        Self {
            exec,
            local_registry,
        }
    }
}

/// All shader sources of one technique pass.
///
/// The hit vector has one entry per unique material; advanced shadow
/// vectors are empty unless the variant uses advanced shadow handling.
#[derive(Debug, Clone, Default)]
pub struct TechniqueVariant {
    pub device: ShaderOutput<String>,
    pub primary_traversal: ShaderOutput<String>,
    pub secondary_traversal: ShaderOutput<String>,
    pub ray_generation: ShaderOutput<String>,
    pub miss: ShaderOutput<String>,
    pub hits: Vec<ShaderOutput<String>>,
    pub advanced_shadow_hits: Vec<ShaderOutput<String>>,
    pub advanced_shadow_misses: Vec<ShaderOutput<String>>,
    pub callbacks: [Option<ShaderOutput<String>>; CallbackType::COUNT],
    pub tonemap: Option<ShaderOutput<String>>,
    pub imageinfo: Option<ShaderOutput<String>>,
    pub bake: Option<ShaderOutput<String>>,
}

impl TechniqueVariant {
    /// Whether both advanced shadow shader families are present.
    #[must_use]
    pub fn has_advanced_shadow_handling(&self) -> bool {
        !self.advanced_shadow_hits.is_empty() && !self.advanced_shadow_misses.is_empty()
    }
}
