//! Loader collaborator interface.
//!
//! Scene parsing (JSON/glTF or anything else) lives outside the core.
//! A [`SceneLoader`] turns a scene description into the immutable
//! [`SceneDatabase`] plus technique metadata and shader sources.

use std::path::Path;

use thiserror::Error;

use helios_core::{CameraOrientation, Target};

use crate::database::SceneDatabase;
use crate::technique::TechniqueInfo;
use crate::variant::TechniqueVariant;

/// Loader errors.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene parse error: {0}")]
    Parse(String),

    #[error("Unknown technique type: {0}")]
    UnknownTechnique(String),

    #[error("Unknown camera type: {0}")]
    UnknownCamera(String),
}

/// How aggressively generated shaders specialise on parameters.
///
/// Applied by the loader while generating shader text: embedded
/// parameters become constants in the source, dynamic ones stay
/// registry lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecializationMode {
    /// Parameters are embedded or kept dynamic depending on their kind.
    #[default]
    Default,
    /// Embed all parameters. Increases compile time.
    Force,
    /// Keep all but structural parameters dynamic.
    Disable,
}

/// Options handed to the loader, resolved from scene file and runtime
/// option overrides. Zero values mean "take it from the scene".
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub target: Target,
    /// Technique override; empty keeps the scene's technique.
    pub technique_type: String,
    /// Camera override; empty keeps the scene's camera.
    pub camera_type: String,
    /// Film override; zero keeps the scene's film size.
    pub film_width: usize,
    pub film_height: usize,
    /// Samples-per-iteration hint; zero selects automatically.
    pub samples_per_iteration: usize,
    /// Tracer mode replaces camera ray generation by a ray list.
    pub is_tracer: bool,
    pub enable_tonemapping: bool,
    pub specialization: SpecializationMode,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            target: Target::pick_cpu(),
            technique_type: String::new(),
            camera_type: String::new(),
            film_width: 0,
            film_height: 0,
            samples_per_iteration: 0,
            is_tracer: false,
            enable_tonemapping: true,
            specialization: SpecializationMode::default(),
        }
    }
}

/// Everything the loader produces for the runtime.
pub struct LoaderResult {
    pub database: SceneDatabase,
    pub technique_info: TechniqueInfo,
    /// Shader sources, one entry per technique variant.
    pub variants: Vec<TechniqueVariant>,
    /// Resource paths indexed by the ids encoded in generated shaders.
    pub resource_map: Vec<String>,
    pub camera_orientation: CameraOrientation,
    /// Resolved film size after applying the overrides.
    pub film_width: usize,
    pub film_height: usize,
    /// Resolved camera and technique names.
    pub camera_type: String,
    pub technique_type: String,
}

/// The scene loading collaborator.
pub trait SceneLoader {
    /// Load a scene description and produce database plus variants.
    fn load(&self, path: &Path, options: &LoaderOptions) -> Result<LoaderResult, LoaderError>;
}
