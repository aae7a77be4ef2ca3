//! Scene database and technique descriptions for the Helios renderer.
//!
//! This crate holds everything the loader collaborator produces for the
//! device and runtime:
//! - Dynamic and fixed record tables plus opaque BVH blobs
//! - The immutable [`SceneDatabase`]
//! - Technique metadata ([`TechniqueInfo`], [`TechniqueVariantInfo`])
//! - Shader source variants and the loader interface

pub mod database;
pub mod loader;
pub mod table;
pub mod technique;
pub mod variant;

pub use database::{SceneBvh, SceneDatabase};
pub use loader::{LoaderError, LoaderOptions, LoaderResult, SceneLoader, SpecializationMode};
pub use table::{DynTable, FixTable, LookupEntry};
pub use technique::{
    CallbackType, ShadowHandlingMode, TechniqueInfo, TechniqueVariantInfo, VariantSelector,
};
pub use variant::{ShaderOutput, TechniqueVariant};
