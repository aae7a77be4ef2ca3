//! Fixture scene: a single emissive triangle.
//!
//! The "scene description" on disk is ignored; the loader builds the
//! database in memory. Vertices are `(0,0,0)`, `(1,0,0)`, `(0,1,0)`
//! with radiance `(1,1,1)`, watched by a perspective camera at
//! `(0,0,-2)` looking towards `+z` with a vertical fov of 60 degrees.

use std::path::Path;

use glam::Vec3;
use helios_core::{BoundingBox, CameraOrientation, ParameterSet};
use helios_scene::{
    DynTable, FixTable, LoaderError, LoaderOptions, LoaderResult, SceneDatabase, SceneLoader,
    ShaderOutput, SpecializationMode, TechniqueInfo, TechniqueVariant, TechniqueVariantInfo,
};

/// Triangle vertices shared between database and expectations.
pub const TRIANGLE: [Vec3; 3] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
];

/// Radiance of the emissive triangle material.
pub const RADIANCE: [f32; 3] = [1.0, 1.0, 1.0];

/// Vertical camera fov in degrees, published via the local registry.
pub const CAMERA_FOV: f32 = 60.0;

/// Value the probe shader sees for "probe" in its local registry when
/// the loader embedded it under forced specialization.
pub const EMBEDDED_PROBE_VALUE: i32 = 99;

fn triangle_database() -> SceneDatabase {
    let mut db = SceneDatabase::default();

    let mut triangles = FixTable::new();
    {
        let data = triangles.add_entry(4);
        for vertex in &TRIANGLE {
            for value in vertex.to_array() {
                data.extend_from_slice(&value.to_ne_bytes());
            }
        }
    }
    db.fix_tables.insert("triangles".to_string(), triangles);

    let mut entities = FixTable::new();
    {
        let data = entities.add_entry(4);
        data.extend_from_slice(&0i32.to_ne_bytes()); // material id
        data.extend_from_slice(&0i32.to_ne_bytes()); // primitive offset
    }
    db.fix_tables.insert("entities".to_string(), entities);

    let mut materials = DynTable::new();
    {
        let data = materials.add_lookup(0, 0, 4);
        for value in RADIANCE {
            data.extend_from_slice(&value.to_ne_bytes());
        }
    }
    db.dyn_tables.insert("materials".to_string(), materials);

    db.material_count = 1;
    db.entity_to_material = vec![0];
    let mut bbox = BoundingBox::empty();
    for vertex in &TRIANGLE {
        bbox.extend(*vertex);
    }
    db.scene_bbox = bbox;
    db.scene_radius = bbox.radius();
    db
}

fn camera_registry() -> ParameterSet {
    let mut registry = ParameterSet::new();
    registry.set_float("__camera_fov", CAMERA_FOV);
    registry
}

fn slot(tag: &str) -> ShaderOutput<String> {
    ShaderOutput::new(tag.to_string())
}

fn slot_with_camera(tag: &str) -> ShaderOutput<String> {
    ShaderOutput::with_registry(tag.to_string(), camera_registry())
}

/// The full streaming pipeline variant used by the "ao" technique.
fn ao_variant() -> TechniqueVariant {
    TechniqueVariant {
        device: slot("fixture:device:ao"),
        primary_traversal: slot("fixture:traversal:triangle"),
        secondary_traversal: slot("fixture:traversal:noop"),
        ray_generation: slot_with_camera("fixture:raygen:perspective"),
        miss: slot("fixture:miss:black"),
        hits: vec![slot("fixture:hit:emissive")],
        callbacks: [
            Some(slot("fixture:callback:before")),
            Some(slot("fixture:callback:after")),
        ],
        tonemap: Some(slot("fixture:tonemap:clamp")),
        imageinfo: Some(slot("fixture:imageinfo:luminance")),
        ..Default::default()
    }
}

/// Single-pass variant writing camera-space normals into an AOV while
/// the main framebuffer stays locked.
fn normals_variant() -> TechniqueVariant {
    TechniqueVariant {
        device: slot_with_camera("fixture:device:normals"),
        primary_traversal: slot("fixture:traversal:noop"),
        secondary_traversal: slot("fixture:traversal:noop"),
        ray_generation: slot("fixture:raygen:noop"),
        miss: slot("fixture:miss:black"),
        hits: vec![slot("fixture:hit:emissive")],
        tonemap: Some(slot("fixture:tonemap:clamp")),
        imageinfo: Some(slot("fixture:imageinfo:luminance")),
        ..Default::default()
    }
}

fn marker_variant(tag: &str) -> TechniqueVariant {
    TechniqueVariant {
        device: slot(tag),
        primary_traversal: slot("fixture:traversal:noop"),
        secondary_traversal: slot("fixture:traversal:noop"),
        ray_generation: slot("fixture:raygen:noop"),
        miss: slot("fixture:miss:black"),
        hits: vec![slot("fixture:hit:emissive")],
        tonemap: Some(slot("fixture:tonemap:clamp")),
        imageinfo: Some(slot("fixture:imageinfo:luminance")),
        ..Default::default()
    }
}

fn tracer_variant() -> TechniqueVariant {
    TechniqueVariant {
        device: slot("fixture:device:trace"),
        primary_traversal: slot("fixture:traversal:noop"),
        secondary_traversal: slot("fixture:traversal:noop"),
        ray_generation: slot("fixture:raygen:noop"),
        miss: slot("fixture:miss:black"),
        hits: vec![slot("fixture:hit:emissive")],
        tonemap: Some(slot("fixture:tonemap:clamp")),
        imageinfo: Some(slot("fixture:imageinfo:luminance")),
        ..Default::default()
    }
}

/// Parameter-probe variant: the device shader samples registry values
/// into the first framebuffer pixels.
fn probe_variant(specialization: SpecializationMode) -> TechniqueVariant {
    let mut registry = ParameterSet::new();
    registry.set_int("local_probe", 7);
    if specialization == SpecializationMode::Force {
        // Forced specialization embeds user parameters at generation
        // time instead of leaving them as registry lookups
        registry.set_int("probe", EMBEDDED_PROBE_VALUE);
    }
    TechniqueVariant {
        device: ShaderOutput::with_registry("fixture:device:probe".to_string(), registry),
        primary_traversal: slot("fixture:traversal:noop"),
        secondary_traversal: slot("fixture:traversal:noop"),
        ray_generation: slot("fixture:raygen:noop"),
        miss: slot("fixture:miss:black"),
        hits: vec![slot("fixture:hit:emissive")],
        tonemap: Some(slot("fixture:tonemap:clamp")),
        imageinfo: Some(slot("fixture:imageinfo:luminance")),
        ..Default::default()
    }
}

/// Select variant 0 on even iterations and variant 1 on odd ones.
fn even_odd_selector(iteration: usize) -> Vec<usize> {
    vec![iteration % 2]
}

/// The fixture loader. The technique type picks the variant setup:
/// "ao" (default), "normals_ao", "flip", or "probe"; tracer options
/// replace the pipeline with a ray-list variant.
pub struct FixtureSceneLoader;

impl SceneLoader for FixtureSceneLoader {
    fn load(&self, _path: &Path, options: &LoaderOptions) -> Result<LoaderResult, LoaderError> {
        let technique = if options.technique_type.is_empty() {
            "ao"
        } else {
            options.technique_type.as_str()
        };

        let (variants, technique_info) = if options.is_tracer {
            (vec![tracer_variant()], TechniqueInfo::default())
        } else {
            match technique {
                "ao" => (
                    vec![ao_variant()],
                    TechniqueInfo {
                        variants: vec![TechniqueVariantInfo {
                            primary_payload_count: 2,
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                ),
                "normals_ao" => (
                    vec![normals_variant(), ao_variant()],
                    TechniqueInfo {
                        enabled_aovs: vec!["Normals".to_string()],
                        variants: vec![
                            TechniqueVariantInfo {
                                lock_framebuffer: true,
                                ..Default::default()
                            },
                            TechniqueVariantInfo {
                                primary_payload_count: 2,
                                ..Default::default()
                            },
                        ],
                        variant_selector: None,
                    },
                ),
                "flip" => (
                    vec![
                        marker_variant("fixture:device:mark_a"),
                        marker_variant("fixture:device:mark_b"),
                    ],
                    TechniqueInfo {
                        enabled_aovs: Vec::new(),
                        variants: vec![
                            TechniqueVariantInfo::default(),
                            TechniqueVariantInfo::default(),
                        ],
                        variant_selector: Some(even_odd_selector),
                    },
                ),
                "probe" => (
                    vec![probe_variant(options.specialization)],
                    TechniqueInfo::default(),
                ),
                other => return Err(LoaderError::UnknownTechnique(other.to_string())),
            }
        };

        let camera = if options.camera_type.is_empty() {
            "perspective".to_string()
        } else {
            options.camera_type.clone()
        };

        Ok(LoaderResult {
            database: triangle_database(),
            technique_info,
            variants,
            resource_map: Vec::new(),
            camera_orientation: CameraOrientation {
                eye: Vec3::new(0.0, 0.0, -2.0),
                dir: Vec3::new(0.0, 0.0, 1.0),
                up: Vec3::new(0.0, 1.0, 0.0),
            },
            film_width: if options.film_width > 0 {
                options.film_width
            } else {
                64
            },
            film_height: if options.film_height > 0 {
                options.film_height
            } else {
                64
            },
            camera_type: camera,
            technique_type: technique.to_string(),
        })
    }
}
