//! Per-device residency data and resource caches.
//!
//! Everything a shader variant touches on one device is cached here:
//! BVH proxies, table proxies, decoded images, named buffers, the GPU
//! stream pairs and the device-side film/AOV copies. Lookups are keyed
//! by absolute path (or resource id translated to a path) and survive
//! for the lifetime of the device.

use hashbrown::HashMap;
use helios_core::ParameterSet;
use helios_stats::{ShaderKey, ShaderType};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

use crate::backend::{DeviceArray, DeviceBackend};
use crate::settings::StreamRay;
use crate::stream::DeviceStream;

/// Width of a resident BVH proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvhWidth {
    W2,
    W4,
    W8,
}

/// Resident BVH nodes and leaves for one primitive type.
pub struct BvhProxy {
    pub width: BvhWidth,
    pub nodes: DeviceArray<u8>,
    pub leaves: DeviceArray<u8>,
}

/// Resident dynamic table.
pub struct DynTableProxy {
    pub entry_count: usize,
    pub lookups: DeviceArray<helios_scene::LookupEntry>,
    pub data: DeviceArray<u8>,
}

/// Resident raw byte buffer (fix tables, named request buffers).
#[derive(Default)]
pub struct DeviceBuffer {
    pub data: DeviceArray<u8>,
}

/// Resident float RGBA image.
#[derive(Default)]
pub struct DeviceImage {
    pub data: DeviceArray<f32>,
    pub width: usize,
    pub height: usize,
}

/// Resident packed 8-bit RGBA image.
#[derive(Default)]
pub struct DevicePackedImage {
    pub data: DeviceArray<u8>,
    pub width: usize,
    pub height: usize,
}

/// Usage numbers of one resource, attributed to the loading shader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceStats {
    pub counter: usize,
    pub memory_usage: usize,
}

/// Resources a shader pulled in, for telemetry.
#[derive(Default)]
pub struct ShaderInfo {
    pub images: HashMap<String, ResourceStats>,
    pub packed_images: HashMap<String, ResourceStats>,
}

/// Number of logical stream sides kept per GPU device.
pub const GPU_STREAM_BUFFER_COUNT: usize = 2;

/// All residency data of one device id.
pub struct DeviceData {
    pub bvh_ents: HashMap<String, BvhProxy>,
    pub dyntables: HashMap<String, DynTableProxy>,
    pub fixtables: HashMap<String, DeviceBuffer>,
    pub images: HashMap<String, DeviceImage>,
    pub packed_images: HashMap<String, DevicePackedImage>,
    pub buffers: HashMap<String, DeviceBuffer>,

    pub primary: [DeviceStream; GPU_STREAM_BUFFER_COUNT],
    pub secondary: [DeviceStream; GPU_STREAM_BUFFER_COUNT],
    /// Indices into `primary`/`secondary`, swapped by the GPU shaders.
    pub current_primary: [usize; GPU_STREAM_BUFFER_COUNT],
    pub current_secondary: [usize; GPU_STREAM_BUFFER_COUNT],

    pub film_pixels: DeviceArray<f32>,
    pub aovs: HashMap<String, DeviceArray<f32>>,
    pub tonemap_pixels: DeviceArray<u32>,

    pub ray_list: DeviceArray<StreamRay>,
    /// Upload stamp of the ray list, compared against the render pass
    /// counter so stale tracer rays are never reused.
    pub ray_list_stamp: u64,

    pub tmp_buffer: DeviceArray<i32>,
    pub tmp_ray_begins: DeviceArray<i32>,
    pub tmp_ray_ends: DeviceArray<i32>,

    /// Current shader context of GPU dispatches (CPU dispatches track
    /// this in the thread scratch instead).
    pub current_local_registry: Option<Arc<RwLock<ParameterSet>>>,
    pub current_shader_key: ShaderKey,
}

impl Default for DeviceData {
    fn default() -> Self {
        Self {
            bvh_ents: HashMap::new(),
            dyntables: HashMap::new(),
            fixtables: HashMap::new(),
            images: HashMap::new(),
            packed_images: HashMap::new(),
            buffers: HashMap::new(),
            primary: Default::default(),
            secondary: Default::default(),
            current_primary: [0, 1],
            current_secondary: [0, 1],
            film_pixels: DeviceArray::empty(),
            aovs: HashMap::new(),
            tonemap_pixels: DeviceArray::empty(),
            ray_list: DeviceArray::empty(),
            ray_list_stamp: 0,
            tmp_buffer: DeviceArray::empty(),
            tmp_ray_begins: DeviceArray::empty(),
            tmp_ray_ends: DeviceArray::empty(),
            current_local_registry: None,
            current_shader_key: ShaderKey::new(0, ShaderType::Device, 0),
        }
    }
}

/// A decoded float RGBA image ready for upload.
pub struct LoadedImage {
    pub pixels: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl LoadedImage {
    /// The 1×1 magenta substitute for failed loads.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            pixels: vec![1.0, 0.0, 1.0, 1.0],
            width: 1,
            height: 1,
            channels: 4,
        }
    }
}

/// A decoded packed RGBA image ready for upload.
pub struct LoadedPackedImage {
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl LoadedPackedImage {
    /// The 1×1 magenta substitute for failed loads.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            pixels: vec![255, 0, 255, 255],
            width: 1,
            height: 1,
            channels: 4,
        }
    }
}

/// Decode an image file into float RGBA.
pub fn load_image_file(path: &str) -> Result<LoadedImage, String> {
    let img = image::open(path).map_err(|e| format!("Failed to load image '{path}': {e}"))?;
    let channels = img.color().channel_count() as usize;
    let rgba = img.to_rgba32f();
    let (width, height) = rgba.dimensions();
    Ok(LoadedImage {
        pixels: rgba.into_raw(),
        width: width as usize,
        height: height as usize,
        channels,
    })
}

/// Decode an image file into packed 8-bit RGBA.
///
/// With `linear` set the samples are converted from sRGB into linear
/// space; otherwise the encoded bytes are kept as stored.
pub fn load_packed_image_file(path: &str, linear: bool) -> Result<LoadedPackedImage, String> {
    let img = image::open(path).map_err(|e| format!("Failed to load image '{path}': {e}"))?;
    let channels = img.color().channel_count() as usize;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixels = rgba.into_raw();

    if linear {
        for px in pixels.chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = srgb_to_linear_u8(*c);
            }
        }
    }

    Ok(LoadedPackedImage {
        pixels,
        width: width as usize,
        height: height as usize,
        channels,
    })
}

fn srgb_to_linear_u8(value: u8) -> u8 {
    let v = f32::from(value) / 255.0;
    let linear = if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    };
    (linear * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

/// Upload a decoded image.
#[must_use]
pub fn upload_image(backend: &DeviceBackend, img: &LoadedImage, label: &str) -> DeviceImage {
    DeviceImage {
        data: backend.copy_to_device(&img.pixels, label),
        width: img.width,
        height: img.height,
    }
}

/// Upload a decoded packed image.
#[must_use]
pub fn upload_packed_image(
    backend: &DeviceBackend,
    img: &LoadedPackedImage,
    label: &str,
) -> DevicePackedImage {
    DevicePackedImage {
        data: backend.copy_to_device(&img.pixels, label),
        width: img.width,
        height: img.height,
    }
}

/// Read a raw buffer file.
pub fn read_buffer_file(path: &str) -> std::io::Result<Vec<u8>> {
    let data = std::fs::read(path)?;
    if data.len() % 4 != 0 {
        error!("Buffer '{path}' is not properly sized");
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_image_is_magenta() {
        let img = LoadedImage::fallback();
        assert_eq!(img.width, 1);
        assert_eq!(img.height, 1);
        assert_eq!(img.pixels, vec![1.0, 0.0, 1.0, 1.0]);

        let packed = LoadedPackedImage::fallback();
        assert_eq!(packed.pixels, vec![255, 0, 255, 255]);
    }

    #[test]
    fn missing_file_reports_error() {
        assert!(load_image_file("/definitely/not/here.png").is_err());
        assert!(load_packed_image_file("/definitely/not/here.png", true).is_err());
    }

    #[test]
    fn srgb_endpoints_are_stable() {
        assert_eq!(srgb_to_linear_u8(0), 0);
        assert_eq!(srgb_to_linear_u8(255), 255);
        assert!(srgb_to_linear_u8(128) < 128);
    }
}
