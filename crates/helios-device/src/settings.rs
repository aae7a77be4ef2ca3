//! Plain structs crossing the generated-shader ABI.
//!
//! Everything in here is `#[repr(C)]`; the layout is part of the
//! contract with the compiled shaders and locked by tests.

use bytemuck::{Pod, Zeroable};

/// Per-iteration driver block handed to every shader launch.
///
/// The device zero-initialises it once and overwrites the dynamic
/// fields before each iteration.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct DriverSettings {
    /// Device id (0 = host).
    pub device: i32,
    /// Requested CPU thread count (0 = hardware default).
    pub thread_count: i32,
    /// Samples per iteration of the current variant.
    pub spi: i32,
    /// Frame counter (interactive sessions).
    pub frame: i32,
    /// Iteration counter.
    pub iter: i32,
    /// Work width in pixels (or rays in tracer mode).
    pub width: i32,
    /// Work height in pixels (1 in tracer mode).
    pub height: i32,
    /// Base random seed.
    pub seed: i32,
}

/// Effective work geometry and shadow mode, queried by shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct WorkInfo {
    pub width: i32,
    pub height: i32,
    pub advanced_shadows: i32,
    pub advanced_shadows_with_materials: i32,
    pub framebuffer_locked: i32,
}

/// Scene-wide counts exposed to shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct SceneInfoAbi {
    pub num_entities: i32,
    pub num_materials: i32,
}

/// One ray of the tracer-mode ray list, as laid out on the device.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct StreamRay {
    pub org: [f32; 3],
    pub dir: [f32; 3],
    pub tmin: f32,
    pub tmax: f32,
}

/// Dynamic table view handed to shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DynTableData {
    pub count: u64,
    pub header: *const helios_scene::LookupEntry,
    pub size: u64,
    pub start: *const u8,
}

impl Default for DynTableData {
    fn default() -> Self {
        Self {
            count: 0,
            header: std::ptr::null(),
            size: 0,
            start: std::ptr::null(),
        }
    }
}

/// Per-thread traversal scratch handed to shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TemporaryStorageHost {
    pub ray_begins: *mut i32,
    pub ray_ends: *mut i32,
}

impl Default for TemporaryStorageHost {
    fn default() -> Self {
        Self {
            ray_begins: std::ptr::null_mut(),
            ray_ends: std::ptr::null_mut(),
        }
    }
}

/// Tonemap parameters handed to the tonemap shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct TonemapParams {
    pub method: i32,
    pub use_gamma: i32,
    pub scale: f32,
    pub exposure_factor: f32,
    pub exposure_offset: f32,
}

/// Imageinfo parameters handed to the imageinfo shader.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageInfoParams {
    pub scale: f32,
    pub bins: i32,
    pub histogram: *mut i32,
}

impl Default for ImageInfoParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            bins: 0,
            histogram: std::ptr::null_mut(),
        }
    }
}

/// Aggregates written by the imageinfo shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct ImageInfoOutputAbi {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
    pub soft_min: f32,
    pub soft_max: f32,
    pub median: f32,
}

/// Column pointers of the primary ray stream.
///
/// The device writes the fixed columns in this exact order followed by
/// the payload base pointer; payload columns are laid out contiguously
/// with the same stride.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PrimaryStreamAbi {
    pub id: *mut i32,
    pub org_x: *mut f32,
    pub org_y: *mut f32,
    pub org_z: *mut f32,
    pub dir_x: *mut f32,
    pub dir_y: *mut f32,
    pub dir_z: *mut f32,
    pub tmin: *mut f32,
    pub tmax: *mut f32,
    pub ent_id: *mut i32,
    pub prim_id: *mut i32,
    pub t: *mut f32,
    pub u: *mut f32,
    pub v: *mut f32,
    pub rnd: *mut u32,
    pub mis: *mut f32,
    pub contrib_r: *mut f32,
    pub contrib_g: *mut f32,
    pub contrib_b: *mut f32,
    pub depth: *mut i32,
    pub payload: *mut f32,
}

impl Default for PrimaryStreamAbi {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

/// Column pointers of the secondary (shadow) ray stream.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SecondaryStreamAbi {
    pub id: *mut i32,
    pub org_x: *mut f32,
    pub org_y: *mut f32,
    pub org_z: *mut f32,
    pub dir_x: *mut f32,
    pub dir_y: *mut f32,
    pub dir_z: *mut f32,
    pub tmin: *mut f32,
    pub tmax: *mut f32,
    pub mat_id: *mut i32,
    pub color_r: *mut f32,
    pub color_g: *mut f32,
    pub color_b: *mut f32,
    pub payload: *mut f32,
}

impl Default for SecondaryStreamAbi {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

/// Fixed column count of the primary stream, without payload.
pub const MIN_PRIMARY_STREAM_SIZE: usize =
    (std::mem::size_of::<PrimaryStreamAbi>() / std::mem::size_of::<*mut f32>()) - 1;

/// Fixed column count of the secondary stream, without payload.
pub const MIN_SECONDARY_STREAM_SIZE: usize =
    (std::mem::size_of::<SecondaryStreamAbi>() / std::mem::size_of::<*mut f32>()) - 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn driver_settings_layout() {
        assert_eq!(size_of::<DriverSettings>(), 32);
        assert_eq!(offset_of!(DriverSettings, device), 0);
        assert_eq!(offset_of!(DriverSettings, spi), 8);
        assert_eq!(offset_of!(DriverSettings, seed), 28);
    }

    #[test]
    fn stream_minimums_match_column_layout() {
        // 9 ray columns + 11 hit/shading columns
        assert_eq!(MIN_PRIMARY_STREAM_SIZE, 20);
        // 9 ray columns + material id + 3 color columns
        assert_eq!(MIN_SECONDARY_STREAM_SIZE, 13);
    }

    #[test]
    fn dyn_table_data_layout() {
        assert_eq!(offset_of!(DynTableData, count), 0);
        assert_eq!(offset_of!(DynTableData, header), 8);
        assert_eq!(offset_of!(DynTableData, size), 16);
        assert_eq!(offset_of!(DynTableData, start), 24);
        assert_eq!(size_of::<DynTableData>(), 32);
    }

    #[test]
    fn stream_ray_is_32_bytes() {
        assert_eq!(size_of::<StreamRay>(), 32);
    }
}
