//! The C-ABI surface generated shaders call back into.
//!
//! Compiled shader code never holds a language-level reference to the
//! device; it calls in through these exported functions, which resolve
//! against the process-wide interface installed by [`crate::Device`].
//! Every function degrades to a logged error plus a zero/null result
//! when no device is installed.

use std::ffi::{c_char, CStr};
use std::sync::Arc;

use glam::{Vec3, Vec4};
use helios_scene::ShadowHandlingMode;
use parking_lot::RwLock;
use tracing::error;

use crate::error::{DeviceError, Result};
use crate::interface::Interface;
use crate::settings::{
    DynTableData, PrimaryStreamAbi, SceneInfoAbi, SecondaryStreamAbi, StreamRay,
    TemporaryStorageHost, WorkInfo,
};

static CURRENT: RwLock<Option<Arc<Interface>>> = RwLock::new(None);

/// Install the interface singleton. Only one device may exist at a time.
pub(crate) fn install(interface: Arc<Interface>) -> Result<()> {
    let mut current = CURRENT.write();
    if current.is_some() {
        return Err(DeviceError::InvalidState(
            "Only a single device instance is allowed".to_string(),
        ));
    }
    *current = Some(interface);
    Ok(())
}

/// Tear the singleton down again.
pub(crate) fn uninstall() {
    *CURRENT.write() = None;
}

fn with<R>(default: R, f: impl FnOnce(&Interface) -> R) -> R {
    let interface = CURRENT.read().clone();
    match interface {
        Some(interface) => f(interface.as_ref()),
        None => {
            error!("Shader ABI called without an installed device");
            default
        }
    }
}

unsafe fn cstr<'a>(ptr: *const c_char) -> &'a str {
    if ptr.is_null() {
        return "";
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap_or("")
}

// ------------------------------------------------------------ film

#[no_mangle]
pub unsafe extern "C" fn helios_get_film_data(
    dev: i32,
    pixels: *mut *mut f32,
    width: *mut i32,
    height: *mut i32,
) {
    with((), |interface| {
        let (data, _) = interface.film_image(dev);
        let info = interface.work_info();
        unsafe {
            *pixels = data;
            *width = info.width;
            *height = info.height;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_aov_image(
    dev: i32,
    name: *const c_char,
    aov_pixels: *mut *mut f32,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        let acc = interface.aov_image(dev, name);
        unsafe { *aov_pixels = acc.data };
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_mark_aov_as_used(name: *const c_char, iter: i32) {
    let name = unsafe { cstr(name) };
    with((), |interface| interface.mark_aov_as_used(name, iter));
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_work_info(info: *mut WorkInfo) {
    with((), |interface| unsafe { *info = interface.work_info() });
}

// ----------------------------------------------------------- scene

#[no_mangle]
pub unsafe extern "C" fn helios_load_bvh2_ent(
    dev: i32,
    prim_type: *const c_char,
    nodes: *mut *const u8,
    objs: *mut *const u8,
) {
    let prim_type = unsafe { cstr(prim_type) };
    with((), |interface| {
        let (n, o) = interface.load_bvh(dev, prim_type, crate::cache::BvhWidth::W2);
        unsafe {
            *nodes = n;
            *objs = o;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_bvh4_ent(
    dev: i32,
    prim_type: *const c_char,
    nodes: *mut *const u8,
    objs: *mut *const u8,
) {
    let prim_type = unsafe { cstr(prim_type) };
    with((), |interface| {
        let (n, o) = interface.load_bvh(dev, prim_type, crate::cache::BvhWidth::W4);
        unsafe {
            *nodes = n;
            *objs = o;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_bvh8_ent(
    dev: i32,
    prim_type: *const c_char,
    nodes: *mut *const u8,
    objs: *mut *const u8,
) {
    let prim_type = unsafe { cstr(prim_type) };
    with((), |interface| {
        let (n, o) = interface.load_bvh(dev, prim_type, crate::cache::BvhWidth::W8);
        unsafe {
            *nodes = n;
            *objs = o;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_scene_info(_dev: i32, info: *mut SceneInfoAbi) {
    with((), |interface| unsafe { *info = interface.scene_info() });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_dyntable(
    dev: i32,
    name: *const c_char,
    table: *mut DynTableData,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        let data = interface.load_dyntable(dev, name);
        unsafe { *table = data };
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_fixtable(
    dev: i32,
    name: *const c_char,
    data: *mut *const u8,
    size: *mut i32,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        let (ptr, len) = interface.load_fixtable(dev, name);
        unsafe {
            *data = ptr;
            *size = len;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_rays(dev: i32, list: *mut *const StreamRay) {
    with((), |interface| {
        let ptr = interface.load_rays(dev);
        unsafe { *list = ptr };
    });
}

// ---------------------------------------------------------- images

#[no_mangle]
pub unsafe extern "C" fn helios_load_image(
    dev: i32,
    file: *const c_char,
    pixels: *mut *const f32,
    width: *mut i32,
    height: *mut i32,
    expected_channels: i32,
) {
    let file = unsafe { cstr(file) };
    with((), |interface| {
        let (ptr, w, h) = interface.load_image(dev, file, expected_channels);
        unsafe {
            *pixels = ptr;
            *width = w;
            *height = h;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_image_by_id(
    dev: i32,
    id: i32,
    pixels: *mut *const f32,
    width: *mut i32,
    height: *mut i32,
    expected_channels: i32,
) {
    with((), |interface| {
        let file = interface.lookup_resource_path(id);
        let (ptr, w, h) = interface.load_image(dev, &file, expected_channels);
        unsafe {
            *pixels = ptr;
            *width = w;
            *height = h;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_packed_image(
    dev: i32,
    file: *const c_char,
    pixels: *mut *const u8,
    width: *mut i32,
    height: *mut i32,
    expected_channels: i32,
    linear: bool,
) {
    let file = unsafe { cstr(file) };
    with((), |interface| {
        let (ptr, w, h) = interface.load_packed_image(dev, file, expected_channels, linear);
        unsafe {
            *pixels = ptr;
            *width = w;
            *height = h;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_packed_image_by_id(
    dev: i32,
    id: i32,
    pixels: *mut *const u8,
    width: *mut i32,
    height: *mut i32,
    expected_channels: i32,
    linear: bool,
) {
    with((), |interface| {
        let file = interface.lookup_resource_path(id);
        let (ptr, w, h) = interface.load_packed_image(dev, &file, expected_channels, linear);
        unsafe {
            *pixels = ptr;
            *width = w;
            *height = h;
        }
    });
}

// --------------------------------------------------------- buffers

#[no_mangle]
pub unsafe extern "C" fn helios_load_buffer(
    dev: i32,
    file: *const c_char,
    data: *mut *const u8,
    size: *mut i32,
) {
    let file = unsafe { cstr(file) };
    with((), |interface| {
        let (ptr, len) = interface.load_buffer(dev, file);
        unsafe {
            *data = ptr;
            *size = len;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_load_buffer_by_id(
    dev: i32,
    id: i32,
    data: *mut *const u8,
    size: *mut i32,
) {
    with((), |interface| {
        let file = interface.lookup_resource_path(id);
        let (ptr, len) = interface.load_buffer(dev, &file);
        unsafe {
            *data = ptr;
            *size = len;
        }
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_request_buffer(
    dev: i32,
    name: *const c_char,
    data: *mut *mut u8,
    size: i32,
    flags: i32,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        let (ptr, _) = interface.request_buffer(dev, name, size, flags);
        unsafe { *data = ptr };
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_dbg_dump_buffer(
    dev: i32,
    name: *const c_char,
    filename: *const c_char,
) {
    let name = unsafe { cstr(name) };
    let filename = unsafe { cstr(filename) };
    with((), |interface| interface.dump_buffer(dev, name, filename));
}

// -------------------------------------------------------- scratch

#[no_mangle]
pub unsafe extern "C" fn helios_get_temporary_storage(dev: i32, temp: *mut TemporaryStorageHost) {
    with((), |interface| {
        let storage = interface.temporary_storage_host(dev);
        unsafe { *temp = storage };
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_gpu_get_tmp_buffer(dev: i32, buf: *mut *mut i32) {
    with((), |interface| {
        let (ptr, _) = interface.gpu_temporary_buffer(dev);
        unsafe { *buf = ptr };
    });
}

// -------------------------------------------------------- streams

#[no_mangle]
pub unsafe extern "C" fn helios_get_primary_stream(
    dev: i32,
    id: i32,
    primary: *mut PrimaryStreamAbi,
    size: i32,
) {
    with((), |interface| {
        interface.primary_stream(dev, id, size, unsafe { &mut *primary });
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_primary_stream_const(
    dev: i32,
    id: i32,
    primary: *mut PrimaryStreamAbi,
) {
    with((), |interface| {
        interface.primary_stream_const(dev, id, unsafe { &mut *primary });
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_secondary_stream(
    dev: i32,
    id: i32,
    secondary: *mut SecondaryStreamAbi,
    size: i32,
) {
    with((), |interface| {
        interface.secondary_stream(dev, id, size, unsafe { &mut *secondary });
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_secondary_stream_const(
    dev: i32,
    id: i32,
    secondary: *mut SecondaryStreamAbi,
) {
    with((), |interface| {
        interface.secondary_stream_const(dev, id, unsafe { &mut *secondary });
    });
}

#[no_mangle]
pub extern "C" fn helios_gpu_swap_primary_streams(dev: i32) {
    with((), |interface| interface.swap_primary_streams(dev));
}

#[no_mangle]
pub extern "C" fn helios_gpu_swap_secondary_streams(dev: i32) {
    with((), |interface| interface.swap_secondary_streams(dev));
}

// ------------------------------------------------------- threading

#[no_mangle]
pub extern "C" fn helios_register_thread() {
    with((), Interface::register_thread);
}

#[no_mangle]
pub extern "C" fn helios_unregister_thread() {
    with((), Interface::unregister_thread);
}

// ------------------------------------------------------ dispatches

#[no_mangle]
pub extern "C" fn helios_handle_traverse_primary(dev: i32, size: i32) {
    with((), |interface| interface.run_traversal_shader(dev, size, true));
}

#[no_mangle]
pub extern "C" fn helios_handle_traverse_secondary(dev: i32, size: i32) {
    with((), |interface| {
        interface.run_traversal_shader(dev, size, false);
    });
}

#[no_mangle]
pub extern "C" fn helios_handle_ray_generation(
    dev: i32,
    next_id: i32,
    size: i32,
    xmin: i32,
    ymin: i32,
    xmax: i32,
    ymax: i32,
) -> i32 {
    with(-1, |interface| {
        interface.run_ray_generation_shader(dev, next_id, size, xmin, ymin, xmax, ymax)
    })
}

#[no_mangle]
pub extern "C" fn helios_handle_miss_shader(dev: i32, first: i32, last: i32) {
    with((), |interface| interface.run_miss_shader(dev, first, last));
}

#[no_mangle]
pub extern "C" fn helios_handle_hit_shader(dev: i32, entity_id: i32, first: i32, last: i32) {
    with((), |interface| {
        interface.run_hit_shader(dev, entity_id, first, last);
    });
}

#[no_mangle]
pub extern "C" fn helios_handle_advanced_shadow_shader(
    dev: i32,
    material_id: i32,
    first: i32,
    last: i32,
    is_hit: bool,
) {
    with((), |interface| {
        // Without material specialization every shadow ray is served by
        // the material-agnostic shader at index 0
        if interface.shadow_handling_mode() == ShadowHandlingMode::Advanced {
            interface.run_advanced_shadow_shader(dev, 0, first, last, is_hit);
        } else {
            interface.run_advanced_shadow_shader(dev, material_id, first, last, is_hit);
        }
    });
}

#[no_mangle]
pub extern "C" fn helios_handle_callback_shader(dev: i32, ty: i32) {
    with((), |interface| interface.run_callback_shader(dev, ty));
}

// ------------------------------------------------------ parameters

#[no_mangle]
pub unsafe extern "C" fn helios_get_parameter_i32(
    dev: i32,
    name: *const c_char,
    def: i32,
    global: bool,
) -> i32 {
    let name = unsafe { cstr(name) };
    with(def, |interface| interface.parameter_i32(dev, name, def, global))
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_parameter_f32(
    dev: i32,
    name: *const c_char,
    def: f32,
    global: bool,
) -> f32 {
    let name = unsafe { cstr(name) };
    with(def, |interface| interface.parameter_f32(dev, name, def, global))
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_parameter_vector(
    dev: i32,
    name: *const c_char,
    def_x: f32,
    def_y: f32,
    def_z: f32,
    x: *mut f32,
    y: *mut f32,
    z: *mut f32,
    global: bool,
) {
    let name = unsafe { cstr(name) };
    let def = Vec3::new(def_x, def_y, def_z);
    let value = with(def, |interface| {
        interface.parameter_vector(dev, name, def, global)
    });
    unsafe {
        *x = value.x;
        *y = value.y;
        *z = value.z;
    }
}

#[no_mangle]
pub unsafe extern "C" fn helios_get_parameter_color(
    dev: i32,
    name: *const c_char,
    def_r: f32,
    def_g: f32,
    def_b: f32,
    def_a: f32,
    r: *mut f32,
    g: *mut f32,
    b: *mut f32,
    a: *mut f32,
    global: bool,
) {
    let name = unsafe { cstr(name) };
    let def = Vec4::new(def_r, def_g, def_b, def_a);
    let value = with(def, |interface| {
        interface.parameter_color(dev, name, def, global)
    });
    unsafe {
        *r = value.x;
        *g = value.y;
        *b = value.z;
        *a = value.w;
    }
}

#[no_mangle]
pub unsafe extern "C" fn helios_set_parameter_i32(
    dev: i32,
    name: *const c_char,
    value: i32,
    global: bool,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        interface.set_parameter_i32(dev, name, value, global);
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_set_parameter_f32(
    dev: i32,
    name: *const c_char,
    value: f32,
    global: bool,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        interface.set_parameter_f32(dev, name, value, global);
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_set_parameter_vector(
    dev: i32,
    name: *const c_char,
    x: f32,
    y: f32,
    z: f32,
    global: bool,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        interface.set_parameter_vector(dev, name, Vec3::new(x, y, z), global);
    });
}

#[no_mangle]
pub unsafe extern "C" fn helios_set_parameter_color(
    dev: i32,
    name: *const c_char,
    r: f32,
    g: f32,
    b: f32,
    a: f32,
    global: bool,
) {
    let name = unsafe { cstr(name) };
    with((), |interface| {
        interface.set_parameter_color(dev, name, Vec4::new(r, g, b, a), global);
    });
}

// ------------------------------------------------------ statistics

#[no_mangle]
pub extern "C" fn helios_stats_begin_section(id: i32) {
    with((), |interface| interface.abi_begin_section(id));
}

#[no_mangle]
pub extern "C" fn helios_stats_end_section(id: i32) {
    with((), |interface| interface.abi_end_section(id));
}

#[no_mangle]
pub extern "C" fn helios_stats_add(id: i32, value: i32) {
    with((), |interface| {
        interface.abi_add_quantity(id, value.max(0) as u64);
    });
}
