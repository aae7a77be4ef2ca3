//! Native fixture shaders.
//!
//! These functions stand in for JIT-compiled shader code: they have the
//! exact entry signatures the device dispatches through and talk back
//! to it exclusively over the shader ABI, like generated code would.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;
use rayon::prelude::*;

use helios_device::abi::{
    helios_get_aov_image, helios_get_film_data, helios_get_parameter_f32,
    helios_get_parameter_i32, helios_get_parameter_vector, helios_get_primary_stream,
    helios_get_primary_stream_const, helios_handle_callback_shader, helios_handle_hit_shader,
    helios_handle_miss_shader, helios_handle_ray_generation, helios_handle_traverse_primary,
    helios_load_dyntable, helios_load_fixtable, helios_load_rays, helios_mark_aov_as_used,
    helios_register_thread, helios_request_buffer, helios_stats_add, helios_unregister_thread,
};
use helios_device::settings::{
    DriverSettings, DynTableData, ImageInfoOutputAbi, ImageInfoParams, PrimaryStreamAbi, StreamRay,
    TonemapParams,
};

use crate::scene::CAMERA_FOV;

/// Dispatch counters for selector and callback assertions.
pub static DEVICE_A_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static DEVICE_B_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static CALLBACK_BEFORE_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static CALLBACK_AFTER_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Reset all dispatch counters between tests.
pub fn reset_counters() {
    DEVICE_A_CALLS.store(0, Ordering::SeqCst);
    DEVICE_B_CALLS.store(0, Ordering::SeqCst);
    CALLBACK_BEFORE_CALLS.store(0, Ordering::SeqCst);
    CALLBACK_AFTER_CALLS.store(0, Ordering::SeqCst);
}

// ---------------------------------------------------------- camera

struct FixtureCamera {
    eye: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    tan_half: f32,
    aspect: f32,
}

impl FixtureCamera {
    /// Build from the registry: orientation from the global built-ins,
    /// fov from the shader's local registry.
    unsafe fn from_registry(width: i32, height: i32) -> Self {
        let mut eye = [0.0f32; 3];
        let mut dir = [0.0f32; 3];
        let mut up = [0.0f32; 3];
        unsafe {
            helios_get_parameter_vector(
                0,
                c"__camera_eye".as_ptr(),
                0.0,
                0.0,
                -2.0,
                &mut eye[0],
                &mut eye[1],
                &mut eye[2],
                true,
            );
            helios_get_parameter_vector(
                0,
                c"__camera_dir".as_ptr(),
                0.0,
                0.0,
                1.0,
                &mut dir[0],
                &mut dir[1],
                &mut dir[2],
                true,
            );
            helios_get_parameter_vector(
                0,
                c"__camera_up".as_ptr(),
                0.0,
                1.0,
                0.0,
                &mut up[0],
                &mut up[1],
                &mut up[2],
                true,
            );
        }
        let fov =
            unsafe { helios_get_parameter_f32(0, c"__camera_fov".as_ptr(), CAMERA_FOV, false) };

        let forward = Vec3::from_array(dir).normalize();
        let right = Vec3::from_array(up).cross(forward).normalize();
        let up = forward.cross(right);

        Self {
            eye: Vec3::from_array(eye),
            forward,
            right,
            up,
            tan_half: (fov.to_radians() * 0.5).tan(),
            aspect: width as f32 / height as f32,
        }
    }

    /// Primary ray through the pixel center, screen y pointing up.
    fn primary_ray(&self, x: i32, y: i32, width: i32, height: i32) -> (Vec3, Vec3) {
        let px = ((x as f32 + 0.5) / width as f32 * 2.0 - 1.0) * self.tan_half * self.aspect;
        let py = ((y as f32 + 0.5) / height as f32 * 2.0 - 1.0) * self.tan_half;
        let dir = (self.forward + self.right * px + self.up * py).normalize();
        (self.eye, dir)
    }
}

// ------------------------------------------------------ geometry

unsafe fn load_triangle() -> [Vec3; 3] {
    let mut data: *const u8 = std::ptr::null();
    let mut size = 0i32;
    unsafe {
        helios_load_fixtable(0, c"triangles".as_ptr(), &mut data, &mut size);
    }
    assert!(size >= 36, "triangle fixtable too small");
    let floats = data.cast::<f32>();
    let v = |i: usize| unsafe {
        Vec3::new(
            *floats.add(3 * i),
            *floats.add(3 * i + 1),
            *floats.add(3 * i + 2),
        )
    };
    [v(0), v(1), v(2)]
}

unsafe fn load_radiance() -> [f32; 3] {
    let mut table = DynTableData::default();
    unsafe {
        helios_load_dyntable(0, c"materials".as_ptr(), &mut table);
    }
    assert!(table.count >= 1, "materials dyntable empty");
    let lookup = unsafe { *table.header };
    let values = unsafe { table.start.add(lookup.offset as usize) }.cast::<f32>();
    unsafe { [*values, *values.add(1), *values.add(2)] }
}

/// Möller–Trumbore with inclusive edges.
fn intersect_triangle(
    org: Vec3,
    dir: Vec3,
    tri: &[Vec3; 3],
    tmin: f32,
    tmax: f32,
) -> Option<(f32, f32, f32)> {
    const EPS: f32 = 1e-6;

    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-9 {
        return None;
    }
    let inv = 1.0 / det;
    let s = org - tri[0];
    let u = s.dot(p) * inv;
    if u < -EPS || u > 1.0 + EPS {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < -EPS || u + v > 1.0 + EPS {
        return None;
    }
    let t = e2.dot(q) * inv;
    if t < tmin || t > tmax {
        return None;
    }
    Some((t, u.max(0.0), v.max(0.0)))
}

// ------------------------------------------------- pipeline shaders

/// Device shader of the "ao" technique: fan out over row bands, each
/// worker runs ray generation, traversal, and hit/miss partitioning.
pub unsafe extern "C" fn fixture_device_ao(settings: *const DriverSettings) {
    let s = unsafe { &*settings };
    let (width, height) = (s.width, s.height);
    helios_stats_add(0, width * height); // camera rays
    helios_handle_callback_shader(0, 0);

    const BAND: i32 = 16;
    let bands: Vec<i32> = (0..height).step_by(BAND as usize).collect();
    bands.par_iter().for_each(|&y0| {
        helios_register_thread();

        let y1 = (y0 + BAND).min(height);
        let size = width * (y1 - y0);
        let count = helios_handle_ray_generation(0, y0 * width, size, 0, y0, width, y1);
        if count > 0 {
            helios_handle_traverse_primary(0, count);

            let mut stream = PrimaryStreamAbi::default();
            unsafe {
                helios_get_primary_stream_const(0, 0, &mut stream);
            }

            // Dispatch contiguous runs of the same entity
            let mut first = 0i32;
            while first < count {
                let entity = unsafe { *stream.ent_id.add(first as usize) };
                let mut last = first + 1;
                while last < count && unsafe { *stream.ent_id.add(last as usize) } == entity {
                    last += 1;
                }
                if entity < 0 {
                    helios_handle_miss_shader(0, first, last);
                } else {
                    helios_handle_hit_shader(0, entity, first, last);
                }
                first = last;
            }
        }

        helios_unregister_thread();
    });

    helios_handle_callback_shader(0, 1);
}

/// Perspective ray generation over a work rectangle.
pub unsafe extern "C" fn fixture_raygen_perspective(
    settings: *const DriverSettings,
    next_id: i32,
    size: i32,
    xmin: i32,
    ymin: i32,
    xmax: i32,
    ymax: i32,
) -> i32 {
    let s = unsafe { &*settings };
    let camera = unsafe { FixtureCamera::from_registry(s.width, s.height) };

    let mut stream = PrimaryStreamAbi::default();
    unsafe {
        helios_get_primary_stream(0, 0, &mut stream, size);
    }

    let mut count = 0usize;
    for y in ymin..ymax {
        for x in xmin..xmax {
            if count as i32 >= size {
                break;
            }
            let (org, dir) = camera.primary_ray(x, y, s.width, s.height);
            unsafe {
                *stream.id.add(count) = next_id + count as i32;
                *stream.org_x.add(count) = org.x;
                *stream.org_y.add(count) = org.y;
                *stream.org_z.add(count) = org.z;
                *stream.dir_x.add(count) = dir.x;
                *stream.dir_y.add(count) = dir.y;
                *stream.dir_z.add(count) = dir.z;
                *stream.tmin.add(count) = 0.0;
                *stream.tmax.add(count) = f32::MAX;
                *stream.ent_id.add(count) = -1;
                *stream.prim_id.add(count) = -1;
                *stream.t.add(count) = f32::MAX;
                *stream.u.add(count) = 0.0;
                *stream.v.add(count) = 0.0;
                *stream.rnd.add(count) = (next_id + count as i32) as u32;
                *stream.mis.add(count) = 0.0;
                *stream.contrib_r.add(count) = 1.0;
                *stream.contrib_g.add(count) = 1.0;
                *stream.contrib_b.add(count) = 1.0;
                *stream.depth.add(count) = 0;
                *stream.payload.add(count) = 1.0;
            }
            count += 1;
        }
    }
    count as i32
}

/// Primary traversal against the fixture triangle.
pub unsafe extern "C" fn fixture_traversal_triangle(settings: *const DriverSettings, size: i32) {
    let _ = settings;
    let triangle = unsafe { load_triangle() };

    let mut stream = PrimaryStreamAbi::default();
    unsafe {
        helios_get_primary_stream_const(0, 0, &mut stream);
    }

    for i in 0..size.max(0) as usize {
        unsafe {
            let org = Vec3::new(
                *stream.org_x.add(i),
                *stream.org_y.add(i),
                *stream.org_z.add(i),
            );
            let dir = Vec3::new(
                *stream.dir_x.add(i),
                *stream.dir_y.add(i),
                *stream.dir_z.add(i),
            );
            match intersect_triangle(org, dir, &triangle, *stream.tmin.add(i), *stream.tmax.add(i))
            {
                Some((t, u, v)) => {
                    *stream.ent_id.add(i) = 0;
                    *stream.prim_id.add(i) = 0;
                    *stream.t.add(i) = t;
                    *stream.u.add(i) = u;
                    *stream.v.add(i) = v;
                }
                None => {
                    *stream.ent_id.add(i) = -1;
                }
            }
        }
    }
}

/// Hit shader: accumulate the emissive radiance into the film.
pub unsafe extern "C" fn fixture_hit_emissive(
    settings: *const DriverSettings,
    _entity_id: i32,
    _material_id: i32,
    first: i32,
    last: i32,
) {
    let _ = settings;
    let radiance = unsafe { load_radiance() };

    let mut stream = PrimaryStreamAbi::default();
    unsafe {
        helios_get_primary_stream_const(0, 0, &mut stream);
    }

    let mut film: *mut f32 = std::ptr::null_mut();
    let mut width = 0i32;
    let mut height = 0i32;
    unsafe {
        helios_get_film_data(0, &mut film, &mut width, &mut height);
    }
    if film.is_null() {
        return;
    }

    for i in first.max(0)..last {
        unsafe {
            let pixel = *stream.id.add(i as usize) as usize;
            let contrib = [
                *stream.contrib_r.add(i as usize),
                *stream.contrib_g.add(i as usize),
                *stream.contrib_b.add(i as usize),
            ];
            for c in 0..3 {
                *film.add(3 * pixel + c) += contrib[c] * radiance[c];
            }
        }
    }
}

/// Miss shader: the film stays untouched (black background).
pub unsafe extern "C" fn fixture_miss_black(
    _settings: *const DriverSettings,
    _first: i32,
    _last: i32,
) {
}

/// Traversal stub for variants that bypass the stream pipeline.
pub unsafe extern "C" fn fixture_traversal_noop(_settings: *const DriverSettings, _size: i32) {}

/// Ray generation stub for variants that bypass the stream pipeline.
pub unsafe extern "C" fn fixture_raygen_noop(
    _settings: *const DriverSettings,
    _next_id: i32,
    _size: i32,
    _xmin: i32,
    _ymin: i32,
    _xmax: i32,
    _ymax: i32,
) -> i32 {
    0
}

// ------------------------------------------------ special variants

/// Locked-framebuffer variant: write camera-space normals into the
/// "Normals" AOV and advance only its iteration count.
pub unsafe extern "C" fn fixture_device_normals(settings: *const DriverSettings) {
    let s = unsafe { &*settings };
    let camera = unsafe { FixtureCamera::from_registry(s.width, s.height) };
    let triangle = unsafe { load_triangle() };

    let mut aov: *mut f32 = std::ptr::null_mut();
    unsafe {
        helios_get_aov_image(0, c"Normals".as_ptr(), &mut aov);
    }
    if aov.is_null() {
        return;
    }

    let geometric = (triangle[1] - triangle[0])
        .cross(triangle[2] - triangle[0])
        .normalize();

    for y in 0..s.height {
        for x in 0..s.width {
            let (org, dir) = camera.primary_ray(x, y, s.width, s.height);
            if intersect_triangle(org, dir, &triangle, 0.0, f32::MAX).is_some() {
                let normal = if geometric.dot(dir) > 0.0 {
                    -geometric
                } else {
                    geometric
                };
                let pixel = (y * s.width + x) as usize;
                unsafe {
                    *aov.add(3 * pixel) = normal.x;
                    *aov.add(3 * pixel + 1) = normal.y;
                    *aov.add(3 * pixel + 2) = normal.z;
                }
            }
        }
    }

    unsafe {
        helios_mark_aov_as_used(c"Normals".as_ptr(), 1);
    }
}

/// Tracer variant: consume the uploaded ray list, one film pixel per
/// ray.
pub unsafe extern "C" fn fixture_device_trace(settings: *const DriverSettings) {
    let s = unsafe { &*settings };
    let count = s.width.max(0) as usize;

    let mut rays: *const StreamRay = std::ptr::null();
    unsafe {
        helios_load_rays(0, &mut rays);
    }
    if rays.is_null() {
        return;
    }

    let mut film: *mut f32 = std::ptr::null_mut();
    let mut width = 0i32;
    let mut height = 0i32;
    unsafe {
        helios_get_film_data(0, &mut film, &mut width, &mut height);
    }
    if film.is_null() {
        return;
    }

    let triangle = unsafe { load_triangle() };
    let radiance = unsafe { load_radiance() };
    helios_stats_add(0, count as i32);

    for i in 0..count {
        let ray = unsafe { *rays.add(i) };
        let org = Vec3::from_array(ray.org);
        let dir = Vec3::from_array(ray.dir);
        let hit = intersect_triangle(org, dir, &triangle, ray.tmin, ray.tmax).is_some();
        for c in 0..3 {
            unsafe {
                *film.add(3 * i + c) += if hit { radiance[c] } else { 0.0 };
            }
        }
    }
}

/// Parameter probe: samples registry values into the first film pixels.
pub unsafe extern "C" fn fixture_device_probe(settings: *const DriverSettings) {
    let _ = settings;
    let global = unsafe { helios_get_parameter_i32(0, c"probe".as_ptr(), -1, true) };
    let local = unsafe { helios_get_parameter_i32(0, c"local_probe".as_ptr(), -1, false) };
    // The local name must not leak into the global scope
    let leaked = unsafe { helios_get_parameter_i32(0, c"local_probe".as_ptr(), -1, true) };
    // Present in the local registry only when the loader embedded it
    let embedded = unsafe { helios_get_parameter_i32(0, c"probe".as_ptr(), -1, false) };

    let mut film: *mut f32 = std::ptr::null_mut();
    let mut width = 0i32;
    let mut height = 0i32;
    unsafe {
        helios_get_film_data(0, &mut film, &mut width, &mut height);
    }
    if film.is_null() {
        return;
    }
    unsafe {
        *film.add(0) = global as f32;
        *film.add(1) = local as f32;
        *film.add(2) = leaked as f32;
        *film.add(3) = embedded as f32;
    }
}

/// Selector markers: count their dispatches.
pub unsafe extern "C" fn fixture_device_mark_a(_settings: *const DriverSettings) {
    DEVICE_A_CALLS.fetch_add(1, Ordering::SeqCst);
}

pub unsafe extern "C" fn fixture_device_mark_b(_settings: *const DriverSettings) {
    DEVICE_B_CALLS.fetch_add(1, Ordering::SeqCst);
}

/// Iteration callbacks: count their dispatches.
pub unsafe extern "C" fn fixture_callback_before(_settings: *const DriverSettings) {
    CALLBACK_BEFORE_CALLS.fetch_add(1, Ordering::SeqCst);
}

pub unsafe extern "C" fn fixture_callback_after(_settings: *const DriverSettings) {
    CALLBACK_AFTER_CALLS.fetch_add(1, Ordering::SeqCst);
}

// ------------------------------------------------- utility passes

/// Tonemap: clamp, optional gamma, packed ARGB output.
pub unsafe extern "C" fn fixture_tonemap_clamp(
    _settings: *const DriverSettings,
    in_pixels: *const f32,
    out_pixels: *mut u32,
    width: i32,
    height: i32,
    params: *const TonemapParams,
) {
    let params = unsafe { &*params };
    for i in 0..(width * height).max(0) as usize {
        let mut rgb = [0.0f32; 3];
        for (c, value) in rgb.iter_mut().enumerate() {
            *value = unsafe { (*in_pixels.add(3 * i + c) * params.scale).clamp(0.0, 1.0) };
            if params.use_gamma != 0 {
                *value = value.powf(1.0 / 2.2);
            }
        }
        let r = (rgb[0] * 255.0) as u32;
        let g = (rgb[1] * 255.0) as u32;
        let b = (rgb[2] * 255.0) as u32;
        unsafe {
            *out_pixels.add(i) = 0xFF00_0000 | (r << 16) | (g << 8) | b;
        }
    }
}

/// Imageinfo: aggregate per-pixel mean luminance.
pub unsafe extern "C" fn fixture_imageinfo_luminance(
    _settings: *const DriverSettings,
    in_pixels: *const f32,
    width: i32,
    height: i32,
    params: *const ImageInfoParams,
    output: *mut ImageInfoOutputAbi,
) {
    let params = unsafe { &*params };
    let count = (width * height).max(0) as usize;

    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let lum = unsafe {
            (*in_pixels.add(3 * i) + *in_pixels.add(3 * i + 1) + *in_pixels.add(3 * i + 2)) / 3.0
        };
        values.push(lum * params.scale);
    }
    values.sort_by(f32::total_cmp);

    let out = unsafe { &mut *output };
    if values.is_empty() {
        *out = ImageInfoOutputAbi::default();
        return;
    }

    out.min = values[0];
    out.max = values[values.len() - 1];
    out.avg = values.iter().sum::<f32>() / values.len() as f32;
    out.soft_min = out.min;
    out.soft_max = out.max;
    out.median = values[values.len() / 2];

    if params.bins > 0 && !params.histogram.is_null() {
        let range = (out.max - out.min).max(f32::EPSILON);
        let bins = params.bins as usize;
        for value in &values {
            let bin = (((value - out.min) / range) * bins as f32) as usize;
            unsafe {
                *params.histogram.add(bin.min(bins - 1)) += 1;
            }
        }
    }
}

/// Bake pass: fill the bake output buffer with a known pattern.
pub unsafe extern "C" fn fixture_bake_pattern(_settings: *const DriverSettings) {
    let mut data: *mut u8 = std::ptr::null_mut();
    unsafe {
        helios_request_buffer(0, c"__bake_output".as_ptr(), &mut data, 16, 0);
    }
    if data.is_null() {
        return;
    }
    let floats = data.cast::<f32>();
    unsafe {
        *floats.add(0) = 1.0;
        *floats.add(1) = 2.0;
        *floats.add(2) = 3.0;
        *floats.add(3) = 4.0;
    }
}
