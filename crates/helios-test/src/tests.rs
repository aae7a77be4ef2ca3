//! End-to-end pipeline tests against the fixture scene.

use std::ffi::CString;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use approx::assert_relative_eq;
use glam::Vec3;
use helios_core::{ImageInfoSettings, ParameterSet, Ray, Target, TonemapSettings};
use helios_device::abi::{
    helios_get_primary_stream, helios_load_image, helios_register_thread,
    helios_unregister_thread,
};
use helios_device::settings::PrimaryStreamAbi;
use helios_device::{BakeShaderFn, Device, SceneSettings, SetupSettings, ShaderSlot};
use helios_runtime::{Runtime, RuntimeOptions, SpecializationMode};
use helios_scene::SceneDatabase;
use helios_stats::{ShaderType, SmallShaderKey};

use crate::scene::EMBEDDED_PROBE_VALUE;
use crate::shaders::{
    reset_counters, CALLBACK_AFTER_CALLS, CALLBACK_BEFORE_CALLS, DEVICE_A_CALLS, DEVICE_B_CALLS,
};
use crate::{fixture_runtime, DEVICE_LOCK};

fn options(technique: &str) -> RuntimeOptions {
    RuntimeOptions {
        spi: 1,
        target: Target::cpu(0, 4),
        override_technique: technique.to_string(),
        ..Default::default()
    }
}

fn loaded_runtime(technique: &str) -> Runtime {
    let mut runtime = fixture_runtime(options(technique));
    runtime
        .load_from_file(Path::new("triangle.json"))
        .expect("fixture scene loads");
    runtime
}

fn pixel(runtime: &Runtime, name: &str, x: usize, y: usize) -> [f32; 3] {
    let accessor = runtime.framebuffer(name);
    assert!(!accessor.is_null());
    let data = unsafe { accessor.as_slice() };
    let width = runtime.framebuffer_width();
    let i = 3 * (y * width + x);
    [data[i], data[i + 1], data[i + 2]]
}

#[test]
fn scenario_smoke_render() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = loaded_runtime("ao");
    assert_eq!(runtime.framebuffer_width(), 64);
    assert_eq!(runtime.framebuffer_height(), 64);
    assert_eq!(runtime.technique(), "ao");
    assert_eq!(runtime.camera(), "perspective");

    runtime.step(false);

    assert_eq!(runtime.current_iteration_count(), 1);
    assert_eq!(runtime.current_sample_count(), 1);

    let center = pixel(&runtime, "", 32, 32);
    for channel in center {
        assert!((0.1..=1.0).contains(&channel), "center = {center:?}");
    }
    let corner = pixel(&runtime, "", 0, 0);
    assert_eq!(corner, [0.0; 3]);

    // Iteration callbacks ran exactly once each
    assert_eq!(CALLBACK_BEFORE_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(CALLBACK_AFTER_CALLS.load(Ordering::SeqCst), 1);

    let accessor = runtime.framebuffer("");
    assert_eq!(accessor.iteration_count, 1);
}

#[test]
fn scenario_tracer_roundtrip() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = fixture_runtime(RuntimeOptions {
        spi: 1,
        target: Target::cpu(0, 4),
        is_tracer: true,
        ..Default::default()
    });
    runtime
        .load_from_file(Path::new("triangle.json"))
        .expect("fixture scene loads");

    let rays = vec![
        Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::new(0.0, 0.0, 1.0)),
        Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::new(1.0, 0.0, 0.0)),
    ];
    let mut data = Vec::new();
    runtime.trace_into(&rays, &mut data);

    assert_eq!(data.len(), 6);
    for channel in &data[0..3] {
        assert!((0.1..=1.0).contains(channel), "data = {data:?}");
    }
    assert_eq!(&data[3..6], &[0.0; 3]);
    assert_eq!(runtime.current_iteration_count(), 1);

    // The returned values mirror the framebuffer pixels
    let accessor = runtime.framebuffer("");
    let film = unsafe { accessor.as_slice() };
    assert_eq!(&film[..6], &data[..]);
}

#[test]
fn scenario_locked_variant_writes_aov() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = loaded_runtime("normals_ao");
    runtime.step(false);

    // The locked variant advanced only the AOV counter; the unlocked
    // variant advanced the main framebuffer by exactly one
    let normals = runtime.framebuffer("Normals");
    assert_eq!(normals.iteration_count, 1);
    let main = runtime.framebuffer("");
    assert_eq!(main.iteration_count, 1);
    assert_eq!(runtime.current_sample_count(), 1);

    let normal = pixel(&runtime, "Normals", 32, 32);
    assert_relative_eq!(normal[0], 0.0, epsilon = 1e-5);
    assert_relative_eq!(normal[1], 0.0, epsilon = 1e-5);
    assert_relative_eq!(normal[2], -1.0, epsilon = 1e-5);
}

#[test]
fn framebuffer_clear_resets_everything() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = loaded_runtime("ao");
    runtime.step(false);
    assert_ne!(pixel(&runtime, "", 32, 32), [0.0; 3]);

    runtime.clear_framebuffer();
    let accessor = runtime.framebuffer("");
    assert_eq!(accessor.iteration_count, 0);
    let film = unsafe { accessor.as_slice() };
    assert!(film.iter().all(|&v| v == 0.0));

    runtime.step(false);
    assert_eq!(runtime.framebuffer("").iteration_count, 1);
}

#[test]
fn variant_selector_alternates() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = loaded_runtime("flip");
    runtime.step(false);
    runtime.step(false);

    assert_eq!(DEVICE_A_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(DEVICE_B_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.current_iteration_count(), 2);
}

#[test]
fn parameter_registry_scopes() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = loaded_runtime("probe");
    runtime.set_parameter_i32("probe", 42);
    runtime.step(false);

    let values = pixel(&runtime, "", 0, 0);
    // Global lookup observes the runtime value
    assert_eq!(values[0], 42.0);
    // Local lookup observes the compile-time registry
    assert_eq!(values[1], 7.0);
    // The local name does not exist in the global scope
    assert_eq!(values[2], -1.0);
    // Without forced specialization the user parameter stays a global
    // registry lookup and is absent from the local set
    assert_eq!(pixel(&runtime, "", 1, 0)[0], -1.0);
}

#[test]
fn forced_specialization_embeds_parameters() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = fixture_runtime(RuntimeOptions {
        spi: 1,
        target: Target::cpu(0, 4),
        override_technique: "probe".to_string(),
        specialization: SpecializationMode::Force,
        ..Default::default()
    });
    runtime
        .load_from_file(Path::new("triangle.json"))
        .expect("fixture scene loads");
    runtime.set_parameter_i32("probe", 42);
    runtime.step(false);

    // The loader embedded the user parameter into the shader's local
    // registry at generation time
    assert_eq!(pixel(&runtime, "", 1, 0)[0], EMBEDDED_PROBE_VALUE as f32);
    // The dynamic global lookup still resolves through the registry
    assert_eq!(pixel(&runtime, "", 0, 0)[0], 42.0);
}

#[test]
fn statistics_accumulate_monotonically() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = fixture_runtime(RuntimeOptions {
        spi: 1,
        target: Target::cpu(0, 4),
        acquire_stats: true,
        ..Default::default()
    });
    runtime
        .load_from_file(Path::new("triangle.json"))
        .expect("fixture scene loads");

    runtime.step(false);
    let first = runtime.statistics().expect("stats enabled");
    let device_key = SmallShaderKey::from(ShaderType::Device);
    let first_device = first.shader(device_key).expect("device shader ran");
    assert_eq!(first_device.count, 1);

    let first_raygen = first
        .shader(SmallShaderKey::from(ShaderType::RayGeneration))
        .expect("ray generation ran");
    assert!(first_raygen.count >= 1);
    assert!(first_raygen.workload >= 64 * 64);

    runtime.step(false);
    let second = runtime.statistics().expect("stats enabled");
    let second_device = second.shader(device_key).unwrap();
    assert_eq!(second_device.count, 2);
    assert!(second_device.workload >= first_device.workload);

    let second_raygen = second
        .shader(SmallShaderKey::from(ShaderType::RayGeneration))
        .unwrap();
    assert!(second_raygen.count >= first_raygen.count);
    assert!(second_raygen.workload >= first_raygen.workload);

    // Camera rays were counted through the quantity ABI
    assert_eq!(
        second.quantity(helios_stats::Quantity::CameraRayCount),
        2 * 64 * 64
    );

    let report = second.dump(1, 2, true);
    assert!(report.contains("Device"));
    assert!(report.contains("CameraRays"));
}

#[test]
fn tonemap_and_imageinfo_passes() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let mut runtime = loaded_runtime("ao");
    runtime.step(false);

    let width = runtime.framebuffer_width();
    let height = runtime.framebuffer_height();
    let mut out = vec![0u32; width * height];
    runtime.tonemap(&mut out, &TonemapSettings::default());

    let center = out[32 * width + 32];
    assert_eq!(center, 0xFFFF_FFFF); // full white after clamp + gamma
    let corner = out[0];
    assert_eq!(corner, 0xFF00_0000); // black, opaque alpha

    let info = runtime.imageinfo(&ImageInfoSettings {
        bins: 8,
        ..Default::default()
    });
    assert_eq!(info.min, 0.0);
    assert_relative_eq!(info.max, 1.0, epsilon = 1e-5);
    assert!(info.average > 0.0 && info.average < 1.0);
    assert_eq!(info.histogram.len(), 8);
    assert_eq!(
        info.histogram.iter().map(|&c| c as usize).sum::<usize>(),
        width * height
    );
}

#[test]
fn image_cache_is_idempotent_with_magenta_fallback() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    // A device must be installed for the ABI to resolve
    let _runtime = loaded_runtime("ao");

    let dir = std::env::temp_dir().join(format!("helios-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("checker.png");
    image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();

    let c_path = CString::new(path.to_str().unwrap()).unwrap();
    let mut first: *const f32 = std::ptr::null();
    let mut second: *const f32 = std::ptr::null();
    let (mut w, mut h) = (0i32, 0i32);
    unsafe {
        helios_load_image(0, c_path.as_ptr(), &mut first, &mut w, &mut h, 4);
        helios_load_image(0, c_path.as_ptr(), &mut second, &mut w, &mut h, 4);
    }
    assert!(!first.is_null());
    assert_eq!(first, second);
    assert_eq!((w, h), (2, 2));

    // A missing file materialises the 1×1 magenta substitute
    let missing = CString::new("/definitely/not/here.png").unwrap();
    let mut pixels: *const f32 = std::ptr::null();
    unsafe {
        helios_load_image(0, missing.as_ptr(), &mut pixels, &mut w, &mut h, 4);
    }
    assert_eq!((w, h), (1, 1));
    let rgba = unsafe { std::slice::from_raw_parts(pixels, 4) };
    assert_eq!(rgba, &[1.0, 0.0, 1.0, 1.0]);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn stream_capacity_grows_monotonically_over_abi() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();

    let _runtime = loaded_runtime("ao");

    helios_register_thread();

    let mut stream = PrimaryStreamAbi::default();
    unsafe {
        helios_get_primary_stream(0, 0, &mut stream, 10);
    }
    let stride = |s: &PrimaryStreamAbi| (s.org_x as usize - s.id as usize) / 4;
    assert_eq!(stride(&stream), 32);
    let first_base = stream.id;

    // Growing within capacity keeps the allocation
    unsafe {
        helios_get_primary_stream(0, 0, &mut stream, 31);
    }
    assert_eq!(stream.id, first_base);
    assert_eq!(stride(&stream), 32);

    // Crossing the capacity reallocates with a larger stride
    unsafe {
        helios_get_primary_stream(0, 0, &mut stream, 40);
    }
    assert_eq!(stride(&stream), 64);
    let grown_base = stream.id;

    // Shrinking requests never shrink the allocation
    unsafe {
        helios_get_primary_stream(0, 0, &mut stream, 5);
    }
    assert_eq!(stream.id, grown_base);
    assert_eq!(stride(&stream), 64);

    helios_unregister_thread();
}

#[test]
fn bake_pass_copies_output_buffer() {
    let _guard = DEVICE_LOCK.lock();
    reset_counters();
    crate::init_logging();

    let device = Device::new(SetupSettings {
        target: Target::cpu(0, 4),
        acquire_stats: false,
        debug_trace: false,
    })
    .expect("device sets up");
    device.assign_scene(SceneSettings {
        database: Arc::new(SceneDatabase::default()),
        aov_map: Vec::new(),
        resource_map: Arc::new(Vec::new()),
    });

    let ptr = crate::compiler::lookup("fixture:bake:pattern").unwrap();
    let exec: BakeShaderFn = unsafe { std::mem::transmute(ptr) };
    let slot = ShaderSlot::new(exec, ParameterSet::new());

    let mut output = Vec::new();
    device.bake(&slot, &mut output);

    // Request buffers round up to 32 bytes, so eight floats come back
    assert_eq!(output.len(), 8);
    assert_eq!(&output[..4], &[1.0, 2.0, 3.0, 4.0]);
    assert!(output[4..].iter().all(|&v| v == 0.0));
}
