//! Fixture compiler: resolves shader source tags to native functions.

use helios_device::{
    BakeShaderFn, CallbackShaderFn, DeviceShaderFn, HitShaderFn, ImageInfoShaderFn, MissShaderFn,
    RayGenShaderFn, TonemapShaderFn, TraversalShaderFn,
};
use helios_runtime::ScriptCompiler;

use crate::shaders;

/// Stands in for the JIT: "sources" are tags naming one of the native
/// fixture shaders.
pub struct FixtureCompiler;

impl ScriptCompiler for FixtureCompiler {
    fn prepare(&self, source: &str) -> String {
        // The real compiler prepends the standard library here
        format!("// helios stdlib\n{source}")
    }

    fn compile(&self, source: &str, _entry: &str) -> Option<*const ()> {
        let tag = source.lines().last()?;
        lookup(tag)
    }
}

/// Resolve one source tag to its entry point.
#[must_use]
pub fn lookup(tag: &str) -> Option<*const ()> {
    let ptr = match tag {
        "fixture:device:ao" => shaders::fixture_device_ao as DeviceShaderFn as *const (),
        "fixture:device:normals" => shaders::fixture_device_normals as DeviceShaderFn as *const (),
        "fixture:device:trace" => shaders::fixture_device_trace as DeviceShaderFn as *const (),
        "fixture:device:probe" => shaders::fixture_device_probe as DeviceShaderFn as *const (),
        "fixture:device:mark_a" => shaders::fixture_device_mark_a as DeviceShaderFn as *const (),
        "fixture:device:mark_b" => shaders::fixture_device_mark_b as DeviceShaderFn as *const (),
        "fixture:raygen:perspective" => {
            shaders::fixture_raygen_perspective as RayGenShaderFn as *const ()
        }
        "fixture:raygen:noop" => shaders::fixture_raygen_noop as RayGenShaderFn as *const (),
        "fixture:traversal:triangle" => {
            shaders::fixture_traversal_triangle as TraversalShaderFn as *const ()
        }
        "fixture:traversal:noop" => {
            shaders::fixture_traversal_noop as TraversalShaderFn as *const ()
        }
        "fixture:miss:black" => shaders::fixture_miss_black as MissShaderFn as *const (),
        "fixture:hit:emissive" => shaders::fixture_hit_emissive as HitShaderFn as *const (),
        "fixture:callback:before" => {
            shaders::fixture_callback_before as CallbackShaderFn as *const ()
        }
        "fixture:callback:after" => {
            shaders::fixture_callback_after as CallbackShaderFn as *const ()
        }
        "fixture:tonemap:clamp" => shaders::fixture_tonemap_clamp as TonemapShaderFn as *const (),
        "fixture:imageinfo:luminance" => {
            shaders::fixture_imageinfo_luminance as ImageInfoShaderFn as *const ()
        }
        "fixture:bake:pattern" => shaders::fixture_bake_pattern as BakeShaderFn as *const (),
        _ => return None,
    };
    Some(ptr)
}
