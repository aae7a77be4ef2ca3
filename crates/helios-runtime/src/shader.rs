//! Compilation of technique variants into shader sets.

use helios_device::{
    CallbackShaderFn, DeviceShaderFn, HitShaderFn, ImageInfoShaderFn, MissShaderFn, RayGenShaderFn,
    ShaderSet, ShaderSlot, TonemapShaderFn, TraversalShaderFn,
};
use helios_scene::{ShaderOutput, TechniqueVariant};
use rayon::prelude::*;
use tracing::debug;

use crate::compiler::{entry_points, ScriptCompiler};
use crate::error::RuntimeError;

/// Compile one slot's source and reinterpret the entry as `F`.
fn compile_slot<F: Copy>(
    compiler: &dyn ScriptCompiler,
    variant: usize,
    name: &str,
    entry: &str,
    source: &ShaderOutput<String>,
) -> Result<ShaderSlot<F>, RuntimeError> {
    debug!("Compiling {name} shader");
    let prepared = compiler.prepare(&source.exec);
    let ptr = compiler
        .compile(&prepared, entry)
        .ok_or_else(|| RuntimeError::ShaderCompile {
            variant,
            shader: name.to_string(),
        })?;

    assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const ()>());
    let exec = unsafe { std::mem::transmute_copy::<*const (), F>(&ptr) };
    Ok(ShaderSlot::new(exec, source.local_registry.clone()))
}

fn compile_optional<F: Copy>(
    compiler: &dyn ScriptCompiler,
    variant: usize,
    name: &str,
    entry: &str,
    source: Option<&ShaderOutput<String>>,
) -> Result<Option<ShaderSlot<F>>, RuntimeError> {
    source
        .filter(|s| !s.exec.is_empty())
        .map(|s| compile_slot(compiler, variant, name, entry, s))
        .transpose()
}

/// Compile all shaders of one technique variant.
///
/// Hit shaders (one per material) compile in parallel; everything else
/// is cheap enough to stay sequential.
pub fn compile_shader_set(
    compiler: &dyn ScriptCompiler,
    variant_index: usize,
    variant: &TechniqueVariant,
    enable_tonemapping: bool,
) -> Result<ShaderSet, RuntimeError> {
    debug!("Handling technique variant {variant_index}");

    let device: ShaderSlot<DeviceShaderFn> = compile_slot(
        compiler,
        variant_index,
        "device",
        entry_points::DEVICE,
        &variant.device,
    )?;
    let primary_traversal: ShaderSlot<TraversalShaderFn> = compile_slot(
        compiler,
        variant_index,
        "primary traversal",
        entry_points::TRAVERSAL,
        &variant.primary_traversal,
    )?;
    let secondary_traversal: ShaderSlot<TraversalShaderFn> = compile_slot(
        compiler,
        variant_index,
        "secondary traversal",
        entry_points::TRAVERSAL,
        &variant.secondary_traversal,
    )?;
    let ray_generation: ShaderSlot<RayGenShaderFn> = compile_slot(
        compiler,
        variant_index,
        "ray generation",
        entry_points::RAY_GENERATION,
        &variant.ray_generation,
    )?;
    let miss: ShaderSlot<MissShaderFn> = compile_slot(
        compiler,
        variant_index,
        "miss",
        entry_points::MISS,
        &variant.miss,
    )?;

    debug!("Compiling hit shaders");
    let hits: Vec<ShaderSlot<HitShaderFn>> = variant
        .hits
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            compile_slot(
                compiler,
                variant_index,
                &format!("hit shader {i}"),
                entry_points::HIT,
                source,
            )
        })
        .collect::<Result<_, _>>()?;

    let advanced_shadow_hits = variant
        .advanced_shadow_hits
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            compile_slot(
                compiler,
                variant_index,
                &format!("advanced shadow hit shader {i}"),
                entry_points::ADVANCED_SHADOW,
                source,
            )
        })
        .collect::<Result<_, _>>()?;

    let advanced_shadow_misses = variant
        .advanced_shadow_misses
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            compile_slot(
                compiler,
                variant_index,
                &format!("advanced shadow miss shader {i}"),
                entry_points::ADVANCED_SHADOW,
                source,
            )
        })
        .collect::<Result<_, _>>()?;

    let mut callbacks: [Option<ShaderSlot<CallbackShaderFn>>; 2] = [None, None];
    for (i, source) in variant.callbacks.iter().enumerate() {
        callbacks[i] = compile_optional(
            compiler,
            variant_index,
            &format!("callback {i}"),
            entry_points::CALLBACK,
            source.as_ref(),
        )?;
    }

    let (tonemap, imageinfo) = if enable_tonemapping {
        let tonemap: Option<ShaderSlot<TonemapShaderFn>> = compile_optional(
            compiler,
            variant_index,
            "tonemap",
            entry_points::TONEMAP,
            variant.tonemap.as_ref(),
        )?;
        let imageinfo: Option<ShaderSlot<ImageInfoShaderFn>> = compile_optional(
            compiler,
            variant_index,
            "imageinfo",
            entry_points::IMAGEINFO,
            variant.imageinfo.as_ref(),
        )?;
        (tonemap, imageinfo)
    } else {
        (None, None)
    };

    let bake = compile_optional(
        compiler,
        variant_index,
        "bake",
        entry_points::BAKE,
        variant.bake.as_ref(),
    )?;

    Ok(ShaderSet {
        id: variant_index as u32,
        device,
        primary_traversal,
        secondary_traversal,
        ray_generation,
        miss,
        hits,
        advanced_shadow_hits,
        advanced_shadow_misses,
        callbacks,
        tonemap,
        imageinfo,
        bake,
    })
}
