//! Shared runtime structs crossing the runtime/device boundary.

use glam::{Vec2, Vec3};

/// A single ray handed to the tracer mode of the runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// `[tmin, tmax]` range along the ray.
    pub range: Vec2,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            range: Vec2::new(0.0, f32::INFINITY),
        }
    }

    #[must_use]
    pub const fn with_range(mut self, tmin: f32, tmax: f32) -> Self {
        self.range = Vec2::new(tmin, tmax);
        self
    }
}

/// Settings for the tonemap utility pass.
#[derive(Debug, Clone)]
pub struct TonemapSettings {
    /// AOV to tonemap. Empty or "Color" selects the main framebuffer.
    pub aov: String,
    /// Tonemap operator index understood by the generated shader.
    pub method: usize,
    pub use_gamma: bool,
    pub scale: f32,
    pub exposure_factor: f32,
    pub exposure_offset: f32,
}

impl Default for TonemapSettings {
    fn default() -> Self {
        Self {
            aov: String::new(),
            method: 0,
            use_gamma: true,
            scale: 1.0,
            exposure_factor: 0.0,
            exposure_offset: 0.0,
        }
    }
}

/// Settings for the imageinfo utility pass.
#[derive(Debug, Clone)]
pub struct ImageInfoSettings {
    /// AOV to analyse. Empty or "Color" selects the main framebuffer.
    pub aov: String,
    pub scale: f32,
    /// Number of histogram bins to fill. Zero disables the histogram.
    pub bins: usize,
}

impl Default for ImageInfoSettings {
    fn default() -> Self {
        Self {
            aov: String::new(),
            scale: 1.0,
            bins: 0,
        }
    }
}

/// Aggregates produced by the imageinfo pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInfoOutput {
    pub min: f32,
    pub max: f32,
    pub average: f32,
    pub soft_min: f32,
    pub soft_max: f32,
    pub median: f32,
    /// Luminance histogram, `bins` entries when requested.
    pub histogram: Vec<i32>,
}

/// Initial camera orientation a scene was loaded with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraOrientation {
    pub eye: Vec3,
    pub dir: Vec3,
    pub up: Vec3,
}

impl Default for CameraOrientation {
    fn default() -> Self {
        Self {
            eye: Vec3::ZERO,
            dir: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_defaults_to_unbounded_range() {
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert_eq!(ray.range.x, 0.0);
        assert!(ray.range.y.is_infinite());

        let bounded = ray.with_range(0.5, 10.0);
        assert_eq!(bounded.range, Vec2::new(0.5, 10.0));
    }
}
