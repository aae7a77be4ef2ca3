//! Technique metadata shared between loader, runtime and device.

/// How a variant resolves shadow rays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowHandlingMode {
    /// No advanced shadow handling.
    #[default]
    Simple,
    /// Advanced shadow handling without material specialization.
    Advanced,
    /// Advanced shadow handling with per-material specialization.
    AdvancedWithMaterials,
}

impl ShadowHandlingMode {
    #[must_use]
    pub const fn is_advanced(self) -> bool {
        !matches!(self, Self::Simple)
    }
}

/// Callback shader slots around an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum CallbackType {
    BeforeIteration = 0,
    AfterIteration = 1,
}

impl CallbackType {
    pub const COUNT: usize = 2;
}

/// Callback returning the variants to run for a given iteration index.
pub type VariantSelector = fn(usize) -> Vec<usize>;

/// Per-variant technique metadata.
#[derive(Debug, Clone, Default)]
pub struct TechniqueVariantInfo {
    pub shadow_handling_mode: ShadowHandlingMode,
    /// The variant makes use of lights.
    pub uses_lights: bool,
    /// The variant makes use of participating media.
    pub uses_media: bool,
    /// Extra per-ray payload columns on the primary stream.
    pub primary_payload_count: usize,
    /// Extra per-ray payload columns on the secondary stream.
    pub secondary_payload_count: usize,
    /// Override the work width; the framebuffer itself keeps its size.
    pub override_width: Option<usize>,
    /// Override the work height; the framebuffer itself keeps its size.
    pub override_height: Option<usize>,
    /// A locked framebuffer does not advance the main iteration count
    /// and the variant does not contribute to sample accumulation.
    /// Writing AOVs is still possible.
    pub lock_framebuffer: bool,
    /// Override the recommended samples per iteration.
    pub override_spi: Option<usize>,
}

impl TechniqueVariantInfo {
    #[must_use]
    pub fn width(&self, hint: usize) -> usize {
        self.override_width.unwrap_or(hint)
    }

    #[must_use]
    pub fn height(&self, hint: usize) -> usize {
        self.override_height.unwrap_or(hint)
    }

    #[must_use]
    pub fn spi(&self, hint: usize) -> usize {
        self.override_spi.unwrap_or(hint)
    }
}

/// Technique-wide metadata spanning all variants.
#[derive(Clone)]
pub struct TechniqueInfo {
    /// AOVs enabled in the current runtime, shared across variants.
    pub enabled_aovs: Vec<String>,
    /// The passes a technique uses. At least one.
    pub variants: Vec<TechniqueVariantInfo>,
    /// Selects the active variants per iteration. `None` runs all of
    /// them sequentially.
    pub variant_selector: Option<VariantSelector>,
}

impl Default for TechniqueInfo {
    fn default() -> Self {
        Self {
            enabled_aovs: Vec::new(),
            variants: vec![TechniqueVariantInfo::default()],
            variant_selector: None,
        }
    }
}

impl std::fmt::Debug for TechniqueInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechniqueInfo")
            .field("enabled_aovs", &self.enabled_aovs)
            .field("variants", &self.variants)
            .field("variant_selector", &self.variant_selector.is_some())
            .finish()
    }
}

impl TechniqueInfo {
    /// Samples per pixel one full iteration contributes.
    ///
    /// Only variants that do not lock the framebuffer count.
    #[must_use]
    pub fn compute_spi(&self, iteration: usize, hint_spi: usize) -> usize {
        let sum = |indices: &mut dyn Iterator<Item = usize>| {
            indices
                .map(|i| &self.variants[i])
                .filter(|v| !v.lock_framebuffer)
                .map(|v| v.spi(hint_spi))
                .sum()
        };

        match self.variant_selector {
            Some(selector) => sum(&mut selector(iteration).into_iter()),
            None => sum(&mut (0..self.variants.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_fall_back_to_hints() {
        let mut info = TechniqueVariantInfo::default();
        assert_eq!(info.width(800), 800);
        assert_eq!(info.spi(4), 4);

        info.override_width = Some(64);
        info.override_spi = Some(1);
        assert_eq!(info.width(800), 64);
        assert_eq!(info.spi(4), 1);
    }

    #[test]
    fn locked_variants_do_not_count_towards_spi() {
        let info = TechniqueInfo {
            enabled_aovs: Vec::new(),
            variants: vec![
                TechniqueVariantInfo {
                    lock_framebuffer: true,
                    ..Default::default()
                },
                TechniqueVariantInfo::default(),
            ],
            variant_selector: None,
        };
        assert_eq!(info.compute_spi(0, 4), 4);
    }

    #[test]
    fn selector_limits_spi_to_active_variants() {
        fn even_odd(iter: usize) -> Vec<usize> {
            vec![iter % 2]
        }

        let info = TechniqueInfo {
            enabled_aovs: Vec::new(),
            variants: vec![
                TechniqueVariantInfo {
                    override_spi: Some(2),
                    ..Default::default()
                },
                TechniqueVariantInfo {
                    override_spi: Some(8),
                    ..Default::default()
                },
            ],
            variant_selector: Some(even_odd),
        };
        assert_eq!(info.compute_spi(0, 4), 2);
        assert_eq!(info.compute_spi(1, 4), 8);
    }
}
