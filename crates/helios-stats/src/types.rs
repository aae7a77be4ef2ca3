//! Statistic category types.

use serde::{Deserialize, Serialize};

/// The shader kinds a variant can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ShaderType {
    Device = 0,
    PrimaryTraversal,
    SecondaryTraversal,
    RayGeneration,
    Hit,
    Miss,
    AdvancedShadowHit,
    AdvancedShadowMiss,
    Callback,
    Tonemap,
    ImageInfo,
    Bake,
}

impl ShaderType {
    pub const COUNT: usize = 12;

    /// Display name used in the statistics report.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Device => "Device",
            Self::PrimaryTraversal => "PrimaryTraversal",
            Self::SecondaryTraversal => "SecondaryTraversal",
            Self::RayGeneration => "RayGeneration",
            Self::Hit => "Hit",
            Self::Miss => "Miss",
            Self::AdvancedShadowHit => "AdvancedShadowHit",
            Self::AdvancedShadowMiss => "AdvancedShadowMiss",
            Self::Callback => "Callback",
            Self::Tonemap => "Tonemap",
            Self::ImageInfo => "ImageInfo",
            Self::Bake => "Bake",
        }
    }
}

/// Timed sections outside of shader execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum SectionType {
    ImageLoading = 0,
    PackedImageLoading,
    BufferLoading,
    BufferRequests,
    BufferReleases,
    FramebufferUpdate,
    AovUpdate,
    TonemapUpdate,
    FramebufferHostUpdate,
    AovHostUpdate,
}

impl SectionType {
    pub const COUNT: usize = 10;

    /// Map a raw section id coming over the shader ABI.
    #[must_use]
    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::ImageLoading),
            1 => Some(Self::PackedImageLoading),
            2 => Some(Self::BufferLoading),
            3 => Some(Self::BufferRequests),
            4 => Some(Self::BufferReleases),
            5 => Some(Self::FramebufferUpdate),
            6 => Some(Self::AovUpdate),
            7 => Some(Self::TonemapUpdate),
            8 => Some(Self::FramebufferHostUpdate),
            9 => Some(Self::AovHostUpdate),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ImageLoading => "ImageLoading",
            Self::PackedImageLoading => "PackedImageLoading",
            Self::BufferLoading => "BufferLoading",
            Self::BufferRequests => "BufferRequests",
            Self::BufferReleases => "BufferReleases",
            Self::FramebufferUpdate => "FramebufferUpdate",
            Self::AovUpdate => "AOVUpdate",
            Self::TonemapUpdate => "TonemapUpdate",
            Self::FramebufferHostUpdate => "FramebufferHostUpdate",
            Self::AovHostUpdate => "AOVHostUpdate",
        }
    }
}

/// Integer counters fed by the shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Quantity {
    CameraRayCount = 0,
    ShadowRayCount,
    BounceRayCount,
}

impl Quantity {
    pub const COUNT: usize = 3;

    /// Map a raw quantity id coming over the shader ABI.
    #[must_use]
    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::CameraRayCount),
            1 => Some(Self::ShadowRayCount),
            2 => Some(Self::BounceRayCount),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_ids_round_trip() {
        for id in 0..SectionType::COUNT as i32 {
            let section = SectionType::from_id(id).unwrap();
            assert_eq!(section as i32, id);
        }
        assert!(SectionType::from_id(99).is_none());
    }
}
