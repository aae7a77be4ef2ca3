//! Shader keys.

use crate::types::ShaderType;

/// Connects shader type and sub id (material id, callback slot) to a
/// unique statistics key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SmallShaderKey {
    ty: ShaderType,
    sub_id: u32,
}

impl SmallShaderKey {
    #[must_use]
    pub const fn new(ty: ShaderType, sub_id: u32) -> Self {
        Self { ty, sub_id }
    }

    #[must_use]
    pub const fn ty(&self) -> ShaderType {
        self.ty
    }

    #[must_use]
    pub const fn sub_id(&self) -> u32 {
        self.sub_id
    }
}

impl From<ShaderType> for SmallShaderKey {
    fn from(ty: ShaderType) -> Self {
        Self::new(ty, 0)
    }
}

/// Connects variant, shader type and sub id to a unique shader
/// identity, used for resource attribution on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    variant: u32,
    ty: ShaderType,
    sub_id: u32,
}

impl ShaderKey {
    #[must_use]
    pub const fn new(variant: u32, ty: ShaderType, sub_id: u32) -> Self {
        Self {
            variant,
            ty,
            sub_id,
        }
    }

    #[must_use]
    pub const fn variant(&self) -> u32 {
        self.variant
    }

    #[must_use]
    pub const fn ty(&self) -> ShaderType {
        self.ty
    }

    #[must_use]
    pub const fn sub_id(&self) -> u32 {
        self.sub_id
    }

    #[must_use]
    pub const fn small(&self) -> SmallShaderKey {
        SmallShaderKey::new(self.ty, self.sub_id)
    }
}
