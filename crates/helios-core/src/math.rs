//! Bounding box math.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box of a scene or entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// An empty box, ready for [`BoundingBox::extend`].
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow the box to include `point`.
    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow the box to include `other`.
    pub fn extend_box(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Length of the diagonal.
    #[must_use]
    pub fn diameter(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.size().length()
        }
    }

    /// Radius of the bounding sphere around the center.
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.diameter() * 0.5
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_box_has_zero_diameter() {
        let bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        assert_relative_eq!(bbox.diameter(), 0.0);
    }

    #[test]
    fn extend_grows_box() {
        let mut bbox = BoundingBox::empty();
        bbox.extend(Vec3::ZERO);
        bbox.extend(Vec3::new(1.0, 2.0, 2.0));
        assert!(!bbox.is_empty());
        assert_relative_eq!(bbox.diameter(), 3.0);
        assert_relative_eq!(bbox.radius(), 1.5);
        assert_eq!(bbox.center(), Vec3::new(0.5, 1.0, 1.0));
    }
}
