//! The immutable scene database.

use hashbrown::HashMap;
use helios_core::BoundingBox;

use crate::table::{DynTable, FixTable};

/// Opaque BVH blob for one primitive type.
///
/// Node and leaf layout is whatever the traversal shaders expect for
/// the selected width (2/4/8 children); the core never inspects it.
#[derive(Debug, Clone, Default)]
pub struct SceneBvh {
    pub nodes: Vec<u8>,
    pub leaves: Vec<u8>,
}

/// Everything the loader produced about the scene geometry and records.
///
/// Built once by the loader, handed to the device via `assign_scene`
/// and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct SceneDatabase {
    /// BVHs keyed by primitive-type tag (e.g. "triangles").
    pub scene_bvhs: HashMap<String, SceneBvh>,
    /// Variably sized record tables keyed by name.
    pub dyn_tables: HashMap<String, DynTable>,
    /// Uniform record tables keyed by name.
    pub fix_tables: HashMap<String, FixTable>,
    /// Number of unique materials in the scene.
    pub material_count: usize,
    /// Per-entity material ids, indexed by entity id.
    pub entity_to_material: Vec<i32>,
    pub scene_bbox: BoundingBox,
    pub scene_radius: f32,
}

impl SceneDatabase {
    /// Number of entities, derived from the "entities" fix table.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.fix_tables
            .get("entities")
            .map_or(0, FixTable::entry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_count_comes_from_entities_table() {
        let mut db = SceneDatabase::default();
        assert_eq!(db.entity_count(), 0);

        let mut entities = FixTable::new();
        entities.add_entry(0).extend_from_slice(&[0; 8]);
        entities.add_entry(0).extend_from_slice(&[0; 8]);
        db.fix_tables.insert("entities".to_string(), entities);
        assert_eq!(db.entity_count(), 2);
    }
}
