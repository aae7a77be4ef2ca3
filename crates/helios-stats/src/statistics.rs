//! Statistics accumulation and reporting.

use hashbrown::HashMap;
use std::fmt::Write as _;

use crate::key::SmallShaderKey;
use crate::types::{Quantity, SectionType, ShaderType};

/// Accumulated launch numbers of one shader key.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStats {
    pub elapsed_ms: f64,
    pub count: u64,
    /// Summed workload. May wrap after absurd iteration counts, which
    /// is acceptable for statistical output.
    pub workload: u64,
    pub max_workload: u64,
    pub min_workload: u64,
}

impl Default for ShaderStats {
    fn default() -> Self {
        Self {
            elapsed_ms: 0.0,
            count: 0,
            workload: 0,
            max_workload: 0,
            min_workload: u64::MAX,
        }
    }
}

impl ShaderStats {
    pub fn merge(&mut self, other: &Self) {
        self.elapsed_ms += other.elapsed_ms;
        self.count += other.count;
        self.workload = self.workload.wrapping_add(other.workload);
        self.max_workload = self.max_workload.max(other.max_workload);
        self.min_workload = self.min_workload.min(other.min_workload);
    }
}

/// Accumulated numbers of one section.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionStats {
    pub elapsed_ms: f64,
    pub count: u64,
}

impl SectionStats {
    pub fn merge(&mut self, other: &Self) {
        self.elapsed_ms += other.elapsed_ms;
        self.count += other.count;
    }
}

/// Accumulated statistics of one thread or the merged aggregate.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    shaders: HashMap<SmallShaderKey, ShaderStats>,
    sections: [SectionStats; SectionType::COUNT],
    quantities: [u64; Quantity::COUNT],
}

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add_shader(&mut self, key: SmallShaderKey, stats: &ShaderStats) {
        self.shaders.entry(key).or_default().merge(stats);
    }

    pub fn add_section(&mut self, ty: SectionType, stats: &SectionStats) {
        self.sections[ty as usize].merge(stats);
    }

    pub fn add_quantity(&mut self, quantity: Quantity, value: u64) {
        self.quantities[quantity as usize] += value;
    }

    /// Merge another statistics record into this one.
    pub fn add(&mut self, other: &Self) {
        for (key, stats) in &other.shaders {
            self.shaders.entry(*key).or_default().merge(stats);
        }
        for (i, section) in other.sections.iter().enumerate() {
            self.sections[i].merge(section);
        }
        for (i, quantity) in other.quantities.iter().enumerate() {
            self.quantities[i] += quantity;
        }
    }

    #[must_use]
    pub fn shader(&self, key: SmallShaderKey) -> Option<&ShaderStats> {
        self.shaders.get(&key)
    }

    #[must_use]
    pub fn section(&self, ty: SectionType) -> &SectionStats {
        &self.sections[ty as usize]
    }

    #[must_use]
    pub fn quantity(&self, quantity: Quantity) -> u64 {
        self.quantities[quantity as usize]
    }

    /// Sum over all sub ids of one shader type.
    #[must_use]
    pub fn sum_shader_type(&self, ty: ShaderType) -> ShaderStats {
        let mut total = ShaderStats::default();
        for (key, stats) in &self.shaders {
            if key.ty() == ty {
                total.merge(stats);
            }
        }
        total
    }

    /// Render the human-readable multi-line report.
    ///
    /// `total_ms` is the wall time covered by the statistics, `iterations`
    /// the number of rendered iterations; `verbose` adds the per-material
    /// splits.
    #[must_use]
    pub fn dump(&self, total_ms: u64, iterations: u64, verbose: bool) -> String {
        let mut table = DumpTable::new();

        let shader_row = |table: &mut DumpTable, name: &str, stats: &ShaderStats| {
            if stats.count == 0 {
                table.row(vec![name.to_string(), "0.00 ms [0]".to_string()]);
                return;
            }
            let mut cols = vec![
                name.to_string(),
                format!("{:.2} ms [{}]", stats.elapsed_ms, stats.count),
            ];
            if iterations > 0 {
                cols.push(format!(
                    "{:.2} ms [{}] per Iteration",
                    stats.elapsed_ms / iterations as f64,
                    stats.count / iterations
                ));
            }
            if stats.count > 1 {
                cols.push(format!(
                    "{:.2} ms per Call",
                    stats.elapsed_ms / stats.count as f64
                ));
            }
            table.row(cols);
        };

        let detail_row =
            |table: &mut DumpTable, name: &str, stats: &ShaderStats, total_workload: u64| {
                if stats.count == 0 {
                    return;
                }
                let share = if total_workload > 0 {
                    stats.workload as f64 / total_workload as f64 * 100.0
                } else {
                    0.0
                };
                table.row(vec![
                    name.to_string(),
                    format!("{:.2} ms [{}]", stats.elapsed_ms, stats.count),
                    format!("{share:.3}%"),
                    format!(
                        "(min {}, avg {:.2}, max {}) per Call",
                        stats.min_workload,
                        stats.workload as f64 / stats.count as f64,
                        stats.max_workload
                    ),
                ]);
            };

        let section_row = |table: &mut DumpTable, name: &str, stats: &SectionStats| {
            if stats.count > 0 {
                table.row(vec![
                    name.to_string(),
                    format!("{:.2} ms [{}]", stats.elapsed_ms, stats.count),
                ]);
            }
        };

        let quantity_cell = |count: u64| {
            let per_ms = count / total_ms.max(1);
            format!("{per_ms} per ms [{count}]")
        };

        let basic = |table: &mut DumpTable, name: &str, ty: ShaderType| {
            let stats = self
                .shaders
                .get(&SmallShaderKey::from(ty))
                .copied()
                .unwrap_or_default();
            shader_row(table, name, &stats);
        };

        let total_hits = self.sum_shader_type(ShaderType::Hit);

        table.row(vec!["Statistics:".to_string()]);
        table.row(vec!["  Shader:".to_string()]);
        basic(&mut table, "  |-Device", ShaderType::Device);
        basic(&mut table, "  |-PrimaryTraversal", ShaderType::PrimaryTraversal);
        basic(
            &mut table,
            "  |-SecondaryTraversal",
            ShaderType::SecondaryTraversal,
        );
        basic(&mut table, "  |-RayGeneration", ShaderType::RayGeneration);
        basic(&mut table, "  |-Miss", ShaderType::Miss);
        shader_row(&mut table, "  |-Hits", &total_hits);

        if verbose {
            let mut hit_keys: Vec<_> = self
                .shaders
                .keys()
                .filter(|k| k.ty() == ShaderType::Hit)
                .collect();
            hit_keys.sort_by_key(|k| k.sub_id());
            for key in hit_keys {
                detail_row(
                    &mut table,
                    &format!("  ||-@{}", key.sub_id()),
                    &self.shaders[key],
                    total_hits.workload,
                );
            }
        }

        let total_adv_hits = self.sum_shader_type(ShaderType::AdvancedShadowHit);
        let total_adv_misses = self.sum_shader_type(ShaderType::AdvancedShadowMiss);
        if total_adv_hits.count > 0 || total_adv_misses.count > 0 {
            table.row(vec!["  |-AdvancedShadow".to_string()]);
            shader_row(&mut table, "  ||-Hits", &total_adv_hits);
            shader_row(&mut table, "  ||-Miss", &total_adv_misses);
            if verbose {
                for (key, stats) in &self.shaders {
                    if key.ty() == ShaderType::AdvancedShadowHit
                        || key.ty() == ShaderType::AdvancedShadowMiss
                    {
                        detail_row(
                            &mut table,
                            &format!("  |||-@{}", key.sub_id()),
                            stats,
                            total_hits.workload,
                        );
                    }
                }
            }
        }

        let total_callbacks = self.sum_shader_type(ShaderType::Callback);
        if total_callbacks.count > 0 {
            shader_row(&mut table, "  |-Callback", &total_callbacks);
            for (key, stats) in &self.shaders {
                if key.ty() == ShaderType::Callback {
                    shader_row(&mut table, &format!("  ||-@{}>", key.sub_id()), stats);
                }
            }
        }

        for (name, ty) in [
            ("  |-ImageInfo", ShaderType::ImageInfo),
            ("  |-Tonemap", ShaderType::Tonemap),
            ("  |-Bake", ShaderType::Bake),
        ] {
            if self.shaders.contains_key(&SmallShaderKey::from(ty)) {
                basic(&mut table, name, ty);
            }
        }

        table.row(vec!["  Sections:".to_string()]);
        for ty in [
            SectionType::ImageLoading,
            SectionType::PackedImageLoading,
            SectionType::BufferLoading,
            SectionType::BufferRequests,
            SectionType::BufferReleases,
            SectionType::FramebufferUpdate,
            SectionType::AovUpdate,
            SectionType::TonemapUpdate,
            SectionType::FramebufferHostUpdate,
            SectionType::AovHostUpdate,
        ] {
            section_row(
                &mut table,
                &format!("  |-{}", ty.name()),
                &self.sections[ty as usize],
            );
        }

        let camera = self.quantity(Quantity::CameraRayCount);
        let shadow = self.quantity(Quantity::ShadowRayCount);
        let bounce = self.quantity(Quantity::BounceRayCount);

        table.row(vec!["  Quantities:".to_string()]);
        table.row(vec!["  |-CameraRays".to_string(), quantity_cell(camera)]);
        table.row(vec!["  |-ShadowRays".to_string(), quantity_cell(shadow)]);
        table.row(vec!["  |-BounceRays".to_string(), quantity_cell(bounce)]);
        table.row(vec![
            "  |-PrimaryRays".to_string(),
            quantity_cell(camera + bounce),
        ]);
        table.row(vec![
            "  |-TotalRays".to_string(),
            quantity_cell(camera + bounce + shadow),
        ]);

        table.print()
    }
}

/// Column-aligned plain text table for the report.
struct DumpTable {
    column_count: usize,
    rows: Vec<Vec<String>>,
}

impl DumpTable {
    fn new() -> Self {
        Self {
            column_count: 0,
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cols: Vec<String>) {
        self.column_count = self.column_count.max(cols.len());
        self.rows.push(cols);
    }

    fn print(&self) -> String {
        let mut widths = vec![0usize; self.column_count];
        for row in &self.rows {
            for (col, cell) in row.iter().enumerate() {
                widths[col] = widths[col].max(cell.len());
            }
        }

        let mut out = String::new();
        for row in &self.rows {
            for (col, cell) in row.iter().enumerate() {
                if col > 0 {
                    let _ = write!(out, " | ");
                    // Right-align everything but the label column
                    for _ in cell.len()..widths[col] {
                        out.push(' ');
                    }
                }
                out.push_str(cell);
                if col == 0 && row.len() > 1 {
                    for _ in cell.len()..widths[0] {
                        out.push(' ');
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_counts() {
        let mut a = Statistics::new();
        let mut b = Statistics::new();

        let key = SmallShaderKey::new(ShaderType::Hit, 3);
        a.add_shader(
            key,
            &ShaderStats {
                elapsed_ms: 1.0,
                count: 1,
                workload: 10,
                max_workload: 10,
                min_workload: 10,
            },
        );
        b.add_shader(
            key,
            &ShaderStats {
                elapsed_ms: 2.0,
                count: 2,
                workload: 30,
                max_workload: 20,
                min_workload: 5,
            },
        );
        b.add_quantity(Quantity::CameraRayCount, 100);

        a.add(&b);
        let merged = a.shader(key).unwrap();
        assert_eq!(merged.count, 3);
        assert_eq!(merged.workload, 40);
        assert_eq!(merged.max_workload, 20);
        assert_eq!(merged.min_workload, 5);
        assert_eq!(a.quantity(Quantity::CameraRayCount), 100);
    }

    #[test]
    fn dump_contains_all_quantity_rows() {
        let mut stats = Statistics::new();
        stats.add_quantity(Quantity::CameraRayCount, 10);
        stats.add_quantity(Quantity::BounceRayCount, 5);
        stats.add_quantity(Quantity::ShadowRayCount, 2);

        let report = stats.dump(1, 1, false);
        assert!(report.contains("CameraRays"));
        assert!(report.contains("PrimaryRays"));
        assert!(report.contains("[15]")); // camera + bounce
        assert!(report.contains("[17]")); // total
    }

    #[test]
    fn dump_lists_hit_split_when_verbose() {
        let mut stats = Statistics::new();
        stats.add_shader(
            SmallShaderKey::new(ShaderType::Hit, 1),
            &ShaderStats {
                elapsed_ms: 1.0,
                count: 4,
                workload: 100,
                max_workload: 40,
                min_workload: 10,
            },
        );

        let report = stats.dump(1, 1, true);
        assert!(report.contains("||-@1"));
        assert!(report.contains("100.000%"));
    }
}
