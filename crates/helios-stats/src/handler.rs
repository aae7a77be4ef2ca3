//! Per-thread statistic recording.

use std::time::Instant;

use hashbrown::HashMap;

use crate::key::SmallShaderKey;
use crate::statistics::{SectionStats, ShaderStats, Statistics};
use crate::types::{Quantity, SectionType};

/// Records begin/stop events of shader launches and sections for one
/// thread and accumulates them into a [`Statistics`] record.
///
/// Launch timing uses monotonic host timestamps; for device targets
/// this is an upper bound including submission overhead.
#[derive(Debug, Default)]
pub struct StatisticHandler {
    statistics: Statistics,
    in_flight: HashMap<SmallShaderKey, (Instant, u64)>,
}

impl StatisticHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.statistics.reset();
        self.in_flight.clear();
    }

    /// Record the start of a shader launch with its workload size.
    pub fn begin_shader_launch(&mut self, key: SmallShaderKey, workload: u64) {
        self.in_flight.insert(key, (Instant::now(), workload));
    }

    /// Record the end of a shader launch started earlier.
    pub fn end_shader_launch(&mut self, key: SmallShaderKey) {
        let Some((start, workload)) = self.in_flight.remove(&key) else {
            return;
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
        self.statistics.add_shader(
            key,
            &ShaderStats {
                elapsed_ms,
                count: 1,
                workload,
                max_workload: workload,
                min_workload: workload,
            },
        );
    }

    /// Time a section until the returned guard drops.
    #[must_use]
    pub fn section(&mut self, ty: SectionType) -> SectionGuard<'_> {
        SectionGuard {
            handler: self,
            ty,
            start: Instant::now(),
        }
    }

    pub fn begin_section(&mut self, _ty: SectionType) -> Instant {
        Instant::now()
    }

    pub fn end_section(&mut self, ty: SectionType, start: Instant) {
        self.statistics.add_section(
            ty,
            &SectionStats {
                elapsed_ms: start.elapsed().as_secs_f64() * 1e3,
                count: 1,
            },
        );
    }

    pub fn increase(&mut self, quantity: Quantity, value: u64) {
        self.statistics.add_quantity(quantity, value);
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

/// Scope guard closing a section measurement on drop.
pub struct SectionGuard<'a> {
    handler: &'a mut StatisticHandler,
    ty: SectionType,
    start: Instant,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        self.handler.end_section(self.ty, self.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ShaderType;

    #[test]
    fn launch_bracketing_accumulates() {
        let mut handler = StatisticHandler::new();
        let key = SmallShaderKey::new(ShaderType::Miss, 0);

        handler.begin_shader_launch(key, 128);
        handler.end_shader_launch(key);
        handler.begin_shader_launch(key, 64);
        handler.end_shader_launch(key);

        let stats = handler.statistics().shader(key).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.workload, 192);
        assert_eq!(stats.min_workload, 64);
        assert_eq!(stats.max_workload, 128);
    }

    #[test]
    fn end_without_begin_is_ignored() {
        let mut handler = StatisticHandler::new();
        let key = SmallShaderKey::new(ShaderType::Device, 0);
        handler.end_shader_launch(key);
        assert!(handler.statistics().shader(key).is_none());
    }

    #[test]
    fn section_guard_records_on_drop() {
        let mut handler = StatisticHandler::new();
        {
            let _guard = handler.section(SectionType::ImageLoading);
        }
        assert_eq!(
            handler.statistics().section(SectionType::ImageLoading).count,
            1
        );
    }
}
