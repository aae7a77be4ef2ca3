//! Framebuffer and AOV accumulators.

use crate::backend::{DeviceArray, DeviceBackend};

/// One accumulator image: the main "Color" framebuffer or a named AOV.
///
/// Pixels are `width × height × 3` floats on the host; device copies
/// live in the per-device residency data and are synchronised through
/// the `mapped` flag.
#[derive(Default)]
pub struct Aov {
    pub data: DeviceArray<f32>,
    /// The host copy reflects the latest device copy.
    pub mapped: bool,
    /// Never copied back from the device (e.g. "Denoised").
    pub host_only: bool,
    /// Pending iteration delta committed at the end of an iteration.
    pub iter_diff: i32,
    /// Sample budget reflected in the buffer.
    pub iteration_count: usize,
}

impl Aov {
    /// Allocate host pixels for the given film size.
    pub fn allocate(&mut self, backend: &DeviceBackend, width: usize, height: usize, label: &str) {
        // Host pixels always live in host memory, whatever the target
        let _ = backend;
        self.data = DeviceBackend::Host.alloc_array::<f32>(width * height * 3, label);
        self.mapped = false;
        self.iter_diff = 0;
        self.iteration_count = 0;
    }

    /// Zero the pixels and reset the iteration counters.
    pub fn clear(&mut self) {
        self.data.fill_zero();
        self.iteration_count = 0;
        self.iter_diff = 0;
    }

    /// Commit the pending iteration delta.
    pub fn commit_iteration(&mut self) {
        let next = self.iteration_count as i64 + i64::from(self.iter_diff);
        self.iteration_count = next.max(0) as usize;
        self.iter_diff = 0;
    }

    /// Commit a whole iteration on the main framebuffer.
    pub fn commit_main_iteration(&mut self) {
        self.iteration_count += 1;
        self.iter_diff = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_applies_pending_delta() {
        let mut aov = Aov::default();
        aov.iter_diff = 2;
        aov.commit_iteration();
        assert_eq!(aov.iteration_count, 2);
        assert_eq!(aov.iter_diff, 0);

        aov.iter_diff = -5;
        aov.commit_iteration();
        assert_eq!(aov.iteration_count, 0); // clamped
    }

    #[test]
    fn clear_resets_counts_and_pixels() {
        let backend = DeviceBackend::Host;
        let mut aov = Aov::default();
        aov.allocate(&backend, 4, 4, "test");
        aov.data.as_mut_slice()[0] = 1.0;
        aov.iteration_count = 3;

        aov.clear();
        assert_eq!(aov.iteration_count, 0);
        assert!(aov.data.as_slice().iter().all(|&v| v == 0.0));
    }
}
