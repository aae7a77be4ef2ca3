//! Per-thread scratch records.
//!
//! Worker threads spawned inside a CPU device shader acquire a scratch
//! record before touching the device and release it afterwards.
//! Acquisition goes through a bounded concurrent FIFO; registration is
//! refcounted per thread so register/unregister pairs may nest.

use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam::queue::SegQueue;
use helios_core::ParameterSet;
use helios_stats::{SectionType, ShaderKey, ShaderType, StatisticHandler, Statistics};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

use crate::backend::DeviceArray;
use crate::stream::DeviceStream;

/// Scratch state owned by one registered thread at a time.
pub struct CpuData {
    pub ref_count: usize,
    pub primary: DeviceStream,
    pub secondary: DeviceStream,
    pub tmp_ray_begins: DeviceArray<i32>,
    pub tmp_ray_ends: DeviceArray<i32>,
    pub stats: StatisticHandler,
    pub current_local_registry: Option<Arc<RwLock<ParameterSet>>>,
    pub current_shader_key: ShaderKey,
    /// Sections opened through the shader ABI, closed LIFO.
    pub open_sections: Vec<(SectionType, Instant)>,
}

impl Default for CpuData {
    fn default() -> Self {
        Self {
            ref_count: 0,
            primary: DeviceStream::default(),
            secondary: DeviceStream::default(),
            tmp_ray_begins: DeviceArray::empty(),
            tmp_ray_ends: DeviceArray::empty(),
            stats: StatisticHandler::new(),
            current_local_registry: None,
            current_shader_key: ShaderKey::new(0, ShaderType::Device, 0),
            open_sections: Vec::new(),
        }
    }
}

/// Distinguishes scratch pools across device lifetimes so stale
/// thread-local handles from a torn down interface are never revived.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<(u64, *mut CpuData)> = const { Cell::new((0, std::ptr::null_mut())) };
}

/// The bounded pool of scratch records.
pub struct ScratchPool {
    generation: u64,
    records: Vec<Box<UnsafeCell<CpuData>>>,
    available: SegQueue<usize>,
    /// GPU targets run one implicit stream and share a single record.
    single: bool,
}

// Records are handed out exclusively through the FIFO; the pool itself
// only touches them while no thread holds them (merge, reset).
unsafe impl Send for ScratchPool {}
unsafe impl Sync for ScratchPool {}

impl ScratchPool {
    /// Create a pool of `count` records, or a single shared record for
    /// GPU targets.
    #[must_use]
    pub fn new(count: usize, single: bool) -> Self {
        let count = if single { 1 } else { count.max(1) };
        let records: Vec<_> = (0..count)
            .map(|_| Box::new(UnsafeCell::new(CpuData::default())))
            .collect();

        let available = SegQueue::new();
        if !single {
            for i in 0..count {
                available.push(i);
            }
        }

        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            records,
            available,
            single,
        }
    }

    /// Register the calling thread, acquiring a record on first entry.
    pub fn register(&self) {
        if self.single {
            CURRENT.with(|c| c.set((self.generation, self.records[0].get())));
            return;
        }

        let (generation, ptr) = CURRENT.with(Cell::get);
        if generation == self.generation && !ptr.is_null() {
            unsafe { (*ptr).ref_count += 1 };
            return;
        }

        let index = loop {
            match self.available.pop() {
                Some(index) => break index,
                None => std::thread::yield_now(),
            }
        };

        let ptr = self.records[index].get();
        unsafe { (*ptr).ref_count = 1 };
        CURRENT.with(|c| c.set((self.generation, ptr)));
    }

    /// Unregister the calling thread, releasing the record when the
    /// registration count drops to zero.
    pub fn unregister(&self) {
        if self.single {
            return;
        }

        let (generation, ptr) = CURRENT.with(Cell::get);
        if generation != self.generation || ptr.is_null() {
            error!("Thread was not registered with the device");
            return;
        }

        let data = unsafe { &mut *ptr };
        if data.ref_count <= 1 {
            data.ref_count = 0;
            let index = self
                .records
                .iter()
                .position(|r| r.get() == ptr)
                .expect("record belongs to pool");
            CURRENT.with(|c| c.set((0, std::ptr::null_mut())));
            self.available.push(index);
        } else {
            data.ref_count -= 1;
        }
    }

    /// Run `f` with the calling thread's scratch record.
    ///
    /// Returns `None` if the thread is not registered.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut CpuData) -> R) -> Option<R> {
        let (generation, ptr) = CURRENT.with(Cell::get);
        if self.single {
            return Some(f(unsafe { &mut *self.records[0].get() }));
        }
        if generation != self.generation || ptr.is_null() {
            return None;
        }
        Some(f(unsafe { &mut *ptr }))
    }

    /// Whether the calling thread currently holds a record.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        if self.single {
            return true;
        }
        let (generation, ptr) = CURRENT.with(Cell::get);
        generation == self.generation && !ptr.is_null()
    }

    /// Merge every record's statistics into one aggregate.
    ///
    /// Must only be called while no shader is in flight.
    #[must_use]
    pub fn merged_statistics(&self) -> Statistics {
        let mut total = Statistics::new();
        for record in &self.records {
            let data = unsafe { &*record.get() };
            total.add(data.stats.statistics());
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_reentrant() {
        let pool = ScratchPool::new(2, false);
        pool.register();
        pool.register();
        assert!(pool.is_registered());
        pool.with_current(|data| assert_eq!(data.ref_count, 2));

        pool.unregister();
        assert!(pool.is_registered());
        pool.unregister();
        assert!(!pool.is_registered());
    }

    #[test]
    fn records_cycle_through_the_pool() {
        let pool = ScratchPool::new(1, false);
        pool.register();
        pool.unregister();
        // The record returned to the queue; a new registration succeeds
        pool.register();
        assert!(pool.is_registered());
        pool.unregister();
    }

    #[test]
    fn workers_get_distinct_records() {
        let pool = std::sync::Arc::new(ScratchPool::new(4, false));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = std::sync::Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                pool.register();
                pool.with_current(|data| {
                    data.stats
                        .increase(helios_stats::Quantity::CameraRayCount, 1);
                });
                pool.unregister();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let merged = pool.merged_statistics();
        assert_eq!(merged.quantity(helios_stats::Quantity::CameraRayCount), 4);
    }

    #[test]
    fn single_mode_is_always_registered() {
        let pool = ScratchPool::new(8, true);
        assert!(pool.is_registered());
        pool.register();
        pool.unregister();
        assert!(pool.is_registered());
    }
}
