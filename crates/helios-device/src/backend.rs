//! Device memory residency.
//!
//! A [`DeviceBackend`] hands out [`DeviceArray`] allocations that are
//! always reachable through a plain host pointer: heap memory on CPU
//! targets, persistently mapped Vulkan buffers on GPU targets. The
//! compiled shaders address all device data through these pointers.
//!
//! Allocation failure is fatal by design: the streaming pipeline cannot
//! make progress after losing a stream buffer.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use bytemuck::Pod;
use helios_core::util::format_memory;
use helios_core::{GpuVendor, Target};
use helios_gpu::{GpuBuffer, GpuContext, GpuContextBuilder, Vendor};
use tracing::{debug, error, info};

use crate::error::Result;

/// Alignment of host residency allocations, matching what the widest
/// BVH node layout expects.
const HOST_ALLOC_ALIGN: usize = 64;

/// Compute the non-zero integer id of a device target.
///
/// The host is always id 0; GPU devices get a vendor-tagged id so
/// generated code can distinguish residency domains.
#[must_use]
pub fn device_id_for_target(target: &Target) -> i32 {
    if !target.is_gpu() {
        return 0;
    }
    let vendor_tag = match target.gpu_vendor() {
        GpuVendor::Nvidia => 1,
        GpuVendor::Amd => 2,
        GpuVendor::Intel => 3,
        GpuVendor::Unknown => 4,
    };
    vendor_tag | ((target.device() as i32 + 1) << 4)
}

/// Where device memory lives.
pub enum DeviceBackend {
    Host,
    Gpu(Arc<GpuContext>),
}

impl DeviceBackend {
    /// Create the backend for a target.
    ///
    /// GPU targets open a Vulkan context on the requested device.
    pub fn for_target(target: &Target) -> Result<Self> {
        if target.is_gpu() {
            let context = GpuContextBuilder::new()
                .app_name("helios")
                .device_index(target.device())
                .build()?;
            Ok(Self::Gpu(Arc::new(context)))
        } else {
            Ok(Self::Host)
        }
    }

    #[must_use]
    pub const fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu(_))
    }

    /// Human readable device name for logging.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Host => "Host".to_string(),
            Self::Gpu(context) => context.capabilities().device_name.clone(),
        }
    }

    /// Detected vendor of a GPU backend.
    #[must_use]
    pub fn vendor(&self) -> Option<Vendor> {
        match self {
            Self::Host => None,
            Self::Gpu(context) => Some(context.capabilities().vendor),
        }
    }

    /// Allocate a zero-initialised array of `len` elements.
    ///
    /// Aborts the process when the allocation cannot be served.
    #[must_use]
    pub fn alloc_array<T: Pod>(&self, len: usize, label: &str) -> DeviceArray<T> {
        if len == 0 {
            return DeviceArray::empty();
        }
        let bytes = len * std::mem::size_of::<T>();
        debug!("Allocating {} for '{label}'", format_memory(bytes));

        match self {
            Self::Host => {
                let layout = Layout::from_size_align(bytes, HOST_ALLOC_ALIGN)
                    .expect("invalid allocation layout");
                let ptr = unsafe { alloc_zeroed(layout) };
                let Some(ptr) = NonNull::new(ptr) else {
                    error!("Out of memory");
                    std::process::abort();
                };
                DeviceArray {
                    ptr: ptr.as_ptr().cast::<T>(),
                    len,
                    _backing: Backing::Host(HostAlloc { ptr, layout }),
                    _marker: PhantomData,
                }
            }
            Self::Gpu(context) => {
                let buffer = match context.create_buffer(bytes as u64, label) {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        error!("Out of memory: {err}");
                        std::process::abort();
                    }
                };
                let ptr = buffer.mapped_ptr().cast::<T>();
                unsafe { std::ptr::write_bytes(ptr.cast::<u8>(), 0, bytes) };
                DeviceArray {
                    ptr,
                    len,
                    _backing: Backing::Gpu(GpuAlloc {
                        buffer: Some(buffer),
                        context: Arc::clone(context),
                    }),
                    _marker: PhantomData,
                }
            }
        }
    }

    /// Allocate an array and copy `data` into it.
    #[must_use]
    pub fn copy_to_device<T: Pod>(&self, data: &[T], label: &str) -> DeviceArray<T> {
        let array = self.alloc_array::<T>(data.len(), label);
        if !data.is_empty() {
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), array.ptr, data.len());
            }
        }
        array
    }

    /// Make `data` resident for this backend.
    ///
    /// The host backend shares the memory without a copy (the keeper is
    /// cloned to pin it); GPU backends copy into device memory once.
    #[must_use]
    pub fn make_resident<T: Pod, K: Send + Sync + 'static>(
        &self,
        data: &[T],
        keeper: &Arc<K>,
        label: &str,
    ) -> DeviceArray<T> {
        match self {
            Self::Host => DeviceArray {
                ptr: data.as_ptr().cast_mut(),
                len: data.len(),
                _backing: Backing::View(Arc::clone(keeper) as Arc<dyn std::any::Any + Send + Sync>),
                _marker: PhantomData,
            },
            Self::Gpu(_) => self.copy_to_device(data, label),
        }
    }

    /// Log the backend once at setup.
    pub fn announce(&self) {
        info!("Using device {}", self.name());
    }
}

struct HostAlloc {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Drop for HostAlloc {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

struct GpuAlloc {
    buffer: Option<GpuBuffer>,
    context: Arc<GpuContext>,
}

impl Drop for GpuAlloc {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            let _ = self.context.free_buffer(&mut buffer);
        }
    }
}

enum Backing {
    None,
    Host(HostAlloc),
    Gpu(GpuAlloc),
    /// Borrowed host view; the keeper pins the owning allocation.
    View(Arc<dyn std::any::Any + Send + Sync>),
}

/// A typed device allocation with a stable host pointer.
///
/// The pointer stays valid for the lifetime of the array even while the
/// array value itself moves; shaders run with raw copies of it. No
/// aliasing is enforced between shader launches, per the streaming
/// pipeline contract.
pub struct DeviceArray<T> {
    ptr: *mut T,
    len: usize,
    _backing: Backing,
    _marker: PhantomData<T>,
}

// Device arrays are plain memory owned by the backing; cross-thread
// sharing follows the dispatch ordering rules of the coordinator.
unsafe impl<T: Send> Send for DeviceArray<T> {}
unsafe impl<T: Sync> Sync for DeviceArray<T> {}

impl<T: Pod> DeviceArray<T> {
    /// An unallocated array.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
            _backing: Backing::None,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const T {
        self.ptr
    }

    #[must_use]
    pub const fn as_mut_ptr(&self) -> *mut T {
        self.ptr
    }

    /// View the array as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    /// View the array as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.len == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
        }
    }

    /// Copy `data` into the head of the array.
    pub fn copy_from_slice(&mut self, data: &[T]) {
        assert!(data.len() <= self.len, "copy exceeds array length");
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr, data.len());
        }
    }

    /// Zero the whole array.
    pub fn fill_zero(&mut self) {
        if self.len > 0 {
            unsafe {
                std::ptr::write_bytes(self.ptr.cast::<u8>(), 0, self.len * std::mem::size_of::<T>());
            }
        }
    }
}

impl<T: Pod> Default for DeviceArray<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_alloc_is_zeroed_and_aligned() {
        let backend = DeviceBackend::Host;
        let array: DeviceArray<f32> = backend.alloc_array(100, "test");
        assert_eq!(array.len(), 100);
        assert_eq!(array.as_ptr() as usize % HOST_ALLOC_ALIGN, 0);
        assert!(array.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn copy_to_device_round_trips() {
        let backend = DeviceBackend::Host;
        let data = [1.0f32, 2.0, 3.0];
        let array = backend.copy_to_device(&data, "test");
        assert_eq!(array.as_slice(), &data);
    }

    #[test]
    fn resident_view_shares_host_memory() {
        let backend = DeviceBackend::Host;
        let keeper = Arc::new(vec![7u8; 16]);
        let array = backend.make_resident(keeper.as_slice(), &keeper, "view");
        assert_eq!(array.as_ptr(), keeper.as_ptr());
        assert_eq!(array.len(), 16);
    }

    #[test]
    fn host_device_id_is_zero() {
        assert_eq!(device_id_for_target(&Target::pick_cpu()), 0);
        let gpu = Target::gpu(GpuVendor::Nvidia, 0);
        assert_ne!(device_id_for_target(&gpu), 0);
    }
}
