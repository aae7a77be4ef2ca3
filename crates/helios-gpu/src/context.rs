//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, find_compute_queue_family, select_physical_device};
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Vulkan context for one physical device.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Mutex<GpuAllocator>,
    compute_queue_family: u32,
    compute_queue: vk::Queue,
}

impl GpuContext {
    #[must_use]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    #[must_use]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[must_use]
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    #[must_use]
    pub fn compute_queue_family(&self) -> u32 {
        self.compute_queue_family
    }

    #[must_use]
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Allocate a mapped residency buffer.
    pub fn create_buffer(&self, size: u64, name: &str) -> Result<GpuBuffer> {
        self.allocator.lock().create_buffer(size, name)
    }

    /// Free a residency buffer.
    pub fn free_buffer(&self, buffer: &mut GpuBuffer) -> Result<()> {
        self.allocator.lock().free_buffer(buffer)
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator before destroying the device; this
            // frees all VkDeviceMemory allocations.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    device_index: u32,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Helios".to_string(),
            device_index: 0,
        }
    }
}

impl GpuContextBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Select the physical device by enumeration index.
    #[must_use]
    pub const fn device_index(mut self, index: u32) -> Self {
        self.device_index = index;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance = unsafe { create_instance(&entry, &self.app_name) }?;
        let physical_device = unsafe { select_physical_device(&instance, self.device_index) }?;
        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };

        info!(
            "Using GPU '{}' ({:?}, {} MB local)",
            capabilities.device_name, capabilities.vendor, capabilities.device_local_memory_mb
        );

        let compute_queue_family =
            unsafe { find_compute_queue_family(&instance, physical_device) }?;

        let queue_priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(compute_queue_family)
            .queue_priorities(&queue_priorities)];

        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);

        let device = unsafe { instance.create_device(physical_device, &device_info, None) }?;
        let device = Arc::new(device);

        let compute_queue = unsafe { device.get_device_queue(compute_queue_family, 0) };

        let allocator =
            unsafe { GpuAllocator::new(&instance, Arc::clone(&device), physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            compute_queue_family,
            compute_queue,
        })
    }
}
