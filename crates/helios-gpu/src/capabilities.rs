//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl Vendor {
    /// Identify vendor from PCI vendor ID.
    #[must_use]
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities relevant for residency decisions.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: Vendor,
    pub device_name: String,
    pub api_version: u32,
    pub driver_version: u32,
    /// Device-local memory in MB.
    pub device_local_memory_mb: u64,
    /// Maximum memory allocation count.
    pub max_memory_allocation_count: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    #[must_use]
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let vendor = Vendor::from_vendor_id(properties.vendor_id);
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            max_memory_allocation_count: properties.limits.max_memory_allocation_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_ids_map_to_known_vendors() {
        assert_eq!(Vendor::from_vendor_id(0x10DE), Vendor::Nvidia);
        assert_eq!(Vendor::from_vendor_id(0x1002), Vendor::Amd);
        assert_eq!(Vendor::from_vendor_id(0x8086), Vendor::Intel);
        assert_eq!(Vendor::from_vendor_id(0x1234), Vendor::Other(0x1234));
    }
}
