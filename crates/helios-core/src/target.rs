//! Execution target description.
//!
//! A [`Target`] describes where the shader pipeline runs: a CPU with a
//! thread count and vector width, or a GPU identified by vendor and
//! device index. Every other component of the renderer is parameterised
//! by the target picked before setup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// GPU vendor of a device target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuVendor {
    Amd,
    Intel,
    Nvidia,
    Unknown,
}

/// CPU architecture of a host target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuArchitecture {
    Arm,
    X86,
    Unknown,
}

/// Describes the execution device for the whole pipeline.
///
/// Constructed once before runtime setup and immutable thereafter.
/// Exactly one of the CPU architecture or the GPU vendor is meaningful,
/// depending on [`Target::is_gpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    gpu: bool,
    gpu_vendor: GpuVendor,
    cpu_arch: CpuArchitecture,
    device: u32,
    thread_count: u32,
    vector_width: u32,
}

impl Target {
    /// A portable CPU target: hardware thread count, scalar-friendly width.
    #[must_use]
    pub fn generic() -> Self {
        Self::cpu(0, 4)
    }

    /// A single threaded scalar CPU target, mostly useful for debugging.
    #[must_use]
    pub fn single() -> Self {
        Self::cpu(1, 1)
    }

    /// A CPU target with the host architecture.
    #[must_use]
    pub fn cpu(threads: u32, vector_width: u32) -> Self {
        Self::cpu_with_arch(host_architecture(), threads, vector_width)
    }

    /// A CPU target with an explicit architecture.
    #[must_use]
    pub const fn cpu_with_arch(arch: CpuArchitecture, threads: u32, vector_width: u32) -> Self {
        Self {
            gpu: false,
            gpu_vendor: GpuVendor::Unknown,
            cpu_arch: arch,
            device: 0,
            thread_count: threads,
            vector_width,
        }
    }

    /// A GPU target for the given vendor and device index.
    #[must_use]
    pub const fn gpu(vendor: GpuVendor, device: u32) -> Self {
        Self {
            gpu: true,
            gpu_vendor: vendor,
            cpu_arch: CpuArchitecture::Unknown,
            device,
            thread_count: 0,
            vector_width: 1,
        }
    }

    /// Pick the best CPU target for the host.
    #[must_use]
    pub fn pick_cpu() -> Self {
        Self::cpu(0, host_vector_width())
    }

    /// Pick a GPU target for the given device index.
    ///
    /// Vendor detection is left to the device layer; the returned target
    /// carries [`GpuVendor::Unknown`] until refined by the caller.
    #[must_use]
    pub const fn pick_gpu(device: u32) -> Self {
        Self::gpu(GpuVendor::Unknown, device)
    }

    /// Pick the best available target.
    ///
    /// GPU targets require an explicit opt-in as device enumeration
    /// lives in the device layer, so this resolves to the best CPU pick.
    #[must_use]
    pub fn pick_best() -> Self {
        Self::pick_cpu()
    }

    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        !self.gpu
    }

    #[must_use]
    pub const fn is_gpu(&self) -> bool {
        self.gpu
    }

    #[must_use]
    pub const fn gpu_vendor(&self) -> GpuVendor {
        self.gpu_vendor
    }

    #[must_use]
    pub const fn cpu_architecture(&self) -> CpuArchitecture {
        self.cpu_arch
    }

    /// Device index. Only meaningful for GPU targets.
    #[must_use]
    pub const fn device(&self) -> u32 {
        self.device
    }

    /// Requested thread count. Zero selects the hardware default.
    #[must_use]
    pub const fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn set_thread_count(&mut self, threads: u32) {
        self.thread_count = threads;
    }

    /// SIMD vector width hint. Only meaningful for CPU targets.
    #[must_use]
    pub const fn vector_width(&self) -> u32 {
        self.vector_width
    }

    pub fn set_vector_width(&mut self, width: u32) {
        self.vector_width = width;
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gpu {
            write!(f, "GPU[{:?}, device {}]", self.gpu_vendor, self.device)
        } else {
            write!(
                f,
                "CPU[{:?}, threads {}, vector width {}]",
                self.cpu_arch, self.thread_count, self.vector_width
            )
        }
    }
}

/// Architecture of the machine running this process.
#[must_use]
pub fn host_architecture() -> CpuArchitecture {
    if cfg!(any(target_arch = "x86_64", target_arch = "x86")) {
        CpuArchitecture::X86
    } else if cfg!(any(target_arch = "aarch64", target_arch = "arm")) {
        CpuArchitecture::Arm
    } else {
        CpuArchitecture::Unknown
    }
}

/// Preferred SIMD width of the host in 32-bit lanes.
#[must_use]
pub fn host_vector_width() -> u32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return 8;
        }
        if is_x86_feature_detected!("sse4.2") {
            return 4;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        return 4;
    }
    #[allow(unreachable_code)]
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_target_is_not_gpu() {
        let t = Target::cpu(8, 8);
        assert!(t.is_cpu());
        assert!(!t.is_gpu());
        assert_eq!(t.thread_count(), 8);
        assert_eq!(t.vector_width(), 8);
    }

    #[test]
    fn gpu_target_carries_vendor_and_device() {
        let t = Target::gpu(GpuVendor::Nvidia, 1);
        assert!(t.is_gpu());
        assert_eq!(t.gpu_vendor(), GpuVendor::Nvidia);
        assert_eq!(t.device(), 1);
    }

    #[test]
    fn pick_cpu_has_nonzero_vector_width() {
        let t = Target::pick_cpu();
        assert!(t.vector_width() >= 1);
    }
}
