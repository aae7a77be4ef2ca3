//! Float environment control around shader execution.
//!
//! Shaders run with flush-to-zero and denormals-are-zero enabled on
//! x86-64 hosts; the previous MXCSR state is restored on scope exit.

/// Scope guard enabling FTZ/DAZ for its lifetime.
pub struct FlushToZeroGuard {
    #[cfg(target_arch = "x86_64")]
    saved_csr: u32,
}

impl FlushToZeroGuard {
    #[must_use]
    pub fn new() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            const FLUSH_TO_ZERO: u32 = 1 << 15;
            const DENORMALS_ARE_ZERO: u32 = 1 << 6;

            let saved_csr = unsafe { std::arch::x86_64::_mm_getcsr() };
            unsafe {
                std::arch::x86_64::_mm_setcsr(saved_csr | FLUSH_TO_ZERO | DENORMALS_ARE_ZERO);
            }
            Self { saved_csr }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self {}
        }
    }
}

impl Default for FlushToZeroGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FlushToZeroGuard {
    fn drop(&mut self) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            std::arch::x86_64::_mm_setcsr(self.saved_csr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_arch = "x86_64")]
    fn guard_restores_previous_state() {
        let before = unsafe { std::arch::x86_64::_mm_getcsr() };
        {
            let _guard = FlushToZeroGuard::new();
            let inside = unsafe { std::arch::x86_64::_mm_getcsr() };
            assert_ne!(inside & (1 << 15), 0);
            assert_ne!(inside & (1 << 6), 0);
        }
        let after = unsafe { std::arch::x86_64::_mm_getcsr() };
        assert_eq!(before, after);
    }
}
