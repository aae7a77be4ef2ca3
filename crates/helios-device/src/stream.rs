//! Structure-of-arrays ray stream buffers.
//!
//! A stream is one contiguous float allocation viewed as per-component
//! columns of `capacity` elements each. Capacity advances in steps of
//! 32 rays and the buffer only ever grows; the per-ray component count
//! is the fixed column minimum plus the technique's payload, rounded up
//! to a multiple of 4.

use helios_core::util::round_up;

use crate::backend::{DeviceArray, DeviceBackend};
use crate::settings::{
    PrimaryStreamAbi, SecondaryStreamAbi, MIN_PRIMARY_STREAM_SIZE, MIN_SECONDARY_STREAM_SIZE,
};

/// Column capacity for a requested ray count: the next multiple of 32.
#[must_use]
pub const fn stream_capacity(size: usize) -> usize {
    (size & !31) + 32
}

/// Components per ray for a fixed minimum and payload width.
#[must_use]
pub const fn components_per_ray(min_components: usize, payload: usize) -> usize {
    round_up(min_components + payload, 4)
}

/// One ray stream buffer.
#[derive(Default)]
pub struct DeviceStream {
    data: DeviceArray<f32>,
    /// Elements per column of the current allocation.
    capacity: usize,
    /// Components per ray of the current allocation.
    components: usize,
}

impl DeviceStream {
    /// Ensure room for `size` rays of `components` columns each.
    ///
    /// Only reallocates when the rounded capacity exceeds the current
    /// allocation; existing contents are discarded on growth.
    pub fn resize(&mut self, backend: &DeviceBackend, size: usize, components: usize, label: &str) {
        let capacity = stream_capacity(size);
        let needed = capacity * components;
        if self.data.len() < needed {
            self.data = backend.alloc_array::<f32>(needed, label);
            self.capacity = capacity;
        }
        self.components = components;
    }

    #[must_use]
    pub fn is_allocated(&self) -> bool {
        !self.data.is_empty()
    }

    /// Elements per column of the current allocation.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn components(&self) -> usize {
        self.components
    }

    #[must_use]
    pub fn allocated_elements(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn base_ptr(&self) -> *mut f32 {
        self.data.as_mut_ptr()
    }

    /// Write the primary stream column pointers for shaders.
    pub fn write_primary_abi(&self, out: &mut PrimaryStreamAbi) {
        let ptr = self.base_ptr();
        let cap = self.capacity;
        let col = |i: usize| unsafe { ptr.add(i * cap) };

        out.id = col(0).cast();
        out.org_x = col(1);
        out.org_y = col(2);
        out.org_z = col(3);
        out.dir_x = col(4);
        out.dir_y = col(5);
        out.dir_z = col(6);
        out.tmin = col(7);
        out.tmax = col(8);
        out.ent_id = col(9).cast();
        out.prim_id = col(10).cast();
        out.t = col(11);
        out.u = col(12);
        out.v = col(13);
        out.rnd = col(14).cast();
        out.mis = col(15);
        out.contrib_r = col(16);
        out.contrib_g = col(17);
        out.contrib_b = col(18);
        out.depth = col(19).cast();
        out.payload = col(MIN_PRIMARY_STREAM_SIZE);
    }

    /// Write the secondary stream column pointers for shaders.
    pub fn write_secondary_abi(&self, out: &mut SecondaryStreamAbi) {
        let ptr = self.base_ptr();
        let cap = self.capacity;
        let col = |i: usize| unsafe { ptr.add(i * cap) };

        out.id = col(0).cast();
        out.org_x = col(1);
        out.org_y = col(2);
        out.org_z = col(3);
        out.dir_x = col(4);
        out.dir_y = col(5);
        out.dir_z = col(6);
        out.tmin = col(7);
        out.tmax = col(8);
        out.mat_id = col(9).cast();
        out.color_r = col(10);
        out.color_g = col(11);
        out.color_b = col(12);
        out.payload = col(MIN_SECONDARY_STREAM_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_advances_in_steps_of_32() {
        assert_eq!(stream_capacity(0), 32);
        assert_eq!(stream_capacity(1), 32);
        assert_eq!(stream_capacity(31), 32);
        assert_eq!(stream_capacity(32), 64);
        assert_eq!(stream_capacity(100), 128);
    }

    #[test]
    fn components_round_to_four() {
        assert_eq!(components_per_ray(MIN_PRIMARY_STREAM_SIZE, 0), 20);
        assert_eq!(components_per_ray(MIN_PRIMARY_STREAM_SIZE, 1), 24);
        assert_eq!(components_per_ray(MIN_SECONDARY_STREAM_SIZE, 0), 16);
        assert_eq!(components_per_ray(MIN_SECONDARY_STREAM_SIZE, 3), 16);
    }

    #[test]
    fn columns_are_capacity_apart() {
        let backend = DeviceBackend::Host;
        let mut stream = DeviceStream::default();
        let components = components_per_ray(MIN_PRIMARY_STREAM_SIZE, 4);
        stream.resize(&backend, 100, components, "primary");

        let mut abi = PrimaryStreamAbi::default();
        stream.write_primary_abi(&mut abi);

        let cap = stream.capacity();
        assert_eq!(cap, 128);
        let base = abi.id as usize;
        assert_eq!(abi.org_x as usize, base + cap * 4);
        assert_eq!(abi.org_y as usize, base + 2 * cap * 4);
        assert_eq!(abi.tmax as usize, base + 8 * cap * 4);
        assert_eq!(abi.depth as usize, base + 19 * cap * 4);
        assert_eq!(abi.payload as usize, base + 20 * cap * 4);
    }

    #[test]
    fn growth_is_monotonic_and_lazy() {
        let backend = DeviceBackend::Host;
        let mut stream = DeviceStream::default();
        let components = components_per_ray(MIN_SECONDARY_STREAM_SIZE, 0);

        stream.resize(&backend, 10, components, "secondary");
        let first_ptr = stream.base_ptr();
        let first_cap = stream.capacity();

        // A smaller request keeps the allocation
        stream.resize(&backend, 5, components, "secondary");
        assert_eq!(stream.base_ptr(), first_ptr);
        assert_eq!(stream.capacity(), first_cap);

        // Requests within the capacity keep the allocation
        stream.resize(&backend, 31, components, "secondary");
        assert_eq!(stream.base_ptr(), first_ptr);

        // Crossing the capacity grows it
        stream.resize(&backend, 64, components, "secondary");
        assert!(stream.capacity() > first_cap);
    }
}
