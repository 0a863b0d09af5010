//! Dispatch sizing and sort-buffer capacity.
//!
//! The instance count is only known after the prefix sum runs on the GPU, so
//! every size derived from it lives here where it can be tested on the CPU.

use crate::constants::{RADIX_BUCKETS, WORKGROUP_SIZE};

/// Number of workgroups of `group_size` needed to cover `count` invocations.
#[inline]
pub const fn group_count(count: u32, group_size: u32) -> u32 {
    count.div_ceil(group_size)
}

/// `ceil(log2(n))`, zero for `n <= 1`.
#[inline]
pub const fn scan_iterations(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - (n - 1).leading_zeros()
    }
}

/// Hillis-Steele passes needed to scan `n` elements (`ceil(log2 n) + 1`).
#[inline]
pub const fn scan_passes(n: u32) -> u32 {
    scan_iterations(n) + 1
}

/// Which ping-pong buffer (0 = ping, 1 = pong) holds the scan result.
///
/// Pass `t` reads buffer `t % 2` and writes buffer `(t + 1) % 2`.
#[inline]
pub const fn scan_result_index(n: u32) -> usize {
    (scan_passes(n) % 2) as usize
}

/// Radix sort dispatch geometry for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadixDispatch {
    pub num_elements: u32,
    pub blocks_per_workgroup: u32,
    pub workgroups: u32,
}

impl RadixDispatch {
    pub fn new(num_elements: u32, blocks_per_workgroup: u32) -> Self {
        let blocks_per_workgroup = blocks_per_workgroup.max(1);
        let invocations = num_elements.div_ceil(blocks_per_workgroup);
        Self {
            num_elements,
            blocks_per_workgroup,
            workgroups: group_count(invocations, WORKGROUP_SIZE).max(1),
        }
    }

    /// Elements handled by one workgroup.
    #[inline]
    pub const fn elements_per_workgroup(&self) -> u32 {
        self.blocks_per_workgroup * WORKGROUP_SIZE
    }

    /// Histogram entries (`u32`) needed by this dispatch.
    #[inline]
    pub const fn histogram_len(&self) -> u32 {
        self.workgroups * RADIX_BUCKETS
    }
}

/// Over-allocation policy for the sort key/value buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortCapacity {
    pub num_splats: u32,
    pub multiplier: u32,
}

impl SortCapacity {
    pub fn new(num_splats: u32, multiplier: u32) -> Self {
        Self {
            num_splats,
            multiplier: multiplier.max(1),
        }
    }

    /// Instances the sort buffers can hold.
    #[inline]
    pub fn instances(&self) -> u64 {
        u64::from(self.num_splats.max(1)) * u64::from(self.multiplier)
    }

    #[inline]
    pub fn fits(&self, total_instances: u32) -> bool {
        u64::from(total_instances) <= self.instances()
    }

    /// Capacity grown geometrically until `total_instances` fits, or `None`
    /// when it already does.
    pub fn grown_for(&self, total_instances: u32) -> Option<Self> {
        if self.fits(total_instances) {
            return None;
        }
        let mut grown = *self;
        while !grown.fits(total_instances) {
            grown.multiplier = grown.multiplier.saturating_mul(2);
        }
        Some(grown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_pass_counts() {
        assert_eq!(scan_iterations(0), 0);
        assert_eq!(scan_iterations(1), 0);
        assert_eq!(scan_iterations(2), 1);
        assert_eq!(scan_iterations(3), 2);
        assert_eq!(scan_iterations(4), 2);
        assert_eq!(scan_iterations(5), 3);
        assert_eq!(scan_iterations(1 << 20), 20);
        assert_eq!(scan_passes(1000), 11);
    }

    #[test]
    fn scan_result_alternates() {
        // one pass: ping -> pong
        assert_eq!(scan_result_index(1), 1);
        // two passes: ping -> pong -> ping
        assert_eq!(scan_result_index(2), 0);
        assert_eq!(scan_result_index(3), 1);
    }

    #[test]
    fn radix_geometry() {
        let dispatch = RadixDispatch::new(1_000_000, 32);
        // ceil(1e6 / 32) = 31250 invocations -> 123 workgroups
        assert_eq!(dispatch.workgroups, 123);
        assert_eq!(dispatch.histogram_len(), 123 * 256);
        assert!(dispatch.workgroups * dispatch.elements_per_workgroup() >= 1_000_000);
    }

    #[test]
    fn radix_geometry_never_zero() {
        assert_eq!(RadixDispatch::new(0, 32).workgroups, 1);
        assert_eq!(RadixDispatch::new(1, 256).workgroups, 1);
    }

    #[test]
    fn capacity_grows_geometrically() {
        let capacity = SortCapacity::new(100, 1);
        assert!(capacity.grown_for(100).is_none());
        let grown = capacity.grown_for(1_000).unwrap();
        assert_eq!(grown.multiplier, 16);
        assert!(grown.fits(1_000));
    }

    #[test]
    fn empty_scene_has_unit_capacity() {
        let capacity = SortCapacity::new(0, 1);
        assert_eq!(capacity.instances(), 1);
        assert!(capacity.fits(0));
    }
}
