//! Buffers shared between the pipeline stages.
//!
//! Every buffer lives in a [`BufferTable`] so that growing the sort buffers or
//! resizing the tile range buffer rewrites each descriptor that points at it.

use ash::vk;
use vkgs_core::constants::{RADIX_BUCKETS, WORKGROUP_SIZE};
use vkgs_core::dispatch::{group_count, SortCapacity};
use vkgs_core::{FrameUniforms, TileGrid, TileRange, VertexAttribute};
use vkgs_gpu::{BufferHandle, BufferTable, GpuContext, MemoryLocation, Result};

const STORAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::STORAGE_BUFFER;
const SRC: vk::BufferUsageFlags = vk::BufferUsageFlags::TRANSFER_SRC;
const DST: vk::BufferUsageFlags = vk::BufferUsageFlags::TRANSFER_DST;

/// Handles to the per-frame buffers.
///
/// Pairs are indexed `[even, odd]` for the sort buffers and `[ping, pong]`
/// for the scan buffers.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffers {
    pub uniforms: BufferHandle,
    pub attributes: BufferHandle,
    pub overlaps: BufferHandle,
    pub scan: [BufferHandle; 2],
    /// Host-visible copy of the scan total.
    pub total: BufferHandle,
    pub keys: [BufferHandle; 2],
    pub values: [BufferHandle; 2],
    pub histogram: BufferHandle,
    pub ranges: BufferHandle,
}

/// Byte sizes of the capacity-dependent buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBufferSizes {
    pub keys: u64,
    pub values: u64,
    pub histogram: u64,
}

impl SortBufferSizes {
    pub fn new(capacity: SortCapacity, blocks_per_workgroup: u32) -> Self {
        let instances = capacity.instances();
        Self {
            keys: instances * std::mem::size_of::<u64>() as u64,
            values: instances * std::mem::size_of::<u32>() as u64,
            histogram: histogram_entries(instances, blocks_per_workgroup)
                * std::mem::size_of::<u32>() as u64,
        }
    }
}

/// Histogram entries needed to sort `instances` keys.
fn histogram_entries(instances: u64, blocks_per_workgroup: u32) -> u64 {
    let blocks = u64::from(blocks_per_workgroup.max(1));
    let invocations = instances.div_ceil(blocks);
    let workgroups = invocations.div_ceil(u64::from(WORKGROUP_SIZE)).max(1);
    workgroups * u64::from(RADIX_BUCKETS)
}

/// Byte size of the tile range buffer for `grid`.
pub fn ranges_size(grid: &TileGrid) -> u64 {
    u64::from(grid.tile_count().max(1)) * std::mem::size_of::<TileRange>() as u64
}

impl FrameBuffers {
    /// Allocate every buffer for `num_splats` splats.
    pub fn new(
        gpu: &GpuContext,
        table: &mut BufferTable,
        num_splats: u32,
        capacity: SortCapacity,
        blocks_per_workgroup: u32,
        grid: &TileGrid,
    ) -> Result<Self> {
        let splats = u64::from(num_splats.max(1));
        let u32_size = std::mem::size_of::<u32>() as u64;
        let sort = SortBufferSizes::new(capacity, blocks_per_workgroup);

        let mut device = |name: &str, size: u64, usage: vk::BufferUsageFlags| {
            table.create(gpu, name, size, usage, MemoryLocation::GpuOnly)
        };

        let attributes = device(
            "vertex_attributes",
            splats * std::mem::size_of::<VertexAttribute>() as u64,
            STORAGE | SRC,
        )?;
        let overlaps = device("tile_overlaps", splats * u32_size, STORAGE | SRC)?;
        let scan = [
            device("prefix_sum_ping", splats * u32_size, STORAGE | SRC | DST)?,
            device("prefix_sum_pong", splats * u32_size, STORAGE | SRC | DST)?,
        ];
        let keys = [
            device("keys_even", sort.keys, STORAGE | SRC | DST)?,
            device("keys_odd", sort.keys, STORAGE | DST)?,
        ];
        let values = [
            device("values_even", sort.values, STORAGE | SRC | DST)?,
            device("values_odd", sort.values, STORAGE | DST)?,
        ];
        let histogram = device("radix_histogram", sort.histogram, STORAGE)?;
        let ranges = device("tile_ranges", ranges_size(grid), STORAGE | SRC | DST)?;

        let uniforms = table.create(
            gpu,
            "frame_uniforms",
            std::mem::size_of::<FrameUniforms>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;
        let total = table.create(gpu, "total_instances", u32_size, DST, MemoryLocation::GpuToCpu)?;

        tracing::debug!(
            num_splats,
            capacity = capacity.instances(),
            tiles = grid.tile_count(),
            "Allocated frame buffers"
        );

        Ok(Self {
            uniforms,
            attributes,
            overlaps,
            scan,
            total,
            keys,
            values,
            histogram,
            ranges,
        })
    }

    /// Reallocate the key, value, and histogram buffers for `capacity`.
    /// Contents are discarded.
    ///
    /// # Safety
    /// None of the buffers may be in use.
    pub unsafe fn grow_sort_buffers(
        &self,
        gpu: &GpuContext,
        table: &mut BufferTable,
        capacity: SortCapacity,
        blocks_per_workgroup: u32,
    ) -> Result<()> {
        let sort = SortBufferSizes::new(capacity, blocks_per_workgroup);
        for handle in self.keys {
            table.reallocate(gpu, handle, sort.keys)?;
        }
        for handle in self.values {
            table.reallocate(gpu, handle, sort.values)?;
        }
        table.reallocate(gpu, self.histogram, sort.histogram)?;
        Ok(())
    }

    /// Reallocate the tile range buffer for `grid`.
    ///
    /// # Safety
    /// The buffer may not be in use.
    pub unsafe fn resize_ranges(
        &self,
        gpu: &GpuContext,
        table: &mut BufferTable,
        grid: &TileGrid,
    ) -> Result<()> {
        table.reallocate(gpu, self.ranges, ranges_size(grid))
    }
}

/// Workgroups for a 1D dispatch over `count` elements.
pub(crate) fn linear_groups(count: u32) -> [u32; 3] {
    [group_count(count, WORKGROUP_SIZE), 1, 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkgs_core::RadixDispatch;

    #[test]
    fn histogram_covers_radix_dispatch() {
        for (count, blocks) in [(1_000_000, 32), (5, 256), (65_536, 1), (0, 32)] {
            let capacity = SortCapacity::new(count, 1);
            let sizes = SortBufferSizes::new(capacity, blocks);
            let dispatch = RadixDispatch::new(capacity.instances() as u32, blocks);
            assert!(sizes.histogram >= u64::from(dispatch.histogram_len()) * 4);
        }
    }

    #[test]
    fn sort_sizes_scale_with_multiplier() {
        let small = SortBufferSizes::new(SortCapacity::new(1_000, 1), 32);
        let large = SortBufferSizes::new(SortCapacity::new(1_000, 4), 32);
        assert_eq!(small.keys, 8_000);
        assert_eq!(small.values, 4_000);
        assert_eq!(large.keys, 4 * small.keys);
    }

    #[test]
    fn range_buffer_holds_every_tile() {
        let grid = TileGrid::new(800, 600);
        assert_eq!(ranges_size(&grid), 50 * 38 * 8);
        assert_eq!(ranges_size(&TileGrid::new(0, 0)), 8);
    }

    #[test]
    fn linear_dispatch_rounds_up() {
        assert_eq!(linear_groups(0), [0, 1, 1]);
        assert_eq!(linear_groups(256), [1, 1, 1]);
        assert_eq!(linear_groups(257), [2, 1, 1]);
    }
}
