//! Eight-pass LSD radix sort over the 64-bit instance keys.
//!
//! Each pass runs a histogram dispatch followed by a scatter dispatch. The
//! key/value buffers ping-pong between even and odd; after the eighth pass the
//! sorted instances are back in the even buffers.

use std::sync::Arc;

use ash::vk;
use vkgs_core::constants::{RADIX_BITS, RADIX_PASSES};
use vkgs_core::RadixDispatch;
use vkgs_gpu::{
    barrier, BarrierBuilder, BufferTable, ComputePipeline, DescriptorSetGroup,
    DescriptorSetGroupBuilder, GpuContext, Result,
};

use crate::resources::FrameBuffers;

const SHADER_WRITE: (vk::PipelineStageFlags2, vk::AccessFlags2) = (
    vk::PipelineStageFlags2::COMPUTE_SHADER,
    vk::AccessFlags2::SHADER_WRITE,
);
const SHADER_READ: (vk::PipelineStageFlags2, vk::AccessFlags2) = (
    vk::PipelineStageFlags2::COMPUTE_SHADER,
    vk::AccessFlags2::SHADER_READ,
);

/// Push constants shared by `hist.comp` and `sort.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RadixSortPush {
    pub num_elements: u32,
    pub shift: u32,
    pub num_workgroups: u32,
    pub blocks_per_workgroup: u32,
}

impl RadixSortPush {
    /// Constants for every pass, least significant digit first.
    pub fn passes(dispatch: RadixDispatch) -> impl Iterator<Item = Self> {
        (0..RADIX_PASSES).map(move |pass| Self {
            num_elements: dispatch.num_elements,
            shift: pass * RADIX_BITS,
            num_workgroups: dispatch.workgroups,
            blocks_per_workgroup: dispatch.blocks_per_workgroup,
        })
    }
}

/// Histogram and scatter pipelines.
///
/// Option 0 of both groups reads the even buffers (the scatter writes odd);
/// option 1 reads odd and writes even.
pub struct RadixSortStage {
    histogram: ComputePipeline,
    scatter: ComputePipeline,
    histogram_group: Arc<DescriptorSetGroup>,
    scatter_group: Arc<DescriptorSetGroup>,
    blocks_per_workgroup: u32,
}

impl RadixSortStage {
    pub fn new(
        gpu: &GpuContext,
        table: &mut BufferTable,
        buffers: &FrameBuffers,
        blocks_per_workgroup: u32,
    ) -> Result<Self> {
        let [keys_even, keys_odd] = buffers.keys;
        let [values_even, values_odd] = buffers.values;
        let device = gpu.device();

        let histogram_group = DescriptorSetGroupBuilder::new()
            .buffer_options(0, &[keys_even, keys_odd])
            .buffer(1, buffers.histogram)
            .build(gpu, table)?;

        let scatter_group = match DescriptorSetGroupBuilder::new()
            .buffer_options(0, &[keys_even, keys_odd])
            .buffer_options(1, &[keys_odd, keys_even])
            .buffer_options(2, &[values_even, values_odd])
            .buffer_options(3, &[values_odd, values_even])
            .buffer(4, buffers.histogram)
            .build(gpu, table)
        {
            Ok(group) => group,
            Err(e) => {
                unsafe { histogram_group.destroy(device) };
                return Err(e);
            }
        };

        let push_size = std::mem::size_of::<RadixSortPush>() as u32;
        let pipelines = unsafe {
            ComputePipeline::new(
                device,
                vkgs_shaders::radix_histogram_shader(),
                histogram_group.layout(),
                push_size,
            )
            .and_then(|histogram| {
                match ComputePipeline::new(
                    device,
                    vkgs_shaders::radix_scatter_shader(),
                    scatter_group.layout(),
                    push_size,
                ) {
                    Ok(scatter) => Ok((histogram, scatter)),
                    Err(e) => {
                        histogram.destroy(device);
                        Err(e)
                    }
                }
            })
        };
        let (histogram, scatter) = match pipelines {
            Ok(pipelines) => pipelines,
            Err(e) => {
                unsafe {
                    histogram_group.destroy(device);
                    scatter_group.destroy(device);
                }
                return Err(e);
            }
        };

        tracing::debug!(blocks_per_workgroup, "Created radix sort stage");

        Ok(Self {
            histogram,
            scatter,
            histogram_group,
            scatter_group,
            blocks_per_workgroup,
        })
    }

    pub fn blocks_per_workgroup(&self) -> u32 {
        self.blocks_per_workgroup
    }

    /// Dispatch geometry for sorting `num_elements` keys.
    pub fn dispatch_for(&self, num_elements: u32) -> RadixDispatch {
        RadixDispatch::new(num_elements, self.blocks_per_workgroup)
    }

    /// Record all eight passes over the first `num_elements` instances.
    ///
    /// # Safety
    /// `cmd` must be recording, after the instance keys were written.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        table: &BufferTable,
        buffers: &FrameBuffers,
        num_elements: u32,
    ) {
        if num_elements == 0 {
            return;
        }
        let dispatch = self.dispatch_for(num_elements);
        let keys = buffers.keys.map(|handle| table.buffer(handle));
        let values = buffers.values.map(|handle| table.buffer(handle));
        let histogram = table.buffer(buffers.histogram);
        let groups = [dispatch.workgroups, 1, 1];

        for (pass, push) in RadixSortPush::passes(dispatch).enumerate() {
            let option = pass % 2;

            self.histogram
                .bind(device, cmd, &self.histogram_group, option);
            self.histogram.push_constants(device, cmd, &push);
            self.histogram.dispatch(device, cmd, groups);
            barrier::compute_write_to_read(device, cmd, histogram);

            self.scatter.bind(device, cmd, &self.scatter_group, option);
            self.scatter.push_constants(device, cmd, &push);
            self.scatter.dispatch(device, cmd, groups);

            let written = (keys[1 - option], values[1 - option]);
            let read = (keys[option], values[option]);
            BarrierBuilder::new()
                .buffer(written.0, SHADER_WRITE, SHADER_READ)
                .buffer(written.1, SHADER_WRITE, SHADER_READ)
                .buffer(read.0, SHADER_READ, SHADER_WRITE)
                .buffer(read.1, SHADER_READ, SHADER_WRITE)
                .buffer(histogram, SHADER_READ, SHADER_WRITE)
                .record(device, cmd);
        }
    }

    /// # Safety
    /// The stage must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.histogram.destroy(device);
        self.scatter.destroy(device);
        self.histogram_group.destroy(device);
        self.scatter_group.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_walk_every_byte() {
        let dispatch = RadixDispatch::new(10_000, 32);
        let shifts: Vec<u32> = RadixSortPush::passes(dispatch).map(|p| p.shift).collect();
        assert_eq!(shifts, vec![0, 8, 16, 24, 32, 40, 48, 56]);
    }

    #[test]
    fn passes_carry_dispatch_geometry() {
        let dispatch = RadixDispatch::new(1_000_000, 32);
        for push in RadixSortPush::passes(dispatch) {
            assert_eq!(push.num_elements, 1_000_000);
            assert_eq!(push.num_workgroups, 123);
            assert_eq!(push.blocks_per_workgroup, 32);
        }
    }

    #[test]
    fn even_pass_count_ends_in_even_buffers() {
        // pass p writes buffer (p + 1) % 2
        let last_written = (RADIX_PASSES as usize - 1 + 1) % 2;
        assert_eq!(last_written, 0);
    }
}
