//! Per-tile `[start, end)` ranges over the sorted instances.

use std::sync::Arc;

use ash::vk;
use vkgs_gpu::{
    barrier, BufferTable, ComputePipeline, DescriptorSetGroup, DescriptorSetGroupBuilder,
    GpuContext, Result,
};

use crate::resources::{linear_groups, FrameBuffers};

/// Push constants for `tile_boundary.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileBoundaryPush {
    pub num_instances: u32,
}

/// Reads the sorted keys from the even buffer. Tiles no instance touches keep
/// the zero range written by the fill that precedes the dispatch.
pub struct TileBoundaryStage {
    pipeline: ComputePipeline,
    group: Arc<DescriptorSetGroup>,
}

impl TileBoundaryStage {
    pub fn new(gpu: &GpuContext, table: &mut BufferTable, buffers: &FrameBuffers) -> Result<Self> {
        let group = DescriptorSetGroupBuilder::new()
            .buffer(0, buffers.keys[0])
            .buffer(1, buffers.ranges)
            .build(gpu, table)?;

        let pipeline = unsafe {
            ComputePipeline::new(
                gpu.device(),
                vkgs_shaders::tile_boundary_shader(),
                group.layout(),
                std::mem::size_of::<TileBoundaryPush>() as u32,
            )
        };
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { group.destroy(gpu.device()) };
                return Err(e);
            }
        };

        Ok(Self { pipeline, group })
    }

    /// Record the zero fill and the boundary dispatch.
    ///
    /// # Safety
    /// `cmd` must be recording, after the sort.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        table: &BufferTable,
        buffers: &FrameBuffers,
        num_instances: u32,
    ) {
        let ranges = table.buffer(buffers.ranges);

        device.cmd_fill_buffer(cmd, ranges, 0, vk::WHOLE_SIZE, 0);
        barrier::transfer_to_compute(device, cmd, ranges);

        self.pipeline.bind(device, cmd, &self.group, 0);
        self.pipeline
            .push_constants(device, cmd, &TileBoundaryPush { num_instances });
        self.pipeline
            .dispatch(device, cmd, linear_groups(num_instances));

        barrier::compute_write_to_read(device, cmd, ranges);
    }

    /// # Safety
    /// The stage must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.pipeline.destroy(device);
        self.group.destroy(device);
    }
}
