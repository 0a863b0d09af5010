//! Expansion of visible splats into per-tile sort instances.

use std::sync::Arc;

use ash::vk;
use vkgs_core::SortCapacity;
use vkgs_gpu::{
    BarrierBuilder, BufferTable, ComputePipeline, DescriptorSetGroup, DescriptorSetGroupBuilder,
    GpuContext, Result,
};

use crate::resources::{linear_groups, FrameBuffers};
use crate::stages::PrefixSumStage;

/// Push constants for `preprocess_sort.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PreprocessSortPush {
    pub num_splats: u32,
    pub tiles_x: u32,
    /// Writes at or past this index are dropped.
    pub capacity: u32,
}

impl PreprocessSortPush {
    pub fn new(num_splats: u32, tiles_x: u32, capacity: SortCapacity) -> Self {
        Self {
            num_splats,
            tiles_x,
            capacity: u32::try_from(capacity.instances()).unwrap_or(u32::MAX),
        }
    }
}

/// Writes keys and values into the even sort buffers. Option `i` reads the
/// scan from `FrameBuffers::scan[i]`.
pub struct PreprocessSortStage {
    pipeline: ComputePipeline,
    group: Arc<DescriptorSetGroup>,
}

impl PreprocessSortStage {
    pub fn new(gpu: &GpuContext, table: &mut BufferTable, buffers: &FrameBuffers) -> Result<Self> {
        let group = DescriptorSetGroupBuilder::new()
            .buffer(0, buffers.attributes)
            .buffer_options(1, &buffers.scan)
            .buffer(2, buffers.keys[0])
            .buffer(3, buffers.values[0])
            .build(gpu, table)?;

        let pipeline = unsafe {
            ComputePipeline::new(
                gpu.device(),
                vkgs_shaders::preprocess_sort_shader(),
                group.layout(),
                std::mem::size_of::<PreprocessSortPush>() as u32,
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

    /// # Safety
    /// `cmd` must be recording, and the scan must have completed.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        table: &BufferTable,
        buffers: &FrameBuffers,
        push: PreprocessSortPush,
    ) {
        let option = PrefixSumStage::result_option(push.num_splats);
        self.pipeline.bind(device, cmd, &self.group, option);
        self.pipeline.push_constants(device, cmd, &push);
        self.pipeline
            .dispatch(device, cmd, linear_groups(push.num_splats));

        let mut barriers = BarrierBuilder::new();
        for handle in [buffers.keys[0], buffers.values[0]] {
            barriers = barriers.buffer(
                table.buffer(handle),
                (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_WRITE),
                (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_READ),
            );
        }
        barriers.record(device, cmd);
    }

    /// # Safety
    /// The stage must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.pipeline.destroy(device);
        self.group.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_saturates_at_u32() {
        let push = PreprocessSortPush::new(10, 50, SortCapacity::new(10, 4));
        assert_eq!(push.capacity, 40);

        let huge = PreprocessSortPush::new(u32::MAX, 1, SortCapacity::new(u32::MAX, 8));
        assert_eq!(huge.capacity, u32::MAX);
    }

    #[test]
    fn push_layout_is_three_words() {
        assert_eq!(std::mem::size_of::<PreprocessSortPush>(), 12);
        assert_eq!(std::mem::offset_of!(PreprocessSortPush, capacity), 8);
    }
}
