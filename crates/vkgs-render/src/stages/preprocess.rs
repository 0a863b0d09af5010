//! Projection of every splat to screen space.

use std::sync::Arc;

use ash::vk;
use vkgs_gpu::{
    BarrierBuilder, BufferTable, ComputePipeline, DescriptorSetGroup, DescriptorSetGroupBuilder,
    GpuContext, Result,
};

use crate::resources::{linear_groups, FrameBuffers};
use crate::scene::SceneSource;

const COMPUTE_WRITE: (vk::PipelineStageFlags2, vk::AccessFlags2) = (
    vk::PipelineStageFlags2::COMPUTE_SHADER,
    vk::AccessFlags2::SHADER_WRITE,
);

/// Push constants for `preprocess.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PreprocessPush {
    pub num_splats: u32,
}

/// Writes one vertex attribute and one tile overlap count per splat.
///
/// Bindings:
/// 0. splats (scene)
/// 1. 3D covariances (scene)
/// 2. frame uniforms
/// 3. vertex attributes
/// 4. tile overlap counts
pub struct PreprocessStage {
    pipeline: ComputePipeline,
    group: Arc<DescriptorSetGroup>,
}

impl PreprocessStage {
    pub fn new(
        gpu: &GpuContext,
        table: &mut BufferTable,
        buffers: &FrameBuffers,
        scene: &dyn SceneSource,
    ) -> Result<Self> {
        let group = DescriptorSetGroupBuilder::new()
            .external_buffer(0, scene.splat_buffer())
            .external_buffer(1, scene.covariance_buffer())
            .uniform(2, buffers.uniforms)
            .buffer(3, buffers.attributes)
            .buffer(4, buffers.overlaps)
            .build(gpu, table)?;

        let pipeline = unsafe {
            ComputePipeline::new(
                gpu.device(),
                vkgs_shaders::preprocess_shader(),
                group.layout(),
                std::mem::size_of::<PreprocessPush>() as u32,
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

    /// Record the preprocess dispatch followed by a barrier making the
    /// attributes and overlap counts visible to later stages.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        table: &BufferTable,
        buffers: &FrameBuffers,
        num_splats: u32,
    ) {
        self.pipeline.bind(device, cmd, &self.group, 0);
        self.pipeline
            .push_constants(device, cmd, &PreprocessPush { num_splats });
        self.pipeline.dispatch(device, cmd, linear_groups(num_splats));

        BarrierBuilder::new()
            .buffer(
                table.buffer(buffers.attributes),
                COMPUTE_WRITE,
                (
                    vk::PipelineStageFlags2::COMPUTE_SHADER,
                    vk::AccessFlags2::SHADER_READ,
                ),
            )
            .buffer(
                table.buffer(buffers.overlaps),
                COMPUTE_WRITE,
                (
                    vk::PipelineStageFlags2::TRANSFER,
                    vk::AccessFlags2::TRANSFER_READ,
                ),
            )
            .record(device, cmd);
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
    fn push_constants_are_one_word() {
        assert_eq!(std::mem::size_of::<PreprocessPush>(), 4);
    }
}
