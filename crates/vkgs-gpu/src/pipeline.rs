//! Compute pipelines.

use crate::descriptors::DescriptorSetGroup;
use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::Pod;

/// Compute pipeline with one descriptor set and an optional push-constant block.
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    push_constant_size: u32,
}

impl ComputePipeline {
    /// Create a compute pipeline from SPIR-V.
    ///
    /// # Safety
    /// The device must be valid and the shader code must be valid SPIR-V whose
    /// interface matches `set_layout` and `push_constant_size`.
    pub unsafe fn new(
        device: &ash::Device,
        shader_code: &[u32],
        set_layout: vk::DescriptorSetLayout,
        push_constant_size: u32,
    ) -> Result<Self> {
        let shader_info = vk::ShaderModuleCreateInfo::default().code(shader_code);
        let shader_module = device
            .create_shader_module(&shader_info, None)
            .map_err(|e| GpuError::ShaderModule(e.to_string()))?;

        let range = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(push_constant_size)];
        let push_ranges: &[vk::PushConstantRange] = if push_constant_size > 0 { &range } else { &[] };
        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(push_ranges);

        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_shader_module(shader_module, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let pipelines =
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

        device.destroy_shader_module(shader_module, None);

        let pipelines = pipelines.map_err(|(_, e)| {
            device.destroy_pipeline_layout(layout, None);
            GpuError::PipelineCreation(e.to_string())
        })?;

        Ok(Self {
            pipeline: pipelines[0],
            layout,
            push_constant_size,
        })
    }

    /// Bind the pipeline and the group's set for `option`.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub unsafe fn bind(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        group: &DescriptorSetGroup,
        option: usize,
    ) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            self.layout,
            0,
            &[group.set(option)],
            &[],
        );
    }

    /// Push the whole constant block.
    ///
    /// # Safety
    /// `cmd` must be recording with this pipeline bound.
    pub unsafe fn push_constants<T: Pod>(&self, device: &ash::Device, cmd: vk::CommandBuffer, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        debug_assert_eq!(bytes.len() as u32, self.push_constant_size);
        device.cmd_push_constants(cmd, self.layout, vk::ShaderStageFlags::COMPUTE, 0, bytes);
    }

    /// Dispatch `groups` workgroups. Empty dispatches are skipped.
    ///
    /// # Safety
    /// `cmd` must be recording with this pipeline bound.
    pub unsafe fn dispatch(&self, device: &ash::Device, cmd: vk::CommandBuffer, groups: [u32; 3]) {
        if groups.contains(&0) {
            return;
        }
        device.cmd_dispatch(cmd, groups[0], groups[1], groups[2]);
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
