//! Inclusive Hillis-Steele scan over the tile overlap counts.
//!
//! The overlap counts are copied into the ping buffer, then `scan_passes(n)`
//! passes alternate between ping and pong. The last element of the result is
//! copied into a host-visible buffer so the renderer can read the instance
//! total before recording the rest of the frame.

use std::sync::Arc;

use ash::vk;
use vkgs_core::dispatch::{scan_passes, scan_result_index};
use vkgs_gpu::{
    barrier, BarrierBuilder, BufferTable, ComputePipeline, DescriptorSetGroup,
    DescriptorSetGroupBuilder, GpuContext, Result,
};

use crate::resources::{linear_groups, FrameBuffers};

const U32_SIZE: vk::DeviceSize = std::mem::size_of::<u32>() as vk::DeviceSize;

/// Push constants for `prefix_sum.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrefixSumPush {
    pub step: u32,
    pub count: u32,
}

/// Push constants for every pass over `count` elements, in order.
pub fn pass_constants(count: u32) -> impl Iterator<Item = PrefixSumPush> {
    let passes = if count == 0 { 0 } else { scan_passes(count) };
    (0..passes).map(move |pass| PrefixSumPush {
        step: 1u32.checked_shl(pass).unwrap_or(u32::MAX),
        count,
    })
}

/// Option 0 reads ping and writes pong; option 1 the reverse.
pub struct PrefixSumStage {
    pipeline: ComputePipeline,
    group: Arc<DescriptorSetGroup>,
}

impl PrefixSumStage {
    pub fn new(gpu: &GpuContext, table: &mut BufferTable, buffers: &FrameBuffers) -> Result<Self> {
        let [ping, pong] = buffers.scan;
        let group = DescriptorSetGroupBuilder::new()
            .buffer_options(0, &[ping, pong])
            .buffer_options(1, &[pong, ping])
            .build(gpu, table)?;

        let pipeline = unsafe {
            ComputePipeline::new(
                gpu.device(),
                vkgs_shaders::prefix_sum_shader(),
                group.layout(),
                std::mem::size_of::<PrefixSumPush>() as u32,
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

    /// Index into `FrameBuffers::scan` holding the result for `count` elements.
    pub fn result_option(count: u32) -> usize {
        scan_result_index(count)
    }

    /// Record the scan and the copy of its last element into `buffers.total`.
    ///
    /// # Safety
    /// `cmd` must be recording, after the preprocess stage.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        table: &BufferTable,
        buffers: &FrameBuffers,
        count: u32,
    ) {
        let total = table.buffer(buffers.total);

        if count == 0 {
            device.cmd_fill_buffer(cmd, total, 0, U32_SIZE, 0);
            barrier::transfer_to_host(device, cmd, total);
            return;
        }

        let scan = buffers.scan.map(|handle| table.buffer(handle));
        let bytes = vk::DeviceSize::from(count) * U32_SIZE;

        // 1. Seed ping with the overlap counts
        device.cmd_copy_buffer(
            cmd,
            table.buffer(buffers.overlaps),
            scan[0],
            &[vk::BufferCopy::default().size(bytes)],
        );
        barrier::transfer_to_compute(device, cmd, scan[0]);

        // 2. Scan passes
        for (pass, push) in pass_constants(count).enumerate() {
            let option = pass % 2;
            let (src, dst) = (scan[option], scan[1 - option]);

            self.pipeline.bind(device, cmd, &self.group, option);
            self.pipeline.push_constants(device, cmd, &push);
            self.pipeline.dispatch(device, cmd, linear_groups(count));

            BarrierBuilder::new()
                .buffer(
                    dst,
                    (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_WRITE),
                    (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_READ),
                )
                .buffer(
                    src,
                    (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_READ),
                    (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_WRITE),
                )
                .record(device, cmd);
        }

        // 3. Read back the total
        let result = scan[Self::result_option(count)];
        barrier::compute_to_transfer(device, cmd, result);
        device.cmd_copy_buffer(
            cmd,
            result,
            total,
            &[vk::BufferCopy::default()
                .src_offset(vk::DeviceSize::from(count - 1) * U32_SIZE)
                .dst_offset(0)
                .size(U32_SIZE)],
        );
        barrier::transfer_to_host(device, cmd, total);
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
    use vkgs_core::reference::{hillis_steele, inclusive_scan};

    #[test]
    fn steps_double_each_pass() {
        let steps: Vec<u32> = pass_constants(5).map(|push| push.step).collect();
        assert_eq!(steps, vec![1, 2, 4, 8]);
        assert!(pass_constants(5).all(|push| push.count == 5));
    }

    #[test]
    fn empty_input_has_no_passes() {
        assert_eq!(pass_constants(0).count(), 0);
        assert_eq!(pass_constants(1).count(), 1);
    }

    #[test]
    fn result_option_matches_last_written_buffer() {
        for count in [1u32, 2, 3, 7, 256, 1000] {
            let passes = pass_constants(count).count();
            // pass t writes buffer (t + 1) % 2
            assert_eq!(PrefixSumStage::result_option(count), passes % 2);
        }
    }

    #[test]
    fn pass_schedule_produces_inclusive_scan() {
        let input = [3u32, 0, 2, 5, 1, 1, 4];
        let mut buffers = [input.to_vec(), vec![0; input.len()]];
        for (pass, push) in pass_constants(input.len() as u32).enumerate() {
            let option = pass % 2;
            let src = buffers[option].clone();
            for (i, slot) in buffers[1 - option].iter_mut().enumerate() {
                let step = push.step as usize;
                *slot = if i >= step { src[i] + src[i - step] } else { src[i] };
            }
        }
        let result = &buffers[PrefixSumStage::result_option(input.len() as u32)];
        assert_eq!(result, &inclusive_scan(&input));
        assert_eq!(result.last(), Some(&16));

        let (reference, index) = hillis_steele(&input);
        assert_eq!(index, PrefixSumStage::result_option(input.len() as u32));
        assert_eq!(&reference[index], result);
    }
}
