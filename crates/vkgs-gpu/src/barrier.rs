//! Pipeline barriers (synchronization2).
//!
//! The stage chain only ever needs a handful of hazards, so each gets a named
//! helper. [`BarrierBuilder`] batches several into one `vkCmdPipelineBarrier2`.

use ash::vk;

const COMPUTE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::COMPUTE_SHADER;
const TRANSFER: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::ALL_TRANSFER;

/// Batches buffer and image barriers into one command.
#[derive(Default)]
pub struct BarrierBuilder<'a> {
    buffers: Vec<vk::BufferMemoryBarrier2<'a>>,
    images: Vec<vk::ImageMemoryBarrier2<'a>>,
}

impl<'a> BarrierBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-buffer barrier.
    pub fn buffer(
        mut self,
        buffer: vk::Buffer,
        src: (vk::PipelineStageFlags2, vk::AccessFlags2),
        dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
    ) -> Self {
        self.buffers.push(
            vk::BufferMemoryBarrier2::default()
                .buffer(buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .src_stage_mask(src.0)
                .src_access_mask(src.1)
                .dst_stage_mask(dst.0)
                .dst_access_mask(dst.1)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED),
        );
        self
    }

    /// Color image layout transition.
    pub fn image(
        mut self,
        image: vk::Image,
        layouts: (vk::ImageLayout, vk::ImageLayout),
        src: (vk::PipelineStageFlags2, vk::AccessFlags2),
        dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
    ) -> Self {
        self.images.push(
            vk::ImageMemoryBarrier2::default()
                .image(image)
                .old_layout(layouts.0)
                .new_layout(layouts.1)
                .src_stage_mask(src.0)
                .src_access_mask(src.1)
                .dst_stage_mask(dst.0)
                .dst_access_mask(dst.1)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(color_range()),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    /// Record the batched barriers.
    ///
    /// # Safety
    /// `cmd` must be recording and every handle must be valid.
    pub unsafe fn record(self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        let dependency = vk::DependencyInfo::default()
            .buffer_memory_barriers(&self.buffers)
            .image_memory_barriers(&self.images);
        device.cmd_pipeline_barrier2(cmd, &dependency);
    }
}

/// Full single-mip, single-layer color subresource.
pub fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Compute writes become visible to later compute reads.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn compute_write_to_read(device: &ash::Device, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
    BarrierBuilder::new()
        .buffer(
            buffer,
            (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
            (COMPUTE, vk::AccessFlags2::SHADER_READ),
        )
        .record(device, cmd);
}

/// Earlier compute reads finish before later compute writes (WAR).
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn compute_read_to_write(device: &ash::Device, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
    BarrierBuilder::new()
        .buffer(
            buffer,
            (COMPUTE, vk::AccessFlags2::SHADER_READ),
            (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
        )
        .record(device, cmd);
}

/// Transfer writes (copies, fills) become visible to compute.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn transfer_to_compute(device: &ash::Device, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
    BarrierBuilder::new()
        .buffer(
            buffer,
            (TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
            (
                COMPUTE,
                vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE,
            ),
        )
        .record(device, cmd);
}

/// Compute writes become visible to a following copy.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn compute_to_transfer(device: &ash::Device, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
    BarrierBuilder::new()
        .buffer(
            buffer,
            (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
            (TRANSFER, vk::AccessFlags2::TRANSFER_READ),
        )
        .record(device, cmd);
}

/// Earlier compute reads finish before a following copy or fill overwrites the buffer.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn compute_read_to_transfer_write(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
) {
    BarrierBuilder::new()
        .buffer(
            buffer,
            (
                COMPUTE,
                vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE,
            ),
            (TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
        )
        .record(device, cmd);
}

/// Copy results become visible to host reads after the fence signals.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn transfer_to_host(device: &ash::Device, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
    BarrierBuilder::new()
        .buffer(
            buffer,
            (TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
            (vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ),
        )
        .record(device, cmd);
}

/// Move a presentable (or fresh) image into `GENERAL` for compute storage writes.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn image_to_storage(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
) {
    BarrierBuilder::new()
        .image(
            image,
            (old_layout, vk::ImageLayout::GENERAL),
            (COMPUTE, vk::AccessFlags2::NONE),
            (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
        )
        .record(device, cmd);
}

/// Move a compute-written image into `new_layout` for presentation or copying.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn storage_to_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    new_layout: vk::ImageLayout,
) {
    let dst = if new_layout == vk::ImageLayout::TRANSFER_SRC_OPTIMAL {
        (TRANSFER, vk::AccessFlags2::TRANSFER_READ)
    } else {
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE)
    };
    BarrierBuilder::new()
        .image(
            image,
            (vk::ImageLayout::GENERAL, new_layout),
            (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
            dst,
        )
        .record(device, cmd);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_batches_barriers() {
        let builder = BarrierBuilder::new()
            .buffer(
                vk::Buffer::null(),
                (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
                (COMPUTE, vk::AccessFlags2::SHADER_READ),
            )
            .image(
                vk::Image::null(),
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL),
                (COMPUTE, vk::AccessFlags2::NONE),
                (COMPUTE, vk::AccessFlags2::SHADER_WRITE),
            );
        assert!(!builder.is_empty());
        assert_eq!(builder.buffers.len(), 1);
        assert_eq!(builder.images[0].new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(builder.buffers[0].size, vk::WHOLE_SIZE);
    }

    #[test]
    fn empty_builder_records_nothing() {
        assert!(BarrierBuilder::new().is_empty());
    }
}
