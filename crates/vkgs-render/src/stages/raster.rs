//! Tile rasterizer.
//!
//! One 16x16 workgroup per tile composites the tile's sorted instances front
//! to back into the target image.

use std::sync::Arc;

use ash::vk;
use vkgs_core::TileGrid;
use vkgs_gpu::{
    BufferTable, ComputePipeline, DescriptorSetGroup, DescriptorSetGroupBuilder, GpuContext,
    GpuError, Result,
};

use crate::resources::FrameBuffers;
use crate::target::TargetImage;

/// Push constants for `render.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RasterPush {
    pub width: u32,
    pub height: u32,
}

/// Option `i` writes target image `i`.
pub struct RasterStage {
    pipeline: ComputePipeline,
    group: Arc<DescriptorSetGroup>,
}

fn build_group(
    gpu: &GpuContext,
    table: &mut BufferTable,
    buffers: &FrameBuffers,
    images: &[TargetImage],
) -> Result<Arc<DescriptorSetGroup>> {
    if images.is_empty() {
        return Err(GpuError::InvalidState(
            "Render target has no images".to_string(),
        ));
    }
    let views: Vec<vk::ImageView> = images.iter().map(|image| image.view).collect();
    DescriptorSetGroupBuilder::new()
        .buffer(0, buffers.attributes)
        .buffer(1, buffers.ranges)
        .buffer(2, buffers.values[0])
        .image_options(3, &views)
        .build(gpu, table)
}

impl RasterStage {
    pub fn new(
        gpu: &GpuContext,
        table: &mut BufferTable,
        buffers: &FrameBuffers,
        images: &[TargetImage],
    ) -> Result<Self> {
        let group = build_group(gpu, table, buffers, images)?;

        let pipeline = unsafe {
            ComputePipeline::new(
                gpu.device(),
                vkgs_shaders::render_shader(),
                group.layout(),
                std::mem::size_of::<RasterPush>() as u32,
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

    /// Point the image binding at a new set of target images.
    ///
    /// The layout is unchanged, so the pipeline is kept.
    ///
    /// # Safety
    /// The old descriptor sets must not be in use.
    pub unsafe fn rebuild(
        &mut self,
        gpu: &GpuContext,
        table: &mut BufferTable,
        buffers: &FrameBuffers,
        images: &[TargetImage],
    ) -> Result<()> {
        let group = build_group(gpu, table, buffers, images)?;
        let old = std::mem::replace(&mut self.group, group);
        old.destroy(gpu.device());
        tracing::debug!(images = images.len(), "Rebuilt raster descriptors");
        Ok(())
    }

    /// # Safety
    /// `cmd` must be recording, after the tile ranges were written, with
    /// `image_index`'s image in `GENERAL` layout.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        image_index: usize,
        extent: vk::Extent2D,
    ) {
        let grid = TileGrid::new(extent.width, extent.height);
        self.pipeline.bind(device, cmd, &self.group, image_index);
        self.pipeline.push_constants(
            device,
            cmd,
            &RasterPush {
                width: extent.width,
                height: extent.height,
            },
        );
        self.pipeline
            .dispatch(device, cmd, [grid.tiles_x, grid.tiles_y, 1]);
    }

    /// # Safety
    /// The stage must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.pipeline.destroy(device);
        self.group.destroy(device);
    }
}
