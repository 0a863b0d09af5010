//! Scene contract and its device-local implementation.

use ash::vk;
use vkgs_core::scene::{covariances, SceneBounds};
use vkgs_core::{Cov3d, Splat};
use vkgs_gpu::{CommandPool, GpuBuffer, GpuContext, MemoryLocation, Result};

/// Splat data the renderer reads every frame.
///
/// The splat buffer holds one [`Splat`] per element; the covariance buffer
/// holds one [`Cov3d`] per splat in the same order.
pub trait SceneSource {
    fn num_splats(&self) -> u32;

    fn splat_buffer(&self) -> vk::Buffer;

    fn covariance_buffer(&self) -> vk::Buffer;

    /// Free the buffers.
    ///
    /// # Safety
    /// No submitted work may still reference them.
    unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()>;
}

/// Splats and covariances uploaded to device-local buffers.
pub struct GpuScene {
    splats: GpuBuffer,
    covariances: GpuBuffer,
    num_splats: u32,
    bounds: Option<SceneBounds>,
}

impl GpuScene {
    /// Upload `splats` and their covariances, scaled by `scale_modifier`.
    ///
    /// Blocks until both copies complete.
    pub fn upload(gpu: &GpuContext, splats: &[Splat], scale_modifier: f32) -> Result<Self> {
        let covs = covariances(splats, scale_modifier);
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;

        let (mut splat_buffer, mut cov_buffer) = {
            let mut allocator = gpu.allocator().lock();
            let splat_buffer = allocator.create_buffer(
                std::mem::size_of_val(splats) as u64,
                usage,
                MemoryLocation::GpuOnly,
                "scene_splats",
            )?;
            let cov_buffer = match allocator.create_buffer(
                (covs.len() * std::mem::size_of::<Cov3d>()) as u64,
                usage,
                MemoryLocation::GpuOnly,
                "scene_covariances",
            ) {
                Ok(buffer) => buffer,
                Err(e) => {
                    let mut splat_buffer = splat_buffer;
                    allocator.free_buffer(&mut splat_buffer)?;
                    return Err(e);
                }
            };
            (splat_buffer, cov_buffer)
        };

        let uploaded = unsafe {
            CommandPool::new(gpu.device(), gpu.queue_family()).and_then(|pool| {
                let result = splat_buffer
                    .upload(gpu, &pool, splats)
                    .and_then(|()| cov_buffer.upload(gpu, &pool, &covs));
                pool.destroy(gpu.device());
                result
            })
        };
        if let Err(e) = uploaded {
            let mut allocator = gpu.allocator().lock();
            allocator.free_buffer(&mut splat_buffer)?;
            allocator.free_buffer(&mut cov_buffer)?;
            return Err(e);
        }

        tracing::info!(
            splats = splats.len(),
            bytes = splat_buffer.size + cov_buffer.size,
            "Uploaded scene"
        );

        Ok(Self {
            splats: splat_buffer,
            covariances: cov_buffer,
            num_splats: splats.len() as u32,
            bounds: SceneBounds::of(splats),
        })
    }

    /// Axis-aligned bounds of the splat centers, `None` for an empty scene.
    pub fn bounds(&self) -> Option<SceneBounds> {
        self.bounds
    }
}

impl SceneSource for GpuScene {
    fn num_splats(&self) -> u32 {
        self.num_splats
    }

    fn splat_buffer(&self) -> vk::Buffer {
        self.splats.buffer
    }

    fn covariance_buffer(&self) -> vk::Buffer {
        self.covariances.buffer
    }

    unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        allocator.free_buffer(&mut self.splats)?;
        allocator.free_buffer(&mut self.covariances)?;
        Ok(())
    }
}
