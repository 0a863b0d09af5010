//! Offscreen render target.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use image::RgbaImage;
use vkgs_core::InputState;
use vkgs_gpu::command::execute_single_time_commands;
use vkgs_gpu::swapchain::create_color_view;
use vkgs_gpu::{barrier, CommandPool, GpuContext, GpuError, GpuImage, MemoryLocation};
use vkgs_render::{AcquireOutcome, PresentOutcome, RenderTarget, TargetImage};

/// Format of the offscreen image. Byte order matches [`RgbaImage`].
pub const HEADLESS_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Single storage image that never leaves the device.
///
/// Acquire always hands out image 0 and present only counts frames, so no
/// semaphores are involved. [`HeadlessTarget::resize`] changes the size the
/// target reports; the image follows on the next recreate.
pub struct HeadlessTarget {
    gpu: Arc<GpuContext>,
    pool: CommandPool,
    size: vk::Extent2D,
    image: GpuImage,
    view: vk::ImageView,
    images: Vec<TargetImage>,
    input: InputState,
    presented: u64,
}

fn create_target_image(
    gpu: &GpuContext,
    size: vk::Extent2D,
) -> vkgs_gpu::Result<(GpuImage, vk::ImageView)> {
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(HEADLESS_FORMAT)
        .extent(vk::Extent3D {
            width: size.width,
            height: size.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let mut allocator = gpu.allocator().lock();
    let mut image = allocator.create_image(&info, MemoryLocation::GpuOnly, "headless_target")?;
    match unsafe { create_color_view(gpu.device(), image.image, HEADLESS_FORMAT) } {
        Ok(view) => Ok((image, view)),
        Err(e) => {
            allocator.free_image(&mut image)?;
            Err(e)
        }
    }
}

impl HeadlessTarget {
    pub fn new(gpu: Arc<GpuContext>, width: u32, height: u32) -> vkgs_gpu::Result<Self> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidState(format!(
                "Headless target size {width}x{height} has no area"
            )));
        }
        let size = vk::Extent2D { width, height };
        let pool = unsafe { CommandPool::new(gpu.device(), gpu.queue_family())? };
        let (image, view) = match create_target_image(&gpu, size) {
            Ok(created) => created,
            Err(e) => {
                unsafe { pool.destroy(gpu.device()) };
                return Err(e);
            }
        };

        Ok(Self {
            images: vec![TargetImage {
                image: image.image,
                view,
            }],
            gpu,
            pool,
            size,
            image,
            view,
            input: InputState::new(),
            presented: 0,
        })
    }

    /// Report a new size. The image is reallocated on the next recreate.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = vk::Extent2D { width, height };
    }

    /// Frames handed to [`RenderTarget::present`] so far.
    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Copy the last presented frame back to the host.
    pub fn read_pixels(&self) -> crate::Result<RgbaImage> {
        if self.presented == 0 {
            return Err(GpuError::InvalidState("Nothing has been presented yet".to_string()).into());
        }

        let gpu = &self.gpu;
        let device = gpu.device();
        let vk::Extent3D { width, height, .. } = self.image.extent;
        let len = u64::from(width) * u64::from(height) * 4;

        let mut staging = gpu.allocator().lock().create_buffer(
            len,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "headless_readback",
        )?;
        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(self.image.extent);

        let pixels = unsafe {
            execute_single_time_commands(device, &self.pool, gpu.queue(), |cmd| {
                device.cmd_copy_image_to_buffer(
                    cmd,
                    self.image.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    staging.buffer,
                    &[region],
                );
                barrier::transfer_to_host(device, cmd, staging.buffer);
            })
        }
        .and_then(|()| staging.read::<u8>(len as usize));
        gpu.allocator().lock().free_buffer(&mut staging)?;

        RgbaImage::from_raw(width, height, pixels?).ok_or_else(|| {
            GpuError::InvalidState("Readback size does not match the image".to_string()).into()
        })
    }

    /// # Safety
    /// The image must not be in use.
    unsafe fn free_image(&mut self) -> vkgs_gpu::Result<()> {
        let device = self.gpu.device();
        device.destroy_image_view(self.view, None);
        self.view = vk::ImageView::null();
        self.gpu.allocator().lock().free_image(&mut self.image)
    }

    /// Free the image and the command pool.
    ///
    /// # Safety
    /// The image must not be in use.
    pub unsafe fn destroy(mut self) -> vkgs_gpu::Result<()> {
        self.free_image()?;
        self.pool.destroy(self.gpu.device());
        Ok(())
    }
}

impl RenderTarget for HeadlessTarget {
    type Host = ();

    fn required_extensions(_host: &()) -> vkgs_gpu::Result<Vec<&'static CStr>> {
        Ok(Vec::new())
    }

    fn extent(&self) -> vk::Extent2D {
        self.size
    }

    fn images(&self) -> &[TargetImage] {
        &self.images
    }

    fn uses_semaphores(&self) -> bool {
        false
    }

    fn present_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    }

    unsafe fn acquire_next_image(&mut self, _signal: vk::Semaphore) -> vkgs_gpu::Result<AcquireOutcome> {
        let vk::Extent3D { width, height, .. } = self.image.extent;
        if self.size.width != width || self.size.height != height {
            return Ok(AcquireOutcome::OutOfDate);
        }
        Ok(AcquireOutcome::Acquired {
            index: 0,
            suboptimal: false,
        })
    }

    unsafe fn present(&mut self, _index: u32, _wait: vk::Semaphore) -> vkgs_gpu::Result<PresentOutcome> {
        self.presented += 1;
        Ok(PresentOutcome::Presented)
    }

    unsafe fn recreate(&mut self) -> vkgs_gpu::Result<()> {
        if self.size.width == 0 || self.size.height == 0 {
            return Ok(());
        }
        self.free_image()?;
        let (image, view) = create_target_image(&self.gpu, self.size)?;
        self.images = vec![TargetImage {
            image: image.image,
            view,
        }];
        self.image = image;
        self.view = view;
        self.presented = 0;
        tracing::debug!(
            width = self.size.width,
            height = self.size.height,
            "Recreated headless target"
        );
        Ok(())
    }

    fn input(&self) -> &InputState {
        &self.input
    }
}
