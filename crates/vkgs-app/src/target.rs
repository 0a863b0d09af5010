//! Swapchain-backed render target.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};
use vkgs_core::InputState;
use vkgs_gpu::{surface_extensions, GpuContext, Result, SurfaceContext, Swapchain};
use vkgs_render::{AcquireOutcome, PresentOutcome, RenderTarget, TargetImage};
use winit::window::{CursorGrabMode, Window};

/// Window render target.
///
/// The raster stage writes straight into the swapchain images, which are
/// created with storage usage.
pub struct WindowTarget {
    window: Arc<Window>,
    gpu: Arc<GpuContext>,
    surface: SurfaceContext,
    swapchain: Swapchain,
    images: Vec<TargetImage>,
    immediate: bool,
    input: InputState,
}

fn target_images(swapchain: &Swapchain) -> Vec<TargetImage> {
    swapchain
        .images
        .iter()
        .zip(&swapchain.image_views)
        .map(|(&image, &view)| TargetImage { image, view })
        .collect()
}

impl WindowTarget {
    /// Create a surface and swapchain for `window`.
    ///
    /// # Safety
    /// `gpu` must have been created with the extensions from
    /// [`RenderTarget::required_extensions`] and presentation enabled.
    pub unsafe fn new(gpu: Arc<GpuContext>, window: Arc<Window>, immediate: bool) -> Result<Self> {
        let surface = SurfaceContext::from_window(&gpu, window.as_ref())?;
        let size = window.inner_size();
        let swapchain = match surface.create_swapchain(
            &gpu,
            size.width.max(1),
            size.height.max(1),
            immediate,
            None,
        ) {
            Ok(swapchain) => swapchain,
            Err(e) => {
                surface.destroy();
                return Err(e);
            }
        };

        tracing::info!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            images = swapchain.images.len(),
            present_mode = ?swapchain.present_mode,
            "Swapchain created"
        );

        Ok(Self {
            images: target_images(&swapchain),
            window,
            gpu,
            surface,
            swapchain,
            immediate,
            input: InputState::new(),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.format
    }

    /// Grab and hide the cursor for mouse-look, or release it.
    pub fn set_cursor_captured(&mut self, captured: bool) {
        if captured == self.input.is_captured() {
            return;
        }
        let grab = if captured {
            self.window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            self.window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = grab {
            warn!("Cursor grab failed: {e}");
        }
        self.window.set_cursor_visible(!captured);
        self.input.set_captured(captured);
    }

    /// Destroy the swapchain and surface.
    ///
    /// # Safety
    /// No image of this target may be in use.
    pub unsafe fn destroy(self) {
        self.swapchain
            .destroy(self.gpu.device(), &self.surface.swapchain_loader);
        self.surface.destroy();
    }
}

impl RenderTarget for WindowTarget {
    type Host = Window;

    fn required_extensions(host: &Window) -> Result<Vec<&'static CStr>> {
        surface_extensions(host)
    }

    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            // Minimized.
            return vk::Extent2D::default();
        }
        self.swapchain.extent
    }

    fn images(&self) -> &[TargetImage] {
        &self.images
    }

    fn uses_semaphores(&self) -> bool {
        true
    }

    fn present_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::PRESENT_SRC_KHR
    }

    unsafe fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        Ok(
            match self
                .swapchain
                .acquire_next_image(&self.surface.swapchain_loader, signal)?
            {
                Some((index, suboptimal)) => AcquireOutcome::Acquired { index, suboptimal },
                None => AcquireOutcome::OutOfDate,
            },
        )
    }

    unsafe fn present(&mut self, index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let recreate = self.swapchain.present(
            &self.surface.swapchain_loader,
            self.gpu.queue(),
            index,
            &[wait],
        )?;
        Ok(if recreate {
            PresentOutcome::Suboptimal
        } else {
            PresentOutcome::Presented
        })
    }

    unsafe fn recreate(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        let swapchain = self.surface.create_swapchain(
            &self.gpu,
            size.width,
            size.height,
            self.immediate,
            Some(&self.swapchain),
        )?;
        let old = std::mem::replace(&mut self.swapchain, swapchain);
        old.destroy(self.gpu.device(), &self.surface.swapchain_loader);
        self.images = target_images(&self.swapchain);

        debug!(
            width = self.swapchain.extent.width,
            height = self.swapchain.extent.height,
            "Recreated swapchain"
        );
        Ok(())
    }

    fn input(&self) -> &InputState {
        &self.input
    }
}
