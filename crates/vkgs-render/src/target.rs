//! Render target capability.
//!
//! The renderer draws into whatever implements [`RenderTarget`]: a window
//! swapchain, an offscreen image set, or anything else that can hand out
//! storage-capable images and accept them back for presentation.

use std::ffi::CStr;

use ash::vk;
use vkgs_core::InputState;
use vkgs_gpu::Result;

/// One image the raster stage can write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// Result of acquiring the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image `index` is ready for this frame. `suboptimal` asks for a
    /// recreate after presenting.
    Acquired { index: u32, suboptimal: bool },
    /// The target no longer matches its surface and must be recreated.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the target should be recreated before the next frame.
    Suboptimal,
    /// Not presented. The target must be recreated.
    OutOfDate,
}

impl PresentOutcome {
    pub const fn needs_recreate(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Something the renderer can draw frames into.
pub trait RenderTarget {
    /// Whatever the target is created from (a window, or `()` offscreen).
    type Host: ?Sized;

    /// Instance extensions needed before the GPU context is created.
    fn required_extensions(host: &Self::Host) -> Result<Vec<&'static CStr>>
    where
        Self: Sized;

    /// Current image size in pixels.
    fn extent(&self) -> vk::Extent2D;

    /// Storage-capable images, indexed by the value `acquire_next_image` returns.
    fn images(&self) -> &[TargetImage];

    /// Whether acquire and present synchronize through semaphores. Targets
    /// that return `false` ignore the semaphores they are given.
    fn uses_semaphores(&self) -> bool;

    /// Layout the image must be in when handed to [`RenderTarget::present`].
    fn present_layout(&self) -> vk::ImageLayout;

    /// Acquire the next image, signaling `signal` when it is ready.
    ///
    /// # Safety
    /// `signal` must be unsignaled and not waited on by pending work.
    unsafe fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<AcquireOutcome>;

    /// Present image `index` once `wait` is signaled.
    ///
    /// # Safety
    /// `index` must come from the last successful acquire.
    unsafe fn present(&mut self, index: u32, wait: vk::Semaphore) -> Result<PresentOutcome>;

    /// Recreate the images at the current surface size.
    ///
    /// # Safety
    /// No image of this target may be in use.
    unsafe fn recreate(&mut self) -> Result<()>;

    /// Latest input state.
    fn input(&self) -> &InputState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_clean_presents_skip_recreate() {
        assert!(!PresentOutcome::Presented.needs_recreate());
        assert!(PresentOutcome::Suboptimal.needs_recreate());
        assert!(PresentOutcome::OutOfDate.needs_recreate());
    }
}
