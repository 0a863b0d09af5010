//! Renderer error taxonomy.
//!
//! Only unrecoverable conditions are errors. An out-of-date target and an
//! exhausted sort buffer are handled inside the frame loop and surface as
//! [`AcquireOutcome`](crate::target::AcquireOutcome),
//! [`PresentOutcome`](crate::target::PresentOutcome) and
//! [`AttemptOutcome`](crate::renderer::AttemptOutcome) values instead.

use thiserror::Error;
use vkgs_gpu::GpuError;

/// Renderer error type.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device, pipeline, or resource setup failed. Not retried.
    #[error("Renderer initialization failed: {0}")]
    Init(#[source] GpuError),

    /// Fence wait, queue submit, or another per-frame GPU call failed.
    #[error("GPU failure during frame: {0}")]
    Gpu(#[from] GpuError),

    /// The render target failed for a reason other than being out of date.
    #[error("Render target failure: {0}")]
    Target(#[source] GpuError),

    /// Renderer configuration was rejected.
    #[error(transparent)]
    Config(#[from] vkgs_core::Error),
}

impl RenderError {
    /// Whether the device was lost. The render loop cannot continue.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            Self::Init(GpuError::DeviceLost)
                | Self::Gpu(GpuError::DeviceLost)
                | Self::Target(GpuError::DeviceLost)
        )
    }
}

/// Result type alias using [`RenderError`].
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn gpu_errors_convert_to_frame_failures() {
        fn submit() -> Result<()> {
            Err(GpuError::from(vk::Result::ERROR_DEVICE_LOST))?;
            Ok(())
        }
        let err = submit().unwrap_err();
        assert!(matches!(err, RenderError::Gpu(GpuError::DeviceLost)));
        assert!(err.is_device_lost());
    }

    #[test]
    fn init_errors_keep_their_source() {
        let err = RenderError::Init(GpuError::NoSuitableDevice);
        assert!(!err.is_device_lost());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Renderer initialization failed"));
    }
}
