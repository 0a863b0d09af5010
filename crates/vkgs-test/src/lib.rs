//! Test harness for the vkgs splat renderer.
//!
//! Provides an offscreen render target, frame capture against the CPU
//! reference pipeline, and PNG output for inspection.

pub mod harness;
pub mod target;

pub use harness::{
    compare_images, finish, reference_frame, reference_image, save_output, test_camera,
    GpuHarness, HeadlessFrame, ENV_TEST_OUTPUT,
};
pub use target::{HeadlessTarget, HEADLESS_FORMAT};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] vkgs_gpu::GpuError),
    #[error("Render error: {0}")]
    Render(#[from] vkgs_render::RenderError),
    #[error("Image comparison failed: {0}")]
    ImageComparison(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TestError>;
