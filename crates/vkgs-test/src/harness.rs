//! GPU test harness.
//!
//! Renders scenes through [`HeadlessTarget`] and pairs the result with the
//! CPU reference pipeline, so tests can compare buffers and images.

use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec3;
use image::{ImageBuffer, Rgba, RgbaImage};
use vkgs_core::reference::{ReferenceFrame, ReferencePipeline};
use vkgs_core::scene::covariances;
use vkgs_core::{Camera, FrameUniforms, Splat};
use vkgs_gpu::{GpuContext, GpuContextBuilder};
use vkgs_render::{
    FrameInspection, FrameOutcome, GpuScene, MetricsCollector, RendererConfig, SplatRenderer,
};

use crate::target::HeadlessTarget;
use crate::{Result, TestError};

/// Directory PNGs are written to when set.
pub const ENV_TEST_OUTPUT: &str = "VKGS_TEST_OUTPUT";

/// Shared GPU context for a test.
pub struct GpuHarness {
    gpu: Arc<GpuContext>,
}

/// Everything captured from one headless frame.
pub struct HeadlessFrame {
    pub outcome: FrameOutcome,
    pub inspection: FrameInspection,
    pub image: RgbaImage,
    pub metrics: MetricsCollector,
    pub blocks_per_workgroup: u32,
}

impl GpuHarness {
    /// Create a headless GPU context. Validation follows `VKGS_VALIDATION`.
    pub fn new() -> Result<Self> {
        let config = RendererConfig::new().with_env_overrides();
        let gpu = GpuContextBuilder::new()
            .app_name("vkgs-test")
            .validation(config.validation)
            .physical_device_index(config.physical_device_index)
            .build()?;
        tracing::info!("GPU: {}", gpu.capabilities().summary());
        Ok(Self { gpu: Arc::new(gpu) })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// Upload `splats` and build a renderer drawing into a headless target of
    /// `config.width` x `config.height`.
    pub fn renderer(
        &self,
        splats: &[Splat],
        config: &RendererConfig,
    ) -> Result<SplatRenderer<HeadlessTarget>> {
        let target = HeadlessTarget::new(Arc::clone(&self.gpu), config.width, config.height)?;
        let scene = GpuScene::upload(&self.gpu, splats, 1.0)?;
        Ok(SplatRenderer::new(
            Arc::clone(&self.gpu),
            target,
            Box::new(scene),
            config,
        )?)
    }

    /// Render one frame and capture its buffers and image.
    pub fn capture(
        renderer: &mut SplatRenderer<HeadlessTarget>,
        camera: &Camera,
    ) -> Result<HeadlessFrame> {
        let mut metrics = MetricsCollector::default();
        let outcome = renderer.draw_frame(camera, &mut metrics)?;
        let inspection = renderer.inspect()?;
        let image = renderer.target().read_pixels()?;
        Ok(HeadlessFrame {
            outcome,
            inspection,
            image,
            metrics,
            blocks_per_workgroup: renderer.blocks_per_workgroup(),
        })
    }

    /// Build a renderer, capture one frame, and tear everything down.
    pub fn render_once(
        &self,
        splats: &[Splat],
        camera: &Camera,
        config: &RendererConfig,
    ) -> Result<HeadlessFrame> {
        let mut renderer = self.renderer(splats, config)?;
        let frame = Self::capture(&mut renderer, camera);
        finish(renderer)?;
        frame
    }
}

/// Destroy a renderer and its headless target.
pub fn finish(renderer: SplatRenderer<HeadlessTarget>) -> Result<()> {
    let target = renderer.destroy()?;
    unsafe { target.destroy()? };
    Ok(())
}

/// Camera at `(0, 0, 6)` looking at the origin.
pub fn test_camera() -> Camera {
    Camera::looking_at(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO)
}

/// Run the CPU reference pipeline for the same frame the renderer draws.
pub fn reference_frame(
    splats: &[Splat],
    camera: &Camera,
    config: &RendererConfig,
    blocks_per_workgroup: u32,
) -> ReferenceFrame {
    let uniforms = FrameUniforms::from_camera(camera, config.width, config.height);
    let covs = covariances(splats, 1.0);
    ReferencePipeline::new(blocks_per_workgroup).run(splats, &covs, &uniforms)
}

/// Quantize a reference frame's pixels the way a UNORM target stores them.
pub fn reference_image(frame: &ReferenceFrame, width: u32, height: u32) -> RgbaImage {
    let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let bytes = frame
        .image
        .iter()
        .flat_map(|&pixel| pixel.map(quantize))
        .collect();
    ImageBuffer::from_raw(width, height, bytes).unwrap_or_else(|| ImageBuffer::new(width, height))
}

/// Write `image` as `<name>.png` under `VKGS_TEST_OUTPUT`, if set.
pub fn save_output(name: &str, image: &RgbaImage) -> Result<Option<PathBuf>> {
    let Some(dir) = std::env::var_os(ENV_TEST_OUTPUT) else {
        return Ok(None);
    };
    let dir = PathBuf::from(dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{name}.png"));
    image.save(&path)?;
    tracing::info!("Wrote {}", path.display());
    Ok(Some(path))
}

/// Mean absolute RGB difference of two images, normalized to 0.0-1.0.
pub fn compare_images(
    a: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    b: &ImageBuffer<Rgba<u8>, Vec<u8>>,
) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(TestError::ImageComparison(format!(
            "Image dimensions don't match: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }

    let total_diff: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            (0..3)
                .map(|c| u64::from(pa[c].abs_diff(pb[c])))
                .sum::<u64>()
        })
        .sum();

    let max_diff = (u64::from(a.width()) * u64::from(a.height()) * 3 * 255).max(1) as f64;
    Ok(total_diff as f64 / max_diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identical_images_do_not_differ() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        assert_relative_eq!(compare_images(&image, &image).unwrap(), 0.0);
    }

    #[test]
    fn difference_is_normalized() {
        let black = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let white = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        assert_relative_eq!(compare_images(&black, &white).unwrap(), 1.0);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let a = RgbaImage::new(2, 2);
        let b = RgbaImage::new(3, 2);
        assert!(matches!(
            compare_images(&a, &b),
            Err(TestError::ImageComparison(_))
        ));
    }

    #[test]
    fn reference_pixels_are_quantized() {
        let frame = ReferenceFrame {
            image: vec![[1.0, 0.5, -0.2, 1.0], [2.0, 0.0, 0.25, 1.0]],
            ..ReferenceFrame::default()
        };
        let image = reference_image(&frame, 2, 1);
        assert_eq!(image.get_pixel(0, 0).0, [255, 128, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 64, 255]);
    }
}
