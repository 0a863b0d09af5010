//! Tile-based Gaussian splat rendering on Vulkan compute.
//!
//! This crate provides:
//! - The six compute stages: preprocess, prefix sum, instance expansion,
//!   radix sort, tile boundaries, and the tile rasterizer
//! - Shared frame buffers that can grow without rebuilding descriptor sets
//! - [`SplatRenderer`], the two-phase frame orchestrator
//! - The [`RenderTarget`] and [`SceneSource`] seams
//! - An owned [`MetricsSink`] for stage timings

pub mod config;
pub mod error;
pub mod metrics;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod stages;
pub mod target;

pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use metrics::{MetricStats, MetricsCollector, MetricsSink, NullMetrics};
pub use renderer::{AttemptOutcome, FrameInspection, FrameOutcome, FrameStats, SplatRenderer};
pub use scene::{GpuScene, SceneSource};
pub use target::{AcquireOutcome, PresentOutcome, RenderTarget, TargetImage};
