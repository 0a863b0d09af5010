//! Vulkan substrate for the vkgs splat renderer.
//!
//! This crate provides:
//! - Instance, device, and queue bootstrap with validation routed to `tracing`
//! - GPU capability detection
//! - Buffer and image allocation via gpu-allocator, with staging upload/download
//! - A buffer table that rebinds descriptor sets when buffers are reallocated
//! - Descriptor set groups with per-option bindings
//! - Compute pipelines, synchronization2 barriers, and timestamp queries
//! - Surface and swapchain handling

pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod query;
pub mod resources;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use barrier::BarrierBuilder;
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorSetGroup, DescriptorSetGroupBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::ComputePipeline;
pub use query::TimestampQueries;
pub use resources::{BindingRef, BufferHandle, BufferTable};
pub use surface::{surface_extensions, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::FrameSync;

pub use gpu_allocator::MemoryLocation;
