//! Core data model and math for the vkgs Gaussian splat renderer.
//!
//! This crate holds everything that does not touch the GPU:
//! - Splat, covariance, and per-frame vertex attribute layouts shared with the shaders
//! - Camera and per-frame uniform construction
//! - Tile grid math and the 64-bit instance sort key
//! - Dispatch sizing and sort-buffer capacity growth
//! - Input state consumed from render targets
//! - A CPU reference implementation of every pipeline stage, used as a test oracle

pub mod camera;
pub mod covariance;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod reference;
pub mod scene;
pub mod sh;
pub mod sort_key;
pub mod tiles;
pub mod types;

pub use camera::{Camera, FrameUniforms};
pub use dispatch::{RadixDispatch, SortCapacity};
pub use error::{Error, Result};
pub use input::{InputState, Key, MouseButton};
pub use tiles::{TileGrid, TileRange, TileRect};
pub use types::{Cov3d, Splat, VertexAttribute};

/// Pipeline-wide constants shared with the compute shaders.
pub mod constants {
    /// Tile edge length in pixels.
    pub const TILE_SIZE: u32 = 16;
    /// Invocations per workgroup for the 1D stages.
    pub const WORKGROUP_SIZE: u32 = 256;
    /// Bits consumed per radix pass.
    pub const RADIX_BITS: u32 = 8;
    /// Buckets per radix pass.
    pub const RADIX_BUCKETS: u32 = 1 << RADIX_BITS;
    /// Radix passes over a 64-bit key.
    pub const RADIX_PASSES: u32 = 64 / RADIX_BITS;
    /// Spherical harmonic coefficients per color channel (degree 3).
    pub const SH_COEFFS: usize = 16;
    /// Spherical harmonic floats per splat.
    pub const SH_FLOATS: usize = SH_COEFFS * 3;
    /// View-space depth at or below which splats are culled.
    pub const NEAR_CULL: f32 = 0.2;
    /// Low-pass dilation added to the 2D covariance diagonal.
    pub const COVARIANCE_DILATION: f32 = 0.3;
    /// Contributions below this alpha are skipped.
    pub const MIN_ALPHA: f32 = 1.0 / 255.0;
    /// Per-splat alpha ceiling.
    pub const MAX_ALPHA: f32 = 0.99;
    /// Compositing stops once transmittance would drop below this value.
    pub const MIN_TRANSMITTANCE: f32 = 0.0001;
}
