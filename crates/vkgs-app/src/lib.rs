//! Windowed viewer for the vkgs splat renderer.
//!
//! This crate provides the glue between winit and [`vkgs_render`]:
//! - [`WindowTarget`], a swapchain-backed render target
//! - Translation of winit input events into [`vkgs_core::InputState`]
//! - A fly camera controller
//! - The event loop runner
//!
//! # Example
//!
//! ```no_run
//! use vkgs_app::{run_viewer, AppConfig, ViewerScene};
//!
//! fn main() -> anyhow::Result<()> {
//!     let scene = ViewerScene::new(vkgs_core::scene::test_scene());
//!     run_viewer(AppConfig::new("Splats").with_size(1280, 720), scene)
//! }
//! ```

pub mod controller;
pub mod input;
pub mod runner;
pub mod target;

pub use controller::FlyCamera;
pub use runner::{run_viewer, AppConfig, ViewerScene};
pub use target::WindowTarget;
