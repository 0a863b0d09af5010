//! Interactive Gaussian splat viewer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkgs-viewer -- [OPTIONS]
//! ```
//!
//! Without options the small built-in test scene is shown. `--splats N`
//! switches to N random splats.
//!
//! ## Controls
//!
//! - W/A/S/D: move
//! - Space/Shift: up/down
//! - Right mouse button: look around
//! - Escape: release the cursor
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)
//! - `VKGS_VALIDATION`: Enable or disable Vulkan validation layers
//! - `VKGS_BLOCKS_PER_WORKGROUP`: Override the radix sort blocks per workgroup

mod args;

use vkgs_app::{run_viewer, AppConfig, ViewerScene};
use vkgs_core::scene::{random_scene, test_scene};

use crate::args::{Args, SceneChoice};

fn main() -> anyhow::Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = Args::parse(raw.iter().map(String::as_str))?;
    if args.help {
        print_help();
        return Ok(());
    }

    let splats = match args.scene {
        SceneChoice::Test => test_scene(),
        SceneChoice::Random {
            count,
            seed,
            extent,
        } => random_scene(count, seed, extent),
    };

    let mut config = AppConfig::new("vkgs viewer")
        .with_size(args.width, args.height)
        .with_vsync(args.vsync);
    if let Some(validation) = args.validation {
        config = config.with_validation(validation);
    }
    if let Some(speed) = args.speed {
        config = config.with_camera_speed(speed);
    }

    run_viewer(
        config,
        ViewerScene::new(splats).with_scale_modifier(args.scale_modifier),
    )
}

fn print_help() {
    eprintln!(
        "vkgs Gaussian splat viewer

USAGE:
    cargo run -p vkgs-viewer -- [OPTIONS]

SCENE OPTIONS:
    -n, --splats <N>        Show N random splats instead of the test scene
    --seed <N>              Random scene seed (default: 42)
    --extent <F>            Random scene half-size (default: 3.0)
    --scale <F>             Splat scale modifier (default: 1.0)

WINDOW OPTIONS:
    --width <N>             Window width (default: 1280)
    --height <N>            Window height (default: 720)
    --no-vsync              Present immediately
    --validation            Enable Vulkan validation layers
    --no-validation         Disable Vulkan validation layers
    --speed <F>             Camera speed in units per second

OTHER:
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)
    VKGS_VALIDATION         Override validation layers (1/0)"
    );
}
