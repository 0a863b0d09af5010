//! Renderer configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;
use vkgs_core::camera::Camera;
use vkgs_core::{Error, Result};
use vkgs_gpu::GpuVendor;

/// Environment variable overriding [`RendererConfig::blocks_per_workgroup`].
pub const ENV_BLOCKS_PER_WORKGROUP: &str = "VKGS_BLOCKS_PER_WORKGROUP";
/// Environment variable overriding [`RendererConfig::validation`].
pub const ENV_VALIDATION: &str = "VKGS_VALIDATION";

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Physical device to use instead of the highest scoring one.
    pub physical_device_index: Option<usize>,
    /// Present without vsync.
    pub immediate_present: bool,
    /// Horizontal field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Initial sort buffer capacity as a multiple of the splat count.
    pub sort_multiplier: u32,
    /// Radix sort blocks per workgroup. `None` picks a vendor default.
    pub blocks_per_workgroup: Option<u32>,
    /// Record GPU timestamps around every stage.
    pub timestamps: bool,
    /// Initial target width.
    pub width: u32,
    /// Initial target height.
    pub height: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            physical_device_index: None,
            immediate_present: false,
            fov_degrees: 45.0,
            near: 0.2,
            far: 1000.0,
            sort_multiplier: 1,
            blocks_per_workgroup: None,
            timestamps: true,
            width: 800,
            height: 600,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Pin the physical device by enumeration index.
    pub fn with_physical_device(mut self, index: usize) -> Self {
        self.physical_device_index = Some(index);
        self
    }

    /// Enable or disable immediate (non-vsync) presentation.
    pub fn with_immediate_present(mut self, immediate: bool) -> Self {
        self.immediate_present = immediate;
        self
    }

    /// Set the horizontal field of view in degrees.
    pub fn with_fov(mut self, degrees: f32) -> Self {
        self.fov_degrees = degrees;
        self
    }

    /// Set the near and far planes.
    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Set the initial sort buffer multiplier.
    pub fn with_sort_multiplier(mut self, multiplier: u32) -> Self {
        self.sort_multiplier = multiplier;
        self
    }

    /// Force the radix sort blocks per workgroup.
    pub fn with_blocks_per_workgroup(mut self, blocks: u32) -> Self {
        self.blocks_per_workgroup = Some(blocks);
        self
    }

    /// Enable or disable stage timestamps.
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Set the initial target size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Apply `VKGS_BLOCKS_PER_WORKGROUP` and `VKGS_VALIDATION` from the
    /// process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Unparseable values
    /// are logged and ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_BLOCKS_PER_WORKGROUP) {
            match raw.trim().parse::<u32>() {
                Ok(blocks) if blocks > 0 => self.blocks_per_workgroup = Some(blocks),
                _ => warn!(value = %raw, "Ignoring invalid {ENV_BLOCKS_PER_WORKGROUP}"),
            }
        }
        if let Some(raw) = lookup(ENV_VALIDATION) {
            match parse_flag(&raw) {
                Some(flag) => self.validation = flag,
                None => warn!(value = %raw, "Ignoring invalid {ENV_VALIDATION}"),
            }
        }
        self
    }

    /// Blocks per workgroup for a device from `vendor`.
    pub fn blocks_per_workgroup_for(&self, vendor: GpuVendor) -> u32 {
        self.blocks_per_workgroup
            .unwrap_or_else(|| vendor.default_blocks_per_workgroup())
    }

    /// Camera at the origin using this configuration's projection settings.
    pub fn camera(&self) -> Camera {
        Camera {
            fov_degrees: self.fov_degrees,
            near: self.near,
            far: self.far,
            ..Camera::default()
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(Error::InvalidConfig(format!(
                "field of view {} is outside (0, 180)",
                self.fov_degrees
            )));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(Error::InvalidConfig(format!(
                "clip planes near={} far={} are invalid",
                self.near, self.far
            )));
        }
        if self.sort_multiplier == 0 {
            return Err(Error::InvalidConfig("sort multiplier must be at least 1".to_string()));
        }
        if self.blocks_per_workgroup == Some(0) {
            return Err(Error::InvalidConfig(
                "blocks per workgroup must be at least 1".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "target size {}x{} is empty",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RendererConfig::default();
        assert_eq!(config.fov_degrees, 45.0);
        assert_eq!(config.near, 0.2);
        assert_eq!(config.far, 1000.0);
        assert_eq!(config.sort_multiplier, 1);
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.timestamps);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blocks_default_follows_vendor() {
        let config = RendererConfig::default();
        assert_eq!(config.blocks_per_workgroup_for(GpuVendor::Apple), 256);
        assert_eq!(config.blocks_per_workgroup_for(GpuVendor::Nvidia), 32);
        let forced = config.with_blocks_per_workgroup(64);
        assert_eq!(forced.blocks_per_workgroup_for(GpuVendor::Apple), 64);
    }

    #[test]
    fn env_overrides_apply() {
        let config = RendererConfig::default()
            .with_validation(false)
            .with_overrides_from(lookup(&[
                (ENV_BLOCKS_PER_WORKGROUP, "128"),
                (ENV_VALIDATION, "on"),
            ]));
        assert_eq!(config.blocks_per_workgroup, Some(128));
        assert!(config.validation);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let config = RendererConfig::default()
            .with_validation(true)
            .with_overrides_from(lookup(&[
                (ENV_BLOCKS_PER_WORKGROUP, "0"),
                (ENV_VALIDATION, "maybe"),
            ]));
        assert_eq!(config.blocks_per_workgroup, None);
        assert!(config.validation);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(RendererConfig::default().with_fov(0.0).validate().is_err());
        assert!(RendererConfig::default().with_clip_planes(1.0, 0.5).validate().is_err());
        assert!(RendererConfig::default().with_sort_multiplier(0).validate().is_err());
        assert!(RendererConfig::default().with_size(0, 10).validate().is_err());
        assert!(RendererConfig::default()
            .with_blocks_per_workgroup(0)
            .validate()
            .is_err());
    }

    #[test]
    fn camera_uses_projection_settings() {
        let camera = RendererConfig::default().with_fov(60.0).camera();
        assert_eq!(camera.fov_degrees, 60.0);
        assert_eq!(camera.near, 0.2);
    }
}
