//! Window surface creation and swapchain setup.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{
    calculate_extent, select_present_mode, select_surface_format, Swapchain, SwapchainConfig,
};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;

/// Instance extensions a window surface needs on this display.
pub fn surface_extensions<W: HasDisplayHandle>(window: &W) -> Result<Vec<&'static CStr>> {
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let names = ash_window::enumerate_required_extensions(display.as_raw())
        .map_err(|e| GpuError::ExtensionNotSupported(e.to_string()))?;
    // SAFETY: ash-window returns pointers to 'static extension name constants.
    Ok(names
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
        .collect())
}

/// Vulkan surface plus the loaders needed to drive a swapchain on it.
pub struct SurfaceContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Create a surface for `window`.
    ///
    /// # Safety
    /// The GPU context must be valid and outlive the surface, and the window
    /// must outlive the surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = ash_window::create_surface(
            gpu.entry(),
            gpu.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());
        let supported = surface_loader.get_physical_device_surface_support(
            gpu.physical_device(),
            gpu.queue_family(),
            surface,
        )?;
        if !supported {
            surface_loader.destroy_surface(surface, None);
            return Err(GpuError::SurfaceCreation(
                "Queue family cannot present to this surface".to_string(),
            ));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader,
        })
    }

    /// Create a swapchain, retiring `old` if given. The caller destroys `old`.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        immediate: bool,
        old: Option<&Swapchain>,
    ) -> Result<Swapchain> {
        let pd = gpu.physical_device();
        let capabilities = self
            .surface_loader
            .get_physical_device_surface_capabilities(pd, self.surface)?;
        let formats = self
            .surface_loader
            .get_physical_device_surface_formats(pd, self.surface)?;
        let present_modes = self
            .surface_loader
            .get_physical_device_surface_present_modes(pd, self.surface)?;

        let surface_format = select_surface_format(&formats, |format| {
            gpu.instance()
                .get_physical_device_format_properties(pd, format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::STORAGE_IMAGE)
        })
        .ok_or_else(|| {
            GpuError::SwapchainCreation("No surface format supports storage images".to_string())
        })?;

        if !capabilities
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::STORAGE)
        {
            return Err(GpuError::SwapchainCreation(
                "Surface does not support storage usage".to_string(),
            ));
        }

        let config = SwapchainConfig {
            surface_format,
            present_mode: select_present_mode(&present_modes, immediate),
            extent: calculate_extent(&capabilities, width, height),
        };

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            self.surface,
            &capabilities,
            &config,
            old.map_or(vk::SwapchainKHR::null(), |s| s.swapchain),
        )
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use and its swapchains must be destroyed.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}
