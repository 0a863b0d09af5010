//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }

    /// Radix sort blocks per workgroup suited to this vendor.
    ///
    /// Apple GPUs (through MoltenVK) dispatch far fewer workgroups comfortably,
    /// so each one takes a larger share of the keys.
    pub const fn default_blocks_per_workgroup(self) -> u32 {
        match self {
            Self::Apple => 256,
            _ => 32,
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,
    pub driver_version: u32,

    pub supports_synchronization2: bool,
    /// 64-bit integers in shaders, needed for sort keys.
    pub supports_shader_int64: bool,
    /// Storage image stores without a declared format, needed to write swapchain images.
    pub supports_storage_write_without_format: bool,

    /// Nanoseconds per timestamp tick.
    pub timestamp_period: f32,
    /// Valid timestamp bits on the chosen queue family (0 = unsupported).
    pub timestamp_valid_bits: u32,

    /// Device-local memory in MB.
    pub device_local_memory_mb: u64,
    pub max_compute_workgroup_invocations: u32,
    pub max_compute_shared_memory_size: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device and the queue family we will use.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
        instance.get_physical_device_features2(physical_device, &mut features2);
        let supports_synchronization2 = features13.synchronization2 == vk::TRUE;

        let timestamp_valid_bits = instance
            .get_physical_device_queue_family_properties(physical_device)
            .get(queue_family as usize)
            .map_or(0, |family| family.timestamp_valid_bits);

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            supports_synchronization2,
            supports_shader_int64: features.shader_int64 == vk::TRUE,
            supports_storage_write_without_format: features
                .shader_storage_image_write_without_format
                == vk::TRUE,
            timestamp_period: properties.limits.timestamp_period,
            timestamp_valid_bits,
            device_local_memory_mb,
            max_compute_workgroup_invocations: properties.limits.max_compute_work_group_invocations,
            max_compute_shared_memory_size: properties.limits.max_compute_shared_memory_size,
        }
    }

    /// Name of the first missing feature the renderer cannot run without.
    pub fn missing_requirement(&self) -> Option<&'static str> {
        let major = vk::api_version_major(self.api_version);
        let minor = vk::api_version_minor(self.api_version);
        if major < 1 || (major == 1 && minor < 3) {
            return Some("Vulkan 1.3");
        }
        if !self.supports_synchronization2 {
            return Some("synchronization2");
        }
        if !self.supports_shader_int64 {
            return Some("shaderInt64");
        }
        if !self.supports_storage_write_without_format {
            return Some("shaderStorageImageWriteWithoutFormat");
        }
        // The radix sort keeps 256 counters plus 256x8 ballot words in shared memory.
        if self.max_compute_shared_memory_size < 16 * 1024 || self.max_compute_workgroup_invocations < 256 {
            return Some("256-wide compute workgroups with 16 KiB shared memory");
        }
        None
    }

    pub fn meets_requirements(&self) -> bool {
        self.missing_requirement().is_none()
    }

    pub fn supports_timestamps(&self) -> bool {
        self.timestamp_valid_bits > 0 && self.timestamp_period > 0.0
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "test".to_string(),
            api_version: vk::API_VERSION_1_3,
            driver_version: 0,
            supports_synchronization2: true,
            supports_shader_int64: true,
            supports_storage_write_without_format: true,
            timestamp_period: 1.0,
            timestamp_valid_bits: 64,
            device_local_memory_mb: 8192,
            max_compute_workgroup_invocations: 1024,
            max_compute_shared_memory_size: 32768,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x106B), GpuVendor::Apple);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn apple_gets_larger_sort_blocks() {
        assert_eq!(GpuVendor::Apple.default_blocks_per_workgroup(), 256);
        assert_eq!(GpuVendor::Nvidia.default_blocks_per_workgroup(), 32);
    }

    #[test]
    fn requirements() {
        assert!(capable().meets_requirements());

        let old = GpuCapabilities {
            api_version: vk::API_VERSION_1_2,
            ..capable()
        };
        assert_eq!(old.missing_requirement(), Some("Vulkan 1.3"));

        let no_int64 = GpuCapabilities {
            supports_shader_int64: false,
            ..capable()
        };
        assert_eq!(no_int64.missing_requirement(), Some("shaderInt64"));
    }

    #[test]
    fn timestamps_need_valid_bits() {
        let caps = GpuCapabilities {
            timestamp_valid_bits: 0,
            ..capable()
        };
        assert!(!caps.supports_timestamps());
        assert!(capable().supports_timestamps());
    }
}
