//! GPU memory management.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    /// Allocate a buffer. Zero-sized requests are rounded up to 4 bytes.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let size = size.max(4);
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocationFailed(format!("{name}: {e}")));
            }
        };

        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        tracing::trace!(name, size, ?location, "Allocated buffer");

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            location,
        })
    }

    /// Free a buffer allocation.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        buffer.buffer = vk::Buffer::null();

        Ok(())
    }

    /// Allocate an image.
    pub fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self
            .inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    /// Free an image allocation.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        if let Some(allocation) = image.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        unsafe {
            self.device.destroy_image(image.image, None);
        }
        image.image = vk::Image::null();

        Ok(())
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    pub fn shutdown(&mut self) {
        drop(self.allocator.take());
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

impl GpuBuffer {
    /// Host pointer for mapped allocations.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    fn mapped_range(&self, offset: u64, len: u64) -> Result<*mut u8> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer is not host-visible".to_string()))?;
        let end = offset
            .checked_add(len)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Range {offset}..{end} exceeds buffer size {}",
                self.size
            )));
        }
        Ok(unsafe { ptr.add(offset as usize) })
    }

    /// Write data to the start of a host-visible buffer.
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes at `offset` into a host-visible buffer.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.mapped_range(offset, data.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Read `count` elements from the start of a host-visible buffer.
    pub fn read<T: Pod>(&self, count: usize) -> Result<Vec<T>> {
        let len = std::mem::size_of::<T>() * count;
        let src = self.mapped_range(0, len as u64)?;
        let mut out = vec![T::zeroed(); count];
        unsafe {
            std::ptr::copy_nonoverlapping(
                src,
                bytemuck::cast_slice_mut::<T, u8>(&mut out).as_mut_ptr(),
                len,
            );
        }
        Ok(out)
    }

    /// Read the element at `index` from a host-visible buffer.
    pub fn read_one<T: Pod>(&self, index: usize) -> Result<T> {
        let stride = std::mem::size_of::<T>();
        let src = self.mapped_range((index * stride) as u64, stride as u64)?;
        let bytes = unsafe { std::slice::from_raw_parts(src, stride) };
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Copy `data` into a device-local buffer through a temporary staging buffer.
    ///
    /// Blocks until the copy completes. The buffer needs `TRANSFER_DST` usage.
    ///
    /// # Safety
    /// The buffer must not be in use by the GPU.
    pub unsafe fn upload<T: Pod>(
        &self,
        gpu: &GpuContext,
        pool: &CommandPool,
        data: &[T],
    ) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() as u64 > self.size {
            return Err(GpuError::InvalidState(format!(
                "Upload of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }

        let mut staging = gpu.allocator().lock().create_buffer(
            bytes.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "upload_staging",
        )?;
        let result = staging.write_bytes(0, bytes).and_then(|()| {
            let region = vk::BufferCopy::default().size(bytes.len() as u64);
            execute_single_time_commands(gpu.device(), pool, gpu.queue(), |cmd| unsafe {
                gpu.device()
                    .cmd_copy_buffer(cmd, staging.buffer, self.buffer, &[region]);
            })
        });
        gpu.allocator().lock().free_buffer(&mut staging)?;
        result
    }

    /// Copy the first `count` elements of a device-local buffer back to the host.
    ///
    /// Blocks until the copy completes. The buffer needs `TRANSFER_SRC` usage.
    ///
    /// # Safety
    /// All writes to the buffer must have completed.
    pub unsafe fn download<T: Pod>(
        &self,
        gpu: &GpuContext,
        pool: &CommandPool,
        count: usize,
    ) -> Result<Vec<T>> {
        let len = (std::mem::size_of::<T>() * count) as u64;
        if len == 0 {
            return Ok(Vec::new());
        }
        if len > self.size {
            return Err(GpuError::InvalidState(format!(
                "Download of {len} bytes exceeds buffer size {}",
                self.size
            )));
        }

        let mut staging = gpu.allocator().lock().create_buffer(
            len,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "download_staging",
        )?;
        let region = vk::BufferCopy::default().size(len);
        let result = execute_single_time_commands(gpu.device(), pool, gpu.queue(), |cmd| unsafe {
            gpu.device()
                .cmd_copy_buffer(cmd, self.buffer, staging.buffer, &[region]);
        })
        .and_then(|()| staging.read::<T>(count));
        gpu.allocator().lock().free_buffer(&mut staging)?;
        result
    }
}

/// A GPU image with its allocation.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}
