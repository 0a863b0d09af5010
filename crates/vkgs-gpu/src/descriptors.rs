//! Descriptor set groups.
//!
//! A group owns one layout, one pool, and one descriptor set per *option*.
//! Options let a stage alternate between bindings without rewriting
//! descriptors: the prefix sum binds `(ping, pong)` in option 0 and
//! `(pong, ping)` in option 1, and the raster stage binds one swapchain image
//! per option.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::resources::{BindingRef, BufferHandle, BufferTable};
use ash::vk;
use std::sync::Arc;

enum Resource {
    Table(BufferHandle),
    Raw(vk::Buffer),
    Image(vk::ImageView),
}

struct BindingEntry {
    binding: u32,
    ty: vk::DescriptorType,
    options: Vec<Resource>,
}

/// Builder for a [`DescriptorSetGroup`].
#[derive(Default)]
pub struct DescriptorSetGroupBuilder {
    entries: Vec<BindingEntry>,
}

impl DescriptorSetGroupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, binding: u32, ty: vk::DescriptorType, options: Vec<Resource>) -> Self {
        self.entries.push(BindingEntry {
            binding,
            ty,
            options,
        });
        self
    }

    /// Storage buffer bound identically in every option.
    pub fn buffer(self, binding: u32, handle: BufferHandle) -> Self {
        self.push(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            vec![Resource::Table(handle)],
        )
    }

    /// Storage buffer that differs per option.
    pub fn buffer_options(self, binding: u32, handles: &[BufferHandle]) -> Self {
        let options = handles.iter().copied().map(Resource::Table).collect();
        self.push(binding, vk::DescriptorType::STORAGE_BUFFER, options)
    }

    /// Uniform buffer bound identically in every option.
    pub fn uniform(self, binding: u32, handle: BufferHandle) -> Self {
        self.push(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            vec![Resource::Table(handle)],
        )
    }

    /// Storage buffer owned outside any table. It is never rebound.
    pub fn external_buffer(self, binding: u32, buffer: vk::Buffer) -> Self {
        self.push(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            vec![Resource::Raw(buffer)],
        )
    }

    /// Storage image bound identically in every option.
    pub fn image(self, binding: u32, view: vk::ImageView) -> Self {
        self.push(
            binding,
            vk::DescriptorType::STORAGE_IMAGE,
            vec![Resource::Image(view)],
        )
    }

    /// Storage image that differs per option.
    pub fn image_options(self, binding: u32, views: &[vk::ImageView]) -> Self {
        let options = views.iter().copied().map(Resource::Image).collect();
        self.push(binding, vk::DescriptorType::STORAGE_IMAGE, options)
    }

    /// Create the layout, pool, and sets, write every descriptor, and register
    /// table buffers for rebinding.
    pub fn build(self, gpu: &GpuContext, table: &mut BufferTable) -> Result<Arc<DescriptorSetGroup>> {
        let option_count = option_count(self.entries.iter().map(|e| e.options.len()))?;
        let device = gpu.device();

        let layout_bindings: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(entry.ty)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
            })
            .collect();

        let mut pool_sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for entry in &self.entries {
            match pool_sizes.iter_mut().find(|size| size.ty == entry.ty) {
                Some(size) => size.descriptor_count += option_count as u32,
                None => pool_sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(entry.ty)
                        .descriptor_count(option_count as u32),
                ),
            }
        }

        let layout = unsafe {
            device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings),
                None,
            )?
        };

        let pool = match unsafe {
            device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(option_count as u32)
                    .pool_sizes(&pool_sizes),
                None,
            )
        } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(e.into());
            }
        };

        let layouts = vec![layout; option_count];
        let sets = match unsafe {
            device.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(pool)
                    .set_layouts(&layouts),
            )
        } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(e.into());
            }
        };

        let group = Arc::new(DescriptorSetGroup { layout, pool, sets });

        for entry in &self.entries {
            for option in 0..option_count {
                let resource = &entry.options[option.min(entry.options.len() - 1)];
                let set = group.set(option);
                unsafe {
                    match *resource {
                        Resource::Table(handle) => {
                            write_buffer_descriptor(device, set, entry.binding, entry.ty, table.buffer(handle));
                            table.register_binding(
                                handle,
                                BindingRef::new(&group, option, entry.binding, entry.ty),
                            );
                        }
                        Resource::Raw(buffer) => {
                            write_buffer_descriptor(device, set, entry.binding, entry.ty, buffer);
                        }
                        Resource::Image(view) => {
                            write_storage_image(device, set, entry.binding, view);
                        }
                    }
                }
            }
        }

        Ok(group)
    }
}

/// Number of sets a group needs: every binding has either one resource or
/// the same number as every other multi-resource binding.
fn option_count(lengths: impl Iterator<Item = usize>) -> Result<usize> {
    let mut count = 1;
    for len in lengths {
        match len {
            0 => {
                return Err(GpuError::InvalidState(
                    "Descriptor binding has no resources".to_string(),
                ))
            }
            1 => {}
            n if count == 1 || count == n => count = n,
            n => {
                return Err(GpuError::InvalidState(format!(
                    "Descriptor binding has {n} options, expected {count}"
                )))
            }
        }
    }
    Ok(count)
}

/// Descriptor sets sharing one layout, one per option.
pub struct DescriptorSetGroup {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorSetGroup {
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Descriptor set for `option`.
    pub fn set(&self, option: usize) -> vk::DescriptorSet {
        self.sets[option]
    }

    pub fn option_count(&self) -> usize {
        self.sets.len()
    }

    /// Destroy the pool (freeing its sets) and the layout.
    ///
    /// # Safety
    /// No set of this group may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
        device.destroy_descriptor_set_layout(self.layout, None);
    }

    #[cfg(test)]
    pub(crate) fn detached(options: usize) -> Self {
        Self {
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: vec![vk::DescriptorSet::null(); options],
        }
    }
}

/// Point a buffer descriptor at the whole of `buffer`.
///
/// # Safety
/// Device, set, and buffer must be valid, and the set must not be in use.
pub unsafe fn write_buffer_descriptor(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    buffer: vk::Buffer,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(vk::WHOLE_SIZE);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
        .buffer_info(std::slice::from_ref(&buffer_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Write a storage image descriptor in `GENERAL` layout.
///
/// # Safety
/// Device and image view must be valid, and the set must not be in use.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::GENERAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}
