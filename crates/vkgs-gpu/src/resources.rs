//! Named buffer table with reallocation that keeps descriptor sets in sync.
//!
//! Every buffer a descriptor set points at is registered here together with a
//! weak reference to the set group. When a buffer is reallocated, every live
//! reference is rewritten to the new `vk::Buffer`; references whose group has
//! been dropped are pruned.

use crate::context::GpuContext;
use crate::descriptors::{write_buffer_descriptor, DescriptorSetGroup};
use crate::error::Result;
use crate::memory::GpuBuffer;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::{Arc, Weak};

/// Index of a buffer in a [`BufferTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

/// One descriptor slot that points at a table buffer.
pub struct BindingRef {
    group: Weak<DescriptorSetGroup>,
    option: usize,
    binding: u32,
    ty: vk::DescriptorType,
}

impl BindingRef {
    pub fn new(
        group: &Arc<DescriptorSetGroup>,
        option: usize,
        binding: u32,
        ty: vk::DescriptorType,
    ) -> Self {
        Self {
            group: Arc::downgrade(group),
            option,
            binding,
            ty,
        }
    }

    /// Descriptor set to rewrite, or `None` once the group is gone.
    fn target(&self) -> Option<(vk::DescriptorSet, u32, vk::DescriptorType)> {
        let group = self.group.upgrade()?;
        Some((group.set(self.option), self.binding, self.ty))
    }
}

struct Entry {
    name: String,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
    buffer: GpuBuffer,
    bindings: Vec<BindingRef>,
}

impl Entry {
    /// Live descriptor slots, dropping dead references.
    fn live_targets(&mut self) -> Vec<(vk::DescriptorSet, u32, vk::DescriptorType)> {
        let mut targets = Vec::with_capacity(self.bindings.len());
        self.bindings.retain(|binding| match binding.target() {
            Some(target) => {
                targets.push(target);
                true
            }
            None => false,
        });
        targets
    }
}

/// Owner of every buffer that participates in descriptor sets.
#[derive(Default)]
pub struct BufferTable {
    entries: Vec<Entry>,
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a buffer and return its handle.
    pub fn create(
        &mut self,
        gpu: &GpuContext,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<BufferHandle> {
        let buffer = gpu
            .allocator()
            .lock()
            .create_buffer(size, usage, location, name)?;
        let handle = BufferHandle(self.entries.len() as u32);
        self.entries.push(Entry {
            name: name.to_string(),
            usage,
            location,
            buffer,
            bindings: Vec::new(),
        });
        Ok(handle)
    }

    /// Buffer behind `handle`.
    ///
    /// Handles are only minted by this table, so indexing cannot fail for
    /// handles obtained from it.
    pub fn get(&self, handle: BufferHandle) -> &GpuBuffer {
        &self.entries[handle.0 as usize].buffer
    }

    pub fn buffer(&self, handle: BufferHandle) -> vk::Buffer {
        self.get(handle).buffer
    }

    pub fn size(&self, handle: BufferHandle) -> u64 {
        self.get(handle).size
    }

    pub fn name(&self, handle: BufferHandle) -> &str {
        &self.entries[handle.0 as usize].name
    }

    /// Record that a descriptor slot points at `handle`.
    pub fn register_binding(&mut self, handle: BufferHandle, binding: BindingRef) {
        self.entries[handle.0 as usize].bindings.push(binding);
    }

    /// Number of live descriptor slots pointing at `handle`.
    pub fn live_bindings(&mut self, handle: BufferHandle) -> usize {
        self.entries[handle.0 as usize].live_targets().len()
    }

    /// Replace the buffer behind `handle` with a new one of `size` bytes and
    /// repoint every live descriptor slot at it. Contents are not preserved.
    ///
    /// # Safety
    /// Neither the old buffer nor any referencing descriptor set may be in use.
    pub unsafe fn reallocate(
        &mut self,
        gpu: &GpuContext,
        handle: BufferHandle,
        size: u64,
    ) -> Result<()> {
        let entry = &mut self.entries[handle.0 as usize];
        let old_size = entry.buffer.size;

        let replacement = gpu.allocator().lock().create_buffer(
            size,
            entry.usage,
            entry.location,
            &entry.name,
        )?;
        let mut old = std::mem::replace(&mut entry.buffer, replacement);
        gpu.allocator().lock().free_buffer(&mut old)?;

        let targets = entry.live_targets();
        for &(set, binding, ty) in &targets {
            write_buffer_descriptor(gpu.device(), set, binding, ty, entry.buffer.buffer);
        }

        tracing::debug!(
            name = %entry.name,
            old_size,
            new_size = entry.buffer.size,
            rebound = targets.len(),
            "Reallocated buffer"
        );
        Ok(())
    }

    /// Free every buffer.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        for entry in &mut self.entries {
            allocator.free_buffer(&mut entry.buffer)?;
            entry.bindings.clear();
        }
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with(bindings: Vec<BindingRef>) -> Entry {
        Entry {
            name: "test".to_string(),
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
            location: MemoryLocation::GpuOnly,
            buffer: GpuBuffer {
                buffer: vk::Buffer::null(),
                allocation: None,
                size: 4,
                usage: vk::BufferUsageFlags::STORAGE_BUFFER,
                location: MemoryLocation::GpuOnly,
            },
            bindings,
        }
    }

    #[test]
    fn dropped_groups_are_pruned() {
        let kept = Arc::new(DescriptorSetGroup::detached(2));
        let dropped = Arc::new(DescriptorSetGroup::detached(1));
        let mut entry = entry_with(vec![
            BindingRef::new(&kept, 0, 0, vk::DescriptorType::STORAGE_BUFFER),
            BindingRef::new(&dropped, 0, 3, vk::DescriptorType::STORAGE_BUFFER),
            BindingRef::new(&kept, 1, 1, vk::DescriptorType::STORAGE_BUFFER),
        ]);
        drop(dropped);

        let targets = entry.live_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].1, 0);
        assert_eq!(targets[1].1, 1);
        assert_eq!(entry.bindings.len(), 2);
    }
}
