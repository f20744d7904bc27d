//! Buffer management for vertex, index and uniform data
//!
//! Every buffer lives in host-visible, host-coherent memory that stays
//! mapped for the buffer's whole life. Writes are plain copies.

use std::ptr::NonNull;

use ash::{vk, Device};

use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Host address range of a mapped allocation
struct MappedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// Only written through `&mut Buffer`, so shared references never alias a write.
unsafe impl Send for MappedMemory {}
unsafe impl Sync for MappedMemory {}

impl MappedMemory {
    fn check_range(&self, offset: usize, length: usize) -> VulkanResult<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(VulkanError::invalid(format!(
                "Write of {} bytes at offset {} overflows buffer of {} bytes",
                length, offset, self.len
            ))),
        }
    }

    // `ptr` stays valid for `len` bytes until the allocation is unmapped.
    fn copy_from(&mut self, offset: usize, bytes: &[u8]) -> VulkanResult<()> {
        self.check_range(offset, bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<MappedMemory>,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        context: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid("Cannot create a zero-sized buffer"));
        }
        let device = context.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let Some(memory_type_index) = context.find_memory_type(requirements.memory_type_bits, properties) else {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(VulkanError::NoSuitableMemoryType);
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(err));
            }
        };

        // From here on Drop releases both handles
        let buffer = Self {
            device,
            buffer,
            memory,
            size,
            mapped: None,
        };

        unsafe {
            buffer
                .device
                .bind_buffer_memory(buffer.buffer, buffer.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(buffer)
    }

    /// Host-visible, host-coherent buffer, mapped until it is dropped
    pub fn host_visible(context: &DeviceContext, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<Self> {
        let mut buffer = Self::new(
            context,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let len = usize::try_from(size).map_err(|_| VulkanError::invalid("Buffer too large to map"))?;

        let ptr = unsafe {
            buffer
                .device
                .map_memory(buffer.memory, 0, size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| VulkanError::invalid("vkMapMemory returned null"))?;
        buffer.mapped = Some(MappedMemory { ptr, len });

        Ok(buffer)
    }

    /// Copy `bytes` to the start of the buffer
    pub fn write_bytes(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        self.write_bytes_at(0, bytes)
    }

    /// Copy `bytes` into the buffer starting at `offset`
    pub fn write_bytes_at(&mut self, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()> {
        let mapped = self
            .mapped
            .as_mut()
            .ok_or_else(|| VulkanError::invalid("Buffer memory is not host mapped"))?;
        let offset = usize::try_from(offset).map_err(|_| VulkanError::invalid("Write offset out of range"))?;
        mapped.copy_from(offset, bytes)
    }

    /// Copy plain-old-data values to the start of the buffer
    pub fn write<T: bytemuck::Pod>(&mut self, data: &[T]) -> VulkanResult<()> {
        self.write_bytes(bytemuck::cast_slice(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(storage: &mut [u8]) -> MappedMemory {
        MappedMemory {
            ptr: NonNull::new(storage.as_mut_ptr()).expect("slice pointer"),
            len: storage.len(),
        }
    }

    #[test]
    fn test_mapping_accepts_repeated_writes() {
        let mut storage = vec![0u8; 8];
        let mut memory = mapped(&mut storage);

        memory.copy_from(0, &[1, 2, 3, 4]).expect("first write");
        memory.copy_from(4, &[5, 6, 7, 8]).expect("second write");
        memory.copy_from(2, &[9]).expect("overwrite");
        drop(memory);

        assert_eq!(storage, vec![1, 2, 9, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_mapping_rejects_overflowing_writes() {
        let mut storage = vec![0u8; 4];
        let mut memory = mapped(&mut storage);

        assert!(matches!(
            memory.copy_from(2, &[1, 2, 3]),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(memory.copy_from(usize::MAX, &[1]).is_err());
        assert!(memory.copy_from(4, &[]).is_ok());
        drop(memory);

        assert_eq!(storage, vec![0; 4]);
    }
}
