//! Buffer management for vertex, index and uniform data
//!
//! Device-local buffers are filled through a host-visible staging buffer and a
//! one-time transfer command; uniform buffers stay host-visible and are rewritten
//! every frame.

use ash::{vk, Device};
use bytemuck::Pod;
use std::marker::PhantomData;
use std::mem;

use crate::render::vulkan::commands::{CommandPool, SingleTimeCommands};
use crate::render::vulkan::context::{VkResultExt, VulkanContext, VulkanError, VulkanResult};

/// Memory flags for CPU-written transfer sources and uniform data
pub const HOST_VISIBLE_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Buffer wrapper owning its memory
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory with `properties`
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot create an empty buffer".to_string(),
            });
        }

        let device = context.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.check("vkCreateBuffer")?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let bound = allocate_bound_memory(context, requirements, properties, |memory| {
            unsafe { device.bind_buffer_memory(buffer, memory, 0) }.check("vkBindBufferMemory")
        });
        let memory = match bound {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Host-visible, host-coherent transfer source holding `data`
    pub fn staging_with_data<T: Pod>(context: &VulkanContext, data: &[T]) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let staging = Self::new(
            context,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HOST_VISIBLE_COHERENT,
        )?;
        staging.write_data(data)?;
        Ok(staging)
    }

    /// Device-local buffer filled from `data` through a staging copy
    ///
    /// `usage` is combined with `TRANSFER_DST`. Blocks until the copy has completed.
    pub fn device_local_with_data<T: Pod>(
        context: &VulkanContext,
        command_pool: &CommandPool,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let staging = Self::staging_with_data(context, data)?;

        let buffer = Self::new(
            context,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let commands = SingleTimeCommands::begin(context, command_pool)?;
        buffer.record_copy_from(commands.command_buffer(), &staging);
        commands.submit_and_wait()?;

        Ok(buffer)
    }

    /// Record a full-size copy from `source` into this buffer
    pub fn record_copy_from(&self, command_buffer: vk::CommandBuffer, source: &Self) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: self.size.min(source.size),
        };
        unsafe {
            self.device
                .cmd_copy_buffer(command_buffer, source.buffer, self.buffer, &[region]);
        }
    }

    /// Copy the contents of a `TRANSFER_SRC` buffer back to the host
    pub fn read_back(&self, context: &VulkanContext, command_pool: &CommandPool) -> VulkanResult<Vec<u8>> {
        let readback = Self::new(
            context,
            self.size,
            vk::BufferUsageFlags::TRANSFER_DST,
            HOST_VISIBLE_COHERENT,
        )?;

        let commands = SingleTimeCommands::begin(context, command_pool)?;
        readback.record_copy_from(commands.command_buffer(), self);
        commands.submit_and_wait()?;

        readback.read_bytes()
    }

    /// Map the whole buffer
    pub fn map_memory(&self) -> VulkanResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .check("vkMapMemory")
    }

    /// Unmap memory
    pub fn unmap_memory(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Map, copy `data` to offset zero, unmap
    ///
    /// Only valid for host-coherent memory; no flush is issued.
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Write of {} bytes exceeds buffer size {}", bytes.len(), self.size),
            });
        }

        let dst = self.map_memory()?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.cast::<u8>(), bytes.len());
        }
        self.unmap_memory();
        Ok(())
    }

    /// Map, copy the whole buffer out, unmap
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        let len = usize::try_from(self.size).map_err(|_| VulkanError::InvalidOperation {
            reason: "Buffer too large to read back".to_string(),
        })?;
        let src = self.map_memory()?;
        let mut bytes = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(src.cast::<u8>(), bytes.as_mut_ptr(), len);
        }
        self.unmap_memory();
        Ok(bytes)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Host-visible uniform buffer holding exactly one `T`
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create an uninitialized uniform buffer sized for `T`
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            HOST_VISIBLE_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: PhantomData,
        })
    }

    /// Overwrite the uniform data
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.handle(),
            offset: 0,
            range: mem::size_of::<T>() as vk::DeviceSize,
        }
    }
}

/// Allocate memory matching `requirements` and attach it with `bind`
///
/// The allocation is freed again if `bind` fails; the caller still owns the resource.
pub(crate) fn allocate_bound_memory(
    context: &VulkanContext,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    bind: impl FnOnce(vk::DeviceMemory) -> VulkanResult<()>,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(
        &context.physical_device().memory_properties,
        requirements.memory_type_bits,
        properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let device = context.device();
    let memory = unsafe { device.allocate_memory(&alloc_info, None) }.check("vkAllocateMemory")?;
    if let Err(e) = bind(memory) {
        unsafe { device.free_memory(memory, None) };
        return Err(e);
    }
    Ok(memory)
}

/// Find the first memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        props
    }

    #[test]
    fn test_finds_first_matching_type() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_VISIBLE_COHERENT,
            HOST_VISIBLE_COHERENT | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, HOST_VISIBLE_COHERENT).unwrap(), 1);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_type_filter_masks_candidates() {
        let props = memory_properties(&[HOST_VISIBLE_COHERENT, HOST_VISIBLE_COHERENT]);
        assert_eq!(find_memory_type(&props, 0b10, HOST_VISIBLE_COHERENT).unwrap(), 1);
    }

    #[test]
    fn test_no_matching_type() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(matches!(
            find_memory_type(&props, 0b1, HOST_VISIBLE_COHERENT),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }

    #[test]
    fn test_host_visible_coherent_flags() {
        assert!(HOST_VISIBLE_COHERENT.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(HOST_VISIBLE_COHERENT.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert!(!HOST_VISIBLE_COHERENT.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }
}
