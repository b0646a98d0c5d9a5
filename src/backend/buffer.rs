// Buffer utilities for vertex, index, staging and readback buffers
//
// Memory comes from the device's gpu-allocator instance.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::{CommandPool, VulkanDevice};

/// A buffer together with the memory backing it
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
}

impl GpuBuffer {
    /// Helper to create a GPU buffer with specified usage and memory location
    pub fn new(
        device: &VulkanDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer {}", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for {}", name));
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };

        let mut created = Self {
            buffer,
            size,
            allocation: Some(allocation),
        };
        if let Err(e) = bound {
            created.destroy(device);
            return Err(e).with_context(|| format!("Failed to bind memory for {}", name));
        }

        Ok(created)
    }

    /// Create a host-visible buffer and fill it with data
    pub fn with_data<T: bytemuck::Pod>(
        device: &VulkanDevice,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(
            device,
            name,
            bytes.len() as vk::DeviceSize,
            usage,
            MemoryLocation::CpuToGpu,
        )?;

        if let Err(e) = buffer.write(bytes) {
            buffer.destroy(device);
            return Err(e);
        }

        Ok(buffer)
    }

    /// Create a device-local buffer, uploading through a staging buffer
    pub fn device_local_with_data<T: bytemuck::Pod>(
        device: &VulkanDevice,
        pool: &CommandPool,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let mut staging = Self::with_data(
            device,
            &format!("{} (staging)", name),
            vk::BufferUsageFlags::TRANSFER_SRC,
            data,
        )?;

        let result = Self::new(
            device,
            name,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )
        .and_then(|mut target| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staging.size,
            };
            let copied = pool.one_shot(|device, cmd| unsafe {
                device.cmd_copy_buffer(cmd, staging.buffer, target.buffer, &[region]);
            });
            match copied {
                Ok(()) => Ok(target),
                Err(e) => {
                    target.destroy(device);
                    Err(e)
                }
            }
        });

        staging.destroy(device);
        result
    }

    /// Copy bytes into the start of a host-visible buffer
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;

        if bytes.len() > mapped.len() {
            anyhow::bail!(
                "Write of {} bytes does not fit a {} byte buffer",
                bytes.len(),
                mapped.len()
            );
        }
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Host-visible contents
    pub fn mapped(&self) -> Result<&[u8]> {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .context("Buffer memory is not host visible")
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator().free(allocation) {
                log::warn!("Failed to free buffer memory: {}", e);
            }
            unsafe { device.device.destroy_buffer(self.buffer, None) };
            self.buffer = vk::Buffer::null();
        }
    }
}
