// Readback: copy a presented swapchain image to host memory and save it as PNG

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::commands::image_barrier;
use super::{GpuBuffer, VulkanDevice};

/// Byte order of a 4-byte colour format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
}

impl ChannelOrder {
    pub fn of(format: vk::Format) -> Result<Self> {
        match format {
            vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB => Ok(Self::Rgba),
            vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => Ok(Self::Bgra),
            other => anyhow::bail!("Readback of {:?} images is not supported", other),
        }
    }
}

/// Turn tightly packed pixels into RGBA
pub fn to_rgba(order: ChannelOrder, pixels: &[u8]) -> Vec<u8> {
    match order {
        ChannelOrder::Rgba => pixels.to_vec(),
        ChannelOrder::Bgra => pixels
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect(),
    }
}

pub fn save_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder
        .write_header()
        .with_context(|| format!("Failed to write PNG header to {:?}", path))?;
    writer
        .write_image_data(rgba)
        .with_context(|| format!("Failed to write PNG data to {:?}", path))?;
    writer
        .finish()
        .with_context(|| format!("Failed to finish {:?}", path))?;
    Ok(())
}

/// Host buffer receiving one swapchain image
pub struct Readback {
    buffer: GpuBuffer,
    extent: vk::Extent2D,
    order: ChannelOrder,
}

impl Readback {
    pub fn new(device: &VulkanDevice, extent: vk::Extent2D, format: vk::Format) -> Result<Self> {
        let order = ChannelOrder::of(format)?;
        let size = extent.width as vk::DeviceSize * extent.height as vk::DeviceSize * 4;
        let buffer = GpuBuffer::new(
            device,
            "readback",
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
        )?;

        Ok(Self {
            buffer,
            extent,
            order,
        })
    }

    /// Record the copy after the render pass has left the image in
    /// PRESENT_SRC; the image is returned to PRESENT_SRC afterwards
    pub fn record_copy(&self, device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
        image_barrier(
            device,
            cmd,
            image,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
        );

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
        };
        unsafe {
            device.cmd_copy_image_to_buffer(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.buffer.buffer,
                &[region],
            );
        }

        image_barrier(
            device,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        );
    }

    /// Read the copied pixels; only valid once the submit has completed
    pub fn to_rgba(&self) -> Result<Vec<u8>> {
        Ok(to_rgba(self.order, self.buffer.mapped()?))
    }

    /// Write the copied pixels to `path` and release the buffer
    pub fn save(mut self, device: &VulkanDevice, path: &Path) -> Result<()> {
        let result = self
            .to_rgba()
            .and_then(|rgba| save_png(path, self.extent.width, self.extent.height, &rgba));
        self.buffer.destroy(device);
        result?;

        log::info!(
            "Saved {}x{} screenshot to {:?}",
            self.extent.width,
            self.extent.height,
            path
        );
        Ok(())
    }

    pub fn destroy(mut self, device: &VulkanDevice) {
        self.buffer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_formats_map_to_channel_orders() {
        assert_eq!(ChannelOrder::of(vk::Format::B8G8R8A8_SRGB).unwrap(), ChannelOrder::Bgra);
        assert_eq!(ChannelOrder::of(vk::Format::B8G8R8A8_UNORM).unwrap(), ChannelOrder::Bgra);
        assert_eq!(ChannelOrder::of(vk::Format::R8G8B8A8_SRGB).unwrap(), ChannelOrder::Rgba);
        assert!(ChannelOrder::of(vk::Format::A2B10G10R10_UNORM_PACK32).is_err());
        assert!(ChannelOrder::of(vk::Format::R16G16B16A16_SFLOAT).is_err());
    }

    #[test]
    fn bgra_is_swizzled() {
        let bgra = [1, 2, 3, 4, 10, 20, 30, 40];
        assert_eq!(to_rgba(ChannelOrder::Bgra, &bgra), vec![3, 2, 1, 4, 30, 20, 10, 40]);
        assert_eq!(to_rgba(ChannelOrder::Rgba, &bgra), bgra.to_vec());
    }

    #[test]
    fn saved_png_decodes_back() {
        let path = std::env::temp_dir().join(format!("readback-{}.png", std::process::id()));
        let rgba = [255, 0, 0, 255, 0, 0, 255, 255];
        save_png(&path, 2, 1, &rgba).unwrap();

        let decoded = crate::backend::texture::load_png(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.rgba, rgba);
    }
}
