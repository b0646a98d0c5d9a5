// Textures: PNG decoding, upload to a sampled image, descriptor binding

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::path::Path;

use super::commands::image_barrier;
use super::swapchain::color_subresource_range;
use super::{CommandPool, GpuBuffer, VulkanDevice};

/// Decoded image, always 8-bit RGBA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Read and decode a PNG file
pub fn load_png(path: &Path) -> Result<DecodedImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    decode_png(&bytes).with_context(|| format!("Failed to decode image {:?}", path))
}

/// Decode PNG bytes, expanding palettes, low bit depths and 16-bit channels
/// and converting grey / grey+alpha / RGB to RGBA
pub fn decode_png(bytes: &[u8]) -> Result<DecodedImage> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);

    let mut reader = decoder.read_info().context("Not a PNG file")?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).context("Corrupt PNG data")?;
    buf.truncate(info.buffer_size());

    if info.bit_depth != png::BitDepth::Eight {
        anyhow::bail!("Unsupported PNG bit depth {:?}", info.bit_depth);
    }

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => anyhow::bail!("Palette was not expanded"),
    };

    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        rgba,
    })
}

/// A sampled 2D texture on the GPU
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub extent: vk::Extent2D,
    allocation: Option<Allocation>,
}

impl Texture {
    /// Upload `image` into an SRGB texture ready for sampling in fragment shaders
    pub fn from_rgba(
        device: &VulkanDevice,
        pool: &CommandPool,
        name: &str,
        image: &DecodedImage,
    ) -> Result<Self> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.rgba.len() != expected {
            anyhow::bail!(
                "Texture {} has {} bytes for {}x{} pixels",
                name,
                image.rgba.len(),
                image.width,
                image.height
            );
        }

        let extent = vk::Extent2D {
            width: image.width,
            height: image.height,
        };
        let format = vk::Format::R8G8B8A8_SRGB;

        let mut texture = Self::create_image(device, name, extent, format)?;

        let uploaded = texture
            .upload(device, pool, name, &image.rgba)
            .and_then(|()| texture.create_view_and_sampler(device, format));
        if let Err(e) = uploaded {
            texture.destroy(device);
            return Err(e);
        }

        log::info!("Loaded texture {} ({}x{})", name, extent.width, extent.height);
        Ok(texture)
    }

    fn create_image(
        device: &VulkanDevice,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create image {}", name))?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for {}", name));
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };

        let mut texture = Self {
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent,
            allocation: Some(allocation),
        };
        if let Err(e) = bound {
            texture.destroy(device);
            return Err(e).with_context(|| format!("Failed to bind memory for {}", name));
        }

        Ok(texture)
    }

    /// Staging copy with UNDEFINED -> TRANSFER_DST -> SHADER_READ_ONLY transitions
    fn upload(&self, device: &VulkanDevice, pool: &CommandPool, name: &str, rgba: &[u8]) -> Result<()> {
        let mut staging = GpuBuffer::with_data(
            device,
            &format!("{} (staging)", name),
            vk::BufferUsageFlags::TRANSFER_SRC,
            rgba,
        )?;

        let image = self.image;
        let extent = self.extent;
        let staging_buffer = staging.buffer;

        let result = pool.one_shot(|device, cmd| {
            image_barrier(
                device,
                cmd,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
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
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            image_barrier(
                device,
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            );
        });

        staging.destroy(device);
        result
    }

    fn create_view_and_sampler(&mut self, device: &VulkanDevice, format: vk::Format) -> Result<()> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());

        self.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create texture view")?;

        let max_anisotropy = if device.sampler_anisotropy {
            device.properties.limits.max_sampler_anisotropy
        } else {
            1.0
        };

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(device.sampler_anisotropy)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0);

        self.sampler = unsafe { device.device.create_sampler(&sampler_info, None) }
            .context("Failed to create texture sampler")?;

        Ok(())
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                device.device.destroy_sampler(self.sampler, None);
                self.sampler = vk::Sampler::null();
            }
            if self.view != vk::ImageView::null() {
                device.device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
        }

        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator().free(allocation) {
                log::warn!("Failed to free texture memory: {}", e);
            }
            unsafe { device.device.destroy_image(self.image, None) };
            self.image = vk::Image::null();
        }
    }
}

/// Descriptor set exposing one texture as `binding = 0` combined image sampler
pub struct TextureBinding {
    pub set_layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
}

impl TextureBinding {
    pub fn new(device: &VulkanDevice, texture: &Texture) -> Result<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let set_layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(1);
        let pool = match unsafe { device.device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.device.destroy_descriptor_set_layout(set_layout, None) };
                return Err(e).context("Failed to create descriptor pool");
            }
        };

        let mut binding = Self {
            set_layout,
            pool,
            set: vk::DescriptorSet::null(),
        };

        let set_layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        match unsafe { device.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => binding.set = sets[0],
            Err(e) => {
                binding.destroy(device);
                return Err(e).context("Failed to allocate descriptor set");
            }
        }

        let image_info = [vk::DescriptorImageInfo {
            sampler: texture.sampler,
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(binding.set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();
        unsafe { device.device.update_descriptor_sets(&[write], &[]) };

        Ok(binding)
    }

    pub fn destroy(&self, device: &VulkanDevice) {
        unsafe {
            // Destroying the pool frees the set
            device.device.destroy_descriptor_pool(self.pool, None);
            device.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(width: u32, height: u32, color: png::ColorType, depth: png::BitDepth, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(color);
            encoder.set_depth(depth);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(data).unwrap();
        }
        out
    }

    #[test]
    fn rgba_passes_through() {
        let pixels = [255, 0, 0, 255, 0, 255, 0, 128];
        let png = encode(2, 1, png::ColorType::Rgba, png::BitDepth::Eight, &pixels);
        let image = decode_png(&png).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.rgba, pixels);
    }

    #[test]
    fn rgb_gets_opaque_alpha() {
        let png = encode(1, 2, png::ColorType::Rgb, png::BitDepth::Eight, &[1, 2, 3, 4, 5, 6]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn grayscale_is_spread_to_all_channels() {
        let png = encode(2, 1, png::ColorType::Grayscale, png::BitDepth::Eight, &[10, 200]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.rgba, vec![10, 10, 10, 255, 200, 200, 200, 255]);

        let png = encode(1, 1, png::ColorType::GrayscaleAlpha, png::BitDepth::Eight, &[7, 9]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.rgba, vec![7, 7, 7, 9]);
    }

    #[test]
    fn sixteen_bit_is_stripped_to_eight() {
        // big-endian 16-bit samples; the high byte survives
        let png = encode(1, 1, png::ColorType::Rgb, png::BitDepth::Sixteen, &[0xAB, 0x01, 0xCD, 0x02, 0xEF, 0x03]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.rgba, vec![0xAB, 0xCD, 0xEF, 255]);
    }

    #[test]
    fn palette_is_expanded_to_rgba() {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, 2, 1);
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(vec![255, 0, 0, 0, 0, 255]);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 1]).unwrap();
        }
        let image = decode_png(&out).unwrap();
        assert_eq!(image.rgba, vec![255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn one_bit_grayscale_is_scaled_up() {
        // first pixel white, second black, rest of the byte is padding
        let png = encode(2, 1, png::ColorType::Grayscale, png::BitDepth::One, &[0b1000_0000]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.rgba, vec![255, 255, 255, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_png(b"definitely not a png").is_err());
        assert!(decode_png(&[]).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_png(Path::new("no/such/texture.png")).unwrap_err();
        assert!(format!("{:#}", err).contains("texture.png"));
    }

    #[test]
    fn bundled_texture_decodes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/texture.png");
        let image = load_png(&path).unwrap();
        assert_eq!((image.width, image.height), (64, 64));
        assert_eq!(image.rgba.len(), 64 * 64 * 4);
    }
}
