// Textured quad demo: a PNG from the assets directory sampled onto an
// indexed quad through a combined image sampler.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use std::mem::{offset_of, size_of};

use vulkan_demos::app::{self, Demo, DemoContext, FrameInfo};
use vulkan_demos::backend::pipeline::{create_graphics_pipeline, set_viewport_and_scissor};
use vulkan_demos::backend::texture::load_png;
use vulkan_demos::backend::{
    ColorPass, GpuBuffer, GraphicsPipeline, PipelineDesc, Texture, TextureBinding, VertexLayout,
    VulkanDevice,
};
use vulkan_demos::config::Config;
use vulkan_demos::{logging, shader};

const TEXTURE_FILE: &str = "texture.png";

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    uv: Vec2,
}

impl Vertex {
    const fn new(position: [f32; 2], uv: [f32; 2]) -> Self {
        Self {
            position: Vec2::from_array(position),
            uv: Vec2::from_array(uv),
        }
    }

    fn layout() -> VertexLayout {
        VertexLayout::interleaved(
            size_of::<Self>(),
            &[
                (vk::Format::R32G32_SFLOAT, offset_of!(Self, position)),
                (vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
            ],
        )
    }
}

// Texture origin is top-left, matching Vulkan's -y at the top of the screen
const VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [0.0, 0.0]),
    Vertex::new([0.5, -0.5], [1.0, 0.0]),
    Vertex::new([0.5, 0.5], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5], [0.0, 1.0]),
];

const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

struct TexturedQuad {
    pass: ColorPass,
    pipeline: GraphicsPipeline,
    binding: TextureBinding,
    texture: Texture,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    clear_color: [f32; 4],
}

fn build_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    binding: &TextureBinding,
) -> Result<GraphicsPipeline> {
    let desc = PipelineDesc {
        vert_shader: shader!("textured.vert"),
        frag_shader: shader!("textured.frag"),
        vertex_layout: &Vertex::layout(),
        set_layouts: &[binding.set_layout],
    };
    create_graphics_pipeline(device, render_pass, &desc)
}

/// Resources created so far; released in reverse if a later step fails
#[derive(Default)]
struct Partial {
    vertex_buffer: Option<GpuBuffer>,
    index_buffer: Option<GpuBuffer>,
    texture: Option<Texture>,
    binding: Option<TextureBinding>,
    pass: Option<ColorPass>,
}

impl Partial {
    fn release(mut self, device: &VulkanDevice) {
        if let Some(mut pass) = self.pass.take() {
            pass.destroy(device);
        }
        if let Some(binding) = self.binding.take() {
            binding.destroy(device);
        }
        if let Some(mut texture) = self.texture.take() {
            texture.destroy(device);
        }
        if let Some(mut buffer) = self.index_buffer.take() {
            buffer.destroy(device);
        }
        if let Some(mut buffer) = self.vertex_buffer.take() {
            buffer.destroy(device);
        }
    }
}

impl TexturedQuad {
    fn create(ctx: &DemoContext<'_>, partial: &mut Partial) -> Result<GraphicsPipeline> {
        let device: &VulkanDevice = ctx.device;

        partial.vertex_buffer = Some(GpuBuffer::device_local_with_data(
            device,
            ctx.commands,
            "quad vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
        )?);
        partial.index_buffer = Some(GpuBuffer::device_local_with_data(
            device,
            ctx.commands,
            "quad indices",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &INDICES,
        )?);

        let path = ctx.config.assets_dir().join(TEXTURE_FILE);
        let image = load_png(&path).with_context(|| format!("Failed to load texture {:?}", path))?;
        log::info!("Loaded {:?} ({}x{})", path, image.width, image.height);

        let texture = partial
            .texture
            .insert(Texture::from_rgba(device, ctx.commands, TEXTURE_FILE, &image)?);
        let binding = partial.binding.insert(TextureBinding::new(device, texture)?);
        let pass = partial.pass.insert(ColorPass::new(device, ctx.swapchain)?);

        build_pipeline(device, pass.render_pass, binding)
    }
}

impl Demo for TexturedQuad {
    const TITLE: &'static str = "Vulkan Textured Quad";

    fn new(ctx: &DemoContext<'_>) -> Result<Self> {
        let mut partial = Partial::default();
        let pipeline = match Self::create(ctx, &mut partial) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                partial.release(ctx.device);
                return Err(e);
            }
        };

        let (Some(pass), Some(binding), Some(texture), Some(vertex_buffer), Some(index_buffer)) = (
            partial.pass,
            partial.binding,
            partial.texture,
            partial.vertex_buffer,
            partial.index_buffer,
        ) else {
            anyhow::bail!("Textured quad resources incomplete");
        };

        Ok(Self {
            pass,
            pipeline,
            binding,
            texture,
            vertex_buffer,
            index_buffer,
            clear_color: ctx.config.graphics.clear_color,
        })
    }

    fn resize(&mut self, ctx: &DemoContext<'_>) -> Result<()> {
        if self.pass.resize(ctx.device, ctx.swapchain)? {
            let pipeline = build_pipeline(ctx.device, self.pass.render_pass, &self.binding)?;
            std::mem::replace(&mut self.pipeline, pipeline).destroy(ctx.device);
        }
        Ok(())
    }

    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, frame: &FrameInfo) -> Result<()> {
        self.pass
            .begin(device, cmd, frame.image_index, frame.extent, self.clear_color);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            set_viewport_and_scissor(device, cmd, frame.extent);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.binding.set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, INDICES.len() as u32, 1, 0, 0, 0);
            device.cmd_end_render_pass(cmd);
        }
        Ok(())
    }

    fn config_changed(&mut self, config: &Config) {
        self.clear_color = config.graphics.clear_color;
    }

    fn destroy(&mut self, device: &VulkanDevice) {
        self.pipeline.destroy(device);
        self.pass.destroy(device);
        self.binding.destroy(device);
        self.texture.destroy(device);
        self.index_buffer.destroy(device);
        self.vertex_buffer.destroy(device);
    }
}

fn main() -> Result<()> {
    let config = Config::load();
    logging::init_logging(&config)?;
    app::run::<TexturedQuad>(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        assert_eq!(size_of::<Vertex>(), 16);
        let layout = Vertex::layout();
        let offsets: Vec<u32> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8]);
    }

    #[test]
    fn uvs_cover_the_whole_texture() {
        let (min, max) = VERTICES.iter().fold((Vec2::splat(1.0), Vec2::ZERO), |(lo, hi), v| {
            (lo.min(v.uv), hi.max(v.uv))
        });
        assert_eq!(min, Vec2::ZERO);
        assert_eq!(max, Vec2::ONE);
    }
}
