// Rectangle demo: four coloured vertices and six indices in device-local
// buffers, drawn with one indexed draw.

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

use vulkan_demos::app::{self, Demo, DemoContext, FrameInfo};
use vulkan_demos::backend::pipeline::{create_graphics_pipeline, set_viewport_and_scissor};
use vulkan_demos::backend::{
    ColorPass, GpuBuffer, GraphicsPipeline, PipelineDesc, VertexLayout, VulkanDevice,
};
use vulkan_demos::config::Config;
use vulkan_demos::{logging, shader};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
}

impl Vertex {
    const fn new(position: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            position: Vec2::from_array(position),
            color: Vec3::from_array(color),
        }
    }

    fn layout() -> VertexLayout {
        VertexLayout::interleaved(
            size_of::<Self>(),
            &[
                (vk::Format::R32G32_SFLOAT, offset_of!(Self, position)),
                (vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            ],
        )
    }
}

const VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),
];

const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

struct Rectangle {
    pass: ColorPass,
    pipeline: GraphicsPipeline,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    clear_color: [f32; 4],
}

fn build_pipeline(device: &VulkanDevice, render_pass: vk::RenderPass) -> Result<GraphicsPipeline> {
    let desc = PipelineDesc {
        vert_shader: shader!("vertex_color.vert"),
        frag_shader: shader!("vertex_color.frag"),
        vertex_layout: &Vertex::layout(),
        set_layouts: &[],
    };
    create_graphics_pipeline(device, render_pass, &desc)
}

impl Demo for Rectangle {
    const TITLE: &'static str = "Vulkan Rectangle";

    fn new(ctx: &DemoContext<'_>) -> Result<Self> {
        let device: &VulkanDevice = ctx.device;

        let mut vertex_buffer = GpuBuffer::device_local_with_data(
            device,
            ctx.commands,
            "rectangle vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
        )?;
        let mut index_buffer = match GpuBuffer::device_local_with_data(
            device,
            ctx.commands,
            "rectangle indices",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &INDICES,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy(device);
                return Err(e);
            }
        };

        let pipeline = ColorPass::new(device, ctx.swapchain).and_then(|mut pass| {
            match build_pipeline(device, pass.render_pass) {
                Ok(pipeline) => Ok((pass, pipeline)),
                Err(e) => {
                    pass.destroy(device);
                    Err(e)
                }
            }
        });
        let (pass, pipeline) = match pipeline {
            Ok(built) => built,
            Err(e) => {
                index_buffer.destroy(device);
                vertex_buffer.destroy(device);
                return Err(e);
            }
        };

        log::info!(
            "Uploaded {} vertices and {} indices",
            VERTICES.len(),
            INDICES.len()
        );

        Ok(Self {
            pass,
            pipeline,
            vertex_buffer,
            index_buffer,
            clear_color: ctx.config.graphics.clear_color,
        })
    }

    fn resize(&mut self, ctx: &DemoContext<'_>) -> Result<()> {
        if self.pass.resize(ctx.device, ctx.swapchain)? {
            let pipeline = build_pipeline(ctx.device, self.pass.render_pass)?;
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
        self.index_buffer.destroy(device);
        self.vertex_buffer.destroy(device);
    }
}

fn main() -> Result<()> {
    let config = Config::load();
    logging::init_logging(&config)?;
    app::run::<Rectangle>(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 20);
        assert_eq!(offset_of!(Vertex, color), 8);

        let layout = Vertex::layout();
        assert_eq!(layout.bindings[0].stride, 20);
        assert_eq!(layout.attributes.len(), 2);
    }

    #[test]
    fn indices_form_two_triangles_over_all_corners() {
        assert_eq!(INDICES.len() % 3, 0);
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));
        for corner in 0..VERTICES.len() as u16 {
            assert!(INDICES.contains(&corner));
        }
    }
}
