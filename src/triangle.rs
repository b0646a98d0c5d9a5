// Triangle drawn from vertices generated in the vertex shader, no buffers.
//
// Shared by the triangle and screenshot binaries; `CAPTURE` selects the
// screenshot variant, which saves its first frame.

use anyhow::Result;
use ash::vk;

use crate::app::{Demo, DemoContext, FrameInfo};
use crate::backend::pipeline::{create_graphics_pipeline, set_viewport_and_scissor};
use crate::backend::{ColorPass, GraphicsPipeline, PipelineDesc, VertexLayout, VulkanDevice};
use crate::config::Config;
use crate::shader;

pub struct TriangleDemo<const CAPTURE: bool> {
    pass: ColorPass,
    pipeline: GraphicsPipeline,
    clear_color: [f32; 4],
}

/// Plain triangle
pub type Triangle = TriangleDemo<false>;

/// Triangle that writes its first frame to `screenshot.png`
pub type ScreenshotTriangle = TriangleDemo<true>;

fn build_pipeline(device: &VulkanDevice, render_pass: vk::RenderPass) -> Result<GraphicsPipeline> {
    let desc = PipelineDesc {
        vert_shader: shader!("triangle.vert"),
        frag_shader: shader!("triangle.frag"),
        vertex_layout: &VertexLayout::none(),
        set_layouts: &[],
    };
    create_graphics_pipeline(device, render_pass, &desc)
}

impl<const CAPTURE: bool> Demo for TriangleDemo<CAPTURE> {
    const TITLE: &'static str = if CAPTURE {
        "Vulkan Screenshot"
    } else {
        "Vulkan Triangle"
    };
    const CAPTURE_FIRST_FRAME: bool = CAPTURE;

    fn new(ctx: &DemoContext<'_>) -> Result<Self> {
        let mut pass = ColorPass::new(ctx.device, ctx.swapchain)?;
        let pipeline = match build_pipeline(ctx.device, pass.render_pass) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                pass.destroy(ctx.device);
                return Err(e);
            }
        };

        Ok(Self {
            pass,
            pipeline,
            clear_color: ctx.config.graphics.clear_color,
        })
    }

    fn resize(&mut self, ctx: &DemoContext<'_>) -> Result<()> {
        if self.pass.resize(ctx.device, ctx.swapchain)? {
            // New surface format means a new render pass
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
            device.cmd_draw(cmd, 3, 1, 0, 0);
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_screenshot_variant_captures() {
        assert!(!Triangle::CAPTURE_FIRST_FRAME);
        assert!(ScreenshotTriangle::CAPTURE_FIRST_FRAME);
        assert_eq!(Triangle::TITLE, "Vulkan Triangle");
        assert_eq!(ScreenshotTriangle::TITLE, "Vulkan Screenshot");
    }
}
