// Clear demo: fills every swapchain image with the configured colour using a
// transfer clear, no render pass. Edit graphics.clear_color in config.toml
// while it runs to change the colour.

use anyhow::Result;
use ash::vk;

use vulkan_demos::app::{self, Demo, DemoContext, FrameInfo};
use vulkan_demos::backend::commands::image_barrier;
use vulkan_demos::backend::swapchain::color_subresource_range;
use vulkan_demos::backend::VulkanDevice;
use vulkan_demos::config::Config;
use vulkan_demos::logging;

struct Clear {
    color: [f32; 4],
}

impl Demo for Clear {
    const TITLE: &'static str = "Vulkan Clear";

    fn new(ctx: &DemoContext<'_>) -> Result<Self> {
        Ok(Self {
            color: ctx.config.graphics.clear_color,
        })
    }

    fn resize(&mut self, _ctx: &DemoContext<'_>) -> Result<()> {
        Ok(())
    }

    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, frame: &FrameInfo) -> Result<()> {
        // Contents are overwritten, so the old layout can be discarded
        image_barrier(
            device,
            cmd,
            frame.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
        );

        let clear = vk::ClearColorValue { float32: self.color };
        unsafe {
            device.cmd_clear_color_image(
                cmd,
                frame.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear,
                &[color_subresource_range()],
            );
        }

        image_barrier(
            device,
            cmd,
            frame.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        );
        Ok(())
    }

    fn config_changed(&mut self, config: &Config) {
        if config.graphics.clear_color != self.color {
            log::info!("Clear colour now {:?}", config.graphics.clear_color);
            self.color = config.graphics.clear_color;
        }
    }

    fn destroy(&mut self, _device: &VulkanDevice) {}
}

fn main() -> Result<()> {
    let config = Config::load();
    logging::init_logging(&config)?;
    app::run::<Clear>(config)
}
