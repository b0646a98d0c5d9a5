// Screenshot demo: the triangle, with the first presented frame copied back
// from the swapchain and saved as screenshot.png next to the executable.
// The screenshot key captures again at any time.

use anyhow::Result;

use vulkan_demos::config::Config;
use vulkan_demos::triangle::ScreenshotTriangle;
use vulkan_demos::{app, logging};

fn main() -> Result<()> {
    let config = Config::load();
    logging::init_logging(&config)?;
    app::run::<ScreenshotTriangle>(config)
}
