// Triangle demo: three vertices generated in the vertex shader, no buffers.

use anyhow::Result;

use vulkan_demos::config::Config;
use vulkan_demos::triangle::Triangle;
use vulkan_demos::{app, logging};

fn main() -> Result<()> {
    let config = Config::load();
    logging::init_logging(&config)?;
    app::run::<Triangle>(config)
}
