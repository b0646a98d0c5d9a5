//! Small standalone Vulkan demos sharing one backend.
//!
//! Each binary in `src/bin` implements [`app::Demo`] and hands it to
//! [`app::run`], which owns the window, the Vulkan objects and the frame loop.
//!
//! ```no_run
//! use vulkan_demos::{app, config::Config, logging};
//!
//! # struct MyDemo;
//! # impl app::Demo for MyDemo {
//! #     const TITLE: &'static str = "Demo";
//! #     fn new(_: &app::DemoContext<'_>) -> anyhow::Result<Self> { Ok(MyDemo) }
//! #     fn resize(&mut self, _: &app::DemoContext<'_>) -> anyhow::Result<()> { Ok(()) }
//! #     fn record(&mut self, _: &ash::Device, _: ash::vk::CommandBuffer, _: &app::FrameInfo) -> anyhow::Result<()> { Ok(()) }
//! #     fn destroy(&mut self, _: &vulkan_demos::backend::VulkanDevice) {}
//! # }
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load();
//!     logging::init_logging(&config)?;
//!     app::run::<MyDemo>(config)
//! }
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod fps;
pub mod logging;
pub mod triangle;
