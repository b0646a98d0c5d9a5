// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Ownership mirrors creation order: instance <- surface, device <- swapchain,
// command pool, buffers. Each owner destroys its handles in Drop or destroy().

pub mod buffer;
pub mod commands;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod readback;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::GpuBuffer;
pub use commands::CommandPool;
pub use device::{QueueFamilies, VulkanDevice};
pub use instance::VulkanInstance;
pub use pipeline::{ColorPass, GraphicsPipeline, PipelineDesc, VertexLayout};
pub use readback::Readback;
pub use surface::Surface;
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use sync::{FrameSync, FramesInFlight};
pub use texture::{DecodedImage, Texture, TextureBinding};
