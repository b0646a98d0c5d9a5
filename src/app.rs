// =============================================================================
// APPLICATION - window, Vulkan setup and the frame loop shared by all demos
// =============================================================================
//
// FRAME FLOW (single thread, at most `max_frames_in_flight` frames queued):
// 1. Wait for this slot's fence (its previous submit has finished)
// 2. Acquire swapchain image (signals image_available)
// 3. Reset fence, re-record this slot's command buffer
// 4. Submit (waits image_available, signals render_finished + fence)
// 5. Present (waits render_finished)
// 6. Advance to next slot
//
// Out-of-date or suboptimal swapchains, and resize notifications, cause a
// full swapchain rebuild before the next frame. That is the only recovery.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::backend::readback::ChannelOrder;
use crate::backend::{
    surface, AcquireOutcome, CommandPool, FramesInFlight, Readback, Surface, Swapchain,
    VulkanDevice, VulkanInstance,
};
use crate::config::{self, Config, ConfigWatcher, KeyBindings};
use crate::fps::{title_with_fps, FpsCounter};

/// Name of the file the screenshot key writes
pub const SCREENSHOT_FILE: &str = "screenshot.png";

// =============================================================================
// DEMO INTERFACE
// =============================================================================

/// Everything a demo may need while creating or resizing its resources
pub struct DemoContext<'a> {
    pub device: &'a Arc<VulkanDevice>,
    pub commands: &'a CommandPool,
    pub swapchain: &'a Swapchain,
    pub config: &'a Config,
}

/// Per-frame values handed to [`Demo::record`]
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    /// Frame-in-flight slot
    pub frame_index: usize,
    pub image_index: u32,
    pub image: vk::Image,
    pub extent: vk::Extent2D,
    /// Time since the renderer started
    pub elapsed: Duration,
}

/// What a demo binary supplies; the frame loop does the rest.
///
/// Resources created in `new`/`resize` must be released in `destroy`,
/// which runs after the device is idle.
pub trait Demo: Sized {
    const TITLE: &'static str;

    /// Save the first presented frame to [`SCREENSHOT_FILE`]
    const CAPTURE_FIRST_FRAME: bool = false;

    fn new(ctx: &DemoContext<'_>) -> Result<Self>;

    /// Called after every swapchain rebuild; the device is idle
    fn resize(&mut self, ctx: &DemoContext<'_>) -> Result<()>;

    /// Record this frame's commands. The command buffer is already begun
    /// and is ended by the caller. The swapchain image must be left in
    /// PRESENT_SRC_KHR layout.
    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, frame: &FrameInfo) -> Result<()>;

    /// config.toml was edited while running
    fn config_changed(&mut self, _config: &Config) {}

    fn destroy(&mut self, device: &VulkanDevice);
}

/// Open a window and run demo `D` until the window closes.
///
/// Returns the first fatal error; the caller's `main` returning it ends the
/// process with a non-zero status.
pub fn run<D: Demo>(config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::<D>::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// =============================================================================
// RENDERER - all Vulkan state
// =============================================================================

/// IMPORTANT: Field order matters for Drop! Resources must be destroyed
/// in reverse order of creation.
struct Renderer<D: Demo> {
    demo: Option<D>,
    readback: Option<Readback>,
    command_buffers: Vec<vk::CommandBuffer>,
    frames: FramesInFlight,
    commands: CommandPool,
    swapchain: Option<Swapchain>,
    device: Arc<VulkanDevice>,
    surface: Surface,

    present_mode: vk::PresentModeKHR,
    /// Set when the window is resized or present reports out-of-date
    needs_recreate: bool,
    /// Framebuffer is 0x0; nothing can be rendered
    minimized: bool,
    capture_requested: bool,
    started: Instant,
}

impl<D: Demo> Renderer<D> {
    /// Initialize all Vulkan resources.
    ///
    /// Creation order: instance, surface, device, swapchain, command pool +
    /// buffers, sync objects, demo resources.
    fn new(window: &Window, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let title = config.title(D::TITLE);
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let extensions = surface::required_extensions(window)?;
        let instance = VulkanInstance::new(title, enable_validation, extensions)?;

        let surface = Surface::new(instance, window)?;
        let device = VulkanDevice::new(surface.instance().clone(), &surface)?;

        let size = window.inner_size();
        let present_mode = config.present_mode();
        let minimized = size.width == 0 || size.height == 0;
        let swapchain = if minimized {
            None
        } else {
            Some(Swapchain::new(
                device.clone(),
                &surface,
                size.width,
                size.height,
                present_mode,
                None,
            )?)
        };

        let commands = CommandPool::new(device.clone())?;
        let frame_count = config.graphics.max_frames_in_flight;
        let command_buffers = commands.allocate(frame_count as u32)?;
        let frames = FramesInFlight::new(&device, frame_count)?;

        let mut renderer = Self {
            demo: None,
            readback: None,
            command_buffers,
            frames,
            commands,
            swapchain,
            device,
            surface,
            present_mode,
            needs_recreate: minimized,
            minimized,
            capture_requested: D::CAPTURE_FIRST_FRAME,
            started: Instant::now(),
        };

        // The demo needs a swapchain; a window created minimized gets one
        // on the first resize
        if renderer.swapchain.is_some() {
            renderer.create_demo(config)?;
        }

        log::info!(
            "Vulkan initialized successfully ({} frames in flight)",
            renderer.frames.count()
        );
        Ok(renderer)
    }

    fn create_demo(&mut self, config: &Config) -> Result<()> {
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let ctx = DemoContext {
            device: &self.device,
            commands: &self.commands,
            swapchain,
            config,
        };
        self.demo = Some(D::new(&ctx)?);
        Ok(())
    }

    fn window_resized(&mut self, size: PhysicalSize<u32>) {
        self.minimized = size.width == 0 || size.height == 0;
        if !self.minimized {
            self.needs_recreate = true;
        }
    }

    /// Recreate swapchain after window resize.
    ///
    /// Waits for the GPU to drain, so nothing still references the old
    /// images, then builds the new swapchain from the retired one.
    fn recreate_swapchain(&mut self, window: &Window, config: &Config) -> Result<()> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;

        self.device.wait_idle()?;

        let old = self.swapchain.take();
        let swapchain = Swapchain::new(
            self.device.clone(),
            &self.surface,
            size.width,
            size.height,
            self.present_mode,
            old.as_ref(),
        )?;
        drop(old);
        self.swapchain = Some(swapchain);

        if let Some(demo) = self.demo.as_mut() {
            let ctx = DemoContext {
                device: &self.device,
                commands: &self.commands,
                swapchain: self.swapchain.as_ref().context("Swapchain not initialized")?,
                config,
            };
            demo.resize(&ctx)?;
        } else {
            self.create_demo(config)?;
        }

        self.needs_recreate = false;
        Ok(())
    }

    /// Render a single frame. Returns whether an image was presented.
    fn render_frame(&mut self, window: &Window, config: &Config) -> Result<bool> {
        // Skip rendering if minimized
        if self.minimized {
            return Ok(false);
        }

        // Handle resize if needed
        if self.needs_recreate || self.swapchain.is_none() {
            self.recreate_swapchain(window, config)?;
            if self.minimized {
                return Ok(false);
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for the frame that last used this slot
        // ─────────────────────────────────────────────────────────────────────
        self.frames.wait_current(&self.device.device)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let sync = self.frames.current();

        let (image_index, suboptimal) = match swapchain.acquire_next_image(sync.image_available)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                // Fence stays signalled, the slot is reused next frame
                log::debug!("Swapchain out of date on acquire");
                self.needs_recreate = true;
                return Ok(false);
            }
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Re-record this slot's command buffer
        // ─────────────────────────────────────────────────────────────────────
        self.frames.reset_current(&self.device.device)?;

        let device = &self.device.device;
        let cmd = self.command_buffers[self.frames.index()];
        let frame = FrameInfo {
            frame_index: self.frames.index(),
            image_index,
            image: swapchain.images[image_index as usize],
            extent: swapchain.extent,
            elapsed: self.started.elapsed(),
        };

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;
        }

        self.demo
            .as_mut()
            .context("Demo not initialized")?
            .record(device, cmd, &frame)?;

        if self.capture_requested {
            self.capture_requested = false;
            match capture_unsupported(swapchain.supports_readback(), swapchain.format) {
                Some(reason) => log::warn!("No screenshot: {}", reason),
                None => match Readback::new(&self.device, swapchain.extent, swapchain.format) {
                    Ok(readback) => {
                        readback.record_copy(device, cmd, frame.image);
                        self.readback = Some(readback);
                    }
                    Err(e) => log::warn!("No screenshot: {:#}", e),
                },
            }
        }

        unsafe { device.end_command_buffer(cmd) }.context("Failed to end command buffer")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit command buffer
        // ─────────────────────────────────────────────────────────────────────
        let sync = self.frames.current();
        let wait_semaphores = [sync.image_available];
        // Render passes write at COLOR_ATTACHMENT_OUTPUT, clears at TRANSFER
        let wait_stages =
            [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                sync.in_flight_fence,
            )
        }
        .context("Failed to submit draw command buffer")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present the image
        // ─────────────────────────────────────────────────────────────────────
        let outcome = swapchain.present(self.device.present_queue, image_index, &signal_semaphores)?;
        if suboptimal || outcome.needs_recreate() {
            log::debug!("Swapchain needs rebuild after present: {:?}", outcome);
            self.needs_recreate = true;
        }

        if let Some(readback) = self.readback.take() {
            self.frames.wait_current(&self.device.device)?;
            let path = screenshot_path();
            if let Err(e) = readback.save(&self.device, &path) {
                log::error!("Screenshot failed: {:#}", e);
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Advance to next frame
        // ─────────────────────────────────────────────────────────────────────
        self.frames.advance();

        Ok(true)
    }

    fn config_changed(&mut self, config: &Config) {
        let present_mode = config.present_mode();
        if present_mode != self.present_mode {
            self.present_mode = present_mode;
            self.needs_recreate = true;
        }
        if let Some(demo) = self.demo.as_mut() {
            demo.config_changed(config);
        }
    }
}

impl<D: Demo> Drop for Renderer<D> {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::error!("{:#}", e);
        }

        // Destroy in reverse order of creation; the remaining fields
        // (pool, swapchain, device, surface, instance) drop in order after this
        if let Some(mut demo) = self.demo.take() {
            demo.destroy(&self.device);
        }
        if let Some(readback) = self.readback.take() {
            readback.destroy(&self.device);
        }
        self.frames.destroy(&self.device.device);
    }
}

/// Why the current swapchain cannot be captured, if it cannot
fn capture_unsupported(supports_readback: bool, format: vk::Format) -> Option<String> {
    if !supports_readback {
        return Some("surface does not allow copying from swapchain images".to_string());
    }
    ChannelOrder::of(format).err().map(|e| e.to_string())
}

/// A minimized window renders nothing; sleep until the next event
fn control_flow_for(minimized: bool) -> ControlFlow {
    if minimized {
        ControlFlow::Wait
    } else {
        ControlFlow::Poll
    }
}

fn screenshot_path() -> PathBuf {
    config::executable_dir()
        .unwrap_or_default()
        .join(SCREENSHOT_FILE)
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

struct App<D: Demo> {
    config: Config,
    keys: KeyBindings,
    watcher: Option<ConfigWatcher>,
    // Dropped before the window it presents to
    renderer: Option<Renderer<D>>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,
    fps: FpsCounter,
    error: Option<anyhow::Error>,
}

impl<D: Demo> App<D> {
    fn new(config: Config) -> Self {
        let watcher = match ConfigWatcher::new(config::CONFIG_FILE) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Config hot reload disabled: {:#}", e);
                None
            }
        };

        Self {
            keys: config.key_bindings(),
            is_fullscreen: config.window.fullscreen,
            config,
            watcher,
            renderer: None,
            window: None,
            fps: FpsCounter::new(Instant::now()),
            error: None,
        }
    }

    /// Remember the error and stop the event loop; `run` hands it back
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(config) = self.watcher.as_ref().and_then(ConfigWatcher::poll) {
            self.keys = config.key_bindings();
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.config_changed(&config);
            }
            self.config = config;
        }

        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };

        match renderer.render_frame(window, &self.config) {
            Ok(true) => {
                if self.config.debug.show_fps {
                    if let Some(fps) = self.fps.tick(Instant::now()) {
                        let title = self.config.title(D::TITLE);
                        window.set_title(&title_with_fps(title, fps));
                    }
                }
            }
            Ok(false) => {}
            Err(e) => self.fail(event_loop, e),
        }

        let minimized = self.renderer.as_ref().map_or(false, |r| r.minimized);
        event_loop.set_control_flow(control_flow_for(minimized));
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let PhysicalKey::Code(key) = event.physical_key else {
            return;
        };

        if Some(key) == self.keys.quit {
            log::info!("{:?} pressed, exiting...", key);
            event_loop.exit();
        } else if Some(key) == self.keys.fullscreen {
            self.toggle_fullscreen();
        } else if Some(key) == self.keys.screenshot {
            if let Some(renderer) = self.renderer.as_mut() {
                log::info!("Capturing next frame");
                renderer.capture_requested = true;
            }
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }
}

impl<D: Demo> ApplicationHandler for App<D> {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(self.config.title(D::TITLE))
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
        self.fps = FpsCounter::new(Instant::now());
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.window_resized(size);
                }
                event_loop.set_control_flow(control_flow_for(size.width == 0 || size.height == 0));
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            _ => {}
        }
    }

    /// Request continuous redraws while there is something to show
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let minimized = self.renderer.as_ref().map_or(true, |r| r.minimized);
        if let (Some(window), false) = (self.window.as_ref(), minimized) {
            window.request_redraw();
        }
    }

    /// Tear down Vulkan while the window still exists
    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_needs_transfer_src_usage() {
        let reason = capture_unsupported(false, vk::Format::B8G8R8A8_SRGB).unwrap();
        assert!(reason.contains("copying"));
    }

    #[test]
    fn capture_of_wide_formats_is_skipped_not_fatal() {
        assert!(capture_unsupported(true, vk::Format::A2B10G10R10_UNORM_PACK32).is_some());
        assert!(capture_unsupported(true, vk::Format::R16G16B16A16_SFLOAT).is_some());
    }

    #[test]
    fn capture_of_8_bit_formats_is_allowed() {
        assert_eq!(capture_unsupported(true, vk::Format::B8G8R8A8_SRGB), None);
        assert_eq!(capture_unsupported(true, vk::Format::R8G8B8A8_UNORM), None);
    }

    #[test]
    fn minimized_window_waits_for_events() {
        assert_eq!(control_flow_for(true), ControlFlow::Wait);
        assert_eq!(control_flow_for(false), ControlFlow::Poll);
    }
}
