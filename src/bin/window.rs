// Window demo: no rendering, just a window with the frame rate in its title.
// Also reports how many Vulkan instance extensions the loader exposes.

use anyhow::{Context, Result};
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use vulkan_demos::config::{Config, KeyBindings};
use vulkan_demos::fps::{title_with_fps, FpsCounter};
use vulkan_demos::logging;

const TITLE: &str = "Vulkan Window";

struct WindowDemo {
    config: Config,
    keys: KeyBindings,
    window: Option<Window>,
    is_fullscreen: bool,
    fps: FpsCounter,
    error: Option<anyhow::Error>,
}

impl ApplicationHandler for WindowDemo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(self.config.title(TITLE))
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        match event_loop.create_window(attributes) {
            Ok(window) => {
                if self.is_fullscreen {
                    window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                }
                self.window = Some(window);
                self.fps = FpsCounter::new(Instant::now());
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            Err(e) => {
                self.error = Some(anyhow::anyhow!("Failed to create window: {}", e));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                if let (Some(window), true) = (self.window.as_ref(), self.config.debug.show_fps) {
                    if let Some(fps) = self.fps.tick(Instant::now()) {
                        window.set_title(&title_with_fps(self.config.title(TITLE), fps));
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                if Some(key) == self.keys.quit {
                    event_loop.exit();
                } else if Some(key) == self.keys.fullscreen {
                    if let Some(window) = self.window.as_ref() {
                        self.is_fullscreen = !self.is_fullscreen;
                        window.set_fullscreen(self.is_fullscreen.then_some(Fullscreen::Borderless(None)));
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn count_instance_extensions() -> Result<usize> {
    let entry = unsafe { ash::Entry::load() }
        .context("Failed to load Vulkan library. Is Vulkan installed?")?;
    let extensions = entry
        .enumerate_instance_extension_properties(None)
        .context("Failed to enumerate instance extensions")?;
    Ok(extensions.len())
}

fn main() -> Result<()> {
    let config = Config::load();
    logging::init_logging(&config)?;

    log::info!("{} instance extensions supported", count_instance_extensions()?);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut demo = WindowDemo {
        keys: config.key_bindings(),
        is_fullscreen: config.window.fullscreen,
        config,
        window: None,
        fps: FpsCounter::new(Instant::now()),
        error: None,
    };
    event_loop.run_app(&mut demo).context("Event loop failed")?;

    match demo.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
