// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.
// Every demo reads the same file; none of them require it.

use anyhow::{Context, Result};
use ash::vk;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use winit::keyboard::KeyCode;

/// File looked up in the working directory by [`Config::load`]
pub const CONFIG_FILE: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
    pub assets: AssetsConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Overrides the demo's own title when set
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: None,
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
        }
    }
}

/// Control key bindings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub screenshot_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            screenshot_key: "F12".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

/// Where demos look for textures
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    pub directory: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            directory: "assets".to_string(),
        }
    }
}

/// Resolved key bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    pub fullscreen: Option<KeyCode>,
    pub screenshot: Option<KeyCode>,
    pub quit: Option<KeyCode>,
}

/// Upper bound on frames in flight; more than this only adds latency here.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 3;

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the frame loop cannot honour
    pub fn validate(&self) -> Result<()> {
        let frames = self.graphics.max_frames_in_flight;
        if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT_LIMIT {
            anyhow::bail!(
                "graphics.max_frames_in_flight must be between 1 and {}, got {}",
                MAX_FRAMES_IN_FLIGHT_LIMIT,
                frames
            );
        }
        if self.window.width == 0 || self.window.height == 0 {
            anyhow::bail!(
                "window size must be non-zero, got {}x{}",
                self.window.width,
                self.window.height
            );
        }
        Ok(())
    }

    /// Window title, preferring the configured one
    pub fn title<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.window.title.as_deref().unwrap_or(fallback)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Resolve the configured key names
    pub fn key_bindings(&self) -> KeyBindings {
        let resolve = |action: &str, name: &str| {
            let key = parse_key(name);
            if key.is_none() {
                log::warn!("Unknown key '{}' for {}, binding disabled", name, action);
            }
            key
        };

        KeyBindings {
            fullscreen: resolve("fullscreen", &self.controls.fullscreen_key),
            screenshot: resolve("screenshot", &self.controls.screenshot_key),
            quit: resolve("quit", &self.controls.quit_key),
        }
    }

    /// Directory holding textures: next to the executable if it exists there,
    /// otherwise relative to the working directory
    pub fn assets_dir(&self) -> PathBuf {
        let configured = Path::new(&self.assets.directory);
        if configured.is_absolute() {
            return configured.to_path_buf();
        }

        if let Some(exe_dir) = executable_dir() {
            let candidate = exe_dir.join(configured);
            if candidate.is_dir() {
                return candidate;
            }
        }

        configured.to_path_buf()
    }
}

/// Directory of the running executable
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Map a key name from config.toml to a winit key code
pub fn parse_key(name: &str) -> Option<KeyCode> {
    let name = name.trim();
    let key = match name.to_ascii_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        "printscreen" => KeyCode::PrintScreen,
        single if single.len() == 1 => return parse_char_key(single.as_bytes()[0]),
        _ => return None,
    };
    Some(key)
}

fn parse_char_key(c: u8) -> Option<KeyCode> {
    const LETTERS: [KeyCode; 26] = [
        KeyCode::KeyA, KeyCode::KeyB, KeyCode::KeyC, KeyCode::KeyD, KeyCode::KeyE,
        KeyCode::KeyF, KeyCode::KeyG, KeyCode::KeyH, KeyCode::KeyI, KeyCode::KeyJ,
        KeyCode::KeyK, KeyCode::KeyL, KeyCode::KeyM, KeyCode::KeyN, KeyCode::KeyO,
        KeyCode::KeyP, KeyCode::KeyQ, KeyCode::KeyR, KeyCode::KeyS, KeyCode::KeyT,
        KeyCode::KeyU, KeyCode::KeyV, KeyCode::KeyW, KeyCode::KeyX, KeyCode::KeyY,
        KeyCode::KeyZ,
    ];
    const DIGITS: [KeyCode; 10] = [
        KeyCode::Digit0, KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3, KeyCode::Digit4,
        KeyCode::Digit5, KeyCode::Digit6, KeyCode::Digit7, KeyCode::Digit8, KeyCode::Digit9,
    ];

    match c {
        b'a'..=b'z' => Some(LETTERS[(c - b'a') as usize]),
        b'0'..=b'9' => Some(DIGITS[(c - b'0') as usize]),
        _ => None,
    }
}

// =============================================================================
// HOT RELOAD
// =============================================================================

/// Watches config.toml and hands back a freshly parsed config after edits.
///
/// The parent directory is watched rather than the file itself, since most
/// editors replace the file on save.
pub struct ConfigWatcher {
    path: PathBuf,
    events: Receiver<notify::Result<notify::Event>>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        })
        .context("Failed to create config file watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;

        log::info!("Watching {:?} for changes", path);

        Ok(Self {
            path,
            events: rx,
            _watcher: watcher,
        })
    }

    /// Drain pending file events; returns the new config if our file changed
    /// and still parses. Parse errors are logged and the old config stays.
    pub fn poll(&self) -> Option<Config> {
        let mut changed = false;
        while let Ok(event) = self.events.try_recv() {
            match event {
                Ok(event) => {
                    let touches_config =
                        event.paths.iter().any(|p| p.ends_with(self.file_name()));
                    changed |= touches_config && (event.kind.is_modify() || event.kind.is_create());
                }
                Err(e) => log::warn!("Config watcher error: {}", e),
            }
        }

        if !changed {
            return None;
        }

        match Self::reload(&self.path) {
            Ok(config) => {
                log::info!("Reloaded {:?}", self.path);
                Some(config)
            }
            Err(e) => {
                log::warn!("Ignoring config change: {:#}", e);
                None
            }
        }
    }

    fn file_name(&self) -> &Path {
        self.path
            .file_name()
            .map(Path::new)
            .unwrap_or(self.path.as_path())
    }

    fn reload(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Config::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_reports_edited_config() {
        let dir = std::env::temp_dir().join(format!("config-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, "[graphics]\nclear_color = [0.0, 0.0, 0.0, 1.0]\n").unwrap();

        let watcher = ConfigWatcher::new(&path).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(100));
        std::fs::write(&path, "[graphics]\nclear_color = [1.0, 0.0, 0.0, 1.0]\n").unwrap();

        let mut reloaded = None;
        for _ in 0..50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            reloaded = watcher.poll();
            if reloaded.is_some() {
                break;
            }
        }
        std::fs::remove_dir_all(&dir).unwrap();

        let config = reloaded.expect("edit was not reported");
        assert_eq!(config.graphics.clear_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn watcher_ignores_other_files() {
        let dir = std::env::temp_dir().join(format!("config-watch-other-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let watcher = ConfigWatcher::new(dir.join(CONFIG_FILE)).unwrap();

        std::fs::write(dir.join("notes.txt"), "hello").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let result = watcher.poll();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(result, None);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Hello"
            width = 800

            [graphics]
            clear_color = [1.0, 0.0, 0.0, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.title("Fallback"), "Hello");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.graphics.present_mode, "fifo");
        assert_eq!(config.controls, ControlsConfig::default());
    }

    #[test]
    fn title_falls_back_to_demo_title() {
        assert_eq!(Config::default().title("Triangle"), "Triangle");
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let err = Config::parse("[graphics]\nmax_frames_in_flight = 0").unwrap_err();
        assert!(err.to_string().contains("max_frames_in_flight"));
    }

    #[test]
    fn too_many_frames_in_flight_is_rejected() {
        assert!(Config::parse("[graphics]\nmax_frames_in_flight = 8").is_err());
        assert!(Config::parse("[graphics]\nmax_frames_in_flight = 3").is_ok());
    }

    #[test]
    fn zero_window_size_is_rejected() {
        assert!(Config::parse("[window]\nheight = 0").is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn present_mode_names() {
        let mut config = Config::default();
        for (name, mode) in [
            ("immediate", vk::PresentModeKHR::IMMEDIATE),
            ("Mailbox", vk::PresentModeKHR::MAILBOX),
            ("fifo", vk::PresentModeKHR::FIFO),
            ("FIFO_RELAXED", vk::PresentModeKHR::FIFO_RELAXED),
            ("vsync-please", vk::PresentModeKHR::FIFO),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.present_mode(), mode, "{}", name);
        }
    }

    #[test]
    fn key_names() {
        assert_eq!(parse_key("Escape"), Some(KeyCode::Escape));
        assert_eq!(parse_key("esc"), Some(KeyCode::Escape));
        assert_eq!(parse_key("F11"), Some(KeyCode::F11));
        assert_eq!(parse_key(" f12 "), Some(KeyCode::F12));
        assert_eq!(parse_key("q"), Some(KeyCode::KeyQ));
        assert_eq!(parse_key("Z"), Some(KeyCode::KeyZ));
        assert_eq!(parse_key("7"), Some(KeyCode::Digit7));
        assert_eq!(parse_key("F13"), None);
        assert_eq!(parse_key("?"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn default_bindings_resolve() {
        let keys = Config::default().key_bindings();
        assert_eq!(keys.fullscreen, Some(KeyCode::F11));
        assert_eq!(keys.screenshot, Some(KeyCode::F12));
        assert_eq!(keys.quit, Some(KeyCode::Escape));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn absolute_assets_dir_is_kept() {
        let mut config = Config::default();
        let dir = std::env::temp_dir();
        config.assets.directory = dir.to_string_lossy().into_owned();
        assert_eq!(config.assets_dir(), dir);
    }
}
