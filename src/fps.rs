// Title-bar frame rate
//
// Frames are counted over windows of at least one second; the rate is
// reported once per window.

use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
        }
    }

    /// Count one frame. Returns frames per second once a full window has
    /// passed, then starts a new window.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.window_start = now;
        self.frames = 0;
        Some(fps)
    }
}

/// `"<title>    <fps> FPS"` with one decimal
pub fn title_with_fps(title: &str, fps: f64) -> String {
    format!("{}    {:.1} FPS", title, fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_reported_inside_the_first_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for ms in [16, 33, 500, 999] {
            assert_eq!(counter.tick(start + Duration::from_millis(ms)), None);
        }
    }

    #[test]
    fn rate_is_frames_over_elapsed() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for i in 1..60 {
            assert_eq!(counter.tick(start + Duration::from_millis(i * 10)), None);
        }
        // 60th frame lands at 1.2 s
        let fps = counter.tick(start + Duration::from_millis(1200)).unwrap();
        assert!((fps - 50.0).abs() < 1e-9, "{}", fps);
    }

    #[test]
    fn window_restarts_after_report() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        let first = start + Duration::from_secs(1);
        assert_eq!(counter.tick(first), Some(1.0));

        assert_eq!(counter.tick(first + Duration::from_millis(500)), None);
        let fps = counter.tick(first + Duration::from_secs(2)).unwrap();
        assert!((fps - 1.0).abs() < 1e-9);
    }

    #[test]
    fn title_format() {
        assert_eq!(title_with_fps("Vulkan Window", 59.94), "Vulkan Window    59.9 FPS");
        assert_eq!(title_with_fps("Demo", 120.0), "Demo    120.0 FPS");
    }
}
