use capture_types::PixelLayout;

use super::delivery::OutputFormat;

pub const DEFAULT_OPEN_TIMEOUT_SECS: u64 = 10;

/// Where the close/backoff/open loop runs after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReopenMode {
    /// On the capture caller's thread, which blocks until the source is back.
    Inline,
    /// On one background worker owned by the engine.
    #[default]
    Detached,
}

/// What to do with read errors that are not end-of-stream or a known
/// transport disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadErrorPolicy {
    #[default]
    Reopen,
    FailOnly,
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_layout: PixelLayout,
    pub capture_audio: bool,
    /// Ceiling for one open attempt, and the reconnect pacing interval.
    pub open_timeout_secs: u64,
    pub reopen_mode: ReopenMode,
    pub read_error_policy: ReadErrorPolicy,
    pub hardware_acceleration: bool,
    /// Size of the caller's frame buffer, when it is allocated elsewhere.
    pub frame_buffer_size: Option<usize>,
}

impl CameraConfig {
    pub fn new(width: u32, height: u32, pixel_layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            pixel_layout,
            capture_audio: false,
            open_timeout_secs: DEFAULT_OPEN_TIMEOUT_SECS,
            reopen_mode: ReopenMode::default(),
            read_error_policy: ReadErrorPolicy::default(),
            hardware_acceleration: true,
            frame_buffer_size: None,
        }
    }

    pub fn with_audio(mut self, capture_audio: bool) -> Self {
        self.capture_audio = capture_audio;
        self
    }

    pub fn with_open_timeout(mut self, secs: u64) -> Self {
        self.open_timeout_secs = secs;
        self
    }

    pub fn with_reopen_mode(mut self, mode: ReopenMode) -> Self {
        self.reopen_mode = mode;
        self
    }

    pub fn with_read_error_policy(mut self, policy: ReadErrorPolicy) -> Self {
        self.read_error_policy = policy;
        self
    }

    pub fn with_hardware_acceleration(mut self, enabled: bool) -> Self {
        self.hardware_acceleration = enabled;
        self
    }

    pub fn with_frame_buffer_size(mut self, size: usize) -> Self {
        self.frame_buffer_size = Some(size);
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat {
            width: self.width,
            height: self.height,
            layout: self.pixel_layout,
        }
    }
}

impl Default for CameraConfig {
    /// VGA, packed RGB.
    fn default() -> Self {
        Self::new(640, 480, PixelLayout::Rgb24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_vga_rgb() {
        let config = CameraConfig::default();
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.pixel_layout, PixelLayout::Rgb24);
        assert_eq!(config.open_timeout_secs, DEFAULT_OPEN_TIMEOUT_SECS);
        assert_eq!(config.reopen_mode, ReopenMode::Detached);
        assert_eq!(config.read_error_policy, ReadErrorPolicy::Reopen);
        assert!(config.hardware_acceleration);
        assert_eq!(config.output_format().frame_size(), Some(640 * 480 * 3));
    }
}
