use stabby::boxed::Box;
use stabby::dynptr;
use stabby::result::Result;
use stabby::string::String;

/// Pixel layout of frames delivered to the caller.
#[stabby::stabby]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgba,  // packed RGBA, 4 bytes per pixel
    Rgb24, // packed RGB, 3 bytes per pixel
    Gray8, // 8-bit grayscale
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Rgba => 4,
            PixelLayout::Rgb24 => 3,
            PixelLayout::Gray8 => 1,
        }
    }

    /// Number of bytes a tightly packed frame of this layout occupies, or
    /// `None` when that does not fit in `usize`.
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rgba" | "rgb32" => Some(PixelLayout::Rgba),
            "rgb" | "rgb24" => Some(PixelLayout::Rgb24),
            "gray" | "gray8" | "grey" => Some(PixelLayout::Gray8),
            _ => None,
        }
    }
}

#[stabby::stabby]
#[repr(stabby)]
#[derive(Debug, Clone)]
pub enum CaptureLibError {
    FFmpegError(String),
    ConfigurationError(String),
    NotReady(String),
    ReadError(String),
    UnknownError(String),
}

impl std::fmt::Display for CaptureLibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let output = self.match_ref(
            |e| format!("ffmpeg error: {}", e),
            |e| format!("configuration error: {}", e),
            |e| format!("not ready: {}", e),
            |e| format!("read failed: {}", e),
            |e| e.to_string(),
        );
        write!(f, "{}", output)
    }
}

impl CaptureLibError {
    /// True for errors that will not go away by retrying.
    pub fn is_fatal(&self) -> bool {
        self.match_ref(|_| false, |_| true, |_| false, |_| false, |_| false)
    }

    pub fn is_not_ready(&self) -> bool {
        self.match_ref(|_| false, |_| false, |_| true, |_| false, |_| false)
    }
}

/// One coded data unit read from the source, tagged with its stream and timing.
#[stabby::stabby]
pub trait CapturedPacket {
    extern "C" fn get_stream_index(&self) -> u32;
    extern "C" fn get_is_video(&self) -> i32;
    extern "C" fn get_pts(&self) -> i64;
    extern "C" fn get_dts(&self) -> i64;
    extern "C" fn get_duration(&self) -> i64;
    extern "C" fn get_time_base_num(&self) -> i32;
    extern "C" fn get_time_base_den(&self) -> i32;
    extern "C" fn get_key_frame(&self) -> i32;
    extern "C" fn data_ptr(&self) -> *const u8;
    extern "C" fn data_len(&self) -> usize;
}

pub type CapturedPacketResult = Result<dynptr!(Box<dyn CapturedPacket>), CaptureLibError>;

/// A decoded frame converted to the requested pixel layout and size.
#[stabby::stabby]
pub trait DeliveredFrame {
    extern "C" fn get_width(&self) -> u32;
    extern "C" fn get_height(&self) -> u32;
    extern "C" fn get_pts(&self) -> i64;
    extern "C" fn data_ptr(&self) -> *const u8;
    extern "C" fn data_len(&self) -> usize;
}

pub type DeliveredFrameResult = Result<dynptr!(Box<dyn DeliveredFrame>), CaptureLibError>;

#[stabby::stabby]
#[derive(Debug, Clone)]
pub struct StreamCameraOptions {
    pub source: String,
    pub method: String,
    pub options: String,
    pub width: u32,
    pub height: u32,
    pub open_timeout_secs: u32,
    pub pixel_layout: PixelLayout,
    pub capture_audio: bool,
    pub detached_reopen: bool,
    pub hardware_acceleration: bool,
}

#[stabby::stabby]
pub trait StreamCamera {
    extern "C" fn prime(&mut self) -> Result<(), CaptureLibError>;
    extern "C" fn pre_capture(&mut self) -> Result<(), CaptureLibError>;
    extern "C" fn capture(&mut self) -> CapturedPacketResult;
    extern "C" fn capture_frame(&mut self) -> DeliveredFrameResult;
    extern "C" fn post_capture(&mut self) -> Result<(), CaptureLibError>;
    extern "C" fn shutdown(&mut self);
    extern "C" fn is_ready(&self) -> bool;
}

#[stabby::stabby]
pub struct CaptureLibInit {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_matches_layout() {
        assert_eq!(PixelLayout::Rgba.frame_size(640, 480), Some(640 * 480 * 4));
        assert_eq!(PixelLayout::Rgb24.frame_size(640, 480), Some(640 * 480 * 3));
        assert_eq!(PixelLayout::Gray8.frame_size(640, 480), Some(640 * 480));
        assert_eq!(PixelLayout::Gray8.frame_size(0, 480), Some(0));
    }

    #[test]
    fn oversized_frames_do_not_overflow() {
        let size = std::panic::catch_unwind(|| PixelLayout::Rgba.frame_size(u32::MAX, u32::MAX))
            .expect("frame_size must not panic");
        assert_eq!(size, None);
        assert_eq!(
            PixelLayout::Gray8.frame_size(u32::MAX, 1),
            Some(u32::MAX as usize)
        );
    }

    #[test]
    fn layout_names() {
        assert_eq!(PixelLayout::from_name("RGB24"), Some(PixelLayout::Rgb24));
        assert_eq!(PixelLayout::from_name("rgba"), Some(PixelLayout::Rgba));
        assert_eq!(PixelLayout::from_name("gray8"), Some(PixelLayout::Gray8));
        assert_eq!(PixelLayout::from_name("yuv420p"), None);
    }

    #[test]
    fn error_display_and_kind() {
        let e = CaptureLibError::ConfigurationError("image size mismatch".into());
        assert_eq!(e.to_string(), "configuration error: image size mismatch");
        assert!(e.is_fatal());

        let e = CaptureLibError::NotReady("reopening".into());
        assert!(e.is_not_ready());
        assert!(!e.is_fatal());
    }
}
