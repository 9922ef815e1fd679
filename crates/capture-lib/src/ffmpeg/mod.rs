//! FFmpeg implementation of the capture backend.

mod conversion;
mod decoder;
mod dictionary;
mod hardware;
mod input;
mod private_options;

use std::sync::Arc;

use ffmpeg_next::util::log::Level;

use crate::camera::{EngineError, MediaBackend, OpenClock, OptionDictionary, SourceDescriptor};

pub use conversion::ConversionContext;
pub use decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
pub use hardware::HardwareContext;
pub use input::FormatHandle;
pub use private_options::{codec_private_options, CodecOption, CodecPrivateOptions, OptionValue};

/// Initializes FFmpeg and its network layer. FFmpeg's own log output follows
/// the Rust log level: debug and trace pass through, info keeps FFmpeg's
/// warnings, anything quieter silences it.
pub fn init() -> Result<(), ffmpeg_next::Error> {
    ffmpeg_next::init()?;
    ffmpeg_next::format::network::init();
    sync_log_level();
    Ok(())
}

pub fn sync_log_level() {
    let level = match log::max_level() {
        log::LevelFilter::Trace => Level::Trace,
        log::LevelFilter::Debug => Level::Debug,
        log::LevelFilter::Info => Level::Warning,
        _ => Level::Quiet,
    };
    ffmpeg_next::util::log::set_level(level);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    type Input = FormatHandle;

    fn open_input(
        &self,
        source: &SourceDescriptor,
        options: &mut OptionDictionary,
        clock: &Arc<OpenClock>,
    ) -> Result<FormatHandle, EngineError> {
        FormatHandle::open(source, options, clock)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use capture_types::PixelLayout;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::camera::{CameraConfig, CaptureEngine, DecoderCandidate, ReadFailure, ReopenMode};

    const CLIP_WIDTH: usize = 32;
    const CLIP_HEIGHT: usize = 24;
    const CLIP_FRAMES: u8 = 3;

    /// Uncompressed 4:2:0 clip whose luma brightens every frame.
    fn write_clip() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".y4m").tempfile().unwrap();
        writeln!(
            file,
            "YUV4MPEG2 W{} H{} F5:1 Ip A1:1 C420jpeg",
            CLIP_WIDTH, CLIP_HEIGHT
        )
        .unwrap();
        let chroma = (CLIP_WIDTH / 2) * (CLIP_HEIGHT / 2);
        for i in 0..CLIP_FRAMES {
            file.write_all(b"FRAME\n").unwrap();
            file.write_all(&vec![40 + 60 * i; CLIP_WIDTH * CLIP_HEIGHT])
                .unwrap();
            file.write_all(&vec![128; chroma * 2]).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn file_source_is_read_to_the_end_and_reopened() {
        init().unwrap();
        let clip = write_clip();
        let address = clip.path().to_string_lossy().into_owned();

        let config = CameraConfig::new(16, 12, PixelLayout::Gray8)
            .with_open_timeout(1)
            .with_reopen_mode(ReopenMode::Inline)
            .with_hardware_acceleration(false);
        let engine =
            CaptureEngine::new(FfmpegBackend, SourceDescriptor::new(address, "", ""), config)
                .unwrap();
        engine.prime().unwrap();
        assert!(engine.is_ready());
        assert_eq!(engine.decoder(), Some(DecoderCandidate::Software));

        let mut dst = vec![0u8; engine.frame_size()];
        let mut last_pts = None;
        let mut lumas = Vec::new();
        let mut generation = 0;
        loop {
            match engine.capture() {
                Ok(packet) => {
                    if let (Some(previous), Some(pts)) = (last_pts, packet.pts) {
                        assert!(pts >= previous, "pts went from {} to {}", previous, pts);
                    }
                    last_pts = packet.pts.or(last_pts);
                    generation = packet.generation;

                    if let Some(frame) = engine.decode_frame(&packet, &mut dst).unwrap() {
                        assert_eq!((frame.width, frame.height), (16, 12));
                        lumas.push(dst[0]);
                    }
                }
                Err(EngineError::Read { failure, reopening }) => {
                    assert_eq!(failure, ReadFailure::EndOfStream);
                    assert!(reopening);
                    break;
                }
                Err(e) => panic!("unexpected capture error: {}", e),
            }
        }

        assert_eq!(lumas.len(), usize::from(CLIP_FRAMES));
        assert!(lumas.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", lumas);

        // The inline reopen has already run, so the file plays again in a
        // new session.
        assert!(engine.is_ready());
        let replayed = engine.capture().unwrap();
        assert!(replayed.generation > generation);
        let frame = engine.decode_frame(&replayed, &mut dst).unwrap();
        assert!(frame.is_some());
        assert_eq!(dst[0], lumas[0]);

        engine.shutdown();
    }

    #[test]
    fn missing_file_is_not_ready() {
        init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("absent.y4m").to_string_lossy().into_owned();

        let config = CameraConfig::new(16, 12, PixelLayout::Gray8)
            .with_open_timeout(1)
            .with_hardware_acceleration(false);
        let engine =
            CaptureEngine::new(FfmpegBackend, SourceDescriptor::new(address, "", ""), config)
                .unwrap();
        engine.prime().unwrap();
        assert!(!engine.is_ready());
        engine.shutdown();
    }
}
