pub mod camera;
pub mod ffmpeg;

use camera::{CameraConfig, CaptureEngine, EngineError, Packet, ReopenMode, SourceDescriptor};
use capture_types::{
    CaptureLibError, CaptureLibInit, CapturedPacket, CapturedPacketResult, DeliveredFrame,
    DeliveredFrameResult, StreamCamera, StreamCameraOptions,
};
use ffmpeg::FfmpegBackend;

/// Upper bound on packets read while waiting for one picture.
const MAX_PACKETS_PER_FRAME: usize = 512;

impl From<EngineError> for CaptureLibError {
    fn from(error: EngineError) -> Self {
        let message = error.to_string().into();
        match error {
            EngineError::Configuration(detail) => {
                CaptureLibError::ConfigurationError(detail.into())
            }
            EngineError::Failed(_) => CaptureLibError::ConfigurationError(message),
            EngineError::NotReady | EngineError::ReopenInFlight => {
                CaptureLibError::NotReady(message)
            }
            EngineError::Read { failure, .. } => {
                CaptureLibError::ReadError(failure.to_string().into())
            }
            EngineError::Open { .. }
            | EngineError::Decode(_)
            | EngineError::FormatNegotiation(_) => CaptureLibError::FFmpegError(message),
            EngineError::ShutDown => CaptureLibError::UnknownError(message),
        }
    }
}

#[stabby::stabby]
#[stabby::export]
pub fn init_capture_lib() -> stabby::result::Result<CaptureLibInit, CaptureLibError> {
    match ffmpeg::init() {
        Ok(_) => Ok(CaptureLibInit {}).into(),
        Err(e) => Err(CaptureLibError::FFmpegError(e.to_string().into())).into(),
    }
}

#[stabby::stabby]
#[stabby::export]
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
    ffmpeg::sync_log_level();
}

struct CapturedPacketWrapper {
    inner: Packet,
}

impl CapturedPacket for CapturedPacketWrapper {
    extern "C" fn get_stream_index(&self) -> u32 {
        self.inner.stream_index as u32
    }

    extern "C" fn get_is_video(&self) -> i32 {
        self.inner.is_video() as i32
    }

    extern "C" fn get_pts(&self) -> i64 {
        self.inner.pts.unwrap_or(i64::MIN)
    }

    extern "C" fn get_dts(&self) -> i64 {
        self.inner.dts.unwrap_or(i64::MIN)
    }

    extern "C" fn get_duration(&self) -> i64 {
        self.inner.duration
    }

    extern "C" fn get_time_base_num(&self) -> i32 {
        self.inner.time_base.0
    }

    extern "C" fn get_time_base_den(&self) -> i32 {
        self.inner.time_base.1
    }

    extern "C" fn get_key_frame(&self) -> i32 {
        self.inner.is_keyframe as i32
    }

    extern "C" fn data_ptr(&self) -> *const u8 {
        self.inner.data.as_ptr()
    }

    extern "C" fn data_len(&self) -> usize {
        self.inner.data.len()
    }
}

struct DeliveredFrameWrapper {
    width: u32,
    height: u32,
    pts: i64,
    data: Vec<u8>,
}

impl DeliveredFrame for DeliveredFrameWrapper {
    extern "C" fn get_width(&self) -> u32 {
        self.width
    }

    extern "C" fn get_height(&self) -> u32 {
        self.height
    }

    extern "C" fn get_pts(&self) -> i64 {
        self.pts
    }

    extern "C" fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    extern "C" fn data_len(&self) -> usize {
        self.data.len()
    }
}

struct StreamCameraWrapper {
    engine: CaptureEngine<FfmpegBackend>,
    frame_buffer: Vec<u8>,
}

impl StreamCameraWrapper {
    fn next_frame(&mut self) -> Result<DeliveredFrameWrapper, EngineError> {
        for _ in 0..MAX_PACKETS_PER_FRAME {
            let packet = self.engine.capture()?;
            if let Some(frame) = self.engine.decode_frame(&packet, &mut self.frame_buffer)? {
                return Ok(DeliveredFrameWrapper {
                    width: frame.width,
                    height: frame.height,
                    pts: frame.pts.unwrap_or(i64::MIN),
                    data: self.frame_buffer.clone(),
                });
            }
        }
        Err(EngineError::decode(format!(
            "no picture after {} packets",
            MAX_PACKETS_PER_FRAME
        )))
    }
}

impl StreamCamera for StreamCameraWrapper {
    extern "C" fn prime(&mut self) -> stabby::result::Result<(), CaptureLibError> {
        self.engine.prime().map_err(CaptureLibError::from).into()
    }

    extern "C" fn pre_capture(&mut self) -> stabby::result::Result<(), CaptureLibError> {
        self.engine.pre_capture().map_err(CaptureLibError::from).into()
    }

    extern "C" fn capture(&mut self) -> CapturedPacketResult {
        match self.engine.capture() {
            Ok(packet) => {
                let wrapper = CapturedPacketWrapper { inner: packet };
                Ok(stabby::boxed::Box::new(wrapper).into()).into()
            }
            Err(e) => Err(CaptureLibError::from(e)).into(),
        }
    }

    extern "C" fn capture_frame(&mut self) -> DeliveredFrameResult {
        match self.next_frame() {
            Ok(frame) => Ok(stabby::boxed::Box::new(frame).into()).into(),
            Err(e) => Err(CaptureLibError::from(e)).into(),
        }
    }

    extern "C" fn post_capture(&mut self) -> stabby::result::Result<(), CaptureLibError> {
        self.engine.post_capture().map_err(CaptureLibError::from).into()
    }

    extern "C" fn shutdown(&mut self) {
        self.engine.shutdown();
    }

    extern "C" fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }
}

fn camera_config(options: &StreamCameraOptions) -> CameraConfig {
    let reopen_mode = if options.detached_reopen {
        ReopenMode::Detached
    } else {
        ReopenMode::Inline
    };
    CameraConfig::new(options.width, options.height, options.pixel_layout)
        .with_audio(options.capture_audio)
        .with_open_timeout(u64::from(options.open_timeout_secs))
        .with_reopen_mode(reopen_mode)
        .with_hardware_acceleration(options.hardware_acceleration)
}

#[stabby::stabby]
#[stabby::export]
pub fn new_stream_camera(
    options: StreamCameraOptions,
) -> stabby::result::Result<stabby::dynptr!(stabby::boxed::Box<dyn StreamCamera>), CaptureLibError>
{
    let config = camera_config(&options);
    let source = SourceDescriptor::new(
        options.source.to_string(),
        &options.method.to_string(),
        options.options.to_string(),
    );

    match CaptureEngine::new(FfmpegBackend, source, config) {
        Ok(engine) => {
            let frame_buffer = vec![0; engine.frame_size()];
            let wrapper = StreamCameraWrapper {
                engine,
                frame_buffer,
            };
            Ok(stabby::boxed::Box::new(wrapper).into()).into()
        }
        Err(e) => Err(CaptureLibError::from(e)).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_types::PixelLayout;

    fn options(detached: bool) -> StreamCameraOptions {
        StreamCameraOptions {
            source: "rtsp://camera.local/stream".into(),
            method: "rtpRtsp".into(),
            options: "".into(),
            width: 320,
            height: 240,
            pixel_layout: PixelLayout::Gray8,
            capture_audio: true,
            open_timeout_secs: 7,
            detached_reopen: detached,
            hardware_acceleration: false,
        }
    }

    #[test]
    fn options_map_onto_config() {
        let config = camera_config(&options(false));
        assert_eq!(config.reopen_mode, ReopenMode::Inline);
        assert_eq!(config.open_timeout_secs, 7);
        assert!(config.capture_audio);
        assert!(!config.hardware_acceleration);
        assert_eq!(config.output_format().frame_size(), Some(320 * 240));

        assert_eq!(camera_config(&options(true)).reopen_mode, ReopenMode::Detached);
    }

    #[test]
    fn oversized_output_is_rejected_without_panicking() {
        let mut huge = options(false);
        huge.width = u32::MAX;
        huge.height = u32::MAX;
        huge.pixel_layout = PixelLayout::Rgba;

        let created = std::panic::catch_unwind(|| {
            let result: Result<_, _> = new_stream_camera(huge).into();
            result.err()
        })
        .expect("new_stream_camera must not panic");
        let err = created.expect("oversized output should be rejected");
        assert!(err.is_fatal());
    }

    #[test]
    fn engine_errors_keep_their_kind_across_the_boundary() {
        assert!(CaptureLibError::from(EngineError::NotReady).is_not_ready());
        assert!(CaptureLibError::from(EngineError::configuration("bad size")).is_fatal());
        let read = CaptureLibError::from(EngineError::Read {
            failure: camera::ReadFailure::EndOfStream,
            reopening: true,
        });
        assert_eq!(read.to_string(), "read failed: end of stream");
    }
}
