use std::path::PathBuf;

pub use capture_types;
use capture_types::{CaptureLibError, CaptureLibInit, StreamCamera, StreamCameraOptions};
use stabby::libloading::StabbyLibrary;


#[derive(Debug)]
pub enum CaptureClientError {
    CaptureLibError(CaptureLibError),
    UnknownError(String),
}

impl From<CaptureLibError> for CaptureClientError {
    fn from(error: CaptureLibError) -> Self {
        CaptureClientError::CaptureLibError(error)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CaptureClientError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CaptureClientError::UnknownError(error.to_string())
    }
}

impl std::fmt::Display for CaptureClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureClientError::CaptureLibError(e) => write!(f, "{}", e),
            CaptureClientError::UnknownError(s) => write!(f, "Unknown error: {}", s),
        }
    }
}
impl std::error::Error for CaptureClientError {}

type NewStreamCamera = extern "C" fn(
    StreamCameraOptions,
) -> stabby::result::Result<
    stabby::dynptr!(stabby::boxed::Box<dyn StreamCamera>),
    CaptureLibError,
>;

pub struct CaptureClient {
    // Keeps the symbols below valid.
    _library: libloading::Library,
    new_stream_camera: NewStreamCamera,
}

impl CaptureClient {
    pub fn new_stream_camera(
        &self,
        options: StreamCameraOptions,
    ) -> Result<stabby::dynptr!(stabby::boxed::Box<dyn StreamCamera>), CaptureClientError> {
        let result: Result<_, _> = (self.new_stream_camera)(options).into();
        result.map_err(CaptureClientError::from)
    }
}

pub fn load(lib: &PathBuf) -> Result<CaptureClient, CaptureClientError> {
    let library = unsafe { libloading::Library::new(lib) }
        .map_err(|e| CaptureClientError::UnknownError(e.to_string()))?;

    let init_logging = unsafe { library.get_stabbied::<extern "C" fn()>(b"init_logging") }?;
    init_logging();

    let init_capture_lib = unsafe {
        library.get_stabbied::<extern "C" fn() -> stabby::result::Result<
            CaptureLibInit,
            CaptureLibError,
        >>(b"init_capture_lib")
    }?;
    let init: Result<_, _> = init_capture_lib().into();
    init.map_err(CaptureClientError::from)?;

    let new_stream_camera =
        *unsafe { library.get_stabbied::<NewStreamCamera>(b"new_stream_camera") }?;

    Ok(CaptureClient {
        _library: library,
        new_stream_camera,
    })
}

#[cfg(test)]
mod tests {
    use capture_types::{PixelLayout, StreamCameraDyn, StreamCameraDynMut};

    use super::*;

    fn options(source: &str) -> StreamCameraOptions {
        StreamCameraOptions {
            source: source.into(),
            method: "rtpRtsp".into(),
            options: "".into(),
            width: 160,
            height: 120,
            open_timeout_secs: 1,
            pixel_layout: PixelLayout::Rgb24,
            capture_audio: false,
            detached_reopen: false,
            hardware_acceleration: false,
        }
    }

    #[test]
    fn it_can_load_lib() {
        let Some(lib) = test::get_capture_client_lib() else {
            eprintln!("capture library not built, skipping");
            return;
        };
        let client = load(&lib).unwrap();

        let mut camera = client
            .new_stream_camera(options("rtsp://127.0.0.1:1/missing"))
            .unwrap();
        assert!(!camera.is_ready());
        camera.shutdown();
    }

    #[test]
    fn zero_sized_output_is_rejected() {
        let Some(lib) = test::get_capture_client_lib() else {
            eprintln!("capture library not built, skipping");
            return;
        };
        let client = load(&lib).unwrap();

        let mut bad = options("rtsp://127.0.0.1:1/missing");
        bad.width = 0;
        match client.new_stream_camera(bad) {
            Err(CaptureClientError::CaptureLibError(e)) => assert!(e.is_fatal()),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("zero width should be rejected"),
        }
    }
}
