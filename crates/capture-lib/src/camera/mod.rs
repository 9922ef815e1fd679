//! Resilient stream acquisition.
//!
//! A [`CaptureEngine`] opens a source, picks its streams, negotiates a video
//! decoder (hardware variants first, software last) and then hands coded
//! packets to the caller one at a time. When the source drops, the engine
//! tears the session down and reopens it, either inline on the caller's thread
//! or on a single background worker, while capture calls report "not ready".
//!
//! The demux/decode library sits behind the [`MediaBackend`] family of traits.
//! The production backend lives in [`crate::ffmpeg`].
//!
//! # Thread Safety
//! The readiness flag, the open clock and the reopen marker in [`EngineState`]
//! are the only state touched by both the caller and the reopen worker. Native
//! handles are only reached through the session lock, and reads are gated on
//! readiness, so close/open never overlaps a read.

mod backend;
mod config;
mod delivery;
mod engine;
mod error;
mod negotiate;
mod selection;
mod session;
mod source;
mod state;
mod supervisor;

pub use backend::{
    AudioDecoding, DecodedFrame, MediaBackend, MediaInput, MediaKind, Packet, StreamInfo,
    VideoDecoding,
};
pub use config::{CameraConfig, ReadErrorPolicy, ReopenMode, DEFAULT_OPEN_TIMEOUT_SECS};
pub use delivery::{copy_rows, validate_buffer_size, OutputFormat};
pub use engine::CaptureEngine;
pub use error::{EngineError, OpenStage, ReadFailure};
pub use negotiate::{
    candidates, negotiate, CandidateError, DecoderCandidate, HwDevice, Negotiated, VideoCodec,
};
pub use selection::{select_streams, StreamSelection};
pub use source::{OptionDictionary, SourceDescriptor, TransportMethod};
pub use state::{reconnect_wait, unix_now_millis, EngineState, OpenClock, Phase, Readiness};
