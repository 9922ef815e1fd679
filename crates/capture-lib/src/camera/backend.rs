use std::sync::Arc;

use super::delivery::OutputFormat;
use super::error::{EngineError, ReadFailure};
use super::negotiate::{CandidateError, DecoderCandidate};
use super::source::{OptionDictionary, SourceDescriptor};
use super::state::OpenClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

/// What the demuxer reported about one elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    pub width: u32,
    pub height: u32,
}

/// One coded data unit, owned by the caller once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub stream_index: usize,
    pub kind: MediaKind,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    /// (numerator, denominator)
    pub time_base: (i32, i32),
    pub is_keyframe: bool,
    /// Session that produced this packet. Packets from an older session are
    /// not decoded.
    pub generation: u64,
}

impl Packet {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Presentation time in seconds, when the packet carries one.
    pub fn presentation_seconds(&self) -> Option<f64> {
        let (num, den) = self.time_base;
        if den == 0 {
            return None;
        }
        self.pts.map(|pts| pts as f64 * num as f64 / den as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub pts: Option<i64>,
    pub width: u32,
    pub height: u32,
}

/// Entry point into a demux/decode library.
pub trait MediaBackend: Send + Sync + 'static {
    type Input: MediaInput;

    /// Connects to the source. Keys the demuxer consumes are removed from
    /// `options`. Implementations must abort once `clock` asks to interrupt.
    fn open_input(
        &self,
        source: &SourceDescriptor,
        options: &mut OptionDictionary,
        clock: &Arc<OpenClock>,
    ) -> Result<Self::Input, EngineError>;
}

/// An open source, before and after its decoders are attached.
pub trait MediaInput: Send + 'static {
    type Video: VideoDecoding;
    type Audio: AudioDecoding;

    fn find_stream_info(&mut self) -> Result<(), EngineError>;

    fn streams(&self) -> Vec<StreamInfo>;

    /// Opens one decoder candidate. Keys the decoder consumes are removed
    /// from `options`.
    fn open_video_decoder(
        &mut self,
        stream: &StreamInfo,
        candidate: &DecoderCandidate,
        options: &mut OptionDictionary,
    ) -> Result<Self::Video, CandidateError>;

    fn open_audio_decoder(&mut self, stream: &StreamInfo) -> Result<Self::Audio, EngineError>;

    fn read_packet(&mut self) -> Result<Packet, ReadFailure>;
}

pub trait VideoDecoding: Send + 'static {
    type Conversion: Send + 'static;

    /// Size the source is actually sending.
    fn coded_size(&self) -> (u32, u32);

    fn build_conversion(&self, output: &OutputFormat) -> Result<Self::Conversion, EngineError>;

    /// Feeds one packet and, when a picture comes out, writes it converted
    /// into `dst`.
    fn decode_into(
        &mut self,
        packet: &Packet,
        conversion: &mut Self::Conversion,
        output: &OutputFormat,
        dst: &mut [u8],
    ) -> Result<Option<DecodedFrame>, EngineError>;
}

pub trait AudioDecoding: Send + 'static {
    /// Returns the number of samples decoded from the packet.
    fn decode(&mut self, packet: &Packet) -> Result<usize, EngineError>;
}
