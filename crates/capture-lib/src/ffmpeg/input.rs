use std::ffi::{c_int, c_void, CString};
use std::ptr::null_mut;
use std::sync::Arc;

use ffmpeg_next::{ffi, format, media, Packet as CodedPacket};
use log::debug;

use super::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use super::dictionary::RawDictionary;
use crate::camera::{
    CandidateError, DecoderCandidate, EngineError, MediaInput, MediaKind, OpenClock, OpenStage,
    OptionDictionary, Packet, ReadFailure, SourceDescriptor, StreamInfo,
};

unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let clock = &*(opaque as *const OpenClock);
    c_int::from(clock.should_interrupt())
}

fn media_kind(medium: media::Type) -> MediaKind {
    match medium {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        _ => MediaKind::Other,
    }
}

fn classify(error: ffmpeg_next::Error) -> ReadFailure {
    match error {
        ffmpeg_next::Error::Eof | ffmpeg_next::Error::Exit => ReadFailure::EndOfStream,
        ffmpeg_next::Error::Other { errno } => ReadFailure::from_errno(errno),
        other => ReadFailure::Other(c_int::from(other)),
    }
}

/// An open demuxer. The interrupt callback points at the engine's
/// [`OpenClock`], which this handle keeps alive.
pub struct FormatHandle {
    input: format::context::Input,
    _clock: Arc<OpenClock>,
}

// SAFETY: the demuxer is only driven by whoever holds the session lock.
unsafe impl Send for FormatHandle {}

impl FormatHandle {
    pub fn open(
        source: &SourceDescriptor,
        options: &mut OptionDictionary,
        clock: &Arc<OpenClock>,
    ) -> Result<Self, EngineError> {
        let address = CString::new(source.address()).map_err(|_| {
            EngineError::configuration(format!("source {:?} contains a NUL byte", source.address()))
        })?;
        let mut dictionary = RawDictionary::from_options(options)?;

        unsafe {
            let mut context = ffi::avformat_alloc_context();
            if context.is_null() {
                return Err(EngineError::open(
                    OpenStage::Connect,
                    "unable to allocate format context",
                ));
            }
            (*context).interrupt_callback = ffi::AVIOInterruptCB {
                callback: Some(interrupt_callback),
                opaque: Arc::as_ptr(clock) as *mut c_void,
            };

            // On failure the context is freed by FFmpeg.
            let ret = ffi::avformat_open_input(
                &mut context,
                address.as_ptr(),
                null_mut::<ffi::AVInputFormat>(),
                dictionary.as_mut_ptr(),
            );
            *options = dictionary.remaining();
            if ret < 0 {
                return Err(EngineError::open(
                    OpenStage::Connect,
                    format!(
                        "unable to open input {}: {}",
                        source.address(),
                        ffmpeg_next::Error::from(ret)
                    ),
                ));
            }

            Ok(Self {
                input: format::context::Input::wrap(context),
                _clock: Arc::clone(clock),
            })
        }
    }

    fn eof_reached(&self) -> bool {
        unsafe {
            let context = self.input.as_ptr();
            !(*context).pb.is_null() && (*(*context).pb).eof_reached != 0
        }
    }
}

impl MediaInput for FormatHandle {
    type Video = FfmpegVideoDecoder;
    type Audio = FfmpegAudioDecoder;

    fn find_stream_info(&mut self) -> Result<(), EngineError> {
        let ret = unsafe { ffi::avformat_find_stream_info(self.input.as_mut_ptr(), null_mut()) };
        if ret < 0 {
            return Err(EngineError::open(
                OpenStage::StreamInfo,
                format!("unable to find stream info: {}", ffmpeg_next::Error::from(ret)),
            ));
        }
        Ok(())
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let (width, height) = unsafe {
                    let raw = parameters.as_ptr();
                    ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32)
                };
                StreamInfo {
                    index: stream.index(),
                    kind: media_kind(parameters.medium()),
                    codec: parameters.id().name().to_string(),
                    width,
                    height,
                }
            })
            .collect()
    }

    fn open_video_decoder(
        &mut self,
        stream: &StreamInfo,
        candidate: &DecoderCandidate,
        options: &mut OptionDictionary,
    ) -> Result<FfmpegVideoDecoder, CandidateError> {
        let parameters = self
            .input
            .stream(stream.index)
            .ok_or_else(|| CandidateError::OpenFailed(format!("no stream {}", stream.index)))?
            .parameters();
        FfmpegVideoDecoder::open(parameters, candidate, options)
    }

    fn open_audio_decoder(&mut self, stream: &StreamInfo) -> Result<FfmpegAudioDecoder, EngineError> {
        let parameters = self
            .input
            .stream(stream.index)
            .ok_or_else(|| {
                EngineError::open(OpenStage::Decoder, format!("no stream {}", stream.index))
            })?
            .parameters();
        FfmpegAudioDecoder::open(parameters)
    }

    fn read_packet(&mut self) -> Result<Packet, ReadFailure> {
        let mut coded = CodedPacket::empty();
        if let Err(e) = coded.read(&mut self.input) {
            if self.eof_reached() {
                return Err(ReadFailure::EndOfStream);
            }
            debug!("av_read_frame: {}", e);
            return Err(classify(e));
        }

        let index = coded.stream();
        let (kind, time_base) = match self.input.stream(index) {
            Some(stream) => (media_kind(stream.parameters().medium()), stream.time_base()),
            None => (MediaKind::Other, ffmpeg_next::Rational::new(0, 1)),
        };
        Ok(Packet {
            data: coded.data().map(<[u8]>::to_vec).unwrap_or_default(),
            stream_index: index,
            kind,
            pts: coded.pts(),
            dts: coded.dts(),
            duration: coded.duration(),
            time_base: (time_base.numerator(), time_base.denominator()),
            is_keyframe: coded.is_key(),
            generation: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::ffi::{AVERROR, EAGAIN};

    use super::*;

    #[test]
    fn end_of_file_ends_the_stream() {
        assert_eq!(classify(ffmpeg_next::Error::Eof), ReadFailure::EndOfStream);
        assert_eq!(classify(ffmpeg_next::Error::Exit), ReadFailure::EndOfStream);
    }

    #[test]
    fn would_block_is_not_a_disconnect() {
        let error = ffmpeg_next::Error::from(AVERROR(EAGAIN));
        assert_eq!(classify(error), ReadFailure::WouldBlock);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timed_out_transport_is_a_disconnect() {
        // ETIMEDOUT
        let error = ffmpeg_next::Error::Other { errno: 110 };
        assert_eq!(classify(error), ReadFailure::Disconnected(110));
    }

    #[test]
    fn malformed_data_is_some_other_failure() {
        assert!(matches!(
            classify(ffmpeg_next::Error::InvalidData),
            ReadFailure::Other(_)
        ));
    }
}
