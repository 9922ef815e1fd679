use log::debug;

use super::backend::{MediaKind, StreamInfo};
use super::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSelection {
    pub video: StreamInfo,
    pub audio: Option<StreamInfo>,
}

impl StreamSelection {
    pub fn video_index(&self) -> usize {
        self.video.index
    }

    pub fn audio_index(&self) -> Option<usize> {
        self.audio.as_ref().map(|s| s.index)
    }
}

/// Picks the lowest-numbered video stream and the lowest-numbered audio
/// stream. A source without video cannot be captured.
pub fn select_streams(streams: &[StreamInfo]) -> Result<StreamSelection, EngineError> {
    let mut video: Option<&StreamInfo> = None;
    let mut audio: Option<&StreamInfo> = None;

    for stream in streams {
        let slot = match stream.kind {
            MediaKind::Video => &mut video,
            MediaKind::Audio => &mut audio,
            MediaKind::Other => continue,
        };
        match *slot {
            Some(chosen) if chosen.index <= stream.index => {
                debug!(
                    "Ignoring additional {:?} stream {} ({})",
                    stream.kind, stream.index, stream.codec
                );
            }
            _ => *slot = Some(stream),
        }
    }

    let video = video
        .cloned()
        .ok_or_else(|| EngineError::configuration("unable to locate a video stream"))?;
    debug!("Using video stream {} ({})", video.index, video.codec);
    if let Some(audio) = audio {
        debug!("Using audio stream {} ({})", audio.index, audio.codec);
    }

    Ok(StreamSelection {
        video,
        audio: audio.cloned(),
    })
}
