use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use super::backend::{MediaInput, StreamInfo};
use super::error::{EngineError, OpenStage};
use super::source::OptionDictionary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwDevice {
    Qsv,
    Cuda,
    Vaapi,
    VideoToolbox,
}

impl fmt::Display for HwDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HwDevice::Qsv => "qsv",
            HwDevice::Cuda => "cuda",
            HwDevice::Vaapi => "vaapi",
            HwDevice::VideoToolbox => "videotoolbox",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Hevc,
    Other(String),
}

impl VideoCodec {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "avc" => VideoCodec::H264,
            "hevc" | "h265" => VideoCodec::Hevc,
            other => VideoCodec::Other(other.to_string()),
        }
    }

    /// Vendor decoders that replace the generic one for this codec, best first.
    fn vendor_decoders(&self) -> &'static [(&'static str, HwDevice)] {
        match self {
            VideoCodec::H264 => &[("h264_qsv", HwDevice::Qsv), ("h264_cuvid", HwDevice::Cuda)],
            VideoCodec::Hevc => &[("hevc_qsv", HwDevice::Qsv), ("hevc_cuvid", HwDevice::Cuda)],
            VideoCodec::Other(_) => &[],
        }
    }

    pub fn accelerator_eligible(&self) -> bool {
        !matches!(self, VideoCodec::Other(_))
    }
}

/// One way of decoding the selected video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderCandidate {
    /// A separate vendor decoder looked up by name.
    Named {
        decoder: &'static str,
        device: HwDevice,
    },
    /// The generic decoder with a hardware device attached.
    Hwaccel { device: HwDevice },
    Software,
}

impl DecoderCandidate {
    pub fn device(&self) -> Option<HwDevice> {
        match self {
            DecoderCandidate::Named { device, .. } | DecoderCandidate::Hwaccel { device } => {
                Some(*device)
            }
            DecoderCandidate::Software => None,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.device().is_some()
    }
}

impl fmt::Display for DecoderCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderCandidate::Named { decoder, device } => write!(f, "{} ({})", decoder, device),
            DecoderCandidate::Hwaccel { device } => write!(f, "generic decoder + {}", device),
            DecoderCandidate::Software => write!(f, "software decoder"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("decoder {0} is not available")]
    Unresolved(String),
    #[error("{0} device unavailable: {1}")]
    DeviceUnavailable(HwDevice, String),
    #[error("failed to open decoder: {0}")]
    OpenFailed(String),
}

#[cfg(target_os = "macos")]
const PLATFORM_HWACCEL: HwDevice = HwDevice::VideoToolbox;
#[cfg(not(target_os = "macos"))]
const PLATFORM_HWACCEL: HwDevice = HwDevice::Vaapi;

/// Ordered decoder candidates for a codec. Software is always last.
pub fn candidates(codec: &VideoCodec, allow_hardware: bool) -> Vec<DecoderCandidate> {
    let mut list = Vec::new();
    if allow_hardware && codec.accelerator_eligible() {
        for &(decoder, device) in codec.vendor_decoders() {
            list.push(DecoderCandidate::Named { decoder, device });
        }
        list.push(DecoderCandidate::Hwaccel {
            device: PLATFORM_HWACCEL,
        });
    }
    list.push(DecoderCandidate::Software);
    list
}

pub struct Negotiated<V> {
    pub decoder: V,
    pub candidate: DecoderCandidate,
}

/// Tries each candidate in order and keeps the first one that opens.
///
/// Every attempt gets its own copy of `options`; the keys left over by the
/// winning attempt are written back.
pub fn negotiate<I: MediaInput>(
    input: &mut I,
    stream: &StreamInfo,
    options: &mut OptionDictionary,
    allow_hardware: bool,
) -> Result<Negotiated<I::Video>, EngineError> {
    let codec = VideoCodec::from_name(&stream.codec);
    let mut last_error = None;

    for candidate in candidates(&codec, allow_hardware) {
        let mut attempt = options.clone();
        match input.open_video_decoder(stream, &candidate, &mut attempt) {
            Ok(decoder) => {
                if candidate.is_accelerated() {
                    info!("Using {} for {} stream {}", candidate, stream.codec, stream.index);
                } else if allow_hardware && codec.accelerator_eligible() {
                    warn!(
                        "No hardware acceleration in use for {} stream {}",
                        stream.codec, stream.index
                    );
                } else {
                    debug!("Using {} for {} stream {}", candidate, stream.codec, stream.index);
                }
                *options = attempt;
                return Ok(Negotiated { decoder, candidate });
            }
            Err(e) => {
                if candidate.is_accelerated() {
                    debug!("Skipping {}: {}", candidate, e);
                } else {
                    warn!("Unable to open {} for {}: {}", candidate, stream.codec, e);
                }
                last_error = Some(e);
            }
        }
    }

    Err(EngineError::open(
        OpenStage::Decoder,
        match last_error {
            Some(e) => format!("no decoder for {} ({})", stream.codec, e),
            None => format!("no decoder for {}", stream.codec),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h264_tries_hardware_before_software() {
        let list = candidates(&VideoCodec::H264, true);
        assert_eq!(
            list,
            vec![
                DecoderCandidate::Named {
                    decoder: "h264_qsv",
                    device: HwDevice::Qsv
                },
                DecoderCandidate::Named {
                    decoder: "h264_cuvid",
                    device: HwDevice::Cuda
                },
                DecoderCandidate::Hwaccel {
                    device: PLATFORM_HWACCEL
                },
                DecoderCandidate::Software,
            ]
        );
    }

    #[test]
    fn disabled_hardware_leaves_only_software() {
        assert_eq!(
            candidates(&VideoCodec::Hevc, false),
            vec![DecoderCandidate::Software]
        );
    }

    #[test]
    fn other_codecs_decode_in_software() {
        let codec = VideoCodec::from_name("mjpeg");
        assert!(!codec.accelerator_eligible());
        assert_eq!(candidates(&codec, true), vec![DecoderCandidate::Software]);
    }

    #[test]
    fn codec_names() {
        assert_eq!(VideoCodec::from_name("H264"), VideoCodec::H264);
        assert_eq!(VideoCodec::from_name("hevc"), VideoCodec::Hevc);
        assert_eq!(VideoCodec::from_name("h265"), VideoCodec::Hevc);
    }
}
