use std::collections::VecDeque;
use std::ffi::{c_int, c_void};
use std::ptr::null_mut;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next::codec::{self, Parameters};
use ffmpeg_next::ffi::{
    self, AVBufferRef, AVCodecContext, AVHWFramesContext, AVPixelFormat, AVERROR, AVERROR_EOF,
    EAGAIN,
};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::{frame, Packet as CodedPacket};
use log::{debug, error};

use super::conversion::ConversionContext;
use super::dictionary::RawDictionary;
use super::hardware::{self, HardwareContext};
use super::private_options;
use crate::camera::{
    AudioDecoding, CandidateError, DecodedFrame, DecoderCandidate, EngineError, OpenStage,
    OptionDictionary, OutputFormat, Packet, VideoDecoding,
};

const HW_FRAME_ALIGN: c_int = 32;
const HW_FRAME_POOL_SIZE: c_int = 32;
/// Decoded pictures held back when one packet yields several.
const MAX_PENDING_FRAMES: usize = 4;

/// Read by `get_hw_format`, which FFmpeg calls from inside decode.
#[repr(C)]
struct NegotiationState {
    pix_fmt: AVPixelFormat,
    device_ref: *mut AVBufferRef,
    failed: AtomicBool,
}

fn align(value: c_int) -> c_int {
    (value + HW_FRAME_ALIGN - 1) & !(HW_FRAME_ALIGN - 1)
}

unsafe fn allocate_frame_pool(ctx: *mut AVCodecContext, state: &NegotiationState) -> bool {
    if !(*ctx).hw_frames_ctx.is_null() {
        ffi::av_buffer_unref(&mut (*ctx).hw_frames_ctx);
    }

    let mut frames_ref = ffi::av_hwframe_ctx_alloc(state.device_ref);
    if frames_ref.is_null() {
        error!("Failed to allocate hardware frame pool");
        return false;
    }

    let frames = (*frames_ref).data as *mut AVHWFramesContext;
    (*frames).format = state.pix_fmt;
    (*frames).sw_format = (*ctx).sw_pix_fmt;
    (*frames).width = align((*ctx).coded_width);
    (*frames).height = align((*ctx).coded_height);
    (*frames).initial_pool_size = HW_FRAME_POOL_SIZE;

    let ret = ffi::av_hwframe_ctx_init(frames_ref);
    if ret < 0 {
        error!(
            "Failed to initialise hardware frame pool: {}",
            ffmpeg_next::Error::from(ret)
        );
        ffi::av_buffer_unref(&mut frames_ref);
        return false;
    }

    (*ctx).hw_frames_ctx = frames_ref;
    true
}

unsafe extern "C" fn get_hw_format(
    ctx: *mut AVCodecContext,
    pix_fmts: *const AVPixelFormat,
) -> AVPixelFormat {
    let state = (*ctx).opaque as *const NegotiationState;
    if state.is_null() {
        return AVPixelFormat::AV_PIX_FMT_NONE;
    }
    let state = &*state;

    let mut i = 0;
    loop {
        let format = *pix_fmts.offset(i);
        if format == AVPixelFormat::AV_PIX_FMT_NONE {
            break;
        }
        if format == state.pix_fmt {
            if allocate_frame_pool(ctx, state) {
                return format;
            }
            state.failed.store(true, Ordering::SeqCst);
            return AVPixelFormat::AV_PIX_FMT_NONE;
        }
        i += 1;
    }

    error!("Decoder did not offer {:?}", state.pix_fmt);
    state.failed.store(true, Ordering::SeqCst);
    AVPixelFormat::AV_PIX_FMT_NONE
}

fn hw_pixel_format(codec: &ffmpeg_next::Codec, device: ffi::AVHWDeviceType) -> Option<AVPixelFormat> {
    let methods = ffi::AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32
        | ffi::AV_CODEC_HW_CONFIG_METHOD_HW_FRAMES_CTX as i32;
    let mut i = 0;
    unsafe {
        loop {
            let config = ffi::avcodec_get_hw_config(codec.as_ptr(), i);
            if config.is_null() {
                return None;
            }
            let config = &*config;
            if config.device_type == device && (config.methods & methods) != 0 {
                return Some(config.pix_fmt);
            }
            i += 1;
        }
    }
}

/// Sends one packet and drains every frame the decoder has ready.
///
/// `send` returns the raw `avcodec_send_packet` result. `receive` pulls one
/// frame and returns false once the decoder has nothing more to give. When
/// the decoder refuses input because its output is full, output is drained
/// and the same packet is sent again.
pub(crate) fn feed_packet(
    mut send: impl FnMut() -> c_int,
    mut receive: impl FnMut() -> Result<bool, EngineError>,
) -> Result<(), EngineError> {
    loop {
        let ret = send();
        if ret == AVERROR(EAGAIN) {
            if !receive()? {
                return Err(EngineError::decode(
                    "decoder refused input with no output pending",
                ));
            }
            continue;
        }
        if ret < 0 {
            return Err(EngineError::decode(format!(
                "unable to send packet: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        break;
    }
    while receive()? {}
    Ok(())
}

fn negotiation_failed(state: *const NegotiationState) -> bool {
    !state.is_null() && unsafe { (*state).failed.load(Ordering::SeqCst) }
}

fn negotiation_error() -> EngineError {
    EngineError::FormatNegotiation("unable to allocate hardware frames".to_string())
}

/// Pulls one picture into `pending`, dropping the oldest when full.
fn receive_video(
    ctx: *mut AVCodecContext,
    state: *const NegotiationState,
    pending: &mut VecDeque<frame::Video>,
) -> Result<bool, EngineError> {
    let mut frame = frame::Video::empty();
    let ret = unsafe { ffi::avcodec_receive_frame(ctx, frame.as_mut_ptr()) };
    // get_format may run here when frame threading is on.
    if negotiation_failed(state) {
        return Err(negotiation_error());
    }
    if ret == AVERROR(EAGAIN) || ret == AVERROR_EOF {
        return Ok(false);
    }
    if ret < 0 {
        return Err(EngineError::decode(format!(
            "unable to receive frame: {}",
            ffmpeg_next::Error::from(ret)
        )));
    }
    if pending.len() >= MAX_PENDING_FRAMES {
        pending.pop_front();
        debug!("Dropping oldest decoded picture, {} pending", MAX_PENDING_FRAMES);
    }
    pending.push_back(frame);
    Ok(true)
}

/// Video decoder for one session, optionally bound to a hardware device.
pub struct FfmpegVideoDecoder {
    // Frames go before the codec context they came from.
    pending: VecDeque<frame::Video>,
    transferred: frame::Video,
    context: codec::context::Context,
    hardware: Option<HardwareContext>,
    negotiation: *mut NegotiationState,
    hw_pix_fmt: Option<AVPixelFormat>,
    sw_format: Pixel,
    coded_size: (u32, u32),
}

// SAFETY: the codec context and its negotiation state are only used by the
// session that owns them, under the session lock.
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    pub fn open(
        parameters: Parameters,
        candidate: &DecoderCandidate,
        options: &mut OptionDictionary,
    ) -> Result<Self, CandidateError> {
        let codec = match candidate {
            DecoderCandidate::Named { decoder, .. } => ffmpeg_next::decoder::find_by_name(decoder)
                .ok_or_else(|| CandidateError::Unresolved(decoder.to_string()))?,
            _ => ffmpeg_next::decoder::find(parameters.id())
                .ok_or_else(|| CandidateError::Unresolved(parameters.id().name().to_string()))?,
        };

        let context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| CandidateError::OpenFailed(e.to_string()))?;

        let mut decoder = Self {
            pending: VecDeque::new(),
            transferred: frame::Video::empty(),
            context,
            hardware: None,
            negotiation: null_mut(),
            hw_pix_fmt: None,
            sw_format: Pixel::None,
            coded_size: (0, 0),
        };

        if let Some(device) = candidate.device() {
            let pix_fmt = hw_pixel_format(&codec, hardware::device_type(device)).ok_or_else(|| {
                CandidateError::DeviceUnavailable(
                    device,
                    format!("{} has no {} configuration", codec.name(), device),
                )
            })?;
            let hw = HardwareContext::new(device, pix_fmt)
                .map_err(|e| CandidateError::DeviceUnavailable(device, e.to_string()))?;
            let device_ref = hw.new_ref();
            if device_ref.is_null() {
                return Err(CandidateError::DeviceUnavailable(
                    device,
                    "failed to reference hardware context".to_string(),
                ));
            }

            debug!("Binding {} decoder to {} device", codec.name(), hw.device());
            decoder.negotiation = Box::into_raw(Box::new(NegotiationState {
                pix_fmt: hw.pixel_format(),
                device_ref: hw.as_ptr(),
                failed: AtomicBool::new(false),
            }));
            unsafe {
                let ctx = decoder.context.as_mut_ptr();
                (*ctx).opaque = decoder.negotiation as *mut c_void;
                (*ctx).get_format = Some(get_hw_format);
                (*ctx).hw_device_ctx = device_ref;
            }
            decoder.hw_pix_fmt = Some(pix_fmt);
            decoder.hardware = Some(hw);
        }

        unsafe {
            (*decoder.context.as_mut_ptr()).flags |= ffi::AV_CODEC_FLAG_LOW_DELAY as c_int;
        }

        let mut dictionary =
            RawDictionary::from_options(options).map_err(|e| CandidateError::OpenFailed(e.to_string()))?;
        let ret = unsafe {
            ffi::avcodec_open2(
                decoder.context.as_mut_ptr(),
                codec.as_ptr(),
                dictionary.as_mut_ptr(),
            )
        };
        if ret < 0 {
            return Err(CandidateError::OpenFailed(
                ffmpeg_next::Error::from(ret).to_string(),
            ));
        }
        let remaining = dictionary.remaining();
        private_options::log_unconsumed(&codec, &remaining);
        *options = remaining;

        unsafe {
            let ctx = decoder.context.as_ptr();
            decoder.coded_size = ((*ctx).width.max(0) as u32, (*ctx).height.max(0) as u32);
            if decoder.hw_pix_fmt.is_none() {
                decoder.sw_format = Pixel::from((*ctx).pix_fmt);
            }
        }
        debug!(
            "Opened {} decoder {}x{} {:?}",
            codec.name(),
            decoder.coded_size.0,
            decoder.coded_size.1,
            decoder.sw_format
        );
        Ok(decoder)
    }

    fn is_hw_frame(&self, frame: &frame::Video) -> bool {
        match self.hw_pix_fmt {
            Some(pix_fmt) => unsafe { (*frame.as_ptr()).format == pix_fmt as c_int },
            None => false,
        }
    }
}

impl VideoDecoding for FfmpegVideoDecoder {
    type Conversion = ConversionContext;

    fn coded_size(&self) -> (u32, u32) {
        self.coded_size
    }

    fn build_conversion(&self, output: &OutputFormat) -> Result<ConversionContext, EngineError> {
        ConversionContext::new(self.sw_format, self.coded_size.0, self.coded_size.1, output)
    }

    fn decode_into(
        &mut self,
        packet: &Packet,
        conversion: &mut ConversionContext,
        output: &OutputFormat,
        dst: &mut [u8],
    ) -> Result<Option<DecodedFrame>, EngineError> {
        let mut coded = CodedPacket::copy(&packet.data);
        coded.set_pts(packet.pts);
        coded.set_dts(packet.dts);
        coded.set_duration(packet.duration);

        let ctx = unsafe { self.context.as_mut_ptr() };
        let coded_ptr = unsafe { coded.as_ptr() };
        let state = self.negotiation as *const NegotiationState;
        let pending = &mut self.pending;
        let fed = feed_packet(
            || unsafe { ffi::avcodec_send_packet(ctx, coded_ptr) },
            || receive_video(ctx, state, pending),
        );
        if negotiation_failed(state) {
            return Err(negotiation_error());
        }
        fed?;

        let Some(decoded) = self.pending.pop_front() else {
            return Ok(None);
        };
        let pts = decoded.timestamp().or(decoded.pts());
        let frame = if self.is_hw_frame(&decoded) {
            hardware::transfer_frame(&decoded, &mut self.transferred).map_err(|e| {
                EngineError::decode(format!("unable to transfer frame from GPU: {}", e))
            })?;
            &self.transferred
        } else {
            &decoded
        };

        conversion.convert(frame, output, dst)?;
        Ok(Some(DecodedFrame {
            pts,
            width: output.width,
            height: output.height,
        }))
    }
}

impl Drop for FfmpegVideoDecoder {
    fn drop(&mut self) {
        if self.negotiation.is_null() {
            return;
        }
        unsafe {
            let ctx = self.context.as_mut_ptr();
            (*ctx).opaque = null_mut();
            (*ctx).get_format = None;
            drop(Box::from_raw(self.negotiation));
        }
        self.negotiation = null_mut();
    }
}

/// Audio decoder kept alongside the video one. Samples are decoded and
/// counted but not delivered.
pub struct FfmpegAudioDecoder {
    decoded: frame::Audio,
    decoder: codec::decoder::Audio,
}

// SAFETY: owned by one session and only used under its lock.
unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    pub fn open(parameters: Parameters) -> Result<Self, EngineError> {
        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().audio())
            .map_err(|e| {
                EngineError::open(OpenStage::Decoder, format!("unable to open audio codec: {}", e))
            })?;
        debug!("Opened audio decoder at {} Hz", decoder.rate());
        Ok(Self {
            decoded: frame::Audio::empty(),
            decoder,
        })
    }
}

impl AudioDecoding for FfmpegAudioDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<usize, EngineError> {
        let mut coded = CodedPacket::copy(&packet.data);
        coded.set_pts(packet.pts);
        coded.set_dts(packet.dts);

        let ctx = unsafe { self.decoder.as_mut_ptr() };
        let coded_ptr = unsafe { coded.as_ptr() };
        let decoded = &mut self.decoded;
        let mut samples = 0;
        feed_packet(
            || unsafe { ffi::avcodec_send_packet(ctx, coded_ptr) },
            || {
                let ret = unsafe { ffi::avcodec_receive_frame(ctx, decoded.as_mut_ptr()) };
                if ret == AVERROR(EAGAIN) || ret == AVERROR_EOF {
                    return Ok(false);
                }
                if ret < 0 {
                    return Err(EngineError::decode(format!(
                        "unable to receive audio: {}",
                        ffmpeg_next::Error::from(ret)
                    )));
                }
                samples += decoded.samples();
                Ok(true)
            },
        )?;
        Ok(samples)
    }
}
