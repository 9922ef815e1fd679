use std::ptr::null_mut;

use ffmpeg_next::ffi::{
    av_buffer_ref, av_buffer_unref, av_frame_unref, av_hwdevice_ctx_create,
    av_hwframe_transfer_data, AVBufferRef, AVHWDeviceType, AVPixelFormat,
};
use ffmpeg_next::frame;

use crate::camera::HwDevice;

pub(crate) fn device_type(device: HwDevice) -> AVHWDeviceType {
    match device {
        HwDevice::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
        HwDevice::Cuda => AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
        HwDevice::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
        HwDevice::VideoToolbox => AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
    }
}

/// RAII wrapper for an FFmpeg hardware device context.
pub struct HardwareContext {
    ctx: *mut AVBufferRef,
    device: HwDevice,
    pix_fmt: AVPixelFormat,
}

impl HardwareContext {
    /// Opens the default device of the given kind. `pix_fmt` is the surface
    /// format the decoder will produce on it.
    pub fn new(device: HwDevice, pix_fmt: AVPixelFormat) -> Result<Self, ffmpeg_next::Error> {
        let mut hw_device_ctx = null_mut();

        let ret = unsafe {
            av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                device_type(device),
                std::ptr::null(),
                null_mut(),
                0,
            )
        };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }

        Ok(Self {
            ctx: hw_device_ctx,
            device,
            pix_fmt,
        })
    }

    pub fn as_ptr(&self) -> *mut AVBufferRef {
        self.ctx
    }

    /// New reference for a codec context to own. Null on allocation failure.
    pub fn new_ref(&self) -> *mut AVBufferRef {
        unsafe { av_buffer_ref(self.ctx) }
    }

    pub fn device(&self) -> HwDevice {
        self.device
    }

    pub fn pixel_format(&self) -> AVPixelFormat {
        self.pix_fmt
    }
}

impl Drop for HardwareContext {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

// SAFETY: the device reference is only used by the decoder that owns this
// context, and FFmpeg buffer refcounting is thread safe.
unsafe impl Send for HardwareContext {}

/// Downloads a hardware surface into system memory.
pub(crate) fn transfer_frame(
    hw_frame: &frame::Video,
    sw_frame: &mut frame::Video,
) -> Result<(), ffmpeg_next::Error> {
    unsafe {
        av_frame_unref(sw_frame.as_mut_ptr());
        let ret = av_hwframe_transfer_data(sw_frame.as_mut_ptr(), hw_frame.as_ptr(), 0);
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }
        (*sw_frame.as_mut_ptr()).pts = (*hw_frame.as_ptr()).pts;
        (*sw_frame.as_mut_ptr()).best_effort_timestamp = (*hw_frame.as_ptr()).best_effort_timestamp;
    }
    Ok(())
}
