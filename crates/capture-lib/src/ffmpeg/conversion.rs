use capture_types::PixelLayout;
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use ffmpeg_next::software::scaling;
use log::debug;

use crate::camera::{copy_rows, EngineError, OpenStage, OutputFormat};

pub(crate) fn target_pixel(layout: PixelLayout) -> Pixel {
    match layout {
        PixelLayout::Rgba => Pixel::RGBA,
        PixelLayout::Rgb24 => Pixel::RGB24,
        PixelLayout::Gray8 => Pixel::GRAY8,
    }
}

/// Scaler from the decoder's output to the caller's layout and size.
///
/// Rebuilt on the fly when the decoder starts producing a different format
/// or size, which happens after hardware surfaces are downloaded.
pub struct ConversionContext {
    converted: frame::Video,
    scaler: scaling::Context,
    target: Pixel,
}

// SAFETY: the scaler is owned by one session and only used under its lock.
unsafe impl Send for ConversionContext {}

impl ConversionContext {
    pub fn new(
        source: Pixel,
        width: u32,
        height: u32,
        output: &OutputFormat,
    ) -> Result<Self, EngineError> {
        let target = target_pixel(output.layout);
        unsafe {
            if source != Pixel::None
                && ffi::sws_isSupportedInput(ffi::AVPixelFormat::from(source)) == 0
            {
                return Err(EngineError::open(
                    OpenStage::Conversion,
                    format!("swscale does not support the codec format {:?}", source),
                ));
            }
            if ffi::sws_isSupportedOutput(ffi::AVPixelFormat::from(target)) == 0 {
                return Err(EngineError::configuration(format!(
                    "swscale does not support the target format {:?}",
                    target
                )));
            }
        }

        let scaler = Self::scaler(source, width, height, target, output)?;
        Ok(Self {
            converted: frame::Video::empty(),
            scaler,
            target,
        })
    }

    fn scaler(
        source: Pixel,
        width: u32,
        height: u32,
        target: Pixel,
        output: &OutputFormat,
    ) -> Result<scaling::Context, EngineError> {
        // Hardware decoders report no software format until the first frame.
        let source = if source == Pixel::None { Pixel::YUV420P } else { source };
        scaling::Context::get(
            source,
            width,
            height,
            target,
            output.width,
            output.height,
            scaling::Flags::BICUBIC,
        )
        .map_err(|e| {
            EngineError::open(
                OpenStage::Conversion,
                format!("unable to create conversion context: {}", e),
            )
        })
    }

    /// Converts `frame` and writes it tightly packed into `dst`.
    pub fn convert(
        &mut self,
        frame: &frame::Video,
        output: &OutputFormat,
        dst: &mut [u8],
    ) -> Result<(), EngineError> {
        let input = self.scaler.input();
        if input.format != frame.format()
            || input.width != frame.width()
            || input.height != frame.height()
        {
            debug!(
                "Source changed to {:?} {}x{}, rebuilding conversion context",
                frame.format(),
                frame.width(),
                frame.height()
            );
            self.scaler = Self::scaler(
                frame.format(),
                frame.width(),
                frame.height(),
                self.target,
                output,
            )?;
        }

        self.scaler
            .run(frame, &mut self.converted)
            .map_err(|e| EngineError::decode(format!("unable to convert frame: {}", e)))?;
        copy_rows(
            self.converted.data(0),
            self.converted.stride(0),
            output,
            dst,
        )
    }
}
