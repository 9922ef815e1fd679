use capture_types::PixelLayout;

use super::error::EngineError;

/// Geometry and layout of the frames handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl OutputFormat {
    /// Bytes in one packed frame; `None` when the size overflows `usize`.
    pub fn frame_size(&self) -> Option<usize> {
        self.layout.frame_size(self.width, self.height)
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.layout.bytes_per_pixel()
    }
}

/// Checks the caller's buffer against the size one converted frame needs.
/// Returns the frame size.
pub fn validate_buffer_size(
    output: &OutputFormat,
    declared: Option<usize>,
) -> Result<usize, EngineError> {
    if output.width == 0 || output.height == 0 {
        return Err(EngineError::configuration(format!(
            "invalid output size {}x{}",
            output.width, output.height
        )));
    }
    let needed = output.frame_size().ok_or_else(|| {
        EngineError::configuration(format!(
            "output size {}x{} {:?} is too large",
            output.width, output.height, output.layout
        ))
    })?;
    match declared {
        Some(size) if size != needed => Err(EngineError::configuration(format!(
            "image size mismatch: buffer holds {} bytes, {}x{} {:?} needs {}",
            size, output.width, output.height, output.layout, needed
        ))),
        _ => Ok(needed),
    }
}

/// Copies a strided plane into a tightly packed destination.
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    output: &OutputFormat,
    dst: &mut [u8],
) -> Result<(), EngineError> {
    let row = output.row_bytes();
    let rows = output.height as usize;
    if dst.len() < row * rows {
        return Err(EngineError::configuration(format!(
            "destination holds {} bytes, frame needs {}",
            dst.len(),
            row * rows
        )));
    }
    if src_stride < row || src.len() < src_stride * (rows.saturating_sub(1)) + row {
        return Err(EngineError::decode(format!(
            "converted plane too small: {} bytes with stride {}",
            src.len(),
            src_stride
        )));
    }

    if src_stride == row {
        dst[..row * rows].copy_from_slice(&src[..row * rows]);
        return Ok(());
    }
    for (y, out) in dst.chunks_exact_mut(row).take(rows).enumerate() {
        let start = y * src_stride;
        out.copy_from_slice(&src[start..start + row]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(width: u32, height: u32, layout: PixelLayout) -> OutputFormat {
        OutputFormat {
            width,
            height,
            layout,
        }
    }

    #[test]
    fn buffer_size_must_match() {
        let format = output(640, 480, PixelLayout::Rgba);
        assert_eq!(validate_buffer_size(&format, None).unwrap(), 640 * 480 * 4);
        assert_eq!(
            validate_buffer_size(&format, Some(640 * 480 * 4)).unwrap(),
            640 * 480 * 4
        );
        let err = validate_buffer_size(&format, Some(640 * 480 * 3)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn overflowing_output_is_a_configuration_error() {
        let format = output(u32::MAX, u32::MAX, PixelLayout::Rgba);
        assert_eq!(format.frame_size(), None);
        let err = validate_buffer_size(&format, None).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn zero_sized_output_is_rejected() {
        assert!(validate_buffer_size(&output(0, 480, PixelLayout::Gray8), None).is_err());
    }

    #[test]
    fn copies_padded_rows() {
        let format = output(2, 2, PixelLayout::Gray8);
        let src = [1, 2, 0, 0, 3, 4, 0, 0];
        let mut dst = [0u8; 4];
        copy_rows(&src, 4, &format, &mut dst).unwrap();
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn copies_packed_planes_directly() {
        let format = output(1, 2, PixelLayout::Rgb24);
        let src = [1, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        copy_rows(&src, 3, &format, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn short_source_is_an_error() {
        let format = output(2, 2, PixelLayout::Gray8);
        let mut dst = [0u8; 4];
        assert!(copy_rows(&[1, 2, 0], 4, &format, &mut dst).is_err());
    }
}
