//! Writing the accumulated output to image files.
//!
//! The format follows the file extension: `.png` is gamma encoded 8-bit,
//! `.hdr` and `.exr` keep the linear floats.

use std::path::Path;

use image::{ImageFormat, Rgb32FImage, RgbaImage, Rgba32FImage};

use crate::backend::OutputBuffer;
use crate::util::{Error, Result};

const DISPLAY_GAMMA: f32 = 2.2;

/// Destination for a finished batch render.
pub trait ImageSink {
    fn write_image(&mut self, path: &Path, output: &OutputBuffer) -> Result<()>;
}

/// Writes PNG, Radiance HDR or OpenEXR files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageWriter;

impl ImageWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSink for ImageWriter {
    fn write_image(&mut self, path: &Path, output: &OutputBuffer) -> Result<()> {
        save(path, output)
    }
}

/// Encoding for `path`, or a configuration error for unsupported extensions.
pub fn output_format(path: &Path) -> Result<ImageFormat> {
    match ImageFormat::from_path(path) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Hdr | ImageFormat::OpenExr)) => Ok(format),
        _ => Err(Error::config(format!(
            "unsupported output file '{}' (use .png, .hdr or .exr)",
            path.display()
        ))),
    }
}

/// Save `output` to `path`, picking the encoding from the extension.
pub fn save(path: &Path, output: &OutputBuffer) -> Result<()> {
    let format = output_format(path)?;
    let (width, height) = output.dimensions();

    match format {
        ImageFormat::Png => {
            let img = RgbaImage::from_raw(width, height, to_rgba8(output)).ok_or_else(size_mismatch)?;
            img.save_with_format(path, format)?;
        }
        ImageFormat::Hdr => {
            let data = output.pixels().iter().flat_map(|p| [p[0], p[1], p[2]]).collect();
            let img = Rgb32FImage::from_raw(width, height, data).ok_or_else(size_mismatch)?;
            img.save_with_format(path, format)?;
        }
        ImageFormat::OpenExr => {
            let data = output.pixels().iter().flatten().copied().collect();
            let img = Rgba32FImage::from_raw(width, height, data).ok_or_else(size_mismatch)?;
            img.save_with_format(path, format)?;
        }
        other => return Err(Error::config(format!("unsupported output format {other:?}"))),
    }
    log::debug!("saved {}x{} {:?} to {}", width, height, format, path.display());
    Ok(())
}

fn size_mismatch() -> Error {
    Error::device("output buffer size does not match its dimensions")
}

/// Gamma-encode one linear channel to 8 bits.
#[inline]
pub fn encode_channel(linear: f32) -> u8 {
    if !linear.is_finite() {
        return 0;
    }
    let c = linear.clamp(0.0, 1.0).powf(1.0 / DISPLAY_GAMMA);
    (c * 255.0 + 0.5) as u8
}

/// Display pixels: RGBA8, gamma encoded, alpha forced opaque.
pub fn to_rgba8(output: &OutputBuffer) -> Vec<u8> {
    output
        .pixels()
        .iter()
        .flat_map(|p| [encode_channel(p[0]), encode_channel(p[1]), encode_channel(p[2]), 255])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> OutputBuffer {
        let mut out = OutputBuffer::new(4, 2);
        for (i, px) in out.pixels_mut().iter_mut().enumerate() {
            let v = i as f32 / 7.0;
            *px = [v, 1.0 - v, 0.5, 1.0];
        }
        out
    }

    #[test]
    fn test_encode_channel() {
        assert_eq!(encode_channel(0.0), 0);
        assert_eq!(encode_channel(1.0), 255);
        assert_eq!(encode_channel(4.0), 255);
        assert_eq!(encode_channel(-1.0), 0);
        assert_eq!(encode_channel(f32::NAN), 0);
        // Mid grey brightens under gamma encoding
        assert!(encode_channel(0.5) > 128);
    }

    #[test]
    fn test_to_rgba8_layout() {
        let bytes = to_rgba8(&gradient());
        assert_eq!(bytes.len(), 4 * 2 * 4);
        assert_eq!(&bytes[0..4], &[0, 255, encode_channel(0.5), 255]);
    }

    #[test]
    fn test_write_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        ImageWriter::new().write_image(&path, &gradient()).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
    }

    #[test]
    fn test_write_hdr_keeps_linear_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.hdr");
        let mut out = OutputBuffer::new(2, 2);
        out.pixels_mut()[3] = [4.0, 2.0, 1.0, 1.0];
        ImageWriter::new().write_image(&path, &out).unwrap();

        let img = image::open(&path).unwrap().to_rgb32f();
        let p = img.get_pixel(1, 1);
        assert!((p[0] - 4.0).abs() < 0.1);
        assert!((p[2] - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = save(&dir.path().join("out.xyz"), &gradient()).unwrap_err();
        assert!(err.is_configuration());
        assert!(output_format(Path::new("a.jpg")).unwrap_err().is_configuration());
        assert_eq!(output_format(Path::new("a.EXR")).unwrap(), ImageFormat::OpenExr);
        assert!(!dir.path().join("out.xyz").exists());
    }
}
