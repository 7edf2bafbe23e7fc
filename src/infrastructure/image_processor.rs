// Image post-processing: palette reduction and re-encoding for e-ink displays
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, GrayImage, Luma};
use serde::Deserialize;

use crate::domain::render::{OutputFormat, UnsupportedFormat};

/// Colours the target display can show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    #[default]
    BlackWhite,
    Grayscale4,
    Full,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode png: {0}")]
    EncodePng(#[source] image::ImageError),
    #[error("failed to encode jpeg: {0}")]
    EncodeJpeg(#[source] image::ImageError),
    #[error("failed to encode bmp: {0}")]
    EncodeBmp(#[source] image::ImageError),
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageProcessor {
    palette: Palette,
}

impl ImageProcessor {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    /// Decode a raw screenshot and encode it as `format`
    pub fn process(
        &self,
        raw: &[u8],
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ImageError> {
        if !format.is_image() {
            return Err(UnsupportedFormat(format.to_string()).into());
        }
        let decoded = image::load_from_memory(raw).map_err(ImageError::Decode)?;
        let image = self.quantize(decoded);

        let mut out = Vec::new();
        match format {
            OutputFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut out,
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                image.write_with_encoder(encoder).map_err(ImageError::EncodePng)?;
            }
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
                image.write_with_encoder(encoder).map_err(ImageError::EncodeJpeg)?;
            }
            OutputFormat::Bmp => {
                // displays expect 24-bit pixels, not a grey palette
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = BmpEncoder::new(&mut out);
                rgb.write_with_encoder(encoder).map_err(ImageError::EncodeBmp)?;
            }
            OutputFormat::Html => return Err(UnsupportedFormat(format.to_string()).into()),
        }

        tracing::debug!(
            format = %format,
            palette = ?self.palette,
            raw_bytes = raw.len(),
            encoded_bytes = out.len(),
            "re-encoded image"
        );
        Ok(out)
    }

    fn quantize(&self, image: DynamicImage) -> DynamicImage {
        match self.palette {
            Palette::Full => DynamicImage::ImageRgb8(image.to_rgb8()),
            Palette::BlackWhite => map_luma(image, |l| if l < 128 { 0 } else { 255 }),
            Palette::Grayscale4 => map_luma(image, |l| ((u16::from(l) + 42) / 85 * 85) as u8),
        }
    }
}

fn map_luma(image: DynamicImage, level: impl Fn(u8) -> u8) -> DynamicImage {
    let mut gray: GrayImage = image.to_luma8();
    for Luma([l]) in gray.pixels_mut() {
        *l = level(*l);
    }
    DynamicImage::ImageLuma8(gray)
}
