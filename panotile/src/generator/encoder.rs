//! Tile image encoders.

use std::io::Cursor;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};

use super::error::GeneratorError;
use crate::manifest::TileFormat;

/// Encodes one tile (or preview) image into its stored form.
///
/// Implementations are shared across rayon workers.
pub trait TileEncoder: Send + Sync {
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, GeneratorError>;

    /// Format written by this encoder.
    fn format(&self) -> TileFormat;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Encoder backed by the `image` codecs.
///
/// # Example
///
/// ```
/// use panotile::generator::{ImageTileEncoder, TileEncoder};
/// use panotile::manifest::TileFormat;
///
/// let encoder = ImageTileEncoder::new(TileFormat::Jpeg).with_quality(90);
/// assert_eq!(encoder.name(), "JPEG");
/// assert_eq!(encoder.format().extension(), "jpg");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ImageTileEncoder {
    format: TileFormat,
    quality: u8,
}

impl ImageTileEncoder {
    /// Encoder at the highest JPEG quality.
    pub fn new(format: TileFormat) -> Self {
        Self {
            format,
            quality: 100,
        }
    }

    /// JPEG quality (1-100). Ignored by the lossless formats.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl TileEncoder for ImageTileEncoder {
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, GeneratorError> {
        let mut out = Cursor::new(Vec::new());
        let (width, height) = image.dimensions();

        let result = match self.format {
            TileFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb: RgbImage = image.convert();
                JpegEncoder::new_with_quality(&mut out, self.quality).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )
            }
            TileFormat::Png => PngEncoder::new(&mut out).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            ),
            TileFormat::Webp => WebPEncoder::new_lossless(&mut out).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            ),
        };

        result.map_err(|e| GeneratorError::EncodeFailure(e.to_string()))?;
        Ok(out.into_inner())
    }

    fn format(&self) -> TileFormat {
        self.format
    }

    fn name(&self) -> &str {
        match self.format {
            TileFormat::Jpeg => "JPEG",
            TileFormat::Png => "PNG",
            TileFormat::Webp => "WebP",
        }
    }
}
