//! Texture upload seam between the streamer and the renderer.

use std::sync::Arc;

use image::RgbaImage;

use super::error::TileFetchError;
use crate::manifest::TileAddress;

/// Turns decoded tiles into renderer textures and releases them again.
///
/// Called only from the thread that owns the streamer, so implementations
/// may hold non-`Send` graphics state.
pub trait TextureUploader {
    /// Renderer-side texture reference.
    type Handle: Clone;

    /// Create a texture for a freshly loaded tile.
    fn upload(&mut self, address: TileAddress, image: RgbaImage) -> Self::Handle;

    /// Free a texture whose tile was evicted or torn down.
    fn release(&mut self, address: TileAddress, handle: Self::Handle);
}

/// Keeps decoded tiles in memory, for headless hosts and tests.
#[derive(Debug, Default)]
pub struct CpuTextureUploader {
    uploads: u64,
    releases: u64,
    resident_bytes: u64,
}

impl CpuTextureUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total textures created.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Total textures released.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Bytes held by textures not yet released.
    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }
}

impl TextureUploader for CpuTextureUploader {
    type Handle = Arc<RgbaImage>;

    fn upload(&mut self, _address: TileAddress, image: RgbaImage) -> Self::Handle {
        self.uploads += 1;
        self.resident_bytes += image.as_raw().len() as u64;
        Arc::new(image)
    }

    fn release(&mut self, _address: TileAddress, handle: Self::Handle) {
        self.releases += 1;
        self.resident_bytes = self
            .resident_bytes
            .saturating_sub(handle.as_raw().len() as u64);
    }
}

/// Decode encoded tile bytes to RGBA.
pub fn decode_tile(data: &[u8]) -> Result<RgbaImage, TileFetchError> {
    let image = image::load_from_memory(data)?;
    Ok(image.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_tile() {
        let image = decode_tile(&png_bytes(4, 2)).unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_tile(b"definitely not an image").unwrap_err();
        assert!(matches!(err, TileFetchError::Decode(_)));
    }

    #[test]
    fn test_cpu_uploader_accounting() {
        let mut uploader = CpuTextureUploader::new();
        let address = TileAddress::new(0, 0, 0);

        let handle = uploader.upload(address, RgbaImage::new(4, 4));
        assert_eq!(uploader.uploads(), 1);
        assert_eq!(uploader.resident_bytes(), 64);

        uploader.release(address, handle);
        assert_eq!(uploader.releases(), 1);
        assert_eq!(uploader.resident_bytes(), 0);
    }
}
