use super::error::DomainError;
use image::{DynamicImage, ImageFormat};

/// デコード済みの画像 (ファイル形式から独立したピクセルグリッド)
#[derive(Debug, Clone)]
pub struct Raster {
    pixels: DynamicImage,
    source_format: Option<ImageFormat>,
}

impl Raster {
    pub fn new(pixels: DynamicImage, source_format: Option<ImageFormat>) -> Result<Self, DomainError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DomainError::CorruptData(format!(
                "image has empty dimensions {}x{}",
                pixels.width(),
                pixels.height()
            )));
        }
        Ok(Self {
            pixels,
            source_format,
        })
    }

    /// A new raster from processed pixels, keeping the source format.
    pub fn derive(&self, pixels: DynamicImage) -> Raster {
        debug_assert!(pixels.width() > 0 && pixels.height() > 0);
        Raster {
            pixels,
            source_format: self.source_format,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.pixels.color().has_alpha()
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }
}
