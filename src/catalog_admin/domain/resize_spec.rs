use super::error::DomainError;

/// 画像の用途ごとに独立した設定を持つ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSurface {
    #[default]
    Product,
    Popup,
}

impl ImageSurface {
    pub fn from_form_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "popup" => ImageSurface::Popup,
            _ => ImageSurface::Product, // Default
        }
    }

    pub fn default_spec(self) -> ResizeSpec {
        match self {
            ImageSurface::Product => ResizeSpec { max_width: 1080, quality: 90 },
            ImageSurface::Popup => ResizeSpec { max_width: 800, quality: 80 },
        }
    }
}

/// Max-width cap and JPEG quality for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    max_width: u32,
    quality: u8,
}

impl ResizeSpec {
    pub fn new(max_width: u32, quality: u32) -> Result<Self, DomainError> {
        if max_width == 0 {
            return Err(DomainError::InvalidInput("maxWidth must be greater than 0".to_string()));
        }
        if !(1..=100).contains(&quality) {
            return Err(DomainError::InvalidInput(format!(
                "compressionQuality must be within 1..=100, got {}",
                quality
            )));
        }
        Ok(Self {
            max_width,
            quality: quality as u8,
        })
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}
