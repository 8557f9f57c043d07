use crate::domain::error::DomainError;
use crate::domain::image::Raster;
use crate::domain::resize_spec::ResizeSpec;

// アップロード画像の デコード → リサイズ → エンコード を担うトレイト
// 各段階は Raster を受け取り、新しい Raster (またはバイト列) を返す
#[cfg_attr(test, mockall::automock)]
pub trait ImageProcessor {
    /// Sniffs the format from content and decodes it. Only JPEG, PNG, GIF and WEBP are accepted.
    fn decode(&self, image_bytes: &[u8]) -> Result<Raster, DomainError>;

    /// Caps the width at `spec.max_width()` and flattens transparency onto white.
    fn resample(&self, raster: &Raster, spec: &ResizeSpec) -> Raster;

    fn encode(&self, raster: &Raster, quality: u8) -> Result<Vec<u8>, DomainError>;
}
