use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // 対応外のフォーマット (JPEG / PNG / GIF / WEBP 以外、または判定失敗)
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image data is corrupt or truncated: {0}")]
    CorruptData(String),

    #[error("Image exceeds processing limits: {0}")]
    ResourceExhausted(String),

    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),
}
