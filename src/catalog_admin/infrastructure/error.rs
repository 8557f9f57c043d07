use std::path::PathBuf;
use thiserror::Error;
use crate::domain::error::DomainError;

#[derive(Error, Debug)]
pub enum InfrastructureError {
    // commit 対象の一時ファイルが既に存在しない
    #[error("Staged file is missing: {}", .0.display())]
    SourceMissing(PathBuf),

    // rename 失敗。一時ファイルはリトライ用にそのまま残す
    #[error("Could not move staged file to {}", .path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create database backup at {}", .path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}. Check permissions.", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Underlying I/O error")]
    IoError(#[from] std::io::Error),

    #[error("Underlying image library error")]
    ImageLibError(#[from] image::ImageError),

    #[error("{0}")]
    DomainErrorWrapper(#[from] DomainError),
}
