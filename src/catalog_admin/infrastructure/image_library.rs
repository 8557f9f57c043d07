use super::catalog_store::write_replacing;
use super::error::InfrastructureError;
use super::file_storage::remove_if_present;
use crate::domain::conversion::{backup_path, catalog_path, is_convertible};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// カテゴリ別の画像フォルダ (Sofa/, Meja/, uploaded/ ...) を一括変換するためのファイル操作
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    dirs: Vec<PathBuf>,
}

impl ImageLibrary {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Convertible images under every directory, recursively, sorted. Missing directories are skipped.
    pub async fn scan(&self) -> Result<Vec<PathBuf>, InfrastructureError> {
        let mut found = Vec::new();
        for dir in &self.dirs {
            let mut pending = vec![dir.clone()];
            while let Some(current) = pending.pop() {
                let mut reader = match fs::read_dir(&current).await {
                    Ok(reader) => reader,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        warn!("Skipping missing directory {}", current.display());
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                while let Some(entry) = reader.next_entry().await? {
                    let file_type = entry.file_type().await?;
                    let path = entry.path();
                    if file_type.is_dir() {
                        pending.push(path);
                    } else if file_type.is_file() && is_convertible(&path) {
                        found.push(path);
                    }
                }
            }
        }
        found.sort();
        found.dedup();
        debug!("Found {} convertible images", found.len());
        Ok(found)
    }

    pub async fn exists(&self, path: &Path) -> Result<bool, InfrastructureError> {
        Ok(fs::try_exists(path).await?)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, InfrastructureError> {
        Ok(fs::read(path).await?)
    }

    /// Copies `original` to `<name>.backup` next to it.
    pub async fn back_up(&self, original: &Path) -> Result<PathBuf, InfrastructureError> {
        let backup = backup_path(original);
        fs::copy(original, &backup)
            .await
            .map_err(|source| InfrastructureError::BackupFailed {
                path: backup.clone(),
                source,
            })?;
        Ok(backup)
    }

    pub async fn write_converted(&self, target: &Path, bytes: &[u8]) -> Result<(), InfrastructureError> {
        write_replacing(target, bytes)
            .await
            .map_err(|source| InfrastructureError::WriteFailed {
                path: target.to_path_buf(),
                source,
            })
    }

    pub async fn remove(&self, path: &Path, what: &str) {
        remove_if_present(path, what).await;
    }

    /// `path` as a catalog image path relative to `root`, or `None` when it lies outside.
    pub async fn catalog_path_of(&self, root: &Path, path: &Path) -> Option<String> {
        let root = fs::canonicalize(root).await.ok()?;
        let path = fs::canonicalize(path).await.ok()?;
        catalog_path(path.strip_prefix(&root).ok()?)
    }
}
