use super::backup_writer::BackupWriter;
use super::error::InfrastructureError;
use super::file_storage::remove_if_present;
use crate::domain::catalog::{CatalogDocument, ImageMerge};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// An uploaded image waiting to be linked to the record named `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub name: String,
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUpdate {
    pub backup_path: Option<PathBuf>,
    /// `None` when no image was pending.
    pub merge: Option<ImageMerge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRewrite {
    pub updated: usize,
    pub backup_path: Option<PathBuf>,
}

/// db.json の読み書き (バックアップ → マージ → 書き込み の順序を守る)
#[derive(Debug, Clone)]
pub struct JsonCatalogStore {
    store_path: PathBuf,
    backup: BackupWriter,
}

impl JsonCatalogStore {
    pub fn new(store_path: impl Into<PathBuf>, backup: BackupWriter) -> Self {
        Self {
            store_path: store_path.into(),
            backup,
        }
    }

    #[cfg(test)]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Parse, back up the current store, merge `pending`, then write.
    ///
    /// A failed backup aborts before the store is touched. A failed write leaves the backup in place.
    pub async fn update_catalog(
        &self,
        raw_json: &[u8],
        pending: Option<&PendingImage>,
    ) -> Result<CatalogUpdate, InfrastructureError> {
        let mut document = CatalogDocument::parse(raw_json)?;

        let backup_path = self.backup.snapshot(&self.store_path).await?;

        let merge = pending.map(|pending| {
            let merge = document.apply_image(&pending.name, &pending.image_path);
            if merge == ImageMerge::NoMatch {
                warn!("No catalog record named {:?}; image {} is not linked", pending.name, pending.image_path);
            }
            merge
        });

        self.write_document(&document).await?;
        Ok(CatalogUpdate { backup_path, merge })
    }

    /// Rewrites `image` paths in the stored catalog, backing it up first.
    ///
    /// Nothing is backed up or written when no path changes or there is no store.
    pub async fn rewrite_images(
        &self,
        rewrite: impl FnMut(&str) -> Option<String>,
    ) -> Result<CatalogRewrite, InfrastructureError> {
        let raw = match fs::read(&self.store_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{} not found, skipping catalog update", self.store_path.display());
                return Ok(CatalogRewrite::default());
            }
            Err(e) => return Err(e.into()),
        };
        let mut document = CatalogDocument::parse(&raw)?;
        let updated = document.rewrite_image_paths(rewrite);
        if updated == 0 {
            return Ok(CatalogRewrite::default());
        }

        let backup_path = self.backup.snapshot(&self.store_path).await?;
        self.write_document(&document).await?;
        Ok(CatalogRewrite { updated, backup_path })
    }

    async fn write_document(&self, document: &CatalogDocument) -> Result<(), InfrastructureError> {
        let bytes = document.to_pretty_bytes().map_err(|e| InfrastructureError::WriteFailed {
            path: self.store_path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;
        write_replacing(&self.store_path, &bytes)
            .await
            .map_err(|source| InfrastructureError::WriteFailed {
                path: self.store_path.clone(),
                source,
            })?;

        info!("Wrote {} bytes to {}", bytes.len(), self.store_path.display());
        Ok(())
    }
}

// 兄弟の一時ファイルに書いてから rename する (書きかけのファイルを残さない)
pub(super) async fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "db.json".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp-{:08x}", file_name, rand::random::<u32>()));

    let result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        remove_if_present(&tmp_path, "partial store file").await;
    }
    result
}
