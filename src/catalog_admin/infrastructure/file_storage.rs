use super::error::InfrastructureError;
use crate::domain::staged_file::{final_file_name, temp_file_name, StagedFile};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const MAX_NAME_ATTEMPTS: usize = 8;

/// アップロード画像の一時保存 → commit / discard を管理する
///
/// Temp files live in the uploads directory itself so that commit is a same-filesystem rename.
/// Paths handed to [`LocalStagingStore::commit`] are used as given; callers resolve them first.
#[derive(Debug, Clone)]
pub struct LocalStagingStore {
    uploads_dir: PathBuf,
}

impl LocalStagingStore {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
        }
    }

    #[cfg(test)]
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Writes `data` under a fresh `temp_<timestamp>_<random>_<name>.jpg` name.
    ///
    /// The returned file's final path defaults to `<sanitized name>.jpg` in the uploads directory.
    pub async fn stage_temp(&self, data: &[u8], name_hint: &str) -> Result<StagedFile, InfrastructureError> {
        fs::create_dir_all(&self.uploads_dir).await?;
        let final_name = final_file_name(name_hint).unwrap_or_else(|| "image.jpg".to_string());
        let final_path = self.uploads_dir.join(final_name);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let temp_path = self.uploads_dir.join(next_temp_name(name_hint));
            // create_new: ロックなしで衝突を検出する
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&temp_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(InfrastructureError::IoError(e)),
            };

            let written = async {
                file.write_all(data).await?;
                file.sync_all().await
            }
            .await;
            if let Err(e) = written {
                drop(file);
                remove_if_present(&temp_path, "partial temp file").await;
                return Err(InfrastructureError::IoError(e));
            }

            info!("Staged {} bytes at {}", data.len(), temp_path.display());
            return Ok(StagedFile::new(temp_path, final_path, None));
        }

        Err(InfrastructureError::IoError(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique temp file name",
        )))
    }

    /// Makes a staged file permanent and returns its final path.
    pub async fn commit(&self, staged: StagedFile) -> Result<PathBuf, InfrastructureError> {
        if !fs::try_exists(staged.temp_path()).await? {
            return Err(InfrastructureError::SourceMissing(staged.temp_path().to_path_buf()));
        }

        if let Some(original) = staged.superseded_original() {
            remove_if_present(original, "superseded original image").await;
        }

        // 既存ファイルへの rename 上書きは移植性がないので、先に削除する
        let final_path = staged.final_path().to_path_buf();
        remove_if_present(&final_path, "previous destination file").await;

        fs::rename(staged.temp_path(), &final_path)
            .await
            .map_err(|source| InfrastructureError::DestinationUnwritable {
                path: final_path.clone(),
                source,
            })?;

        info!("Committed {} -> {}", staged.temp_path().display(), final_path.display());
        Ok(final_path)
    }

    pub async fn discard(&self, staged: StagedFile) -> Result<(), InfrastructureError> {
        self.discard_path(staged.temp_path()).await
    }

    /// Deletes a temp file. A file that is already gone counts as discarded.
    pub async fn discard_path(&self, temp_path: &Path) -> Result<(), InfrastructureError> {
        match fs::remove_file(temp_path).await {
            Ok(()) => {
                info!("Discarded temp file {}", temp_path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Temp file {} already absent", temp_path.display());
                Ok(())
            }
            Err(e) => Err(InfrastructureError::IoError(e)),
        }
    }
}

fn next_temp_name(name_hint: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
    temp_file_name(&timestamp, rand::random::<u32>(), name_hint)
}

// 失敗してもログのみ (呼び出し元の処理は続行する)
pub(super) async fn remove_if_present(path: &Path, what: &str) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed {} {}", what, path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {} {}: {}", what, path.display(), e),
    }
}
