use super::error::InfrastructureError;
use super::file_storage::remove_if_present;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tracing::info;

const MAX_SAME_SECOND_BACKUPS: u32 = 1000;

/// 上書き前に db.json をタイムスタンプ付きファイルへコピーする
///
/// Snapshots are never rewritten or pruned.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    backup_dir: PathBuf,
}

impl BackupWriter {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Copies `store_path` verbatim to `db-<timestamp>.json`. Returns `None` when there is no store yet.
    pub async fn snapshot(&self, store_path: &Path) -> Result<Option<PathBuf>, InfrastructureError> {
        let exists = fs::try_exists(store_path)
            .await
            .map_err(|source| InfrastructureError::BackupFailed {
                path: store_path.to_path_buf(),
                source,
            })?;
        if !exists {
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|source| InfrastructureError::BackupFailed {
                path: self.backup_dir.clone(),
                source,
            })?;

        let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
        let backup_path = self.reserve_name(&stamp).await?;

        if let Err(source) = fs::copy(store_path, &backup_path).await {
            remove_if_present(&backup_path, "incomplete backup").await;
            return Err(InfrastructureError::BackupFailed {
                path: backup_path,
                source,
            });
        }

        info!("Backed up {} to {}", store_path.display(), backup_path.display());
        Ok(Some(backup_path))
    }

    // 同じ秒に複数回更新された場合は -1, -2 ... を付けて既存のバックアップを守る
    async fn reserve_name(&self, stamp: &str) -> Result<PathBuf, InfrastructureError> {
        for n in 0..MAX_SAME_SECOND_BACKUPS {
            let file_name = if n == 0 {
                format!("db-{}.json", stamp)
            } else {
                format!("db-{}-{}.json", stamp, n)
            };
            let candidate = self.backup_dir.join(file_name);
            match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(InfrastructureError::BackupFailed {
                        path: candidate,
                        source,
                    })
                }
            }
        }
        Err(InfrastructureError::BackupFailed {
            path: self.backup_dir.clone(),
            source: std::io::Error::new(ErrorKind::AlreadyExists, "too many backups within one second"),
        })
    }
}
