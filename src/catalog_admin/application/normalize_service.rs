use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog_service::process_off_thread;
use super::error::ApplicationError;
use crate::domain::conversion::normalized_path;
use crate::domain::image_processor_trait::ImageProcessor;
use crate::domain::resize_spec::{ImageSurface, ResizeSpec};
use crate::infrastructure::backup_writer::BackupWriter;
use crate::infrastructure::catalog_store::JsonCatalogStore;
use crate::infrastructure::config::Config;
use crate::infrastructure::image_library::ImageLibrary;
use crate::infrastructure::settings::SettingsSource;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Every convertible image found, converted or not.
    pub found: Vec<PathBuf>,
    pub converted: usize,
    /// The `.jpg` counterpart already existed.
    pub skipped: usize,
    pub failed: usize,
    pub catalog_paths_updated: usize,
    pub catalog_backup: Option<PathBuf>,
}

/// 既存の画像フォルダを一括で JPEG に揃え、db.json の画像パスを書き換える
///
/// Each original is copied to `<name>.backup` before conversion and removed once the JPEG is in
/// place. A failed conversion leaves the original where it was.
pub struct ImageNormalizer {
    image_processor: Arc<dyn ImageProcessor + Send + Sync>,
    library: ImageLibrary,
    catalog: JsonCatalogStore,
    settings: SettingsSource,
    surface: ImageSurface,
    // db.json の画像パスはこのディレクトリからの相対パス
    catalog_root: PathBuf,
}

impl ImageNormalizer {
    pub fn new(
        image_processor: Arc<dyn ImageProcessor + Send + Sync>,
        library: ImageLibrary,
        catalog: JsonCatalogStore,
        settings: SettingsSource,
        surface: ImageSurface,
        catalog_root: PathBuf,
    ) -> Self {
        Self {
            image_processor,
            library,
            catalog,
            settings,
            surface,
            catalog_root,
        }
    }

    pub fn from_config(
        config: &Config,
        dirs: Vec<PathBuf>,
        surface: ImageSurface,
        image_processor: Arc<dyn ImageProcessor + Send + Sync>,
    ) -> Self {
        let dirs = if dirs.is_empty() {
            vec![config.uploads_dir.clone()]
        } else {
            dirs
        };
        let catalog_root = match config.store_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::new(
            image_processor,
            ImageLibrary::new(dirs),
            JsonCatalogStore::new(&config.store_path, BackupWriter::new(&config.backup_dir)),
            SettingsSource::new(&config.settings_path),
            surface,
            catalog_root,
        )
    }

    pub async fn run(&self, dry_run: bool) -> Result<NormalizeReport, ApplicationError> {
        let found = self.library.scan().await?;
        let mut report = NormalizeReport::default();
        if dry_run {
            report.found = found;
            return Ok(report);
        }

        let spec = self.settings.resize_spec(self.surface).await;
        let mut renamed = HashMap::new();
        for (index, source) in found.iter().enumerate() {
            let target = normalized_path(source);
            let progress = format!("[{}/{}]", index + 1, found.len());

            if self.library.exists(&target).await? {
                info!("{} Skipping {} ({} already exists)", progress, source.display(), target.display());
                report.skipped += 1;
            } else {
                match self.convert(source, &target, spec).await {
                    Ok(()) => {
                        info!("{} Converted {} -> {}", progress, source.display(), target.display());
                        report.converted += 1;
                    }
                    Err(e) => {
                        warn!("{} Failed to convert {}: {}", progress, source.display(), e);
                        report.failed += 1;
                        continue;
                    }
                }
            }

            if let Some((from, to)) = self.catalog_rename(source, &target).await {
                renamed.insert(from, to);
            }
        }

        if !renamed.is_empty() {
            let rewrite = self.catalog.rewrite_images(|image| renamed.get(image).cloned()).await?;
            report.catalog_paths_updated = rewrite.updated;
            report.catalog_backup = rewrite.backup_path;
        }
        report.found = found;
        Ok(report)
    }

    async fn convert(&self, source: &Path, target: &Path, spec: ResizeSpec) -> Result<(), ApplicationError> {
        let backup = self.library.back_up(source).await?;

        let result = async {
            let bytes = self.library.read(source).await?;
            let jpeg = process_off_thread(Arc::clone(&self.image_processor), bytes, spec).await?;
            self.library.write_converted(target, &jpeg).await?;
            Ok::<(), ApplicationError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.library.remove(source, "converted original").await;
                Ok(())
            }
            Err(e) => {
                // 元ファイルはそのまま残っているのでバックアップは不要
                self.library.remove(&backup, "unused backup").await;
                Err(e)
            }
        }
    }

    // (旧パス, 新パス) を db.json の表記で返す
    async fn catalog_rename(&self, source: &Path, target: &Path) -> Option<(String, String)> {
        let to = self.library.catalog_path_of(&self.catalog_root, target).await?;
        let file_name = source.file_name()?.to_str()?;
        let from = match to.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, file_name),
            None => file_name.to_string(),
        };
        Some((from, to))
    }
}
