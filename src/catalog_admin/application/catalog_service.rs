use std::path::PathBuf;
use std::sync::Arc;
use super::error::ApplicationError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::catalog::ImageMerge;
use crate::domain::error::DomainError;
use crate::domain::image_processor_trait::ImageProcessor;
use crate::domain::resize_spec::{ImageSurface, ResizeSpec};
use crate::domain::staged_file::{final_file_name, is_temp_file_name, StagedFile};
use crate::domain::upload_path::UploadLocation;
use crate::infrastructure::backup_writer::BackupWriter;
use crate::infrastructure::catalog_store::{CatalogUpdate, JsonCatalogStore, PendingImage};
use crate::infrastructure::config::Config;
use crate::infrastructure::file_storage::LocalStagingStore;
use crate::infrastructure::settings::SettingsSource;

/// One image upload, as parsed from the multipart form.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub image: Option<Vec<u8>>,
    pub product_name: String,
    pub is_temp_upload: bool,
    /// Full catalog JSON; required unless `is_temp_upload`.
    pub catalog_payload: Option<Vec<u8>>,
    pub surface: ImageSurface,
}

/// 一時ファイルのライフサイクル操作 (`op` で種類を明示する)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op")]
pub enum StagingOperation {
    #[serde(rename = "moveTempFile", rename_all = "camelCase")]
    MoveTempFile {
        temp_path: String,
        final_path: String,
        #[serde(default)]
        original_image: Option<String>,
    },
    #[serde(rename = "deleteTempFile", rename_all = "camelCase")]
    DeleteTempFile { temp_file_path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ApiResponse {
    fn success(message: Option<String>, image_path: Option<String>) -> Self {
        Self {
            status: "success",
            message,
            image_path,
            warning: None,
        }
    }

    fn catalog_updated(update: &CatalogUpdate) -> Self {
        let message = match &update.backup_path {
            Some(path) => format!("Products updated successfully. Backup created at {}", path.display()),
            None => "Products updated successfully.".to_string(),
        };
        Self::success(Some(message), None)
    }
}

/// アップロード → リサイズ → 一時保存 → db.json 更新 → commit をまとめるサービス
pub struct CatalogService {
    image_processor: Arc<dyn ImageProcessor + Send + Sync>, // トレイトオブジェクトとして保持
    staging: LocalStagingStore,
    catalog: JsonCatalogStore,
    settings: SettingsSource,
    location: UploadLocation,
    // db.json への書き込みは同時に1つだけ
    write_lock: Mutex<()>,
}

impl CatalogService {
    pub fn new(
        image_processor: Arc<dyn ImageProcessor + Send + Sync>,
        staging: LocalStagingStore,
        catalog: JsonCatalogStore,
        settings: SettingsSource,
        location: UploadLocation,
    ) -> Self {
        Self {
            image_processor,
            staging,
            catalog,
            settings,
            location,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config, image_processor: Arc<dyn ImageProcessor + Send + Sync>) -> Self {
        Self::new(
            image_processor,
            LocalStagingStore::new(&config.uploads_dir),
            JsonCatalogStore::new(&config.store_path, BackupWriter::new(&config.backup_dir)),
            SettingsSource::new(&config.settings_path),
            UploadLocation::new(&config.uploads_dir, &config.uploads_url_prefix),
        )
    }

    pub async fn upload_image(&self, request: UploadRequest) -> Result<ApiResponse, ApplicationError> {
        info!(
            "CatalogService: upload for {:?} (temp: {}, surface: {:?})",
            request.product_name, request.is_temp_upload, request.surface
        );
        let image = request.image.filter(|bytes| !bytes.is_empty());

        if request.is_temp_upload {
            let image = image.ok_or_else(|| ApplicationError::InvalidInput("No image uploaded.".to_string()))?;
            let spec = self.settings.resize_spec(request.surface).await;
            let jpeg = self.process_image(image, spec).await?;
            let staged = self.staging.stage_temp(&jpeg, &request.product_name).await?;
            let image_path = self.web_path_of(staged.temp_path())?;
            return Ok(ApiResponse::success(None, Some(image_path)));
        }

        let payload = request
            .catalog_payload
            .ok_or_else(|| ApplicationError::InvalidInput("Missing catalog data.".to_string()))?;

        let staged = match image {
            Some(image) => {
                let final_name = final_file_name(&request.product_name).ok_or_else(|| {
                    ApplicationError::InvalidInput("A product name is required to save an image.".to_string())
                })?;
                let spec = self.settings.resize_spec(request.surface).await;
                let jpeg = self.process_image(image, spec).await?;
                let staged = self.staging.stage_temp(&jpeg, &request.product_name).await?;
                Some((staged.with_final_path(self.location.file_path(&final_name)), final_name))
            }
            None => None,
        };
        let pending = staged.as_ref().map(|(_, final_name)| PendingImage {
            name: request.product_name.clone(),
            image_path: self.location.web_path(final_name),
        });

        let _guard = self.write_lock.lock().await;
        let update = match self.catalog.update_catalog(&payload, pending.as_ref()).await {
            Ok(update) => update,
            Err(e) => {
                if let Some((staged, _)) = staged {
                    if let Err(discard_err) = self.staging.discard(staged).await {
                        warn!("Failed to discard staged upload: {}", discard_err);
                    }
                }
                return Err(e.into());
            }
        };

        let mut response = ApiResponse::catalog_updated(&update);
        if let (Some((staged, _)), Some(pending)) = (staged, pending) {
            let original = match &update.merge {
                Some(ImageMerge::Updated { previous_image: Some(previous), .. }) => self.location.resolve(previous).ok(),
                _ => None,
            };
            self.staging.commit(staged.with_original_path(original)).await?;

            if update.merge == Some(ImageMerge::NoMatch) {
                response.warning = Some(format!(
                    "No product named \"{}\" was found; the image was saved but is not linked to any record.",
                    pending.name
                ));
            }
            response.image_path = Some(pending.image_path);
        }
        Ok(response)
    }

    pub async fn apply_staging(&self, operation: StagingOperation) -> Result<ApiResponse, ApplicationError> {
        match operation {
            StagingOperation::MoveTempFile {
                temp_path,
                final_path,
                original_image,
            } => {
                let temp = self.resolve_temp(&temp_path)?;
                let destination = self.location.resolve(&final_path)?;
                // 旧画像がアップロードディレクトリ外なら削除しない
                let original = original_image
                    .as_deref()
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .and_then(|path| match self.location.resolve(path) {
                        Ok(resolved) => Some(resolved),
                        Err(e) => {
                            warn!("Keeping original image {:?}: {}", path, e);
                            None
                        }
                    });

                // 最終アップロードの commit と同じロックで直列化する
                let _guard = self.write_lock.lock().await;
                self.staging.commit(StagedFile::new(temp, destination, original)).await?;
                Ok(ApiResponse::success(
                    Some("File moved successfully.".to_string()),
                    Some(final_path.trim().trim_start_matches('/').to_string()),
                ))
            }
            StagingOperation::DeleteTempFile { temp_file_path } => {
                let temp = self.resolve_temp(&temp_file_path)?;
                self.staging.discard_path(&temp).await?;
                Ok(ApiResponse::success(Some("Temp file deleted.".to_string()), None))
            }
        }
    }

    pub async fn update_catalog(&self, raw_json: &[u8]) -> Result<ApiResponse, ApplicationError> {
        let _guard = self.write_lock.lock().await;
        let update = self.catalog.update_catalog(raw_json, None).await?;
        Ok(ApiResponse::catalog_updated(&update))
    }

    async fn process_image(&self, image: Vec<u8>, spec: ResizeSpec) -> Result<Vec<u8>, ApplicationError> {
        process_off_thread(Arc::clone(&self.image_processor), image, spec).await
    }

    fn resolve_temp(&self, web_path: &str) -> Result<PathBuf, ApplicationError> {
        let path = self.location.resolve(web_path)?;
        let is_temp = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(is_temp_file_name)
            .unwrap_or(false);
        if !is_temp {
            return Err(ApplicationError::InvalidInput(format!("{:?} is not a temp upload", web_path)));
        }
        Ok(path)
    }

    fn web_path_of(&self, path: &std::path::Path) -> Result<String, ApplicationError> {
        self.location
            .web_path_of(path)
            .ok_or_else(|| ApplicationError::InvalidInput(format!("Unusable file name {}", path.display())))
    }
}

// デコード/リサイズ/エンコードは CPU を使うので async プールの外で実行
pub async fn process_off_thread(
    processor: Arc<dyn ImageProcessor + Send + Sync>,
    image: Vec<u8>,
    spec: ResizeSpec,
) -> Result<Vec<u8>, ApplicationError> {
    let jpeg = tokio::task::spawn_blocking(move || run_pipeline(processor.as_ref(), &image, &spec))
        .await
        .map_err(|e| ApplicationError::TaskFailed(e.to_string()))??;
    Ok(jpeg)
}

/// decode → resample → encode. The decoded raster is dropped before encoding starts.
pub fn run_pipeline(
    processor: &(dyn ImageProcessor + Send + Sync),
    image_bytes: &[u8],
    spec: &ResizeSpec,
) -> Result<Vec<u8>, DomainError> {
    let raster = processor.decode(image_bytes)?;
    let resized = processor.resample(&raster, spec);
    drop(raster);
    processor.encode(&resized, spec.quality())
}
