use crate::domain::resize_spec::{ImageSurface, ResizeSpec};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSettings {
    pub max_width: u32,
    pub compression_quality: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    product: Option<SurfaceSettings>,
    #[serde(default)]
    popup: Option<SurfaceSettings>,
}

/// settings.json の読み取り専用ビュー (保存は別の管理画面が担当)
///
/// Read on every call so edits apply without a restart.
#[derive(Debug, Clone)]
pub struct SettingsSource {
    path: PathBuf,
}

impl SettingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn resize_spec(&self, surface: ImageSurface) -> ResizeSpec {
        let file = self.load().await;
        let entry = match surface {
            ImageSurface::Product => file.product,
            ImageSurface::Popup => file.popup,
        };
        let Some(settings) = entry else {
            return surface.default_spec();
        };
        ResizeSpec::new(settings.max_width, settings.compression_quality).unwrap_or_else(|e| {
            warn!("Ignoring {:?} settings in {}: {}", surface, self.path.display(), e);
            surface.default_spec()
        })
    }

    async fn load(&self) -> SettingsFile {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", self.path.display());
                return SettingsFile::default();
            }
            Err(e) => {
                warn!("Could not read settings {}: {}", self.path.display(), e);
                return SettingsFile::default();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!("Invalid settings file {}: {}", self.path.display(), e);
            SettingsFile::default()
        })
    }
}
