use super::error::InfrastructureError;
use super::image_processor::{resize_to, scaled_height, DecodeLimits, DefaultImageProcessor};
use crate::domain::image_processor_trait::ImageProcessor;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat};
use serde::Serialize;
use std::io::Cursor;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

const GALLERY_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
const THUMBNAIL_WIDTH: u32 = 300;
const THUMBNAIL_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEntry {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// 共有フォルダの画像一覧とサムネイル生成
pub struct ShareGallery {
    shares_dir: PathBuf,
    thumbnails_dir: PathBuf,
    url_prefix: String,
    limits: DecodeLimits,
}

impl ShareGallery {
    pub fn new(shares_dir: impl Into<PathBuf>, url_prefix: &str, limits: DecodeLimits) -> Self {
        let shares_dir = shares_dir.into();
        Self {
            thumbnails_dir: shares_dir.join("thumbnails"),
            shares_dir,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            limits,
        }
    }

    /// Image files in the shares directory, sorted by name, with thumbnails generated on demand.
    pub async fn list(&self) -> Result<Vec<ShareEntry>, InfrastructureError> {
        let mut reader = match fs::read_dir(&self.shares_dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_gallery_image(&name) {
                names.push(name);
            }
        }
        names.sort();

        let thumbnails_ready = match fs::create_dir_all(&self.thumbnails_dir).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to create thumbnails directory {}: {}. Thumbnail generation is disabled.",
                    self.thumbnails_dir.display(),
                    e
                );
                false
            }
        };

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let encoded = urlencoding::encode(&name).into_owned();
            let thumbnail_url = if thumbnails_ready {
                match self.ensure_thumbnail(&name).await {
                    Ok(()) => Some(format!("{}/thumbnails/{}", self.url_prefix, encoded)),
                    Err(e) => {
                        warn!("No thumbnail for {}: {}", name, e);
                        None
                    }
                }
            } else {
                None
            };
            entries.push(ShareEntry {
                url: format!("{}/{}", self.url_prefix, encoded),
                name,
                thumbnail_url,
            });
        }
        Ok(entries)
    }

    async fn ensure_thumbnail(&self, name: &str) -> Result<(), InfrastructureError> {
        let thumbnail_path = self.thumbnails_dir.join(name);
        if fs::try_exists(&thumbnail_path).await.unwrap_or(false) {
            return Ok(());
        }

        let source = fs::read(self.shares_dir.join(name)).await?;
        let limits = self.limits;
        let bytes = tokio::task::spawn_blocking(move || render_thumbnail(&source, limits))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        fs::write(&thumbnail_path, bytes).await?;
        debug!("Generated thumbnail {}", thumbnail_path.display());
        Ok(())
    }
}

fn is_gallery_image(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| GALLERY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

// 幅 300px 固定 (拡大もする)。PNG / GIF は形式とアルファを維持し、それ以外は JPEG
fn render_thumbnail(source: &[u8], limits: DecodeLimits) -> Result<Vec<u8>, InfrastructureError> {
    let raster = DefaultImageProcessor::new(limits).decode(source)?;
    let height = scaled_height(raster.width(), raster.height(), THUMBNAIL_WIDTH);
    let thumbnail = resize_to(raster.pixels(), THUMBNAIL_WIDTH, height);

    let mut buffer = Cursor::new(Vec::new());
    match raster.source_format() {
        Some(format @ (ImageFormat::Png | ImageFormat::Gif)) => {
            thumbnail.write_to(&mut buffer, format)?;
        }
        _ => {
            let rgb = thumbnail.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, THUMBNAIL_JPEG_QUALITY);
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(path: &std::path::Path, width: u32, height: u32) {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128])));
        image.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn test_is_gallery_image() {
        assert!(is_gallery_image("a.JPG"));
        assert!(is_gallery_image("b.jpeg"));
        assert!(is_gallery_image("c.Png"));
        assert!(is_gallery_image("d.gif"));
        assert!(!is_gallery_image("e.webp"));
        assert!(!is_gallery_image("notes.txt"));
        assert!(!is_gallery_image("README"));
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let gallery = ShareGallery::new(dir.path().join("shares"), "/shares", DecodeLimits::default());
        assert!(gallery.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_generates_thumbnails() {
        let dir = TempDir::new().unwrap();
        let shares = dir.path().join("shares");
        std::fs::create_dir_all(shares.join("nested")).unwrap();
        write_png(&shares.join("b photo.png"), 600, 401);
        std::fs::write(shares.join("a.txt"), b"text").unwrap();
        std::fs::write(shares.join("broken.jpg"), b"not an image").unwrap();

        let gallery = ShareGallery::new(&shares, "/shares", DecodeLimits::default());
        let entries = gallery.list().await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "b photo.png");
        assert_eq!(entries[0].url, "/shares/b%20photo.png");
        assert_eq!(entries[0].thumbnail_url.as_deref(), Some("/shares/thumbnails/b%20photo.png"));
        assert_eq!(entries[1].name, "broken.jpg");
        assert_eq!(entries[1].thumbnail_url, None);

        let thumbnail = image::open(shares.join("thumbnails").join("b photo.png")).unwrap();
        assert_eq!(thumbnail.dimensions(), (THUMBNAIL_WIDTH, 200)); // floor(401 * 300 / 600)
        assert!(thumbnail.color().has_alpha());
    }
}
