use super::image_processor::DecodeLimits;
use crate::domain::resize_spec::ImageSurface;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Catalog admin server
#[derive(Parser, Debug, Clone)]
#[command(name = "catalog_admin")]
#[command(about = "Self-hosted product catalog editor with image uploads and a shared-files gallery")]
pub struct Config {
    #[arg(long, env = "CATALOG_ADMIN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "CATALOG_ADMIN_PORT", default_value_t = 3300)]
    pub port: u16,

    /// Product database (JSON array of records)
    #[arg(long, env = "CATALOG_ADMIN_STORE_PATH", default_value = "db.json")]
    pub store_path: PathBuf,

    /// One timestamped copy of the store is written here before every update
    #[arg(long, env = "CATALOG_ADMIN_BACKUP_DIR", default_value = "database-backup")]
    pub backup_dir: PathBuf,

    #[arg(long, env = "CATALOG_ADMIN_UPLOADS_DIR", default_value = "uploaded")]
    pub uploads_dir: PathBuf,

    /// Prefix of the image paths stored in the catalog, also the URL the uploads are served under
    #[arg(long, env = "CATALOG_ADMIN_UPLOADS_PREFIX", default_value = "uploaded")]
    pub uploads_url_prefix: String,

    #[arg(long, env = "CATALOG_ADMIN_SHARES_DIR", default_value = "shares")]
    pub shares_dir: PathBuf,

    /// Image settings per surface (`product`, `popup`); defaults apply when absent
    #[arg(long, env = "CATALOG_ADMIN_SETTINGS_PATH", default_value = "settings.json")]
    pub settings_path: PathBuf,

    /// Static frontend to serve for unmatched routes
    #[arg(long, env = "CATALOG_ADMIN_FRONTEND_DIR")]
    pub frontend_dir: Option<PathBuf>,

    #[arg(long, env = "CATALOG_ADMIN_MAX_UPLOAD_BYTES", default_value_t = 32 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "CATALOG_ADMIN_MAX_IMAGE_DIMENSION", default_value_t = 12_000)]
    pub max_image_dimension: u32,

    #[arg(long, env = "CATALOG_ADMIN_MAX_DECODE_ALLOC", default_value_t = 512 * 1024 * 1024)]
    pub max_decode_alloc_bytes: u64,

    /// Runs the HTTP server when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Re-encode PNG / GIF / WebP images as JPEG and point db.json at the new files
    Normalize {
        /// Directory to scan recursively; repeatable (default: the uploads directory)
        #[arg(long = "dir")]
        dirs: Vec<PathBuf>,
        /// Which surface's width/quality settings to apply
        #[arg(long, value_enum, default_value = "product")]
        surface: SurfaceArg,
        /// List the images that would be converted without touching anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SurfaceArg {
    Product,
    Popup,
}

impl From<SurfaceArg> for ImageSurface {
    fn from(value: SurfaceArg) -> Self {
        match value {
            SurfaceArg::Product => ImageSurface::Product,
            SurfaceArg::Popup => ImageSurface::Popup,
        }
    }
}

impl Config {
    pub fn bind_address(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_dimension: self.max_image_dimension,
            max_alloc_bytes: self.max_decode_alloc_bytes,
        }
    }

    #[cfg(test)]
    pub fn for_root(root: &std::path::Path) -> Self {
        let mut config = Config::parse_from(["catalog_admin"]);
        config.store_path = root.join("db.json");
        config.backup_dir = root.join("database-backup");
        config.uploads_dir = root.join("uploaded");
        config.uploads_url_prefix = "uploaded".to_string();
        config.shares_dir = root.join("shares");
        config.settings_path = root.join("settings.json");
        config.frontend_dir = None;
        config
    }
}
