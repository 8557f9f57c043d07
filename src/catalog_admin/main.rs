mod application;
mod domain;
mod infrastructure;

use anyhow::Context;
use application::normalize_service::{ImageNormalizer, NormalizeReport};
use clap::Parser;
use infrastructure::axum_handler::{build_router, AppState};
use infrastructure::config::{Command, Config};
use infrastructure::image_processor::DefaultImageProcessor;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "catalog_admin=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    match config.command.clone() {
        Some(Command::Normalize { dirs, surface, dry_run }) => {
            let processor = Arc::new(DefaultImageProcessor::new(config.decode_limits()));
            let report = ImageNormalizer::from_config(&config, dirs, surface.into(), processor)
                .run(dry_run)
                .await
                .context("Image normalization failed")?;
            print_report(&report, dry_run);
            Ok(())
        }
        None => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_address().context("Invalid listen address")?;

    let state = Arc::new(AppState::from_config(&config));
    let app = build_router(state, &config);

    // サーバーの開始
    info!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("Server error")?;

    Ok(())
}

fn print_report(report: &NormalizeReport, dry_run: bool) {
    if dry_run {
        println!("{} images would be converted:", report.found.len());
        for path in &report.found {
            println!("  {}", path.display());
        }
        return;
    }

    println!("Converted: {}", report.converted);
    println!("Skipped (JPEG already exists): {}", report.skipped);
    println!("Failed: {}", report.failed);
    println!("Catalog image paths updated: {}", report.catalog_paths_updated);
    if let Some(backup) = &report.catalog_backup {
        println!("Catalog backup: {}", backup.display());
    }
}
