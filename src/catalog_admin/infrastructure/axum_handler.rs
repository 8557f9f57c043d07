use crate::application::catalog_service::{ApiResponse, CatalogService, StagingOperation, UploadRequest};
use crate::application::error::ApplicationError; // Added for handler return types
use crate::domain::resize_spec::ImageSurface;
use crate::infrastructure::config::Config;
use crate::infrastructure::image_processor::DefaultImageProcessor;
use crate::infrastructure::share_gallery::ShareGallery;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::header::HeaderName,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::debug;

const SHARES_URL_PREFIX: &str = "/shares";

#[derive(Clone)]
pub struct AppState {
    pub catalog_service: Arc<CatalogService>,
    pub share_gallery: Arc<ShareGallery>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let image_processor = Arc::new(DefaultImageProcessor::new(config.decode_limits()));
        Self {
            catalog_service: Arc::new(CatalogService::from_config(config, image_processor)),
            share_gallery: Arc::new(ShareGallery::new(
                &config.shares_dir,
                SHARES_URL_PREFIX,
                config.decode_limits(),
            )),
        }
    }
}

pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(vec![HeaderName::from_static("content-type")]);
    let uploads_route = format!("/{}", config.uploads_url_prefix.trim_matches('/'));

    let router = Router::new()
        .route("/api/upload-image", post(upload_image_handler).fallback(method_not_allowed_handler))
        .route("/api/staging", post(staging_handler).fallback(method_not_allowed_handler))
        .route("/api/update-db", post(update_db_handler).fallback(method_not_allowed_handler))
        .route("/api/shares", get(list_shares_handler).fallback(method_not_allowed_handler))
        .nest_service(&uploads_route, ServeDir::new(&config.uploads_dir))
        .nest_service(SHARES_URL_PREFIX, ServeDir::new(&config.shares_dir));

    let router = match &config.frontend_dir {
        Some(frontend) => router.fallback_service(ServeDir::new(frontend)),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// "true" / "1" / "on" を真とみなす (フォームから来る文字列)
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

fn multipart_error(e: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::InvalidInput(format!("Failed to read request data: {}", e))
}

pub async fn upload_image_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, ApplicationError> {
    let mut request = UploadRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => request.image = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
            "productName" => request.product_name = field.text().await.map_err(multipart_error)?,
            "isTempUpload" => request.is_temp_upload = parse_flag(&field.text().await.map_err(multipart_error)?),
            "products" => request.catalog_payload = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
            "imageType" => {
                request.surface = ImageSurface::from_form_value(&field.text().await.map_err(multipart_error)?)
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let response = state.catalog_service.upload_image(request).await?;
    Ok(Json(response))
}

pub async fn staging_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StagingOperation>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApplicationError> {
    let Json(operation) = payload.map_err(|rejection| ApplicationError::InvalidInput(rejection.body_text()))?;
    let response = state.catalog_service.apply_staging(operation).await?;
    Ok(Json(response))
}

pub async fn update_db_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ApiResponse>, ApplicationError> {
    if body.is_empty() {
        return Err(ApplicationError::InvalidInput("No data received.".to_string()));
    }
    let response = state.catalog_service.update_catalog(&body).await?;
    Ok(Json(response))
}

pub async fn list_shares_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApplicationError> {
    let files = state.share_gallery.list().await?;
    Ok(Json(json!({ "status": "success", "files": files })))
}

pub async fn method_not_allowed_handler() -> ApplicationError {
    ApplicationError::MethodNotAllowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    const BOUNDARY: &str = "catalog-admin-test-boundary";

    fn app(dir: &TempDir) -> Router {
        let config = Config::for_root(dir.path());
        build_router(Arc::new(AppState::from_config(&config)), &config)
    }

    fn multipart_body(fields: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, data) in fields {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[tokio::test]
    async fn test_upload_end_to_end() {
        let dir = TempDir::new().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2000, 1000, Rgb([30, 90, 160])));
        let mut jpeg = Cursor::new(Vec::new());
        image.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();
        let jpeg = jpeg.into_inner();

        let body = multipart_body(&[
            ("productName", None, &b"Widget"[..]),
            ("isTempUpload", None, &b"false"[..]),
            ("products", None, &br#"[{"name":"Widget","image":"old.jpg"}]"#[..]),
            ("image", Some("widget.jpg"), jpeg.as_slice()),
        ]);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload-image")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(app(&dir), request).await;

        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["status"], "success");
        let image_path = json["imagePath"].as_str().unwrap();
        assert!(image_path.ends_with("Widget.jpg"));

        let saved = image::open(dir.path().join(image_path)).unwrap();
        assert_eq!(saved.dimensions(), (1080, 540));

        let catalog: Value = serde_json::from_slice(&std::fs::read(dir.path().join("db.json")).unwrap()).unwrap();
        assert_eq!(catalog[0]["image"], image_path);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let body = multipart_body(&[
            ("productName", None, &b"Widget"[..]),
            ("isTempUpload", None, &b"1"[..]),
            ("image", Some("notes.txt"), &b"plain text, not an image"[..]),
        ]);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload-image")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(app(&dir), request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_delete_temp_file_never_created_is_success() {
        let dir = TempDir::new().unwrap();
        let request = post_json(
            "/api/staging",
            json!({"op": "deleteTempFile", "tempFilePath": "uploaded/temp_20260101000000_00c0ffee_Widget.jpg"}),
        );

        let (status, json) = send(app(&dir), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
    }

    #[tokio::test]
    async fn test_staging_rejects_untagged_payload() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(app(&dir), post_json("/api/staging", json!({"tempFilePath": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_update_db_validates_and_writes() {
        let dir = TempDir::new().unwrap();

        let bad = Request::builder()
            .method(Method::POST)
            .uri("/api/update-db")
            .body(Body::from("{oops"))
            .unwrap();
        let (status, json) = send(app(&dir), bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert!(!dir.path().join("db.json").exists());

        let (status, json) = send(app(&dir), post_json("/api/update-db", json!([{"name": "Sofa"}]))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Products updated successfully.");
        assert!(dir.path().join("db.json").exists());
    }

    #[tokio::test]
    async fn test_wrong_method_is_json_405() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/update-db")
            .body(Body::empty())
            .unwrap();

        let (status, json) = send(app(&dir), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json, json!({"status": "error", "message": "Invalid request method."}));
    }

    #[tokio::test]
    async fn test_list_shares() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("shares")).unwrap();
        DynamicImage::ImageRgb8(RgbImage::new(30, 20))
            .save_with_format(dir.path().join("shares/pic.jpg"), ImageFormat::Jpeg)
            .unwrap();

        let request = Request::builder().uri("/api/shares").body(Body::empty()).unwrap();
        let (status, json) = send(app(&dir), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["files"][0]["name"], "pic.jpg");
        assert_eq!(json["files"][0]["url"], "/shares/pic.jpg");
        assert_eq!(json["files"][0]["thumbnailUrl"], "/shares/thumbnails/pic.jpg");
    }
}
