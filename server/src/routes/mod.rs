//! HTTP routes
//!
//! Every endpoint is mounted both at the root and under `/api`, matching the
//! two deployment layouts clients already use.

pub mod health;
pub mod predict;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

fn endpoints() -> Router<SharedState> {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health_check))
        .route("/predict", post(predict::predict))
        .route("/sessions", get(sessions::list_sessions))
        .route("/download/{session_id}", get(sessions::download))
}

/// Build the application router with middleware
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .merge(endpoints())
        .nest("/api", endpoints())
        // A nested "/" only matches "/api", clients also call "/api/"
        .route("/api/", get(health::index))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use cifar_classify::inference::{
        Classifier, ModelLoader, NormalizedTensor, Prediction,
    };
    use cifar_classify::{AppConfig, ClassifyError, NUM_CLASSES};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::state::AppState;

    const BOUNDARY: &str = "X-CIFAR-TEST-BOUNDARY";

    struct CatClassifier;

    impl Classifier for CatClassifier {
        fn predict(&self, _tensor: &NormalizedTensor) -> cifar_classify::Result<Prediction> {
            Ok(Prediction {
                class_index: 3,
                confidence: 0.9,
                probabilities: vec![0.01; NUM_CLASSES],
            })
        }
    }

    struct StubLoader {
        loads: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl ModelLoader for StubLoader {
        async fn load(&self) -> cifar_classify::Result<Arc<dyn Classifier>> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(ClassifyError::ModelUnavailable("hub unreachable".to_string()));
            }
            Ok(Arc::new(CatClassifier))
        }
    }

    struct TestApp {
        app: Router,
        _output: TempDir,
    }

    fn test_app(persist: bool, failures: usize) -> TestApp {
        let output = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.output_dir = output.path().to_path_buf();
        config.storage.persist = persist;

        let loader = Arc::new(StubLoader {
            loads: AtomicUsize::new(0),
            failures,
        });
        let state = Arc::new(AppState::with_loader(config, loader));
        TestApp {
            app: router(state),
            _output: output,
        }
    }

    fn jpeg_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(48, 48, Rgb([180, 120, 60]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, bytes) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn predict_request(uri: &str, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_corrupt_and_valid_image() {
        let test = test_app(true, 0);
        let cat = jpeg_bytes();
        let request = predict_request(
            "/predict",
            &[
                ("images", "broken.jpg", b"this is not an image".as_slice()),
                ("images", "cat.jpg", cat.as_slice()),
            ],
        );

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;

        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["filename"], "broken.jpg");
        assert_eq!(results[0]["class"], "error");
        assert!(results[0]["error"].is_string());
        assert_eq!(results[1]["class"], "cat");
        assert_eq!(results[1]["confidence"], 90.0);
        assert!(results[1].get("error").is_none());
        assert!(results[1]["saved_path"].as_str().unwrap().ends_with("cat.jpg"));
        assert_eq!(body["total_images"], 2);
        assert_eq!(body["class_counts"], serde_json::json!({ "cat": 1 }));
        assert!(body["session_id"].is_string());
    }

    #[tokio::test]
    async fn test_missing_images_field() {
        let test = test_app(true, 0);
        let request = predict_request("/predict", &[("other", "a.png", b"x".as_slice())]);

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No images provided");
    }

    #[tokio::test]
    async fn test_non_multipart_request() {
        let test = test_app(true, 0);
        let request = Request::builder()
            .method("POST")
            .uri("/api/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_filename_is_skipped() {
        let test = test_app(false, 0);
        let cat = jpeg_bytes();
        let request = predict_request("/predict", &[("images", "", cat.as_slice())]);

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total_images"], 0);
        assert!(body["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_without_persistence_has_no_session() {
        let test = test_app(false, 0);
        let cat = jpeg_bytes();
        let request = predict_request("/api/predict", &[("images", "cat.jpg", cat.as_slice())]);

        let response = test.app.oneshot(request).await.unwrap();
        let body = json_body(response).await;
        assert!(body.get("session_id").is_none());
        assert!(body["results"][0].get("saved_path").is_none());
        assert_eq!(body["results"][0]["class"], "cat");
    }

    #[tokio::test]
    async fn test_model_failure_then_retry() {
        let test = test_app(false, 1);
        let cat = jpeg_bytes();

        let first = test
            .app
            .clone()
            .oneshot(predict_request("/predict", &[("images", "cat.jpg", cat.as_slice())]))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(first).await["error"]
            .as_str()
            .unwrap()
            .contains("hub unreachable"));

        let second = test
            .app
            .oneshot(predict_request("/predict", &[("images", "cat.jpg", cat.as_slice())]))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_download_unknown_session() {
        let test = test_app(true, 0);

        let response = test
            .app
            .clone()
            .oneshot(get("/download/20200101_000000_deadbeef"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Session not found");

        let traversal = test.app.oneshot(get("/download/..")).await.unwrap();
        assert_ne!(traversal.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_then_download_and_list() {
        let test = test_app(true, 0);
        let cat = jpeg_bytes();

        let response = test
            .app
            .clone()
            .oneshot(predict_request("/predict", &[("images", "cat.jpg", cat.as_slice())]))
            .await
            .unwrap();
        let session_id = json_body(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let download = test
            .app
            .clone()
            .oneshot(get(&format!("/download/{session_id}")))
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_TYPE],
            "application/zip"
        );
        let disposition = download.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("classified_images_{session_id}.zip")));
        let bytes = to_bytes(download.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let listing = test.app.oneshot(get("/sessions")).await.unwrap();
        let body = json_body(listing).await;
        assert_eq!(body["sessions"], serde_json::json!([session_id]));
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let test = test_app(true, 0);

        let health = test.app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        let body = json_body(health).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "cifar10_resnet20");
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["classes"].as_array().unwrap().len(), 10);

        let index = test.app.oneshot(get("/api/")).await.unwrap();
        assert_eq!(index.status(), StatusCode::OK);
        assert!(json_body(index).await["endpoints"].is_object());
    }

    #[tokio::test]
    async fn test_index_and_health_on_every_mount() {
        let test = test_app(false, 0);

        for path in ["/", "/api", "/api/", "/health", "/api/health", "/sessions", "/api/sessions"] {
            let response = test.app.clone().oneshot(get(path)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {path}");
        }

        let index = json_body(test.app.oneshot(get("/api/")).await.unwrap()).await;
        assert!(index["endpoints"]["/api/predict"].is_string());
        assert!(index["endpoints"]["/predict"].is_string());
    }
}
