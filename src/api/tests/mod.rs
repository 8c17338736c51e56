use super::*;
use crate::downloader::test_helpers::{Script, ScriptedExtractor};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;


const A: &str = "https://video.example/watch/a";
const B: &str = "https://video.example/watch/b";

/// Helper to create a test MediaDownloader instance wrapped in Arc
async fn create_test_downloader(
    extractor: ScriptedExtractor,
) -> (Arc<MediaDownloader>, tempfile::TempDir) {
    let (downloader, temp_dir) =
        crate::downloader::test_helpers::create_test_downloader(Arc::new(extractor)).await;
    (Arc::new(downloader), temp_dir)
}

fn router_for(downloader: &Arc<MediaDownloader>) -> Router {
    create_router(downloader.clone(), downloader.config.clone())
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_stops_on_shutdown() {
    let (downloader, _temp_dir) = create_test_downloader(ScriptedExtractor::new()).await;

    let mut config = (*downloader.config).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap(); // OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let downloader = downloader.clone();
        let config = config.clone();
        async move { start_api_server(downloader, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    downloader.shutdown().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (downloader, _temp_dir) = create_test_downloader(ScriptedExtractor::new()).await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let (downloader, _temp_dir) = create_test_downloader(ScriptedExtractor::new()).await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["http://allowed.example".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let allowed = Request::builder()
        .uri("/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(allowed).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://allowed.example")
    );

    let denied = Request::builder()
        .uri("/health")
        .header("Origin", "http://other.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(denied).await.unwrap();
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_swagger_ui_can_be_disabled() {
    let (downloader, _temp_dir) = create_test_downloader(ScriptedExtractor::new()).await;

    let mut config = (*downloader.config).clone();
    config.server.api.swagger_ui = false;
    let app = create_router(downloader, Arc::new(config));

    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
