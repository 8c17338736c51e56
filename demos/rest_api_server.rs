//! REST API server example
//!
//! Runs media-dl with the REST API, the retention sweeper and signal handling.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Submit a job via POST http://localhost:6790/jobs
//! - Download synchronously via POST http://localhost:6790/download
//! - Stream events via GET http://localhost:6790/events
//!
//! Set `RUST_LOG=media_dl=debug` for per-attempt detail.

use media_dl::config::{ApiConfig, Config, DownloadConfig, ServerIntegrationConfig};
use media_dl::{MediaDownloader, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config {
        download: DownloadConfig {
            store_dir: "media-store".into(),
            workspace_dir: "media-workspaces".into(),
            ..Default::default()
        },
        server: ServerIntegrationConfig {
            api: ApiConfig {
                cors_enabled: true,
                cors_origins: vec!["*".to_string()],
                swagger_ui: true,
                ..Default::default()
            },
        },
        ..Default::default()
    };
    let address = config.server.api.bind_address;

    let downloader = MediaDownloader::new(config).await?;
    let capabilities = downloader.capabilities().await;
    println!(
        "extractor: {} ({} strategies, credentials: {:?})",
        capabilities.extractor, capabilities.strategies, capabilities.credential_sources
    );

    let sweeper = downloader.start_retention_sweeper();
    let server = downloader.spawn_api_server();

    println!("Swagger UI: http://{address}/swagger-ui");
    println!("Events stream: http://{address}/events");
    println!();
    println!("Example commands:");
    println!("  curl -X POST http://{address}/download \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"urls\": [\"https://www.youtube.com/watch?v=dQw4w9WgXcQ\"], \"format\": \"mp3\", \"audioOnly\": true}}' \\"
    );
    println!("    -OJ");
    println!();
    println!("  curl -N http://{address}/events");

    run_with_shutdown(downloader).await?;

    sweeper.await?;
    server.await??;

    Ok(())
}
