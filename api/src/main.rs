/// Reelport API Server
///
/// Accepts media URLs, downloads them in the background through yt-dlp,
/// and serves job status plus the finished files.
mod routes;

use reelport_shared::job_registry::JobRegistry;
use reelport_shared::orchestrator::DownloadOrchestrator;
use reelport_shared::ytdlp::YtDlpExtractor;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state for all API handlers.
pub struct AppState {
    pub orchestrator: DownloadOrchestrator,
    pub download_dir: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelport_api=info,reelport_shared=info,tower_http=info".into()),
        )
        .init();

    // Config
    let api_host = env_or("API_HOST", "0.0.0.0");
    let api_port: u16 = env_parse("API_PORT", 8000);
    let download_dir = PathBuf::from(env_or("DOWNLOAD_DIR", "./downloads"));
    let static_dir = PathBuf::from(env_or("STATIC_DIR", "./static"));
    let ytdlp_bin = std::env::var("YTDLP_BIN").ok();
    let ytdlp_args: Vec<String> = std::env::var("YTDLP_ARGS")
        .map(|v| v.split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    let job_ttl: i64 = env_parse("JOB_TTL_SECS", 0);
    let cleanup_interval: u64 = env_parse("JOB_CLEANUP_INTERVAL", 300);

    std::fs::create_dir_all(&download_dir)?;
    info!("Download directory: {}", download_dir.display());

    // Job core
    let registry = JobRegistry::new();
    let extractor = Arc::new(YtDlpExtractor::new(ytdlp_bin, ytdlp_args));
    let state = Arc::new(AppState {
        orchestrator: DownloadOrchestrator::new(extractor, registry.clone(), download_dir.clone()),
        download_dir,
    });

    // Background job eviction
    if job_ttl > 0 {
        info!("Evicting finished jobs older than {}s every {}s", job_ttl, cleanup_interval);
        let cleanup_registry = registry.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(cleanup_interval.max(1)));
            loop {
                interval.tick().await;
                let evicted = cleanup_registry.evict_finished(job_ttl).await;
                if evicted > 0 {
                    let stats = cleanup_registry.stats().await;
                    info!("Evicted {} finished jobs ({} still tracked)", evicted, stats.total);
                }
            }
        });
    } else {
        info!("Job eviction disabled, registry grows for the process lifetime");
    }

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Router
    let app = routes::router(state)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Bind
    let addr = format!("{}:{}", api_host, api_port);
    info!("Reelport API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
