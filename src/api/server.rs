//! Report API Server implementation
//!
//! HTTP REST API server using Axum. Definitions and datasets are served from
//! a [`FileRepository`] rooted at the configured data directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use crate::core::{EngineOptions, ReportEngine, DEFAULT_PREVIEW_ROW_LIMIT};
use crate::repository::{FileRepository, ReportRepository};

/// API Server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Holds `reports/` and `datasets/`
    pub data_dir: PathBuf,
    pub preview_row_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("data"),
            preview_row_limit: DEFAULT_PREVIEW_ROW_LIMIT,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub version: String,
    pub engine: ReportEngine<Arc<dyn ReportRepository>>,
}

impl AppState {
    pub fn new(repository: Arc<dyn ReportRepository>, options: EngineOptions) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine: ReportEngine::new(repository).with_options(options),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        let repository: Arc<dyn ReportRepository> = Arc::new(FileRepository::new(&config.data_dir));
        let options = EngineOptions {
            preview_row_limit: config.preview_row_limit,
            ..EngineOptions::default()
        };
        Self::new(repository, options)
    }
}

/// All routes with CORS and request tracing
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Core API endpoints
        .route("/api/v1/preview", post(handlers::preview))
        .route("/api/v1/periods", post(handlers::periods))
        .route("/api/v1/validate", post(handlers::validate))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "report_server=info,report_engine=info,tower_http=info".into()),
        )
        .init();

    if !config.data_dir.is_dir() {
        warn!("Data directory {} does not exist; every report will be 404", config.data_dir.display());
    }

    let state = Arc::new(AppState::from_config(&config));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("📊 Report API Server starting on http://{}", addr);
    info!("   Data: {}", config.data_dir.display());
    info!("   Endpoints: /api/v1/preview, /api/v1/periods, /api/v1/validate");
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Report API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    // ==================== ApiConfig Tests ====================

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.preview_row_limit, 100);
    }

    #[test]
    fn test_config_address_format() {
        let config = ApiConfig {
            host: "192.168.1.100".to_string(),
            port: 9090,
            ..ApiConfig::default()
        };
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().unwrap();
        assert_eq!(addr.port(), 9090);
    }

    // ==================== AppState Tests ====================

    #[test]
    fn test_state_from_config_carries_row_limit() {
        let config = ApiConfig {
            preview_row_limit: 25,
            ..ApiConfig::default()
        };
        let state = AppState::from_config(&config);
        assert_eq!(state.engine.options().preview_row_limit, 25);
        assert_eq!(state.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_state_in_arc() {
        let state = Arc::new(AppState::new(
            Arc::new(InMemoryRepository::new()),
            EngineOptions::default(),
        ));
        let state_clone = Arc::clone(&state);
        assert_eq!(state.version, state_clone.version);
        assert_eq!(Arc::strong_count(&state), 2);
    }
}
