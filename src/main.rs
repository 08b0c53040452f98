// Main entry point for the manga page translation service

use manga_translator::{
    core::{errors::InputError, Config, PipelineError, TranslationEngine},
    orchestration::{PageProcessingCoordinator, PipelineSettings},
    services::{CredentialStore, MemoryCredentialStore},
    utils::Metrics,
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    coordinator: Arc<PageProcessingCoordinator>,
    metrics: Metrics,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_translator={},tower_http=info,ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MANGA TRANSLATOR ===");
    info!(
        "Config: {} → {} via {}, pages in flight={}, models={}",
        config.translation.source_language,
        config.translation.target_language,
        config.translation.engine.display_name(),
        config.max_concurrent_pages(),
        config.models_dir().display()
    );

    let metrics = Metrics::new();
    let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::from_env());

    info!("Initializing page coordinator...");
    let coordinator = Arc::new(
        PageProcessingCoordinator::from_config(config.clone(), credentials, metrics.clone()).await?,
    );
    let state = AppState {
        coordinator,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/open", post(open_input))
        .route("/translate", post(translate_all))
        .route("/pages", get(list_pages))
        .route("/pages/:index/retranslate", post(retranslate_page))
        .route("/cache", delete(clear_cache))
        .route("/history", get(history))
        .route("/keys/:engine", put(store_key).delete(delete_key))
        .route("/settings", get(get_settings).put(update_settings))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET    /                          - Root endpoint");
    info!("  GET    /health                    - Health check");
    info!("  GET    /metrics                   - Prometheus metrics");
    info!("  GET    /stats                     - Detailed statistics");
    info!("  POST   /open                      - Open a folder, archive or image");
    info!("  POST   /translate                 - Translate every loaded page");
    info!("  GET    /pages                     - Page states and progress");
    info!("  POST   /pages/:index/retranslate  - Retranslate one page");
    info!("  DELETE /cache                     - Clear cache and reset pages");
    info!("  GET    /history                   - Recently opened inputs");
    info!("  PUT    /keys/:engine              - Store an API key");
    info!("  DELETE /keys/:engine              - Delete an API key");
    info!("  PUT    /settings                  - Set languages and engine");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::PageOutOfRange(_) | PipelineError::Input(InputError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        PipelineError::Input(InputError::ExtractionFailed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => {
            error!("Request failed: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

fn parse_engine(engine: &str) -> Result<TranslationEngine, ApiError> {
    engine
        .parse()
        .map_err(|e: manga_translator::ConfigError| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn root() -> &'static str {
    "Manga Translator - page OCR and translation service"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.coordinator.snapshot();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "pages": snapshot.total,
        "translated": snapshot.translated,
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("metrics");
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.record_endpoint_request("stats");
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

#[derive(Deserialize)]
struct OpenRequest {
    path: PathBuf,
}

async fn open_input(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.record_endpoint_request("open");
    info!("Opening {}", request.path.display());
    let pages = state
        .coordinator
        .open(&request.path)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(serde_json::json!({ "pages": pages })))
}

#[derive(Deserialize, Default)]
struct TranslateRequest {
    #[serde(default)]
    bypass_cache: bool,
}

/// Translate all loaded pages.
///
/// The body is optional; `{"bypass_cache": true}` forces every page through the pipeline.
async fn translate_all(
    State(state): State<AppState>,
    request: Option<Json<TranslateRequest>>,
) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("translate");
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let snapshot = state.coordinator.translate_all(request.bypass_cache).await;
    let missing_key = state.coordinator.take_missing_key_alert();

    Json(serde_json::json!({
        "missing_api_key": missing_key,
        "batch": snapshot,
    }))
}

async fn list_pages(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.coordinator.snapshot()))
}

async fn retranslate_page(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.record_endpoint_request("retranslate");
    let page = state
        .coordinator
        .retranslate(index)
        .await
        .map_err(pipeline_error)?;
    let missing_key = state.coordinator.take_missing_key_alert();
    Ok(Json(serde_json::json!({
        "missing_api_key": missing_key,
        "page": page,
    })))
}

async fn clear_cache(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let cleared = state
        .coordinator
        .clear_cache_and_reset()
        .await
        .map_err(pipeline_error)?;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

async fn history(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.coordinator.history().await.map_err(pipeline_error)?;
    Ok(Json(serde_json::json!(entries)))
}

#[derive(Deserialize)]
struct KeyRequest {
    api_key: String,
}

async fn store_key(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    Json(request): Json<KeyRequest>,
) -> Result<StatusCode, ApiError> {
    let engine = parse_engine(&engine)?;
    let credentials = state.coordinator.credentials();
    credentials.store(engine, &request.api_key);
    if credentials.has_key(engine) {
        info!("API key stored for {}", engine.display_name());
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::BAD_REQUEST, "API key must not be empty".to_string()))
    }
}

async fn delete_key(
    State(state): State<AppState>,
    Path(engine): Path<String>,
) -> Result<StatusCode, ApiError> {
    let engine = parse_engine(&engine)?;
    state.coordinator.credentials().delete(engine);
    info!("API key deleted for {}", engine.display_name());
    Ok(StatusCode::NO_CONTENT)
}

async fn get_settings(State(state): State<AppState>) -> Json<PipelineSettings> {
    Json(state.coordinator.settings())
}

async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<PipelineSettings>,
) -> Json<PipelineSettings> {
    state.coordinator.set_settings(settings);
    Json(settings)
}
