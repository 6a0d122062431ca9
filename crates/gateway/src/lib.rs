//! HTTP gateway for Ragline.
//!
//! A thin request boundary over [`QueryEngine`]:
//!
//! - `GET /health`: liveness plus document count
//! - `GET /models`: the model registry, in configuration order
//! - `POST /query`: answer a query
//! - `POST /reload`: reload the document store from disk
//!
//! Built on Axum. Failures come back as `{error: {kind, stage, message}}`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use ragline_config::AppConfig;
use ragline_core::{ErrorKind, GenerationRequest, GenerationResult, QueryFailure, Stage};
use ragline_engine::QueryEngine;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub engine: Arc<QueryEngine>,
    /// Where `POST /reload` reads documents from.
    pub documents_path: PathBuf,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/query", post(query_handler))
        .route("/reload", post(reload_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let engine = Arc::new(QueryEngine::from_config(&config)?);

    let state = Arc::new(GatewayState {
        engine,
        documents_path: config.documents_path.clone(),
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

// --- Errors ---

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: QueryFailure,
}

/// A query failure on its way out as an HTTP response.
pub struct ApiError(pub QueryFailure);

/// HTTP status for each failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::Configuration => StatusCode::BAD_REQUEST,
        ErrorKind::ContextOverflow => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Retrieval => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Auth | ErrorKind::Provider => StatusCode::BAD_GATEWAY,
        ErrorKind::DocumentNotFound => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        (status, Json(ErrorBody { error: self.0 })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(QueryFailure::new(
            Stage::Received,
            ErrorKind::InvalidRequest,
            rejection.body_text(),
        ))
    }
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub documents: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        documents: state.engine.store().snapshot().len(),
    })
}

#[derive(Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelSummary>,
    pub default: String,
}

async fn models_handler(State(state): State<SharedState>) -> Json<ModelsResponse> {
    let registry = state.engine.registry();
    Json(ModelsResponse {
        models: registry
            .list()
            .iter()
            .map(|m| ModelSummary {
                id: m.id.clone(),
                name: m.display_name().to_string(),
            })
            .collect(),
        default: registry.default_id().to_string(),
    })
}

async fn query_handler(
    State(state): State<SharedState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResult>, ApiError> {
    let Json(request) = payload?;
    let result = state.engine.query(request).await.map_err(ApiError)?;
    Ok(Json(result))
}

#[derive(Serialize, Deserialize)]
pub struct ReloadResponse {
    pub documents: usize,
}

async fn reload_handler(
    State(state): State<SharedState>,
) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    // Parsing a large corpus is blocking work.
    let reload = tokio::task::spawn_blocking(move || {
        state.engine.reload_documents(&state.documents_path)
    })
    .await;

    match reload {
        Ok(Ok(documents)) => Ok(Json(ReloadResponse { documents })),
        Ok(Err(e)) => {
            error!(error = %e, "Document reload failed, keeping current store");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "Document reload task aborted");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "reload aborted".into()))
        }
    }
}
