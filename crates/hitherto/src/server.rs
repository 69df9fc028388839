//! HTTP server for the research dashboard.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/context` | Assemble context for a query |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response envelope
//!
//! ```json
//! { "success": true, "data": [ { "page_content": "...", "metadata": { ... } } ],
//!   "timestamp": "2024-01-05T12:00:00Z" }
//! { "success": false, "error": "query must not be empty",
//!   "code": "invalid_request", "timestamp": "2024-01-05T12:00:00Z" }
//! ```
//!
//! Error codes: `invalid_request` (400), `upstream_unavailable` (503),
//! `superseded` (409).
//!
//! # Sessions
//!
//! Requests carrying an `x-session-id` header are tracked per session. A new
//! request cancels the session's previous one, which then answers 409.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser dashboard
//! can call the API from its own origin.

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use hitherto_core::context::{ContextChunk, ContextRequest};
use hitherto_core::error::ContextError;
use hitherto_core::models::{parse_filter_date, ContextFilters, DateRange};

use crate::config::Config;
use crate::context::ContextService;
use crate::inflight::InFlightRequests;

/// Header naming the dashboard session a request belongs to.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
struct AppState {
    service: ContextService,
    inflight: Arc<InFlightRequests>,
}

/// Build the application router around `service`.
pub fn router(service: ContextService) -> Router {
    let state = AppState {
        service,
        inflight: Arc::new(InFlightRequests::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/context", post(handle_context))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `service` on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, service: ContextService) -> Result<()> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Start the server on `[server].bind`.
pub async fn run_server(config: &Config) -> Result<()> {
    let service = ContextService::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    println!("hitherto listening on http://{}", listener.local_addr()?);
    serve(listener, service).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ============ Envelope ============

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            timestamp: Utc::now(),
        }
    }
}

/// Error that renders as the failure envelope.
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
        }
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        let status = match &err {
            ContextError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ContextError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ContextError::Cancelled => StatusCode::CONFLICT,
        };
        let message = match &err {
            ContextError::InvalidRequest(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            status,
            code: err.code(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            code: Some(self.code),
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /context ============

#[derive(Debug, Deserialize)]
struct ContextBody {
    query: String,
    #[serde(default)]
    categories: Option<Vec<String>>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    message_ids: Option<Vec<String>>,
    #[serde(default)]
    k: Option<i64>,
}

fn parse_body_date(field: &str, value: Option<&str>) -> Result<Option<chrono::NaiveDate>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_filter_date(raw).map(Some).ok_or_else(|| {
            ApiError::invalid(format!(
                "{} must be YYYY-MM-DD or RFC 3339, got '{}'",
                field, raw
            ))
        }),
    }
}

impl ContextBody {
    fn into_request(self) -> Result<ContextRequest, ApiError> {
        let range = DateRange::new(
            parse_body_date("start_date", self.start_date.as_deref())?,
            parse_body_date("end_date", self.end_date.as_deref())?,
        );
        let filters = ContextFilters::new(self.categories.unwrap_or_default(), range);
        Ok(ContextRequest {
            query: self.query,
            document_ids: self.message_ids.unwrap_or_default(),
            filters,
            k: self.k,
        })
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

async fn handle_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ContextBody>, JsonRejection>,
) -> Result<Json<ApiResponse<Vec<ContextChunk>>>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    let req = body.into_request()?;

    let result = match session_id(&headers) {
        Some(session) => {
            let inflight = state.inflight.begin(session);
            let result = state
                .service
                .assemble_until_cancelled(&req, inflight.token())
                .await;
            result.and_then(|r| inflight.settle(r).ok_or(ContextError::Cancelled))
        }
        None => state.service.assemble(&req).await,
    };

    match result {
        Ok(result) => Ok(Json(ApiResponse::ok(result.chunks))),
        Err(err) => {
            match &err {
                ContextError::UpstreamUnavailable { .. } => {
                    tracing::warn!(error = %err, "context request failed upstream")
                }
                _ => tracing::debug!(error = %err, "context request rejected"),
            }
            Err(err.into())
        }
    }
}
