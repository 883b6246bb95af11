use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;
use crate::storage::StoreError;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut status = "healthy";
    let mut dependencies = serde_json::Map::new();

    let storage_health = check_storage(&state).await;
    dependencies.insert("storage".to_string(), json!(storage_health));
    if storage_health.get("status").and_then(|v| v.as_str()) != Some("healthy") {
        status = "degraded";
    }

    // Fallback content keeps the game playable without remote storage, so a
    // degraded instance still answers 200.
    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "service": "quadword-api",
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": state.sessions.active_count().await,
            "dependencies": dependencies
        })),
    )
}

async fn check_storage(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        state.puzzles.probe_content(),
    )
    .await
    {
        Ok(Ok(count)) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert(
                "message".to_string(),
                json!(format!("Content bucket reachable ({} puzzles)", count)),
            );
        }
        Ok(Err(StoreError::Unconfigured)) => {
            result.insert("status".to_string(), json!("degraded"));
            result.insert(
                "message".to_string(),
                json!("No remote storage configured, fallback content active"),
            );
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("degraded"));
            result.insert("error".to_string(), json!(format!("Storage error: {}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("degraded"));
            result.insert("error".to_string(), json!("Storage timeout after 1s"));
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Metrics authentication middleware - protects /metrics endpoint with HTTP Basic Auth
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Get Authorization header
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Check if it's Basic auth
    if !auth_header.starts_with("Basic ") {
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Decode base64 credentials
    let encoded = &auth_header[6..];
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    // Get expected credentials from environment variable
    // Format: username:password
    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());

    // Compare credentials
    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Credentials are valid, proceed with request
    Ok(next.run(request).await)
}

pub mod sessions;
