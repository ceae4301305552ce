use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::State;
use axum::http::{Method, Uri};
use axum::Json;
use serde::Serialize;

use crate::models::error::AppError;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime: f64,
    pub cache_usage: CacheUsage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheUsage {
    pub used_bytes: u64,
    pub max_bytes: u64,
    pub entries: usize,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = START_TIME
        .get()
        .map(|s| s.elapsed().as_secs_f64())
        .unwrap_or(0.0);

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime,
        cache_usage: CacheUsage {
            used_bytes: state.cache.used_bytes(),
            max_bytes: state.config.cache_max_bytes,
            entries: state.cache.entry_count(),
        },
    })
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "apiVersion": "v1",
        "buildHash": env!("CARGO_PKG_VERSION")
    }))
}

/// Catch-all for unknown routes so clients get the same problem shape as
/// every other error.
pub async fn fallback(method: Method, uri: Uri) -> AppError {
    AppError::RouteNotFound(format!("{} {}", method, uri.path()))
}
