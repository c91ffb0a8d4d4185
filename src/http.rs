use crate::metrics::Metrics;
use crate::monitor::Monitor;
use crate::state::{now_unix_ms, unix_seconds_f64};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const DEFAULT_HISTORY_MINUTES: u64 = 60;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub monitor: Monitor,
}

pub fn build_router(metrics: Arc<Metrics>, monitor: Monitor) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/health", get(health_handler))
        .route("/api/metrics", get(latest_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/history", get(history_handler))
        .route("/api/status", get(status_handler))
        .with_state(HttpAppState { metrics, monitor })
        .layer(CorsLayer::permissive())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    Json(state.monitor.health().await)
}

async fn latest_handler(State(state): State<HttpAppState>) -> Response {
    match state.monitor.latest().await {
        Some(snapshot) => Json(&*snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "метрики ещё не собраны" })),
        )
            .into_response(),
    }
}

async fn alerts_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let alerts = state.monitor.alerts().await;
    Json(json!({
        "count": alerts.len(),
        "alerts": alerts,
        "timestamp": unix_seconds_f64(now_unix_ms()),
    }))
}

async fn history_handler(
    State(state): State<HttpAppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let minutes = params
        .get("minutes")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_HISTORY_MINUTES);
    let history = state.monitor.history_since(minutes).await;
    let history: Vec<_> = history.iter().map(|s| &**s).collect();
    Json(json!({
        "minutes": minutes,
        "samples": history.len(),
        "history": history,
    }))
}

async fn status_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    Json(state.monitor.status().await)
}
