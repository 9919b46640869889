// Read-only HTTP surface: dashboard page, /api/metrics, /api/servers.
// All routes sit behind no-cache and (optional) basic-auth middleware.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Settings;
use crate::models::{AggregateMetrics, ServerMetrics};
use crate::monitor::MetricsStore;

static INDEX_HTML: &str = include_str!("../static/index.html");

const AUTH_REALM: &str = "Basic realm=\"Bandwidth Monitor\"";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<MetricsStore>,
    pub(crate) settings: Settings,
}

pub fn app(store: Arc<MetricsStore>, settings: Settings) -> Router {
    let state = AppState { store, settings };
    Router::new()
        .route("/", get(index_handler).fallback(method_not_allowed))
        .route(
            "/api/metrics",
            get(metrics_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/servers",
            get(servers_handler).fallback(method_not_allowed),
        )
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .layer(middleware::from_fn(no_cache))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(message.to_string()),
    };
    (status, Json(body)).into_response()
}

// Wire models. The server emits raw integers; formatting is client-side.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsData {
    total_rx: u64,
    total_tx: u64,
    grand_total_avg: u64,
    grand_total_peak: u64,
    dominant_server: String,
    servers: HashMap<String, ServerData>,
    history: Vec<HistoryData>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerData {
    name: String,
    ip: String,
    online: bool,
    rx: u64,
    tx: u64,
    total_rx: u64,
    total_tx: u64,
    avg_rx_24h: u64,
    avg_tx_24h: u64,
    peak_rx: u64,
    peak_tx: u64,
    peak_events: Vec<PeakEventData>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeakEventData {
    /// Hour start as "HH:MM".
    time: String,
    rx: u64,
    tx: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryData {
    /// Unix seconds.
    timestamp: i64,
    total_rx: u64,
    total_tx: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerListEntry {
    name: String,
    ip: String,
    online: bool,
    rx: u64,
    tx: u64,
    total_rx: u64,
    total_tx: u64,
    avg_rx_24h: u64,
    avg_tx_24h: u64,
    peak_rx: u64,
    peak_tx: u64,
    updated_at: DateTime<Utc>,
    error: String,
}

fn server_data(metrics: &ServerMetrics) -> ServerData {
    ServerData {
        name: metrics.name.clone(),
        ip: metrics.ip.clone(),
        online: metrics.online,
        rx: metrics.rx,
        tx: metrics.tx,
        total_rx: metrics.total_rx,
        total_tx: metrics.total_tx,
        avg_rx_24h: metrics.avg_rx_24h,
        avg_tx_24h: metrics.avg_tx_24h,
        peak_rx: metrics.peak_rx,
        peak_tx: metrics.peak_tx,
        peak_events: metrics
            .peak_events
            .iter()
            .map(|pe| PeakEventData {
                time: pe.time.format("%H:%M").to_string(),
                rx: pe.rx,
                tx: pe.tx,
            })
            .collect(),
        updated_at: metrics.updated_at,
        error: metrics.error.clone(),
    }
}

fn metrics_data(aggregate: &AggregateMetrics) -> MetricsData {
    MetricsData {
        total_rx: aggregate.total_rx,
        total_tx: aggregate.total_tx,
        grand_total_avg: aggregate.grand_total_avg,
        grand_total_peak: aggregate.grand_total_peak,
        dominant_server: aggregate.dominant_server.clone(),
        servers: aggregate
            .servers
            .iter()
            .map(|(name, metrics)| (name.clone(), server_data(metrics)))
            .collect(),
        history: aggregate
            .history
            .iter()
            .map(|entry| HistoryData {
                timestamp: entry.timestamp.timestamp(),
                total_rx: entry.total_rx,
                total_tx: entry.total_tx,
            })
            .collect(),
        updated_at: aggregate.updated_at,
    }
}

/// GET / — embedded dashboard page.
async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

/// GET /api/metrics — full aggregate: totals, per-server map, history ring.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let aggregate = state.store.snapshot();
    Json(ApiResponse::ok(metrics_data(&aggregate)))
}

/// GET /api/servers — flat per-server list (error field always present).
async fn servers_handler(State(state): State<AppState>) -> impl IntoResponse {
    let aggregate = state.store.snapshot();
    let servers: Vec<ServerListEntry> = aggregate
        .servers
        .values()
        .map(|metrics| ServerListEntry {
            name: metrics.name.clone(),
            ip: metrics.ip.clone(),
            online: metrics.online,
            rx: metrics.rx,
            tx: metrics.tx,
            total_rx: metrics.total_rx,
            total_tx: metrics.total_tx,
            avg_rx_24h: metrics.avg_rx_24h,
            avg_tx_24h: metrics.avg_tx_24h,
            peak_rx: metrics.peak_rx,
            peak_tx: metrics.peak_tx,
            updated_at: metrics.updated_at,
            error: metrics.error.clone(),
        })
        .collect();
    Json(ApiResponse::ok(servers))
}

async fn method_not_allowed() -> Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Disables client and proxy caching on every response.
async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

/// HTTP Basic Auth over all routes when enabled in settings.
async fn basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.settings.auth_enabled {
        return next.run(request).await;
    }

    let expected = format!(
        "{}:{}",
        state.settings.auth_user, state.settings.auth_pass
    );
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|value| BASE64_STANDARD.decode(value).ok())
        .and_then(|value| String::from_utf8(value).ok())
        .is_some_and(|credentials| credentials == expected);

    if !authorized {
        let mut response = json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM));
        return response;
    }
    next.run(request).await
}
