mod handlers;
mod models;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::Method,
    middleware,
    response::Response,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use models::config::AppConfig;
use services::rate_limiter::RateLimiter;
use services::result_cache::ResultCache;
use services::topaz::TopazClient;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: ResultCache,
    pub topaz: TopazClient,
    pub enhance_limiter: RateLimiter,
    pub relay_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        Ok(AppState {
            cache: ResultCache::new(config.cache_ttl_secs, config.cache_max_bytes),
            topaz: TopazClient::new(config.clone())?,
            enhance_limiter: RateLimiter::new(config.rate_limit_enhance),
            relay_limiter: RateLimiter::new(config.rate_limit_relay),
            config,
        })
    }
}

async fn request_id_middleware(request: Request<Body>, next: axum::middleware::Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut response = next.run(request).await;
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", value);
    }
    response
}

fn app(state: Arc<AppState>) -> Router {
    let cors_origins: Vec<_> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(["Content-Type".parse().unwrap(), "X-Request-Id".parse().unwrap()])
        .expose_headers(["X-Request-Id".parse().unwrap(), "Retry-After".parse().unwrap()]);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
            )
        })
        .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
            tracing::info!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "response",
            );
        });

    let api_v1 = Router::new()
        .route("/enhance", axum::routing::post(handlers::enhance::enhance))
        .route(
            "/status/:process_id",
            axum::routing::get(handlers::enhance::status),
        )
        .route(
            "/download/:process_id",
            axum::routing::get(handlers::enhance::download),
        );

    // Slack over the upload cap so the multipart framing and text fields do
    // not push a maximum-size image over the body limit; the handler still
    // enforces the cap on the image part itself.
    let body_limit = state.config.max_upload_bytes as usize + 1024 * 1024;

    Router::new()
        .nest("/api/v1", api_v1)
        .route(
            "/api/health",
            axum::routing::get(handlers::health::health_check),
        )
        .route("/api/version", axum::routing::get(handlers::health::version))
        .fallback(handlers::health::fallback)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    handlers::health::init_start_time();

    if config.topaz_api_key.is_none() {
        tracing::warn!("TOPAZ_API_KEY is not set; enhancement requests will fail");
    }

    let config = Arc::new(config);
    let state = Arc::new(AppState::new(config.clone())?);

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_state.cache.cleanup_expired();
            cleanup_state.enhance_limiter.cleanup();
            cleanup_state.relay_limiter.cleanup();
        }
    });

    let addr = config.listen_addr.clone();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    tracing::info!("Shutdown signal received, draining connections...");
}
