use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geofact::countries::CountryEnricher;
use geofact::geocoder::LocationResolver;
use geofact::narrator::FactNarrator;
use geofact::{
    Alert, ClientConfig, Coordinate, LookupOutcome, LookupSession, MapView, SessionSnapshot,
    connect,
};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Server configuration
struct ServerConfig {
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

/// Application state shared across all requests
struct AppState<R, E, N> {
    session: Arc<LookupSession<R, E, N>>,
    metrics: Arc<Metrics>,
}

impl<R, E, N> Clone for AppState<R, E, N> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Server metrics
struct Metrics {
    total_requests: AtomicU64,
    requests_in_flight: AtomicU64,
    start_time: Instant,
}

/// RAII guard for tracking in-flight requests
struct RequestGuard<'a>(&'a AtomicU64);

impl<'a> RequestGuard<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.total_requests.fetch_add(1, Ordering::Relaxed);
        metrics.requests_in_flight.fetch_add(1, Ordering::Relaxed);
        Self(&metrics.requests_in_flight)
    }
}

impl<'a> Drop for RequestGuard<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,geofact=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let client_config = ClientConfig::from_env();

    tracing::info!(
        "Using Nominatim at {}, country data at {}, model {} ({:?} commits)",
        client_config.nominatim_url,
        client_config.countries_url,
        client_config.model,
        client_config.commit_policy
    );
    let session = Arc::new(connect(&client_config).context("Failed to initialize session")?);

    let app = build_app(session);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Build the Axum application with routes and middleware
fn build_app<R, E, N>(session: Arc<LookupSession<R, E, N>>) -> Router
where
    R: LocationResolver + 'static,
    E: CountryEnricher + 'static,
    N: FactNarrator + 'static,
{
    let metrics = Arc::new(Metrics {
        total_requests: AtomicU64::new(0),
        requests_in_flight: AtomicU64::new(0),
        start_time: Instant::now(),
    });

    let state = AppState { session, metrics };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/state", get(get_state::<R, E, N>))
        .route("/api/click", post(click::<R, E, N>))
        .route("/api/search", post(search::<R, E, N>))
        .route("/api/metrics", get(get_metrics::<R, E, N>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Current display, view and marker, plus any pending alerts
async fn get_state<R, E, N>(State(state): State<AppState<R, E, N>>) -> Json<LookupResponse>
where
    R: LocationResolver,
    E: CountryEnricher,
    N: FactNarrator,
{
    Json(LookupResponse::collect(&state, None, None).await)
}

#[derive(Deserialize)]
struct ClickRequest {
    lat: f64,
    lng: f64,
}

/// Look up a clicked map point
async fn click<R, E, N>(
    State(state): State<AppState<R, E, N>>,
    Json(request): Json<ClickRequest>,
) -> Result<Json<LookupResponse>, ApiError>
where
    R: LocationResolver,
    E: CountryEnricher,
    N: FactNarrator,
{
    let _guard = RequestGuard::enter(&state.metrics);

    if !request.lat.is_finite() || !request.lng.is_finite() || request.lat.abs() > 90.0 {
        return Err(ApiError::BadRequest(format!(
            "Invalid coordinates: {}, {}",
            request.lat, request.lng
        )));
    }

    let before = state.session.snapshot().await.view;
    let outcome = state
        .session
        .click(Coordinate::new(request.lat, request.lng))
        .await;

    Ok(Json(
        LookupResponse::collect(&state, Some(outcome), Some(before)).await,
    ))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

/// Search for a place and look it up
async fn search<R, E, N>(
    State(state): State<AppState<R, E, N>>,
    Json(request): Json<SearchRequest>,
) -> Json<LookupResponse>
where
    R: LocationResolver,
    E: CountryEnricher,
    N: FactNarrator,
{
    let _guard = RequestGuard::enter(&state.metrics);

    tracing::info!("Searching for {:?}", request.query);
    let before = state.session.snapshot().await.view;
    let outcome = state.session.search(&request.query).await;

    Json(LookupResponse::collect(&state, Some(outcome), Some(before)).await)
}

#[derive(Serialize)]
struct LookupResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<LookupOutcome>,
    /// The page pans only when this is set
    view_changed: bool,
    #[serde(flatten)]
    snapshot: SessionSnapshot,
    alerts: Vec<Alert>,
}

impl LookupResponse {
    async fn collect<R, E, N>(
        state: &AppState<R, E, N>,
        outcome: Option<LookupOutcome>,
        view_before: Option<MapView>,
    ) -> Self
    where
        R: LocationResolver,
        E: CountryEnricher,
        N: FactNarrator,
    {
        let snapshot = state.session.snapshot().await;
        Self {
            outcome,
            view_changed: view_before.is_some_and(|view| view != snapshot.view),
            snapshot,
            alerts: state.session.take_alerts().await,
        }
    }
}

/// Get server metrics
async fn get_metrics<R, E, N>(State(state): State<AppState<R, E, N>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        total_requests: state.metrics.total_requests.load(Ordering::Relaxed),
        requests_in_flight: state.metrics.requests_in_flight.load(Ordering::Relaxed),
        uptime_seconds: state.metrics.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    total_requests: u64,
    requests_in_flight: u64,
    uptime_seconds: u64,
}

/// API error types
enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
