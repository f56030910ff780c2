//! PatentGraph API Gateway
//!
//! HTTP surface over the aggregation pipeline.
//! Handles:
//! - Search, enrichment and similarity routes
//! - Summary slots for the external summarizer
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::Request,
    middleware::{from_fn, Next},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use patentgraph_common::{
    config::AppConfig,
    db::DbPool,
    metrics, PatentRepository, PatentStore, VERSION,
};
use patentgraph_scraper::{Aggregator, RospatentClient};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::oneshot};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{self, GlobalRateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub aggregator: Arc<Aggregator>,
    pub store: Arc<dyn PatentStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    }

    info!(service = %config.observability.service_name, "Starting PatentGraph API Gateway v{}", VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new().with_http_listener(metrics_addr).install()?;
        metrics::register_metrics();
        info!("Prometheus exporter listening on {}", metrics_addr);
    }

    // Initialize database connection
    info!("Connecting to database...");
    let pool = DbPool::new(&config.database).await?;
    let repository = PatentRepository::new(pool);
    if config.database.ensure_schema {
        repository.ensure_schema().await?;
    }
    let store: Arc<dyn PatentStore> = Arc::new(repository);

    // Upstream client and pipeline
    let client = RospatentClient::new(&config.upstream)?;
    let aggregator = Aggregator::new(Arc::new(client), store.clone(), &config.upstream);

    // Create app state
    let state = AppState {
        config: config.clone(),
        aggregator: Arc::new(aggregator),
        store,
    };

    // Build the router
    let limiter = rate_limit::from_config(&config.rate_limit);
    let app = create_router(state, limiter);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // In-flight requests get shutdown_timeout to finish once a signal arrives
    let (signalled, on_signal) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        Ok(()) = on_signal => {
            match tokio::time::timeout(config.shutdown_timeout(), &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(
                    timeout_secs = config.server.shutdown_timeout_secs,
                    "Graceful shutdown timed out, dropping open connections"
                ),
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, limiter: Option<Arc<GlobalRateLimiter>>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Aggregation
        .route("/search_full_info", post(handlers::search::search_full_info))
        .route("/search_similar", post(handlers::search::search_similar))
        .route("/similar_family_simple/{id}", get(handlers::search::similar_family_simple))

        // Stored records
        .route("/enrich", post(handlers::patents::enrich))
        .route("/patents", post(handlers::patents::existing_patents))
        .route(
            "/patents/{id}/summaries/{category}",
            get(handlers::patents::get_summary).put(handlers::patents::put_summary),
        )
        .route_layer(from_fn(middleware::metrics::track_metrics));

    if let Some(limiter) = limiter {
        let limit = state.config.rate_limit.requests_per_second;
        api_routes = api_routes.layer(from_fn(move |request: Request, next: Next| {
            rate_limit::rate_limit_middleware(request, next, limiter.clone(), limit)
        }));
    }

    // Compose the app
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use patentgraph_common::{AggregationResult, MemoryStore, Patent};
    use patentgraph_scraper::MockPlatform;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(platform: MockPlatform, limiter: Option<Arc<GlobalRateLimiter>>) -> (Router, Arc<MemoryStore>) {
        app_with(AppConfig::default(), platform, limiter)
    }

    fn app_with(
        config: AppConfig,
        platform: MockPlatform,
        limiter: Option<Arc<GlobalRateLimiter>>,
    ) -> (Router, Arc<MemoryStore>) {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let aggregator = Aggregator::new(Arc::new(platform), store.clone(), &config.upstream);
        let state = AppState {
            config,
            aggregator: Arc::new(aggregator),
            store: store.clone(),
        };
        (create_router(state, limiter), store)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let (app, _) = app(MockPlatform::new(), None);

        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = call(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"]["status"], "up");
    }

    #[tokio::test]
    async fn test_search_full_info() {
        let platform = MockPlatform::new().with_search(json!({
            "total": 1,
            "hits": [{ "id": "RU123_20230101", "biblio": { "ru": { "title": "Насос" } } }]
        }));
        let (app, store) = app(platform, None);

        let (status, body) = call(&app, Method::POST, "/v1/search_full_info", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["patents"][0]["title_ru"], "Насос");
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_invalid_search_is_bad_request() {
        let (app, _) = app(MockPlatform::new(), None);
        let (status, body) = call(&app, Method::POST, "/v1/search_full_info", Some(json!({ "limit": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_similar_family_route() {
        let platform = MockPlatform::new().with_family(
            "RU001",
            json!({ "hits": [{ "id": "RU002", "similarity": 0.9, "similarity_norm": 0.8 }] }),
        );
        let (app, _) = app(platform, None);

        let (status, body) = call(&app, Method::GET, "/v1/similar_family_simple/RU001", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["first_id"], "RU001");
        assert_eq!(body[0]["second_id"], "RU002");
        assert_eq!(body[0]["referred_id"], "RU002");
    }

    #[tokio::test]
    async fn test_upstream_outage_is_bad_gateway() {
        let platform = MockPlatform::new().failing(patentgraph_scraper::Endpoint::Family);
        let (app, _) = app(platform, None);

        let (status, _) = call(&app, Method::GET, "/v1/similar_family_simple/RU001", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_similar_search_rejects_blank_id() {
        let (app, _) = app(MockPlatform::new(), None);
        let (status, body) = call(&app, Method::POST, "/v1/search_similar", Some(json!({ "id": "\r\n" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_enrich_requires_ids() {
        let (app, _) = app(MockPlatform::new(), None);
        let (status, _) = call(&app, Method::POST, "/v1/enrich", Some(json!({ "ids": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_enrich_and_lookup() {
        let platform = MockPlatform::new().with_document("RU1", json!({ "claims": { "ru": "1. Насос" } }));
        let (app, _) = app(platform, None);

        let (status, body) = call(&app, Method::POST, "/v1/enrich", Some(json!({ "ids": ["RU1"] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enriched"], 1);

        let (status, body) = call(&app, Method::POST, "/v1/patents", Some(json!({ "ids": ["RU1", "RU2"] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["claims_ru"], "1. Насос");
    }

    #[tokio::test]
    async fn test_summary_round_trip() {
        let (app, store) = app(MockPlatform::new(), None);
        store
            .persist(&AggregationResult {
                patents: vec![Patent {
                    abstract_ru: Some("Реферат".into()),
                    ..Patent::with_id("RU1")
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        let summary = json!({ "title": "Насос", "body": "Кратко о насосе" });
        let (status, _) = call(&app, Method::PUT, "/v1/patents/RU1/summaries/abstract", Some(summary)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, Method::GET, "/v1/patents/RU1/summaries/abstract", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Реферат");
        assert_eq!(body["summary"]["title"], "Насос");

        let (status, _) = call(&app, Method::GET, "/v1/patents/RU1/summaries/preface", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/v1/patents/RU404/summaries/all", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 1;
        let platform = MockPlatform::new().with_delay(std::time::Duration::from_secs(5));
        let (app, store) = app_with(config, platform, None);

        let (status, _) = call(&app, Method::POST, "/v1/search_full_info", Some(json!({}))).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let limiter = rate_limit::create_rate_limiter(1, 1);
        let (app, _) = app(MockPlatform::new(), Some(limiter));

        let (first, _) = call(&app, Method::POST, "/v1/patents", Some(json!({ "ids": ["RU1"] }))).await;
        let (second, body) = call(&app, Method::POST, "/v1/patents", Some(json!({ "ids": ["RU1"] }))).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");

        let (health, _) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(health, StatusCode::OK);
    }
}
