use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{CacheStore, CircuitState, MemoryStore, RankCache, RedisStore};
use crate::config::{CacheBackend, Config, ServerConfig};
use crate::database::PostgresRoomRepository;
use crate::error::{RankError, RankResult, ValidationError};
use crate::ml::ModelLoader;
use crate::observability::{truncate_for_log, MetricsRegistry};
use crate::ranking::{RankingService, RoomRanker};
use crate::types::{HealthResponse, RankedRoomsResponse, ReviewCreatedEvent, SentimentRequest, SentimentResponse};

/// HTTP front of the ranking service
pub struct RankServer {
    app: Router,
    config: Config,
}

/// Shared application state
pub struct AppState {
    /// Server limits and timeouts
    pub server: ServerConfig,
    /// Ranking pipeline
    pub service: Arc<RankingService>,
    /// Rank cache, for breaker state in metrics
    pub cache: Arc<RankCache>,
    /// Prometheus collectors
    pub metrics: MetricsRegistry,
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Query string of the locality endpoints
#[derive(Debug, Default, Deserialize)]
pub struct LocalityQuery {
    pub locality: Option<String>,
    /// Alias used by `/rank`
    pub query: Option<String>,
}

impl LocalityQuery {
    fn locality(&self) -> Result<&str, ValidationError> {
        self.locality
            .as_deref()
            .or(self.query.as_deref())
            .ok_or(ValidationError::MissingLocality)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,
    /// Whether a locality entry was targeted
    pub invalidated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateAllResponse {
    pub ok: bool,
    pub cleared: u64,
}

impl RankServer {
    /// Wire the model, storage, cache and ranking pipeline.
    ///
    /// Fails when the sentiment model cannot be loaded; the service never runs without one.
    pub async fn new(config: Config) -> RankResult<Self> {
        info!("Initializing rank server components...");

        let model = ModelLoader::new(&config.ml).load().await?;

        let repository = Arc::new(PostgresRoomRepository::new(&config.database)?);

        let store: Arc<dyn CacheStore> = match config.redis.backend {
            CacheBackend::Redis => Arc::new(RedisStore::new(&config.redis).await?),
            CacheBackend::Memory => {
                warn!("Using in-process rank cache, entries are not shared between instances");
                Arc::new(MemoryStore::new())
            }
        };
        let cache = Arc::new(RankCache::new(store, &config.redis));

        let ranker = RoomRanker::new(Arc::new(model), config.ranking.clone())?;
        let metrics = MetricsRegistry::new()?;
        let service = Arc::new(RankingService::new(
            repository,
            ranker,
            cache.clone(),
            metrics.clone(),
            config.ml.max_text_length,
        ));

        let state = Arc::new(AppState {
            server: config.server.clone(),
            service,
            cache,
            metrics,
        });

        info!("Rank server initialized successfully");
        Ok(RankServer {
            app: build_router(state),
            config,
        })
    }

    /// Run the HTTP server
    pub async fn run(self) -> RankResult<()> {
        let bind_addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RankError::ConfigError(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        info!("HTTP server listening on {}", bind_addr);

        axum::serve(listener, self.app)
            .await
            .map_err(|e| RankError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Routes and middleware over a prepared state
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/sentiment", post(sentiment_handler))
        .route("/properties", get(ranked_rooms_handler))
        .route("/rank", get(ranked_rooms_handler))
        .route("/webhook/review-created", post(review_created_handler))
        .route("/invalidate-all", get(invalidate_all_handler).post(invalidate_all_handler))
        .route("/metrics", get(metrics_handler))
        .layer(RequestBodyLimitLayer::new(state.server.max_request_size))
        .layer(middleware::from_fn(security_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), request_middleware))
        .layer(cors)
        .with_state(state)
}

/// Map a pipeline error to a status and JSON body. Server-side details stay in the logs.
fn error_response(e: &RankError) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = match e {
        RankError::InvalidRequest(message) => message.clone(),
        RankError::Timeout => "Request processing took too long".to_string(),
        e if e.is_cache_error() => "Rank cache temporarily unavailable".to_string(),
        RankError::DatabaseError(_) => "Room storage temporarily unavailable".to_string(),
        _ => "Internal server error".to_string(),
    };

    if status.is_server_error() {
        error!("Request failed: {}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: e.error_type().to_string(),
            message,
        }),
    )
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    (
        rejection.status(),
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: rejection.body_text(),
        }),
    )
}

/// Middleware for request ids, timeout and HTTP metrics
async fn request_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    let metrics = &state.metrics.metrics;
    metrics.inflight_requests.inc();
    metrics.http_requests_total.inc();
    let start = Instant::now();

    let limit = Duration::from_millis(state.server.request_timeout_ms);
    let result = timeout(limit, next.run(request).instrument(span.clone())).await;

    metrics.inflight_requests.dec();
    metrics.http_request_duration_seconds.observe(start.elapsed().as_secs_f64());

    match result {
        Ok(mut response) => {
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert("X-Request-Id", value);
            }
            Ok(response)
        }
        Err(_) => {
            span.in_scope(|| error!("Request timed out after {:?}", limit));
            Err(error_response(&RankError::Timeout))
        }
    }
}

/// Middleware for security headers
async fn security_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));

    response
}

/// Handler for health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.service.health().await)
}

/// Handler for single-text sentiment prediction
async fn sentiment_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SentimentRequest>, JsonRejection>,
) -> Result<Json<SentimentResponse>, ApiError> {
    let Json(request) = body.map_err(json_rejection)?;
    let text = request
        .input()
        .ok_or_else(|| error_response(&ValidationError::MissingText.into()))?;

    state
        .service
        .predict_sentiment(text)
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Handler for ranked rooms of a locality (`/properties?locality=` and `/rank?query=`)
async fn ranked_rooms_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocalityQuery>,
) -> Result<Json<RankedRoomsResponse>, ApiError> {
    let locality = params
        .locality()
        .map_err(|e| error_response(&e.into()))?;

    info!("Ranking rooms for locality '{}'", truncate_for_log(locality));

    state
        .service
        .ranked_rooms(locality)
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Handler for the review-created webhook
async fn review_created_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReviewCreatedEvent>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Json(event) = body.map_err(json_rejection)?;

    let invalidated = state
        .service
        .review_created(&event)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(WebhookResponse { ok: true, invalidated }))
}

/// Handler clearing every cached ranking
async fn invalidate_all_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InvalidateAllResponse>, ApiError> {
    let cleared = state
        .service
        .invalidate_all()
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(InvalidateAllResponse { ok: true, cleared }))
}

/// Handler for Prometheus scraping
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let circuit = match state.cache.breaker_stats().await.state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    state.metrics.metrics.cache_circuit_state.set(circuit);

    let body = state.metrics.gather().map_err(|e| error_response(&e))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests;
