use super::*;
use crate::cache::CircuitBreaker;
use crate::config::RankingConfig;
use crate::database::RoomRepository;
use crate::ml::SentimentModel;
use crate::types::{RankingSource, Review, Room, SentimentLabel};
use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Repository serving the same two rooms for every locality
#[derive(Default)]
struct FixtureRepository {
    calls: AtomicUsize,
}

fn room(id: i64, text: &str) -> Room {
    Room {
        id,
        title: format!("Room {}", id),
        location: "Downtown".to_string(),
        is_available: true,
        reviews: vec![Review {
            id: id * 10,
            rating: None,
            review_comment: Some(text.to_string()),
            created_at: None,
        }],
    }
}

#[async_trait]
impl RoomRepository for FixtureRepository {
    async fn fetch_available_rooms(&self, _locality: &str) -> RankResult<Vec<Room>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![room(2, "terrible, awful stay"), room(1, "great place, loved it")])
    }

    async fn health_check(&self) -> RankResult<()> {
        Ok(())
    }
}

/// Cache store that is never reachable
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> RankResult<Option<String>> {
        Err(RankError::RedisError("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> RankResult<()> {
        Err(RankError::RedisError("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> RankResult<bool> {
        Err(RankError::RedisError("connection refused".to_string()))
    }

    async fn clear(&self) -> RankResult<u64> {
        Err(RankError::RedisError("connection refused".to_string()))
    }

    async fn ping(&self) -> RankResult<()> {
        Err(RankError::RedisError("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
}

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_ms: 5000,
        max_request_size: 1024,
    }
}

/// Helper function to create a test server over an in-memory pipeline
fn create_test_server_with(store: Arc<dyn CacheStore>) -> (Arc<FixtureRepository>, TestServer) {
    let model = SentimentModel::from_json(include_str!("../../models/sentiment-lexicon.json")).unwrap();
    let ranker = RoomRanker::new(Arc::new(model), RankingConfig::default()).unwrap();
    let repository = Arc::new(FixtureRepository::default());
    let cache = Arc::new(RankCache::with_settings(
        store,
        Duration::from_secs(3600),
        Duration::from_millis(250),
        CircuitBreaker::new(),
    ));
    let metrics = MetricsRegistry::new().unwrap();
    let service = Arc::new(RankingService::new(
        repository.clone(),
        ranker,
        cache.clone(),
        metrics.clone(),
        200,
    ));

    let state = Arc::new(AppState {
        server: server_config(),
        service,
        cache,
        metrics,
    });

    (repository, TestServer::new(build_router(state)).unwrap())
}

fn create_test_server() -> (Arc<FixtureRepository>, TestServer) {
    create_test_server_with(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_, server) = create_test_server();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "ok");
    assert_eq!(body.components.cache, "ok");
    assert!(body.components.model.contains("roomy-review-lexicon"));
}

#[tokio::test]
async fn test_health_reports_degraded_cache() {
    let (_, server) = create_test_server_with(Arc::new(UnreachableStore));

    let body: HealthResponse = server.get("/health").await.json();
    assert_eq!(body.status, "degraded");
    assert_eq!(body.components.cache, "unavailable");
}

#[tokio::test]
async fn test_sentiment_endpoint() {
    let (_, server) = create_test_server();

    let response = server
        .post("/sentiment")
        .json(&json!({"text": "great place, loved it"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: SentimentResponse = response.json();
    assert_eq!(body.text, "great place, loved it");
    assert_eq!(body.sentiment, SentimentLabel::Positive);
    assert!(body.score > 0.0 && body.score <= 1.0);
}

#[tokio::test]
async fn test_sentiment_accepts_review_alias() {
    let (_, server) = create_test_server();

    let response = server
        .post("/sentiment")
        .json(&json!({"review": "terrible, awful stay"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: SentimentResponse = response.json();
    assert_eq!(body.sentiment, SentimentLabel::Negative);
}

#[tokio::test]
async fn test_sentiment_rejects_blank_text() {
    let (_, server) = create_test_server();

    for body in [json!({}), json!({"text": ""}), json!({"text": "   "})] {
        let response = server.post("/sentiment").json(&body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "body: {}", body);

        let error: ErrorResponse = response.json();
        assert_eq!(error.error, "invalid_request");
        assert_eq!(error.message, "text is required");
    }
}

#[tokio::test]
async fn test_sentiment_rejects_malformed_json() {
    let (_, server) = create_test_server();

    let response = server
        .post("/sentiment")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_properties_ranks_then_serves_cache() {
    let (repository, server) = create_test_server();

    let response = server
        .get("/properties")
        .add_query_param("locality", "Downtown")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let fresh: RankedRoomsResponse = response.json();
    assert_eq!(fresh.source, RankingSource::Fresh);
    assert_eq!(fresh.locality, "Downtown");
    let ids: Vec<i64> = fresh.rooms.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(fresh.rooms[0].rank_score > fresh.rooms[1].rank_score);

    let cached: RankedRoomsResponse = server
        .get("/rank")
        .add_query_param("query", "downtown")
        .await
        .json();
    assert_eq!(cached.source, RankingSource::Cache);
    assert_eq!(cached.rooms, fresh.rooms);
    assert_eq!(repository.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ranked_output_shape() {
    let (_, server) = create_test_server();

    let body: Value = server
        .get("/properties")
        .add_query_param("locality", "Downtown")
        .await
        .json();

    let room = &body["rooms"][0];
    assert!(room["rankScore"].is_f64());
    assert_eq!(room["title"], "Room 1");
    assert_eq!(room["location"], "Downtown");
    let review = &room["reviews"][0];
    assert_eq!(review["reviewComment"], "great place, loved it");
    assert!(review["createdAt"].is_null());
    assert_eq!(review["sentiment"]["label"], "positive");
}

#[tokio::test]
async fn test_missing_or_blank_locality_is_rejected() {
    let (repository, server) = create_test_server();

    let response = server.get("/properties").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.message, "locality query param is required");

    let response = server
        .get("/rank")
        .add_query_param("query", "   ")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    assert_eq!(repository.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ranking_survives_cache_outage() {
    let (repository, server) = create_test_server_with(Arc::new(UnreachableStore));

    for _ in 0..2 {
        let response = server
            .get("/properties")
            .add_query_param("locality", "Downtown")
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: RankedRoomsResponse = response.json();
        assert_eq!(body.source, RankingSource::Fresh);
    }
    assert_eq!(repository.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_review_webhook_invalidates() {
    let (repository, server) = create_test_server();

    server.get("/properties").add_query_param("locality", "Downtown").await;

    let response = server
        .post("/webhook/review-created")
        .json(&json!({"locality": "Downtown", "roomId": 1}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: WebhookResponse = response.json();
    assert!(body.ok);
    assert!(body.invalidated);

    let after: RankedRoomsResponse = server
        .get("/properties")
        .add_query_param("locality", "Downtown")
        .await
        .json();
    assert_eq!(after.source, RankingSource::Fresh);
    assert_eq!(repository.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_review_webhook_without_locality_is_noop() {
    let (_, server) = create_test_server();

    let response = server.post("/webhook/review-created").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: WebhookResponse = response.json();
    assert!(body.ok);
    assert!(!body.invalidated);
}

#[tokio::test]
async fn test_review_webhook_reports_cache_outage() {
    let (_, server) = create_test_server_with(Arc::new(UnreachableStore));

    let response = server
        .post("/webhook/review-created")
        .json(&json!({"locality": "Downtown"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorResponse = response.json();
    assert_eq!(error.message, "Rank cache temporarily unavailable");
}

#[tokio::test]
async fn test_invalidate_all_get_and_post() {
    let (_, server) = create_test_server();

    server.get("/properties").add_query_param("locality", "Downtown").await;
    server.get("/properties").add_query_param("locality", "Uptown").await;

    let body: InvalidateAllResponse = server.post("/invalidate-all").await.json();
    assert!(body.ok);
    assert_eq!(body.cleared, 2);

    let body: InvalidateAllResponse = server.get("/invalidate-all").await.json();
    assert_eq!(body.cleared, 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_, server) = create_test_server();

    server.get("/properties").add_query_param("locality", "Downtown").await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(text.contains("rank_requests_total 1"));
    assert!(text.contains("fresh_rankings_total 1"));
    assert!(text.contains("cache_circuit_state 0"));
}

#[tokio::test]
async fn test_security_and_request_id_headers() {
    let (_, server) = create_test_server();

    let response = server.get("/health").await;

    assert_eq!(response.header("X-Content-Type-Options"), "nosniff");
    assert_eq!(response.header("X-Frame-Options"), "DENY");
    let request_id = response.header("X-Request-Id");
    assert!(Uuid::parse_str(request_id.to_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_request_too_large() {
    let (_, server) = create_test_server();

    let response = server
        .post("/sentiment")
        .json(&json!({"text": "a".repeat(4096)}))
        .await;

    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn test_error_response_mapping() {
    let (status, Json(body)) = error_response(&RankError::InvalidRequest("bad".to_string()));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.message, "bad");

    let (status, Json(body)) = error_response(&RankError::DatabaseError("password=secret".to_string()));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body.message.contains("secret"));

    let (status, _) = error_response(&RankError::Timeout);
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}
