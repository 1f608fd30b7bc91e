/// Ranking pipeline orchestration
///
/// Cache lookup, storage fetch, ranking and cache write-back for a locality,
/// plus the invalidation hooks. Cache failures are logged and counted but never
/// fail a ranking request; the pipeline recomputes instead.

use crate::cache::{normalize_locality, RankCache};
use crate::database::RoomRepository;
use crate::error::{RankResult, ValidationError};
use crate::ml::SentimentScorer;
use crate::observability::MetricsRegistry;
use crate::ranking::RoomRanker;
use crate::types::{
    CacheStats, ComponentStatus, HealthResponse, RankedRoomsResponse, RankingSource,
    ReviewCreatedEvent, SentimentResponse,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Longest locality string accepted from clients
pub const MAX_LOCALITY_LENGTH: usize = 200;

/// Coordinates storage, ranking and the rank cache
pub struct RankingService {
    repository: Arc<dyn RoomRepository>,
    ranker: RoomRanker,
    cache: Arc<RankCache>,
    metrics: MetricsRegistry,
    max_text_length: usize,
}

impl RankingService {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        ranker: RoomRanker,
        cache: Arc<RankCache>,
        metrics: MetricsRegistry,
        max_text_length: usize,
    ) -> Self {
        Self {
            repository,
            ranker,
            cache,
            metrics,
            max_text_length,
        }
    }

    /// Ranked rooms for a locality, from cache when possible
    #[instrument(skip(self))]
    pub async fn ranked_rooms(&self, locality: &str) -> RankResult<RankedRoomsResponse> {
        let locality = validate_locality(locality)?;
        self.metrics.metrics.rank_requests_total.inc();

        match self.cache.get(locality).await {
            Ok(Some(rooms)) => {
                debug!("Serving {} ranked rooms for '{}' from cache", rooms.len(), locality);
                self.metrics.metrics.cache_hits_total.inc();
                return Ok(RankedRoomsResponse {
                    source: RankingSource::Cache,
                    locality: locality.to_string(),
                    rooms,
                });
            }
            Ok(None) => {
                self.metrics.metrics.cache_misses_total.inc();
            }
            Err(e) => {
                warn!("Rank cache lookup failed for '{}', recomputing: {}", locality, e);
                self.metrics.metrics.cache_errors_total.inc();
            }
        }

        // Storage sees the same normalized form the cache key is built from
        let normalized = normalize_locality(locality);
        let rooms = self.repository.fetch_available_rooms(&normalized).await.map_err(|e| {
            self.metrics.metrics.rank_errors_total.inc();
            e
        })?;

        let review_count: usize = rooms.iter().map(|r| r.reviews.len()).sum();
        let start = Instant::now();
        let ranked = self.ranker.rank_rooms(rooms);
        let elapsed = start.elapsed();

        self.metrics.metrics.fresh_rankings_total.inc();
        self.metrics.metrics.sentiment_predictions_total.inc_by(review_count as f64);
        self.metrics.metrics.ranking_duration_seconds.observe(elapsed.as_secs_f64());
        self.metrics.metrics.rooms_per_ranking.observe(ranked.len() as f64);

        info!(
            "Ranked {} rooms ({} reviews) for '{}' in {:?}",
            ranked.len(),
            review_count,
            locality,
            elapsed
        );

        if let Err(e) = self.cache.set(locality, &ranked).await {
            warn!("Failed to cache ranking for '{}': {}", locality, e);
            self.metrics.metrics.cache_errors_total.inc();
        }

        Ok(RankedRoomsResponse {
            source: RankingSource::Fresh,
            locality: locality.to_string(),
            rooms: ranked,
        })
    }

    /// Score a single piece of text
    pub fn predict_sentiment(&self, text: &str) -> RankResult<SentimentResponse> {
        if text.trim().is_empty() {
            return Err(ValidationError::MissingText.into());
        }
        if text.chars().count() > self.max_text_length {
            return Err(ValidationError::TooLong {
                field: "text",
                max: self.max_text_length,
            }
            .into());
        }

        let result = self.ranker.scorer().predict_sentiment(text);
        self.metrics.metrics.sentiment_predictions_total.inc();

        Ok(SentimentResponse {
            text: text.to_string(),
            sentiment: result.label,
            score: result.score,
        })
    }

    /// Handle the review-created webhook. Returns whether an entry was targeted.
    pub async fn review_created(&self, event: &ReviewCreatedEvent) -> RankResult<bool> {
        match event.locality.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(locality) => {
                self.invalidate_locality(locality).await?;
                Ok(true)
            }
            None => {
                debug!("Review webhook without locality (room {:?}), nothing to invalidate", event.room_id);
                Ok(false)
            }
        }
    }

    /// Drop the cached ranking of one locality
    pub async fn invalidate_locality(&self, locality: &str) -> RankResult<bool> {
        let locality = validate_locality(locality)?;
        let removed = self.cache.invalidate(locality).await?;
        self.metrics.metrics.cache_invalidations_total.inc();
        info!("Invalidated rank cache for '{}' (entry present: {})", locality, removed);
        Ok(removed)
    }

    /// Drop every cached ranking
    pub async fn invalidate_all(&self) -> RankResult<u64> {
        let cleared = self.cache.invalidate_all().await?;
        self.metrics.metrics.cache_invalidations_total.inc_by(cleared as f64);
        info!("Invalidated {} rank cache entries", cleared);
        Ok(cleared)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Component health. The model is loaded before serving, so it is always ok here.
    pub async fn health(&self) -> HealthResponse {
        let (cache, database) = tokio::join!(self.cache.health_check(), self.repository.health_check());

        let component = |ok: bool, down: &str| if ok { "ok".to_string() } else { down.to_string() };
        let all_ok = cache.is_ok() && database.is_ok();

        HealthResponse {
            status: if all_ok { "ok" } else { "degraded" }.to_string(),
            timestamp: chrono::Utc::now(),
            components: ComponentStatus {
                model: format!("ok ({})", self.ranker.scorer().model_name()),
                cache: component(cache.is_ok(), "unavailable"),
                database: component(database.is_ok(), "unavailable"),
            },
        }
    }
}

/// Trim a locality and reject empty or oversized values
pub fn validate_locality(locality: &str) -> Result<&str, ValidationError> {
    let trimmed = locality.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingLocality);
    }
    if trimmed.chars().count() > MAX_LOCALITY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "locality",
            max: MAX_LOCALITY_LENGTH,
        });
    }
    Ok(trimmed)
}
