use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Registry, TextEncoder};
use std::sync::Arc;
use crate::error::{RankError, RankResult};

/// Prometheus metrics registry and collectors
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

/// All application metrics
pub struct Metrics {
    // Ranking metrics
    pub rank_requests_total: Counter,
    pub fresh_rankings_total: Counter,
    pub rank_errors_total: Counter,
    pub ranking_duration_seconds: Histogram,
    pub rooms_per_ranking: Histogram,

    // Cache metrics
    pub cache_hits_total: Counter,
    pub cache_misses_total: Counter,
    pub cache_errors_total: Counter,
    pub cache_invalidations_total: Counter,
    pub cache_circuit_state: Gauge,

    // Model metrics
    pub sentiment_predictions_total: Counter,

    // HTTP metrics
    pub inflight_requests: Gauge,
    pub http_requests_total: Counter,
    pub http_request_duration_seconds: Histogram,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all collectors
    pub fn new() -> RankResult<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);

        Ok(Self { registry, metrics })
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> RankResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| RankError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| RankError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> RankResult<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| RankError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| RankError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> RankResult<Gauge> {
    let gauge = Gauge::new(name, help)
        .map_err(|e| RankError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| RankError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(gauge)
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> RankResult<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .map_err(|e| RankError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| RankError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(histogram)
}

impl Metrics {
    fn new(registry: &Registry) -> RankResult<Self> {
        Ok(Self {
            rank_requests_total: counter(registry, "rank_requests_total", "Total number of ranking requests")?,
            fresh_rankings_total: counter(
                registry,
                "fresh_rankings_total",
                "Rankings computed from storage instead of cache",
            )?,
            rank_errors_total: counter(registry, "rank_errors_total", "Ranking requests that failed")?,
            ranking_duration_seconds: histogram(
                registry,
                "ranking_duration_seconds",
                "Time spent scoring and ordering rooms in seconds",
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5],
            )?,
            rooms_per_ranking: histogram(
                registry,
                "rooms_per_ranking",
                "Number of rooms in a freshly computed ranking",
                vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0],
            )?,
            cache_hits_total: counter(registry, "cache_hits_total", "Total number of rank cache hits")?,
            cache_misses_total: counter(registry, "cache_misses_total", "Total number of rank cache misses")?,
            cache_errors_total: counter(
                registry,
                "cache_errors_total",
                "Rank cache operations that failed or were skipped",
            )?,
            cache_invalidations_total: counter(
                registry,
                "cache_invalidations_total",
                "Rank cache entries invalidated",
            )?,
            cache_circuit_state: gauge(
                registry,
                "cache_circuit_state",
                "Cache circuit breaker state (0=closed, 1=open, 2=half-open)",
            )?,
            sentiment_predictions_total: counter(
                registry,
                "sentiment_predictions_total",
                "Total number of texts scored by the sentiment model",
            )?,
            inflight_requests: gauge(registry, "inflight_requests", "Number of requests currently being processed")?,
            http_requests_total: counter(registry, "http_requests_total", "Total number of HTTP requests")?,
            http_request_duration_seconds: histogram(
                registry,
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
                vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )?,
        })
    }
}
