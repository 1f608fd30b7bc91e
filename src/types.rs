use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single review attached to a room, as returned by storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review identifier
    pub id: i64,
    /// Star rating, expected in 1..=5
    #[serde(default)]
    pub rating: Option<f64>,
    /// Free text comment
    #[serde(default)]
    pub review_comment: Option<String>,
    /// Creation time (local, no timezone)
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl Review {
    /// Comment text if it has any non-whitespace content
    pub fn usable_text(&self) -> Option<&str> {
        self.review_comment
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Rating if present, finite and inside 1..=5
    pub fn usable_rating(&self) -> Option<f64> {
        self.rating
            .filter(|r| r.is_finite() && (1.0..=5.0).contains(r))
    }
}

/// A room with its fully materialized reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room identifier
    pub id: i64,
    /// Listing title
    pub title: String,
    /// Locality string
    pub location: String,
    /// Availability flag
    pub is_available: bool,
    /// Reviews in storage order
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Categorical sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the sentiment scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    /// Score in [-1.0, 1.0]
    pub score: f64,
    /// Label derived from the score
    pub label: SentimentLabel,
}

/// Review as it appears in ranked output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedReview {
    pub id: i64,
    pub rating: Option<f64>,
    pub review_comment: Option<String>,
    /// Serialized as an ISO-8601 string, or null when absent
    pub created_at: Option<NaiveDateTime>,
    /// Null when the review had no usable text
    pub sentiment: Option<SentimentResult>,
}

/// Room decorated with its composite rank score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRoom {
    pub id: i64,
    pub title: String,
    pub location: String,
    pub rank_score: f64,
    /// Mean sentiment score, reviews without usable text count as neutral. Absent for rooms without reviews
    pub average_sentiment: Option<f64>,
    pub review_count: usize,
    pub reviews: Vec<RankedReview>,
}

/// Where a ranked list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingSource {
    /// Served from the rank cache
    Cache,
    /// Recomputed from storage
    Fresh,
}

/// Response body for ranked rooms by locality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRoomsResponse {
    pub source: RankingSource,
    pub locality: String,
    pub rooms: Vec<RankedRoom>,
}

/// Request body for single-text sentiment prediction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Accepted as an alias of `text`
    #[serde(default)]
    pub review: Option<String>,
}

impl SentimentRequest {
    /// First non-empty of `text` and `review`
    pub fn input(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.review.as_deref())
    }
}

/// Response body for single-text sentiment prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResponse {
    pub text: String,
    pub sentiment: SentimentLabel,
    pub score: f64,
}

/// Webhook body sent after a review is stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewCreatedEvent {
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default, rename = "roomId")]
    pub room_id: Option<i64>,
}

/// Cache statistics snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub errors: u64,
}

impl CacheStats {
    /// Hit ratio over all lookups
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub components: ComponentStatus,
}

/// Per-component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub model: String,
    pub cache: String,
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: Option<f64>, comment: Option<&str>) -> Review {
        Review {
            id: 1,
            rating,
            review_comment: comment.map(str::to_string),
            created_at: None,
        }
    }

    #[test]
    fn test_usable_text_rejects_blank() {
        assert_eq!(review(None, Some("  ")).usable_text(), None);
        assert_eq!(review(None, None).usable_text(), None);
        assert_eq!(review(None, Some(" nice ")).usable_text(), Some("nice"));
    }

    #[test]
    fn test_usable_rating_bounds() {
        assert_eq!(review(Some(4.0), None).usable_rating(), Some(4.0));
        assert_eq!(review(Some(0.0), None).usable_rating(), None);
        assert_eq!(review(Some(6.0), None).usable_rating(), None);
        assert_eq!(review(Some(f64::NAN), None).usable_rating(), None);
    }

    #[test]
    fn test_room_deserializes_storage_shape() {
        let json = r#"{
            "id": 7,
            "title": "Sunny loft",
            "location": "Downtown",
            "isAvailable": true,
            "reviews": [
                {"id": 1, "rating": 5, "reviewComment": "lovely", "createdAt": "2024-03-01T10:15:00"},
                {"id": 2}
            ]
        }"#;
        let room: Room = serde_json::from_str(json).unwrap();
        assert_eq!(room.reviews.len(), 2);
        assert_eq!(room.reviews[0].rating, Some(5.0));
        assert!(room.reviews[0].created_at.is_some());
        assert_eq!(room.reviews[1].review_comment, None);
    }

    #[test]
    fn test_ranked_review_created_at_is_iso_or_null() {
        let created = NaiveDateTime::parse_from_str("2024-03-01 10:15:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let with_date = RankedReview {
            id: 1,
            rating: Some(4.0),
            review_comment: Some("ok".into()),
            created_at: Some(created),
            sentiment: None,
        };
        let value = serde_json::to_value(&with_date).unwrap();
        assert_eq!(value["createdAt"], "2024-03-01T10:15:00");

        let without = RankedReview { created_at: None, ..with_date };
        let value = serde_json::to_value(&without).unwrap();
        assert!(value["createdAt"].is_null());
    }

    #[test]
    fn test_sentiment_request_alias() {
        let req: SentimentRequest = serde_json::from_str(r#"{"review": "great"}"#).unwrap();
        assert_eq!(req.input(), Some("great"));
        let req: SentimentRequest = serde_json::from_str(r#"{"text": "", "review": "fine"}"#).unwrap();
        assert_eq!(req.input(), Some("fine"));
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&SentimentLabel::Positive).unwrap(), "\"positive\"");
        assert_eq!(serde_json::to_string(&RankingSource::Cache).unwrap(), "\"cache\"");
    }
}
