/// Room ranking module
///
/// Turns a batch of rooms with reviews into a best-first list of ranked rooms.
/// Each review contributes its sentiment positivity in [0, 1], a room's rank is
/// the mean positivity dampened by review volume, `mean * n / (n + prior_weight)`.
/// Star ratings are carried through to the output but never scored.

pub mod service;


use crate::config::RankingConfig;
use crate::error::RankResult;
use crate::ml::SentimentScorer;
use crate::types::{RankedReview, RankedRoom, Review, Room, SentimentResult};
use std::sync::Arc;
use tracing::{debug, instrument};

pub use service::RankingService;

/// Scores and orders rooms
#[derive(Clone)]
pub struct RoomRanker {
    scorer: Arc<dyn SentimentScorer>,
    config: RankingConfig,
}

/// Per-room aggregate before it is attached to the output
#[derive(Debug, Clone, PartialEq)]
struct RoomAggregate {
    rank_score: f64,
    average_sentiment: Option<f64>,
}

impl RoomRanker {
    /// Create a ranker, rejecting weightings that would break ordering guarantees
    pub fn new(scorer: Arc<dyn SentimentScorer>, config: RankingConfig) -> RankResult<Self> {
        config.validate()?;
        Ok(Self { scorer, config })
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn scorer(&self) -> &Arc<dyn SentimentScorer> {
        &self.scorer
    }

    /// Rank rooms best-first. Equal scores keep their input order.
    #[instrument(skip(self, rooms), fields(rooms = rooms.len()))]
    pub fn rank_rooms(&self, rooms: Vec<Room>) -> Vec<RankedRoom> {
        let mut ranked: Vec<RankedRoom> = rooms.into_iter().map(|room| self.rank_room(room)).collect();

        // sort_by is stable, ties stay in input order
        ranked.sort_by(|a, b| b.rank_score.total_cmp(&a.rank_score));

        debug!("Ranked {} rooms", ranked.len());
        ranked
    }

    fn rank_room(&self, room: Room) -> RankedRoom {
        let reviews: Vec<RankedReview> = room
            .reviews
            .into_iter()
            .map(|review| self.score_review(review))
            .collect();

        let aggregate = self.aggregate(&reviews);

        RankedRoom {
            id: room.id,
            title: room.title,
            location: room.location,
            rank_score: aggregate.rank_score,
            average_sentiment: aggregate.average_sentiment,
            review_count: reviews.len(),
            reviews,
        }
    }

    fn score_review(&self, review: Review) -> RankedReview {
        let sentiment = review
            .usable_text()
            .map(|text| self.scorer.predict_sentiment(text));

        RankedReview {
            id: review.id,
            rating: review.rating,
            review_comment: review.review_comment,
            created_at: review.created_at,
            sentiment,
        }
    }

    /// Sentiment score of one review, the neutral score when it has no usable text
    fn review_score(&self, sentiment: Option<&SentimentResult>) -> f64 {
        match sentiment {
            Some(s) if s.score.is_finite() => s.score.clamp(-1.0, 1.0),
            _ => 2.0 * self.config.neutral_baseline - 1.0,
        }
    }

    fn aggregate(&self, reviews: &[RankedReview]) -> RoomAggregate {
        let prior = self.config.prior_weight;

        if reviews.is_empty() {
            // One neutral pseudo-review
            return RoomAggregate {
                rank_score: self.config.neutral_baseline / (1.0 + prior),
                average_sentiment: None,
            };
        }

        let n = reviews.len() as f64;
        let average = reviews
            .iter()
            .map(|r| self.review_score(r.sentiment.as_ref()))
            .sum::<f64>()
            / n;
        let positivity = (average + 1.0) / 2.0;

        RoomAggregate {
            rank_score: positivity * n / (n + prior),
            average_sentiment: Some(average),
        }
    }
}
