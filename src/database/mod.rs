/// Database module
///
/// Storage boundary for the ranking pipeline: fetches available rooms of a
/// locality with their reviews fully materialized, so ranking never triggers
/// follow-up queries.

mod postgres_client;
mod schema;


use crate::error::RankResult;
use crate::types::{Review, Room};
use async_trait::async_trait;
use chrono::NaiveDateTime;

pub use postgres_client::PostgresRoomRepository;
pub use schema::DatabaseSchema;

/// Source of rooms to rank
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Available rooms whose normalized location equals the normalized `locality`
    /// (see `cache::normalize_locality`), each with all of its reviews
    async fn fetch_available_rooms(&self, locality: &str) -> RankResult<Vec<Room>>;

    /// Check connectivity
    async fn health_check(&self) -> RankResult<()>;
}

/// One row of the rooms/reviews left join
#[derive(Debug, Clone, PartialEq)]
pub struct RoomReviewRow {
    pub room_id: i64,
    pub title: String,
    pub location: String,
    pub is_available: bool,
    /// Review columns are null for rooms without reviews
    pub review_id: Option<i64>,
    pub rating: Option<i32>,
    pub review_comment: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// Fold join rows, ordered by room id then review id, into rooms with their reviews
pub fn group_rows(rows: impl IntoIterator<Item = RoomReviewRow>) -> Vec<Room> {
    let mut rooms: Vec<Room> = Vec::new();

    for row in rows {
        let same_room = rooms.last().is_some_and(|room| room.id == row.room_id);
        if !same_room {
            rooms.push(Room {
                id: row.room_id,
                title: row.title,
                location: row.location,
                is_available: row.is_available,
                reviews: Vec::new(),
            });
        }

        if let (Some(review_id), Some(room)) = (row.review_id, rooms.last_mut()) {
            room.reviews.push(Review {
                id: review_id,
                rating: row.rating.map(f64::from),
                review_comment: row.review_comment,
                created_at: row.created_at,
            });
        }
    }

    rooms
}
