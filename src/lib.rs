pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod ml;
pub mod observability;
pub mod ranking;
pub mod server;
pub mod types;

pub use cache::{CacheStore, MemoryStore, RankCache, RedisStore};
pub use config::Config;
pub use database::{PostgresRoomRepository, RoomRepository};
pub use error::{RankError, RankResult};
pub use ml::{SentimentModel, SentimentScorer};
pub use ranking::{RankingService, RoomRanker};
pub use server::RankServer;
pub use types::*;
