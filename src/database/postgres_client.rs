use super::{group_rows, DatabaseSchema, RoomRepository, RoomReviewRow};
use crate::cache::normalize_locality;
use crate::config::DatabaseConfig;
use crate::error::{RankError, RankResult};
use crate::observability::sanitize_url;
use crate::types::Room;
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use std::time::Duration;
use tokio::time::timeout;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info, instrument};

/// Room repository backed by a Postgres connection pool
pub struct PostgresRoomRepository {
    /// Connection pool for Postgres
    pool: Pool,
    /// Per-statement timeout
    statement_timeout: Duration,
}

impl PostgresRoomRepository {
    /// Create the connection pool.
    ///
    /// Connections are opened lazily, so an unreachable database only fails
    /// requests and the health check, not startup.
    pub fn new(config: &DatabaseConfig) -> RankResult<Self> {
        info!("Initializing Postgres client with URL: {}", sanitize_url(&config.url));

        let url = &config.url;
        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(RankError::DatabaseError(
                "Invalid database URL format".to_string()
            ));
        }

        let mut pg_config = Config::new();
        pg_config.url = Some(url.clone());
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections as usize));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| RankError::DatabaseError(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool,
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
        })
    }

    async fn client(&self) -> RankResult<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| RankError::DatabaseError(format!("Failed to get connection: {}", e)))
    }

    /// Create tables and indexes if they do not exist
    pub async fn initialize_schema(&self) -> RankResult<()> {
        info!("Initializing database schema");
        let client = self.client().await?;

        for statement in DatabaseSchema::all_statements() {
            client
                .batch_execute(statement)
                .await
                .map_err(|e| RankError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
        }

        info!("Database schema initialized");
        Ok(())
    }

    fn row_to_join_row(row: &Row) -> RankResult<RoomReviewRow> {
        let column = |e: tokio_postgres::Error| RankError::DatabaseError(format!("Failed to read row: {}", e));

        Ok(RoomReviewRow {
            room_id: row.try_get(0).map_err(column)?,
            title: row.try_get(1).map_err(column)?,
            location: row.try_get(2).map_err(column)?,
            is_available: row.try_get(3).map_err(column)?,
            review_id: row.try_get(4).map_err(column)?,
            rating: row.try_get(5).map_err(column)?,
            review_comment: row.try_get(6).map_err(column)?,
            created_at: row.try_get(7).map_err(column)?,
        })
    }
}

#[async_trait]
impl RoomRepository for PostgresRoomRepository {
    #[instrument(skip(self))]
    async fn fetch_available_rooms(&self, locality: &str) -> RankResult<Vec<Room>> {
        let client = self.client().await?;
        let locality = normalize_locality(locality);

        let rows = timeout(
            self.statement_timeout,
            client.query(DatabaseSchema::available_rooms_query(), &[&locality]),
        )
        .await
        .map_err(|_| {
            RankError::DatabaseError(format!(
                "Query timeout exceeded {}ms",
                self.statement_timeout.as_millis()
            ))
        })?
        .map_err(|e| RankError::DatabaseError(format!("Room query failed: {}", e)))?;

        let joined = rows
            .iter()
            .map(Self::row_to_join_row)
            .collect::<RankResult<Vec<_>>>()?;

        let rooms = group_rows(joined);
        debug!("Fetched {} available rooms ({} rows) for '{}'", rooms.len(), rows.len(), locality);
        Ok(rooms)
    }

    async fn health_check(&self) -> RankResult<()> {
        let start = std::time::Instant::now();
        let client = self.client().await?;

        let rows = timeout(self.statement_timeout, client.query("SELECT 1", &[]))
            .await
            .map_err(|_| RankError::DatabaseError("Health check timed out".to_string()))?
            .map_err(|e| RankError::DatabaseError(format!("Health check query failed: {}", e)))?;

        if rows.is_empty() {
            return Err(RankError::DatabaseError("Health check returned no results".to_string()));
        }

        debug!("Database health check passed in {:?}", start.elapsed());
        Ok(())
    }
}
