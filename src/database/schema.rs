/// Database schema definitions and migrations
///
/// SQL for the rooms and room_reviews tables read by the ranking pipeline.

/// Database schema manager
pub struct DatabaseSchema;

impl DatabaseSchema {
    /// Get the SQL for creating the rooms table
    pub fn create_rooms_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS rooms (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            location TEXT NOT NULL,
            is_available BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMP DEFAULT NOW()
        )
        "
    }

    /// Get the SQL for creating the room_reviews table
    pub fn create_room_reviews_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS room_reviews (
            id BIGSERIAL PRIMARY KEY,
            room_id BIGINT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            rating INTEGER,
            review_comment TEXT,
            created_at TIMESTAMP DEFAULT NOW()
        )
        "
    }

    /// Get SQL for creating standard indexes
    pub fn create_indexes_sql() -> Vec<&'static str> {
        vec![
            "CREATE INDEX IF NOT EXISTS idx_rooms_normalized_location \
             ON rooms ((btrim(regexp_replace(lower(location), '\\s+', ' ', 'g'))))",
            "CREATE INDEX IF NOT EXISTS idx_rooms_available ON rooms (is_available)",
            "CREATE INDEX IF NOT EXISTS idx_room_reviews_room_id ON room_reviews (room_id)",
        ]
    }

    /// All statements, in the order they must run
    pub fn all_statements() -> Vec<&'static str> {
        let mut statements = vec![
            Self::create_rooms_table_sql(),
            Self::create_room_reviews_table_sql(),
        ];
        statements.extend(Self::create_indexes_sql());
        statements
    }

    /// Available rooms of a locality joined with their reviews.
    ///
    /// `$1` is a normalized locality; the stored location is normalized the same way
    /// (lowercased, whitespace runs collapsed, trimmed). Rooms without reviews yield
    /// one row with null review columns.
    pub fn available_rooms_query() -> &'static str {
        "
        SELECT r.id, r.title, r.location, r.is_available,
               rv.id, rv.rating, rv.review_comment, rv.created_at
        FROM rooms r
        LEFT JOIN room_reviews rv ON rv.room_id = r.id
        WHERE btrim(regexp_replace(lower(r.location), '\\s+', ' ', 'g')) = $1
          AND r.is_available
        ORDER BY r.id, rv.id
        "
    }
}
