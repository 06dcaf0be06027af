pub mod conversations;
pub mod sessions;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open (creating if needed) the database and apply the schema.
/// `:memory:` gives a private in-process database; it is pinned to a single
/// connection because every pooled connection would otherwise see its own
/// empty database.
pub async fn init_pool(db_path: &str) -> anyhow::Result<SqlitePool> {
    let (url, max_connections) = if db_path == ":memory:" {
        ("sqlite::memory:".to_string(), 1)
    } else {
        (format!("sqlite:{}?mode=rwc", db_path), 5)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;

    for stmt in include_str!("../../migrations/001_init.sql").split(';') {
        let stmt = stmt.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(&pool).await?;
        }
    }

    Ok(pool)
}
