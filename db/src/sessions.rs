use sqlx::sqlite::SqlitePool;

use common::models::Session;

pub struct NewSession<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub user_email: &'a str,
    pub display_name: &'a str,
    pub department_code: &'a str,
    pub department_name: Option<&'a str>,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub token_expires_at: i64,
}

pub async fn create_session(pool: &SqlitePool, s: &NewSession<'_>) -> anyhow::Result<()> {
    let now = crate::now_ms();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, user_email, display_name, department_code, \
         department_name, access_token, refresh_token, token_expires_at, created_at, \
         last_accessed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(s.id)
    .bind(s.user_id)
    .bind(s.user_email)
    .bind(s.display_name)
    .bind(s.department_code)
    .bind(s.department_name)
    .bind(s.access_token)
    .bind(s.refresh_token)
    .bind(s.token_expires_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(pool: &SqlitePool, id: &str) -> anyhow::Result<Option<Session>> {
    Ok(sqlx::query_as::<_, Session>(
        "SELECT id, user_id, user_email, display_name, department_code, department_name, \
         access_token, refresh_token, token_expires_at, created_at, last_accessed_at \
         FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub async fn touch_session(pool: &SqlitePool, id: &str, now: i64) -> anyhow::Result<()> {
    sqlx::query("UPDATE sessions SET last_accessed_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_session_tokens(
    pool: &SqlitePool,
    id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    token_expires_at: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE sessions SET access_token = ?, \
         refresh_token = COALESCE(?, refresh_token), \
         token_expires_at = ?, last_accessed_at = ? WHERE id = ?",
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(token_expires_at)
    .bind(crate::now_ms())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_session(pool: &SqlitePool, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete sessions idle for longer than `max_age_ms`. Returns the number removed.
pub async fn sweep_expired_sessions(pool: &SqlitePool, max_age_ms: i64) -> anyhow::Result<u64> {
    let cutoff = crate::now_ms() - max_age_ms;
    let result = sqlx::query("DELETE FROM sessions WHERE last_accessed_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample<'a>() -> NewSession<'a> {
        NewSession {
            id: "sess-1",
            user_id: "user-1",
            user_email: "user@example.com",
            display_name: "Test User",
            department_code: "001",
            department_name: Some("Sales"),
            access_token: "access-1",
            refresh_token: Some("refresh-1"),
            token_expires_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let pool = crate::init_pool(":memory:").await.unwrap();
        create_session(&pool, &sample()).await.unwrap();

        let session = get_session(&pool, "sess-1").await.unwrap().unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.department_code, "001");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
        assert!(session.created_at > 0);
    }

    #[tokio::test]
    async fn update_tokens_keeps_old_refresh_token_when_absent() {
        let pool = crate::init_pool(":memory:").await.unwrap();
        create_session(&pool, &sample()).await.unwrap();

        update_session_tokens(&pool, "sess-1", "access-2", None, 1_800_000_000_000)
            .await
            .unwrap();

        let session = get_session(&pool, "sess-1").await.unwrap().unwrap();
        assert_eq!(session.access_token, "access-2");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(session.token_expires_at, 1_800_000_000_000);
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_sessions() {
        let pool = crate::init_pool(":memory:").await.unwrap();
        create_session(&pool, &sample()).await.unwrap();

        // Backdate the session past the cutoff.
        sqlx::query("UPDATE sessions SET last_accessed_at = ? WHERE id = ?")
            .bind(crate::now_ms() - 100_000)
            .bind("sess-1")
            .execute(&pool)
            .await
            .unwrap();

        let removed = sweep_expired_sessions(&pool, 1_000_000).await.unwrap();
        assert_eq!(removed, 0);

        let removed = sweep_expired_sessions(&pool, 50_000).await.unwrap();
        assert_eq!(removed, 1);
        assert!(get_session(&pool, "sess-1").await.unwrap().is_none());
    }
}
