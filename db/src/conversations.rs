use sqlx::sqlite::SqlitePool;

use common::models::{ConversationRecord, MessageRole, StoredMessage};

pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub error: Option<String>,
    pub timestamp: i64,
}

/// Append messages to a conversation, creating the record when needed.
///
/// With no `conversation_id` a fresh id is generated; with one, an existing
/// record is appended to and a missing record is created under that id
/// (first-write-wins). Runs in one transaction so concurrent appends against
/// the same conversation cannot interleave sequence numbers.
pub async fn append_messages(
    pool: &SqlitePool,
    conversation_id: Option<&str>,
    user_id: &str,
    department_code: &str,
    messages: &[NewMessage],
) -> anyhow::Result<String> {
    let id = match conversation_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => crate::generate_id(),
    };
    let now = crate::now_ms();

    let mut tx = pool.begin().await?;

    let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM conversations WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?;

    if exists.is_some() {
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
    } else {
        sqlx::query(
            "INSERT INTO conversations (id, user_id, department_code, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(department_code)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let (next_seq,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE conversation_id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

    for (offset, message) in messages.iter().enumerate() {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, seq, role, content, timestamp, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(crate::generate_id())
        .bind(&id)
        .bind(next_seq + offset as i64)
        .bind(message.role)
        .bind(&message.content)
        .bind(message.timestamp)
        .bind(message.error.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

pub async fn get_conversation(
    pool: &SqlitePool,
    conversation_id: &str,
) -> anyhow::Result<Option<ConversationRecord>> {
    let record = sqlx::query_as::<_, ConversationRecord>(
        "SELECT id AS conversation_id, user_id, department_code, created_at, updated_at \
         FROM conversations WHERE id = ?",
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    let Some(mut record) = record else {
        return Ok(None);
    };

    record.messages = sqlx::query_as::<_, StoredMessage>(
        "SELECT id, role, content, timestamp, error FROM messages \
         WHERE conversation_id = ? ORDER BY seq",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(record))
}

pub async fn list_conversations_for_user(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<ConversationRecord>> {
    let mut records = sqlx::query_as::<_, ConversationRecord>(
        "SELECT id AS conversation_id, user_id, department_code, created_at, updated_at \
         FROM conversations WHERE user_id = ? ORDER BY updated_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    for record in &mut records {
        record.messages = sqlx::query_as::<_, StoredMessage>(
            "SELECT id, role, content, timestamp, error FROM messages \
             WHERE conversation_id = ? ORDER BY seq",
        )
        .bind(&record.conversation_id)
        .fetch_all(pool)
        .await?;
    }

    Ok(records)
}

pub async fn delete_conversation(pool: &SqlitePool, conversation_id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .execute(pool)
        .await?;
    Ok(())
}
