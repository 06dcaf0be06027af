use serde::{Deserialize, Serialize};

/// One authenticated browser. Created on the identity-provider callback,
/// touched on every authenticated request, deleted on logout or by the
/// inactivity sweep.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub display_name: String,
    pub department_code: String,
    pub department_name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix ms. Tokens inside the refresh buffer must be refreshed before use.
    pub token_expires_at: i64,
    pub created_at: i64,
    pub last_accessed_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
    pub error: Option<String>,
}

/// Durable per-conversation message log. Messages are append-only and
/// strictly ordered by insertion; the id is stable once assigned.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub user_id: String,
    pub department_code: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[sqlx(skip)]
    pub messages: Vec<StoredMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
        let role: MessageRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, MessageRole::User);
    }
}
