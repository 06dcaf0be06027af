use serde::{Deserialize, Serialize};

use common::error::AppError;

/// Normalized stream event, shared by the upstream decode and the frames the
/// relay writes to the browser. The union is closed: an unknown `event` tag
/// fails deserialization, which the client treats as protocol drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial answer fragment.
    Message {
        #[serde(default)]
        answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_at: Option<i64>,
    },
    /// Finalizes a turn; carries usage metadata.
    MessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default)]
        message: String,
    },
    /// Synthesized by the relay so the browser can detect turn completion
    /// independently of upstream's own terminal event.
    Done,
}

impl StreamEvent {
    /// Terminal events end the turn no matter how many `message` events
    /// preceded them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Message { .. })
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Message {
                conversation_id, ..
            }
            | StreamEvent::MessageEnd {
                conversation_id, ..
            } => conversation_id.as_deref(),
            _ => None,
        }
    }
}

/// Terminal frame describing a relay-side failure.
pub fn error_event(err: &AppError) -> StreamEvent {
    let status = match err {
        AppError::UpstreamApi { status, .. } => Some(*status),
        _ => None,
    };
    StreamEvent::Error {
        status,
        code: Some(err.code().to_string()),
        message: err.to_string(),
    }
}
