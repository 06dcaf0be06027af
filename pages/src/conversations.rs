use leptos::{either::Either, prelude::*};
use templates::{HeaderUser, NavLink, Page};

use common::models::{ConversationRecord, Session};
use common::text::preview;

use crate::format_timestamp;

const PREVIEW_CHARS: usize = 40;

pub fn render_conversations(
    session: &Session,
    conversations: &[ConversationRecord],
    error: Option<&str>,
) -> String {
    let empty = conversations.is_empty();
    let error = error.map(|e| e.to_string());

    let rows: Vec<AnyView> = conversations
        .iter()
        .map(|conv| {
            let last = conv.messages.last();
            let title = last
                .map(|m| preview(&m.content, PREVIEW_CHARS))
                .unwrap_or_else(|| "(no messages)".to_string());
            let updated = format_timestamp(conv.updated_at);
            let open_href = format!("/chat?conversation_id={}", conv.conversation_id);
            let conversation_id = conv.conversation_id.clone();

            view! {
                <tr>
                    <td>
                        <div>{title}</div>
                        <div class="preview muted">{updated}</div>
                    </td>
                    <td>
                        <a href={open_href}><button type="button">"Open"</button></a>
                        " "
                        <form method="POST" action="/conversations"
                            onsubmit="return confirm('Delete this conversation?')">
                            <input type="hidden" name="action" value="delete"/>
                            <input type="hidden" name="conversation_id" value={conversation_id}/>
                            <button type="submit">"Delete"</button>
                        </form>
                    </td>
                </tr>
            }
            .into_any()
        })
        .collect();

    let content = view! {
        {match error {
            Some(message) => Either::Left(view! {
                <div class="banner error">{message}</div>
            }),
            None => Either::Right(()),
        }}
        <div class="panel">
            <h2>"Conversation history"</h2>
            {if empty {
                Either::Left(view! { <p class="muted">"No conversations yet."</p> })
            } else {
                Either::Right(view! { <table>{rows}</table> })
            }}
        </div>
    };

    Page {
        title: "RAG Chat - History".to_string(),
        heading: "RAG Chat".to_string(),
        user: Some(HeaderUser {
            display_name: session.display_name.clone(),
            department: session
                .department_name
                .clone()
                .unwrap_or_else(|| session.department_code.clone()),
        }),
        nav_links: vec![NavLink::new("Back to chat", "/chat")],
        content,
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{MessageRole, StoredMessage};

    fn session() -> Session {
        Session {
            id: "sess-1".to_string(),
            user_id: "user-1".to_string(),
            user_email: "user@example.com".to_string(),
            display_name: "Test User".to_string(),
            department_code: "001".to_string(),
            department_name: None,
            access_token: "access".to_string(),
            refresh_token: None,
            token_expires_at: 0,
            created_at: 0,
            last_accessed_at: 0,
        }
    }

    #[test]
    fn empty_history_shows_hint() {
        let html = render_conversations(&session(), &[], None);
        assert!(html.contains("No conversations yet."));
    }

    #[test]
    fn rows_link_to_chat_and_truncate_preview() {
        let record = ConversationRecord {
            conversation_id: "c1".to_string(),
            user_id: "user-1".to_string(),
            department_code: "001".to_string(),
            created_at: 0,
            updated_at: 1_700_000_000_000,
            messages: vec![StoredMessage {
                id: "m1".to_string(),
                role: MessageRole::Assistant,
                content: "x".repeat(80),
                timestamp: 0,
                error: None,
            }],
        };
        let html = render_conversations(&session(), &[record], None);
        assert!(html.contains("/chat?conversation_id=c1"));
        assert!(html.contains(&format!("{}...", "x".repeat(40))));
        assert!(html.contains("name=\"conversation_id\" value=\"c1\""));
    }
}
