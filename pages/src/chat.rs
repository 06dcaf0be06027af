use leptos::{either::Either, prelude::*};
use templates::{HeaderUser, NavLink, Page};

use common::models::{ConversationRecord, MessageRole, Session, StoredMessage};

fn message_bubble(message: &StoredMessage) -> AnyView {
    let role_label = match message.role {
        MessageRole::User => "You",
        MessageRole::Assistant => "Assistant",
        MessageRole::System => "System",
    };
    let mut class = format!(
        "message {}",
        match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "assistant",
        }
    );
    if message.error.is_some() {
        class.push_str(" error");
    }
    let content = message.content.clone();

    view! {
        <div class={class}>
            <div class="meta">{role_label}</div>
            {content}
        </div>
    }
    .into_any()
}

pub fn render_chat(
    session: &Session,
    conversation: Option<&ConversationRecord>,
    error: Option<&str>,
) -> String {
    let conversation_id = conversation
        .map(|c| c.conversation_id.clone())
        .unwrap_or_default();
    let messages: Vec<AnyView> = conversation
        .map(|c| c.messages.iter().map(message_bubble).collect())
        .unwrap_or_default();
    let empty = messages.is_empty();
    let error = error.map(|e| e.to_string());

    let content = view! {
        {match error {
            Some(message) => Either::Left(view! {
                <div class="banner error" id="form-error">{message}</div>
            }),
            None => Either::Right(view! {
                <div class="banner error hidden" id="form-error"></div>
            }),
        }}
        <div class="panel" id="message-log">
            {if empty {
                Either::Left(view! {
                    <p class="muted" id="empty-hint">"Ask a question about internal rules and manuals."</p>
                })
            } else {
                Either::Right(messages)
            }}
        </div>
        <div class="panel">
            <form method="POST" action="/chat" id="chat-form">
                <input type="hidden" name="conversation_id" id="conversation-id" value={conversation_id}/>
                <textarea name="query" rows="2" placeholder="Ask a question..."></textarea>
                <div style="margin-top:8px">
                    <button type="submit" id="send-button">"Send"</button>
                    " "
                    <button type="button" id="retry-button" class="hidden">"Retry"</button>
                </div>
            </form>
        </div>
        <script src="/static/chat.js"></script>
    };

    Page {
        title: "RAG Chat".to_string(),
        heading: "RAG Chat".to_string(),
        user: Some(HeaderUser {
            display_name: session.display_name.clone(),
            department: session
                .department_name
                .clone()
                .unwrap_or_else(|| session.department_code.clone()),
        }),
        nav_links: vec![
            NavLink::new("New chat", "/chat?new=1"),
            NavLink::new("History", "/conversations"),
        ],
        content,
    }
    .render()
}
