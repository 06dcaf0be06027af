use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;
use std::collections::HashMap;

use ::auth::guard;
use ::auth::identity::IdentityClient;
use common::config::AppConfig;
use common::error::AppError;
use common::models::{ConversationRecord, MessageRole, Session};
use db::conversations::NewMessage;
use relay::client::{ChatInputs, ChatRequest, UpstreamClient};

use super::{current_session, redirect_to};

pub async fn home(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    match current_session(&req, pool.get_ref(), config.get_ref()).await {
        Ok(Some(_)) => redirect_to("/chat"),
        Ok(None) => redirect_to("/auth/login"),
        Err(e) => HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    }
}

pub async fn chat_script() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(include_str!("../../static/chat.js"))
}

/// Load a conversation for display, enforcing ownership.
async fn owned_conversation(
    pool: &SqlitePool,
    session: &Session,
    conversation_id: Option<&str>,
) -> Option<ConversationRecord> {
    let conversation_id = conversation_id?;
    if conversation_id.is_empty() {
        return None;
    }
    match db::conversations::get_conversation(pool, conversation_id).await {
        Ok(Some(record)) if record.user_id == session.user_id => Some(record),
        Ok(_) => None,
        Err(e) => {
            log::warn!("failed to load conversation '{}': {}", conversation_id, e);
            None
        }
    }
}

pub async fn chat_page(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
    pool: web::Data<SqlitePool>,
    identity: web::Data<IdentityClient>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let resolved = match current_session(&req, pool.get_ref(), config.get_ref()).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => return redirect_to("/auth/login"),
        Err(e) => return HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    };
    let (session_id, session) = resolved;

    let session = match guard::ensure_valid_token(
        pool.get_ref(),
        identity.get_ref(),
        &session_id,
        session,
        &config.session,
    )
    .await
    {
        Ok(session) => session,
        Err(AppError::TokenExpired(_)) => return redirect_to("/auth/login"),
        Err(e) => {
            log::warn!("token refresh failed on page load: {}", e);
            return redirect_to("/auth/login");
        }
    };

    let conversation = owned_conversation(
        pool.get_ref(),
        &session,
        query.get("conversation_id").map(|s| s.as_str()),
    )
    .await;

    let html = pages::chat::render_chat(&session, conversation.as_ref(), None);
    HttpResponse::Ok().content_type("text/html").body(html)
}

/// Blocking-mode fallback for browsers without the streaming script.
/// Validates like the relay, waits for the full answer, persists the turn,
/// then redirects to the conversation (PRG).
pub async fn chat_submit(
    req: HttpRequest,
    form: web::Form<HashMap<String, String>>,
    pool: web::Data<SqlitePool>,
    upstream: web::Data<UpstreamClient>,
    identity: web::Data<IdentityClient>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let resolved = match current_session(&req, pool.get_ref(), config.get_ref()).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => return redirect_to("/auth/login"),
        Err(e) => return HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    };
    let (session_id, session) = resolved;

    let session = match guard::ensure_valid_token(
        pool.get_ref(),
        identity.get_ref(),
        &session_id,
        session,
        &config.session,
    )
    .await
    {
        Ok(session) => session,
        Err(AppError::TokenExpired(_)) => return redirect_to("/auth/login"),
        Err(e) => return HttpResponse::InternalServerError().body(format!("Auth error: {}", e)),
    };

    let query = form.get("query").map(|s| s.trim()).unwrap_or("");
    let conversation_id = form
        .get("conversation_id")
        .map(|s| s.trim())
        .unwrap_or("")
        .to_string();

    if query.is_empty() {
        return render_with_error(
            pool.get_ref(),
            &session,
            &conversation_id,
            "Please enter a message.",
            400,
        )
        .await;
    }
    let max_len = config.chat.max_query_length;
    if query.chars().count() > max_len {
        let message = format!("Message is too long (max {} characters).", max_len);
        return render_with_error(pool.get_ref(), &session, &conversation_id, &message, 400).await;
    }

    let request = ChatRequest {
        inputs: ChatInputs {
            user_id: session.user_email.clone(),
            department_code: session.department_code.clone(),
        },
        query: query.to_string(),
        conversation_id: conversation_id.clone(),
        user: session.user_email.clone(),
    };

    match upstream.send_blocking(&request).await {
        Ok(response) => {
            let now = db::now_ms();
            let messages = [
                NewMessage {
                    role: MessageRole::User,
                    content: query.to_string(),
                    error: None,
                    timestamp: now,
                },
                NewMessage {
                    role: MessageRole::Assistant,
                    content: response.answer.clone(),
                    error: None,
                    timestamp: now,
                },
            ];
            // The upstream-assigned conversation id is definitive.
            if let Err(e) = db::conversations::append_messages(
                pool.get_ref(),
                Some(&response.conversation_id),
                &session.user_id,
                &session.department_code,
                &messages,
            )
            .await
            {
                log::error!("failed to store conversation turn: {}", e);
            }
            redirect_to(&format!(
                "/chat?conversation_id={}",
                response.conversation_id
            ))
        }
        Err(e) => {
            log::error!("blocking chat call failed: {}", e);
            render_with_error(
                pool.get_ref(),
                &session,
                &conversation_id,
                &e.to_string(),
                e.status(),
            )
            .await
        }
    }
}

async fn render_with_error(
    pool: &SqlitePool,
    session: &Session,
    conversation_id: &str,
    message: &str,
    status: u16,
) -> HttpResponse {
    let conversation = owned_conversation(pool, session, Some(conversation_id)).await;
    let html = pages::chat::render_chat(session, conversation.as_ref(), Some(message));
    let status = actix_web::http::StatusCode::from_u16(status)
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).content_type("text/html").body(html)
}
