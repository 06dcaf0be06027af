pub mod client;
pub mod event;
pub(crate) mod sse;

use actix_web::error::ErrorInternalServerError;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use futures::channel::mpsc::UnboundedSender;
use sqlx::SqlitePool;

use auth::identity::IdentityClient;
use auth::{guard, SESSION_COOKIE};
use common::config::AppConfig;
use common::error::AppError;
use common::models::MessageRole;
use db::conversations::NewMessage;

use crate::client::{ChatInputs, ChatRequest, UpstreamClient};
use crate::event::{error_event, StreamEvent};

type FrameSender = UnboundedSender<Result<Bytes, actix_web::Error>>;

/// `POST /api/chat-stream` — relay one chat turn as a live SSE stream.
///
/// Validation and auth resolve before any upstream call; once the
/// event-stream response is committed, failures become terminal `error`
/// frames instead of HTTP statuses. The exchange is persisted after the
/// stream concludes.
pub async fn chat_stream(
    req: HttpRequest,
    body: web::Bytes,
    pool: web::Data<SqlitePool>,
    upstream: web::Data<UpstreamClient>,
    identity: web::Data<IdentityClient>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, actix_web::Error> {
    let cookie = req.cookie(SESSION_COOKIE);
    let resolved = guard::resolve_session(
        pool.get_ref(),
        &config.session,
        cookie.as_ref().map(|c| c.value()),
    )
    .await
    .map_err(ErrorInternalServerError)?;
    let Some((session_id, session)) = resolved else {
        return Ok(HttpResponse::Unauthorized().finish());
    };

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
        Err(AppError::TokenExpired(_)) => return Ok(HttpResponse::Unauthorized().finish()),
        Err(other) => return Err(ErrorInternalServerError(other)),
    };

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return Ok(bad_request("Invalid JSON payload")),
    };
    let Some(object) = payload.as_object() else {
        return Ok(bad_request("Invalid request body"));
    };

    let query = object
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    if query.is_empty() {
        return Ok(bad_request("Message must not be empty."));
    }
    let max_len = config.chat.max_query_length;
    if query.chars().count() > max_len {
        return Ok(bad_request(&format!(
            "Message is too long (max {} characters).",
            max_len
        )));
    }

    let conversation_id = object
        .get("conversationId")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    let request = ChatRequest {
        inputs: ChatInputs {
            user_id: session.user_email.clone(),
            department_code: session.department_code.clone(),
        },
        query,
        conversation_id: conversation_id.clone(),
        user: session.user_email.clone(),
    };

    log::info!(
        "{} chat-stream conversation='{}'",
        session.user_email,
        if conversation_id.is_empty() {
            "new"
        } else {
            conversation_id.as_str()
        }
    );

    let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, actix_web::Error>>();
    let upstream = upstream.get_ref().clone();
    let pool_bg = pool.clone();
    let user_id = session.user_id.clone();
    let department_code = session.department_code.clone();

    actix_web::rt::spawn(async move {
        let outcome = relay_turn(&upstream, &request, conversation_id, &tx).await;
        let Some(outcome) = outcome else {
            return; // Browser disconnected mid-stream.
        };
        persist_turn(
            pool_bg.get_ref(),
            &user_id,
            &department_code,
            &request.query,
            outcome,
        )
        .await;
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream; charset=utf-8"))
        .insert_header((header::CACHE_CONTROL, "no-cache, no-transform"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(rx))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

struct RelayOutcome {
    conversation_id: String,
    answer: String,
    error: Option<String>,
}

/// Consume the upstream sequence, re-emitting every event to the browser
/// immediately and aggregating the turn. Returns `None` when the browser
/// disconnected (skip persistence).
async fn relay_turn(
    upstream: &UpstreamClient,
    request: &ChatRequest,
    mut conversation_id: String,
    tx: &FrameSender,
) -> Option<RelayOutcome> {
    let mut answer = String::new();
    let mut error_text: Option<String> = None;

    match upstream.stream_chat(request).await {
        Ok(mut stream) => loop {
            match stream.next().await {
                Ok(Some(event)) => {
                    // Adopt the upstream id whenever it differs; latest wins.
                    if let Some(id) = event.conversation_id() {
                        if !id.is_empty() && id != conversation_id {
                            conversation_id = id.to_string();
                        }
                    }
                    match &event {
                        StreamEvent::Message {
                            answer: fragment, ..
                        } => answer.push_str(fragment),
                        StreamEvent::Error { message, .. } => {
                            // Mark the turn errored but keep relaying.
                            error_text = Some(message.clone());
                        }
                        _ => {}
                    }
                    if send_frame(tx, &event).is_err() {
                        return None;
                    }
                }
                Ok(None) => {
                    let _ = send_frame(tx, &StreamEvent::Done);
                    break;
                }
                Err(err) => {
                    log::warn!("upstream stream failed: {}", err);
                    error_text = Some(err.to_string());
                    let _ = send_frame(tx, &error_event(&err));
                    break;
                }
            }
        },
        Err(err) => {
            log::warn!("upstream request failed: {}", err);
            error_text = Some(err.to_string());
            let _ = send_frame(tx, &error_event(&err));
        }
    }

    Some(RelayOutcome {
        conversation_id,
        answer,
        error: error_text,
    })
}

fn send_frame(tx: &FrameSender, event: &StreamEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            log::error!("failed to serialize stream event: {}", e);
            return Ok(());
        }
    };
    tx.unbounded_send(Ok(Bytes::from(format!("data: {}\n\n", json))))
        .map_err(|_| ())
}

/// Store the user query and the assistant result (answer, or error text with
/// the error field set). Skipped when no conversation id was ever resolved
/// or nothing came back — at-most-once-on-success, never retried. Failures
/// here are logged only; the user-visible answer already went out.
async fn persist_turn(
    pool: &SqlitePool,
    user_id: &str,
    department_code: &str,
    query: &str,
    outcome: RelayOutcome,
) {
    if outcome.conversation_id.is_empty() {
        return;
    }
    let content = match &outcome.error {
        Some(error) => error.clone(),
        None => outcome.answer.clone(),
    };
    if content.is_empty() {
        return;
    }

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
            content,
            error: outcome.error,
            timestamp: now,
        },
    ];

    if let Err(e) = db::conversations::append_messages(
        pool,
        Some(&outcome.conversation_id),
        user_id,
        department_code,
        &messages,
    )
    .await
    {
        log::error!(
            "failed to store conversation turn for '{}': {}",
            outcome.conversation_id,
            e
        );
    }
}
