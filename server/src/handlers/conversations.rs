use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;
use std::collections::HashMap;

use common::config::AppConfig;
use common::models::Session;

use super::{current_session, redirect_to};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

fn parse_limit(query: &HashMap<String, String>) -> i64 {
    query
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT)
}

async fn render_list(
    pool: &SqlitePool,
    session: &Session,
    limit: i64,
    error: Option<&str>,
    status: u16,
) -> HttpResponse {
    match db::conversations::list_conversations_for_user(pool, &session.user_id, limit).await {
        Ok(conversations) => {
            let html = pages::conversations::render_conversations(session, &conversations, error);
            let status = actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status).content_type("text/html").body(html)
        }
        Err(e) => HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    }
}

pub async fn conversations_page(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
    pool: web::Data<SqlitePool>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let session = match current_session(&req, pool.get_ref(), config.get_ref()).await {
        Ok(Some((_, session))) => session,
        Ok(None) => return redirect_to("/auth/login"),
        Err(e) => return HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    };

    render_list(pool.get_ref(), &session, parse_limit(&query), None, 200).await
}

pub async fn conversations_action(
    req: HttpRequest,
    form: web::Form<HashMap<String, String>>,
    pool: web::Data<SqlitePool>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let session = match current_session(&req, pool.get_ref(), config.get_ref()).await {
        Ok(Some((_, session))) => session,
        Ok(None) => return redirect_to("/auth/login"),
        Err(e) => return HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    };

    let intent = form.get("action").map(|s| s.as_str()).unwrap_or("");
    let conversation_id = form
        .get("conversation_id")
        .map(|s| s.trim())
        .unwrap_or("");

    if conversation_id.is_empty() {
        return render_list(
            pool.get_ref(),
            &session,
            DEFAULT_LIMIT,
            Some("No conversation id supplied."),
            400,
        )
        .await;
    }

    if intent != "delete" {
        return render_list(
            pool.get_ref(),
            &session,
            DEFAULT_LIMIT,
            Some("Unknown action."),
            400,
        )
        .await;
    }

    // Ownership check before exposing or touching the record.
    let existing = match db::conversations::get_conversation(pool.get_ref(), conversation_id).await
    {
        Ok(record) => record,
        Err(e) => return HttpResponse::InternalServerError().body(format!("DB error: {}", e)),
    };
    let owned = existing.map(|r| r.user_id == session.user_id).unwrap_or(false);
    if !owned {
        return render_list(
            pool.get_ref(),
            &session,
            DEFAULT_LIMIT,
            Some("Conversation not found."),
            404,
        )
        .await;
    }

    if let Err(e) = db::conversations::delete_conversation(pool.get_ref(), conversation_id).await {
        return HttpResponse::InternalServerError().body(format!("DB error: {}", e));
    }
    log::info!("{} deleted conversation '{}'", session.user_email, conversation_id);
    redirect_to("/conversations")
}
