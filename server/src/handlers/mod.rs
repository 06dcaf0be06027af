mod auth;
mod chat;
mod conversations;

pub use auth::*;
pub use chat::*;
pub use conversations::*;

use actix_web::{HttpRequest, HttpResponse};
use sqlx::SqlitePool;

use common::config::AppConfig;
use common::models::Session;

pub(crate) async fn current_session(
    req: &HttpRequest,
    pool: &SqlitePool,
    config: &AppConfig,
) -> anyhow::Result<Option<(String, Session)>> {
    let cookie = req.cookie(::auth::SESSION_COOKIE);
    ::auth::guard::resolve_session(
        pool,
        &config.session,
        cookie.as_ref().map(|c| c.value()),
    )
    .await
}

pub(crate) fn redirect_to(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header(("Location", location.to_string()))
        .finish()
}
