use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;
use std::collections::HashMap;

use ::auth::identity::IdentityClient;
use ::auth::signature::{generate_session_id, sign_session_id, verify_session_id};
use ::auth::SESSION_COOKIE;
use common::config::AppConfig;
use common::error::AppError;
use db::sessions::NewSession;

use super::redirect_to;

const STATE_COOKIE: &str = "oauth_state";

fn error_response(err: &AppError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(serde_json::json!({ "error": err.to_string() }))
}

fn session_cookie(config: &AppConfig, value: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.session.cookie_secure)
        .max_age(CookieDuration::seconds(config.session.max_age_secs))
        .finish()
}

pub async fn login(
    identity: web::Data<IdentityClient>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let state = generate_session_id();
    match identity.authorize_url(&state) {
        Ok(url) => {
            let state_cookie = Cookie::build(STATE_COOKIE, state)
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(config.session.cookie_secure)
                .max_age(CookieDuration::minutes(10))
                .finish();
            HttpResponse::SeeOther()
                .insert_header(("Location", url))
                .cookie(state_cookie)
                .finish()
        }
        Err(e) => HttpResponse::InternalServerError().body(format!("Auth error: {}", e)),
    }
}

pub async fn callback(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
    pool: web::Data<SqlitePool>,
    identity: web::Data<IdentityClient>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    if let Some(error) = query.get("error") {
        log::warn!("identity provider returned error: {}", error);
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": format!("Authentication error: {}", error) }));
    }
    let Some(code) = query.get("code") else {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": "Missing authorization code" }));
    };

    let state_matches = match (query.get("state"), req.cookie(STATE_COOKIE)) {
        (Some(state), Some(cookie)) => cookie.value() == state,
        _ => false,
    };
    if !state_matches {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": "Invalid state parameter" }));
    }

    let tokens = match identity.exchange_code(code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            log::error!("token exchange failed: {}", e);
            return error_response(&e);
        }
    };

    let profile = match identity.fetch_profile(&tokens.access_token).await {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("profile lookup failed: {}", e);
            return error_response(&e);
        }
    };

    let session_id = generate_session_id();
    let created = db::sessions::create_session(
        pool.get_ref(),
        &NewSession {
            id: &session_id,
            user_id: &profile.user_id,
            user_email: &profile.email,
            display_name: &profile.display_name,
            department_code: &profile.department_code,
            department_name: profile.department_name.as_deref(),
            access_token: &tokens.access_token,
            refresh_token: tokens.refresh_token.as_deref(),
            token_expires_at: db::now_ms() + tokens.expires_in * 1000,
        },
    )
    .await;
    if let Err(e) = created {
        return HttpResponse::InternalServerError().body(format!("DB error: {}", e));
    }

    log::info!("{} signed in ({})", profile.email, profile.department_code);

    let signed = sign_session_id(&config.session.secret, &session_id);
    let mut expired_state = Cookie::new(STATE_COOKIE, "");
    expired_state.set_path("/");
    expired_state.make_removal();

    HttpResponse::SeeOther()
        .insert_header(("Location", "/chat"))
        .cookie(session_cookie(&config, signed))
        .cookie(expired_state)
        .finish()
}

pub async fn logout(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if let Some(session_id) = verify_session_id(&config.session.secret, cookie.value()) {
            if let Err(e) = db::sessions::delete_session(pool.get_ref(), &session_id).await {
                log::warn!("failed to delete session on logout: {}", e);
            }
        }
    }

    let mut expired = Cookie::new(SESSION_COOKIE, "");
    expired.set_path("/");
    expired.make_removal();

    let mut response = redirect_to("/auth/login");
    if let Err(e) = response.add_removal_cookie(&expired) {
        log::warn!("failed to clear session cookie: {}", e);
    }
    response
}
