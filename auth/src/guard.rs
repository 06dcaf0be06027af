use sqlx::SqlitePool;

use common::config::SessionConfig;
use common::error::AppError;
use common::models::Session;

use crate::identity::IdentityClient;
use crate::signature::verify_session_id;

/// Resolve the caller's session from the signed `session` cookie value.
///
/// Returns `None` for a missing cookie, a bad signature, an unknown id, or a
/// session idle past the configured max age — the stale row is deleted as a
/// side effect of that last check. On success `last_accessed_at` is bumped.
pub async fn resolve_session(
    pool: &SqlitePool,
    config: &SessionConfig,
    signed_cookie: Option<&str>,
) -> anyhow::Result<Option<(String, Session)>> {
    let Some(signed) = signed_cookie else {
        return Ok(None);
    };
    let Some(session_id) = verify_session_id(&config.secret, signed) else {
        return Ok(None);
    };
    let Some(mut session) = db::sessions::get_session(pool, &session_id).await? else {
        return Ok(None);
    };

    let now = db::now_ms();
    if now - session.last_accessed_at > config.max_age_secs * 1000 {
        db::sessions::delete_session(pool, &session_id).await?;
        return Ok(None);
    }

    db::sessions::touch_session(pool, &session_id, now).await?;
    session.last_accessed_at = now;
    Ok(Some((session_id, session)))
}

/// Refresh the access token when it is inside the refresh buffer.
///
/// Refresh happens eagerly here, before the upstream call, because the
/// streaming relay cannot retry once bytes have started flowing to the
/// browser. A failed refresh deletes the session (fail-closed) and surfaces
/// `TokenExpired` unless the provider reported something more specific.
pub async fn ensure_valid_token(
    pool: &SqlitePool,
    identity: &IdentityClient,
    session_id: &str,
    session: Session,
    config: &SessionConfig,
) -> Result<Session, AppError> {
    let now = db::now_ms();
    if now + config.refresh_buffer_secs * 1000 < session.token_expires_at {
        return Ok(session);
    }

    let Some(refresh_token) = session.refresh_token.clone() else {
        return Err(AppError::TokenExpired(
            "no refresh token available".to_string(),
        ));
    };

    match identity.refresh(&refresh_token).await {
        Ok(tokens) => {
            let expires_at = db::now_ms() + tokens.expires_in * 1000;
            db::sessions::update_session_tokens(
                pool,
                session_id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                expires_at,
            )
            .await
            .map_err(|e| AppError::InvalidSession(format!("failed to persist session: {}", e)))?;

            let mut updated = session;
            updated.access_token = tokens.access_token;
            if tokens.refresh_token.is_some() {
                updated.refresh_token = tokens.refresh_token;
            }
            updated.token_expires_at = expires_at;
            updated.last_accessed_at = db::now_ms();
            Ok(updated)
        }
        Err(err) => {
            if let Err(delete_err) = db::sessions::delete_session(pool, session_id).await {
                log::warn!(
                    "failed to delete session after refresh failure: {}",
                    delete_err
                );
            }
            Err(match err {
                AppError::ConnectionFailed { message, .. } => AppError::TokenExpired(format!(
                    "token refresh failed: {}",
                    message
                )),
                other => other,
            })
        }
    }
}
