use thiserror::Error;

/// Application error taxonomy.
///
/// Validation and auth failures are resolved before any upstream call and
/// surface as 4xx responses; upstream failures discovered mid-stream are
/// converted into a terminal `error` SSE frame by the relay instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("upstream connection failed after {attempts} attempt(s): {message}")]
    ConnectionFailed { attempts: u32, message: String },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("upstream API error ({code}): {message}")]
    UpstreamApi {
        status: u16,
        code: String,
        message: String,
    },

    #[error("token expired: {0}")]
    TokenExpired(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("{0}")]
    Validation(String),
}

impl AppError {
    /// Stable machine-readable code, carried on SSE `error` frames.
    /// `UpstreamApi` reports the upstream-supplied code instead.
    pub fn code(&self) -> &str {
        match self {
            AppError::ConnectionFailed { .. } => "connection_failed",
            AppError::InvalidResponse(_) => "invalid_response",
            AppError::UpstreamApi { code, .. } => code.as_str(),
            AppError::TokenExpired(_) => "token_expired",
            AppError::InvalidSession(_) => "invalid_session",
            AppError::Validation(_) => "validation_error",
        }
    }

    /// HTTP status to use when the error must map to a plain response.
    pub fn status(&self) -> u16 {
        match self {
            AppError::ConnectionFailed { .. } => 502,
            AppError::InvalidResponse(_) => 502,
            AppError::UpstreamApi { status, .. } => *status,
            AppError::TokenExpired(_) => 401,
            AppError::InvalidSession(_) => 401,
            AppError::Validation(_) => 400,
        }
    }
}
