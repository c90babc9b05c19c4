use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A database pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A database pool creation error.
    #[error("Database pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// No bearer token was supplied with the request.
    #[error("Authentication required")]
    MissingToken,

    /// The bearer token failed signature verification or decoding.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The bearer token's own expiry claim has passed.
    #[error("Token expired")]
    TokenExpired,

    /// No live server-side session backs the presented token.
    #[error("Session expired")]
    SessionExpired,

    /// A generic authentication failure (bad credentials, unknown user).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The account is temporarily locked after repeated failures.
    #[error("Account locked for {minutes} more minutes")]
    Lockout { minutes: i64 },

    /// The account's password has passed its validity lifetime.
    #[error("Password expired")]
    PasswordExpired,

    /// An authorization failure (role or ownership mismatch).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Database error".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Database pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Cache error".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "File system error".to_string())
            }

            AppError::MissingData(ref col) => {
                tracing::error!("Missing column in row: {}", col);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal server error".to_string())
            }

            AppError::MissingToken => {
                tracing::debug!("Request without bearer token");
                (StatusCode::UNAUTHORIZED, "NO_TOKEN", "Authentication required".to_string())
            }

            AppError::InvalidToken(ref msg) => {
                tracing::warn!("Invalid token: {}", msg);
                (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", "Invalid token".to_string())
            }

            AppError::TokenExpired => {
                tracing::debug!("Expired token presented");
                (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token expired".to_string())
            }

            AppError::SessionExpired => {
                tracing::debug!("No live session for presented token");
                (StatusCode::UNAUTHORIZED, "SESSION_EXPIRED", "Session expired, please log in again".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "AUTH_FAILED", msg.clone())
            }

            AppError::Lockout { minutes } => {
                tracing::warn!("Locked account refused ({} minutes remaining)", minutes);
                (
                    StatusCode::FORBIDDEN,
                    "ACCOUNT_LOCKED",
                    format!("Account temporarily locked. Try again in {} minutes", minutes),
                )
            }

            AppError::PasswordExpired => {
                tracing::warn!("Login refused: password past validity lifetime");
                (
                    StatusCode::FORBIDDEN,
                    "PASSWORD_EXPIRED",
                    "Password expired, please change your password".to_string(),
                )
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("Authorization failed: {}", msg);
                (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, "VALIDATION", msg.clone())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Encryption error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal server error".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", msg.clone())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "code": code
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error","code":"INTERNAL"}"#.to_string());

        (status, body).into_response()
    }
}
