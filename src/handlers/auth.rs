use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::{
    error::Result,
    middleware_layer::auth::AuthContext,
    models::session::EndReason,
    repositories::session as session_repo,
    services::auth as auth_service,
    state::AppState,
    validation::auth::*,
};

/// The request payload for user registration.
#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// The request payload for user login.
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The request payload for completing an OTP challenge.
#[derive(Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub username: String,
    pub code: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// The response payload for message-only authentication requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload carrying an issued bearer token.
#[derive(Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

/// The response payload for a started OTP challenge.
#[derive(Serialize)]
pub struct OtpChallengeResponse {
    pub success: bool,
    pub requires_otp: bool,
    pub message: String,
    pub expires_at: DateTime<Utc>,
    /// Echo of the code; only present in dev mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// Captures device metadata for the session record.
fn device_meta(headers: &HeaderMap, addr: &SocketAddr) -> (Option<String>, Option<String>) {
    let device = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(255).collect::<String>());
    (device, Some(addr.ip().to_string()))
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("📝 Register attempt: {}", payload.username);
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;

    if payload.name.trim().is_empty() {
        return Err(crate::error::AppError::Validation(
            "Name cannot be empty".to_string(),
        ));
    }
    if let Some(email) = payload.email.as_deref() {
        validate_email(email)?;
    }
    if let Some(phone) = payload.phone.as_deref() {
        validate_phone(phone)?;
    }

    let user = auth_service::create_user(
        &state,
        auth_service::RegisterInput {
            name: payload.name,
            username: payload.username,
            email: payload.email,
            password: payload.password,
            phone: payload.phone,
            address: payload.address,
        },
    )
    .await?;

    tracing::info!("✅ User registered: {}", user.id);

    let response = AuthResponse {
        success: true,
        message: "Registration successful. Welcome!".to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles user login.
///
/// Admins get a session token directly; everyone else gets an OTP challenge
/// to complete via `verify_otp`.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {}", payload.username);
    validate_username(&payload.username)?;

    let (device, ip) = device_meta(&headers, &addr);

    match auth_service::login(&state, &payload.username, &payload.password, device, ip).await? {
        auth_service::LoginOutcome::Session { token } => {
            let response = TokenResponse {
                success: true,
                token,
            };
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        auth_service::LoginOutcome::OtpChallenge { otp, expires_at } => {
            let response = OtpChallengeResponse {
                success: true,
                requires_otp: true,
                message: "Verification code sent to your email".to_string(),
                expires_at,
                otp,
            };
            Ok((StatusCode::OK, Json(response)).into_response())
        }
    }
}

/// Handles OTP challenge completion.
#[axum::debug_handler]
pub async fn verify_otp(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Response> {
    tracing::info!("🔢 OTP verification attempt: {}", payload.username);
    validate_username(&payload.username)?;

    let (device, ip) = device_meta(&headers, &addr);
    let token =
        auth_service::verify_otp(&state, &payload.username, &payload.code, device, ip).await?;

    let response = TokenResponse {
        success: true,
        token,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout by ending the authenticated session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", ctx.user.id);

    session_repo::end_by_id(&state.db, ctx.session.id, EndReason::Logout).await?;

    tracing::info!("✅ User logged out: {}", ctx.user.id);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles changing a user's password.
#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response> {
    validate_password(&payload.new_password)?;

    auth_service::change_password(
        &state,
        &ctx.user,
        &payload.old_password,
        &payload.new_password,
    )
    .await?;

    let response = AuthResponse {
        success: true,
        message: "Password changed successfully".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
