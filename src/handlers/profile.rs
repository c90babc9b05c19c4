use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    middleware_layer::auth::AuthContext,
    models::user::UserProfile,
    repositories::user as user_repo,
    state::AppState,
    validation::auth::*,
};

/// The response payload for the optional-identity probe.
#[derive(Serialize)]
pub struct WhoamiResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// The request payload for profile updates.
///
/// Deliberately narrow: there is no id and no role here, and unknown fields
/// are ignored. The target row always comes from the authenticated context.
#[derive(Deserialize, Debug, Default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Reports the caller's identity, or anonymity, without rejecting.
#[axum::debug_handler]
pub async fn whoami(ctx: Option<Extension<AuthContext>>) -> Response {
    let response = match ctx {
        Some(Extension(ctx)) => WhoamiResponse {
            authenticated: true,
            user: Some(UserProfile::from(&ctx.user)),
        },
        None => WhoamiResponse {
            authenticated: false,
            user: None,
        },
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Returns the authenticated user's profile.
#[axum::debug_handler]
pub async fn me(Extension(ctx): Extension<AuthContext>) -> Response {
    (StatusCode::OK, Json(UserProfile::from(&ctx.user))).into_response()
}

/// Updates the authenticated user's profile.
#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Response> {
    tracing::info!("📋 Profile update for user: {}", ctx.user.id);

    if let Some(name) = payload.name.as_deref() {
        if name.trim().is_empty() {
            return Err(crate::error::AppError::Validation(
                "Name cannot be empty".to_string(),
            ));
        }
    }
    if let Some(email) = payload.email.as_deref() {
        validate_email(email)?;
    }
    if let Some(phone) = payload.phone.as_deref() {
        validate_phone(phone)?;
    }

    let updated = user_repo::update_profile(
        &state.db,
        &state.cipher,
        ctx.user.id,
        user_repo::ProfileChanges {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            address: payload.address,
        },
    )
    .await?;

    tracing::info!("✅ Profile updated for user: {}", ctx.user.id);

    Ok((StatusCode::OK, Json(UserProfile::from(&updated))).into_response())
}
