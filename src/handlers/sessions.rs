use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::AuthContext,
    middleware_layer::role::require_owner_or_admin,
    models::session::{EndReason, SessionInfo},
    models::user::Role,
    repositories::session as session_repo,
    repositories::user as user_repo,
    state::AppState,
};

/// The response payload for session listings.
#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// The response payload reporting how many sessions were ended.
#[derive(Serialize)]
pub struct EndedResponse {
    pub success: bool,
    pub ended: u64,
}

/// The request payload for the admin role change.
#[derive(Deserialize, Debug)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// Lists the authenticated user's live sessions across devices.
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response> {
    let sessions = session_repo::list_active(&state.db, ctx.user.id).await?;
    let sessions = sessions
        .iter()
        .map(|s| SessionInfo::from_session(s, ctx.session.id))
        .collect();

    Ok((StatusCode::OK, Json(SessionListResponse { sessions })).into_response())
}

/// Ends every one of the caller's sessions except the current one
/// ("log out other devices").
#[axum::debug_handler]
pub async fn end_other_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response> {
    let ended =
        session_repo::end_all_except(&state.db, ctx.user.id, &ctx.session.token_hash).await?;

    tracing::info!("✅ Ended {} other sessions for user: {}", ended, ctx.user.id);

    Ok((StatusCode::OK, Json(EndedResponse { success: true, ended })).into_response())
}

/// Lists a user's live sessions. The caller must own the account or be an
/// admin.
#[axum::debug_handler]
pub async fn list_user_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> Result<Response> {
    require_owner_or_admin(&ctx, user_id)?;

    let sessions = session_repo::list_active(&state.db, user_id).await?;
    let sessions = sessions
        .iter()
        .map(|s| SessionInfo::from_session(s, ctx.session.id))
        .collect();

    Ok((StatusCode::OK, Json(SessionListResponse { sessions })).into_response())
}

/// Force-ends a session by ID. Admin only; idempotent.
#[axum::debug_handler]
pub async fn admin_end_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let ended = session_repo::end_by_id(&state.db, session_id, EndReason::Forced).await?;

    if ended {
        tracing::info!("✅ Session {} force-ended by admin {}", session_id, ctx.user.id);
    }

    let response = EndedResponse {
        success: true,
        ended: u64::from(ended),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Changes a user's role. Admin only; the single privileged write path for
/// the role field.
#[axum::debug_handler]
pub async fn admin_set_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Response> {
    let updated = user_repo::set_role(&state.db, user_id, payload.role).await?;
    if !updated {
        return Err(AppError::NotFound);
    }

    tracing::info!(
        "✅ Role of user {} set to {} by admin {}",
        user_id,
        payload.role.as_str(),
        ctx.user.id
    );

    Ok((
        StatusCode::OK,
        Json(crate::handlers::auth::AuthResponse {
            success: true,
            message: format!("Role updated to {}", payload.role.as_str()),
        }),
    )
        .into_response())
}
