use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use http::header::AUTHORIZATION;

use crate::{
    crypto::jwt,
    error::{AppError, Result},
    models::session::Session,
    models::user::User,
    repositories::user as user_repo,
    services::sessions,
    state::AppState,
};

/// The identity and session a request was authenticated with.
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
}

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(request: &Request<Body>) -> Result<&str> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::MissingToken)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::InvalidToken("malformed Authorization header".to_string()))
}

/// Runs the full authentication sequence for a request.
///
/// Two sources of truth, checked in order: the token must verify on its own
/// (signature, expiry claim), and a live server-side session must back it.
/// The session check also slides the inactivity window forward.
async fn authenticate(state: &AppState, token: &str) -> Result<AuthContext> {
    let claims = jwt::verify_token(token, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    // A deleted or deactivated user may still hold a token that verifies.
    let user = user_repo::find_by_id(&state.db, &state.cipher, &user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Authentication("User not found".to_string()))?;

    let session = sessions::validate(&state.db, token)
        .await?
        .ok_or(AppError::SessionExpired)?;

    Ok(AuthContext { user, session })
}

/// A middleware that requires a valid bearer token backed by a live session.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an `AppError` rejection.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let token = extract_bearer_token(&request)?.to_owned();
    let ctx = authenticate(&state, &token).await?;
    tracing::debug!("✅ Authenticated: {} ({})", ctx.user.id, ctx.user.role.as_str());

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// The non-rejecting variant of [`require_auth`].
///
/// On any authentication failure the request simply proceeds without an
/// identity attached. Used by endpoints that personalize output when logged
/// in but work anonymously otherwise.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(&request) {
        Ok(token) => token.to_owned(),
        Err(e) => {
            tracing::debug!("Anonymous request ({})", e);
            return next.run(request).await;
        }
    };
    match authenticate(&state, &token).await {
        Ok(ctx) => {
            tracing::debug!("✅ Authenticated (optional): {}", ctx.user.id);
            request.extensions_mut().insert(ctx);
        }
        Err(e) => {
            tracing::debug!("Anonymous request ({})", e);
        }
    }
    next.run(request).await
}
