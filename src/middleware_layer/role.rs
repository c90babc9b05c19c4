use axum::{body::Body, http::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::AuthContext,
    models::user::Role,
};

/// Checks that the authenticated identity holds one of the allowed roles.
pub fn require_role(ctx: &AuthContext, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&ctx.user.role) {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "Requires one of [{}], current role is {}",
        allowed
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        ctx.user.role.as_str(),
    )))
}

/// Checks that the authenticated identity owns the resource or is an admin.
pub fn require_owner_or_admin(ctx: &AuthContext, resource_owner_id: Uuid) -> Result<()> {
    if ctx.user.id == resource_owner_id || ctx.user.role == Role::Admin {
        return Ok(());
    }

    Err(AppError::Forbidden(
        "You do not own this resource".to_string(),
    ))
}

/// A middleware gating a route subtree to admins. Runs after `require_auth`.
///
/// # Arguments
///
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an `AppError` rejection.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response> {
    let ctx = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::MissingToken)?;

    require_role(ctx, &[Role::Admin])?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Session;
    use crate::models::user::User;
    use chrono::Utc;

    fn ctx_with_role(role: Role) -> AuthContext {
        let now = Utc::now();
        AuthContext {
            user: User {
                id: Uuid::new_v4(),
                name: "Dev Patel".to_string(),
                username: "dev".to_string(),
                email: None,
                password: "$argon2id$unused".to_string(),
                phone: None,
                address: None,
                role,
                login_attempts: 0,
                account_locked_until: None,
                otp_code: None,
                otp_expires_at: None,
                password_changed_at: now,
                password_expires_at: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
            session: Session {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                token_hash: "cd".repeat(32),
                device: None,
                ip_address: None,
                is_active: true,
                created_at: now,
                last_activity: now,
                expires_at: Session::next_expiry(now),
                ended_at: None,
                end_reason: None,
            },
        }
    }

    #[test]
    fn role_gate_allows_and_refuses() {
        let admin = ctx_with_role(Role::Admin);
        let user = ctx_with_role(Role::User);

        assert!(require_role(&admin, &[Role::Admin]).is_ok());
        assert!(require_role(&user, &[Role::User, Role::Restaurant]).is_ok());
        assert!(matches!(
            require_role(&user, &[Role::Admin]),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn refusal_names_the_roles() {
        let user = ctx_with_role(Role::User);
        let Err(AppError::Forbidden(msg)) = require_role(&user, &[Role::Admin, Role::Restaurant])
        else {
            panic!("expected Forbidden");
        };
        assert!(msg.contains("admin"));
        assert!(msg.contains("restaurant"));
        assert!(msg.contains("current role is user"));
    }

    #[test]
    fn ownership_gate() {
        let ctx = ctx_with_role(Role::User);
        assert!(require_owner_or_admin(&ctx, ctx.user.id).is_ok());
        assert!(require_owner_or_admin(&ctx, Uuid::new_v4()).is_err());

        let admin = ctx_with_role(Role::Admin);
        assert!(require_owner_or_admin(&admin, Uuid::new_v4()).is_ok());
    }
}
