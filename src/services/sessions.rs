use chrono::Utc;
use deadpool_postgres::Pool;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::session::{EndReason, Liveness, Session};
use crate::repositories::session as session_repo;

/// Derives the storage lookup key for a bearer token. The raw token never
/// touches the database.
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Looks up the session behind `token` and slides its window forward.
///
/// Returns `None` when no live session backs the token. Lazy expiry: an
/// expired or idle session is indistinguishable from an absent one to the
/// caller, and is marked ended as a side effect.
pub async fn validate(db: &Pool, token: &str) -> Result<Option<Session>> {
    let hash = token_hash(token);
    let now = Utc::now();

    let Some(session) = session_repo::find_active_by_token_hash(db, &hash).await? else {
        return Ok(None);
    };

    match session.assess(now) {
        Liveness::TimedOut => {
            session_repo::end_by_id(db, session.id, EndReason::Timeout).await?;
            tracing::debug!("⏰ Session {} idle-expired for user {}", session.id, session.user_id);
            Ok(None)
        }
        Liveness::Extend {
            last_activity,
            expires_at,
        } => {
            let extended = session_repo::extend(db, session.id, last_activity, expires_at).await?;
            Ok(Some(extended))
        }
    }
}

/// Ends the session behind `token`. Idempotent.
pub async fn end(db: &Pool, token: &str, reason: EndReason) -> Result<()> {
    session_repo::end_by_token_hash(db, &token_hash(token), reason).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_hex() {
        let a = token_hash("some.jwt.token");
        let b = token_hash("some.jwt.token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, token_hash("other.jwt.token"));
    }
}
