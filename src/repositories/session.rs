use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{EndReason, Session},
};

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        token_hash: row.try_get("token_hash").map_err(|_| AppError::MissingData("token_hash".to_string()))?,
        device: row.try_get("device").map_err(|_| AppError::MissingData("device".to_string()))?,
        ip_address: row.try_get("ip_address").map_err(|_| AppError::MissingData("ip_address".to_string()))?,
        is_active: row.try_get("is_active").map_err(|_| AppError::MissingData("is_active".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        last_activity: row.try_get("last_activity").map_err(|_| AppError::MissingData("last_activity".to_string()))?,
        expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
        ended_at: row.try_get("ended_at").map_err(|_| AppError::MissingData("ended_at".to_string()))?,
        end_reason: row.try_get("end_reason").map_err(|_| AppError::MissingData("end_reason".to_string()))?,
    })
}

/// Input for creating a session at login time.
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub device: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Creates a new session record.
pub async fn create(pool: &Pool, new_session: NewSession) -> Result<Session> {
    let client = pool.get().await?;
    let id = Uuid::new_v4();
    let row = client
        .query_one(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, device, ip_address, last_activity, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
            &[
                &id,
                &new_session.user_id,
                &new_session.token_hash,
                &new_session.device,
                &new_session.ip_address,
                &new_session.last_activity,
                &new_session.expires_at,
            ],
        )
        .await?;
    row_to_session(&row)
}

/// Finds the live session behind a token hash.
///
/// An expired or ended session is not found; lazy expiry means "not found"
/// and "expired" are the same answer here.
pub async fn find_active_by_token_hash(pool: &Pool, token_hash: &str) -> Result<Option<Session>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM sessions
            WHERE token_hash = $1 AND is_active = true AND expires_at > NOW()
            "#,
            &[&token_hash],
        )
        .await?;
    row.map(|r| row_to_session(&r)).transpose()
}

/// Slides the session window forward.
pub async fn extend(
    pool: &Pool,
    session_id: Uuid,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            UPDATE sessions
            SET last_activity = $2, expires_at = $3
            WHERE id = $1
            RETURNING *
            "#,
            &[&session_id, &last_activity, &expires_at],
        )
        .await?;
    row_to_session(&row)
}

/// Ends a session by ID. Idempotent: ending an already-inactive session is
/// a no-op success.
///
/// # Returns
///
/// `true` when a live session was actually ended by this call.
pub async fn end_by_id(pool: &Pool, session_id: Uuid, reason: EndReason) -> Result<bool> {
    let client = pool.get().await?;
    let ended = client
        .execute(
            r#"
            UPDATE sessions
            SET is_active = false, ended_at = NOW(), end_reason = $2
            WHERE id = $1 AND is_active = true
            "#,
            &[&session_id, &reason],
        )
        .await?;
    Ok(ended > 0)
}

/// Ends a session by token hash. Idempotent like [`end_by_id`].
pub async fn end_by_token_hash(pool: &Pool, token_hash: &str, reason: EndReason) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE sessions
            SET is_active = false, ended_at = NOW(), end_reason = $2
            WHERE token_hash = $1 AND is_active = true
            "#,
            &[&token_hash, &reason],
        )
        .await?;
    Ok(())
}

/// Lists a user's live sessions, most recently active first.
pub async fn list_active(pool: &Pool, user_id: Uuid) -> Result<Vec<Session>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT *
            FROM sessions
            WHERE user_id = $1 AND is_active = true AND expires_at > NOW()
            ORDER BY last_activity DESC
            "#,
            &[&user_id],
        )
        .await?;
    rows.iter().map(row_to_session).collect()
}

/// Ends every live session of a user except the one behind `keep_hash`.
/// Supports "log out other devices".
///
/// # Returns
///
/// The number of sessions ended.
pub async fn end_all_except(pool: &Pool, user_id: Uuid, keep_hash: &str) -> Result<u64> {
    let client = pool.get().await?;
    let ended = client
        .execute(
            r#"
            UPDATE sessions
            SET is_active = false, ended_at = NOW(), end_reason = $3
            WHERE user_id = $1 AND is_active = true AND token_hash <> $2
            "#,
            &[&user_id, &keep_hash, &EndReason::Forced],
        )
        .await?;
    Ok(ended)
}

/// Storage hygiene: marks expired-but-still-active rows as timed out and
/// drops long-ended rows. Correctness never depends on this running; lazy
/// expiry on the read path already treats these rows as absent.
pub async fn sweep_expired(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let timed_out = client
        .execute(
            r#"
            UPDATE sessions
            SET is_active = false, ended_at = NOW(), end_reason = $1
            WHERE is_active = true AND expires_at <= NOW()
            "#,
            &[&EndReason::Timeout],
        )
        .await?;

    client
        .execute(
            r#"
            DELETE FROM sessions
            WHERE is_active = false AND ended_at < NOW() - INTERVAL '30 days'
            "#,
            &[],
        )
        .await?;

    Ok(timed_out)
}
