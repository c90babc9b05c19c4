use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    crypto::cipher::CipherService,
    error::{AppError, Result},
    models::user::{Role, User},
};

/// A helper function to map a `tokio_postgres::Row` to a `User`.
///
/// Fields come back exactly as stored; PII is still in envelope form here.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
        email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
        password: row.try_get("password").map_err(|_| AppError::MissingData("password".to_string()))?,
        phone: row.try_get("phone").map_err(|_| AppError::MissingData("phone".to_string()))?,
        address: row.try_get("address").map_err(|_| AppError::MissingData("address".to_string()))?,
        role: row.try_get("role").map_err(|_| AppError::MissingData("role".to_string()))?,
        login_attempts: row.try_get("login_attempts").map_err(|_| AppError::MissingData("login_attempts".to_string()))?,
        account_locked_until: row.try_get("account_locked_until").map_err(|_| AppError::MissingData("account_locked_until".to_string()))?,
        otp_code: row.try_get("otp_code").map_err(|_| AppError::MissingData("otp_code".to_string()))?,
        otp_expires_at: row.try_get("otp_expires_at").map_err(|_| AppError::MissingData("otp_expires_at".to_string()))?,
        password_changed_at: row.try_get("password_changed_at").map_err(|_| AppError::MissingData("password_changed_at".to_string()))?,
        password_expires_at: row.try_get("password_expires_at").map_err(|_| AppError::MissingData("password_expires_at".to_string()))?,
        is_active: row.try_get("is_active").map_err(|_| AppError::MissingData("is_active".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

/// Reverses field encryption on a loaded user, the read half of the cipher
/// boundary. Decryption never fails the read.
fn decrypt_pii(cipher: &CipherService, mut user: User) -> User {
    user.email = cipher.decrypt_opt(user.email.take());
    user.phone = cipher.decrypt_opt(user.phone.take());
    user.address = cipher.decrypt_opt(user.address.take());
    user
}

/// Input for creating a user. PII arrives in plaintext and is encrypted
/// here, on the write path.
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub password_expires_at: DateTime<Utc>,
}

/// Creates a new user in the database.
pub async fn create_user(pool: &Pool, cipher: &CipherService, new_user: NewUser) -> Result<User> {
    let client = pool.get().await?;

    let email = cipher.encrypt_opt(new_user.email.as_deref())?;
    let phone = cipher.encrypt_opt(new_user.phone.as_deref())?;
    let address = cipher.encrypt_opt(new_user.address.as_deref())?;

    let id = Uuid::new_v4();
    let row = client
        .query_one(
            r#"
            INSERT INTO users (id, name, username, email, password, phone, address, role, password_changed_at, password_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), $9)
            RETURNING *
            "#,
            &[
                &id,
                &new_user.name,
                &new_user.username,
                &email,
                &new_user.password_hash,
                &phone,
                &address,
                &new_user.role,
                &new_user.password_expires_at,
            ],
        )
        .await?;
    Ok(decrypt_pii(cipher, row_to_user(&row)?))
}

/// Finds a user by their ID.
pub async fn find_by_id(pool: &Pool, cipher: &CipherService, user_id: &Uuid) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM users
            WHERE id = $1
            "#,
            &[user_id],
        )
        .await?;
    row.map(|r| row_to_user(&r).map(|u| decrypt_pii(cipher, u)))
        .transpose()
}

/// Finds a user by their username.
pub async fn find_by_username(
    pool: &Pool,
    cipher: &CipherService,
    username: &str,
) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM users
            WHERE username = $1
            "#,
            &[&username],
        )
        .await?;
    row.map(|r| row_to_user(&r).map(|u| decrypt_pii(cipher, u)))
        .transpose()
}

/// Checks whether a username is already taken.
pub async fn username_exists(pool: &Pool, username: &str) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT 1 FROM users WHERE username = $1",
            &[&username],
        )
        .await?;
    Ok(row.is_some())
}

/// Persists a failed password check: the new counter and, when the
/// threshold was hit, the lockout deadline.
pub async fn record_failed_attempt(
    pool: &Pool,
    user_id: Uuid,
    attempts: i32,
    locked_until: Option<DateTime<Utc>>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET login_attempts = $2, account_locked_until = $3, updated_at = NOW()
            WHERE id = $1
            "#,
            &[&user_id, &attempts, &locked_until],
        )
        .await?;
    Ok(())
}

/// Resets the attempt counter and clears any lockout. Used both when a
/// password check succeeds and when an elapsed lockout self-heals.
pub async fn reset_login_state(pool: &Pool, user_id: Uuid) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET login_attempts = 0, account_locked_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
            &[&user_id],
        )
        .await?;
    Ok(())
}

/// Stores a pending one-time code and its expiry.
pub async fn set_otp(
    pool: &Pool,
    user_id: Uuid,
    code: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET otp_code = $2, otp_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
            &[&user_id, &code, &expires_at],
        )
        .await?;
    Ok(())
}

/// Clears the pending one-time code. Codes are single use.
pub async fn clear_otp(pool: &Pool, user_id: Uuid) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET otp_code = NULL, otp_expires_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
            &[&user_id],
        )
        .await?;
    Ok(())
}

/// Updates a user's password and restarts its validity lifetime.
pub async fn update_password(
    pool: &Pool,
    user_id: Uuid,
    password_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET password = $2, password_changed_at = NOW(), password_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
            &[&user_id, &password_hash, &expires_at],
        )
        .await?;
    Ok(())
}

/// Profile fields a user may change about themselves. No id, no role: the
/// target row comes from the authenticated identity, never from the payload.
#[derive(Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Applies profile changes, encrypting incoming PII on the write path.
/// Absent fields are left untouched.
pub async fn update_profile(
    pool: &Pool,
    cipher: &CipherService,
    user_id: Uuid,
    changes: ProfileChanges,
) -> Result<User> {
    let client = pool.get().await?;

    let email = cipher.encrypt_opt(changes.email.as_deref())?;
    let phone = cipher.encrypt_opt(changes.phone.as_deref())?;
    let address = cipher.encrypt_opt(changes.address.as_deref())?;

    let row = client
        .query_one(
            r#"
            UPDATE users
            SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
            &[&user_id, &changes.name, &email, &phone, &address],
        )
        .await?;
    Ok(decrypt_pii(cipher, row_to_user(&row)?))
}

/// Sets a user's role. Privileged path, reachable only through the admin
/// surface.
pub async fn set_role(pool: &Pool, user_id: Uuid, role: Role) -> Result<bool> {
    let client = pool.get().await?;
    let updated = client
        .execute(
            r#"
            UPDATE users
            SET role = $2, updated_at = NOW()
            WHERE id = $1
            "#,
            &[&user_id, &role],
        )
        .await?;
    Ok(updated > 0)
}

/// Clears lockouts whose window has elapsed. Storage hygiene only; the
/// login path self-heals stale lockouts regardless.
pub async fn clear_elapsed_lockouts(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let cleared = client
        .execute(
            r#"
            UPDATE users
            SET login_attempts = 0, account_locked_until = NULL, updated_at = NOW()
            WHERE account_locked_until IS NOT NULL AND account_locked_until <= NOW()
            "#,
            &[],
        )
        .await?;
    Ok(cleared)
}
