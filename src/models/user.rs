use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role a user acts as.
///
/// Authorization-relevant; a principal can never set its own role. The only
/// write path is the admin role endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "user_role")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[postgres(name = "user")]
    User,
    #[postgres(name = "restaurant")]
    Restaurant,
    #[postgres(name = "admin")]
    Admin,
}

impl Role {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Restaurant => "restaurant",
            Role::Admin => "admin",
        }
    }
}

/// Represents a user in the system.
///
/// PII fields (`email`, `phone`, `address`) carry plaintext in memory; the
/// repository layer encrypts them before persisting and decrypts them after
/// loading, so nothing above the repository ever sees ciphertext.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's full name.
    pub name: String,
    /// The user's username.
    pub username: String,
    /// The user's email address.
    pub email: Option<String>,
    /// The user's hashed password.
    pub password: String,
    /// The user's phone number.
    pub phone: Option<String>,
    /// The user's delivery address.
    pub address: Option<String>,
    /// The user's role.
    pub role: Role,
    /// Consecutive failed password checks since the last success.
    pub login_attempts: i32,
    /// When set and in the future, authentication is refused outright.
    pub account_locked_until: Option<DateTime<Utc>>,
    /// Pending one-time code for second-factor login completion.
    pub otp_code: Option<String>,
    /// When the pending one-time code stops being accepted.
    pub otp_expires_at: Option<DateTime<Utc>>,
    /// The timestamp of the user's last password change.
    pub password_changed_at: DateTime<Utc>,
    /// When the current password stops being accepted for login.
    pub password_expires_at: Option<DateTime<Utc>>,
    /// Whether the user is active.
    pub is_active: bool,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Safe user representation for API responses (no password hash, no
/// lockout or OTP bookkeeping).
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            address: user.address.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}
