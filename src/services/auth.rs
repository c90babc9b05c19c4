use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::crypto::jwt;
use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::models::user::{Role, User};
use crate::repositories::session as session_repo;
use crate::repositories::user as user_repo;
use crate::services::sessions;
use crate::state::AppState;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// Consecutive failed password checks that trigger a lockout.
pub const MAX_LOGIN_ATTEMPTS: i32 = 10;
/// How long a triggered lockout lasts.
pub const LOCKOUT_MINUTES: i64 = 10;
/// How long an issued one-time code is accepted.
pub const OTP_TTL_MINUTES: i64 = 10;
/// Password validity lifetime.
pub const PASSWORD_MAX_AGE_DAYS: i64 = 90;

/// Hashes a password using Argon2id.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing the hashed password.
fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Encryption(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Encryption(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Encryption(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    Ok(password_hash)
}

/// Verifies a password against a hash.
///
/// # Arguments
///
/// * `password` - The password to verify.
/// * `hash` - The hash to verify against.
///
/// # Returns
///
/// A `Result` containing `true` if the password is valid, `false` otherwise.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Encryption(format!("Hash parse error: {}", e)))?;
    let argon2 = Argon2::default();
    let result = argon2
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    Ok(result)
}

/// The lockout state of an account at the moment of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockoutStatus {
    /// Locked; refuse without consuming a password check.
    Locked { remaining_minutes: i64 },
    /// A lockout window elapsed; counters must be cleared before this
    /// attempt is evaluated.
    StaleCleared,
    /// Nothing in the way.
    Clear,
}

/// Evaluates the lockout state without touching storage.
pub fn check_lockout(user: &User, now: DateTime<Utc>) -> LockoutStatus {
    match user.account_locked_until {
        Some(until) if until > now => LockoutStatus::Locked {
            remaining_minutes: ((until - now).num_seconds() as u64).div_ceil(60) as i64,
        },
        Some(_) => LockoutStatus::StaleCleared,
        None => LockoutStatus::Clear,
    }
}

/// What a failed password check did to the account's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// The counter value to persist.
    pub attempts: i32,
    /// Whether this failure triggered a lockout.
    pub locked: bool,
    /// Attempts left before a lockout triggers.
    pub remaining_attempts: i32,
    /// The lockout deadline to persist, when triggered.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Registers one failed password check against the prior counter.
pub fn register_failure(prior_attempts: i32, now: DateTime<Utc>) -> AttemptOutcome {
    let attempts = prior_attempts + 1;
    if attempts >= MAX_LOGIN_ATTEMPTS {
        AttemptOutcome {
            attempts,
            locked: true,
            remaining_attempts: 0,
            locked_until: Some(now + Duration::minutes(LOCKOUT_MINUTES)),
        }
    } else {
        AttemptOutcome {
            attempts,
            locked: false,
            remaining_attempts: MAX_LOGIN_ATTEMPTS - attempts,
            locked_until: None,
        }
    }
}

/// The outcome of checking a supplied one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Expired,
    Mismatch,
    NotIssued,
}

/// Checks a supplied one-time code against the pending one.
pub fn check_otp(user: &User, supplied: &str, now: DateTime<Utc>) -> OtpCheck {
    let (Some(code), Some(expires_at)) = (user.otp_code.as_deref(), user.otp_expires_at) else {
        return OtpCheck::NotIssued;
    };
    if expires_at <= now {
        return OtpCheck::Expired;
    }
    if bool::from(code.as_bytes().ct_eq(supplied.as_bytes())) {
        OtpCheck::Valid
    } else {
        OtpCheck::Mismatch
    }
}

/// Generates a 6-digit one-time code.
fn generate_otp() -> String {
    format!("{}", OsRng.gen_range(100_000..=999_999))
}

/// Input for registration.
pub struct RegisterInput {
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Creates a new user.
///
/// Every registration gets the `user` role; roles are only ever changed
/// through the admin path.
pub async fn create_user(state: &AppState, input: RegisterInput) -> Result<User> {
    tracing::debug!("🔐 Creating user: {}", input.username);

    if user_repo::username_exists(&state.db, &input.username).await? {
        return Err(AppError::Validation("Username is already taken".to_string()));
    }

    let hashed_password = hash_password(&input.password)?;

    let user = user_repo::create_user(
        &state.db,
        &state.cipher,
        user_repo::NewUser {
            name: input.name,
            username: input.username,
            email: input.email,
            password_hash: hashed_password,
            phone: input.phone,
            address: input.address,
            role: Role::User,
            password_expires_at: Utc::now() + Duration::days(PASSWORD_MAX_AGE_DAYS),
        },
    )
    .await?;

    tracing::info!("✅ User created with ID: {}", user.id);
    Ok(user)
}

/// What a successful password check leads to.
pub enum LoginOutcome {
    /// Admins skip the second factor and get a session immediately.
    Session { token: String },
    /// Everyone else completes login with a one-time code.
    OtpChallenge {
        /// Echo of the code, only populated in dev mode.
        otp: Option<String>,
        expires_at: DateTime<Utc>,
    },
}

/// Authenticates a user and either issues a session or starts the OTP
/// challenge.
pub async fn login(
    state: &AppState,
    username: &str,
    password: &str,
    device: Option<String>,
    ip_address: Option<String>,
) -> Result<LoginOutcome> {
    tracing::debug!("🔐 Authenticating user: {}", username);
    let now = Utc::now();

    let mut user = user_repo::find_by_username(&state.db, &state.cipher, username)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

    match check_lockout(&user, now) {
        LockoutStatus::Locked { remaining_minutes } => {
            return Err(AppError::Lockout {
                minutes: remaining_minutes,
            });
        }
        LockoutStatus::StaleCleared => {
            user_repo::reset_login_state(&state.db, user.id).await?;
            user.login_attempts = 0;
            user.account_locked_until = None;
        }
        LockoutStatus::Clear => {}
    }

    if !verify_password(password, &user.password)? {
        let outcome = register_failure(user.login_attempts, now);
        user_repo::record_failed_attempt(&state.db, user.id, outcome.attempts, outcome.locked_until)
            .await?;

        if outcome.locked {
            tracing::warn!("🔒 Account locked after {} failed attempts: {}", outcome.attempts, user.id);
            return Err(AppError::Lockout {
                minutes: LOCKOUT_MINUTES,
            });
        }
        return Err(AppError::Authentication(format!(
            "Invalid username or password. {} attempts remaining",
            outcome.remaining_attempts
        )));
    }

    if user.password_expires_at.is_some_and(|exp| exp <= now) {
        return Err(AppError::PasswordExpired);
    }

    user_repo::reset_login_state(&state.db, user.id).await?;
    tracing::info!("✅ Password verified for user: {}", user.id);

    if user.role == Role::Admin {
        let (token, _session) = issue_session(state, &user, device, ip_address).await?;
        tracing::info!("✅ Admin session issued for user: {}", user.id);
        return Ok(LoginOutcome::Session { token });
    }

    let code = generate_otp();
    let expires_at = now + Duration::minutes(OTP_TTL_MINUTES);
    user_repo::set_otp(&state.db, user.id, &code, expires_at).await?;

    state
        .mailer
        .send_otp(user.email.as_deref(), &user.username, &code)
        .await;

    let otp = state.config.otp_dev_return.then(|| code);
    tracing::info!("✅ OTP challenge issued for user: {}", user.id);

    Ok(LoginOutcome::OtpChallenge { otp, expires_at })
}

/// Completes a pending OTP challenge and issues a session.
pub async fn verify_otp(
    state: &AppState,
    username: &str,
    code: &str,
    device: Option<String>,
    ip_address: Option<String>,
) -> Result<String> {
    let user = user_repo::find_by_username(&state.db, &state.cipher, username)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Authentication("Invalid username or code".to_string()))?;

    match check_otp(&user, code, Utc::now()) {
        OtpCheck::Valid => {
            user_repo::clear_otp(&state.db, user.id).await?;
            let (token, _session) = issue_session(state, &user, device, ip_address).await?;
            tracing::info!("✅ OTP verified, session issued for user: {}", user.id);
            Ok(token)
        }
        OtpCheck::Expired => {
            user_repo::clear_otp(&state.db, user.id).await?;
            tracing::warn!("⏰ Expired OTP presented for user: {}", user.id);
            Err(AppError::Authentication(
                "OTP expired, please log in again".to_string(),
            ))
        }
        OtpCheck::Mismatch => Err(AppError::Authentication(
            "Invalid verification code".to_string(),
        )),
        OtpCheck::NotIssued => Err(AppError::Authentication(
            "No pending verification for this account".to_string(),
        )),
    }
}

/// Signs a bearer token and creates the session record backing it.
pub async fn issue_session(
    state: &AppState,
    user: &User,
    device: Option<String>,
    ip_address: Option<String>,
) -> Result<(String, Session)> {
    let token = jwt::issue_token(user.id, &user.username, &state.config.jwt_secret)?;
    let now = Utc::now();

    let session = session_repo::create(
        &state.db,
        session_repo::NewSession {
            user_id: user.id,
            token_hash: sessions::token_hash(&token),
            device,
            ip_address,
            last_activity: now,
            expires_at: Session::next_expiry(now),
        },
    )
    .await?;

    Ok((token, session))
}

/// Changes a user's password after re-verifying the current one.
pub async fn change_password(
    state: &AppState,
    user: &User,
    old_password: &str,
    new_password: &str,
) -> Result<()> {
    tracing::info!("🔑 Changing password for user: {}", user.id);

    if !verify_password(old_password, &user.password)? {
        return Err(AppError::Authentication(
            "Invalid current password".to_string(),
        ));
    }

    let new_hash = hash_password(new_password)?;
    user_repo::update_password(
        &state.db,
        user.id,
        &new_hash,
        Utc::now() + Duration::days(PASSWORD_MAX_AGE_DAYS),
    )
    .await?;

    tracing::info!("✅ Password changed for user: {}", user.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_fixture(now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Priya Sharma".to_string(),
            username: "priya".to_string(),
            email: Some("priya@example.com".to_string()),
            password: "$argon2id$unused".to_string(),
            phone: None,
            address: None,
            role: Role::User,
            login_attempts: 0,
            account_locked_until: None,
            otp_code: None,
            otp_expires_at: None,
            password_changed_at: now,
            password_expires_at: Some(now + Duration::days(PASSWORD_MAX_AGE_DAYS)),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("incorrect horse", &hash).unwrap());
    }

    #[test]
    fn nine_failures_leave_one_attempt() {
        let now = Utc::now();
        let mut outcome = register_failure(0, now);
        for _ in 1..9 {
            outcome = register_failure(outcome.attempts, now);
        }
        assert_eq!(outcome.attempts, 9);
        assert!(!outcome.locked);
        assert_eq!(outcome.remaining_attempts, 1);
        assert_eq!(outcome.locked_until, None);
    }

    #[test]
    fn tenth_failure_locks_for_ten_minutes() {
        let now = Utc::now();
        let outcome = register_failure(9, now);
        assert!(outcome.locked);
        assert_eq!(outcome.remaining_attempts, 0);
        assert_eq!(outcome.locked_until, Some(now + Duration::minutes(LOCKOUT_MINUTES)));
    }

    #[test]
    fn active_lockout_refuses_with_countdown() {
        let now = Utc::now();
        let mut user = user_fixture(now);
        user.login_attempts = MAX_LOGIN_ATTEMPTS;
        user.account_locked_until = Some(now + Duration::minutes(7));

        match check_lockout(&user, now) {
            LockoutStatus::Locked { remaining_minutes } => assert_eq!(remaining_minutes, 7),
            other => panic!("expected Locked, got {:?}", other),
        }
    }

    #[test]
    fn elapsed_lockout_self_heals() {
        let now = Utc::now();
        let mut user = user_fixture(now);
        user.login_attempts = MAX_LOGIN_ATTEMPTS;
        user.account_locked_until = Some(now - Duration::seconds(1));

        assert_eq!(check_lockout(&user, now), LockoutStatus::StaleCleared);
        // A fresh failure after the heal counts from zero again.
        let outcome = register_failure(0, now);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.locked);
    }

    #[test]
    fn unlocked_account_is_clear() {
        let now = Utc::now();
        assert_eq!(check_lockout(&user_fixture(now), now), LockoutStatus::Clear);
    }

    #[test]
    fn otp_happy_path_and_expiry() {
        let now = Utc::now();
        let mut user = user_fixture(now);
        user.otp_code = Some("429871".to_string());
        user.otp_expires_at = Some(now + Duration::minutes(OTP_TTL_MINUTES));

        assert_eq!(check_otp(&user, "429871", now), OtpCheck::Valid);
        assert_eq!(check_otp(&user, "429872", now), OtpCheck::Mismatch);
        assert_eq!(
            check_otp(&user, "429871", now + Duration::minutes(11)),
            OtpCheck::Expired
        );
    }

    #[test]
    fn otp_without_challenge_is_not_issued() {
        let now = Utc::now();
        assert_eq!(check_otp(&user_fixture(now), "123456", now), OtpCheck::NotIssued);
    }

    #[test]
    fn generated_otp_is_six_digits() {
        for _ in 0..32 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
