use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Nominal bearer-token lifetime in days. The session registry is the real
/// timeout authority; this only bounds how long a token can name an identity.
const TOKEN_TTL_DAYS: i64 = 7;

/// JWT claims carried by issued bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Username the token was issued to.
    pub username: String,
    /// Issued-at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl Claims {
    /// Parses the subject claim back into a user ID.
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::InvalidToken("malformed subject claim".to_string()))
    }
}

/// Signs a new bearer token for a user.
///
/// # Arguments
///
/// * `user_id` - The identity the token asserts.
/// * `username` - The username embedded in the claims.
/// * `secret` - The server signing secret.
///
/// # Returns
///
/// A `Result` containing the encoded token.
pub fn issue_token(user_id: Uuid, username: &str, secret: &str) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))
}

/// Verifies a bearer token's signature and expiry claim and decodes it.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-signing-secret-0123456789abcdef";

    #[test]
    fn issue_and_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, "ravi", SECRET).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.username, "ravi");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = issue_token(Uuid::new_v4(), "ravi", SECRET).unwrap();
        assert!(matches!(
            verify_token(&token, "another-secret-another-secret-here"),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            verify_token("not.a.token", SECRET),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_claim_is_rejected_distinctly() {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            username: "ravi".to_string(),
            iat: (now - Duration::days(8)).timestamp(),
            exp: (now - Duration::days(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            verify_token(&token, SECRET),
            Err(AppError::TokenExpired)
        ));
    }
}
