use aes_gcm::{
    aead::{generic_array::typenum::U16, Aead, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::Config;
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the field-envelope initialization vector in bytes.
pub const IV_SIZE: usize = 16;
/// The size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Fixed key-derivation salt. The configured secret is the entropy source;
/// the salt only domain-separates this key from other uses of the secret.
const KEY_DERIVATION_SALT: &[u8; 16] = b"tiffin/field-key";

/// AES-256-GCM parameterized with the 16-byte IV the stored envelope carries.
type FieldGcm = AesGcm<Aes256, U16>;

/// The persisted shape of an encrypted field value.
///
/// Any stored string that does not parse as this shape is treated as legacy
/// plaintext and passed through unchanged on read.
#[derive(Debug, Serialize, Deserialize)]
struct FieldEnvelope {
    /// Hex-encoded ciphertext.
    encrypted: String,
    /// Hex-encoded 16-byte initialization vector.
    iv: String,
    /// Hex-encoded 16-byte GCM authentication tag.
    #[serde(rename = "authTag")]
    auth_tag: String,
}

/// How a decryption attempt failed, for routing the fallback.
enum DecryptFailure {
    /// The stored value is not an envelope at all (legacy plaintext).
    NotEnvelope,
    /// The value looked like an envelope but would not decrypt
    /// (bad hex, wrong key, tampered tag).
    Failed,
}

/// Reversible field encryption for PII at rest.
///
/// Holds its derived key as a field; constructed once at process start and
/// shared read-only through `AppState`. Encryption is applied on the
/// repository write path and reversed on the read path, so business logic
/// only ever sees plaintext.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherService {
    key: [u8; KEY_SIZE],
    #[zeroize(skip)]
    enabled: bool,
    #[zeroize(skip)]
    strict: bool,
}

impl CipherService {
    /// Creates a `CipherService` from the application configuration,
    /// deriving the AES-256 key from the configured secret.
    pub fn new(config: &Config) -> Result<Self> {
        Self::derive(
            &config.field_key_secret,
            config.field_encryption_enabled,
            config.field_decrypt_strict,
        )
    }

    fn derive(secret: &str, enabled: bool, strict: bool) -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), KEY_DERIVATION_SALT, &mut key)
            .map_err(|e| AppError::Encryption(format!("Argon2 key derivation error: {}", e)))?;
        Ok(Self { key, enabled, strict })
    }

    /// Encrypts a plaintext field value into its storage envelope.
    ///
    /// # Arguments
    ///
    /// * `plaintext` - The value to encrypt.
    ///
    /// # Returns
    ///
    /// A `Result` containing the serialized envelope. When field encryption
    /// is disabled the plaintext is returned unmodified.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if !self.enabled {
            return Ok(plaintext.to_string());
        }

        let cipher = FieldGcm::new((&self.key).into());

        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::<U16>::from(iv);

        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Encryption(format!("Field encryption failed: {}", e)))?;

        // The AEAD output carries the tag in its trailing bytes; the envelope
        // stores ciphertext and tag separately.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let envelope = FieldEnvelope {
            encrypted: hex::encode(ciphertext),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        };

        sonic_rs::to_string(&envelope)
            .map_err(|e| AppError::Encryption(format!("Envelope serialization failed: {}", e)))
    }

    /// Encrypts an optional field value; `None` passes through untouched.
    pub fn encrypt_opt(&self, value: Option<&str>) -> Result<Option<String>> {
        value.map(|v| self.encrypt(v)).transpose()
    }

    /// Decrypts a stored field value.
    ///
    /// Never fails the read: a value that is not an envelope is legacy
    /// plaintext and comes back unchanged, and a tampered or wrong-key
    /// envelope also comes back unchanged unless strict mode suppresses it.
    pub fn decrypt(&self, stored: &str) -> Option<String> {
        if !self.enabled {
            return Some(stored.to_string());
        }

        match self.try_decrypt(stored) {
            Ok(plaintext) => Some(plaintext),
            Err(DecryptFailure::NotEnvelope) => Some(stored.to_string()),
            Err(DecryptFailure::Failed) => {
                if self.strict {
                    tracing::warn!("Undecryptable field suppressed (strict mode)");
                    None
                } else {
                    tracing::warn!("Field decryption failed, returning stored value unchanged");
                    Some(stored.to_string())
                }
            }
        }
    }

    /// Decrypts an optional stored value; `None` passes through untouched.
    pub fn decrypt_opt(&self, stored: Option<String>) -> Option<String> {
        stored.and_then(|v| self.decrypt(&v))
    }

    fn try_decrypt(&self, stored: &str) -> std::result::Result<String, DecryptFailure> {
        let envelope: FieldEnvelope =
            sonic_rs::from_str(stored).map_err(|_| DecryptFailure::NotEnvelope)?;

        let iv_bytes = hex::decode(&envelope.iv).map_err(|_| DecryptFailure::Failed)?;
        let iv: [u8; IV_SIZE] = iv_bytes.try_into().map_err(|_| DecryptFailure::Failed)?;
        let ciphertext = hex::decode(&envelope.encrypted).map_err(|_| DecryptFailure::Failed)?;
        let tag = hex::decode(&envelope.auth_tag).map_err(|_| DecryptFailure::Failed)?;
        if tag.len() != TAG_SIZE {
            return Err(DecryptFailure::Failed);
        }

        let cipher = FieldGcm::new((&self.key).into());
        let nonce = Nonce::<U16>::from(iv);

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(&nonce, sealed.as_slice())
            .map_err(|_| DecryptFailure::Failed)?;

        String::from_utf8(plaintext).map_err(|_| DecryptFailure::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CipherService {
        CipherService::derive("a-test-secret-with-enough-entropy!!", true, false).unwrap()
    }

    #[test]
    fn round_trip_ascii() {
        let c = cipher();
        let sealed = c.encrypt("alice@example.com").unwrap();
        assert_ne!(sealed, "alice@example.com");
        assert_eq!(c.decrypt(&sealed), Some("alice@example.com".to_string()));
    }

    #[test]
    fn round_trip_multibyte() {
        let c = cipher();
        for s in ["東京都渋谷区1-2-3", "café ☕ straße", "+91-98765-43210"] {
            let sealed = c.encrypt(s).unwrap();
            assert_eq!(c.decrypt(&sealed), Some(s.to_string()));
        }
    }

    #[test]
    fn round_trip_empty_string() {
        let c = cipher();
        let sealed = c.encrypt("").unwrap();
        assert_eq!(c.decrypt(&sealed), Some(String::new()));
    }

    #[test]
    fn envelope_shape() {
        let c = cipher();
        let sealed = c.encrypt("secret").unwrap();
        let envelope: FieldEnvelope = sonic_rs::from_str(&sealed).unwrap();
        assert_eq!(hex::decode(&envelope.iv).unwrap().len(), IV_SIZE);
        assert_eq!(hex::decode(&envelope.auth_tag).unwrap().len(), TAG_SIZE);
    }

    #[test]
    fn fresh_iv_per_call() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn none_passes_through() {
        let c = cipher();
        assert_eq!(c.encrypt_opt(None).unwrap(), None);
        assert_eq!(c.decrypt_opt(None), None);
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        let c = cipher();
        assert_eq!(c.decrypt("not json"), Some("not json".to_string()));
        assert_eq!(
            c.decrypt("plain.old@email.com"),
            Some("plain.old@email.com".to_string())
        );
    }

    #[test]
    fn malformed_envelope_passes_through() {
        let c = cipher();
        let malformed = r#"{"encrypted":"zz-not-hex","iv":"00","authTag":""}"#;
        assert_eq!(c.decrypt(malformed), Some(malformed.to_string()));
    }

    #[test]
    fn tampered_tag_fails_open() {
        let c = cipher();
        let sealed = c.encrypt("secret value").unwrap();
        let mut envelope: FieldEnvelope = sonic_rs::from_str(&sealed).unwrap();
        let mut tag = hex::decode(&envelope.auth_tag).unwrap();
        tag[0] ^= 0xff;
        envelope.auth_tag = hex::encode(tag);
        let tampered = sonic_rs::to_string(&envelope).unwrap();
        assert_eq!(c.decrypt(&tampered), Some(tampered.clone()));
    }

    #[test]
    fn wrong_key_fails_open() {
        let sealed = cipher().encrypt("secret value").unwrap();
        let other = CipherService::derive("a-different-secret-entirely-here!!!", true, false).unwrap();
        assert_eq!(other.decrypt(&sealed), Some(sealed.clone()));
    }

    #[test]
    fn strict_mode_suppresses_undecryptable() {
        let sealed = cipher().encrypt("secret value").unwrap();
        let strict = CipherService::derive("a-different-secret-entirely-here!!!", true, true).unwrap();
        assert_eq!(strict.decrypt(&sealed), None);
        // Legacy plaintext still reads through even in strict mode.
        assert_eq!(strict.decrypt("plain"), Some("plain".to_string()));
    }

    #[test]
    fn disabled_flag_passes_through_both_ways() {
        let off = CipherService::derive("a-test-secret-with-enough-entropy!!", false, false).unwrap();
        assert_eq!(off.encrypt("value").unwrap(), "value");
        assert_eq!(off.decrypt("value"), Some("value".to_string()));
    }
}
