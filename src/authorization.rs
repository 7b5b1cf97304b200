//! Request authorization with HMAC-SHA256 signatures
//!
//! Callers sign the canonical form of a request, `table_id|service_id|user_id`,
//! with a shared secret and send the base64 signature together with a
//! millisecond timestamp. The server recomputes the signature and compares
//! the two in constant time.
//!
//! The timestamp is not part of the signed string. Its freshness is checked
//! separately with [`check_freshness`] before the signature is looked at.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::config::AuthorizationConfig;

type HmacSha256 = Hmac<Sha256>;

/// Separator between canonical request fields
pub const CANONICAL_DELIMITER: char = '|';

/// Maximum age of an authorization timestamp
pub const FRESHNESS_WINDOW_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("invalid secret key")]
    MissingSecret,

    #[error("HMAC initialization failed")]
    InitFailed,

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("signature mismatch")]
    Mismatch,

    #[error("cannot verify the signature: authorization is disabled")]
    Disabled,

    #[error("requested authorization time is in the past (more than 5 minutes)")]
    Stale { timestamp_ms: i64 },
}

impl AuthorizationError {
    /// True for errors raised while building an authorizer
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingSecret | Self::InitFailed)
    }
}

/// Signature and timestamp sent by the caller with each request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEnvelope {
    /// Base64 HMAC-SHA256 of the canonical request string
    pub signature: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Build the canonical request string that gets signed
pub fn canonical_string(table_id: &str, service_id: &str, user_id: &str) -> String {
    format!(
        "{table_id}{d}{service_id}{d}{user_id}",
        d = CANONICAL_DELIMITER
    )
}

/// Reject timestamps older than [`FRESHNESS_WINDOW_MS`] relative to `now`
///
/// A timestamp exactly at the window edge is still accepted.
pub fn check_freshness(timestamp_ms: i64, now: DateTime<Utc>) -> Result<(), AuthorizationError> {
    let age = now.timestamp_millis().saturating_sub(timestamp_ms);
    if age > FRESHNESS_WINDOW_MS {
        return Err(AuthorizationError::Stale { timestamp_ms });
    }
    Ok(())
}

/// Signs and verifies canonical request strings
pub trait RequestAuthorizer: Send + Sync {
    fn sign(&self, canonical: &str) -> Result<String, AuthorizationError>;

    fn verify(&self, canonical: &str, incoming_signature: &str) -> Result<(), AuthorizationError>;
}

/// HMAC-SHA256 authorizer keyed with the shared secret
///
/// The secret is absorbed into the keyed MAC state at construction and the
/// caller's copy is not retained.
#[derive(Clone)]
pub struct HmacAuthorizer {
    mac: HmacSha256,
}

impl HmacAuthorizer {
    pub fn new(secret_key: &[u8]) -> Result<Self, AuthorizationError> {
        if secret_key.is_empty() {
            return Err(AuthorizationError::MissingSecret);
        }
        let mac =
            HmacSha256::new_from_slice(secret_key).map_err(|_| AuthorizationError::InitFailed)?;
        Ok(Self { mac })
    }

    fn digest(&self, canonical: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(canonical.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for HmacAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacAuthorizer").finish_non_exhaustive()
    }
}

impl RequestAuthorizer for HmacAuthorizer {
    fn sign(&self, canonical: &str) -> Result<String, AuthorizationError> {
        Ok(BASE64.encode(self.digest(canonical)))
    }

    fn verify(&self, canonical: &str, incoming_signature: &str) -> Result<(), AuthorizationError> {
        let expected = BASE64.decode(self.sign(canonical)?)?;
        let incoming = BASE64.decode(incoming_signature)?;

        if expected.ct_eq(&incoming).into() {
            Ok(())
        } else {
            Err(AuthorizationError::Mismatch)
        }
    }
}

/// Stand-in used when authorization is switched off; refuses everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAuthorizer;

impl RequestAuthorizer for DisabledAuthorizer {
    fn sign(&self, _canonical: &str) -> Result<String, AuthorizationError> {
        Err(AuthorizationError::Disabled)
    }

    fn verify(&self, _canonical: &str, _incoming_signature: &str) -> Result<(), AuthorizationError> {
        Err(AuthorizationError::Disabled)
    }
}

/// Pick the active or disabled authorizer for this configuration
pub fn authorizer_from_config(
    config: &AuthorizationConfig,
) -> Result<Arc<dyn RequestAuthorizer>, AuthorizationError> {
    if !config.enabled {
        warn!("Authorization disabled, init noop");
        return Ok(Arc::new(DisabledAuthorizer));
    }
    Ok(Arc::new(HmacAuthorizer::new(config.secret_key.as_bytes())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &[u8] = b"test-secret-key";

    fn canonical() -> String {
        canonical_string("table1", "service1", "user1")
    }

    #[test]
    fn test_canonical_string() {
        assert_eq!(canonical(), "table1|service1|user1");
        assert_eq!(canonical_string("", "", ""), "||");
        assert_ne!(
            canonical_string("a", "b", "c"),
            canonical_string("b", "a", "c")
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        let signature = auth.sign(&canonical()).unwrap();
        assert!(!signature.is_empty());
        assert_eq!(BASE64.decode(&signature).unwrap().len(), 32);
        assert!(auth.verify(&canonical(), &signature).is_ok());
    }

    #[test]
    fn test_sign_is_deterministic() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        let other = HmacAuthorizer::new(SECRET).unwrap();
        let first = auth.sign(&canonical()).unwrap();
        assert_eq!(first, auth.sign(&canonical()).unwrap());
        assert_eq!(first, other.sign(&canonical()).unwrap());
    }

    #[test]
    fn test_different_secret_mismatch() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        let other = HmacAuthorizer::new(b"another-secret").unwrap();
        let signature = other.sign(&canonical()).unwrap();
        assert!(matches!(
            auth.verify(&canonical(), &signature),
            Err(AuthorizationError::Mismatch)
        ));
    }

    #[test]
    fn test_verify_rejects_invalid_base64() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        assert!(matches!(
            auth.verify(&canonical(), "invalid-signature"),
            Err(AuthorizationError::Decode(_))
        ));
    }

    #[test]
    fn test_verify_rejects_every_flipped_byte() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        let signature = auth.sign(&canonical()).unwrap();
        let bytes = BASE64.decode(&signature).unwrap();

        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let result = auth.verify(&canonical(), &BASE64.encode(&tampered));
            assert!(
                matches!(result, Err(AuthorizationError::Mismatch)),
                "flipped byte {} was accepted",
                i
            );
        }
    }

    #[test]
    fn test_verify_rejects_truncated_signature() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        let signature = auth.sign(&canonical()).unwrap();
        let bytes = BASE64.decode(&signature).unwrap();
        let truncated = BASE64.encode(&bytes[..16]);
        assert!(auth.verify(&canonical(), &truncated).is_err());
    }

    #[test]
    fn test_verify_rejects_other_canonical() {
        let auth = HmacAuthorizer::new(SECRET).unwrap();
        let signature = auth.sign(&canonical()).unwrap();
        let other = canonical_string("table1", "service1", "user2");
        assert!(auth.verify(&other, &signature).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = HmacAuthorizer::new(b"").unwrap_err();
        assert!(matches!(err, AuthorizationError::MissingSecret));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_config_enabled_without_secret_fails() {
        let config = AuthorizationConfig {
            enabled: true,
            secret_key: String::new(),
        };
        assert!(authorizer_from_config(&config).is_err());
    }

    #[test]
    fn test_disabled_fails_closed() {
        let config = AuthorizationConfig {
            enabled: false,
            secret_key: String::new(),
        };
        let auth = authorizer_from_config(&config).unwrap();
        assert!(matches!(
            auth.sign(&canonical()),
            Err(AuthorizationError::Disabled)
        ));
        assert!(matches!(
            auth.verify(&canonical(), "anything"),
            Err(AuthorizationError::Disabled)
        ));
        assert!(matches!(
            auth.verify(&canonical(), ""),
            Err(AuthorizationError::Disabled)
        ));
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let window = Duration::milliseconds(FRESHNESS_WINDOW_MS);

        let too_old = now - window - Duration::milliseconds(1);
        assert!(matches!(
            check_freshness(too_old.timestamp_millis(), now),
            Err(AuthorizationError::Stale { .. })
        ));

        let edge = now - window;
        assert!(check_freshness(edge.timestamp_millis(), now).is_ok());

        let recent = now - Duration::minutes(4) - Duration::seconds(59);
        assert!(check_freshness(recent.timestamp_millis(), now).is_ok());

        assert!(check_freshness(now.timestamp_millis(), now).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let auth = HmacAuthorizer::new(b"leaky-secret").unwrap();
        assert!(!format!("{:?}", auth).contains("leaky"));
    }
}
