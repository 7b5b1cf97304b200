//! EdDSA-signed identity tokens
//!
//! A [`Signer`] owns one Ed25519 key pair, loaded once from a PKCS#8 PEM
//! private key. Tokens are compact JWTs carrying the standard registered
//! claims plus a `token_type` tag naming what the token is for.

use std::fmt;

use chrono::{Duration, Utc};
use ed25519_dalek::pkcs8::KeypairBytes;
use ed25519_dalek::SigningKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::JwtSigningConfig;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid token expiry: {0} ms")]
    InvalidExpiry(u64),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token is expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,
}

impl SignerError {
    /// True for errors raised while loading key material or settings
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidPrivateKey(_) | Self::InvalidExpiry(_))
    }
}

impl From<jsonwebtoken::errors::Error> for SignerError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => SignerError::SignatureInvalid,
            ErrorKind::ExpiredSignature => SignerError::Expired,
            ErrorKind::ImmatureSignature => SignerError::NotYetValid,
            _ => SignerError::Malformed(e.to_string()),
        }
    }
}

/// Claims carried by every issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Unique token identifier
    pub jti: String,
    /// Identity the token was issued to
    pub sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub token_type: String,
}

/// A signed token and its decoded claims
#[derive(Debug, Clone)]
pub struct Token {
    pub claims: Claims,
    pub raw: String,
}

/// Issues and parses EdDSA tokens for one token type
pub struct Signer {
    token_type: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Duration,
    issuer: String,
    default_audience: String,
}

impl Signer {
    pub fn new(token_type: &str, config: &JwtSigningConfig) -> Result<Self, SignerError> {
        let signing_key = SigningKey::from_pkcs8_pem(&config.private_key)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;

        // Re-encode as PKCS#8 v1 so the JWT backend gets a single layout
        // regardless of whether the PEM carried the public key.
        let der = KeypairBytes {
            secret_key: signing_key.to_bytes(),
            public_key: None,
        }
        .to_pkcs8_der()
        .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());
        let decoding_key = DecodingKey::from_ed_der(signing_key.verifying_key().as_bytes());

        let expiry_ms = i64::try_from(config.expires_time_ms)
            .map_err(|_| SignerError::InvalidExpiry(config.expires_time_ms))?;
        let expiry = Duration::try_milliseconds(expiry_ms)
            .filter(|expiry| Utc::now().checked_add_signed(*expiry).is_some())
            .ok_or(SignerError::InvalidExpiry(config.expires_time_ms))?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Ok(Self {
            token_type: token_type.to_string(),
            encoding_key,
            decoding_key,
            validation,
            expiry,
            issuer: config.issuer.clone(),
            default_audience: config.default_audience.clone(),
        })
    }

    /// Issue a token for `identity`; an empty `audience` falls back to the
    /// configured default.
    pub fn create(&self, identity: &str, audience: &str) -> Result<Token, SignerError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.expiry)
            .ok_or_else(|| SignerError::Signing("token expiry out of range".to_string()))?;
        let audience = if audience.is_empty() {
            self.default_audience.clone()
        } else {
            audience.to_string()
        };

        let claims = Claims {
            jti: Uuid::new_v4().to_string(),
            sub: identity.to_string(),
            aud: audience,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            token_type: self.token_type.clone(),
        };

        let header = Header::new(Algorithm::EdDSA);
        let raw = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        Ok(Token { claims, raw })
    }

    /// Verify the signature and validity window of `raw`
    pub fn parse(&self, raw: &str) -> Result<Token, SignerError> {
        let data = jsonwebtoken::decode::<Claims>(raw, &self.decoding_key, &self.validation)?;
        Ok(Token {
            claims: data.claims,
            raw: raw.to_string(),
        })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .field("issuer", &self.issuer)
            .field("default_audience", &self.default_audience)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh Ed25519 private key as PKCS#8 PEM
pub fn generate_private_key_pem() -> Result<Zeroizing<String>, SignerError> {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeypairBytes {
        secret_key: signing_key.to_bytes(),
        public_key: None,
    }
    .to_pkcs8_pem(LineEnding::LF)
    .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))
}
