//! Gate configuration
//!
//! The configuration is plain JSON deserialized with `serde`. Secret
//! material (the HMAC secret and the PEM signing key) may be left empty in
//! the file and filled in afterwards from a [`SecretLookup`] chain.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroize;

use crate::secrets::SecretLookup;

/// Lookup key for the request-authorization secret
pub const AUTHORIZATION_SECRET_KEY: &str = "AUTHORIZATION_SECRET_KEY";

/// Lookup key for the PEM-encoded stream token signing key
pub const STREAM_TOKEN_PRIVATE_KEY: &str = "STREAM_TOKEN_PRIVATE_KEY";

/// Playback base URL used when no table catalog is wired in
pub const DEFAULT_PLAYBACK_URL: &str = "wss://localhost:3333/app/stream";

const DEFAULT_ISSUER: &str = "stream_management";
const DEFAULT_EXPIRES_TIME_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level configuration for every gate component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub authorization: AuthorizationConfig,
    pub stream_token: StreamTokenConfig,
    pub playback: PlaybackConfig,
}

impl GateConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Fill empty secret fields from the lookup chain.
    ///
    /// Values already present in the file win over the chain.
    pub fn resolve_secrets(&mut self, lookup: &dyn SecretLookup) {
        if self.authorization.secret_key.is_empty() {
            if let Some(secret) = lookup.resolve(AUTHORIZATION_SECRET_KEY) {
                debug!("authorization secret resolved from lookup chain");
                self.authorization.secret_key = secret;
            }
        }
        if self.stream_token.jwt_signing.private_key.is_empty() {
            if let Some(pem) = lookup.resolve(STREAM_TOKEN_PRIVATE_KEY) {
                debug!("stream token signing key resolved from lookup chain");
                self.stream_token.jwt_signing.private_key = pem;
            }
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_expires_time_ms() -> u64 {
    DEFAULT_EXPIRES_TIME_MS
}

/// Shared-secret request authorization settings
///
/// Defaults are per field: the secret is wiped on drop, so serde may not
/// move fields out of a default instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub secret_key: String,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            secret_key: String::new(),
        }
    }
}

impl fmt::Debug for AuthorizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationConfig")
            .field("enabled", &self.enabled)
            .field("secret_key", &redacted(&self.secret_key))
            .finish()
    }
}

impl Drop for AuthorizationConfig {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamTokenConfig {
    pub enabled: bool,
    pub jwt_signing: JwtSigningConfig,
}

impl Default for StreamTokenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_signing: JwtSigningConfig::default(),
        }
    }
}

/// EdDSA signing settings for issued tokens
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtSigningConfig {
    /// PKCS#8 PEM-encoded Ed25519 private key
    #[serde(default)]
    pub private_key: String,
    /// Token lifetime in milliseconds
    #[serde(default = "default_expires_time_ms")]
    pub expires_time_ms: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default)]
    pub default_audience: String,
}

impl Default for JwtSigningConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            expires_time_ms: default_expires_time_ms(),
            issuer: default_issuer(),
            default_audience: String::new(),
        }
    }
}

impl fmt::Debug for JwtSigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigningConfig")
            .field("private_key", &redacted(&self.private_key))
            .field("expires_time_ms", &self.expires_time_ms)
            .field("issuer", &self.issuer)
            .field("default_audience", &self.default_audience)
            .finish()
    }
}

impl Drop for JwtSigningConfig {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub base_url: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PLAYBACK_URL.to_string(),
        }
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
