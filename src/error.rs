//! Unified error type for the streamgate public API
//!
//! Each module keeps its own error type for precise handling. This type
//! gathers them for callers that wire the whole gate together, such as the
//! server front end.
//!
//! # Example
//!
//! ```no_run
//! use streamgate::{GateConfig, GateError, Services, StaticPlaybackUrl};
//! use std::sync::Arc;
//!
//! fn start(config: &GateConfig) -> Result<Services, GateError> {
//!     let source = Arc::new(StaticPlaybackUrl::new(config.playback.base_url.clone()));
//!     Services::from_config(config, source)
//! }
//! ```

use thiserror::Error;

/// Unified error type for all gate operations
///
/// # Error Categories
///
/// - **Config**: configuration file could not be read or parsed
/// - **Authorization**: request signature or freshness failures, or a missing
///   secret at construction
/// - **Signer**: signing key problems or token parsing failures
/// - **StreamToken**: stream token issuance or verification failures
/// - **Admission**: admission protocol violations
/// - **Playback**: playback URL issuance failures
/// - **Secrets**: secret documents that could not be loaded
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] crate::authorization::AuthorizationError),

    #[error("Signer error: {0}")]
    Signer(#[from] crate::signer::SignerError),

    #[error("Stream token error: {0}")]
    StreamToken(#[from] crate::stream_token::StreamTokenError),

    #[error("Admission error: {0}")]
    Admission(#[from] crate::admission::AdmissionError),

    #[error("Playback error: {0}")]
    Playback(#[from] crate::playback::PlaybackError),

    #[error("Secret lookup error: {0}")]
    Secrets(#[from] crate::secrets::SecretError),
}

impl GateError {
    /// Returns true if the error means the gate cannot start safely
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Config(_) | Self::Secrets(_) => true,
            Self::Authorization(e) => e.is_configuration(),
            Self::Signer(e) => e.is_configuration(),
            _ => false,
        }
    }

    /// Returns true if a caller or viewer was refused
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Authorization(e) => !e.is_configuration(),
            Self::StreamToken(_) => true,
            Self::Playback(e) => e.is_unauthorized(),
            _ => false,
        }
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        use crate::authorization::AuthorizationError;
        use crate::signer::SignerError;

        match self {
            Self::Authorization(AuthorizationError::MissingSecret) => Some(
                "set authorization.secret_key or AUTHORIZATION_SECRET_KEY, or disable authorization",
            ),
            Self::Authorization(AuthorizationError::Stale { .. }) => {
                Some("sign the request again with a current timestamp")
            }
            Self::Signer(SignerError::InvalidPrivateKey(_)) => Some(
                "provide a PKCS#8 PEM Ed25519 key in stream_token.jwt_signing.private_key or STREAM_TOKEN_PRIVATE_KEY",
            ),
            Self::Config(_) => Some("check the config file path and JSON syntax"),
            _ => None,
        }
    }
}
