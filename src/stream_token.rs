//! Viewer-scoped stream access tokens
//!
//! Issued when a playback URL is handed out and checked again when the
//! media edge opens the outbound leg. Verification is stateless: a token
//! stays usable until it expires.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use crate::config::StreamTokenConfig;
use crate::signer::{Signer, SignerError};

/// Query parameter carrying the token in playback URLs
pub const STREAM_TOKEN_QUERY_PARAM: &str = "stream_token";

/// `token_type` claim reserved for stream access
pub const STREAM_ACCESS_TOKEN_TYPE: &str = "stream_access";

#[derive(Debug, Error)]
pub enum StreamTokenError {
    #[error("failed to issue stream token: {0}")]
    Issue(#[source] SignerError),

    #[error("{0}")]
    Invalid(#[source] SignerError),

    #[error("token is expired")]
    Expired,

    #[error("unexpected token type: {0}")]
    WrongType(String),

    #[error("stream tokens are disabled")]
    Disabled,
}

/// Issues and verifies stream access tokens
pub trait StreamAccessToken: Send + Sync {
    fn issue(&self, identity: &str) -> Result<String, StreamTokenError>;

    fn verify(&self, raw: &str) -> Result<(), StreamTokenError>;
}

#[derive(Debug)]
pub struct SignedStreamToken {
    signer: Signer,
}

impl SignedStreamToken {
    pub fn new(config: &StreamTokenConfig) -> Result<Self, SignerError> {
        let signer = Signer::new(STREAM_ACCESS_TOKEN_TYPE, &config.jwt_signing)?;
        Ok(Self { signer })
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }
}

impl StreamAccessToken for SignedStreamToken {
    fn issue(&self, identity: &str) -> Result<String, StreamTokenError> {
        let token = self
            .signer
            .create(identity, "")
            .map_err(StreamTokenError::Issue)?;
        Ok(token.raw)
    }

    fn verify(&self, raw: &str) -> Result<(), StreamTokenError> {
        let token = self.signer.parse(raw).map_err(|e| match e {
            SignerError::Expired => StreamTokenError::Expired,
            other => StreamTokenError::Invalid(other),
        })?;

        if token.claims.token_type != STREAM_ACCESS_TOKEN_TYPE {
            return Err(StreamTokenError::WrongType(token.claims.token_type));
        }

        // Checked again on our own clock; `exp` marks the first instant the
        // token is no longer accepted.
        if Utc::now().timestamp_millis() >= token.claims.exp.saturating_mul(1000) {
            return Err(StreamTokenError::Expired);
        }

        Ok(())
    }
}

/// Stand-in used when stream tokens are switched off; refuses everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStreamToken;

impl StreamAccessToken for DisabledStreamToken {
    fn issue(&self, _identity: &str) -> Result<String, StreamTokenError> {
        Err(StreamTokenError::Disabled)
    }

    fn verify(&self, _raw: &str) -> Result<(), StreamTokenError> {
        Err(StreamTokenError::Disabled)
    }
}

/// Pick the signing or disabled implementation for this configuration
pub fn stream_token_from_config(
    config: &StreamTokenConfig,
) -> Result<Arc<dyn StreamAccessToken>, SignerError> {
    if !config.enabled {
        warn!("StreamToken is disabled, init noop");
        return Ok(Arc::new(DisabledStreamToken));
    }
    Ok(Arc::new(SignedStreamToken::new(config)?))
}
