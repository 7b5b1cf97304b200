//! Playback URL issuance
//!
//! Ties the request authorizer and stream tokens together: an authorized
//! caller gets back the table's playback URL with a freshly issued
//! `stream_token` appended.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::authorization::{
    canonical_string, check_freshness, AuthorizationEnvelope, AuthorizationError,
    RequestAuthorizer,
};
use crate::stream_token::{StreamAccessToken, StreamTokenError, STREAM_TOKEN_QUERY_PARAM};

pub const STATUS_OK: &str = "OK";

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error("failed to get playback url: {0}")]
    Source(String),

    #[error(transparent)]
    Token(#[from] StreamTokenError),

    #[error("invalid playback url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl PlaybackError {
    /// True when the caller failed authorization, as opposed to a server-side
    /// failure while building the URL
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Resolves the base playback URL for a table
pub trait PlaybackUrlSource: Send + Sync {
    fn playback_url(&self, table_id: &str) -> Result<String, PlaybackError>;
}

/// Serves one fixed base URL for every table
#[derive(Debug, Clone)]
pub struct StaticPlaybackUrl {
    base_url: String,
}

impl StaticPlaybackUrl {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl PlaybackUrlSource for StaticPlaybackUrl {
    fn playback_url(&self, _table_id: &str) -> Result<String, PlaybackError> {
        Ok(self.base_url.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub table_id: String,
    pub service_id: String,
    pub user_id: String,
    pub authorization: AuthorizationEnvelope,
}

impl PlaybackRequest {
    pub fn canonical(&self) -> String {
        canonical_string(&self.table_id, &self.service_id, &self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackUrl {
    pub url: String,
    pub stream_token: String,
}

pub struct PlaybackService {
    authorizer: Arc<dyn RequestAuthorizer>,
    stream_token: Arc<dyn StreamAccessToken>,
    source: Arc<dyn PlaybackUrlSource>,
}

impl PlaybackService {
    pub fn new(
        authorizer: Arc<dyn RequestAuthorizer>,
        stream_token: Arc<dyn StreamAccessToken>,
        source: Arc<dyn PlaybackUrlSource>,
    ) -> Self {
        Self {
            authorizer,
            stream_token,
            source,
        }
    }

    pub fn status(&self) -> &'static str {
        STATUS_OK
    }

    pub fn get_playback_url(&self, request: &PlaybackRequest) -> Result<PlaybackUrl, PlaybackError> {
        self.get_playback_url_at(request, Utc::now())
    }

    /// Same as [`get_playback_url`](Self::get_playback_url) with an explicit
    /// clock reading for the freshness check
    pub fn get_playback_url_at(
        &self,
        request: &PlaybackRequest,
        now: DateTime<Utc>,
    ) -> Result<PlaybackUrl, PlaybackError> {
        if let Err(e) = check_freshness(request.authorization.timestamp, now) {
            error!(
                table_id = %request.table_id,
                service_id = %request.service_id,
                user_id = %request.user_id,
                "authorization took too long to get playback url"
            );
            return Err(e.into());
        }

        if let Err(e) = self
            .authorizer
            .verify(&request.canonical(), &request.authorization.signature)
        {
            error!(
                table_id = %request.table_id,
                user_id = %request.user_id,
                error = %e,
                "failed to verify signature"
            );
            return Err(e.into());
        }

        let base_url = self.source.playback_url(&request.table_id)?;
        let stream_token = self.stream_token.issue(&request.user_id)?;
        let url = with_stream_token(&base_url, &stream_token)?;

        info!(
            table_id = %request.table_id,
            user_id = %request.user_id,
            "issued playback url"
        );
        Ok(PlaybackUrl {
            url: url.to_string(),
            stream_token,
        })
    }
}

/// Set `stream_token` on `base_url`, replacing any value already present
pub fn with_stream_token(base_url: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != STREAM_TOKEN_QUERY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(STREAM_TOKEN_QUERY_PARAM, token);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{DisabledAuthorizer, HmacAuthorizer};
    use crate::stream_token::DisabledStreamToken;
    use chrono::Duration;

    struct EchoToken;

    impl StreamAccessToken for EchoToken {
        fn issue(&self, identity: &str) -> Result<String, StreamTokenError> {
            Ok(format!("token-for-{identity}"))
        }

        fn verify(&self, _raw: &str) -> Result<(), StreamTokenError> {
            Ok(())
        }
    }

    struct FailingSource;

    impl PlaybackUrlSource for FailingSource {
        fn playback_url(&self, table_id: &str) -> Result<String, PlaybackError> {
            Err(PlaybackError::Source(format!("table {table_id} unknown")))
        }
    }

    const SECRET: &[u8] = b"playback-secret";

    fn signed_request(timestamp: i64) -> PlaybackRequest {
        let authorizer = HmacAuthorizer::new(SECRET).unwrap();
        let signature = authorizer
            .sign(&canonical_string("table1", "service1", "user1"))
            .unwrap();
        PlaybackRequest {
            table_id: "table1".to_string(),
            service_id: "service1".to_string(),
            user_id: "user1".to_string(),
            authorization: AuthorizationEnvelope {
                signature,
                timestamp,
            },
        }
    }

    fn service(source: Arc<dyn PlaybackUrlSource>) -> PlaybackService {
        PlaybackService::new(
            Arc::new(HmacAuthorizer::new(SECRET).unwrap()),
            Arc::new(EchoToken),
            source,
        )
    }

    #[test]
    fn test_with_stream_token() {
        let url = with_stream_token("wss://host/app/stream", "abc").unwrap();
        assert_eq!(url.as_str(), "wss://host/app/stream?stream_token=abc");

        let url = with_stream_token("wss://host/app/stream?q=1&stream_token=old", "new").unwrap();
        assert_eq!(url.as_str(), "wss://host/app/stream?q=1&stream_token=new");

        assert!(with_stream_token("", "abc").is_err());
    }

    #[test]
    fn test_happy_path() {
        let service = service(Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")));
        let now = Utc::now();
        let result = service
            .get_playback_url_at(&signed_request(now.timestamp_millis()), now)
            .unwrap();

        assert_eq!(result.stream_token, "token-for-user1");
        assert_eq!(
            result.url,
            "wss://origin/app/stream?stream_token=token-for-user1"
        );
    }

    #[test]
    fn test_stale_request_rejected_before_signature() {
        let service = PlaybackService::new(
            Arc::new(HmacAuthorizer::new(SECRET).unwrap()),
            Arc::new(EchoToken),
            Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")),
        );
        let now = Utc::now();
        let stale = now - Duration::minutes(5) - Duration::milliseconds(1);
        let mut request = signed_request(stale.timestamp_millis());
        request.authorization.signature = "garbage!".to_string();

        let err = service.get_playback_url_at(&request, now).unwrap_err();
        assert!(err.is_unauthorized());
        assert!(matches!(
            err,
            PlaybackError::Unauthorized(AuthorizationError::Stale { .. })
        ));
    }

    #[test]
    fn test_recent_request_accepted() {
        let service = service(Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")));
        let now = Utc::now();
        let recent = now - Duration::minutes(4) - Duration::seconds(59);
        assert!(service
            .get_playback_url_at(&signed_request(recent.timestamp_millis()), now)
            .is_ok());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let service = service(Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")));
        let now = Utc::now();
        let mut request = signed_request(now.timestamp_millis());
        request.user_id = "user2".to_string();

        let err = service.get_playback_url_at(&request, now).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Unauthorized(AuthorizationError::Mismatch)
        ));
        assert_eq!(err.to_string(), "signature mismatch");
    }

    #[test]
    fn test_source_failure_is_not_unauthorized() {
        let service = service(Arc::new(FailingSource));
        let now = Utc::now();
        let err = service
            .get_playback_url_at(&signed_request(now.timestamp_millis()), now)
            .unwrap_err();
        assert!(!err.is_unauthorized());
        assert!(matches!(err, PlaybackError::Source(_)));
    }

    #[test]
    fn test_disabled_components_fail_closed() {
        let now = Utc::now();
        let request = signed_request(now.timestamp_millis());

        let service = PlaybackService::new(
            Arc::new(DisabledAuthorizer),
            Arc::new(EchoToken),
            Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")),
        );
        assert!(service.get_playback_url_at(&request, now).is_err());

        let service = PlaybackService::new(
            Arc::new(HmacAuthorizer::new(SECRET).unwrap()),
            Arc::new(DisabledStreamToken),
            Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")),
        );
        assert!(matches!(
            service.get_playback_url_at(&request, now),
            Err(PlaybackError::Token(StreamTokenError::Disabled))
        ));
    }

    #[test]
    fn test_status() {
        let service = service(Arc::new(StaticPlaybackUrl::new("wss://origin/app/stream")));
        assert_eq!(service.status(), "OK");
    }
}
