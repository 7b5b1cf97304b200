//! Stream admission decisions
//!
//! The media server calls the admission webhook whenever a connection opens
//! or closes. Only the viewer-facing outbound leg carries a stream token, so
//! that is the only case that is actually checked. Teardown is never blocked.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::stream_token::{StreamAccessToken, STREAM_TOKEN_QUERY_PARAM};

pub const REASON_AUTHORIZED: &str = "authorized";
pub const REASON_INCOMING_PASS: &str = "pass, only check for outgoing";

/// Origin used to resolve path-only targets; only the query is read from it
const PATH_TARGET_BASE: &str = "ws://localhost/";

#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The caller sent a status the protocol does not define. This is a
    /// caller bug, not an unauthorized viewer.
    #[error("unknown status: {0}")]
    ProtocolViolation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStatus {
    Opening,
    Closing,
}

impl FromStr for AdmissionStatus {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opening" => Ok(Self::Opening),
            "closing" => Ok(Self::Closing),
            other => Err(AdmissionError::ProtocolViolation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDirection {
    Incoming,
    Outgoing,
    Other,
}

impl From<&str> for AdmissionDirection {
    fn from(s: &str) -> Self {
        match s {
            "incoming" => Self::Incoming,
            "outgoing" => Self::Outgoing,
            _ => Self::Other,
        }
    }
}

/// What the media server tells us about a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub status: String,
    pub direction: String,
    /// Target URL; present on the outgoing leg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AdmissionDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Stateless admission gate backed by stream token verification
#[derive(Clone)]
pub struct AdmissionGate {
    stream_token: Arc<dyn StreamAccessToken>,
}

impl AdmissionGate {
    pub fn new(stream_token: Arc<dyn StreamAccessToken>) -> Self {
        Self { stream_token }
    }

    pub fn decide(&self, request: &AdmissionRequest) -> Result<AdmissionDecision, AdmissionError> {
        let status = match request.status.parse::<AdmissionStatus>() {
            Ok(status) => status,
            Err(e) => {
                error!(
                    status = %request.status,
                    direction = %request.direction,
                    "unknown admission status"
                );
                return Err(e);
            }
        };

        let decision = match status {
            AdmissionStatus::Closing => {
                info!(direction = %request.direction, "admission handled with empty response");
                return Ok(AdmissionDecision::allow(""));
            }
            AdmissionStatus::Opening => match AdmissionDirection::from(request.direction.as_str()) {
                AdmissionDirection::Outgoing => self.check_outgoing(request.url.as_deref()),
                AdmissionDirection::Incoming | AdmissionDirection::Other => {
                    AdmissionDecision::allow(REASON_INCOMING_PASS)
                }
            },
        };

        if decision.allowed {
            info!(
                direction = %request.direction,
                reason = %decision.reason,
                "admission handled successfully"
            );
        } else {
            warn!(
                direction = %request.direction,
                reason = %decision.reason,
                "admission denied"
            );
        }
        Ok(decision)
    }

    fn check_outgoing(&self, url: Option<&str>) -> AdmissionDecision {
        let url = match parse_target(url.unwrap_or_default()) {
            Ok(url) => url,
            Err(e) => return AdmissionDecision::deny(e.to_string()),
        };

        let token = url
            .query_pairs()
            .find(|(key, _)| key == STREAM_TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        match self.stream_token.verify(&token) {
            Ok(()) => AdmissionDecision::allow(REASON_AUTHORIZED),
            Err(e) => AdmissionDecision::deny(e.to_string()),
        }
    }
}

/// Absolute URLs parse as-is; a path such as `/app/stream?stream_token=..`
/// is resolved against a placeholder origin. Anything else is rejected.
fn parse_target(target: &str) -> Result<Url, url::ParseError> {
    match Url::parse(target) {
        Err(url::ParseError::RelativeUrlWithoutBase) if target.starts_with('/') => {
            Url::parse(PATH_TARGET_BASE).and_then(|base| base.join(target))
        }
        other => other,
    }
}
